//! Domain 模块
//!
//! 链、代币、会话、支付意图等领域模型

pub mod chain_config;
pub mod payment_intent;
pub mod session;
pub mod token_registry;
pub mod transaction_status;

// 重新导出常用类型
pub use chain_config::{ChainDescriptor, BSC_CHAIN_ID};
pub use payment_intent::{PaymentIntent, PaymentRequest};
pub use session::{ConnectionState, WalletSession};
pub use token_registry::{TokenDescriptor, TokenRegistry, DEFAULT_TOKEN_SYMBOL};
pub use transaction_status::TransactionStatus;
