//! PSPAY - 钱包连接与支付结算核心
//!
//! 非托管模式：签名始终在用户钱包中完成，核心只通过 EIP-1193 风格的端口与钱包交互

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::WalletContext;

pub mod prelude {
    pub use crate::{
        app_state::{SubmittedPayment, WalletContext},
        config::Config,
        domain::{
            ChainDescriptor, ConnectionState, PaymentIntent, PaymentRequest, TokenDescriptor,
            TokenRegistry, TransactionStatus, WalletSession,
        },
        error::{
            CodecError, ConnectionError, ConversionError, NetworkError, ProviderError,
            TransactionError,
        },
        infrastructure::event_bus::SessionEvent,
        service::{
            BalanceSnapshot, PaymentCodec, ProviderEvent, QuoteSource, RateQuote, WalletProvider,
        },
    };
}
