pub mod balance_aggregator;
pub mod connection_manager;
pub mod conversion;
pub mod erc20;
pub mod json_rpc_provider;
pub mod payment_codec;
pub mod provider;
pub mod rate_oracle;
pub mod transaction_reporter;
pub mod transaction_submitter;

pub use balance_aggregator::{BalanceAggregator, BalanceSnapshot, TokenBalance};
pub use connection_manager::ConnectionManager;
pub use conversion::{ConversionPipeline, FiatValue};
pub use json_rpc_provider::JsonRpcProvider;
pub use payment_codec::{ImageFrame, PaymentCodec, QrDecoder};
pub use provider::{ProviderEvent, WalletProvider};
pub use rate_oracle::{
    ExchangeRate, HttpRateSource, QuoteSource, RateOracleClient, RateQuote, RateSource,
};
pub use transaction_reporter::{TransactionRecord, TransactionReporter};
pub use transaction_submitter::{Receipt, TransactionHandle, TransactionSubmitter};
