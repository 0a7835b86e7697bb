//! 错误类型定义
//!
//! 按子系统划分：连接、网络、余额、汇率、交易、后端上报。
//! 连接/网络/交易错误必须向调用方暴露；余额/汇率错误在本地降级处理并记录日志。

use serde::Serialize;
use thiserror::Error;

/// 钱包 Provider 返回的 JSON-RPC 风格错误
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    /// 用户在钱包中拒绝请求（EIP-1193）
    pub const USER_REJECTED: i64 = 4001;
    /// 钱包不认识目标链（EIP-3326）
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    /// Provider 已断开
    pub const DISCONNECTED: i64 = 4900;
    /// 通用内部错误（JSON-RPC）
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    /// 是否为用户拒绝（兼容只返回文本的钱包）
    pub fn is_user_rejected(&self) -> bool {
        self.code == Self::USER_REJECTED || self.message.contains("User rejected")
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Self::UNRECOGNIZED_CHAIN
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection request rejected by user")]
    UserRejected,
    #[error("wallet provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("a wallet connection is already in progress")]
    AlreadyConnecting,
}

impl ConnectionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserRejected => "user_rejected",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::AlreadyConnecting => "already_connecting",
        }
    }
}

impl From<ProviderError> for ConnectionError {
    fn from(err: ProviderError) -> Self {
        if err.is_user_rejected() {
            Self::UserRejected
        } else {
            Self::ProviderUnavailable(err.message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("connected to chain {actual}, expected chain {expected}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("failed to switch to chain {chain_id}: {source}")]
    ChainSwitchFailed {
        chain_id: u64,
        #[source]
        source: ProviderError,
    },
    #[error("failed to add chain {chain_id}: {source}")]
    ChainAddFailed {
        chain_id: u64,
        #[source]
        source: ProviderError,
    },
}

impl NetworkError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongNetwork { .. } => "wrong_network",
            Self::ChainSwitchFailed { .. } => "chain_switch_failed",
            Self::ChainAddFailed { .. } => "chain_add_failed",
        }
    }
}

/// 单个代币的余额查询失败（非致命，仅影响该代币条目）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceFetchError {
    #[error("{symbol}: contract call failed: {source}")]
    CallFailed {
        symbol: String,
        #[source]
        source: ProviderError,
    },
    #[error("{symbol}: malformed contract response: {detail}")]
    Malformed { symbol: String, detail: String },
}

impl BalanceFetchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CallFailed { .. } => "balance_call_failed",
            Self::Malformed { .. } => "balance_malformed",
        }
    }
}

/// 单个价格源失败（被兜底常量掩盖）
#[derive(Debug, Error)]
pub enum RateFetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate service returned status {0}")]
    Status(u16),
    #[error("rate for {0} missing in response")]
    Missing(String),
    #[error("rate value {0} is not usable")]
    InvalidValue(f64),
}

impl RateFetchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "rate_http",
            Self::Status(_) => "rate_status",
            Self::Missing(_) => "rate_missing",
            Self::InvalidValue(_) => "rate_invalid_value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("token {0} is not supported")]
    UnsupportedToken(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ConversionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedToken(_) => "unsupported_token",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Codec(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("token {0} is not supported")]
    UnsupportedToken(String),
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
    #[error("amount {0} cannot be represented in the smallest unit")]
    AmountOverflow(String),
    #[error("amount must not be negative: {0}")]
    NegativeAmount(String),
}

impl CodecError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedToken(_) => "unsupported_token",
            Self::InvalidRecipient(_) => "invalid_recipient",
            Self::AmountOverflow(_) => "amount_overflow",
            Self::NegativeAmount(_) => "negative_amount",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("wallet is not connected to the target network")]
    NotConnected,
    #[error("token {0} is not supported")]
    UnsupportedToken(String),
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("insufficient {symbol} balance: available {available}, requested {requested}")]
    InsufficientBalance {
        symbol: String,
        available: String,
        requested: String,
    },
    #[error("transaction rejected by user")]
    UserRejected,
    #[error("provider rejected transaction: {0}")]
    ProviderRejected(#[source] ProviderError),
    #[error("transaction {0} reverted on-chain")]
    Reverted(String),
}

impl TransactionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::UnsupportedToken(_) => "unsupported_token",
            Self::InvalidRecipient(_) => "invalid_recipient",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::UserRejected => "user_rejected",
            Self::ProviderRejected(_) => "provider_rejected",
            Self::Reverted(_) => "reverted",
        }
    }
}

impl From<ProviderError> for TransactionError {
    fn from(err: ProviderError) -> Self {
        if err.is_user_rejected() {
            Self::UserRejected
        } else {
            Self::ProviderRejected(err)
        }
    }
}

impl From<CodecError> for TransactionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedToken(s) => Self::UnsupportedToken(s),
            CodecError::InvalidRecipient(s) => Self::InvalidRecipient(s),
            CodecError::AmountOverflow(s) | CodecError::NegativeAmount(s) => Self::InvalidAmount(s),
        }
    }
}

/// 后端上报错误
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend token is not configured")]
    MissingToken,
}

impl ReportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "backend_http",
            Self::Status { .. } => "backend_status",
            Self::MissingToken => "backend_missing_token",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        assert!(ProviderError::new(4001, "denied").is_user_rejected());
        assert!(ProviderError::new(-32000, "User rejected the request.").is_user_rejected());
        assert!(ProviderError::new(4902, "unknown chain").is_unrecognized_chain());
        assert!(!ProviderError::internal("boom").is_user_rejected());
    }

    #[test]
    fn test_connection_error_from_provider() {
        let err: ConnectionError = ProviderError::new(4001, "denied").into();
        assert_eq!(err, ConnectionError::UserRejected);

        let err: ConnectionError = ProviderError::internal("no modal").into();
        assert_eq!(err.code(), "provider_unavailable");
    }

    #[test]
    fn test_transaction_error_from_provider() {
        let err: TransactionError = ProviderError::new(4001, "denied").into();
        assert_eq!(err, TransactionError::UserRejected);

        let err: TransactionError = ProviderError::new(-32000, "gas too low").into();
        assert_eq!(err.code(), "provider_rejected");
    }
}
