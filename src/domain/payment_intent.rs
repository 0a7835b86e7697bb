//! 支付意图与收款请求

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 扫码/上传内容解码后的支付意图
///
/// 调用方必须穷举处理每个分支；`RawPayload` 表示无法识别，需要提示用户或拒绝。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentIntent {
    /// EIP-681 代币转账请求，金额为最小单位整数
    Transfer {
        token_contract: String,
        chain_id: Option<u64>,
        recipient: String,
        amount_smallest_unit: U256,
    },
    /// 结构化（JSON 对象）内容
    Structured { fields: Map<String, Value> },
    /// 仅地址，金额需由用户输入
    AddressOnly { address: String },
    RawPayload { text: String },
}

impl PaymentIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::Structured { .. } => "structured",
            Self::AddressOnly { .. } => "address_only",
            Self::RawPayload { .. } => "raw_payload",
        }
    }

    /// 收款方地址（若意图中带有）
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Transfer { recipient, .. } => Some(recipient),
            Self::AddressOnly { address } => Some(address),
            Self::Structured { .. } | Self::RawPayload { .. } => None,
        }
    }
}

/// 收款请求（法币金额 -> 代币金额 -> 支付URI）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub uri: String,
    pub symbol: String,
    /// 展示用代币金额
    pub amount_token: f64,
    pub amount_smallest_unit: U256,
    pub amount_usd: f64,
    pub amount_fiat: f64,
    pub fiat_code: String,
}
