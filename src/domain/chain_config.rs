//! 目标链配置
//!
//! 系统只允许在一条链上操作（BNB Smart Chain, chain id 56）。
//! 这里同时保存 `wallet_addEthereumChain` 所需的完整链描述。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// BNB Smart Chain
pub const BSC_CHAIN_ID: u64 = 56;

/// 原生币描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// 链描述（EIP-3085 字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    /// 链 ID (EIP-155)
    pub chain_id: u64,
    /// 链名称
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl ChainDescriptor {
    /// 默认的 BSC 主网描述
    pub fn bsc() -> Self {
        Self {
            chain_id: BSC_CHAIN_ID,
            name: "Binance Smart Chain".to_string(),
            native_currency: NativeCurrency {
                name: "BNB".to_string(),
                symbol: "BNB".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://bsc-dataseed.binance.org/".to_string()],
            block_explorer_urls: vec!["https://bscscan.com/".to_string()],
        }
    }

    /// 使用配置覆盖链ID和RPC
    pub fn from_config(config: &crate::config::WalletConfig) -> Self {
        let mut descriptor = Self::bsc();
        descriptor.chain_id = config.target_chain_id;
        descriptor.rpc_urls = vec![config.rpc_url.clone()];
        descriptor
    }

    /// 十六进制链ID，例如 56 -> "0x38"
    pub fn hex_chain_id(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// `wallet_switchEthereumChain` 参数（目标链不一定有描述）
    pub fn switch_params(chain_id: u64) -> Value {
        json!([{ "chainId": format!("0x{:x}", chain_id) }])
    }

    /// `wallet_addEthereumChain` 参数
    pub fn add_chain_params(&self) -> Value {
        json!([{
            "chainId": self.hex_chain_id(),
            "chainName": self.name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        }])
    }
}

/// 解析 Provider 上报的链ID，兼容 "0x38"、"56" 和数字
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}
