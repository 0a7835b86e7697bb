//! 代币注册表
//!
//! 进程级静态表，启动时加载，运行期只读。

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 代币描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    /// 代币符号（注册表主键）
    pub symbol: String,
    /// 合约地址（EIP-55 大小写）
    pub contract_address: String,
    /// 精度
    pub decimals: u8,
    pub display_name: String,
    pub icon_ref: String,
    /// 是否锚定 USD（影响价格兜底值）
    pub is_stablecoin: bool,
}

static DEFAULT_TOKENS: Lazy<Vec<TokenDescriptor>> = Lazy::new(|| {
    vec![
        TokenDescriptor {
            symbol: "PSPAY".to_string(),
            contract_address: "0x275fE1709Dc07112BcAf56A3465ECE683c5Fb04c".to_string(),
            decimals: 18,
            display_name: "PSPAY".to_string(),
            icon_ref: "https://www.pspay.solutions/img/logoP.png".to_string(),
            is_stablecoin: false,
        },
        TokenDescriptor {
            symbol: "USDT".to_string(),
            contract_address: "0x55d398326f99059fF775485246999027B3197955".to_string(),
            decimals: 18,
            display_name: "USDT".to_string(),
            icon_ref: "https://cryptologos.cc/logos/tether-usdt-logo.png".to_string(),
            is_stablecoin: true,
        },
    ]
});

/// 默认收付款代币
pub const DEFAULT_TOKEN_SYMBOL: &str = "PSPAY";

/// 代币注册表
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<TokenDescriptor>,
}

impl TokenRegistry {
    /// 内置的 BSC 代币表
    pub fn builtin() -> Self {
        Self {
            tokens: DEFAULT_TOKENS.clone(),
        }
    }

    /// 自定义代币表（测试或其他部署）
    pub fn with_tokens(tokens: Vec<TokenDescriptor>) -> Self {
        Self { tokens }
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// 按合约地址查找（大小写不敏感）
    pub fn find_by_contract(&self, contract: &str) -> Option<&TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.contract_address.eq_ignore_ascii_case(contract))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenDescriptor> {
        self.tokens.iter()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
