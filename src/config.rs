//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub balances: BalancesConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 钱包连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// 钱包连接协议的项目ID
    pub project_id: String,
    /// 唯一允许的目标链
    pub target_chain_id: u64,
    /// 目标链 RPC（用于 wallet_addEthereumChain）
    pub rpc_url: String,
    /// 配对提示中展示的应用名称
    pub app_name: String,
    /// 交易回执轮询间隔
    pub confirmation_poll_ms: u64,
}

/// 汇率/价格服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesConfig {
    pub exchange_rate_url: String,
    pub exchange_rate_app_id: String,
    pub token_price_url: String,
    /// 展示用法币代码
    pub fiat_code: String,
    /// 法币汇率兜底值（fiat per USD）
    pub fallback_fiat_per_usd: f64,
    /// 稳定币兜底价格（USD 锚定）
    pub fallback_stablecoin_usd: f64,
    /// 其他代币兜底价格
    pub fallback_token_usd: f64,
    pub http_timeout_secs: u64,
}

/// 余额刷新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesConfig {
    /// 依赖变化后的静默期
    pub debounce_ms: u64,
}

/// 后端 REST 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    pub timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            project_id: env_or("WALLET_PROJECT_ID", ""),
            target_chain_id: env_parse("TARGET_CHAIN_ID", 56),
            rpc_url: env_or("BSC_RPC_URL", "https://bsc-dataseed.binance.org/"),
            app_name: env_or("WALLET_APP_NAME", "Pspay"),
            confirmation_poll_ms: env_parse("CONFIRMATION_POLL_MS", 2000),
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            exchange_rate_url: env_or(
                "EXCHANGE_RATE_URL",
                "https://openexchangerates.org/api/latest.json",
            ),
            exchange_rate_app_id: env_or("EXCHANGE_RATE_APP_ID", ""),
            token_price_url: env_or(
                "TOKEN_PRICE_URL",
                "https://api.coinbrain.com/public/coin-info",
            ),
            fiat_code: env_or("FIAT_CODE", "BRL"),
            fallback_fiat_per_usd: env_parse("FALLBACK_FIAT_PER_USD", 5.0),
            fallback_stablecoin_usd: env_parse("FALLBACK_STABLECOIN_USD", 1.0),
            fallback_token_usd: env_parse("FALLBACK_TOKEN_USD", 0.1),
            http_timeout_secs: env_parse("RATES_HTTP_TIMEOUT_SECS", 10),
        }
    }
}

impl Default for BalancesConfig {
    fn default() -> Self {
        Self {
            debounce_ms: env_parse("BALANCE_DEBOUNCE_MS", 500),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: env_or("BACKEND_URL", "http://localhost:8001"),
            bearer_token: std::env::var("BACKEND_TOKEN").ok(),
            timeout_secs: env_parse("BACKEND_TIMEOUT_SECS", 15),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: env_or("LOG_LEVEL", "info"),
            format: env_or("LOG_FORMAT", "text"),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                // 缺失的段落由 serde(default) 回落到环境变量
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.wallet.target_chain_id == 0 {
            anyhow::bail!("TARGET_CHAIN_ID must be non-zero");
        }

        if !self.wallet.rpc_url.starts_with("http://") && !self.wallet.rpc_url.starts_with("https://")
        {
            anyhow::bail!("BSC_RPC_URL must be an http(s) URL");
        }

        for (name, value) in [
            ("FALLBACK_FIAT_PER_USD", self.rates.fallback_fiat_per_usd),
            ("FALLBACK_STABLECOIN_USD", self.rates.fallback_stablecoin_usd),
            ("FALLBACK_TOKEN_USD", self.rates.fallback_token_usd),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("{} must be a positive finite number", name);
            }
        }

        if self.rates.fiat_code.len() != 3 {
            anyhow::bail!("FIAT_CODE must be a 3-letter currency code");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env().unwrap();
        assert!(config.wallet.target_chain_id > 0);
        assert!(config.rates.fallback_fiat_per_usd > 0.0);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[wallet]
project_id = "test-project"
target_chain_id = 56
rpc_url = "https://bsc-dataseed.binance.org/"
app_name = "Pspay"
confirmation_poll_ms = 500

[rates]
exchange_rate_url = "http://localhost/rates"
exchange_rate_app_id = "abc"
token_price_url = "http://localhost/prices"
fiat_code = "BRL"
fallback_fiat_per_usd = 5.0
fallback_stablecoin_usd = 1.0
fallback_token_usd = 0.1
http_timeout_secs = 3

[balances]
debounce_ms = 250

[logging]
level = "debug"
format = "json"
enable_file_logging = false
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.wallet.project_id, "test-project");
        assert_eq!(config.wallet.confirmation_poll_ms, 500);
        assert_eq!(config.balances.debounce_ms, 250);
        assert_eq!(config.rates.http_timeout_secs, 3);
        assert_eq!(config.logging.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_fallback() {
        let mut config = Config::from_env().unwrap();
        config.logging.level = "info".into();
        config.logging.format = "text".into();
        config.rates.fiat_code = "BRL".into();
        config.wallet.rpc_url = "https://bsc-dataseed.binance.org/".into();
        config.rates.fallback_token_usd = 0.0;
        assert!(config.validate().is_err());
    }
}
