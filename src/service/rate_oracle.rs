//! 汇率与代币价格
//!
//! 两个独立的外部价格源：法币/USD 汇率、代币/USD 价格。
//! 任一价格源失败时使用兜底常量，结果总是有限正数，并通过 `QuoteSource` 标明来源。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::RatesConfig;
use crate::domain::{TokenDescriptor, TokenRegistry};
use crate::error::{ConversionError, RateFetchError};

/// 报价来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Live,
    /// 价格源失败，使用兜底常量
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub value: f64,
    pub source: QuoteSource,
}

impl RateQuote {
    pub fn live(value: f64) -> Self {
        Self {
            value,
            source: QuoteSource::Live,
        }
    }

    pub fn fallback(value: f64) -> Self {
        Self {
            value,
            source: QuoteSource::Fallback,
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == QuoteSource::Live
    }
}

/// 展示用汇率缓存（尽力而为）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRate {
    pub fiat_code: String,
    pub fiat_per_usd: RateQuote,
    pub token_usd_price: BTreeMap<String, RateQuote>,
    pub fetched_at: DateTime<Utc>,
}

/// 外部价格源
#[async_trait]
pub trait RateSource: Send + Sync {
    /// 1 USD 兑换多少法币
    async fn fiat_per_usd(&self, fiat_code: &str) -> Result<f64, RateFetchError>;

    /// 代币的 USD 价格
    async fn token_usd_price(
        &self,
        token: &TokenDescriptor,
        chain_id: u64,
    ) -> Result<f64, RateFetchError>;
}

/// HTTP 价格源：openexchangerates 风格的汇率接口 + coin-info 风格的代币价格接口
pub struct HttpRateSource {
    client: reqwest::Client,
    config: RatesConfig,
}

impl HttpRateSource {
    pub fn new(config: RatesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, config }
    }
}

fn number_field(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fiat_per_usd(&self, fiat_code: &str) -> Result<f64, RateFetchError> {
        let response = self
            .client
            .get(&self.config.exchange_rate_url)
            .query(&[("app_id", self.config.exchange_rate_app_id.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RateFetchError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        number_field(body.get("rates").and_then(|r| r.get(fiat_code)))
            .ok_or_else(|| RateFetchError::Missing(fiat_code.to_string()))
    }

    async fn token_usd_price(
        &self,
        token: &TokenDescriptor,
        chain_id: u64,
    ) -> Result<f64, RateFetchError> {
        let mut body = serde_json::Map::new();
        body.insert(chain_id.to_string(), json!([token.contract_address]));

        let response = self
            .client
            .post(&self.config.token_price_url)
            .json(&Value::Object(body))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RateFetchError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await?;
        number_field(body.get(0).and_then(|entry| entry.get("priceUsd")))
            .ok_or_else(|| RateFetchError::Missing(token.symbol.clone()))
    }
}

/// 带兜底的价格客户端
pub struct RateOracleClient {
    source: Arc<dyn RateSource>,
    registry: Arc<TokenRegistry>,
    config: RatesConfig,
    chain_id: u64,
}

fn usable(value: f64) -> Result<f64, RateFetchError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RateFetchError::InvalidValue(value))
    }
}

impl RateOracleClient {
    pub fn new(
        source: Arc<dyn RateSource>,
        registry: Arc<TokenRegistry>,
        config: RatesConfig,
        chain_id: u64,
    ) -> Self {
        Self {
            source,
            registry,
            config,
            chain_id,
        }
    }

    pub fn default_fiat_code(&self) -> &str {
        &self.config.fiat_code
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// 法币汇率（失败时使用 `fallback_fiat_per_usd`）
    pub async fn fiat_rate(&self, fiat_code: &str) -> RateQuote {
        match self.source.fiat_per_usd(fiat_code).await.and_then(usable) {
            Ok(rate) => RateQuote::live(rate),
            Err(e) => {
                tracing::warn!(
                    fiat = fiat_code,
                    error = %e,
                    code = e.code(),
                    fallback = self.config.fallback_fiat_per_usd,
                    "Fiat rate fetch failed, using fallback"
                );
                RateQuote::fallback(self.config.fallback_fiat_per_usd)
            }
        }
    }

    /// 代币 USD 价格（稳定币兜底 1.0，其它代币兜底 0.1）
    pub async fn token_price(&self, symbol: &str) -> Result<RateQuote, ConversionError> {
        let token = self
            .registry
            .get(symbol)
            .ok_or_else(|| ConversionError::UnsupportedToken(symbol.to_string()))?;
        Ok(self.token_price_for(token).await)
    }

    pub(crate) async fn token_price_for(&self, token: &TokenDescriptor) -> RateQuote {
        match self
            .source
            .token_usd_price(token, self.chain_id)
            .await
            .and_then(usable)
        {
            Ok(price) => RateQuote::live(price),
            Err(e) => {
                let fallback = self.fallback_price(token);
                tracing::warn!(
                    symbol = %token.symbol,
                    error = %e,
                    code = e.code(),
                    fallback,
                    "Token price fetch failed, using fallback"
                );
                RateQuote::fallback(fallback)
            }
        }
    }

    fn fallback_price(&self, token: &TokenDescriptor) -> f64 {
        if token.is_stablecoin {
            self.config.fallback_stablecoin_usd
        } else {
            self.config.fallback_token_usd
        }
    }
}
