//! 法币/代币换算管线
//!
//! fiat -> USD -> token，两段汇率独立获取、各自兜底；每次换算都重新获取，不跨调用缓存。
//! `refresh_rates` 维护一份仅供展示的汇率缓存。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::payment_codec::PaymentCodec;
use super::rate_oracle::{ExchangeRate, QuoteSource, RateOracleClient};
use crate::domain::PaymentRequest;
use crate::error::ConversionError;
use crate::utils::units;

/// 代币金额的法币价值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiatValue {
    pub usd: f64,
    pub fiat: f64,
    pub fiat_code: String,
    pub token_price_source: QuoteSource,
    pub fiat_rate_source: QuoteSource,
}

impl FiatValue {
    /// 两段汇率都来自实时价格源
    pub fn is_live(&self) -> bool {
        self.token_price_source == QuoteSource::Live && self.fiat_rate_source == QuoteSource::Live
    }
}

struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn check_amount(amount: f64) -> Result<f64, ConversionError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(ConversionError::InvalidAmount(amount.to_string()))
    }
}

/// 换算结果必须有限（极大输入乘以汇率可能溢出为 inf）
fn check_result(value: f64, amount: f64) -> Result<f64, ConversionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConversionError::InvalidAmount(amount.to_string()))
    }
}

pub struct ConversionPipeline {
    oracle: Arc<RateOracleClient>,
    codec: Arc<PaymentCodec>,
    rates: RwLock<Option<Arc<ExchangeRate>>>,
    refreshing: AtomicBool,
}

impl ConversionPipeline {
    pub fn new(oracle: Arc<RateOracleClient>, codec: Arc<PaymentCodec>) -> Self {
        Self {
            oracle,
            codec,
            rates: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    /// 代币 -> 法币
    pub async fn token_to_fiat(
        &self,
        amount_tokens: f64,
        symbol: &str,
        fiat_code: &str,
    ) -> Result<FiatValue, ConversionError> {
        let amount = check_amount(amount_tokens)?;
        let (price, rate) = futures::join!(self.oracle.token_price(symbol), self.oracle.fiat_rate(fiat_code));
        let price = price?;

        let usd = check_result(amount * price.value, amount)?;
        let fiat = check_result(usd * rate.value, amount)?;
        Ok(FiatValue {
            usd,
            fiat,
            fiat_code: fiat_code.to_string(),
            token_price_source: price.source,
            fiat_rate_source: rate.source,
        })
    }

    /// 法币（默认法币代码）-> 代币
    pub async fn fiat_to_token(&self, amount_fiat: f64, symbol: &str) -> Result<f64, ConversionError> {
        let amount = check_amount(amount_fiat)?;
        let (price, rate) = futures::join!(
            self.oracle.token_price(symbol),
            self.oracle.fiat_rate(self.oracle.default_fiat_code())
        );
        let price = price?;

        let usd = check_result(amount / rate.value, amount)?;
        check_result(usd / price.value, amount)
    }

    /// 收款请求：法币金额 -> 代币金额 -> 支付 URI
    pub async fn build_receive_request(
        &self,
        recipient: &str,
        amount_fiat: f64,
        symbol: &str,
    ) -> Result<PaymentRequest, ConversionError> {
        let token = self
            .oracle
            .registry()
            .get(symbol)
            .cloned()
            .ok_or_else(|| ConversionError::UnsupportedToken(symbol.to_string()))?;
        let amount = check_amount(amount_fiat)?;
        if amount == 0.0 {
            return Err(ConversionError::InvalidAmount(amount_fiat.to_string()));
        }

        let fiat_code = self.oracle.default_fiat_code().to_string();
        let (price, rate) = futures::join!(
            self.oracle.token_price_for(&token),
            self.oracle.fiat_rate(&fiat_code)
        );

        let amount_usd = amount / rate.value;
        let amount_token = amount_usd / price.value;

        // 按代币精度取整（整数运算），链上金额不经过浮点
        let decimal = Decimal::from_f64(amount_token)
            .ok_or_else(|| ConversionError::InvalidAmount(amount_token.to_string()))?;
        let raw = units::to_smallest_unit(decimal, token.decimals)?;
        if raw.is_zero() {
            return Err(ConversionError::InvalidAmount(amount_token.to_string()));
        }
        let uri = self.codec.encode(recipient, &token.symbol, raw)?;

        tracing::info!(
            symbol = %token.symbol,
            amount_fiat = amount,
            amount_token,
            fiat_rate_source = ?rate.source,
            token_price_source = ?price.source,
            "Built receive request"
        );

        Ok(PaymentRequest {
            uri,
            symbol: token.symbol,
            amount_token,
            amount_smallest_unit: raw,
            amount_usd,
            amount_fiat: amount,
            fiat_code,
        })
    }

    /// 刷新展示用汇率缓存；已有刷新进行中时返回 None
    pub async fn refresh_rates(&self) -> Option<Arc<ExchangeRate>> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Rate refresh already in flight");
            return None;
        }
        let _guard = RefreshGuard(&self.refreshing);

        let fiat_code = self.oracle.default_fiat_code().to_string();
        let tokens: Vec<_> = self.oracle.registry().iter().cloned().collect();
        let prices = join_all(tokens.iter().map(|t| self.oracle.token_price_for(t)));
        let (fiat_per_usd, prices) = futures::join!(self.oracle.fiat_rate(&fiat_code), prices);

        let token_usd_price: BTreeMap<_, _> = tokens
            .into_iter()
            .map(|t| t.symbol)
            .zip(prices)
            .collect();

        let rates = Arc::new(ExchangeRate {
            fiat_code,
            fiat_per_usd,
            token_usd_price,
            fetched_at: Utc::now(),
        });
        *self.rates.write().unwrap_or_else(PoisonError::into_inner) = Some(rates.clone());
        Some(rates)
    }

    /// 最近一次刷新的汇率
    pub fn latest_rates(&self) -> Option<Arc<ExchangeRate>> {
        self.rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
