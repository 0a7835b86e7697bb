//! 交易上报
//!
//! 把链上交易的哈希和状态同步到后端 REST 服务（Bearer token）。
//! 上报失败返回给调用方，但不影响已提交的链上交易。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::BackendConfig;
use crate::domain::TransactionStatus;
use crate::error::ReportError;
use crate::infrastructure::log_sanitizer::mask_tx_hash;

/// 上报给后端的交易记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub symbol: String,
    /// 十进制代币金额（用户输入）
    pub amount: String,
    pub status: TransactionStatus,
    pub chain_id: u64,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn pending(
        tx_hash: &str,
        from: &str,
        to: &str,
        symbol: &str,
        amount: &str,
        chain_id: u64,
    ) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            from: from.to_lowercase(),
            to: to.to_lowercase(),
            symbol: symbol.to_string(),
            amount: amount.to_string(),
            status: TransactionStatus::Pending,
            chain_id,
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub struct TransactionReporter {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl TransactionReporter {
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        }
    }

    fn token(&self) -> Result<&str, ReportError> {
        self.bearer_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ReportError::MissingToken)
    }

    pub fn transactions_url(&self) -> String {
        format!("{}/api/transactions", self.base_url)
    }

    pub fn status_url(&self, tx_hash: &str) -> String {
        format!("{}/api/transactions/{}/status", self.base_url, tx_hash)
    }

    async fn check(response: reqwest::Response) -> Result<(), ReportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReportError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// 上报新交易
    pub async fn report(&self, record: &TransactionRecord) -> Result<(), ReportError> {
        let token = self.token()?;

        let response = self
            .client
            .post(self.transactions_url())
            .bearer_auth(token)
            .json(record)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::info!(
            tx_hash = %mask_tx_hash(&record.tx_hash),
            status = %record.status,
            "Transaction reported to backend"
        );
        Ok(())
    }

    /// 更新交易状态
    pub async fn update_status(
        &self,
        tx_hash: &str,
        status: TransactionStatus,
    ) -> Result<(), ReportError> {
        let token = self.token()?;

        let response = self
            .client
            .put(self.status_url(tx_hash))
            .bearer_auth(token)
            .json(&json!({ "status": status }))
            .send()
            .await?;
        Self::check(response).await?;

        tracing::info!(
            tx_hash = %mask_tx_hash(tx_hash),
            status = %status,
            "Transaction status updated"
        );
        Ok(())
    }
}
