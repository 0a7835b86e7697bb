// 交易提交与确认跟踪
// 通过会话的签名方提交 ERC-20 transfer，立即返回可等待确认的句柄；不做任何重试

use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::interval;

use super::balance_aggregator::BalanceSnapshot;
use super::connection_manager::ConnectionManager;
use super::erc20;
use super::provider::WalletProvider;
use crate::domain::{TokenDescriptor, TokenRegistry, TransactionStatus};
use crate::error::{ProviderError, TransactionError};
use crate::infrastructure::log_sanitizer::{mask_address, mask_tx_hash};
use crate::infrastructure::rpc_validator;
use crate::utils::{units, AddressValidator};

/// 交易回执
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub status: TransactionStatus,
}

fn malformed(e: anyhow::Error) -> TransactionError {
    TransactionError::ProviderRejected(ProviderError::internal(e.to_string()))
}

fn parse_receipt(tx_hash: &str, value: &Value) -> Result<Receipt, TransactionError> {
    let status = rpc_validator::validate_quantity(&value["status"], "status").map_err(malformed)?;
    let block_number =
        rpc_validator::validate_quantity(&value["blockNumber"], "blockNumber").map_err(malformed)?;
    let gas_used = rpc_validator::validate_quantity(&value["gasUsed"], "gasUsed").ok();
    let block_hash = value["blockHash"].as_str().map(str::to_string);

    Ok(Receipt {
        tx_hash: tx_hash.to_string(),
        block_number,
        block_hash,
        gas_used,
        status: if status == 1 {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        },
    })
}

/// 已提交交易的句柄
pub struct TransactionHandle {
    hash: String,
    provider: Arc<dyn WalletProvider>,
    poll_interval: Duration,
}

impl TransactionHandle {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// 轮询回执直到交易上链
    ///
    /// 没有超时，调用方丢弃 future 即放弃等待。status 为 0 时返回 `Reverted`。
    pub async fn wait(&self) -> Result<Receipt, TransactionError> {
        let mut ticker = interval(self.poll_interval);

        loop {
            ticker.tick().await;

            let value = self
                .provider
                .request("eth_getTransactionReceipt", json!([self.hash]))
                .await?;

            // 尚未打包
            if value.is_null() {
                continue;
            }

            let receipt = parse_receipt(&self.hash, &value)?;
            if receipt.status == TransactionStatus::Failed {
                tracing::warn!(
                    tx_hash = %mask_tx_hash(&self.hash),
                    block_number = receipt.block_number,
                    "Transaction reverted"
                );
                return Err(TransactionError::Reverted(self.hash.clone()));
            }

            tracing::info!(
                tx_hash = %mask_tx_hash(&self.hash),
                block_number = receipt.block_number,
                "Transaction confirmed"
            );
            return Ok(receipt);
        }
    }
}

pub struct TransactionSubmitter {
    manager: Arc<ConnectionManager>,
    registry: Arc<TokenRegistry>,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        manager: Arc<ConnectionManager>,
        registry: Arc<TokenRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            registry,
            poll_interval,
        }
    }

    fn token(&self, symbol: &str) -> Result<&TokenDescriptor, TransactionError> {
        self.registry
            .get(symbol)
            .ok_or_else(|| TransactionError::UnsupportedToken(symbol.to_string()))
    }

    fn check_recipient(recipient: &str) -> Result<&str, TransactionError> {
        let recipient = recipient.trim();
        if AddressValidator::validate_evm_address(recipient) {
            Ok(recipient)
        } else {
            Err(TransactionError::InvalidRecipient(recipient.to_string()))
        }
    }

    fn parse_positive(amount: &str, decimals: u8) -> Result<U256, TransactionError> {
        units::parse_amount(amount, decimals)
            .filter(|v| !v.is_zero())
            .ok_or_else(|| TransactionError::InvalidAmount(amount.to_string()))
    }

    /// 提交前的表单校验：收款地址、金额、余额
    ///
    /// 快照中该代币条目带错误时跳过余额检查。返回最小单位金额。
    pub fn validate_transfer(
        &self,
        recipient: &str,
        amount: &str,
        symbol: &str,
        snapshot: Option<&BalanceSnapshot>,
    ) -> Result<U256, TransactionError> {
        let token = self.token(symbol)?;
        Self::check_recipient(recipient)?;

        let balance = snapshot.and_then(|s| s.get(&token.symbol)).filter(|b| b.is_ok());
        let decimals = balance.map(|b| b.decimals).unwrap_or(token.decimals);
        let requested = Self::parse_positive(amount, decimals)?;

        if let Some(balance) = balance {
            if requested > balance.raw_amount {
                return Err(TransactionError::InsufficientBalance {
                    symbol: token.symbol.clone(),
                    available: balance.formatted_amount.clone(),
                    requested: amount.trim().to_string(),
                });
            }
        }

        Ok(requested)
    }

    /// 提交 ERC-20 转账
    ///
    /// 金额是十进制字符串，按合约实时返回的精度换算；提交后立即返回句柄。
    pub async fn transfer(
        &self,
        recipient: &str,
        amount: &str,
        symbol: &str,
    ) -> Result<TransactionHandle, TransactionError> {
        let session = self
            .manager
            .ready_session()
            .ok_or(TransactionError::NotConnected)?;
        let token = self.token(symbol)?;
        let recipient = Self::check_recipient(recipient)?;
        let recipient_address = erc20::parse_address(recipient)?;

        let provider = self.manager.provider();

        // 精度以合约为准
        let decimals = provider
            .request(
                "eth_call",
                erc20::call_params(&token.contract_address, &erc20::decimals_data()),
            )
            .await?;
        let decimals = rpc_validator::validate_uint256_word(&decimals)
            .and_then(rpc_validator::validate_decimals)
            .map_err(malformed)?;

        let raw = Self::parse_positive(amount, decimals)?;

        let tx = json!([{
            "from": session.address,
            "to": token.contract_address,
            "data": erc20::transfer_data(recipient_address, raw),
        }]);

        tracing::info!(
            symbol = %token.symbol,
            from = %mask_address(&session.address),
            to = %mask_address(recipient),
            amount,
            "Submitting token transfer"
        );

        let result = provider.request("eth_sendTransaction", tx).await.map_err(|e| {
            tracing::warn!(code = e.code, symbol = %token.symbol, "Transfer rejected by provider");
            TransactionError::from(e)
        })?;
        let hash = rpc_validator::validate_tx_hash(&result).map_err(malformed)?;

        tracing::info!(tx_hash = %mask_tx_hash(&hash), "Transfer submitted");

        Ok(TransactionHandle {
            hash,
            provider,
            poll_interval: self.poll_interval,
        })
    }
}
