//! 多代币余额聚合
//!
//! 对注册表中的每个代币并发查询 `balanceOf` + `decimals`，单个代币失败只影响自己的条目。
//! 结果只在会话 epoch 和链ID都未变化时提交，否则丢弃。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::connection_manager::ConnectionManager;
use super::erc20;
use super::provider::WalletProvider;
use crate::domain::{TokenDescriptor, TokenRegistry, WalletSession, DEFAULT_TOKEN_SYMBOL};
use crate::error::{BalanceFetchError, ConversionError};
use crate::infrastructure::event_bus::SessionEvent;
use crate::infrastructure::rpc_validator;
use crate::utils::units;

/// 单个代币余额
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenBalance {
    /// 最小单位
    pub raw_amount: U256,
    /// 完整十进制字符串
    pub formatted_amount: String,
    /// 4 位小数展示
    pub display_amount: String,
    pub decimals: u8,
    pub error: Option<String>,
}

impl TokenBalance {
    fn fetched(raw_amount: U256, decimals: u8) -> Self {
        Self {
            raw_amount,
            formatted_amount: units::format_amount(raw_amount, decimals),
            display_amount: units::display_amount(raw_amount, decimals),
            decimals,
            error: None,
        }
    }

    fn failed(token: &TokenDescriptor, error: &BalanceFetchError) -> Self {
        Self {
            raw_amount: U256::zero(),
            formatted_amount: "0".to_string(),
            display_amount: "0.0000".to_string(),
            decimals: token.decimals,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// 余额快照，只对生成它的会话 epoch / 链ID 有效
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
    pub address: String,
    pub chain_id: u64,
    pub epoch: u64,
    pub balances: BTreeMap<String, TokenBalance>,
    pub fetched_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn get(&self, symbol: &str) -> Option<&TokenBalance> {
        self.balances
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, balance)| balance)
    }

    pub fn is_valid_for(&self, session: &WalletSession) -> bool {
        self.epoch == session.epoch && self.chain_id == session.chain_id
    }
}

/// 刷新进行中标记，离开作用域时自动清除
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BalanceAggregator {
    manager: Arc<ConnectionManager>,
    registry: Arc<TokenRegistry>,
    snapshot: RwLock<Option<Arc<BalanceSnapshot>>>,
    in_flight: AtomicBool,
    selected: RwLock<String>,
    dependency_changed: Notify,
    debounce: Duration,
}

impl BalanceAggregator {
    pub fn new(
        manager: Arc<ConnectionManager>,
        registry: Arc<TokenRegistry>,
        debounce: Duration,
    ) -> Self {
        Self {
            manager,
            registry,
            snapshot: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            selected: RwLock::new(DEFAULT_TOKEN_SYMBOL.to_string()),
            dependency_changed: Notify::new(),
            debounce,
        }
    }

    /// 当前快照；会话已变化时返回 None
    pub fn snapshot(&self) -> Option<Arc<BalanceSnapshot>> {
        let session = self.manager.session()?;
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        snapshot.is_valid_for(&session).then_some(snapshot)
    }

    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn selected_token(&self) -> String {
        self.selected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 切换当前代币，触发一次防抖刷新
    pub fn select_token(&self, symbol: &str) -> Result<(), ConversionError> {
        let token = self
            .registry
            .get(symbol)
            .ok_or_else(|| ConversionError::UnsupportedToken(symbol.to_string()))?;

        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = token.symbol.clone();
        self.dependency_changed.notify_one();
        Ok(())
    }

    /// 刷新全部代币余额
    ///
    /// 未连接、不在目标链或已有刷新进行中时直接返回 None；
    /// 会话在刷新期间发生变化时结果被丢弃，同样返回 None。
    pub async fn refresh(&self) -> Option<Arc<BalanceSnapshot>> {
        let Some(session) = self.manager.ready_session() else {
            tracing::debug!("Skipping balance refresh: no session on target chain");
            return None;
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Balance refresh already in flight");
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let owner = match erc20::parse_address(&session.address) {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(error = %e, "Session address is not a valid EVM address");
                return None;
            }
        };

        let provider = self.manager.provider();
        let fetches = self
            .registry
            .iter()
            .map(|token| fetch_token_balance(provider.as_ref(), token, owner));
        let results = join_all(fetches).await;

        let mut balances = BTreeMap::new();
        for (token, result) in self.registry.iter().zip(results) {
            let balance = match result {
                Ok((raw, decimals)) => TokenBalance::fetched(raw, decimals),
                Err(e) => {
                    tracing::warn!(
                        symbol = %token.symbol,
                        error = %e,
                        code = e.code(),
                        "Token balance fetch failed"
                    );
                    TokenBalance::failed(token, &e)
                }
            };
            balances.insert(token.symbol.clone(), balance);
        }

        let snapshot = Arc::new(BalanceSnapshot {
            address: session.address.clone(),
            chain_id: session.chain_id,
            epoch: session.epoch,
            balances,
            fetched_at: Utc::now(),
        });

        // 提交前确认会话未变化
        let current = self.manager.ready_session();
        if !current.is_some_and(|c| snapshot.is_valid_for(&c)) {
            tracing::debug!(epoch = session.epoch, "Discarding stale balance snapshot");
            return None;
        }

        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        tracing::debug!(
            epoch = snapshot.epoch,
            tokens = snapshot.balances.len(),
            "Balance snapshot committed"
        );
        Some(snapshot)
    }

    /// 自动刷新循环
    ///
    /// 会话事件和代币切换都会重置静默期，静默期结束后刷新一次。
    pub fn run_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.manager.subscribe();
        let aggregator = self.clone();

        tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => {
                            if event.invalidates_balances() {
                                aggregator.invalidate();
                            }
                            if !matches!(event, SessionEvent::Disconnected { .. }) {
                                deadline = Some(Instant::now() + aggregator.debounce);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Balance refresher lagged behind session events");
                            aggregator.invalidate();
                            deadline = Some(Instant::now() + aggregator.debounce);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = aggregator.dependency_changed.notified() => {
                        deadline = Some(Instant::now() + aggregator.debounce);
                    }
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        deadline = None;
                        aggregator.refresh().await;
                    }
                }
            }
        })
    }
}

async fn fetch_token_balance(
    provider: &dyn WalletProvider,
    token: &TokenDescriptor,
    owner: Address,
) -> Result<(U256, u8), BalanceFetchError> {
    let call_failed = |source| BalanceFetchError::CallFailed {
        symbol: token.symbol.clone(),
        source,
    };
    let malformed = |e: anyhow::Error| BalanceFetchError::Malformed {
        symbol: token.symbol.clone(),
        detail: e.to_string(),
    };

    let balance_call = provider.request(
        "eth_call",
        erc20::call_params(&token.contract_address, &erc20::balance_of_data(owner)),
    );
    let decimals_call = provider.request(
        "eth_call",
        erc20::call_params(&token.contract_address, &erc20::decimals_data()),
    );

    let (balance, decimals) = futures::future::join(balance_call, decimals_call).await;
    let balance = balance.map_err(call_failed)?;
    let decimals = decimals.map_err(call_failed)?;

    let raw = rpc_validator::validate_uint256_word(&balance).map_err(malformed)?;
    let decimals = rpc_validator::validate_uint256_word(&decimals)
        .and_then(rpc_validator::validate_decimals)
        .map_err(malformed)?;

    Ok((raw, decimals))
}
