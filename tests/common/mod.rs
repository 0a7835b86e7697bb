//! 测试辅助模块
//! 内存中的钱包 Provider：账户、链、ERC-20 合约状态和回执都可由测试控制

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::U256;
use pspay::config::Config;
use pspay::domain::chain_config::parse_chain_id;
use pspay::error::ProviderError;
use pspay::service::{ProviderEvent, WalletProvider};
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub const ACCOUNT: &str = "0x742d35cc6634c0532925a3b844bc9e7595f0beb6";
pub const OTHER_ACCOUNT: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
pub const RECIPIENT: &str = "0x1000000000000000000000000000000000000001";
pub const PSPAY_CONTRACT: &str = "0x275fe1709dc07112bcaf56a3465ece683c5fb04c";
pub const USDT_CONTRACT: &str = "0x55d398326f99059ff775485246999027b3197955";

const SELECTOR_BALANCE_OF: &str = "0x70a08231";
const SELECTOR_DECIMALS: &str = "0x313ce567";

struct MockState {
    /// 已授权账户（eth_accounts）
    authorized: Vec<String>,
    /// 握手后授权的账户（eth_requestAccounts）
    wallet_accounts: Vec<String>,
    chain_id: u64,
    known_chains: HashSet<u64>,
    reject_enable: bool,
    reject_switch: bool,
    emit_on_switch: bool,
    balances: HashMap<String, U256>,
    decimals: HashMap<String, u8>,
    reverting: HashSet<String>,
    receipts: HashMap<String, Value>,
    send_error: Option<ProviderError>,
    /// eth_accounts / eth_chainId 返回的错误
    query_error: Option<ProviderError>,
    disconnect_error: Option<ProviderError>,
    sent: Vec<Value>,
    calls: Vec<String>,
    next_hash: u64,
}

pub struct MockWalletProvider {
    state: Mutex<MockState>,
    events: broadcast::Sender<ProviderEvent>,
    /// 握手和 eth_call 的人为延迟
    delay: Mutex<Duration>,
}

pub fn word(value: U256) -> String {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    format!("0x{}", hex::encode(buf))
}

pub fn tokens(amount: u64) -> U256 {
    U256::from(amount) * U256::exp10(18)
}

impl MockWalletProvider {
    pub fn new(chain_id: u64) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let mut known_chains = HashSet::new();
        known_chains.insert(56);
        known_chains.insert(1);

        let mut decimals = HashMap::new();
        decimals.insert(PSPAY_CONTRACT.to_string(), 18);
        decimals.insert(USDT_CONTRACT.to_string(), 18);

        Arc::new(Self {
            state: Mutex::new(MockState {
                authorized: Vec::new(),
                wallet_accounts: vec![ACCOUNT.to_string()],
                chain_id,
                known_chains,
                reject_enable: false,
                reject_switch: false,
                emit_on_switch: false,
                balances: HashMap::new(),
                decimals,
                reverting: HashSet::new(),
                receipts: HashMap::new(),
                send_error: None,
                query_error: None,
                disconnect_error: None,
                sent: Vec::new(),
                calls: Vec::new(),
                next_hash: 1,
            }),
            events,
            delay: Mutex::new(Duration::ZERO),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    // ============ 测试控制 ============

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_authorized(&self, accounts: &[&str]) {
        self.with_state(|s| s.authorized = accounts.iter().map(|a| a.to_string()).collect());
    }

    pub fn set_wallet_accounts(&self, accounts: &[&str]) {
        self.with_state(|s| s.wallet_accounts = accounts.iter().map(|a| a.to_string()).collect());
    }

    pub fn set_reject_enable(&self, reject: bool) {
        self.with_state(|s| s.reject_enable = reject);
    }

    pub fn set_reject_switch(&self, reject: bool) {
        self.with_state(|s| s.reject_switch = reject);
    }

    pub fn set_emit_on_switch(&self, emit: bool) {
        self.with_state(|s| s.emit_on_switch = emit);
    }

    pub fn forget_chain(&self, chain_id: u64) {
        self.with_state(|s| {
            s.known_chains.remove(&chain_id);
        });
    }

    pub fn set_balance(&self, contract: &str, amount: U256) {
        self.with_state(|s| {
            s.balances.insert(contract.to_lowercase(), amount);
        });
    }

    pub fn set_decimals(&self, contract: &str, decimals: u8) {
        self.with_state(|s| {
            s.decimals.insert(contract.to_lowercase(), decimals);
        });
    }

    pub fn set_reverting(&self, contract: &str) {
        self.with_state(|s| {
            s.reverting.insert(contract.to_lowercase());
        });
    }

    pub fn set_send_error(&self, error: ProviderError) {
        self.with_state(|s| s.send_error = Some(error));
    }

    pub fn set_query_error(&self, error: Option<ProviderError>) {
        self.with_state(|s| s.query_error = error);
    }

    pub fn set_disconnect_error(&self, error: ProviderError) {
        self.with_state(|s| s.disconnect_error = Some(error));
    }

    pub fn set_receipt(&self, hash: &str, receipt: Value) {
        self.with_state(|s| {
            s.receipts.insert(hash.to_lowercase(), receipt);
        });
    }

    /// 钱包侧切链并推送 chainChanged
    pub fn emit_chain_changed(&self, chain_id: u64) {
        self.with_state(|s| s.chain_id = chain_id);
        let _ = self
            .events
            .send(ProviderEvent::ChainChanged(json!(format!("0x{:x}", chain_id))));
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    // ============ 观察 ============

    pub fn chain(&self) -> u64 {
        self.with_state(|s| s.chain_id)
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.with_state(|s| s.calls.iter().filter(|m| *m == method).count())
    }

    pub fn sent(&self) -> Vec<Value> {
        self.with_state(|s| s.sent.clone())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn eth_call(&self, params: &Value) -> Result<Value, ProviderError> {
        let call = &params[0];
        let to = call["to"].as_str().unwrap_or_default().to_lowercase();
        let data = call["data"].as_str().unwrap_or_default().to_string();

        self.with_state(|s| {
            if s.reverting.contains(&to) {
                return Err(ProviderError::new(-32000, "execution reverted"));
            }
            if data.starts_with(SELECTOR_BALANCE_OF) {
                let balance = s.balances.get(&to).copied().unwrap_or_default();
                Ok(json!(word(balance)))
            } else if data.starts_with(SELECTOR_DECIMALS) {
                let decimals = s.decimals.get(&to).copied().unwrap_or(18);
                Ok(json!(word(U256::from(decimals))))
            } else {
                Err(ProviderError::new(-32000, "unknown selector"))
            }
        })
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.with_state(|s| s.calls.push(method.to_string()));

        match method {
            "eth_requestAccounts" => {
                self.pause().await;
                self.with_state(|s| {
                    if s.reject_enable {
                        return Err(ProviderError::new(
                            ProviderError::USER_REJECTED,
                            "User rejected the request.",
                        ));
                    }
                    s.authorized = s.wallet_accounts.clone();
                    Ok(json!(s.authorized))
                })
            }
            "eth_accounts" => self.with_state(|s| match s.query_error.clone() {
                Some(err) => Err(err),
                None => Ok(json!(s.authorized)),
            }),
            "eth_chainId" => self.with_state(|s| match s.query_error.clone() {
                Some(err) => Err(err),
                None => Ok(json!(format!("0x{:x}", s.chain_id))),
            }),
            "wallet_switchEthereumChain" => {
                let target = params[0]
                    .get("chainId")
                    .and_then(parse_chain_id)
                    .ok_or_else(|| ProviderError::new(-32602, "invalid params"))?;
                let emit = self.with_state(|s| {
                    if s.reject_switch {
                        return Err(ProviderError::new(
                            ProviderError::USER_REJECTED,
                            "User rejected the request.",
                        ));
                    }
                    if !s.known_chains.contains(&target) {
                        return Err(ProviderError::new(
                            ProviderError::UNRECOGNIZED_CHAIN,
                            "Unrecognized chain ID",
                        ));
                    }
                    s.chain_id = target;
                    Ok(s.emit_on_switch)
                })?;
                if emit {
                    let _ = self
                        .events
                        .send(ProviderEvent::ChainChanged(json!(format!("0x{:x}", target))));
                }
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let chain = params[0]
                    .get("chainId")
                    .and_then(parse_chain_id)
                    .ok_or_else(|| ProviderError::new(-32602, "invalid params"))?;
                self.with_state(|s| s.known_chains.insert(chain));
                Ok(Value::Null)
            }
            "eth_call" => {
                self.pause().await;
                self.eth_call(&params)
            }
            "eth_sendTransaction" => self.with_state(|s| {
                if let Some(err) = s.send_error.clone() {
                    return Err(err);
                }
                s.sent.push(params[0].clone());
                let hash = format!("0x{:064x}", s.next_hash);
                s.next_hash += 1;
                Ok(json!(hash))
            }),
            "eth_getTransactionReceipt" => {
                let hash = params[0].as_str().unwrap_or_default().to_lowercase();
                Ok(self.with_state(|s| s.receipts.get(&hash).cloned().unwrap_or(Value::Null)))
            }
            other => Err(ProviderError::new(4200, format!("unsupported method {}", other))),
        }
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.with_state(|s| {
            s.calls.push("disconnect".to_string());
            s.authorized.clear();
            match s.disconnect_error.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

/// 测试配置：短防抖、短轮询
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.wallet.target_chain_id = 56;
    config.wallet.rpc_url = "https://bsc-dataseed.binance.org/".to_string();
    config.wallet.confirmation_poll_ms = 10;
    config.balances.debounce_ms = 500;
    config.rates.fiat_code = "BRL".to_string();
    config.rates.fallback_fiat_per_usd = 5.0;
    config.rates.fallback_stablecoin_usd = 1.0;
    config.rates.fallback_token_usd = 0.1;
    // 不可达地址，价格源必然失败
    config.rates.exchange_rate_url = "http://127.0.0.1:9/latest.json".to_string();
    config.rates.token_price_url = "http://127.0.0.1:9/coin-info".to_string();
    config.rates.http_timeout_secs = 2;
    config.backend.base_url = "http://127.0.0.1:9".to_string();
    config.backend.bearer_token = None;
    config
}

/// 轮询等待条件成立
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
