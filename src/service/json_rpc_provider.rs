// 直连节点的只读 Provider
// 把 JSON-RPC 请求转发到 RPC 节点，账户为配置的观察地址；无法签名

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::provider::{ProviderEvent, WalletProvider};
use crate::domain::chain_config::parse_chain_id;
use crate::error::ProviderError;

// EIP-1193: 不支持的方法
const UNSUPPORTED_METHOD: i64 = 4200;

// 需要用户钱包签名或授权的方法
const SIGNING_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "wallet_addEthereumChain",
    "personal_sign",
    "eth_signTypedData_v4",
];

pub struct JsonRpcProvider {
    http_client: reqwest::Client,
    rpc_url: String,
    watch_address: String,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl JsonRpcProvider {
    pub fn new(rpc_url: impl Into<String>, watch_address: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let (events, _) = broadcast::channel(16);

        Self {
            http_client: client,
            rpc_url: rpc_url.into(),
            watch_address: watch_address.into(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    async fn forward(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::new(ProviderError::DISCONNECTED, format!("RPC request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::internal(format!(
                "RPC call failed with status: {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::internal(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = json.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or(ProviderError::INTERNAL);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(ProviderError::new(code, message));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| ProviderError::internal("Missing result field in RPC response"))
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            "eth_requestAccounts" | "eth_accounts" => Ok(json!([self.watch_address])),
            // 节点不能切链，只能确认已在目标链上
            "wallet_switchEthereumChain" => {
                let requested = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(parse_chain_id);
                let actual = parse_chain_id(&self.forward("eth_chainId", json!([])).await?);
                if requested.is_some() && requested == actual {
                    Ok(Value::Null)
                } else {
                    Err(ProviderError::new(
                        UNSUPPORTED_METHOD,
                        "RPC node cannot switch chains",
                    ))
                }
            }
            m if SIGNING_METHODS.contains(&m) => Err(ProviderError::new(
                ProviderError::USER_REJECTED,
                format!("{} requires a signing wallet", m),
            )),
            _ => self.forward(method, params).await,
        }
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
