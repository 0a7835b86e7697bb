//! 钱包 Provider 端口（EIP-1193 风格）
//!
//! 核心只通过 `request` + 事件流与钱包交互；具体实现可以是浏览器钱包桥、
//! WalletConnect 会话或直连节点的 JSON-RPC（见 `json_rpc_provider`）。

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::domain::chain_config::parse_chain_id;
use crate::error::ProviderError;

/// Provider 主动推送的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// 账户列表变化；空列表等同于断开
    AccountsChanged(Vec<String>),
    /// 链变化，钱包可能上报十六进制字符串或数字
    ChainChanged(Value),
    Disconnect(ProviderError),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// 发送 JSON-RPC 请求
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// 断开远端会话
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// 订阅 Provider 事件
    fn events(&self) -> broadcast::Receiver<ProviderEvent>;

    /// 握手：请求授权账户
    async fn enable(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.request("eth_requestAccounts", json!([])).await?;
        parse_accounts(&value)
    }

    /// 已授权账户（不弹窗）
    async fn accounts(&self) -> Result<Vec<String>, ProviderError> {
        let value = self.request("eth_accounts", json!([])).await?;
        parse_accounts(&value)
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let value = self.request("eth_chainId", json!([])).await?;
        parse_chain_id(&value)
            .ok_or_else(|| ProviderError::internal(format!("malformed chain id: {}", value)))
    }
}

/// 解析账户数组
pub fn parse_accounts(value: &Value) -> Result<Vec<String>, ProviderError> {
    let items = value
        .as_array()
        .ok_or_else(|| ProviderError::internal(format!("malformed accounts: {}", value)))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ProviderError::internal(format!("malformed account: {}", item)))
        })
        .collect()
}
