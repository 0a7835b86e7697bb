//! 钱包会话与连接状态机

use std::fmt;

use serde::{Deserialize, Serialize};

/// 钱包会话
///
/// `epoch` 在每次会话变更（连接、换账户、换链、断开）时递增，
/// 异步任务提交结果前用它判断响应是否已过期。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    /// 主账户，小写 0x 十六进制
    pub address: String,
    pub chain_id: u64,
    pub connected: bool,
    pub epoch: u64,
}

impl WalletSession {
    pub fn new(address: &str, chain_id: u64, epoch: u64) -> Self {
        Self {
            address: address.to_lowercase(),
            chain_id,
            connected: true,
            epoch,
        }
    }

    pub fn is_on_chain(&self, chain_id: u64) -> bool {
        self.connected && self.chain_id == chain_id
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    /// 握手进行中（同一时间只允许一个）
    Connecting,
    Connected,
    /// 已连接但不在目标链上；余额和转账被阻止
    WrongNetwork,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::WrongNetwork => "wrong_network",
        }
    }

    /// 验证状态转换合法性
    pub fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;

        match (self, target) {
            (Disconnected, Connecting) => true,
            // 恢复已有会话时不经过握手
            (Disconnected, Connected) | (Disconnected, WrongNetwork) => true,

            (Connecting, Connected) | (Connecting, WrongNetwork) | (Connecting, Disconnected) => {
                true
            }

            (Connected, WrongNetwork) | (WrongNetwork, Connected) => true,
            (Connected, Disconnected) | (WrongNetwork, Disconnected) => true,

            // 同状态刷新（换账户）
            (Connected, Connected) | (WrongNetwork, WrongNetwork) => true,

            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
