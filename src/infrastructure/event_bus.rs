// Event Bus
// 会话事件的发布/订阅，基于 tokio broadcast：每个订阅者按发布顺序收到全部事件

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::ConnectionState;

// ============ 事件类型定义 ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    Connected {
        address: String,
        chain_id: u64,
        epoch: u64,
    },
    AccountChanged {
        address: String,
        epoch: u64,
    },
    ChainChanged {
        chain_id: u64,
        epoch: u64,
    },
    /// 连接状态变化（Connected <-> WrongNetwork）
    NetworkStatus {
        state: ConnectionState,
        chain_id: u64,
        epoch: u64,
    },
    Disconnected {
        epoch: u64,
    },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "Connected",
            Self::AccountChanged { .. } => "AccountChanged",
            Self::ChainChanged { .. } => "ChainChanged",
            Self::NetworkStatus { .. } => "NetworkStatus",
            Self::Disconnected { .. } => "Disconnected",
        }
    }

    pub fn epoch(&self) -> u64 {
        match self {
            Self::Connected { epoch, .. }
            | Self::AccountChanged { epoch, .. }
            | Self::ChainChanged { epoch, .. }
            | Self::NetworkStatus { epoch, .. }
            | Self::Disconnected { epoch } => *epoch,
        }
    }

    /// 该事件是否使已有余额快照失效
    pub fn invalidates_balances(&self) -> bool {
        !matches!(self, Self::NetworkStatus { .. })
    }
}

// ============ Event Bus 接口 ============

pub trait EventBus: Send + Sync {
    /// 发布事件，返回收到事件的订阅者数量
    ///
    /// 同步调用：状态变更与事件发布之间没有 await 点。
    fn publish(&self, event: SessionEvent) -> usize;

    /// 订阅后续事件
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

// ============ broadcast 实现 ============

const DEFAULT_CAPACITY: usize = 64;

pub struct BroadcastEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: SessionEvent) -> usize {
        tracing::debug!(event_type = event.event_type(), epoch = event.epoch(), "Publishing session event");
        // 没有订阅者时 send 返回错误，属于正常情况
        self.sender.send(event).unwrap_or(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}
