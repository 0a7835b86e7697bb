//! 钱包连接管理
//!
//! 持有唯一的钱包会话：握手、恢复、断开、目标链强制，以及 Provider 事件处理。
//! 会话的每次变更都在同步代码中完成（写锁内不 await），随后立即发布 `SessionEvent`，
//! 因此任何进行中的异步任务在提交结果前都能看到最新的 epoch。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::provider::{ProviderEvent, WalletProvider};
use crate::domain::chain_config::parse_chain_id;
use crate::domain::{ChainDescriptor, ConnectionState, WalletSession};
use crate::error::{ConnectionError, NetworkError, ProviderError};
use crate::infrastructure::event_bus::{EventBus, SessionEvent};
use crate::infrastructure::log_sanitizer::{mask_address, sanitize_message};
use crate::utils::address_validator::AddressValidator;

/// 校验钱包上报的账户，返回小写地址
fn checked_account(raw: &str) -> Result<String, ProviderError> {
    let raw = raw.trim();
    if !AddressValidator::is_evm_address(raw) {
        return Err(ProviderError::internal("wallet returned an invalid account"));
    }
    Ok(raw.to_lowercase())
}

struct Inner {
    state: ConnectionState,
    session: Option<WalletSession>,
    /// 单调递增，每次会话变更 +1
    epoch: u64,
}

/// 握手进行中标记，离开作用域时自动清除
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ConnectionManager {
    provider: Arc<dyn WalletProvider>,
    chain: ChainDescriptor,
    bus: Arc<dyn EventBus>,
    inner: RwLock<Inner>,
    connecting: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        chain: ChainDescriptor,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            provider,
            chain,
            bus,
            inner: RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                session: None,
                epoch: 0,
            }),
            connecting: AtomicBool::new(false),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ============ 查询 ============

    pub fn provider(&self) -> Arc<dyn WalletProvider> {
        self.provider.clone()
    }

    pub fn target_chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    pub fn state(&self) -> ConnectionState {
        self.read().state
    }

    pub fn session(&self) -> Option<WalletSession> {
        self.read().session.clone()
    }

    pub fn current_epoch(&self) -> u64 {
        self.read().epoch
    }

    /// 已连接且在目标链上时返回会话
    pub fn ready_session(&self) -> Option<WalletSession> {
        let inner = self.read();
        match (&inner.state, &inner.session) {
            (ConnectionState::Connected, Some(session))
                if session.is_on_chain(self.chain.chain_id) =>
            {
                Some(session.clone())
            }
            _ => None,
        }
    }

    /// 要求会话在目标链上
    pub fn require_target_chain(&self) -> Result<WalletSession, NetworkError> {
        let inner = self.read();
        match &inner.session {
            Some(session) if session.is_on_chain(self.chain.chain_id) => Ok(session.clone()),
            Some(session) => Err(NetworkError::WrongNetwork {
                expected: self.chain.chain_id,
                actual: session.chain_id,
            }),
            None => Err(NetworkError::WrongNetwork {
                expected: self.chain.chain_id,
                actual: 0,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    // ============ 状态转换 ============

    fn set_state(&self, inner: &mut Inner, target: ConnectionState) -> bool {
        if !inner.state.can_transition_to(&target) {
            tracing::warn!(
                from = %inner.state,
                to = %target,
                "Rejected illegal connection state transition"
            );
            return false;
        }
        inner.state = target;
        true
    }

    fn network_state(&self, chain_id: u64) -> ConnectionState {
        if chain_id == self.chain.chain_id {
            ConnectionState::Connected
        } else {
            ConnectionState::WrongNetwork
        }
    }

    /// 建立会话（握手或恢复成功后）
    fn establish(&self, address: &str, chain_id: u64) -> Option<WalletSession> {
        let session = {
            let mut inner = self.write();
            let state = self.network_state(chain_id);
            if !self.set_state(&mut inner, state) {
                return None;
            }
            inner.epoch += 1;
            let session = WalletSession::new(address, chain_id, inner.epoch);
            inner.session = Some(session.clone());
            session
        };

        tracing::info!(
            address = %mask_address(&session.address),
            chain_id,
            epoch = session.epoch,
            "Wallet session established"
        );
        self.bus.publish(SessionEvent::Connected {
            address: session.address.clone(),
            chain_id,
            epoch: session.epoch,
        });
        Some(session)
    }

    /// 本地清理会话；已断开时不做任何事
    fn teardown(&self, reason: &str) -> bool {
        let epoch = {
            let mut inner = self.write();
            if inner.state == ConnectionState::Disconnected && inner.session.is_none() {
                return false;
            }
            inner.state = ConnectionState::Disconnected;
            inner.session = None;
            inner.epoch += 1;
            inner.epoch
        };

        tracing::info!(reason, epoch, "Wallet session torn down");
        self.bus.publish(SessionEvent::Disconnected { epoch });
        true
    }

    fn apply_accounts(&self, accounts: &[String]) {
        let Some(first) = accounts.first() else {
            self.teardown("accounts_empty");
            return;
        };
        let Ok(address) = checked_account(first) else {
            tracing::warn!(
                address = %mask_address(first),
                "Ignoring accountsChanged with invalid account"
            );
            return;
        };

        let epoch = {
            let mut inner = self.write();
            let epoch = inner.epoch + 1;
            match inner.session.as_mut() {
                Some(session) if session.address != address => {
                    session.address = address.clone();
                    session.epoch = epoch;
                }
                Some(_) => return,
                None => {
                    tracing::debug!("Ignoring accountsChanged without a session");
                    return;
                }
            }
            inner.epoch = epoch;
            epoch
        };

        tracing::info!(address = %mask_address(&address), epoch, "Wallet account changed");
        self.bus.publish(SessionEvent::AccountChanged { address, epoch });
    }

    /// 应用链变化，返回新的连接状态（无会话或未变化时返回 None）
    fn apply_chain(&self, chain_id: u64) -> Option<ConnectionState> {
        let (epoch, previous, state) = {
            let mut inner = self.write();
            let epoch = inner.epoch + 1;
            match inner.session.as_mut() {
                Some(session) if session.chain_id != chain_id => {
                    session.chain_id = chain_id;
                    session.epoch = epoch;
                }
                _ => return None,
            }
            inner.epoch = epoch;
            let previous = inner.state;
            let state = self.network_state(chain_id);
            self.set_state(&mut inner, state);
            (epoch, previous, inner.state)
        };

        tracing::info!(chain_id, epoch, state = %state, "Wallet chain changed");
        self.bus.publish(SessionEvent::ChainChanged { chain_id, epoch });
        if previous != state {
            self.bus.publish(SessionEvent::NetworkStatus {
                state,
                chain_id,
                epoch,
            });
        }
        Some(state)
    }

    // ============ 操作 ============

    /// 发起钱包握手
    ///
    /// 同一时间只允许一个握手；并发调用立即返回 `AlreadyConnecting`。
    /// 握手成功后读取链ID并强制切换到目标链，切链失败时会话保持在 `WrongNetwork`。
    pub async fn connect(&self) -> Result<String, ConnectionError> {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("Wallet connection already in progress");
            return Err(ConnectionError::AlreadyConnecting);
        }
        let _guard = ConnectingGuard(&self.connecting);

        let start_epoch = {
            let mut inner = self.write();
            if let Some(session) = inner.session.as_ref() {
                return Ok(session.address.clone());
            }
            self.set_state(&mut inner, ConnectionState::Connecting);
            inner.epoch
        };

        tracing::info!("Starting wallet handshake");
        let handshake = async {
            let accounts = self.provider.enable().await?;
            let address = accounts
                .first()
                .ok_or_else(|| ProviderError::internal("wallet returned no accounts"))
                .and_then(|first| checked_account(first))?;
            let chain_id = self.provider.chain_id().await?;
            Ok::<_, ProviderError>((address, chain_id))
        };

        let (address, chain_id) = match handshake.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    code = e.code,
                    message = %sanitize_message(&e.message),
                    "Wallet handshake failed"
                );
                let mut inner = self.write();
                if inner.state == ConnectionState::Connecting {
                    inner.state = ConnectionState::Disconnected;
                }
                return Err(e.into());
            }
        };

        // 握手期间被 disconnect() 取消
        if self.current_epoch() != start_epoch || self.state() != ConnectionState::Connecting {
            return Err(ConnectionError::ProviderUnavailable(
                "connection cancelled".to_string(),
            ));
        }

        let session = self
            .establish(&address, chain_id)
            .ok_or_else(|| ConnectionError::ProviderUnavailable("invalid session state".into()))?;

        if chain_id != self.chain.chain_id {
            if let Err(e) = self.enforce_chain(self.chain.chain_id).await {
                tracing::warn!(error = %e, code = e.code(), "Connected on wrong network");
            }
        }

        Ok(session.address)
    }

    /// 恢复已授权的会话（不弹窗）
    ///
    /// Provider 未上报账户时返回 `Ok(None)`；恢复过程中出错会清理本地会话。
    pub async fn restore_if_present(&self) -> Result<Option<String>, ConnectionError> {
        if let Some(session) = self.session() {
            return Ok(Some(session.address));
        }

        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConnectionError::AlreadyConnecting);
        }
        let _guard = ConnectingGuard(&self.connecting);

        let restored = async {
            let accounts = self.provider.accounts().await?;
            let Some(first) = accounts.first() else {
                return Ok(None);
            };
            let address = checked_account(first)?;
            let chain_id = self.provider.chain_id().await?;
            Ok::<_, ProviderError>(Some((address, chain_id)))
        };

        let (address, chain_id) = match restored.await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(code = e.code, "Session restore failed");
                self.teardown("restore_failed");
                return Err(e.into());
            }
        };

        let Some(session) = self.establish(&address, chain_id) else {
            return Ok(None);
        };

        if chain_id != self.chain.chain_id {
            if let Err(e) = self.enforce_chain(self.chain.chain_id).await {
                tracing::warn!(error = %e, code = e.code(), "Restored session on wrong network");
            }
        }

        Ok(Some(session.address))
    }

    /// 断开连接（幂等）：远端断开尽力而为，本地清理必定执行
    pub async fn disconnect(&self) {
        if self.state() == ConnectionState::Disconnected && self.session().is_none() {
            return;
        }

        if let Err(e) = self.provider.disconnect().await {
            tracing::warn!(
                code = e.code,
                message = %sanitize_message(&e.message),
                "Remote disconnect failed, tearing down locally"
            );
        }

        self.teardown("user_disconnect");
    }

    /// 强制切换到目标链；钱包不认识该链（4902）时先添加再切换
    pub async fn enforce_chain(&self, target: u64) -> Result<(), NetworkError> {
        // 失败时会话状态不变：链ID不是目标链的会话本来就处于 WrongNetwork
        self.switch_chain(target).await?;
        self.apply_chain(target);
        Ok(())
    }

    async fn switch_chain(&self, target: u64) -> Result<(), NetworkError> {
        let switch_params = ChainDescriptor::switch_params(target);

        let err = match self
            .provider
            .request("wallet_switchEthereumChain", switch_params.clone())
            .await
        {
            Ok(_) => {
                tracing::info!(chain_id = target, "Switched wallet chain");
                return Ok(());
            }
            Err(e) => e,
        };

        if !err.is_unrecognized_chain() {
            return Err(NetworkError::ChainSwitchFailed {
                chain_id: target,
                source: err,
            });
        }

        if target != self.chain.chain_id {
            return Err(NetworkError::ChainAddFailed {
                chain_id: target,
                source: ProviderError::new(
                    ProviderError::UNRECOGNIZED_CHAIN,
                    "no descriptor for chain",
                ),
            });
        }

        tracing::info!(chain_id = target, "Chain unknown to wallet, adding it");
        self.provider
            .request("wallet_addEthereumChain", self.chain.add_chain_params())
            .await
            .map_err(|source| NetworkError::ChainAddFailed {
                chain_id: target,
                source,
            })?;

        self.provider
            .request("wallet_switchEthereumChain", switch_params)
            .await
            .map_err(|source| NetworkError::ChainSwitchFailed {
                chain_id: target,
                source,
            })?;

        tracing::info!(chain_id = target, "Added and switched wallet chain");
        Ok(())
    }

    /// 处理单个 Provider 事件
    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.apply_accounts(&accounts),
            ProviderEvent::ChainChanged(raw) => {
                let Some(chain_id) = parse_chain_id(&raw) else {
                    tracing::warn!(chain = %raw, "Ignoring malformed chainChanged");
                    return;
                };
                if self.apply_chain(chain_id) == Some(ConnectionState::WrongNetwork) {
                    if let Err(e) = self.enforce_chain(self.chain.chain_id).await {
                        tracing::warn!(error = %e, code = e.code(), "Failed to return to target chain");
                    }
                }
            }
            ProviderEvent::Disconnect(err) => {
                tracing::warn!(
                    code = err.code,
                    message = %sanitize_message(&err.message),
                    "Wallet provider disconnected"
                );
                self.teardown("provider_disconnect");
            }
        }
    }

    /// 启动事件泵：按发射顺序逐个处理 Provider 事件
    pub fn spawn_event_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.provider.events();
        let manager = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => manager.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Provider event pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Provider event stream closed");
                        break;
                    }
                }
            }
        })
    }
}
