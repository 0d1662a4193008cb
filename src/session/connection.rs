//! 会话：连接状态、工具缓存、心跳句柄
//!
//! 每个项目（工作单元）一个 Session。所有状态变更都在同一个写锁作用域内完成，
//! 锁内不等待网络，因此心跳与业务调用并发时状态始终是「单写者」。
//! 连接成功的唯一途径是一次成功的 tool listing 探测；任何进入 Disconnected 的转换都会清空缓存。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};

use super::cache::ToolCache;
use super::heartbeat::{self, HeartbeatHandle};
use crate::clock::Clock;
use crate::config::SessionSection;
use crate::core::{ConnectionStatus, ReelError, SessionSnapshot, TransportError};
use crate::tools::{FallbackProvider, ToolDefinition};
use crate::transport::ToolTransport;

/// 会话运行参数（心跳间隔、不活跃阈值、重连退避）
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    /// 超过该时长无活动，心跳才会发起探活
    pub inactivity_threshold: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
    /// 关闭后 connect 不会启动后台心跳（测试中手动调用 heartbeat_tick）
    pub heartbeat_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            inactivity_threshold: Duration::from_secs(120),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            heartbeat_enabled: true,
        }
    }
}

impl From<&SessionSection> for SessionConfig {
    fn from(section: &SessionSection) -> Self {
        let interval = Duration::from_millis(section.heartbeat_interval_ms.max(1));
        Self {
            heartbeat_interval: interval,
            inactivity_threshold: interval.saturating_mul(section.inactivity_multiplier.max(1)),
            reconnect_base_delay: Duration::from_millis(section.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(section.reconnect_max_delay_ms),
            max_reconnect_attempts: section.max_reconnect_attempts,
            heartbeat_enabled: section.heartbeat_enabled,
        }
    }
}

pub(super) struct SessionState {
    pub(super) status: ConnectionStatus,
    pub(super) connected_since: Option<Instant>,
    pub(super) last_activity_at: Option<Instant>,
    pub(super) retry_attempts: u32,
    pub(super) last_error: Option<TransportError>,
    pub(super) cache: ToolCache,
    pub(super) heartbeat: Option<HeartbeatHandle>,
}

/// 单个项目到工具后端的连接会话
pub struct Session {
    project_id: String,
    pub(super) transport: Arc<dyn ToolTransport>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: SessionConfig,
    pub(super) state: RwLock<SessionState>,
    status_tx: watch::Sender<ConnectionStatus>,
    /// cleanup 时递增；在途请求据此丢弃结果
    generation: AtomicU64,
    /// cleanup 后为 true，直到下一次显式 connect
    closed: AtomicBool,
    me: Weak<Session>,
}

impl Session {
    pub fn new(
        project_id: impl Into<String>,
        transport: Arc<dyn ToolTransport>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Arc::new_cyclic(|me| Self {
            project_id: project_id.into(),
            transport,
            clock,
            config,
            state: RwLock::new(SessionState {
                status: ConnectionStatus::Disconnected,
                connected_since: None,
                last_activity_at: None,
                retry_attempts: 0,
                last_error: None,
                cache: ToolCache::new(),
                heartbeat: None,
            }),
            status_tx,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            me: me.clone(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn ToolTransport> {
        &self.transport
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 当前连接状态（同步读取）
    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// 订阅状态变化（展示层的连接指示灯）
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// getStatus：会话状态快照
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            project_id: self.project_id.clone(),
            status: state.status,
            connected_since: state.connected_since,
            last_activity_at: state.last_activity_at,
            retry_attempts: state.retry_attempts,
            cached_tools: state.cache.len(),
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }

    /// 建立连接：已连接时直接返回；已有连接在进行时等待其结果而不再发起探测；
    /// 否则以一次 tool listing 作为连通性探测。失败不在内部重试。
    pub async fn connect(&self) -> Result<(), ReelError> {
        self.closed.store(false, Ordering::SeqCst);
        self.establish().await?;
        self.ensure_heartbeat().await;
        Ok(())
    }

    /// 工具调用前的连接：会话已 cleanup 时拒绝自动重连
    pub(crate) async fn connect_for_call(&self) -> Result<(), ReelError> {
        if self.is_closed() {
            return Err(self.connection_error(TransportError::Cancelled));
        }
        self.establish().await?;
        self.ensure_heartbeat().await;
        Ok(())
    }

    pub(super) async fn establish(&self) -> Result<(), ReelError> {
        let pending = {
            let mut state = self.state.write().await;
            match state.status {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Connecting => Some(self.status_tx.subscribe()),
                ConnectionStatus::Disconnected => {
                    self.set_status(&mut state, ConnectionStatus::Connecting);
                    None
                }
            }
        };

        match pending {
            Some(rx) => self.await_pending_connect(rx).await,
            None => self
                .probe()
                .await
                .map_err(|source| self.connection_error(source)),
        }
    }

    async fn await_pending_connect(
        &self,
        mut rx: watch::Receiver<ConnectionStatus>,
    ) -> Result<(), ReelError> {
        tracing::debug!(project_id = %self.project_id, "connect already in progress, waiting");
        let settled = rx
            .wait_for(|status| *status != ConnectionStatus::Connecting)
            .await
            .map(|status| *status);
        match settled {
            Ok(ConnectionStatus::Connected) => Ok(()),
            _ => {
                let source = self
                    .state
                    .read()
                    .await
                    .last_error
                    .clone()
                    .unwrap_or(TransportError::Cancelled);
                Err(self.connection_error(source))
            }
        }
    }

    /// 连通性探测：调用方已把状态置为 Connecting
    async fn probe(&self) -> Result<(), TransportError> {
        let generation = self.generation();
        let result = self.transport.list_tools(&self.project_id).await;

        let mut state = self.state.write().await;
        if self.generation() != generation {
            tracing::debug!(project_id = %self.project_id, "discarding probe result after cleanup");
            return Err(TransportError::Cancelled);
        }
        match result {
            Ok(tools) => {
                let now = self.clock.now();
                state.cache.store(tools);
                state.connected_since = Some(now);
                state.last_activity_at = Some(now);
                state.retry_attempts = 0;
                state.last_error = None;
                self.set_status(&mut state, ConnectionStatus::Connected);
                tracing::info!(
                    project_id = %self.project_id,
                    tools = state.cache.len(),
                    "Connected to tool backend"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(project_id = %self.project_id, error = %e, "Connect probe failed");
                state.last_error = Some(e.clone());
                self.mark_disconnected(&mut state);
                Err(e)
            }
        }
    }

    async fn ensure_heartbeat(&self) {
        if !self.config.heartbeat_enabled {
            return;
        }
        let mut state = self.state.write().await;
        if state.heartbeat.as_ref().is_some_and(HeartbeatHandle::is_running) {
            return;
        }
        state.heartbeat = Some(heartbeat::spawn(
            self.me.clone(),
            Arc::clone(&self.clock),
            self.config.heartbeat_interval,
        ));
    }

    /// listTools：有缓存直接返回，否则拉取并写入缓存
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ReelError> {
        if self.is_closed() {
            return Err(ReelError::ToolList(TransportError::Cancelled));
        }
        if let Some(tools) = self.state.read().await.cache.get() {
            return Ok(tools.to_vec());
        }

        let generation = self.generation();
        let tools = self
            .transport
            .list_tools(&self.project_id)
            .await
            .map_err(|e| {
                tracing::warn!(project_id = %self.project_id, error = %e, "Tool listing failed");
                ReelError::ToolList(e)
            })?;

        let mut state = self.state.write().await;
        if self.generation() != generation {
            return Err(ReelError::ToolList(TransportError::Cancelled));
        }
        state.cache.store(tools.clone());
        state.last_activity_at = Some(self.clock.now());
        Ok(tools)
    }

    /// listTools 失败时退回调用方提供的静态工具目录
    pub async fn list_tools_or_fallback(
        &self,
        fallback: &dyn FallbackProvider,
    ) -> Vec<ToolDefinition> {
        match self.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(
                    project_id = %self.project_id,
                    error = %e,
                    "Using built-in tool definitions"
                );
                fallback.tool_definitions()
            }
        }
    }

    pub async fn invalidate_cache(&self) {
        self.state.write().await.cache.clear();
    }

    /// 停止心跳、清空缓存、置为 Disconnected；可重复调用。在途请求不中断，但其结果会被丢弃。
    pub async fn cleanup(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        if let Some(handle) = state.heartbeat.take() {
            handle.stop();
        }
        state.retry_attempts = 0;
        self.mark_disconnected(&mut state);
        tracing::info!(project_id = %self.project_id, "Session cleaned up");
    }

    /// 调用重试前强制断开；正在连接中时不打断
    pub(crate) async fn force_disconnect(&self) {
        let mut state = self.state.write().await;
        if state.status != ConnectionStatus::Connecting {
            self.mark_disconnected(&mut state);
        }
    }

    /// 记录一次活动（调用成功或失败都算）
    pub(crate) async fn touch(&self) {
        self.state.write().await.last_activity_at = Some(self.clock.now());
    }

    pub(super) fn mark_disconnected(&self, state: &mut SessionState) {
        if state.status == ConnectionStatus::Connected {
            tracing::info!(project_id = %self.project_id, "Disconnected from tool backend");
        }
        state.connected_since = None;
        state.cache.clear();
        self.set_status(state, ConnectionStatus::Disconnected);
    }

    fn set_status(&self, state: &mut SessionState, status: ConnectionStatus) {
        if state.status != status {
            tracing::debug!(
                project_id = %self.project_id,
                from = %state.status,
                to = %status,
                "session status"
            );
        }
        state.status = status;
        self.status_tx.send_replace(status);
    }

    fn connection_error(&self, source: TransportError) -> ReelError {
        ReelError::Connection {
            project_id: self.project_id.clone(),
            source,
        }
    }
}
