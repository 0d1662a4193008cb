//! 状态定义：连接状态与会话快照
//!
//! 会话内部状态由 Session 持有并在单个锁作用域内变更；外部只拿到轻量的 SessionSnapshot 投影。

use std::time::{Duration, Instant};

use serde::Serialize;

/// 会话连接状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// 会话状态快照（getStatus 的返回值）
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub project_id: String,
    pub status: ConnectionStatus,
    /// 本次连接已持续的时间
    #[serde(skip)]
    pub connected_since: Option<Instant>,
    /// 最近一次调用 / 探活的时间
    #[serde(skip)]
    pub last_activity_at: Option<Instant>,
    /// 心跳自愈过程中的重连次数，连接成功后归零
    pub retry_attempts: u32,
    pub cached_tools: usize,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// 距最近活动的时长；从未活动时返回 None
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.last_activity_at
            .map(|at| now.saturating_duration_since(at))
    }
}
