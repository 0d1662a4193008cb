//! 心跳：后台探活与自愈重连
//!
//! 固定间隔触发；仅在 Connected 且空闲超过阈值时做一次绕过缓存的 tool listing。
//! 探活失败后进入指数退避重连（1s, 2s, 4s ... 上限 reconnect_max_delay），
//! 失败从不抛给调用方。任务只持有 Session 的弱引用，会话释放后自动退出。

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::connection::Session;
use crate::clock::Clock;
use crate::core::ConnectionStatus;

/// 后台心跳任务句柄
pub struct HeartbeatHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }

    /// 协作式停止：正在进行的探活不会被打断
    pub fn stop(&self) {
        self.token.cancel();
    }
}

/// 单次心跳的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// 未连接，不做任何事
    NotConnected,
    /// 最近有活动，跳过探活
    Fresh,
    Healthy,
    Reconnected { attempts: u32 },
    /// 重连次数耗尽，保持 Disconnected 直到下一次调用触发 connect
    Offline { attempts: u32 },
    /// 会话已 cleanup
    Closed,
}

pub(super) fn spawn(
    session: Weak<Session>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> HeartbeatHandle {
    let token = CancellationToken::new();
    let cancel = token.clone();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = clock.sleep(interval) => {}
            }
            let Some(session) = session.upgrade() else {
                break;
            };
            let outcome = session.heartbeat_tick().await;
            tracing::debug!(project_id = %session.project_id(), ?outcome, "heartbeat");
            if outcome == HeartbeatOutcome::Closed {
                break;
            }
        }
    });

    HeartbeatHandle { token, task }
}

/// 第 attempt 次（从 0 起）重连前的等待时间
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

impl Session {
    /// 执行一次心跳检查（后台任务按间隔调用；也可由测试直接驱动）
    pub async fn heartbeat_tick(&self) -> HeartbeatOutcome {
        if self.is_closed() {
            return HeartbeatOutcome::Closed;
        }

        let generation = self.generation();
        {
            let state = self.state.read().await;
            if state.status != ConnectionStatus::Connected {
                return HeartbeatOutcome::NotConnected;
            }
            let now = self.clock.now();
            let idle = state
                .last_activity_at
                .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
            if idle <= self.config.inactivity_threshold {
                return HeartbeatOutcome::Fresh;
            }
        }

        let result = self.transport.list_tools(self.project_id()).await;

        {
            let mut state = self.state.write().await;
            if self.generation() != generation {
                return HeartbeatOutcome::Closed;
            }
            // 探活期间调用方已接管连接（重试断开或重新 connect），结果作废
            if state.status != ConnectionStatus::Connected {
                return HeartbeatOutcome::NotConnected;
            }
            match result {
                Ok(tools) => {
                    state.cache.store(tools);
                    state.last_activity_at = Some(self.clock.now());
                    return HeartbeatOutcome::Healthy;
                }
                Err(e) => {
                    tracing::warn!(
                        project_id = %self.project_id(),
                        error = %e,
                        "Heartbeat health check failed, reconnecting"
                    );
                    state.last_error = Some(e);
                    self.mark_disconnected(&mut state);
                }
            }
        }

        self.reconnect_with_backoff(generation).await
    }

    async fn reconnect_with_backoff(&self, generation: u64) -> HeartbeatOutcome {
        let max_attempts = self.config.max_reconnect_attempts;

        for attempt in 1..=max_attempts {
            let delay = backoff_delay(
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
                attempt - 1,
            );
            self.clock.sleep(delay).await;

            if self.is_closed() || self.generation() != generation {
                return HeartbeatOutcome::Closed;
            }
            self.state.write().await.retry_attempts = attempt;

            match self.establish().await {
                Ok(()) => {
                    tracing::info!(
                        project_id = %self.project_id(),
                        attempts = attempt,
                        "Session reconnected"
                    );
                    return HeartbeatOutcome::Reconnected { attempts: attempt };
                }
                Err(e) => {
                    tracing::debug!(
                        project_id = %self.project_id(),
                        attempt,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                }
            }
        }

        tracing::warn!(
            project_id = %self.project_id(),
            attempts = max_attempts,
            "Giving up on reconnect until next call"
        );
        HeartbeatOutcome::Offline {
            attempts: max_attempts,
        }
    }
}
