//! 错误恢复引擎
//!
//! 根据 ReelError 类型返回 RecoveryAction，供展示层决定是「重试这一步」、重连、降级还是放弃，
//! 而不是一律「从头再来」。

use crate::core::{InvocationCause, RecoveryAction, ReelError};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ReelError) -> RecoveryAction {
        match err {
            ReelError::Connection { .. } => RecoveryAction::Reconnect,
            ReelError::ToolList(_) => RecoveryAction::UseFallback,
            ReelError::ToolInvocation(e) => match &e.cause {
                InvocationCause::Transport(_) => RecoveryAction::WaitAndRetry,
                InvocationCause::SessionClosed => RecoveryAction::Reconnect,
                InvocationCause::StreamTimeout { .. } => RecoveryAction::WaitAndRetry,
                InvocationCause::Rejected(_) => RecoveryAction::Abort,
                _ => RecoveryAction::AskUser(err.user_message()),
            },
            ReelError::StreamTimeout { .. } => RecoveryAction::WaitAndRetry,
            ReelError::PipelineStep(e) => RecoveryAction::RetryStep {
                index: e.index,
                step: e.step.clone(),
            },
            // 另一轮仍在执行，本次请求无需任何动作
            ReelError::AlreadyRunning(_) => RecoveryAction::Abort,
            ReelError::InvalidPipeline(_) | ReelError::Config(_) => RecoveryAction::Abort,
        }
    }
}
