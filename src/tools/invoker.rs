//! 工具调用器
//!
//! 持有 Session 与重试配置。call_tool(name, parameters)：未连接时先 connect；
//! 通道故障时强制断开、等待固定间隔后整体重试（含重新 connect），最多 max_attempts 次。
//! 工具自身报告的失败不重试，原样返回。每次调用输出结构化审计日志（JSON）。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::InvokerSection;
use crate::core::{InvocationCause, ToolInvocationError, TransportError};
use crate::session::Session;
use crate::tools::{StreamStart, ToolCallResult};

/// 调用重试参数（固定间隔，不做指数退避）
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1500),
        }
    }
}

impl From<&InvokerSection> for InvokerConfig {
    fn from(section: &InvokerSection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            retry_delay: Duration::from_millis(section.retry_delay_ms),
        }
    }
}

/// 单会话上的工具调用器
#[derive(Clone)]
pub struct ToolInvoker {
    session: Arc<Session>,
    config: InvokerConfig,
}

impl ToolInvoker {
    pub fn new(session: Arc<Session>, config: InvokerConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn project_id(&self) -> &str {
        self.session.project_id()
    }

    /// 调用工具；`Ok(ToolCallResult::Failure)` 表示工具自身报错
    pub async fn call_tool(
        &self,
        name: &str,
        parameters: Value,
    ) -> Result<ToolCallResult, ToolInvocationError> {
        let transport = self.session.transport();
        let project_id = self.session.project_id();
        let result = self
            .with_retry(name, &parameters, |params| {
                transport.call_tool(project_id, name, params)
            })
            .await;
        self.audit(name, &parameters, &result);
        result.map(|(r, _)| r).map_err(|(e, _)| e)
    }

    /// 发起流式调用（与 call_tool 相同的重试语义）
    pub(crate) async fn start_stream(
        &self,
        name: &str,
        parameters: Value,
    ) -> Result<StreamStart, ToolInvocationError> {
        let transport = self.session.transport();
        let project_id = self.session.project_id();
        let result = self
            .with_retry(name, &parameters, |params| {
                transport.call_tool_stream(project_id, name, params)
            })
            .await;
        self.audit_stream(name, &parameters, &result);
        result.map(|(r, _)| r).map_err(|(e, _)| e)
    }

    /// 执行 op，通道故障时重试；返回结果与所用尝试次数
    async fn with_retry<T, F, Fut>(
        &self,
        tool: &str,
        parameters: &Value,
        mut op: F,
    ) -> Result<(T, u32), (ToolInvocationError, u32)>
    where
        F: FnMut(Value) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_cause = InvocationCause::SessionClosed;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.session.force_disconnect().await;
                self.session.clock().sleep(self.config.retry_delay).await;
            }
            if self.session.is_closed() {
                return Err((
                    ToolInvocationError::new(tool, InvocationCause::SessionClosed),
                    attempt,
                ));
            }

            if let Err(e) = self.session.connect_for_call().await {
                self.session.touch().await;
                last_cause = e.into_invocation(tool).cause;
                tracing::warn!(tool, attempt, cause = %last_cause, "Connect before call failed");
                continue;
            }

            let generation = self.session.generation();
            let result = op(parameters.clone()).await;

            if self.session.generation() != generation {
                tracing::debug!(tool, "discarding call result after session cleanup");
                return Err((
                    ToolInvocationError::new(tool, InvocationCause::SessionClosed),
                    attempt,
                ));
            }
            self.session.touch().await;

            match result {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => {
                    tracing::warn!(tool, attempt, max_attempts, error = %e, "Tool call transport failure");
                    last_cause = InvocationCause::Transport(e);
                }
            }
        }

        Err((ToolInvocationError::new(tool, last_cause), max_attempts))
    }

    fn audit(
        &self,
        tool: &str,
        parameters: &Value,
        result: &Result<(ToolCallResult, u32), (ToolInvocationError, u32)>,
    ) {
        let (outcome, attempts) = match result {
            Ok((ToolCallResult::Success(_), n)) => ("ok", *n),
            Ok((ToolCallResult::Failure(_), n)) => ("tool_error", *n),
            Err((e, n)) => (error_outcome(e), *n),
        };
        self.emit_audit(tool, "call", outcome, attempts, parameters);
    }

    fn audit_stream(
        &self,
        tool: &str,
        parameters: &Value,
        result: &Result<(StreamStart, u32), (ToolInvocationError, u32)>,
    ) {
        let (outcome, attempts) = match result {
            Ok((StreamStart::Handle(_), n)) => ("stream_started", *n),
            Ok((StreamStart::Immediate(r), n)) if r.is_success() => ("ok", *n),
            Ok((StreamStart::Immediate(_), n)) => ("tool_error", *n),
            Err((e, n)) => (error_outcome(e), *n),
        };
        self.emit_audit(tool, "stream", outcome, attempts, parameters);
    }

    fn emit_audit(&self, tool: &str, mode: &str, outcome: &str, attempts: u32, parameters: &Value) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "project_id": self.session.project_id(),
            "tool": tool,
            "mode": mode,
            "ok": outcome == "ok" || outcome == "stream_started",
            "outcome": outcome,
            "attempts": attempts,
            "args_preview": args_preview(parameters),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
    }
}

fn error_outcome(e: &ToolInvocationError) -> &'static str {
    match e.cause {
        InvocationCause::SessionClosed => "closed",
        _ => "transport_error",
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
