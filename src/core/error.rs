//! 错误类型与恢复动作
//!
//! 分层：TransportError（通道层）→ InvocationCause / ToolInvocationError（单次工具调用）
//! → ReelError（会话、流式轮询、流水线）。与 RecoveryEngine 配合：根据 ReelError 决定
//! RetryStep / Reconnect / WaitAndRetry / UseFallback / AskUser / Abort。

use thiserror::Error;

/// 通道层错误：网络、超时、HTTP 状态、响应解码、后端拒绝
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// 后端返回 `{success: false, error}`（仅用于 list_tools 等非工具结果的操作）
    #[error("Backend rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    /// 请求结果被丢弃（会话已 cleanup）
    #[error("Request discarded: session closed")]
    Cancelled,
}

/// 工具调用失败的具体原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationCause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 工具自身报告的失败（不重试）
    #[error("tool reported failure: {0}")]
    ToolReported(String),

    #[error("missing field `{0}` in tool response")]
    MissingField(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("stream {stream_id} did not complete within {polls} polls")]
    StreamTimeout { stream_id: String, polls: u32 },

    #[error("session closed")]
    SessionClosed,

    /// 请求未发出：编排层拒绝（同一工作单元正在运行、流水线或配置无效）
    #[error("rejected before dispatch: {0}")]
    Rejected(String),
}

/// 单个工具调用的最终失败：始终携带原始工具名
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tool `{tool}` failed: {cause}")]
pub struct ToolInvocationError {
    pub tool: String,
    #[source]
    pub cause: InvocationCause,
}

impl ToolInvocationError {
    pub fn new(tool: impl Into<String>, cause: impl Into<InvocationCause>) -> Self {
        Self {
            tool: tool.into(),
            cause: cause.into(),
        }
    }

    /// 是否为通道层（可重试）失败
    pub fn is_transport(&self) -> bool {
        matches!(self.cause, InvocationCause::Transport(_))
    }
}

/// 流水线某一步失败：步骤序号、步骤名与底层工具调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Step {index} `{step}` failed: {source}")]
pub struct PipelineStepError {
    pub index: usize,
    pub step: String,
    #[source]
    pub source: ToolInvocationError,
}

/// 库对外的统一错误类型
#[derive(Error, Debug, Clone)]
pub enum ReelError {
    #[error("Connection to project {project_id} failed: {source}")]
    Connection {
        project_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Tool listing failed: {0}")]
    ToolList(#[source] TransportError),

    #[error(transparent)]
    ToolInvocation(#[from] ToolInvocationError),

    #[error("Stream {stream_id} of tool `{tool}` did not complete within {polls} polls")]
    StreamTimeout {
        tool: String,
        stream_id: String,
        polls: u32,
    },

    #[error("Pipeline already running for work unit {0}")]
    AlreadyRunning(String),

    #[error(transparent)]
    PipelineStep(#[from] PipelineStepError),

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ReelError {
    /// 折叠为某个工具的调用错误（流水线把每一步的失败统一包装为 PipelineStepError）
    pub fn into_invocation(self, tool: &str) -> ToolInvocationError {
        match self {
            ReelError::ToolInvocation(e) => e,
            ReelError::PipelineStep(e) => e.source,
            ReelError::Connection { source, .. } | ReelError::ToolList(source) => {
                ToolInvocationError::new(tool, source)
            }
            ReelError::StreamTimeout {
                stream_id, polls, ..
            } => ToolInvocationError::new(tool, InvocationCause::StreamTimeout { stream_id, polls }),
            other @ (ReelError::AlreadyRunning(_)
            | ReelError::InvalidPipeline(_)
            | ReelError::Config(_)) => {
                ToolInvocationError::new(tool, InvocationCause::Rejected(other.to_string()))
            }
        }
    }

    /// 面向最终用户的提示文案（展示层直接使用）
    pub fn user_message(&self) -> String {
        match self {
            ReelError::Connection { .. } => {
                "Could not reach the generation service. Check your connection and try again."
                    .to_string()
            }
            ReelError::ToolList(_) => {
                "The list of available tools could not be loaded; showing the built-in set."
                    .to_string()
            }
            ReelError::ToolInvocation(e) => invocation_message(e),
            ReelError::StreamTimeout { tool, .. } => format!(
                "{} is taking longer than expected. It may still finish; try again in a moment.",
                humanize_tool(tool)
            ),
            ReelError::AlreadyRunning(_) => {
                "Assets are already being generated for this item. Wait for the current run to finish."
                    .to_string()
            }
            ReelError::PipelineStep(e) => format!(
                "Step {} ({}) failed: {} You can retry this step.",
                e.index + 1,
                e.step.replace('_', " "),
                invocation_message(&e.source)
            ),
            ReelError::InvalidPipeline(msg) => format!("The pipeline is misconfigured: {msg}"),
            ReelError::Config(msg) => format!("Configuration problem: {msg}"),
        }
    }
}

fn invocation_message(e: &ToolInvocationError) -> String {
    let tool = humanize_tool(&e.tool);
    match &e.cause {
        InvocationCause::Transport(_) => {
            format!("{tool} could not be completed because the service is unreachable.")
        }
        InvocationCause::ToolReported(msg) => format!("{tool} failed: {msg}."),
        InvocationCause::MissingField(field) => {
            format!("{tool} returned an incomplete result (no {field}).")
        }
        InvocationCause::InvalidParameters(msg) => format!("{tool} could not start: {msg}."),
        InvocationCause::StreamTimeout { .. } => format!("{tool} timed out."),
        InvocationCause::SessionClosed => format!("{tool} was cancelled."),
        InvocationCause::Rejected(msg) => format!("{tool} was not started: {msg}."),
    }
}

/// `generate_scene_video` -> `Generate scene video`
fn humanize_tool(tool: &str) -> String {
    let spaced = tool.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 从失败的步骤继续（之前已完成的步骤保留）
    RetryStep { index: usize, step: String },
    /// 重新建立连接
    Reconnect,
    /// 稍后原样重试
    WaitAndRetry,
    /// 使用内置工具列表 / 占位结果降级运行
    UseFallback,
    /// 需要用户决策（工具自身报错、参数不全等）
    AskUser(String),
    /// 放弃当前操作
    Abort,
}
