//! 工具后端通道抽象
//!
//! 所有通道（HTTP / 脚本化 Mock）实现 ToolTransport：list_tools、call_tool、
//! call_tool_stream、get_stream_result 四个操作，均以 project_id 为作用域。

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::TransportError;
use crate::tools::{StreamPoll, StreamStart, ToolCallResult, ToolDefinition};

pub use http::HttpTransport;
pub use mock::{Operation, ScriptedTransport};

/// 工具后端通道 trait
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self, project_id: &str) -> Result<Vec<ToolDefinition>, TransportError>;

    /// 工具自身报告的失败以 `Ok(ToolCallResult::Failure)` 返回，只有通道故障才是 Err
    async fn call_tool(
        &self,
        project_id: &str,
        tool: &str,
        parameters: Value,
    ) -> Result<ToolCallResult, TransportError>;

    async fn call_tool_stream(
        &self,
        project_id: &str,
        tool: &str,
        parameters: Value,
    ) -> Result<StreamStart, TransportError>;

    async fn get_stream_result(
        &self,
        project_id: &str,
        stream_id: &str,
    ) -> Result<StreamPoll, TransportError>;
}
