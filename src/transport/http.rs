//! HTTP 通道
//!
//! 单一端点：`POST {endpoint}`，请求体 `{"operation": ..., "payload": {...}}`，
//! 响应为各操作的判别 JSON。超时交给 reqwest 客户端自身。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ToolTransport;
use crate::core::TransportError;
use crate::tools::{StreamPoll, StreamStart, ToolCallResult, ToolDefinition};

/// 基于 reqwest 的工具后端客户端
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, operation: &str, payload: Value) -> Result<Value, TransportError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "operation": operation, "payload": payload }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ToolTransport for HttpTransport {
    async fn list_tools(&self, project_id: &str) -> Result<Vec<ToolDefinition>, TransportError> {
        let body = self
            .send("list_tools", json!({ "projectId": project_id }))
            .await?;
        decode_tool_list(body)
    }

    async fn call_tool(
        &self,
        project_id: &str,
        tool: &str,
        parameters: Value,
    ) -> Result<ToolCallResult, TransportError> {
        let body = self
            .send(
                "call_tool",
                json!({ "projectId": project_id, "toolName": tool, "parameters": parameters }),
            )
            .await?;
        decode(body)
    }

    async fn call_tool_stream(
        &self,
        project_id: &str,
        tool: &str,
        parameters: Value,
    ) -> Result<StreamStart, TransportError> {
        let body = self
            .send(
                "call_tool_stream",
                json!({ "projectId": project_id, "toolName": tool, "parameters": parameters }),
            )
            .await?;
        decode(body)
    }

    async fn get_stream_result(
        &self,
        project_id: &str,
        stream_id: &str,
    ) -> Result<StreamPoll, TransportError> {
        let body = self
            .send(
                "get_stream_result",
                json!({ "projectId": project_id, "streamId": stream_id }),
            )
            .await?;
        decode(body)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, TransportError> {
    serde_json::from_value(body).map_err(|e| TransportError::Decode(e.to_string()))
}

fn decode_tool_list(body: Value) -> Result<Vec<ToolDefinition>, TransportError> {
    #[derive(Deserialize)]
    struct ListToolsResponse {
        success: bool,
        #[serde(default)]
        tools: Vec<ToolDefinition>,
        #[serde(default)]
        error: Option<String>,
    }

    let response: ListToolsResponse = decode(body)?;
    if response.success {
        Ok(response.tools)
    } else {
        Err(TransportError::Rejected {
            operation: "list_tools".to_string(),
            message: response
                .error
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
