//! 工具协议类型：工具定义、调用结果、流式句柄与轮询结果
//!
//! 线上格式是带判别字段的 JSON：`{success, data}` / `{success: false, error}`、
//! `{stream_id}`、`{complete, progress | result}`。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 后端暴露的工具定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 参数 JSON Schema
    #[serde(
        rename = "parameters",
        alias = "parameterSchema",
        alias = "inputSchema",
        default = "empty_object_schema"
    )]
    pub parameter_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema: schema,
        }
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 工具调用结果：要么成功带数据，要么工具自身报告的失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolEnvelope", into = "ToolEnvelope")]
pub enum ToolCallResult {
    Success(Value),
    Failure(String),
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallResult::Success(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ToolCallResult::Success(data) => Some(data),
            ToolCallResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolCallResult::Success(_) => None,
            ToolCallResult::Failure(e) => Some(e),
        }
    }

    /// 宽松解析：带 `success` 布尔字段的视为信封，否则整体当作成功数据
    pub fn from_value(value: Value) -> Self {
        if value.get("success").map_or(false, Value::is_boolean) {
            match serde_json::from_value::<ToolEnvelope>(value.clone()) {
                Ok(envelope) => envelope.into(),
                Err(_) => ToolCallResult::Success(value),
            }
        } else {
            ToolCallResult::Success(value)
        }
    }
}

/// `{success, data, error}` 线上信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ToolEnvelope> for ToolCallResult {
    fn from(envelope: ToolEnvelope) -> Self {
        if envelope.success {
            ToolCallResult::Success(envelope.data.unwrap_or(Value::Null))
        } else {
            ToolCallResult::Failure(
                envelope
                    .error
                    .unwrap_or_else(|| "unknown tool error".to_string()),
            )
        }
    }
}

impl From<ToolCallResult> for ToolEnvelope {
    fn from(result: ToolCallResult) -> Self {
        match result {
            ToolCallResult::Success(data) => ToolEnvelope {
                success: true,
                data: Some(data),
                error: None,
            },
            ToolCallResult::Failure(error) => ToolEnvelope {
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

/// 流式调用返回的不透明句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamHandle {
    #[serde(alias = "streamId")]
    pub stream_id: String,
}

impl StreamHandle {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

/// call_tool_stream 的响应：句柄，或（部分工具）同步给出的结果
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStart {
    Handle(StreamHandle),
    Immediate(ToolCallResult),
}

impl<'de> Deserialize<'de> for StreamStart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Handle(StreamHandle),
            Envelope(ToolEnvelope),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Handle(handle) => StreamStart::Handle(handle),
            Wire::Envelope(envelope) => StreamStart::Immediate(envelope.into()),
        })
    }
}

/// get_stream_result 的一次响应
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPoll {
    Pending { progress: Value },
    Complete(ToolCallResult),
}

impl<'de> Deserialize<'de> for StreamPoll {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            complete: bool,
            #[serde(default)]
            progress: Value,
            #[serde(default)]
            result: Value,
        }

        let wire = Wire::deserialize(deserializer)?;
        Ok(if wire.complete {
            StreamPoll::Complete(ToolCallResult::from_value(wire.result))
        } else {
            StreamPoll::Pending {
                progress: wire.progress,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_failure_without_message() {
        let result: ToolCallResult = serde_json::from_value(json!({"success": false})).unwrap();
        assert_eq!(result, ToolCallResult::Failure("unknown tool error".to_string()));
    }

    #[test]
    fn test_result_serializes_as_envelope() {
        let value = serde_json::to_value(ToolCallResult::Success(json!({"videoUrl": "v.mp4"})))
            .unwrap();
        assert_eq!(value, json!({"success": true, "data": {"videoUrl": "v.mp4"}}));
    }

    #[test]
    fn test_stream_start_handle_or_immediate() {
        let start: StreamStart = serde_json::from_value(json!({"stream_id": "abc"})).unwrap();
        assert_eq!(start, StreamStart::Handle(StreamHandle::new("abc")));

        let start: StreamStart =
            serde_json::from_value(json!({"success": true, "data": {"x": 1}})).unwrap();
        assert_eq!(start, StreamStart::Immediate(ToolCallResult::Success(json!({"x": 1}))));
    }

    #[test]
    fn test_stream_poll_complete_with_raw_result() {
        let poll: StreamPoll =
            serde_json::from_value(json!({"complete": true, "result": {"videoUrl": "a"}}))
                .unwrap();
        assert_eq!(
            poll,
            StreamPoll::Complete(ToolCallResult::Success(json!({"videoUrl": "a"})))
        );

        let poll: StreamPoll = serde_json::from_value(
            json!({"complete": true, "result": {"success": false, "error": "nsfw"}}),
        )
        .unwrap();
        assert_eq!(poll, StreamPoll::Complete(ToolCallResult::Failure("nsfw".to_string())));
    }

    #[test]
    fn test_tool_definition_accepts_parameters_alias() {
        let def: ToolDefinition = serde_json::from_value(json!({
            "name": "compile_video",
            "description": "Compile",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(def.parameter_schema, json!({"type": "object"}));
    }
}
