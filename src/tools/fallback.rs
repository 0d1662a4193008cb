//! 降级模式：由调用方决定的兜底策略
//!
//! ToolInvoker 本身从不返回伪造结果；需要「后端不可用时仍能演示」的调用方
//! 显式使用 call_tool_or_fallback / Session::list_tools_or_fallback。

use serde_json::{json, Value};

use super::{builtin_tool_definitions, ToolCallResult, ToolDefinition, ToolInvoker};
use crate::core::ToolInvocationError;

/// 降级数据来源
pub trait FallbackProvider: Send + Sync {
    /// 工具列表不可用时使用的静态定义
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// 某个工具调用失败时的占位结果；None 表示该工具不降级
    fn placeholder(&self, tool: &str, parameters: &Value) -> Option<ToolCallResult>;
}

/// 内置目录 + 生成类工具的带标签占位结果
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinFallback;

impl FallbackProvider for BuiltinFallback {
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        builtin_tool_definitions()
    }

    fn placeholder(&self, tool: &str, parameters: &Value) -> Option<ToolCallResult> {
        if !tool.starts_with("generate_") {
            return None;
        }
        Some(ToolCallResult::Success(json!({
            "placeholder": true,
            "label": format!("Placeholder: {} unavailable", tool.replace('_', " ")),
            "tool": tool,
            "sceneId": parameters.get("sceneId").cloned().unwrap_or(Value::Null),
        })))
    }
}

/// 调用工具；仅在通道故障（重试耗尽）时使用 provider 的占位结果
pub async fn call_tool_or_fallback(
    invoker: &ToolInvoker,
    name: &str,
    parameters: Value,
    fallback: &dyn FallbackProvider,
) -> Result<ToolCallResult, ToolInvocationError> {
    let preview = parameters.clone();
    match invoker.call_tool(name, parameters).await {
        Ok(result) => Ok(result),
        Err(e) if e.is_transport() => match fallback.placeholder(name, &preview) {
            Some(placeholder) => {
                tracing::warn!(tool = name, error = %e, "Using placeholder result");
                Ok(placeholder)
            }
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::ManualClock;
    use crate::core::TransportError;
    use crate::session::{Session, SessionConfig};
    use crate::tools::InvokerConfig;
    use crate::transport::ScriptedTransport;

    fn invoker(transport: Arc<ScriptedTransport>) -> ToolInvoker {
        let session = Session::new(
            "p1",
            transport,
            Arc::new(ManualClock::new()),
            SessionConfig {
                heartbeat_enabled: false,
                ..SessionConfig::default()
            },
        );
        ToolInvoker::new(session, InvokerConfig::default())
    }

    #[test]
    fn test_placeholder_only_for_generation_tools() {
        let fallback = BuiltinFallback;
        let result = fallback
            .placeholder("generate_scene_image", &json!({"sceneId": "s1"}))
            .unwrap();
        let data = result.data().unwrap();
        assert_eq!(data["placeholder"], true);
        assert_eq!(data["sceneId"], "s1");
        assert!(data["label"].as_str().unwrap().contains("generate scene image"));

        assert!(fallback.placeholder("compile_video", &json!({})).is_none());
    }

    #[tokio::test]
    async fn test_fallback_after_transport_exhaustion() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.push_call("generate_scene_image", Err(TransportError::Timeout));
        }
        let invoker = invoker(transport);

        let result = call_tool_or_fallback(
            &invoker,
            "generate_scene_image",
            json!({"sceneId": "s1"}),
            &BuiltinFallback,
        )
        .await
        .unwrap();
        assert_eq!(result.data().unwrap()["placeholder"], true);
    }

    #[tokio::test]
    async fn test_tool_reported_failure_is_not_masked() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call(
            "generate_scene_image",
            Ok(ToolCallResult::Failure("quota".to_string())),
        );
        let invoker = invoker(transport);

        let result = call_tool_or_fallback(&invoker, "generate_scene_image", json!({}), &BuiltinFallback)
            .await
            .unwrap();
        assert_eq!(result.error(), Some("quota"));
    }
}
