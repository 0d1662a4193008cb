//! 脚本化通道（用于测试与离线演示，无需后端）
//!
//! 每种操作一个响应队列；队列为空时给出与真实后端形状一致的固定响应。
//! 同时按操作计数并记录每次 call_tool 的参数，便于断言「是否发生了网络调用」。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ToolTransport;
use crate::core::TransportError;
use crate::tools::{builtin_tool_definitions, StreamPoll, StreamStart, ToolCallResult, ToolDefinition};

/// 通道操作种类（用于计数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListTools,
    CallTool,
    CallToolStream,
    GetStreamResult,
}

#[derive(Default)]
struct Script {
    list_tools: VecDeque<Result<Vec<ToolDefinition>, TransportError>>,
    calls: HashMap<String, VecDeque<Result<ToolCallResult, TransportError>>>,
    stream_starts: HashMap<String, VecDeque<Result<StreamStart, TransportError>>>,
    polls: HashMap<String, VecDeque<Result<StreamPoll, TransportError>>>,
    counts: HashMap<Operation, usize>,
    call_log: Vec<(String, Value)>,
}

/// 脚本化通道：按队列回放预设响应
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次操作前真实等待一段时间（模拟慢速后端）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_list_tools(&self, response: Result<Vec<ToolDefinition>, TransportError>) -> &Self {
        self.lock().list_tools.push_back(response);
        self
    }

    pub fn push_call(
        &self,
        tool: &str,
        response: Result<ToolCallResult, TransportError>,
    ) -> &Self {
        self.lock()
            .calls
            .entry(tool.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn push_stream_start(
        &self,
        tool: &str,
        response: Result<StreamStart, TransportError>,
    ) -> &Self {
        self.lock()
            .stream_starts
            .entry(tool.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn push_poll(&self, stream_id: &str, response: Result<StreamPoll, TransportError>) -> &Self {
        self.lock()
            .polls
            .entry(stream_id.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// 某种操作被调用的次数
    pub fn count(&self, operation: Operation) -> usize {
        self.lock().counts.get(&operation).copied().unwrap_or(0)
    }

    /// 所有 call_tool / call_tool_stream 的 (工具名, 参数)，按调用顺序
    pub fn call_log(&self) -> Vec<(String, Value)> {
        self.lock().call_log.clone()
    }

    /// 某工具被调用（含流式）的次数
    pub fn tool_calls(&self, tool: &str) -> usize {
        self.lock()
            .call_log
            .iter()
            .filter(|(name, _)| name == tool)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, operation: Operation) {
        *self.lock().counts.entry(operation).or_insert(0) += 1;
    }
}

#[async_trait]
impl ToolTransport for ScriptedTransport {
    async fn list_tools(&self, _project_id: &str) -> Result<Vec<ToolDefinition>, TransportError> {
        self.record(Operation::ListTools);
        self.pause().await;
        self.lock()
            .list_tools
            .pop_front()
            .unwrap_or_else(|| Ok(builtin_tool_definitions()))
    }

    async fn call_tool(
        &self,
        project_id: &str,
        tool: &str,
        parameters: Value,
    ) -> Result<ToolCallResult, TransportError> {
        self.record(Operation::CallTool);
        self.pause().await;
        let mut script = self.lock();
        script.call_log.push((tool.to_string(), parameters.clone()));
        match script.calls.get_mut(tool).and_then(VecDeque::pop_front) {
            Some(response) => response,
            None => Ok(ToolCallResult::Success(canned_data(project_id, tool, &parameters))),
        }
    }

    async fn call_tool_stream(
        &self,
        project_id: &str,
        tool: &str,
        parameters: Value,
    ) -> Result<StreamStart, TransportError> {
        self.record(Operation::CallToolStream);
        self.pause().await;
        let mut script = self.lock();
        script.call_log.push((tool.to_string(), parameters.clone()));
        match script.stream_starts.get_mut(tool).and_then(VecDeque::pop_front) {
            Some(response) => response,
            None => Ok(StreamStart::Immediate(ToolCallResult::Success(canned_data(
                project_id,
                tool,
                &parameters,
            )))),
        }
    }

    async fn get_stream_result(
        &self,
        _project_id: &str,
        stream_id: &str,
    ) -> Result<StreamPoll, TransportError> {
        self.record(Operation::GetStreamResult);
        self.pause().await;
        match self.lock().polls.get_mut(stream_id).and_then(VecDeque::pop_front) {
            Some(response) => response,
            None => Ok(StreamPoll::Complete(ToolCallResult::Success(json!({
                "streamId": stream_id
            })))),
        }
    }
}

/// 与真实后端同形的固定数据（确定性，不含随机 / 时间戳）
fn canned_data(project_id: &str, tool: &str, params: &Value) -> Value {
    let project = params
        .get("projectId")
        .and_then(Value::as_str)
        .unwrap_or(project_id);
    let scene = params
        .get("sceneId")
        .and_then(Value::as_str)
        .unwrap_or("scene-1");

    match tool {
        "create_video_project" => json!({
            "project": {
                "id": format!("project-{}", slug(params.get("name").and_then(Value::as_str).unwrap_or("untitled"))),
                "name": params.get("name").cloned().unwrap_or(Value::Null),
                "description": params.get("description").cloned().unwrap_or(Value::Null),
                "status": "draft",
                "scenes": []
            }
        }),
        "get_video_project" => json!({
            "project": {
                "id": project,
                "name": "Demo Project",
                "status": "in_progress",
                "scenes": [
                    {"id": "scene-1", "projectId": project, "name": "Scene 1", "status": "pending", "order": 0},
                    {"id": "scene-2", "projectId": project, "name": "Scene 2", "status": "pending", "order": 1}
                ]
            }
        }),
        "list_video_projects" => json!({
            "projects": [{"id": project, "name": "Demo Project", "status": "in_progress", "scenes": []}],
            "total": 1
        }),
        "update_video_project" => json!({
            "project": {
                "id": project,
                "name": params.get("name").cloned().unwrap_or_else(|| json!("Demo Project")),
                "description": params.get("description").cloned().unwrap_or(Value::Null),
                "status": params.get("status").cloned().unwrap_or_else(|| json!("in_progress")),
                "scenes": []
            }
        }),
        "add_scene" => json!({
            "scene": {
                "id": format!("scene-{}", params.get("order").and_then(Value::as_u64).unwrap_or(0) + 1),
                "projectId": project,
                "name": params.get("name").cloned().unwrap_or(Value::Null),
                "description": params.get("description").cloned().unwrap_or(Value::Null),
                "status": "pending",
                "order": params.get("order").cloned().unwrap_or_else(|| json!(0))
            }
        }),
        "upload_product_image" => json!({
            "imageUrl": format!(
                "https://example.com/uploads/{project}/{}",
                params.get("filename").and_then(Value::as_str).unwrap_or("image.png")
            )
        }),
        "generate_image_prompt" => json!({
            "prompt": format!(
                "Enhanced prompt based on {}",
                params.get("imageAnalysis").and_then(Value::as_str).unwrap_or("default analysis")
            )
        }),
        "generate_scene_description" => json!({
            "description": format!("Generated description for scene {scene}")
        }),
        "generate_scene_image" => json!({
            "result": format!("Generated scene_image for scene {scene}"),
            "imageUrl": format!("https://example.com/images/{project}/{scene}.jpg")
        }),
        "generate_scene_script" => json!({
            "result": format!("Generated scene_script for scene {scene}"),
            "script": "This is a sample script for the scene."
        }),
        "generate_scene_video" => json!({
            "result": format!("Generated scene_video for scene {scene}"),
            "videoUrl": format!("https://example.com/videos/{project}/{scene}.mp4")
        }),
        "compile_video" => json!({
            "videoUrl": format!(
                "https://example.com/videos/{project}/output.{}",
                params.get("outputFormat").and_then(Value::as_str).unwrap_or("mp4")
            )
        }),
        other => json!({ "result": format!("Result from {other}"), "parameters": params }),
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
