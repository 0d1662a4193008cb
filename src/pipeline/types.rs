//! 流水线类型定义
//!
//! 步骤状态机 {Pending, InProgress, Completed, Error}、步骤规格（工具、调用方式、参数构造、输出字段）、
//! 运行结果与进度事件、工作单元记录。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::core::PipelineStepError;
use crate::project::VideoProject;

/// 步骤状态（用于汇总）。排序即「最小状态」规则：Error 最小，因此一旦出现即主导整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Error,
    Pending,
    InProgress,
    Completed,
}

/// 步骤状态机
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InProgress,
    Completed { output: Value },
    Error { message: String },
}

impl StepState {
    pub fn status(&self) -> StepStatus {
        match self {
            StepState::Pending => StepStatus::Pending,
            StepState::InProgress => StepStatus::InProgress,
            StepState::Completed { .. } => StepStatus::Completed,
            StepState::Error { .. } => StepStatus::Error,
        }
    }
}

/// 运行中的一个步骤
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStep {
    pub index: usize,
    pub name: String,
    pub tool: String,
    #[serde(flatten)]
    pub state: StepState,
    /// 展示用说明（最近一次进度或错误摘要）
    pub detail: Option<String>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl PipelineStep {
    pub(crate) fn pending(index: usize, spec: &StepSpec) -> Self {
        Self {
            index,
            name: spec.name.clone(),
            tool: spec.tool.clone(),
            state: StepState::Pending,
            detail: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> StepStatus {
        self.state.status()
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.state {
            StepState::Completed { output } => Some(output),
            _ => None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = StepState::InProgress;
        self.started_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub(crate) fn complete(&mut self, output: Value) {
        self.state = StepState::Completed { output };
        self.finished_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.detail = Some(message.clone());
        self.state = StepState::Error { message };
        self.finished_at = Some(chrono::Utc::now().timestamp_millis());
    }
}

/// 调用方式：普通调用或流式轮询
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    Call,
    Stream,
}

type ParamBuilder = Arc<dyn Fn(&StepContext) -> Result<Value, String> + Send + Sync>;

/// 步骤规格
#[derive(Clone)]
pub struct StepSpec {
    pub name: String,
    pub tool: String,
    pub mode: CallMode,
    params: ParamBuilder,
    /// 从成功结果中提取的字段；None 表示保存整个 data
    pub extract: Option<String>,
}

impl StepSpec {
    pub fn call(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::with_mode(name, tool, CallMode::Call)
    }

    pub fn stream(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::with_mode(name, tool, CallMode::Stream)
    }

    fn with_mode(name: impl Into<String>, tool: impl Into<String>, mode: CallMode) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            mode,
            params: Arc::new(|ctx: &StepContext| Ok(serde_json::json!({ "projectId": ctx.project_id }))),
            extract: None,
        }
    }

    /// 参数构造器；可读取之前步骤的输出，返回 Err 视为本步骤失败
    pub fn with_params<F>(mut self, builder: F) -> Self
    where
        F: Fn(&StepContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.params = Arc::new(builder);
        self
    }

    pub fn with_static_params(self, params: Value) -> Self {
        self.with_params(move |_| Ok(params.clone()))
    }

    pub fn extract(mut self, field: impl Into<String>) -> Self {
        self.extract = Some(field.into());
        self
    }

    pub(crate) fn build_params(&self, ctx: &StepContext) -> Result<Value, String> {
        (self.params)(ctx)
    }
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("tool", &self.tool)
            .field("mode", &self.mode)
            .field("extract", &self.extract)
            .finish_non_exhaustive()
    }
}

/// 参数构造器可见的上下文
#[derive(Debug, Clone)]
pub struct StepContext {
    pub work_unit_id: String,
    pub project_id: String,
    /// 已完成步骤的输出（按步骤名）
    pub outputs: HashMap<String, Value>,
}

impl StepContext {
    pub fn output(&self, step: &str) -> Option<&Value> {
        self.outputs.get(step)
    }

    /// 读取某步骤的字符串输出；缺失时返回可读的错误
    pub fn require_str(&self, step: &str) -> Result<&str, String> {
        self.outputs
            .get(step)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("output of step `{step}` is not available"))
    }
}

/// 一次流水线运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRunResult {
    pub run_id: String,
    pub work_unit_id: String,
    pub steps: Vec<PipelineStep>,
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<PipelineStepError>,
    /// 运行结束后刷新得到的项目状态
    pub refreshed: Option<VideoProject>,
    pub refresh_error: Option<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl PipelineRunResult {
    /// 整体状态：各步骤的最小状态
    pub fn status(&self) -> StepStatus {
        self.steps
            .iter()
            .map(PipelineStep::status)
            .min()
            .unwrap_or(StepStatus::Completed)
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.status() == StepStatus::Completed
    }

    pub fn output(&self, step: &str) -> Option<&Value> {
        self.steps.iter().find(|s| s.name == step)?.output()
    }

    pub fn failed_step(&self) -> Option<&PipelineStep> {
        let failure = self.failure.as_ref()?;
        self.steps.get(failure.index)
    }
}

fn serialize_failure<S: Serializer>(
    failure: &Option<PipelineStepError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// 流水线进度事件（展示层订阅）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted { run_id: String, work_unit_id: String, steps: usize },
    StepStarted { run_id: String, index: usize, step: String },
    StepProgress { run_id: String, index: usize, progress: Value },
    StepCompleted { run_id: String, index: usize, step: String },
    StepFailed { run_id: String, index: usize, step: String, message: String },
    Refreshed { run_id: String, ok: bool },
    RunFinished { run_id: String, status: StepStatus },
}

/// 工作单元自身状态（独立于流水线）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkUnitStatus {
    Idle,
    InProgress,
    Completed,
    /// 停在可明确归因的失败步骤
    Failed { step: String, index: usize },
}

/// 编排器为每个工作单元维护的记录
#[derive(Debug, Clone, Serialize)]
pub struct WorkUnit {
    pub id: String,
    pub status: WorkUnitStatus,
    pub last_run: Option<String>,
    pub project: Option<VideoProject>,
    pub updated_at: i64,
}

impl WorkUnit {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: WorkUnitStatus::Idle,
            last_run: None,
            project: None,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(index: usize, state: StepState) -> PipelineStep {
        let mut step = PipelineStep::pending(index, &StepSpec::call(format!("s{index}"), "tool"));
        step.state = state;
        step
    }

    #[test]
    fn test_overall_status_is_min_with_error_dominating() {
        let mut result = PipelineRunResult {
            run_id: "r".to_string(),
            work_unit_id: "w".to_string(),
            steps: vec![
                step(0, StepState::Completed { output: json!(1) }),
                step(1, StepState::Pending),
            ],
            failure: None,
            refreshed: None,
            refresh_error: None,
            started_at: 0,
            finished_at: 0,
        };
        assert_eq!(result.status(), StepStatus::Pending);

        result.steps.push(step(2, StepState::Error { message: "x".to_string() }));
        assert_eq!(result.status(), StepStatus::Error);
        assert!(!result.is_success());
    }

    #[test]
    fn test_require_str() {
        let mut ctx = StepContext {
            work_unit_id: "s1".to_string(),
            project_id: "p1".to_string(),
            outputs: HashMap::new(),
        };
        assert!(ctx.require_str("image_prompt").is_err());
        ctx.outputs.insert("image_prompt".to_string(), json!("a red bike"));
        assert_eq!(ctx.require_str("image_prompt"), Ok("a red bike"));
    }

    #[test]
    fn test_step_serializes_flat_status() {
        let value = serde_json::to_value(step(0, StepState::Error { message: "boom".to_string() }))
            .unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "boom");
        assert_eq!(value["name"], "s0");
    }

    #[test]
    fn test_default_params_carry_project_id() {
        let ctx = StepContext {
            work_unit_id: "s1".to_string(),
            project_id: "p1".to_string(),
            outputs: HashMap::new(),
        };
        let params = StepSpec::call("refresh", "get_video_project").build_params(&ctx).unwrap();
        assert_eq!(params, json!({"projectId": "p1"}));
    }
}
