//! 流水线编排引擎
//!
//! 单个 step-runner 循环按顺序驱动步骤状态机：Pending → InProgress → {Completed | Error}。
//! 任一步骤失败立即停止，已完成步骤的输出保留；运行结束后（无论成败）刷新一次项目状态。
//! 同一 work unit 同时只允许一个运行，由 in-flight 集合 + RAII guard 保证在所有退出路径上释放。

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};

use crate::core::{
    InvocationCause, PipelineStepError, ReelError, ToolInvocationError, TransportError,
};
use crate::pipeline::builder::{validate, Pipeline};
use crate::pipeline::types::*;
use crate::project::VideoProject;
use crate::tools::{names, StreamConfig, StreamPoller, ToolCallResult, ToolInvoker};

/// 流水线编排器
pub struct PipelineOrchestrator {
    poller: StreamPoller,
    in_flight: Mutex<HashSet<String>>,
    work_units: RwLock<HashMap<String, WorkUnit>>,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl PipelineOrchestrator {
    pub fn new(invoker: ToolInvoker, stream_config: StreamConfig) -> Self {
        Self {
            poller: StreamPoller::new(invoker, stream_config),
            in_flight: Mutex::new(HashSet::new()),
            work_units: RwLock::new(HashMap::new()),
            events: None,
        }
    }

    /// 订阅进度事件
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn invoker(&self) -> &ToolInvoker {
        self.poller.invoker()
    }

    pub fn poller(&self) -> &StreamPoller {
        &self.poller
    }

    pub fn is_running(&self, work_unit_id: &str) -> bool {
        lock(&self.in_flight).contains(work_unit_id)
    }

    pub async fn work_unit(&self, work_unit_id: &str) -> Option<WorkUnit> {
        self.work_units.read().await.get(work_unit_id).cloned()
    }

    pub async fn run(
        &self,
        work_unit_id: &str,
        pipeline: &Pipeline,
    ) -> Result<PipelineRunResult, ReelError> {
        self.run_pipeline(work_unit_id, pipeline.steps.clone()).await
    }

    /// runPipeline：步骤失败体现在返回结果中；Err 仅用于 AlreadyRunning / InvalidPipeline
    pub async fn run_pipeline(
        &self,
        work_unit_id: &str,
        steps: Vec<StepSpec>,
    ) -> Result<PipelineRunResult, ReelError> {
        validate(&steps)?;
        let _guard = InFlightGuard::acquire(&self.in_flight, work_unit_id)
            .ok_or_else(|| ReelError::AlreadyRunning(work_unit_id.to_string()))?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now().timestamp_millis();
        let mut records: Vec<PipelineStep> = steps
            .iter()
            .enumerate()
            .map(|(index, spec)| PipelineStep::pending(index, spec))
            .collect();

        self.update_work_unit(work_unit_id, |unit| {
            unit.status = WorkUnitStatus::InProgress;
            unit.last_run = Some(run_id.clone());
        })
        .await;
        tracing::info!(%run_id, work_unit_id, steps = steps.len(), "Pipeline started");
        self.emit(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            work_unit_id: work_unit_id.to_string(),
            steps: steps.len(),
        });

        let mut ctx = StepContext {
            work_unit_id: work_unit_id.to_string(),
            project_id: self.invoker().project_id().to_string(),
            outputs: HashMap::new(),
        };
        let mut failure = None;

        for (index, spec) in steps.iter().enumerate() {
            records[index].start();
            self.emit(PipelineEvent::StepStarted {
                run_id: run_id.clone(),
                index,
                step: spec.name.clone(),
            });
            tracing::debug!(%run_id, index, step = %spec.name, tool = %spec.tool, "Step started");

            match self.execute_step(&run_id, spec, &mut records[index], &ctx).await {
                Ok(output) => {
                    ctx.outputs.insert(spec.name.clone(), output.clone());
                    records[index].complete(output);
                    self.emit(PipelineEvent::StepCompleted {
                        run_id: run_id.clone(),
                        index,
                        step: spec.name.clone(),
                    });
                }
                Err(source) => {
                    let err = PipelineStepError {
                        index,
                        step: spec.name.clone(),
                        source,
                    };
                    tracing::warn!(%run_id, index, step = %spec.name, error = %err, "Step failed");
                    records[index].fail(err.source.to_string());
                    self.emit(PipelineEvent::StepFailed {
                        run_id: run_id.clone(),
                        index,
                        step: spec.name.clone(),
                        message: err.source.to_string(),
                    });
                    failure = Some(err);
                    break;
                }
            }
        }

        let (refreshed, refresh_error) = match self.refresh().await {
            Ok(project) => (Some(project), None),
            Err(e) => {
                tracing::warn!(%run_id, error = %e, "Project refresh failed");
                (None, Some(e.to_string()))
            }
        };
        self.emit(PipelineEvent::Refreshed {
            run_id: run_id.clone(),
            ok: refresh_error.is_none(),
        });

        let result = PipelineRunResult {
            run_id: run_id.clone(),
            work_unit_id: work_unit_id.to_string(),
            steps: records,
            failure,
            refreshed,
            refresh_error,
            started_at,
            finished_at: chrono::Utc::now().timestamp_millis(),
        };

        let status = match &result.failure {
            Some(e) => WorkUnitStatus::Failed {
                step: e.step.clone(),
                index: e.index,
            },
            None => WorkUnitStatus::Completed,
        };
        let project = result.refreshed.clone();
        self.update_work_unit(work_unit_id, move |unit| {
            unit.status = status;
            if project.is_some() {
                unit.project = project;
            }
        })
        .await;

        tracing::info!(%run_id, work_unit_id, status = ?result.status(), "Pipeline finished");
        self.emit(PipelineEvent::RunFinished {
            run_id,
            status: result.status(),
        });
        Ok(result)
    }

    async fn execute_step(
        &self,
        run_id: &str,
        spec: &StepSpec,
        record: &mut PipelineStep,
        ctx: &StepContext,
    ) -> Result<Value, ToolInvocationError> {
        let index = record.index;
        let params = spec
            .build_params(ctx)
            .map_err(|msg| ToolInvocationError::new(&spec.tool, InvocationCause::InvalidParameters(msg)))?;

        let result = match spec.mode {
            CallMode::Call => self.invoker().call_tool(&spec.tool, params).await?,
            CallMode::Stream => self
                .poller
                .call_tool_stream(&spec.tool, params, |progress| {
                    record.detail = Some(progress.to_string());
                    self.emit(PipelineEvent::StepProgress {
                        run_id: run_id.to_string(),
                        index,
                        progress: progress.clone(),
                    })
                })
                .await
                .map_err(|e| e.into_invocation(&spec.tool))?,
        };

        let data = match result {
            ToolCallResult::Success(data) => data,
            ToolCallResult::Failure(message) => {
                return Err(ToolInvocationError::new(
                    &spec.tool,
                    InvocationCause::ToolReported(message),
                ))
            }
        };

        match &spec.extract {
            None => Ok(data),
            Some(field) => data
                .get(field)
                .filter(|v| !v.is_null())
                .cloned()
                .ok_or_else(|| {
                    ToolInvocationError::new(&spec.tool, InvocationCause::MissingField(field.clone()))
                }),
        }
    }

    /// 刷新项目的权威状态（get_video_project）
    pub async fn refresh(&self) -> Result<VideoProject, ToolInvocationError> {
        let tool = names::GET_VIDEO_PROJECT;
        let params = json!({ "projectId": self.invoker().project_id() });
        match self.invoker().call_tool(tool, params).await? {
            ToolCallResult::Success(data) => parse_project(tool, data),
            ToolCallResult::Failure(message) => Err(ToolInvocationError::new(
                tool,
                InvocationCause::ToolReported(message),
            )),
        }
    }

    async fn update_work_unit<F>(&self, work_unit_id: &str, apply: F)
    where
        F: FnOnce(&mut WorkUnit),
    {
        let mut units = self.work_units.write().await;
        let unit = units
            .entry(work_unit_id.to_string())
            .or_insert_with(|| WorkUnit::new(work_unit_id));
        apply(unit);
        unit.updated_at = chrono::Utc::now().timestamp_millis();
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // 接收端已关闭时静默丢弃
            let _ = tx.send(event);
        }
    }
}

/// `{project: {...}}` 或直接的项目对象
pub(crate) fn parse_project(tool: &str, mut data: Value) -> Result<VideoProject, ToolInvocationError> {
    let raw = match data.get_mut("project") {
        Some(project) => project.take(),
        None => data,
    };
    if raw.is_null() {
        return Err(ToolInvocationError::new(
            tool,
            InvocationCause::MissingField("project".to_string()),
        ));
    }
    serde_json::from_value(raw).map_err(|e| {
        ToolInvocationError::new(tool, TransportError::Decode(e.to_string()))
    })
}

/// 运行期间占用 work unit；drop 时释放
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        if !lock(set).insert(id.to_string()) {
            return None;
        }
        Some(Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::clock::ManualClock;
    use crate::session::{Session, SessionConfig};
    use crate::tools::{InvokerConfig, StreamHandle, StreamPoll, StreamStart};
    use crate::transport::ScriptedTransport;

    fn orchestrator(transport: Arc<ScriptedTransport>) -> PipelineOrchestrator {
        let session = Session::new(
            "p1",
            transport,
            Arc::new(ManualClock::new()),
            SessionConfig {
                heartbeat_enabled: false,
                ..SessionConfig::default()
            },
        );
        PipelineOrchestrator::new(
            ToolInvoker::new(session, InvokerConfig::default()),
            StreamConfig::default(),
        )
    }

    fn four_steps() -> Vec<StepSpec> {
        (1..=4)
            .map(|n| StepSpec::call(format!("step{n}"), format!("tool_{n}")))
            .collect()
    }

    #[tokio::test]
    async fn test_run_built_pipeline() {
        let transport = Arc::new(ScriptedTransport::new());
        let orchestrator = orchestrator(transport.clone());
        let pipeline = crate::pipeline::PipelineBuilder::new("two-step")
            .steps(four_steps().into_iter().take(2))
            .build()
            .unwrap();

        let result = orchestrator.run("scene-2", &pipeline).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.steps.len(), 2);
        assert_eq!(transport.tool_calls("tool_1"), 1);
        assert_eq!(transport.tool_calls("tool_2"), 1);
    }

    #[tokio::test]
    async fn test_failure_halts_and_preserves_completed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call("tool_2", Ok(ToolCallResult::Failure("boom".to_string())));
        let orchestrator = orchestrator(transport.clone());

        let result = orchestrator.run_pipeline("scene-1", four_steps()).await.unwrap();

        let statuses: Vec<StepStatus> = result.steps.iter().map(PipelineStep::status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Completed,
                StepStatus::Error,
                StepStatus::Pending,
                StepStatus::Pending
            ]
        );
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.step, "step2");
        assert_eq!(failure.source.cause, InvocationCause::ToolReported("boom".to_string()));
        assert_eq!(result.failed_step().map(|s| s.name.as_str()), Some("step2"));
        assert_eq!(result.status(), StepStatus::Error);
        assert!(result.output("step1").is_some());

        assert_eq!(transport.tool_calls("tool_3"), 0);
        assert_eq!(transport.tool_calls("tool_4"), 0);
        // 失败后仍刷新一次
        assert_eq!(transport.tool_calls(names::GET_VIDEO_PROJECT), 1);
        assert!(result.refreshed.is_some());

        let unit = orchestrator.work_unit("scene-1").await.unwrap();
        assert_eq!(
            unit.status,
            WorkUnitStatus::Failed {
                step: "step2".to_string(),
                index: 1
            }
        );
        assert!(!orchestrator.is_running("scene-1"));
    }

    #[tokio::test]
    async fn test_outputs_flow_into_later_params() {
        let transport = Arc::new(ScriptedTransport::new());
        let orchestrator = orchestrator(transport.clone());

        let steps = vec![
            StepSpec::call("prompt", names::GENERATE_IMAGE_PROMPT)
                .with_static_params(json!({"projectId": "p1", "sceneId": "s1"}))
                .extract("prompt"),
            StepSpec::call("image", names::GENERATE_SCENE_IMAGE)
                .with_params(|ctx| {
                    Ok(json!({
                        "projectId": ctx.project_id,
                        "sceneId": "s1",
                        "imagePrompt": ctx.require_str("prompt")?,
                    }))
                })
                .extract("imageUrl"),
        ];
        let result = orchestrator.run_pipeline("s1", steps).await.unwrap();
        assert!(result.is_success());

        let log = transport.call_log();
        let (_, image_params) = log
            .iter()
            .find(|(tool, _)| tool == names::GENERATE_SCENE_IMAGE)
            .unwrap();
        assert_eq!(
            image_params["imagePrompt"],
            "Enhanced prompt based on default analysis"
        );
        assert_eq!(
            result.output("image"),
            Some(&json!("https://example.com/images/p1/s1.jpg"))
        );
        assert_eq!(
            orchestrator.work_unit("s1").await.unwrap().status,
            WorkUnitStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_missing_field_fails_that_step() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call("tool_1", Ok(ToolCallResult::Success(json!({"other": 1}))));
        let orchestrator = orchestrator(transport);

        let steps = vec![
            StepSpec::call("step1", "tool_1").extract("videoUrl"),
            StepSpec::call("step2", "tool_2"),
        ];
        let result = orchestrator.run_pipeline("w", steps).await.unwrap();
        let failure = result.failure.unwrap();
        assert_eq!(failure.index, 0);
        assert_eq!(
            failure.source.cause,
            InvocationCause::MissingField("videoUrl".to_string())
        );
        assert_eq!(result.steps[1].status(), StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_param_builder_error_skips_call() {
        let transport = Arc::new(ScriptedTransport::new());
        let orchestrator = orchestrator(transport.clone());

        let steps = vec![StepSpec::call("image", "tool_1")
            .with_params(|ctx| ctx.require_str("prompt").map(|p| json!({ "imagePrompt": p })))];
        let result = orchestrator.run_pipeline("w", steps).await.unwrap();

        let failure = result.failure.unwrap();
        assert!(matches!(failure.source.cause, InvocationCause::InvalidParameters(_)));
        assert_eq!(transport.tool_calls("tool_1"), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_does_not_override_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call(
            names::GET_VIDEO_PROJECT,
            Ok(ToolCallResult::Failure("not found".to_string())),
        );
        let orchestrator = orchestrator(transport);

        let result = orchestrator
            .run_pipeline("w", vec![StepSpec::call("only", "tool_1")])
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.refreshed.is_none());
        assert!(result.refresh_error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_stream_step_reports_progress_events() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_stream_start(
            names::GENERATE_SCENE_VIDEO,
            Ok(StreamStart::Handle(StreamHandle::new("st-1"))),
        );
        transport
            .push_poll("st-1", Ok(StreamPoll::Pending { progress: json!({"percent": 50}) }))
            .push_poll(
                "st-1",
                Ok(StreamPoll::Complete(ToolCallResult::Success(json!({"videoUrl": "v.mp4"})))),
            );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = orchestrator(transport).with_events(tx);
        let steps = vec![StepSpec::stream("video", names::GENERATE_SCENE_VIDEO).extract("videoUrl")];
        let result = orchestrator.run_pipeline("s1", steps).await.unwrap();
        assert_eq!(result.output("video"), Some(&json!("v.mp4")));
        assert_eq!(result.steps[0].detail.as_deref(), Some(r#"{"percent":50}"#));

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                PipelineEvent::RunStarted { .. } => "run_started",
                PipelineEvent::StepStarted { .. } => "step_started",
                PipelineEvent::StepProgress { progress, .. } => {
                    assert_eq!(progress["percent"], 50);
                    "step_progress"
                }
                PipelineEvent::StepCompleted { .. } => "step_completed",
                PipelineEvent::StepFailed { .. } => "step_failed",
                PipelineEvent::Refreshed { .. } => "refreshed",
                PipelineEvent::RunFinished { .. } => "run_finished",
            });
        }
        assert_eq!(
            kinds,
            vec![
                "run_started",
                "step_started",
                "step_progress",
                "step_completed",
                "refreshed",
                "run_finished"
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(20)));
        let orchestrator = Arc::new(orchestrator(transport));

        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run_pipeline("scene-1", four_steps()).await })
        };
        while !orchestrator.is_running("scene-1") {
            tokio::task::yield_now().await;
        }

        let second = orchestrator.run_pipeline("scene-1", four_steps()).await;
        assert!(matches!(second, Err(ReelError::AlreadyRunning(ref id)) if id == "scene-1"));

        // 其他 work unit 不受影响
        assert!(!orchestrator.is_running("scene-2"));

        let first = first.await.unwrap().unwrap();
        assert!(first.is_success());
        assert!(!orchestrator.is_running("scene-1"));
    }

    #[tokio::test]
    async fn test_invalid_pipeline_rejected_without_lock() {
        let orchestrator = orchestrator(Arc::new(ScriptedTransport::new()));
        let err = orchestrator.run_pipeline("w", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ReelError::InvalidPipeline(_)));
        assert!(!orchestrator.is_running("w"));
    }

    #[test]
    fn test_parse_project_shapes() {
        let nested = json!({"project": {"id": "p1", "status": "draft"}});
        assert_eq!(parse_project("t", nested).unwrap().id, "p1");

        let flat = json!({"id": "p2", "status": "completed", "scenes": []});
        assert_eq!(parse_project("t", flat).unwrap().id, "p2");

        let err = parse_project("t", json!({"project": null})).unwrap_err();
        assert_eq!(err.cause, InvocationCause::MissingField("project".to_string()));
    }
}
