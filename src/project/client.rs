//! 项目客户端：对视频项目相关工具的类型化封装
//!
//! 简单的增删改查直接走 ToolInvoker；素材生成与整片合成走 PipelineOrchestrator，
//! 以获得步骤级失败归因与同一 work unit 的互斥。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::{ProjectStatus, VideoProject, VideoScene};
use crate::core::{InvocationCause, ReelError, ToolInvocationError, TransportError};
use crate::pipeline::engine::parse_project;
use crate::pipeline::{assets, compile_steps, scene_asset_steps, AssetOptions, PipelineOrchestrator, PipelineRunResult};
use crate::tools::params::*;
use crate::tools::{names, ToolCallResult, ToolInvoker};

/// generate_all_assets 的汇总
#[derive(Debug, Clone, Serialize)]
pub struct AssetsReport {
    pub scenes: Vec<PipelineRunResult>,
    /// 已有图片和视频、本次跳过的场景
    pub skipped: Vec<String>,
    pub compile: Option<PipelineRunResult>,
}

impl AssetsReport {
    pub fn is_success(&self) -> bool {
        self.scenes.iter().all(PipelineRunResult::is_success)
            && self.compile.as_ref().is_some_and(PipelineRunResult::is_success)
    }

    pub fn video_url(&self) -> Option<&str> {
        self.compile.as_ref()?.output(assets::COMPILE)?.as_str()
    }
}

pub struct ProjectClient {
    orchestrator: Arc<PipelineOrchestrator>,
    options: AssetOptions,
}

impl ProjectClient {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, options: AssetOptions) -> Self {
        Self {
            orchestrator,
            options,
        }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    fn invoker(&self) -> &ToolInvoker {
        self.orchestrator.invoker()
    }

    pub fn project_id(&self) -> &str {
        self.invoker().project_id()
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<VideoProject, ToolInvocationError> {
        let params = to_params(&CreateVideoProjectParams {
            name: name.to_string(),
            description: description.map(str::to_string),
        });
        let data = self.call(names::CREATE_VIDEO_PROJECT, params).await?;
        parse_project(names::CREATE_VIDEO_PROJECT, data)
    }

    /// 当前会话对应的项目
    pub async fn get_project(&self) -> Result<VideoProject, ToolInvocationError> {
        self.orchestrator.refresh().await
    }

    pub async fn list_projects(
        &self,
        filter: ListVideoProjectsParams,
    ) -> Result<Vec<VideoProject>, ToolInvocationError> {
        let tool = names::LIST_VIDEO_PROJECTS;
        let mut data = self.call(tool, to_params(&filter)).await?;
        let projects = field(tool, &mut data, "projects")?;
        serde_json::from_value(projects)
            .map_err(|e| ToolInvocationError::new(tool, TransportError::Decode(e.to_string())))
    }

    pub async fn update_project(
        &self,
        name: Option<&str>,
        description: Option<&str>,
        status: Option<ProjectStatus>,
    ) -> Result<VideoProject, ToolInvocationError> {
        let params = to_params(&UpdateVideoProjectParams {
            project_id: self.project_id().to_string(),
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            status,
        });
        let data = self.call(names::UPDATE_VIDEO_PROJECT, params).await?;
        parse_project(names::UPDATE_VIDEO_PROJECT, data)
    }

    /// 添加场景；order 取当前场景数（追加到末尾）
    pub async fn add_scene(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<VideoScene, ToolInvocationError> {
        let tool = names::ADD_SCENE;
        let order = self.get_project().await?.scenes.len() as u32;
        let params = to_params(&AddSceneParams {
            project_id: self.project_id().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            order: Some(order),
        });
        let mut data = self.call(tool, params).await?;
        let scene = field(tool, &mut data, "scene")?;
        serde_json::from_value(scene)
            .map_err(|e| ToolInvocationError::new(tool, TransportError::Decode(e.to_string())))
    }

    /// 上传产品图，返回图片地址
    pub async fn upload_product_image(
        &self,
        filename: &str,
        file_data: Option<String>,
    ) -> Result<String, ToolInvocationError> {
        let tool = names::UPLOAD_PRODUCT_IMAGE;
        let params = to_params(&UploadProductImageParams {
            project_id: self.project_id().to_string(),
            filename: filename.to_string(),
            file_data,
        });
        let mut data = self.call(tool, params).await?;
        string_field(tool, &mut data, "imageUrl")
    }

    pub async fn generate_scene_description(
        &self,
        scene_id: &str,
    ) -> Result<String, ToolInvocationError> {
        let tool = names::GENERATE_SCENE_DESCRIPTION;
        let params = to_params(&GenerateSceneDescriptionParams {
            project_id: self.project_id().to_string(),
            scene_id: scene_id.to_string(),
            use_description: None,
        });
        let mut data = self.call(tool, params).await?;
        string_field(tool, &mut data, "description")
    }

    /// 为单个场景生成全部素材（work unit = 场景）
    pub async fn generate_scene_assets(
        &self,
        scene_id: &str,
    ) -> Result<PipelineRunResult, ReelError> {
        self.orchestrator
            .run_pipeline(scene_id, scene_asset_steps(scene_id, &self.options))
            .await
    }

    /// 合成整片，返回视频地址（work unit = 项目）
    pub async fn compile_video(&self) -> Result<String, ReelError> {
        let result = self.run_compile().await?;
        compiled_url(result)
    }

    async fn run_compile(&self) -> Result<PipelineRunResult, ReelError> {
        self.orchestrator
            .run_pipeline(self.project_id(), compile_steps(&self.options))
            .await
    }

    /// 按顺序为每个缺素材的场景生成素材，全部成功后合成；遇到失败的场景即停止
    pub async fn generate_all_assets(&self) -> Result<AssetsReport, ReelError> {
        let project = self.get_project().await?;
        let mut report = AssetsReport {
            scenes: Vec::new(),
            skipped: Vec::new(),
            compile: None,
        };

        for scene in project.ordered_scenes() {
            if scene.has_all_assets() {
                report.skipped.push(scene.id.clone());
                continue;
            }
            let result = self.generate_scene_assets(&scene.id).await?;
            let failed = !result.is_success();
            report.scenes.push(result);
            if failed {
                tracing::warn!(scene_id = %scene.id, "Scene assets failed, skipping compile");
                return Ok(report);
            }
        }

        report.compile = Some(self.run_compile().await?);
        Ok(report)
    }

    async fn call(&self, tool: &str, params: Value) -> Result<Value, ToolInvocationError> {
        match self.invoker().call_tool(tool, params).await? {
            ToolCallResult::Success(data) => Ok(data),
            ToolCallResult::Failure(message) => Err(ToolInvocationError::new(
                tool,
                InvocationCause::ToolReported(message),
            )),
        }
    }
}

fn compiled_url(result: PipelineRunResult) -> Result<String, ReelError> {
    if let Some(failure) = result.failure {
        return Err(failure.into());
    }
    result
        .output(assets::COMPILE)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ToolInvocationError::new(
                names::COMPILE_VIDEO,
                InvocationCause::MissingField("videoUrl".to_string()),
            )
            .into()
        })
}

fn field(tool: &str, data: &mut Value, name: &str) -> Result<Value, ToolInvocationError> {
    match data.get_mut(name).map(Value::take) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(ToolInvocationError::new(
            tool,
            InvocationCause::MissingField(name.to_string()),
        )),
    }
}

fn string_field(tool: &str, data: &mut Value, name: &str) -> Result<String, ToolInvocationError> {
    match field(tool, data, name)? {
        Value::String(s) => Ok(s),
        _ => Err(ToolInvocationError::new(
            tool,
            InvocationCause::MissingField(name.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::pipeline::StepStatus;
    use crate::session::{Session, SessionConfig};
    use crate::tools::{InvokerConfig, StreamConfig};
    use crate::transport::ScriptedTransport;

    fn client(transport: Arc<ScriptedTransport>) -> ProjectClient {
        let session = Session::new(
            "p1",
            transport,
            Arc::new(ManualClock::new()),
            SessionConfig {
                heartbeat_enabled: false,
                ..SessionConfig::default()
            },
        );
        let orchestrator = PipelineOrchestrator::new(
            ToolInvoker::new(session, InvokerConfig::default()),
            StreamConfig::default(),
        );
        ProjectClient::new(Arc::new(orchestrator), AssetOptions::default())
    }

    #[tokio::test]
    async fn test_create_and_list_projects() {
        let client = client(Arc::new(ScriptedTransport::new()));
        let project = client
            .create_project("Summer Launch", Some("bikes"))
            .await
            .unwrap();
        assert_eq!(project.id, "project-summer-launch");
        assert_eq!(project.status, ProjectStatus::Draft);

        let projects = client
            .list_projects(ListVideoProjectsParams::default())
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);
    }

    #[tokio::test]
    async fn test_add_scene_appends_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport.clone());

        let scene = client.add_scene("Intro", None).await.unwrap();
        assert_eq!(scene.order, 2);
        assert_eq!(scene.id, "scene-3");

        let (_, params) = transport
            .call_log()
            .into_iter()
            .find(|(tool, _)| tool == names::ADD_SCENE)
            .unwrap();
        assert_eq!(params["projectId"], "p1");
    }

    #[tokio::test]
    async fn test_upload_missing_field() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call(
            names::UPLOAD_PRODUCT_IMAGE,
            Ok(ToolCallResult::Success(json!({"url": "x"}))),
        );
        let client = client(transport);

        let err = client.upload_product_image("bike.png", None).await.unwrap_err();
        assert_eq!(err.cause, InvocationCause::MissingField("imageUrl".to_string()));
    }

    #[tokio::test]
    async fn test_generate_all_assets_then_compile() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = client(transport.clone());

        let report = client.generate_all_assets().await.unwrap();
        assert_eq!(report.scenes.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(report.is_success());
        assert_eq!(report.video_url(), Some("https://example.com/videos/p1/output.mp4"));
        assert_eq!(transport.tool_calls(names::GENERATE_SCENE_VIDEO), 2);
        assert_eq!(transport.tool_calls(names::COMPILE_VIDEO), 1);
    }

    #[tokio::test]
    async fn test_failed_scene_stops_before_compile() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call(
            names::GENERATE_SCENE_SCRIPT,
            Ok(ToolCallResult::Failure("scene has no description".to_string())),
        );
        let client = client(transport.clone());

        let report = client.generate_all_assets().await.unwrap();
        assert_eq!(report.scenes.len(), 1);
        assert_eq!(report.scenes[0].status(), StepStatus::Error);
        assert!(report.compile.is_none());
        assert!(!report.is_success());
        assert_eq!(transport.tool_calls(names::COMPILE_VIDEO), 0);
    }

    #[tokio::test]
    async fn test_compile_video_failure_is_step_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_call(
            names::COMPILE_VIDEO,
            Ok(ToolCallResult::Failure("no scenes".to_string())),
        );
        let client = client(transport);

        let err = client.compile_video().await.unwrap_err();
        match err {
            ReelError::PipelineStep(e) => {
                assert_eq!(e.step, assets::COMPILE);
                assert_eq!(e.source.tool, names::COMPILE_VIDEO);
            }
            other => panic!("Expected PipelineStep, got {other:?}"),
        }
    }
}
