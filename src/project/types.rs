//! 视频项目 / 场景类型（后端 get_video_project 等工具返回的数据形状）

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 项目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// 场景状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// 视频项目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub scenes: Vec<VideoScene>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl VideoProject {
    /// 按 order 排序后的场景
    pub fn ordered_scenes(&self) -> Vec<&VideoScene> {
        let mut scenes: Vec<&VideoScene> = self.scenes.iter().collect();
        scenes.sort_by_key(|s| s.order);
        scenes
    }

    pub fn scene(&self, scene_id: &str) -> Option<&VideoScene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }
}

/// 项目中的单个场景
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoScene {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: SceneStatus,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
}

impl VideoScene {
    /// 图片与视频是否都已生成
    pub fn has_all_assets(&self) -> bool {
        self.image_url.is_some() && self.video_url.is_some()
    }
}
