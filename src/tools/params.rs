//! 工具参数类型（schemars 自动生成参数 Schema）
//!
//! 既用于内置工具目录的 parameterSchema，也用于流水线 / ProjectClient 构造调用参数，
//! 保证两边字段名一致（camelCase）。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::project::ProjectStatus;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoProjectParams {
    /// Name of the video project
    pub name: String,
    /// Description of the video project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetVideoProjectParams {
    /// ID of the video project
    pub project_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListVideoProjectsParams {
    /// Maximum number of projects to return
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Number of projects to skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Filter projects by status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoProjectParams {
    /// ID of the video project
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddSceneParams {
    pub project_id: String,
    /// Name of the scene
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Order of the scene in the project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadProductImageParams {
    pub project_id: String,
    /// Name of the file being uploaded
    pub filename: String,
    /// Base64 encoded image data or reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImagePromptParams {
    pub project_id: String,
    /// ID of the scene to generate prompt for
    pub scene_id: String,
    /// Optional image analysis to use as context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_analysis: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSceneDescriptionParams {
    pub project_id: String,
    pub scene_id: String,
    /// Whether to use existing description as context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_description: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSceneImageParams {
    pub project_id: String,
    pub scene_id: String,
    /// Version of the product shot generator to use (v1 / v2 / v3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_shot_version: Option<String>,
    /// Prompt to use for image generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSceneScriptParams {
    pub project_id: String,
    pub scene_id: String,
    /// Additional context for script generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSceneVideoParams {
    pub project_id: String,
    pub scene_id: String,
    /// Aspect ratio of the video (16:9 / 9:16 / 1:1 / 4:3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompileVideoParams {
    pub project_id: String,
    /// Output format of the compiled video (mp4 / webm)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Configuration for the video compilation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// 返回参数类型的 JSON Schema
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_default()
}

/// 序列化参数；参数类型都是纯数据结构，失败时退化为空对象
pub fn to_params<T: Serialize>(params: &T) -> Value {
    serde_json::to_value(params).unwrap_or_else(|_| Value::Object(Default::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_are_camel_case_and_skip_none() {
        let value = to_params(&GenerateSceneImageParams {
            project_id: "p1".to_string(),
            scene_id: "s1".to_string(),
            product_shot_version: Some("v2".to_string()),
            image_prompt: None,
        });
        assert_eq!(
            value,
            serde_json::json!({"projectId": "p1", "sceneId": "s1", "productShotVersion": "v2"})
        );
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = schema_of::<GenerateSceneVideoParams>();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"projectId"));
        assert!(required.contains(&"sceneId"));
        assert!(!required.contains(&"aspectRatio"));
        assert!(schema["properties"]["aspectRatio"].is_object());
    }
}
