//! 内置工具目录
//!
//! 后端工具集的静态副本：tool listing 失败且缓存为空时，调用方可以用它作为降级默认值。

use serde_json::Value;

use super::params::*;
use super::ToolDefinition;

/// 流水线使用的工具名
pub mod names {
    pub const CREATE_VIDEO_PROJECT: &str = "create_video_project";
    pub const GET_VIDEO_PROJECT: &str = "get_video_project";
    pub const LIST_VIDEO_PROJECTS: &str = "list_video_projects";
    pub const UPDATE_VIDEO_PROJECT: &str = "update_video_project";
    pub const ADD_SCENE: &str = "add_scene";
    pub const UPLOAD_PRODUCT_IMAGE: &str = "upload_product_image";
    pub const GENERATE_IMAGE_PROMPT: &str = "generate_image_prompt";
    pub const GENERATE_SCENE_DESCRIPTION: &str = "generate_scene_description";
    pub const GENERATE_SCENE_IMAGE: &str = "generate_scene_image";
    pub const GENERATE_SCENE_VIDEO: &str = "generate_scene_video";
    pub const GENERATE_SCENE_SCRIPT: &str = "generate_scene_script";
    pub const COMPILE_VIDEO: &str = "compile_video";
}

/// 内置工具定义（顺序与后端目录一致）
pub fn builtin_tool_definitions() -> Vec<ToolDefinition> {
    use names::*;

    let entries: [(&str, &str, Value); 12] = [
        (
            CREATE_VIDEO_PROJECT,
            "Create a new video project",
            schema_of::<CreateVideoProjectParams>(),
        ),
        (
            GET_VIDEO_PROJECT,
            "Get video project details",
            schema_of::<GetVideoProjectParams>(),
        ),
        (
            LIST_VIDEO_PROJECTS,
            "List all video projects",
            schema_of::<ListVideoProjectsParams>(),
        ),
        (
            UPDATE_VIDEO_PROJECT,
            "Update video project details",
            schema_of::<UpdateVideoProjectParams>(),
        ),
        (
            ADD_SCENE,
            "Add a new scene to the video project",
            schema_of::<AddSceneParams>(),
        ),
        (
            UPLOAD_PRODUCT_IMAGE,
            "Upload a product image for scene creation",
            schema_of::<UploadProductImageParams>(),
        ),
        (
            GENERATE_IMAGE_PROMPT,
            "Generate image prompt for the current scene",
            schema_of::<GenerateImagePromptParams>(),
        ),
        (
            GENERATE_SCENE_DESCRIPTION,
            "Generate a description for the current scene",
            schema_of::<GenerateSceneDescriptionParams>(),
        ),
        (
            GENERATE_SCENE_IMAGE,
            "Generate an image for the current scene",
            schema_of::<GenerateSceneImageParams>(),
        ),
        (
            GENERATE_SCENE_VIDEO,
            "Generate a video for the current scene",
            schema_of::<GenerateSceneVideoParams>(),
        ),
        (
            GENERATE_SCENE_SCRIPT,
            "Generate a script for the current scene",
            schema_of::<GenerateSceneScriptParams>(),
        ),
        (
            COMPILE_VIDEO,
            "Compile all scenes into a final video",
            schema_of::<CompileVideoParams>(),
        ),
    ];

    entries
        .into_iter()
        .map(|(name, description, schema)| ToolDefinition::new(name, description, schema))
        .collect()
}

/// 目录转 JSON（供展示层 / 提示词使用）
pub fn to_schema_json(tools: &[ToolDefinition]) -> String {
    serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogue_covers_pipeline_tools() {
        let tools = builtin_tool_definitions();
        assert_eq!(tools.len(), 12);
        for name in [
            names::GENERATE_IMAGE_PROMPT,
            names::GENERATE_SCENE_IMAGE,
            names::GENERATE_SCENE_SCRIPT,
            names::GENERATE_SCENE_VIDEO,
            names::COMPILE_VIDEO,
            names::GET_VIDEO_PROJECT,
        ] {
            assert!(tools.iter().any(|t| t.name == name), "missing {name}");
        }
    }

    #[test]
    fn test_schema_json_round_trips_names() {
        let json = to_schema_json(&builtin_tool_definitions());
        assert!(json.contains("\"compile_video\""));
        assert!(json.contains("\"parameters\""));
    }
}
