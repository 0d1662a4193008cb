//! 预置流水线：单个场景的素材生成、整片合成

use crate::config::PipelineSection;
use crate::pipeline::types::StepSpec;
use crate::tools::names;
use crate::tools::params::*;

pub const IMAGE_PROMPT: &str = "image_prompt";
pub const SCENE_IMAGE: &str = "scene_image";
pub const SCENE_SCRIPT: &str = "scene_script";
pub const SCENE_VIDEO: &str = "scene_video";
pub const COMPILE: &str = "compile";

/// 生成参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOptions {
    pub product_shot_version: String,
    pub aspect_ratio: String,
    pub output_format: String,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            product_shot_version: "v2".to_string(),
            aspect_ratio: "16:9".to_string(),
            output_format: "mp4".to_string(),
        }
    }
}

impl From<&PipelineSection> for AssetOptions {
    fn from(section: &PipelineSection) -> Self {
        Self {
            product_shot_version: section.product_shot_version.clone(),
            aspect_ratio: section.aspect_ratio.clone(),
            output_format: section.output_format.clone(),
        }
    }
}

/// 场景素材：图片提示词 → 场景图 → 脚本 → 场景视频（流式）
pub fn scene_asset_steps(scene_id: &str, opts: &AssetOptions) -> Vec<StepSpec> {
    let scene = scene_id.to_string();

    let prompt = {
        let scene = scene.clone();
        StepSpec::call(IMAGE_PROMPT, names::GENERATE_IMAGE_PROMPT)
            .with_params(move |ctx| {
                Ok(to_params(&GenerateImagePromptParams {
                    project_id: ctx.project_id.clone(),
                    scene_id: scene.clone(),
                    image_analysis: None,
                }))
            })
            .extract("prompt")
    };

    let image = {
        let scene = scene.clone();
        let version = opts.product_shot_version.clone();
        StepSpec::call(SCENE_IMAGE, names::GENERATE_SCENE_IMAGE)
            .with_params(move |ctx| {
                Ok(to_params(&GenerateSceneImageParams {
                    project_id: ctx.project_id.clone(),
                    scene_id: scene.clone(),
                    product_shot_version: Some(version.clone()),
                    image_prompt: Some(ctx.require_str(IMAGE_PROMPT)?.to_string()),
                }))
            })
            .extract("imageUrl")
    };

    let script = {
        let scene = scene.clone();
        StepSpec::call(SCENE_SCRIPT, names::GENERATE_SCENE_SCRIPT)
            .with_params(move |ctx| {
                Ok(to_params(&GenerateSceneScriptParams {
                    project_id: ctx.project_id.clone(),
                    scene_id: scene.clone(),
                    context_prompt: None,
                }))
            })
            .extract("script")
    };

    let video = {
        let aspect_ratio = opts.aspect_ratio.clone();
        StepSpec::stream(SCENE_VIDEO, names::GENERATE_SCENE_VIDEO)
            .with_params(move |ctx| {
                Ok(to_params(&GenerateSceneVideoParams {
                    project_id: ctx.project_id.clone(),
                    scene_id: scene.clone(),
                    aspect_ratio: Some(aspect_ratio.clone()),
                }))
            })
            .extract("videoUrl")
    };

    vec![prompt, image, script, video]
}

/// 整片合成
pub fn compile_steps(opts: &AssetOptions) -> Vec<StepSpec> {
    let format = opts.output_format.clone();
    vec![StepSpec::call(COMPILE, names::COMPILE_VIDEO)
        .with_params(move |ctx| {
            Ok(to_params(&CompileVideoParams {
                project_id: ctx.project_id.clone(),
                output_format: Some(format.clone()),
                config: None,
            }))
        })
        .extract("videoUrl")]
}
