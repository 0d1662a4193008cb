pub mod assets;
pub mod builder;
pub mod engine;
pub mod types;

pub use assets::{compile_steps, scene_asset_steps, AssetOptions};
pub use builder::{Pipeline, PipelineBuilder};
pub use engine::PipelineOrchestrator;
pub use types::*;
