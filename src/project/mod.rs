//! 视频项目：数据类型与类型化客户端

pub mod client;
pub mod types;

pub use client::{AssetsReport, ProjectClient};
pub use types::{ProjectStatus, SceneStatus, VideoProject, VideoScene};
