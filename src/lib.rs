//! Reel - 视频创作工具后端客户端
//!
//! 模块划分：
//! - **clock**: 时钟抽象（TokioClock / ManualClock），心跳、重试与轮询的所有等待都经过它
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复引擎、连接状态
//! - **transport**: 工具后端通道（HTTP / 脚本化 Mock）
//! - **session**: 会话连接生命周期、心跳自愈、工具定义缓存
//! - **tools**: 工具协议类型、调用器（重试）、流式轮询、降级策略、内置目录
//! - **pipeline**: 多步骤素材生成流水线编排
//! - **project**: 视频项目类型与类型化客户端
//! - **observability**: 日志初始化

pub mod clock;
pub mod config;
pub mod core;
pub mod observability;
pub mod pipeline;
pub mod project;
pub mod session;
pub mod tools;
pub mod transport;

pub use crate::core::{RecoveryAction, RecoveryEngine, ReelError};
pub use pipeline::{PipelineOrchestrator, PipelineRunResult};
pub use project::ProjectClient;
pub use session::{Session, SessionRegistry};
pub use tools::{StreamPoller, ToolInvoker};
