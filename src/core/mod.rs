//! 核心层：错误与恢复、状态投影

pub mod error;
pub mod recovery;
pub mod state;

pub use error::{
    InvocationCause, PipelineStepError, RecoveryAction, ReelError, ToolInvocationError,
    TransportError,
};
pub use recovery::RecoveryEngine;
pub use state::{ConnectionStatus, SessionSnapshot};
