//! 会话层：连接生命周期、心跳自愈、工具定义缓存

mod cache;
mod connection;
pub mod heartbeat;
pub mod registry;

pub use connection::{Session, SessionConfig};
pub use heartbeat::{backoff_delay, HeartbeatHandle, HeartbeatOutcome};
pub use registry::SessionRegistry;
