//! 会话注册表：project_id -> Session
//!
//! 展示层打开哪个项目就取哪个会话；关闭项目时 cleanup 并移除。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Session, SessionConfig};
use crate::clock::Clock;
use crate::core::SessionSnapshot;
use crate::transport::ToolTransport;

pub struct SessionRegistry {
    transport: Arc<dyn ToolTransport>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn ToolTransport>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            clock,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 获取项目的会话，不存在则创建（不会自动连接）
    pub async fn session(&self, project_id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(project_id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(project_id.to_string()).or_insert_with(|| {
            tracing::debug!(project_id, "Creating session");
            Session::new(
                project_id,
                Arc::clone(&self.transport),
                Arc::clone(&self.clock),
                self.config.clone(),
            )
        }))
    }

    pub async fn get(&self, project_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(project_id).cloned()
    }

    /// cleanup 并移除；返回是否存在该会话
    pub async fn cleanup(&self, project_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(project_id);
        match removed {
            Some(session) => {
                session.cleanup().await;
                true
            }
            None => false,
        }
    }

    pub async fn cleanup_all(&self) {
        let drained: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in drained {
            session.cleanup().await;
        }
    }

    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(session.snapshot().await);
        }
        out.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        out
    }
}
