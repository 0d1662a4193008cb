//! 工具定义缓存
//!
//! 只在显式 invalidate 或会话断开时清空，不做过期淘汰。

use crate::tools::ToolDefinition;

#[derive(Debug, Default)]
pub struct ToolCache {
    tools: Option<Vec<ToolDefinition>>,
}

impl ToolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&[ToolDefinition]> {
        self.tools.as_deref()
    }

    pub fn store(&mut self, tools: Vec<ToolDefinition>) {
        self.tools = Some(tools);
    }

    pub fn clear(&mut self) {
        self.tools = None;
    }

    pub fn len(&self) -> usize {
        self.tools.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_listing_still_counts_as_cached() {
        let mut cache = ToolCache::new();
        assert!(cache.get().is_none());
        cache.store(Vec::new());
        assert_eq!(cache.get().map(<[ToolDefinition]>::len), Some(0));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_store_and_clear() {
        let mut cache = ToolCache::new();
        cache.store(vec![ToolDefinition::new("compile_video", "Compile", json!({}))]);
        assert_eq!(cache.len(), 1);
        cache.clear();
        cache.clear();
        assert!(cache.get().is_none());
    }
}
