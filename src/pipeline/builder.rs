//! 流水线构建器
//!
//! 提供流畅的API来组装有序步骤

use std::collections::HashSet;

use crate::core::ReelError;
use crate::pipeline::types::StepSpec;

/// 流水线定义：有序步骤列表
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

/// 流水线构建器
pub struct PipelineBuilder {
    name: String,
    steps: Vec<StepSpec>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// 追加一个步骤
    pub fn step(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// 追加多个步骤（保持顺序）
    pub fn steps(mut self, specs: impl IntoIterator<Item = StepSpec>) -> Self {
        self.steps.extend(specs);
        self
    }

    /// 构建：至少一个步骤，步骤名唯一且非空
    pub fn build(self) -> Result<Pipeline, ReelError> {
        validate(&self.steps)?;
        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
        })
    }
}

pub(crate) fn validate(steps: &[StepSpec]) -> Result<(), ReelError> {
    if steps.is_empty() {
        return Err(ReelError::InvalidPipeline("pipeline has no steps".to_string()));
    }
    let mut seen = HashSet::new();
    for spec in steps {
        if spec.name.trim().is_empty() || spec.tool.trim().is_empty() {
            return Err(ReelError::InvalidPipeline(
                "step name and tool are required".to_string(),
            ));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(ReelError::InvalidPipeline(format!(
                "duplicate step name `{}`",
                spec.name
            )));
        }
    }
    Ok(())
}
