//! Registry of the tools available to one run.
//!
//! The registry is assembled before a run starts and is read-only while the run is in
//! flight. Names are unique, and names under the reserved `__` prefix belong to the
//! orchestrator.

use crate::error::{Result, ToolflowError};
use crate::llm::tools::result_capture::{ResultCaptureTool, RESERVED_TOOL_PREFIX};
use crate::llm::tools::{LlmTool, ToolDescriptor};
use std::sync::Arc;

/// What a tool name resolves to during a run
#[derive(Clone)]
pub enum ToolBinding<'a> {
    /// A caller-registered tool with a handler
    Handler(Arc<dyn LlmTool>),
    /// The synthetic tool that captures structured output
    ResultCapture(&'a ResultCaptureTool),
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn LlmTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of tools, rejecting duplicate or reserved names
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn LlmTool>>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn LlmTool>) -> Result<()> {
        let name = tool.descriptor().function.name;
        if name.starts_with(RESERVED_TOOL_PREFIX) {
            return Err(ToolflowError::ConfigError(format!(
                "tool name {} uses the reserved prefix {}",
                name, RESERVED_TOOL_PREFIX
            )));
        }
        if self.get(&name).is_some() {
            return Err(ToolflowError::ConfigError(format!("duplicate tool name: {}", name)));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_tool(mut self, tool: Arc<dyn LlmTool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmTool>> {
        self.tools.iter().find(|tool| tool.matches(name)).cloned()
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.descriptor().function.name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
