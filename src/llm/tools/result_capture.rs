use crate::llm::models::ToolPart;
use crate::llm::tools::ToolDescriptor;
use serde_json::Value;

/// Prefix reserved for tools the orchestrator injects itself
pub const RESERVED_TOOL_PREFIX: &str = "__";

/// Name of the synthetic tool that delivers a structured final answer
pub const RESULT_CAPTURE_TOOL_NAME: &str = "__submit_result";

/// Synthetic tool bound to the caller's output schema.
///
/// It has no handler: when the model calls it, the call's arguments are the run's
/// output and the run ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCaptureTool {
    schema: Value,
}

impl ResultCaptureTool {
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            RESULT_CAPTURE_TOOL_NAME,
            "Submit the final answer. Call this exactly once, with arguments that match the \
             required schema, when you are ready to respond.",
            self.schema.clone(),
        )
    }

    /// Whether a call part is addressed to this tool
    pub fn is_capture_call(call: &ToolPart) -> bool {
        call.is_call() && call.name == RESULT_CAPTURE_TOOL_NAME
    }
}
