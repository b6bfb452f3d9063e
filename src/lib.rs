//! Streaming, tool-calling conversation runs over any LLM gateway.
//!
//! [`LlmBroker`](llm::LlmBroker) drives a run turn by turn: it streams the model's output,
//! consolidates each turn into one message, executes the tools that message calls, and
//! feeds the results back until the model is done or submits a structured result.

pub mod error;
pub mod llm;
pub mod tracer;

pub use error::{Result, ToolflowError};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Result, ToolflowError};
    pub use crate::llm::tools::{CurrentDatetimeTool, LlmTool, ToolDescriptor, ToolRegistry};
    pub use crate::llm::{
        ChatSession, CompletionConfig, LlmBroker, LlmGateway, LlmMessage, MessageRole,
        OrchestratorConfig, RunEvent, RunOutcome, RunRequest,
    };
    pub use crate::tracer::TracerSystem;
}
