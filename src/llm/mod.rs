pub mod accumulator;
pub mod broker;
pub mod chat_session;
pub mod conversation;
pub mod executor;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod tool_call_ids;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::{LlmBroker, OrchestratorConfig, RunRequest};
pub use chat_session::{ChatSession, ChatSessionBuilder};
pub use gateway::{CompletionConfig, DeltaStream, LlmGateway, OutputConstraint};
pub use models::{
    FinishReason, LlmMessage, MessageRole, Part, PartDelta, StreamDelta, ToolCallDelta, ToolPart,
};
pub use orchestrator::{
    EmptyTurnPolicy, EmptyTurnVerdict, PostToolEmptyTurnPolicy, RunEvent, RunOutcome,
};
pub use tools::{FunctionDescriptor, LlmTool, ToolDescriptor, ToolRegistry};
