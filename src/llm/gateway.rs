use crate::error::Result;
use crate::llm::models::{LlmMessage, StreamDelta};
use crate::llm::tools::ToolDescriptor;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Configuration for LLM completion
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub temperature: f32,
    pub max_tokens: usize,
    pub num_predict: Option<i32>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            max_tokens: 16384,
            num_predict: None,
        }
    }
}

/// Structured-output requirement handed to the gateway alongside the tools.
///
/// The model is expected to answer by calling `capture_tool` with arguments matching
/// `schema`. Gateways that support forced tool choice should force it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConstraint {
    pub schema: Value,
    pub capture_tool: String,
}

/// Stream of response chunks from a gateway
pub type DeltaStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send + 'a>>;

/// Abstract interface for LLM providers.
///
/// Implementations translate the canonical messages and tool descriptors into their
/// provider's wire format, perform the request (including any retry policy), and map
/// the streamed response back into [`StreamDelta`]s.
pub trait LlmGateway: Send + Sync {
    /// Stream a completion for the given conversation
    fn complete_stream<'a>(
        &'a self,
        model: &'a str,
        messages: &'a [LlmMessage],
        tools: &'a [ToolDescriptor],
        output: Option<&'a OutputConstraint>,
        config: &'a CompletionConfig,
    ) -> DeltaStream<'a>;
}
