//! Multi-run chat sessions.
//!
//! A [`ChatSession`] keeps a conversation in memory between runs. Each query is sent as a
//! new run over the session's history, and the history the run hands back replaces the
//! session's copy, tool calls and results included.

use crate::error::{Result, ToolflowError};
use crate::llm::broker::{LlmBroker, RunRequest};
use crate::llm::gateway::CompletionConfig;
use crate::llm::models::LlmMessage;
use crate::llm::orchestrator::{EventStream, RunEvent};
use crate::llm::tools::ToolRegistry;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use tracing::debug;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// A chat session that carries its history from one run to the next.
///
/// # Examples
///
/// ```ignore
/// use toolflow::llm::{ChatSession, LlmBroker};
/// use std::sync::Arc;
///
/// let broker = LlmBroker::new("qwen3:32b", gateway);
/// let mut session = ChatSession::builder(broker)
///     .system_prompt("You are a terse assistant.")
///     .build();
///
/// let answer = session.send("What is Rust?").await?;
/// let follow_up = session.send("Who maintains it?").await?;
/// ```
pub struct ChatSession {
    broker: LlmBroker,
    system_prompt: String,
    messages: Vec<LlmMessage>,
    tools: ToolRegistry,
    temperature: f32,
}

impl ChatSession {
    /// Create a new chat session with default settings
    pub fn new(broker: LlmBroker) -> Self {
        Self::builder(broker).build()
    }

    pub fn builder(broker: LlmBroker) -> ChatSessionBuilder {
        ChatSessionBuilder::new(broker)
    }

    /// Send a message and wait for the answer.
    ///
    /// On error the session history is left as it was before the call.
    pub async fn send(&mut self, query: &str) -> Result<String> {
        let outcome = self.broker.generate(self.request(query)).await?;
        let answer = outcome.text().unwrap_or_default().to_string();

        debug!("Session history grew to {} messages", outcome.history.len());
        self.messages = outcome.history;
        Ok(answer)
    }

    /// Send a message and stream the answer's text as it arrives.
    ///
    /// The session history is updated once the run finishes; a stream that is dropped
    /// early or ends in an error leaves it unchanged.
    pub fn send_stream<'a>(
        &'a mut self,
        query: &str,
    ) -> Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>> {
        let request = self.request(query);

        Box::pin(async_stream::stream! {
            let mut finished = None;
            {
                let mut events: EventStream<'_> = self.broker.start(request);
                while let Some(event) = events.next().await {
                    match event {
                        Ok(RunEvent::TextDelta(text)) => yield Ok(text),
                        Ok(RunEvent::Message(_)) => {}
                        Ok(RunEvent::Finished(outcome)) => finished = Some(outcome),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            match finished {
                Some(outcome) => self.messages = outcome.history,
                None => yield Err(ToolflowError::IncompleteRun),
            }
        })
    }

    /// Conversation so far, starting with the system prompt
    pub fn messages(&self) -> &[LlmMessage] {
        &self.messages
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Forget everything but the system prompt
    pub fn clear(&mut self) {
        self.messages = vec![LlmMessage::system(self.system_prompt.clone())];
    }

    fn request(&self, query: &str) -> RunRequest {
        RunRequest::new(query)
            .with_history(self.messages.clone())
            .with_tools(self.tools.clone())
            .with_config(CompletionConfig {
                temperature: self.temperature,
                ..Default::default()
            })
    }
}

/// Builder for constructing a `ChatSession` with custom configuration.
pub struct ChatSessionBuilder {
    broker: LlmBroker,
    system_prompt: String,
    tools: ToolRegistry,
    temperature: f32,
}

impl ChatSessionBuilder {
    fn new(broker: LlmBroker) -> Self {
        Self {
            broker,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: ToolRegistry::new(),
            temperature: 1.0,
        }
    }

    /// Set the system prompt (default: "You are a helpful assistant.")
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the tools available to the LLM
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the sampling temperature (default: 1.0)
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn build(self) -> ChatSession {
        let messages = vec![LlmMessage::system(self.system_prompt.clone())];
        ChatSession {
            broker: self.broker,
            system_prompt: self.system_prompt,
            messages,
            tools: self.tools,
            temperature: self.temperature,
        }
    }
}
