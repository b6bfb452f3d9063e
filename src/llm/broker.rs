use crate::error::{Result, ToolflowError};
use crate::llm::conversation::ConversationState;
use crate::llm::gateway::{CompletionConfig, LlmGateway};
use crate::llm::models::{LlmMessage, MessageRole, Part};
use crate::llm::orchestrator::{
    strategy_for, EmptyTurnPolicy, EventStream, PostToolEmptyTurnPolicy, RunEvent, RunOutcome,
    TurnContext,
};
use crate::llm::tools::{ResultCaptureTool, ToolRegistry};
use crate::tracer::TracerSystem;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_MAX_TURNS: usize = 25;

/// Limits and knobs for the turn loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Turns allowed before the run fails with `TurnLimitExceeded`
    pub max_turns: usize,
    /// Run calls to different tools concurrently
    pub parallel_tools: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            parallel_tools: true,
        }
    }
}

impl OrchestratorConfig {
    /// Defaults, overridden by `TOOLFLOW_MAX_TURNS` and `TOOLFLOW_PARALLEL_TOOLS` when set.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("TOOLFLOW_MAX_TURNS") {
            match value.trim().parse::<usize>() {
                Ok(max_turns) if max_turns > 0 => config.max_turns = max_turns,
                _ => warn!("Ignoring invalid TOOLFLOW_MAX_TURNS: {}", value),
            }
        }
        if let Ok(value) = std::env::var("TOOLFLOW_PARALLEL_TOOLS") {
            match parse_flag(&value) {
                Some(parallel) => config.parallel_tools = parallel,
                None => warn!("Ignoring invalid TOOLFLOW_PARALLEL_TOOLS: {}", value),
            }
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// One run's input
#[derive(Clone, Default)]
pub struct RunRequest {
    pub prompt: String,
    /// Earlier conversation; the run appends to it and hands it back in the outcome
    pub history: Vec<LlmMessage>,
    /// Extra parts sent alongside the prompt, such as images or links
    pub attachments: Vec<Part>,
    /// When set, the run ends once the model submits an object matching this schema
    pub output_schema: Option<Value>,
    pub tools: ToolRegistry,
    pub config: CompletionConfig,
}

impl RunRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<LlmMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Part>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    fn prompt_message(&self) -> Option<LlmMessage> {
        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        if !self.prompt.is_empty() {
            parts.push(Part::text(self.prompt.clone()));
        }
        parts.extend(self.attachments.iter().cloned());
        (!parts.is_empty()).then(|| LlmMessage::new(MessageRole::User, parts))
    }
}

/// Main interface for orchestrated LLM runs
pub struct LlmBroker {
    model: String,
    gateway: Arc<dyn LlmGateway>,
    tracer: Option<Arc<TracerSystem>>,
    empty_turn_policy: Arc<dyn EmptyTurnPolicy>,
    config: OrchestratorConfig,
}

impl LlmBroker {
    /// Create a new LLM broker
    pub fn new(model: impl Into<String>, gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            model: model.into(),
            gateway,
            tracer: None,
            empty_turn_policy: Arc::new(PostToolEmptyTurnPolicy),
            config: OrchestratorConfig::default(),
        }
    }

    /// Record every run's turns and tool calls on `tracer`
    pub fn with_tracer(mut self, tracer: Arc<TracerSystem>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Replace the rule that decides whether an empty turn ends the run
    pub fn with_empty_turn_policy(mut self, policy: Arc<dyn EmptyTurnPolicy>) -> Self {
        self.empty_turn_policy = policy;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a run and stream what happens in it.
    ///
    /// The prompt message comes first, then each turn's text fragments followed by the
    /// messages that turn appended, and finally [`RunEvent::Finished`]. An `Err` item
    /// ends the stream. Dropping the stream stops the run after any tools already
    /// dispatched have finished.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::stream::StreamExt;
    ///
    /// let broker = LlmBroker::new("qwen3:32b", gateway);
    /// let mut events = broker.start(RunRequest::new("Tell me a story"));
    /// while let Some(event) = events.next().await {
    ///     match event? {
    ///         RunEvent::TextDelta(text) => print!("{}", text),
    ///         RunEvent::Message(_) => {}
    ///         RunEvent::Finished(outcome) => println!("\n{} turn(s)", outcome.turns),
    ///     }
    /// }
    /// ```
    pub fn start(&self, request: RunRequest) -> EventStream<'_> {
        Box::pin(async_stream::stream! {
            let correlation_id = Uuid::new_v4().to_string();
            info!("Starting run {} with model {}", correlation_id, self.model);

            let strategy = strategy_for(request.output_schema.as_ref());
            let prompt_message = request.prompt_message();
            let RunRequest { history, output_schema, tools, config, .. } = request;

            let mut state = ConversationState::new(history, tools);
            if let Some(schema) = output_schema {
                state = state.with_result_capture(ResultCaptureTool::new(schema));
            }
            if let Some(message) = prompt_message {
                state.add_to_history(message.clone());
                yield Ok(RunEvent::Message(message));
            }

            let ctx = TurnContext {
                model: &self.model,
                gateway: self.gateway.as_ref(),
                config: &config,
                empty_turn_policy: self.empty_turn_policy.as_ref(),
                tracer: self.tracer.as_deref(),
                correlation_id: &correlation_id,
                parallel_tools: self.config.parallel_tools,
            };

            while !state.is_complete() {
                if state.turns() >= self.config.max_turns {
                    warn!("Run {} hit the turn limit of {}", correlation_id, self.config.max_turns);
                    yield Err(ToolflowError::TurnLimitExceeded(state.turns()));
                    return;
                }

                let mut turn = strategy.process_turn(&mut state, &ctx);
                while let Some(event) = turn.next().await {
                    let failed = event.is_err();
                    yield event;
                    if failed {
                        return;
                    }
                }
            }

            let finish_reason = state.finish_reason();
            let turns = state.turns();
            let (history, output, captured_text) = state.into_parts();
            info!("Run {} finished after {} turn(s)", correlation_id, turns);

            yield Ok(RunEvent::Finished(RunOutcome {
                correlation_id,
                finish_reason,
                history,
                output,
                captured_text,
                turns,
            }));
        })
    }

    /// Run to completion and return the outcome
    pub async fn generate(&self, request: RunRequest) -> Result<RunOutcome> {
        let mut events = self.start(request);
        while let Some(event) = events.next().await {
            if let RunEvent::Finished(outcome) = event? {
                return Ok(outcome);
            }
        }
        Err(ToolflowError::IncompleteRun)
    }

    /// Generate a text answer to `prompt`
    pub async fn generate_text(&self, prompt: impl Into<String>, tools: ToolRegistry) -> Result<String> {
        let outcome = self.generate(RunRequest::new(prompt).with_tools(tools)).await?;
        Ok(outcome.text().unwrap_or_default().to_string())
    }

    /// Generate structured object response from LLM
    ///
    /// The schema for `T` is offered to the model as the result-capture tool's parameters.
    pub async fn generate_object<T>(&self, request: RunRequest) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))?;
        let outcome = self.generate(request.with_output_schema(schema)).await?;

        let output = outcome.output.ok_or(ToolflowError::MissingStructuredOutput)?;
        debug!("Structured output: {}", output);
        let object: T = serde_json::from_value(output)?;

        Ok(object)
    }
}
