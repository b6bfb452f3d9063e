//! Turn strategies for orchestrated runs.
//!
//! A run is a loop of turns. Each turn streams one model completion, consolidates it into
//! a message, and executes whatever tools that message calls. How text is surfaced and
//! when the run stops depends on the [`TurnStrategy`]:
//!
//! - [`DefaultStrategy`] passes text through as it arrives and stops at the first turn
//!   without tool calls.
//! - [`TypedOutputStrategy`] holds text back until it knows the turn did not submit a
//!   structured result, and stops as soon as one is submitted.

mod default_strategy;
mod empty_turn;
mod typed_output;

pub use default_strategy::DefaultStrategy;
pub use empty_turn::{EmptyTurnPolicy, EmptyTurnVerdict, PostToolEmptyTurnPolicy};
pub use typed_output::TypedOutputStrategy;

use crate::error::Result;
use crate::llm::conversation::{ConversationState, TurnPhase};
use crate::llm::executor::{ToolExecutor, ToolInvocation, ToolOutcome};
use crate::llm::gateway::{CompletionConfig, LlmGateway};
use crate::llm::models::{FinishReason, LlmMessage, MessageRole};
use crate::llm::tools::{ToolBinding, ToolDescriptor};
use crate::tracer::{TracerSystem, TurnRecord};
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;
use tracing::{debug, warn};

const TRACE_SOURCE: &str = "orchestrator";

/// Something the caller can observe while a run is in progress
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A fragment of model text, in arrival order
    TextDelta(String),
    /// A message that has just been appended to the history
    Message(LlmMessage),
    /// The run ended normally
    Finished(RunOutcome),
}

/// Final state of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub correlation_id: String,
    pub finish_reason: Option<FinishReason>,
    /// Full history, including the messages the caller passed in
    pub history: Vec<LlmMessage>,
    /// Structured result submitted through the result-capture tool
    pub output: Option<Value>,
    /// Text the model wrote in the turn that submitted the structured result
    pub captured_text: Option<String>,
    pub turns: usize,
}

impl RunOutcome {
    /// Text of the last model message that has any
    pub fn text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .filter(|message| message.role == MessageRole::Model)
            .find_map(LlmMessage::text)
    }
}

pub type EventStream<'a> = Pin<Box<dyn Stream<Item = Result<RunEvent>> + Send + 'a>>;

/// Everything a strategy needs from the driver for one turn
pub struct TurnContext<'a> {
    pub model: &'a str,
    pub gateway: &'a dyn LlmGateway,
    pub config: &'a CompletionConfig,
    pub empty_turn_policy: &'a dyn EmptyTurnPolicy,
    pub tracer: Option<&'a TracerSystem>,
    pub correlation_id: &'a str,
    pub parallel_tools: bool,
}

/// Runs one turn of a conversation.
///
/// The returned stream yields the turn's events and ends when the turn is over. An `Err`
/// item ends the run. The strategy calls [`ConversationState::mark_complete`] when no
/// further turn is needed.
pub trait TurnStrategy: Send + Sync {
    fn process_turn<'a>(
        &'a self,
        state: &'a mut ConversationState,
        ctx: &'a TurnContext<'a>,
    ) -> EventStream<'a>;
}

/// Pick the strategy for a run
pub fn strategy_for(output_schema: Option<&Value>) -> Box<dyn TurnStrategy> {
    match output_schema {
        Some(_) => Box::new(TypedOutputStrategy),
        None => Box::new(DefaultStrategy),
    }
}

fn trace_turn(
    state: &ConversationState,
    ctx: &TurnContext<'_>,
    message: &LlmMessage,
    message_count: usize,
    tools: &[ToolDescriptor],
) {
    let duration_ms = state.turn_elapsed().as_secs_f64() * 1000.0;
    debug!("Turn {} consolidated in {:.2}ms", state.turns(), duration_ms);

    if let Some(tracer) = ctx.tracer {
        tracer.record_model_turn(
            TurnRecord {
                model: ctx.model.to_string(),
                turn: state.turns(),
                message_count,
                tools: tools.iter().map(|tool| tool.name().to_string()).collect(),
                text: message.text().unwrap_or_default().to_string(),
                tool_calls: message.tool_calls().map(|call| call.name.clone()).collect(),
                finish_reason: state.finish_reason(),
                duration_ms,
            },
            TRACE_SOURCE,
            ctx.correlation_id,
        );
    }
}

/// Decide what an empty turn means.
///
/// Returns the message to surface when the empty turn is the real end of the run, or
/// `None` when it was vestigial and another turn should follow.
fn settle_empty_turn(
    state: &mut ConversationState,
    ctx: &TurnContext<'_>,
    message: LlmMessage,
) -> Option<LlmMessage> {
    match ctx
        .empty_turn_policy
        .classify(state.history(), state.finish_reason())
    {
        EmptyTurnVerdict::Vestigial => {
            debug!("Discarding vestigial empty turn {}", state.turns());
            state.set_phase(TurnPhase::StreamingText);
            None
        }
        EmptyTurnVerdict::Complete => {
            debug!("Empty turn {} completes the run", state.turns());
            state.add_to_history(message.clone());
            state.mark_complete();
            Some(message)
        }
    }
}

/// Give the message's calls their correlation keys and append it to the history.
///
/// Returns the stored message and its calls; a message without calls completes the run.
fn commit_model_message(
    state: &mut ConversationState,
    message: LlmMessage,
) -> (LlmMessage, Vec<ToolInvocation>) {
    let message = state.assign_call_ids(message);
    state.add_to_history(message.clone());

    let calls: Vec<ToolInvocation> = message.tool_calls().map(ToolInvocation::from).collect();
    if calls.is_empty() {
        state.mark_complete();
    } else {
        state.set_phase(TurnPhase::ToolsPending);
    }
    (message, calls)
}

/// Execute a turn's calls and append the results message
async fn run_tool_calls(
    state: &mut ConversationState,
    ctx: &TurnContext<'_>,
    calls: Vec<ToolInvocation>,
) -> LlmMessage {
    state.set_phase(TurnPhase::ExecutingTools);
    let bound = calls
        .iter()
        .map(|call| {
            let handler = match state.binding_for(&call.name) {
                Some(ToolBinding::Handler(tool)) => Some(tool),
                Some(ToolBinding::ResultCapture(_)) | None => None,
            };
            (call.clone(), handler)
        })
        .collect();
    let outcomes = {
        let mut executor = ToolExecutor::new(state.tools());
        if !ctx.parallel_tools {
            executor = executor.sequential();
        }
        executor.execute_bound(bound).await
    };
    answer_calls(state, ctx, &calls, outcomes)
}

/// Pair each outcome with its call and append the results message.
///
/// Results whose id the coordinator does not recognize are still delivered; the
/// mismatch is logged and traced as a protocol anomaly.
fn answer_calls(
    state: &mut ConversationState,
    ctx: &TurnContext<'_>,
    calls: &[ToolInvocation],
    outcomes: Vec<ToolOutcome>,
) -> LlmMessage {
    for (call, outcome) in calls.iter().zip(&outcomes) {
        if !state.validate_result_id(&outcome.id) {
            let description = format!(
                "Result for {} carries id {} with no pending call",
                outcome.name, outcome.id
            );
            warn!("{}", description);
            if let Some(tracer) = ctx.tracer {
                tracer.record_protocol_anomaly(description, TRACE_SOURCE, ctx.correlation_id);
            }
        }
        if outcome.failed {
            state.record_failure(&outcome.id);
        }
        if let Some(tracer) = ctx.tracer {
            tracer.record_tool_call(
                outcome.name.clone(),
                outcome.id.clone(),
                call.arguments.clone(),
                outcome.result.clone(),
                outcome.failed,
                TRACE_SOURCE,
                ctx.correlation_id,
            );
        }
    }

    let message = LlmMessage::new(
        MessageRole::User,
        outcomes.iter().map(ToolOutcome::to_part).collect(),
    );
    state.add_to_history(message.clone());
    state.set_phase(TurnPhase::StreamingText);
    message
}
