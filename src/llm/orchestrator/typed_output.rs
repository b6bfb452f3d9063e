use super::{
    answer_calls, commit_model_message, run_tool_calls, settle_empty_turn, trace_turn,
    EventStream, RunEvent, TurnContext, TurnStrategy,
};
use crate::error::ToolflowError;
use crate::llm::conversation::ConversationState;
use crate::llm::executor::{ToolInvocation, ToolOutcome};
use crate::llm::models::{LlmMessage, Part};
use crate::llm::tools::{ResultCaptureTool, ToolBinding};
use futures::stream::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Runs until the model submits a structured result through the capture tool.
///
/// Text is buffered for the whole turn. If the turn submits a result, the text is kept on
/// the outcome as captured text and never surfaced; otherwise it is released as a single
/// fragment before the turn's message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedOutputStrategy;

impl TurnStrategy for TypedOutputStrategy {
    fn process_turn<'a>(
        &'a self,
        state: &'a mut ConversationState,
        ctx: &'a TurnContext<'a>,
    ) -> EventStream<'a> {
        Box::pin(async_stream::stream! {
            state.reset_for_new_turn();
            let messages = state.history().to_vec();
            let tools = state.tool_descriptors();
            let output = state.output_constraint();

            let mut buffered: Vec<String> = Vec::new();
            let mut deltas = ctx.gateway.complete_stream(ctx.model, &messages, &tools, output.as_ref(), ctx.config);
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(delta) => buffered.extend(state.accumulate(delta)),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            drop(deltas);

            let message = state.consolidate_turn();
            trace_turn(state, ctx, &message, messages.len(), &tools);

            if message.is_empty() {
                if let Some(message) = settle_empty_turn(state, ctx, message) {
                    yield Ok(RunEvent::Message(message));
                }
                return;
            }

            if message.tool_calls().any(ResultCaptureTool::is_capture_call) {
                let captured_text = message.text().map(str::to_string);
                let (message, calls) = commit_model_message(state, without_text(message));
                yield Ok(RunEvent::Message(message));

                let (outcomes, output) = settle_capture(state, &calls);
                let results = answer_calls(state, ctx, &calls, outcomes);
                yield Ok(RunEvent::Message(results));

                info!("Structured result submitted on turn {}", state.turns());
                state.set_output(output);
                if let Some(text) = captured_text {
                    debug!("Withholding {} chars of text from the submitting turn", text.len());
                    state.set_captured_text(text);
                }
                state.mark_complete();
                return;
            }

            if !buffered.is_empty() {
                yield Ok(RunEvent::TextDelta(buffered.concat()));
            }

            let (message, calls) = commit_model_message(state, message);
            yield Ok(RunEvent::Message(message));
            if calls.is_empty() {
                return;
            }

            let results = run_tool_calls(state, ctx, calls).await;
            yield Ok(RunEvent::Message(results));
        })
    }
}

fn without_text(message: LlmMessage) -> LlmMessage {
    let parts = message
        .parts
        .into_iter()
        .filter(|part| !matches!(part, Part::Text { .. }))
        .collect();
    LlmMessage::new(message.role, parts)
}

/// Answer every call of a submitting turn without running any handler.
///
/// The first capture call is accepted and its arguments become the output. Registered
/// tools and repeated submissions are answered as skipped; unknown names as not found.
fn settle_capture(state: &ConversationState, calls: &[ToolInvocation]) -> (Vec<ToolOutcome>, Value) {
    let mut output = None;
    let outcomes = calls
        .iter()
        .map(|call| match state.binding_for(&call.name) {
            Some(ToolBinding::ResultCapture(_)) if output.is_none() => {
                output = Some(match &call.arguments {
                    Value::Null => json!({}),
                    arguments => arguments.clone(),
                });
                ToolOutcome::success(call.id.clone(), call.name.clone(), json!({ "accepted": true }))
            }
            Some(_) => ToolOutcome::error(
                call.id.clone(),
                call.name.clone(),
                format!("Skipped {}: a result was already submitted this turn", call.name),
            ),
            None => ToolOutcome::error(
                call.id.clone(),
                call.name.clone(),
                ToolflowError::ToolNotFound(call.name.clone()).to_string(),
            ),
        })
        .collect();
    (outcomes, output.unwrap_or_else(|| json!({})))
}
