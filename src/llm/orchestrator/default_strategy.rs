use super::{
    commit_model_message, run_tool_calls, settle_empty_turn, trace_turn, EventStream, RunEvent,
    TurnContext, TurnStrategy,
};
use crate::llm::conversation::ConversationState;
use futures::stream::StreamExt;

/// Streams text through as it arrives and runs tools until the model stops calling them
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl TurnStrategy for DefaultStrategy {
    fn process_turn<'a>(
        &'a self,
        state: &'a mut ConversationState,
        ctx: &'a TurnContext<'a>,
    ) -> EventStream<'a> {
        Box::pin(async_stream::stream! {
            state.reset_for_new_turn();
            let messages = state.history().to_vec();
            let tools = state.tool_descriptors();

            let mut deltas = ctx.gateway.complete_stream(ctx.model, &messages, &tools, None, ctx.config);
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(delta) => {
                        for text in state.accumulate(delta) {
                            yield Ok(RunEvent::TextDelta(text));
                        }
                    }
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
