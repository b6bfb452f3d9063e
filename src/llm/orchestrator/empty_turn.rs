use crate::llm::models::{FinishReason, LlmMessage};

/// How to treat a turn that consolidated to zero parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyTurnVerdict {
    /// A leftover some providers emit after tool execution; drop it and keep going
    Vestigial,
    /// A real, empty answer; record it and finish
    Complete,
}

/// Decides what an empty turn means.
///
/// Providers differ in what they send after a round of tool results, so the decision is
/// a replaceable policy rather than fixed logic in the orchestrator.
pub trait EmptyTurnPolicy: Send + Sync {
    fn classify(&self, history: &[LlmMessage], finish_reason: Option<FinishReason>) -> EmptyTurnVerdict;
}

/// Treats an empty turn right after tool results as vestigial unless the provider
/// reported a terminal finish reason.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostToolEmptyTurnPolicy;

impl EmptyTurnPolicy for PostToolEmptyTurnPolicy {
    fn classify(&self, history: &[LlmMessage], finish_reason: Option<FinishReason>) -> EmptyTurnVerdict {
        let recent = &history[history.len().saturating_sub(2)..];
        let follows_tool_results = recent.iter().any(LlmMessage::has_tool_results);
        let terminal = finish_reason.is_some_and(|reason| reason.is_terminal());

        if follows_tool_results && !terminal {
            EmptyTurnVerdict::Vestigial
        } else {
            EmptyTurnVerdict::Complete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::{MessageRole, Part, ToolPart};
    use serde_json::json;

    fn tool_exchange() -> Vec<LlmMessage> {
        vec![
            LlmMessage::user("what's the weather?"),
            LlmMessage::new(
                MessageRole::Model,
                vec![Part::Tool(ToolPart::call("c", "weather", json!({})))],
            ),
            LlmMessage::new(
                MessageRole::User,
                vec![Part::Tool(ToolPart::result("c", "weather", json!("sunny")))],
            ),
        ]
    }

    #[test]
    fn test_empty_turn_after_tool_results_is_vestigial() {
        let policy = PostToolEmptyTurnPolicy;
        assert_eq!(policy.classify(&tool_exchange(), None), EmptyTurnVerdict::Vestigial);
        assert_eq!(
            policy.classify(&tool_exchange(), Some(FinishReason::Unspecified)),
            EmptyTurnVerdict::Vestigial
        );
    }

    #[test]
    fn test_terminal_finish_reason_makes_it_complete() {
        let policy = PostToolEmptyTurnPolicy;
        assert_eq!(
            policy.classify(&tool_exchange(), Some(FinishReason::Stop)),
            EmptyTurnVerdict::Complete
        );
        assert_eq!(
            policy.classify(&tool_exchange(), Some(FinishReason::Length)),
            EmptyTurnVerdict::Complete
        );
    }

    #[test]
    fn test_empty_turn_without_tool_results_is_complete() {
        let policy = PostToolEmptyTurnPolicy;
        let history = vec![LlmMessage::user("hello")];
        assert_eq!(policy.classify(&history, None), EmptyTurnVerdict::Complete);
        assert_eq!(policy.classify(&[], None), EmptyTurnVerdict::Complete);
    }

    #[test]
    fn test_only_the_two_latest_messages_count() {
        let policy = PostToolEmptyTurnPolicy;
        let mut history = tool_exchange();
        history.push(LlmMessage::model("done"));
        history.push(LlmMessage::user("and tomorrow?"));
        assert_eq!(policy.classify(&history, None), EmptyTurnVerdict::Complete);
    }
}
