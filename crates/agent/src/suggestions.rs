use std::sync::Arc;

use anyhow::{Context as _, Result};
use tera::Context;
use tracing::{debug, warn};

use chokepoint_core::suggestions::{
    validate_candidates, SuggestionCandidate, MIN_MESSAGES_FOR_SUGGESTIONS,
};
use chokepoint_core::{extract_array, Bottleneck, DialogState, FieldSuggestion, LlmOutput};

use crate::llm::LlmClient;
use crate::prompts::{bottleneck_lines, transcript, PromptLibrary, PromptTemplate};

/// Asks the model which bottleneck fields the conversation has outgrown.
pub struct SuggestionExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    language: String,
}

impl SuggestionExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, language: String) -> Self {
        Self { llm, prompts, language }
    }

    pub async fn extract(
        &self,
        bottleneck: &Bottleneck,
        state: &DialogState,
    ) -> Result<Vec<FieldSuggestion>> {
        if state.messages.len() < MIN_MESSAGES_FOR_SUGGESTIONS {
            return Ok(Vec::new());
        }

        let mut context = Context::new();
        context.insert("fields", &bottleneck_lines(bottleneck));
        context.insert("transcript", &transcript(&state.messages));
        context.insert("language", &self.language);
        let prompt = self.prompts.render(PromptTemplate::FieldSuggestions, &context)?;

        let raw = self.llm.complete(&prompt).await.context("field suggestion request")?;
        let candidates = match extract_array::<Vec<SuggestionCandidate>>(&raw) {
            LlmOutput::Parsed(candidates) => candidates,
            LlmOutput::Unparseable { reason, .. } => {
                warn!(
                    event_name = "suggestions.unparseable",
                    bottleneck_id = %bottleneck.id,
                    reason = %reason,
                    "field suggestions could not be parsed"
                );
                return Ok(Vec::new());
            }
        };

        let proposed = candidates.len();
        let suggestions = validate_candidates(candidates, bottleneck);
        debug!(
            event_name = "suggestions.validated",
            bottleneck_id = %bottleneck.id,
            proposed,
            accepted = suggestions.len(),
            "field suggestions validated"
        );
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chokepoint_core::{
        Bottleneck, BottleneckField, BottleneckId, ChatMessage, DialogPhase, DialogState,
    };

    use super::SuggestionExtractor;
    use crate::prompts::PromptLibrary;
    use crate::testing::ScriptedLlm;

    fn bottleneck() -> Bottleneck {
        Bottleneck {
            title: "Slow invoicing".to_owned(),
            process_area: "Finance".to_owned(),
            ..Bottleneck::blank(BottleneckId("b-1".to_owned()))
        }
    }

    fn state_with(messages: Vec<ChatMessage>) -> DialogState {
        let mut state = DialogState::new(BottleneckId("b-1".to_owned()));
        state.messages = messages;
        state
    }

    fn extractor(llm: Arc<ScriptedLlm>) -> SuggestionExtractor {
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        SuggestionExtractor::new(llm, prompts, "English".to_owned())
    }

    #[tokio::test]
    async fn short_dialogs_skip_the_model() {
        let llm = Arc::new(ScriptedLlm::new());
        let state =
            state_with(vec![ChatMessage::assistant("What hurts?", DialogPhase::Clarifying)]);

        let suggestions = extractor(llm.clone()).extract(&bottleneck(), &state).await.expect("ok");

        assert!(suggestions.is_empty());
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn keeps_only_valid_suggestions() {
        let llm = Arc::new(ScriptedLlm::new().on(
            "[task:field-suggestions]",
            r#"Here you go: [
                {"field":"priority","currentValue":"medium","suggestedValue":"high","reason":"blocks cash flow"},
                {"field":"processArea","currentValue":"Finance","suggestedValue":"Finance","reason":"same"},
                {"field":"owner","currentValue":"","suggestedValue":"Anna","reason":"not editable"}
            ]"#,
        ));
        let state = state_with(vec![
            ChatMessage::assistant("What hurts?", DialogPhase::Clarifying),
            ChatMessage::user("Invoices wait a week and it blocks our cash flow"),
        ]);

        let suggestions = extractor(llm).extract(&bottleneck(), &state).await.expect("ok");

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].field, BottleneckField::Priority);
        assert_eq!(suggestions[0].suggested_value, "high");
    }

    #[tokio::test]
    async fn unparseable_reply_yields_nothing() {
        let llm = Arc::new(ScriptedLlm::new().on("[task:field-suggestions]", "no changes needed"));
        let state = state_with(vec![
            ChatMessage::assistant("What hurts?", DialogPhase::Clarifying),
            ChatMessage::user("Nothing new"),
        ]);

        assert!(extractor(llm).extract(&bottleneck(), &state).await.expect("ok").is_empty());
    }
}
