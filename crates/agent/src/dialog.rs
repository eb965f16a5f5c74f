//! Phase-driven clarification dialog for a single bottleneck.
//!
//! Each user turn is classified first, so the reply is always written with
//! the instructions of the phase the dialog ends the turn in. Once the
//! dialog reaches `complete` with an agreed solution, the conversation is
//! condensed into a [`RefinedBottleneck`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::Deserialize;
use tera::Context;
use tracing::{info, warn};

use chokepoint_core::config::DialogConfig;
use chokepoint_core::{
    extract_object, Bottleneck, BusinessProfile, ChatMessage, DialogPhase, DialogState,
    FieldSuggestion, PhaseMachine, RefinedBottleneck, RefinementArtifacts,
};

use crate::llm::LlmClient;
use crate::prompts::{bottleneck_lines, transcript, PromptLibrary, PromptTemplate, TranscriptLine};
use crate::suggestions::SuggestionExtractor;

/// Shorter greetings are treated as a failed generation.
pub const MIN_GREETING_CHARS: usize = 20;

const FALLBACK_GREETING: &str = "Здравствуйте! Давайте разберём это узкое место подробнее. \
Расскажите, пожалуйста, как этот процесс выглядит сейчас и что в нём мешает больше всего?";

#[derive(Clone, Debug)]
pub struct DialogSettings {
    pub reply_char_limit: usize,
    pub init_timeout: Duration,
    pub min_question_turns: usize,
    pub reply_language: String,
}

impl From<&DialogConfig> for DialogSettings {
    fn from(config: &DialogConfig) -> Self {
        Self {
            reply_char_limit: config.reply_char_limit,
            init_timeout: Duration::from_secs(config.init_timeout_secs),
            min_question_turns: config.min_question_turns,
            reply_language: config.reply_language.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub message: ChatMessage,
    pub state: DialogState,
    pub refined: Option<RefinedBottleneck>,
    pub suggestions: Vec<FieldSuggestion>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhaseAnalysis {
    #[serde(default)]
    should_advance_phase: bool,
    #[serde(default)]
    next_phase: Option<String>,
    #[serde(default)]
    new_insights: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolutionCheck {
    #[serde(default)]
    has_solution: bool,
    #[serde(default)]
    solution: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpecCheck {
    #[serde(default)]
    has_technical_spec: bool,
}

fn spec_request_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:тз|техническое задание|technical specification|tech spec)\b")
            .expect("valid spec request pattern")
    })
}

/// Whether the user is asking for the written technical specification.
pub fn requests_technical_spec(message: &str) -> bool {
    spec_request_pattern().is_match(message)
}

/// Cuts `text` to at most `limit` characters, preferring to end on a sentence
/// boundary inside the limit.
pub fn truncate_reply(text: &str, limit: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let head: String = text.chars().take(limit).collect();
    match head.rfind(['.', '!', '?', '…']) {
        Some(index) => {
            let end = index + head[index..].chars().next().map_or(1, char::len_utf8);
            head[..end].to_owned()
        }
        None => head,
    }
}

pub struct DialogEngine {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    suggestions: SuggestionExtractor,
    phases: PhaseMachine<DialogPhase>,
    settings: DialogSettings,
}

impl DialogEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        settings: DialogSettings,
    ) -> Self {
        let suggestions =
            SuggestionExtractor::new(llm.clone(), prompts.clone(), settings.reply_language.clone());
        Self { llm, prompts, suggestions, phases: PhaseMachine::new(), settings }
    }

    pub fn settings(&self) -> &DialogSettings {
        &self.settings
    }

    /// Opens a dialog with one greeting. Never fails: a slow, failed, or
    /// empty generation falls back to a fixed greeting.
    pub async fn initialize(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
    ) -> DialogState {
        let greeting = match self.generate_greeting(business, bottleneck).await {
            Ok(text) if text.chars().count() >= MIN_GREETING_CHARS => text,
            Ok(text) => {
                warn!(
                    event_name = "dialog.init.fallback",
                    bottleneck_id = %bottleneck.id,
                    reply_chars = text.chars().count(),
                    "greeting too short, using fallback"
                );
                FALLBACK_GREETING.to_owned()
            }
            Err(error) => {
                warn!(
                    event_name = "dialog.init.fallback",
                    bottleneck_id = %bottleneck.id,
                    error = %error,
                    "greeting generation failed, using fallback"
                );
                FALLBACK_GREETING.to_owned()
            }
        };

        let mut state = DialogState::new(bottleneck.id.clone());
        state.messages.push(ChatMessage::assistant(greeting, DialogPhase::Clarifying));
        info!(event_name = "dialog.initialized", bottleneck_id = %bottleneck.id, "dialog opened");
        state
    }

    async fn generate_greeting(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
    ) -> Result<String> {
        let mut context = Context::new();
        context.insert("language", &self.settings.reply_language);
        context.insert("business", business);
        context.insert("bottleneck", &bottleneck_lines(bottleneck));
        context.insert("char_limit", &self.settings.reply_char_limit);
        let prompt = self.prompts.render(PromptTemplate::DialogFirstMessage, &context)?;

        let reply = tokio::time::timeout(self.settings.init_timeout, self.llm.complete(&prompt))
            .await
            .context("greeting timed out")??;
        Ok(reply.trim().to_owned())
    }

    pub async fn advance_turn(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        mut state: DialogState,
        user_message: &str,
    ) -> Result<TurnOutcome> {
        let previous_phase = state.phase;
        let user_message = user_message.trim();

        let thinking = self.classify(business, bottleneck, &mut state, user_message).await?;
        let phase_changed = state.phase != previous_phase;
        state.clarifications.push(user_message.to_owned());

        let mut reply = self
            .reply(business, bottleneck, &state, previous_phase, phase_changed, user_message)
            .await?;

        if state.phase.tracks_solution() {
            reply =
                self.track_solution(business, bottleneck, &mut state, user_message, reply).await?;
        }

        let message = ChatMessage::assistant(reply, state.phase).with_thinking(thinking);
        state.messages.push(ChatMessage::user(user_message));
        state.messages.push(message.clone());
        state.is_complete = state.phase == DialogPhase::Complete;

        let refined = match state.proposed_solution.as_deref() {
            Some(solution) if state.is_complete && !solution.trim().is_empty() => {
                Some(self.refine(business, bottleneck, &mut state).await?)
            }
            _ => None,
        };

        let suggestions = match self.suggestions.extract(bottleneck, &state).await {
            Ok(suggestions) => suggestions,
            Err(error) => {
                warn!(
                    event_name = "dialog.suggestions.failed",
                    bottleneck_id = %bottleneck.id,
                    error = %error,
                    "field suggestions skipped"
                );
                Vec::new()
            }
        };

        info!(
            event_name = "dialog.turn.completed",
            bottleneck_id = %bottleneck.id,
            from_phase = %previous_phase,
            phase = %state.phase,
            refined = refined.is_some(),
            suggestions = suggestions.len(),
            "dialog turn completed"
        );
        Ok(TurnOutcome { message, state, refined, suggestions })
    }

    fn base_context(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        lines: &[TranscriptLine],
    ) -> Context {
        let mut context = Context::new();
        context.insert("language", &self.settings.reply_language);
        context.insert("business", business);
        context.insert("bottleneck", &bottleneck_lines(bottleneck));
        context.insert("transcript", lines);
        context
    }

    /// Returns the model's reasoning, if any, for the assistant message.
    async fn classify(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        state: &mut DialogState,
        user_message: &str,
    ) -> Result<Option<String>> {
        let mut context = self.base_context(business, bottleneck, &transcript(&state.messages));
        context.insert("phase", state.phase.as_str());
        context.insert("insights", &state.insights);
        context.insert("user_message", user_message);
        let prompt = self.prompts.render(PromptTemplate::PhaseAnalysis, &context)?;
        let raw = self.llm.complete(&prompt).await.context("phase analysis request")?;

        let Some(analysis) = extract_object::<PhaseAnalysis>(&raw).parsed() else {
            warn!(
                event_name = "dialog.phase_analysis.unparseable",
                bottleneck_id = %state.bottleneck_id,
                "phase analysis ignored"
            );
            return Ok(None);
        };

        if analysis.should_advance_phase {
            if let Some(next) = analysis.next_phase.as_deref().and_then(|name| name.parse().ok()) {
                state.phase = self.phases.resolve(state.phase, next).to;
            }
        }
        state.insights.extend(
            analysis
                .new_insights
                .into_iter()
                .map(|insight| insight.trim().to_owned())
                .filter(|insight| !insight.is_empty()),
        );
        Ok(analysis.reasoning.filter(|reasoning| !reasoning.trim().is_empty()))
    }

    async fn reply(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        state: &DialogState,
        previous_phase: DialogPhase,
        phase_changed: bool,
        user_message: &str,
    ) -> Result<String> {
        let char_limit = (state.phase != DialogPhase::Implementation)
            .then_some(self.settings.reply_char_limit);

        let mut context = self.base_context(business, bottleneck, &transcript(&state.messages));
        context.insert("phase_guide", &self.prompts.phase_guide(state.phase)?);
        context.insert("phase", state.phase.as_str());
        context.insert("phase_changed", &phase_changed);
        context.insert("previous_phase", previous_phase.as_str());
        context.insert("insights", &state.insights);
        context.insert("clarifications", &state.clarifications);
        context.insert("proposed_solution", &state.proposed_solution);
        context.insert("user_message", user_message);
        context.insert("char_limit", &char_limit);
        let prompt = self.prompts.render(PromptTemplate::DialogReply, &context)?;

        let raw = self.llm.complete(&prompt).await.context("dialog reply request")?;
        Ok(match char_limit {
            Some(limit) => truncate_reply(&raw, limit),
            None => raw.trim().to_owned(),
        })
    }

    /// Updates the proposed solution and, late in the dialog, the technical
    /// specification. Returns the reply to send, which a spec request replaces.
    async fn track_solution(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        state: &mut DialogState,
        user_message: &str,
        reply: String,
    ) -> Result<String> {
        if state.phase == DialogPhase::Implementation
            && state.question_turns() < self.settings.min_question_turns
        {
            return Ok(reply);
        }

        let mut lines = transcript(&state.messages);
        lines.push(TranscriptLine { speaker: "User", content: user_message.to_owned() });
        lines.push(TranscriptLine { speaker: "Consultant", content: reply.clone() });

        let context = self.base_context(business, bottleneck, &lines);
        let prompt = self.prompts.render(PromptTemplate::SolutionCheck, &context)?;
        let raw = self.llm.complete(&prompt).await.context("solution check request")?;
        if let Some(check) = extract_object::<SolutionCheck>(&raw).parsed() {
            match check.solution {
                Some(solution) if check.has_solution && !solution.trim().is_empty() => {
                    state.proposed_solution = Some(solution.trim().to_owned());
                }
                _ => {}
            }
        }

        if state.phase != DialogPhase::Implementation {
            return Ok(reply);
        }

        if requests_technical_spec(user_message) {
            let spec = self.technical_spec(business, bottleneck, state, &lines).await?;
            state.technical_spec = Some(spec.clone());
            return Ok(spec);
        }

        if state.technical_spec.is_none() {
            let prompt = self.prompts.render(PromptTemplate::SpecCheck, &context)?;
            let raw = self.llm.complete(&prompt).await.context("spec check request")?;
            let captured = extract_object::<SpecCheck>(&raw)
                .parsed()
                .is_some_and(|check| check.has_technical_spec);
            if captured {
                state.technical_spec = Some(reply.clone());
            }
        }
        Ok(reply)
    }

    async fn technical_spec(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        state: &DialogState,
        lines: &[TranscriptLine],
    ) -> Result<String> {
        let mut context = self.base_context(business, bottleneck, lines);
        context.insert("proposed_solution", &state.proposed_solution);
        context.insert("clarifications", &state.clarifications);
        let prompt = self.prompts.render(PromptTemplate::TechnicalSpec, &context)?;
        let spec = self.llm.complete(&prompt).await.context("technical specification request")?;
        Ok(spec.trim().to_owned())
    }

    async fn refine(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        state: &mut DialogState,
    ) -> Result<RefinedBottleneck> {
        let lines = transcript(&state.messages);
        let solution = state.proposed_solution.clone().unwrap_or_default();

        let mut context = self.base_context(business, bottleneck, &lines);
        context.insert("solution", &solution);
        context.insert("clarifications", &state.clarifications);

        let implementation_details = self
            .synthesize(PromptTemplate::ImplementationDetails, &context, "implementation details")
            .await?;
        let dialog_summary =
            self.synthesize(PromptTemplate::DialogSummary, &context, "dialog summary").await?;
        let process_description = self
            .synthesize(PromptTemplate::ProcessDescription, &context, "process description")
            .await?;

        let captured = state.technical_spec.clone().filter(|spec| !spec.trim().is_empty());
        let technical_spec = match captured {
            Some(spec) => spec,
            None => {
                let spec = self.technical_spec(business, bottleneck, state, &lines).await?;
                state.technical_spec = Some(spec.clone());
                spec
            }
        };

        let refined = RefinedBottleneck::from_dialog(
            bottleneck,
            state,
            RefinementArtifacts {
                implementation_details,
                dialog_summary,
                process_description,
                technical_spec,
            },
        )?;
        info!(event_name = "dialog.refined", bottleneck_id = %bottleneck.id, "bottleneck refined");
        Ok(refined)
    }

    async fn synthesize(
        &self,
        template: PromptTemplate,
        context: &Context,
        label: &str,
    ) -> Result<String> {
        let prompt = self.prompts.render(template, context)?;
        let text = self.llm.complete(&prompt).await.with_context(|| format!("{label} request"))?;
        Ok(text.trim().to_owned())
    }
}
