//! Prompt template library.
//!
//! Templates live under `templates/` and are compiled into the binary. Every
//! rendered prompt starts with a `[task:...]` line naming the template, which
//! makes prompts easy to tell apart in logs and in scripted test clients.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use chokepoint_core::{Bottleneck, BottleneckField, ChatMessage, DialogPhase, MessageRole};

const TEMPLATES: &[(&str, &str)] = &[
    ("partials.txt", include_str!("../templates/partials.txt")),
    ("phases/clarifying.txt", include_str!("../templates/phases/clarifying.txt")),
    ("phases/deep_dive.txt", include_str!("../templates/phases/deep_dive.txt")),
    ("phases/solution_design.txt", include_str!("../templates/phases/solution_design.txt")),
    ("phases/implementation.txt", include_str!("../templates/phases/implementation.txt")),
    ("phases/complete.txt", include_str!("../templates/phases/complete.txt")),
    ("dialog/first_message.txt", include_str!("../templates/dialog/first_message.txt")),
    ("dialog/phase_analysis.txt", include_str!("../templates/dialog/phase_analysis.txt")),
    ("dialog/reply.txt", include_str!("../templates/dialog/reply.txt")),
    ("dialog/solution_check.txt", include_str!("../templates/dialog/solution_check.txt")),
    ("dialog/spec_check.txt", include_str!("../templates/dialog/spec_check.txt")),
    ("dialog/technical_spec.txt", include_str!("../templates/dialog/technical_spec.txt")),
    ("dialog/field_suggestions.txt", include_str!("../templates/dialog/field_suggestions.txt")),
    (
        "refine/implementation_details.txt",
        include_str!("../templates/refine/implementation_details.txt"),
    ),
    ("refine/dialog_summary.txt", include_str!("../templates/refine/dialog_summary.txt")),
    (
        "refine/process_description.txt",
        include_str!("../templates/refine/process_description.txt"),
    ),
    ("agents/manager_greeting.txt", include_str!("../templates/agents/manager_greeting.txt")),
    ("agents/manager_continue.txt", include_str!("../templates/agents/manager_continue.txt")),
    ("agents/process_map_create.txt", include_str!("../templates/agents/process_map_create.txt")),
    ("agents/process_map_refine.txt", include_str!("../templates/agents/process_map_refine.txt")),
    ("agents/bottleneck_finder.txt", include_str!("../templates/agents/bottleneck_finder.txt")),
    ("agents/redesign.txt", include_str!("../templates/agents/redesign.txt")),
    ("agents/value_chain.txt", include_str!("../templates/agents/value_chain.txt")),
    (
        "generate/implementation_prompt.txt",
        include_str!("../templates/generate/implementation_prompt.txt"),
    ),
    ("generate/cursor_prompt.txt", include_str!("../templates/generate/cursor_prompt.txt")),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptTemplate {
    DialogFirstMessage,
    PhaseAnalysis,
    DialogReply,
    SolutionCheck,
    SpecCheck,
    TechnicalSpec,
    FieldSuggestions,
    ImplementationDetails,
    DialogSummary,
    ProcessDescription,
    ManagerGreeting,
    ManagerContinue,
    ProcessMapCreate,
    ProcessMapRefine,
    BottleneckFinder,
    Redesign,
    ValueChainAnalysis,
    ImplementationPrompt,
    CursorPrompt,
}

impl PromptTemplate {
    pub fn file(self) -> &'static str {
        match self {
            Self::DialogFirstMessage => "dialog/first_message.txt",
            Self::PhaseAnalysis => "dialog/phase_analysis.txt",
            Self::DialogReply => "dialog/reply.txt",
            Self::SolutionCheck => "dialog/solution_check.txt",
            Self::SpecCheck => "dialog/spec_check.txt",
            Self::TechnicalSpec => "dialog/technical_spec.txt",
            Self::FieldSuggestions => "dialog/field_suggestions.txt",
            Self::ImplementationDetails => "refine/implementation_details.txt",
            Self::DialogSummary => "refine/dialog_summary.txt",
            Self::ProcessDescription => "refine/process_description.txt",
            Self::ManagerGreeting => "agents/manager_greeting.txt",
            Self::ManagerContinue => "agents/manager_continue.txt",
            Self::ProcessMapCreate => "agents/process_map_create.txt",
            Self::ProcessMapRefine => "agents/process_map_refine.txt",
            Self::BottleneckFinder => "agents/bottleneck_finder.txt",
            Self::Redesign => "agents/redesign.txt",
            Self::ValueChainAnalysis => "agents/value_chain.txt",
            Self::ImplementationPrompt => "generate/implementation_prompt.txt",
            Self::CursorPrompt => "generate/cursor_prompt.txt",
        }
    }

    /// First line of every rendered prompt.
    pub fn marker(self) -> &'static str {
        match self {
            Self::DialogFirstMessage => "[task:dialog-first-message]",
            Self::PhaseAnalysis => "[task:phase-analysis]",
            Self::DialogReply => "[task:dialog-reply]",
            Self::SolutionCheck => "[task:solution-check]",
            Self::SpecCheck => "[task:spec-check]",
            Self::TechnicalSpec => "[task:technical-spec]",
            Self::FieldSuggestions => "[task:field-suggestions]",
            Self::ImplementationDetails => "[task:implementation-details]",
            Self::DialogSummary => "[task:dialog-summary]",
            Self::ProcessDescription => "[task:process-description]",
            Self::ManagerGreeting => "[task:manager-greeting]",
            Self::ManagerContinue => "[task:manager-continue]",
            Self::ProcessMapCreate => "[task:process-map-create]",
            Self::ProcessMapRefine => "[task:process-map-refine]",
            Self::BottleneckFinder => "[task:bottleneck-finder]",
            Self::Redesign => "[task:redesign]",
            Self::ValueChainAnalysis => "[task:value-chain-analysis]",
            Self::ImplementationPrompt => "[task:implementation-prompt]",
            Self::CursorPrompt => "[task:cursor-prompt]",
        }
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to load prompt templates: {0}")]
    Load(String),
    #[error("failed to render prompt `{template}`: {message}")]
    Render { template: &'static str, message: String },
}

pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|error| PromptError::Load(error_chain(&error)))?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        template: PromptTemplate,
        context: &Context,
    ) -> Result<String, PromptError> {
        let body = self.render_file(template.file(), context)?;
        Ok(format!("{}\n{}", template.marker(), body.trim()))
    }

    /// Instructions for one dialog phase, spliced into the reply prompt.
    pub fn phase_guide(&self, phase: DialogPhase) -> Result<String, PromptError> {
        let file = match phase {
            DialogPhase::Clarifying => "phases/clarifying.txt",
            DialogPhase::DeepDive => "phases/deep_dive.txt",
            DialogPhase::SolutionDesign => "phases/solution_design.txt",
            DialogPhase::Implementation => "phases/implementation.txt",
            DialogPhase::Complete => "phases/complete.txt",
        };
        Ok(self.render_file(file, &Context::new())?.trim().to_owned())
    }

    fn render_file(&self, file: &'static str, context: &Context) -> Result<String, PromptError> {
        self.tera
            .render(file, context)
            .map_err(|error| PromptError::Render { template: file, message: error_chain(&error) })
    }
}

fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldLine {
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
}

/// Editable bottleneck fields with human labels, in display order.
pub fn bottleneck_lines(bottleneck: &Bottleneck) -> Vec<FieldLine> {
    BottleneckField::ALL
        .into_iter()
        .map(|field| FieldLine {
            key: field.as_str(),
            label: field_label(field),
            value: bottleneck.field(field),
        })
        .collect()
}

fn field_label(field: BottleneckField) -> &'static str {
    match field {
        BottleneckField::Title => "Title",
        BottleneckField::ProcessArea => "Process area",
        BottleneckField::ProblemDescription => "Problem",
        BottleneckField::CurrentImpact => "Current impact",
        BottleneckField::Priority => "Priority",
        BottleneckField::PotentialGain => "Potential gain",
        BottleneckField::AsIsProcess => "Current process (as-is)",
        BottleneckField::ToBeProcess => "Target process (to-be)",
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TranscriptLine {
    pub speaker: &'static str,
    pub content: String,
}

pub fn transcript(messages: &[ChatMessage]) -> Vec<TranscriptLine> {
    messages
        .iter()
        .map(|message| TranscriptLine {
            speaker: match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Consultant",
                MessageRole::System => "System",
            },
            content: message.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tera::Context;

    use chokepoint_core::{Bottleneck, BottleneckId, BusinessProfile, ChatMessage, DialogPhase};

    use super::{bottleneck_lines, transcript, PromptLibrary, PromptTemplate};

    fn business() -> BusinessProfile {
        BusinessProfile {
            product_description: "Coffee roastery".to_owned(),
            team_size: 14,
            workflows: "wholesale orders".to_owned(),
            kpis: "on-time delivery".to_owned(),
        }
    }

    #[test]
    fn all_templates_compile() {
        assert!(PromptLibrary::new().is_ok());
    }

    #[test]
    fn rendered_prompt_starts_with_marker_and_includes_context() {
        let library = PromptLibrary::new().expect("library");
        let bottleneck = Bottleneck {
            title: "Manual order entry".to_owned(),
            ..Bottleneck::blank(BottleneckId("b-1".to_owned()))
        };
        let mut context = Context::new();
        context.insert("business", &business());
        context.insert("bottleneck", &bottleneck_lines(&bottleneck));
        context.insert("language", "Russian");
        context.insert("char_limit", &400);

        let prompt =
            library.render(PromptTemplate::DialogFirstMessage, &context).expect("render");

        assert!(prompt.starts_with("[task:dialog-first-message]\n"));
        assert!(prompt.contains("Coffee roastery"));
        assert!(prompt.contains("- Title: Manual order entry"));
        assert!(prompt.contains("- Process area: (not specified yet)"));
    }

    #[test]
    fn every_phase_has_a_guide() {
        let library = PromptLibrary::new().expect("library");
        for phase in DialogPhase::ALL {
            assert!(!library.phase_guide(phase).expect("guide").is_empty());
        }
    }

    #[test]
    fn transcript_names_speakers() {
        let lines = transcript(&[
            ChatMessage::user("Orders come by phone"),
            ChatMessage::assistant("How many per day?", DialogPhase::Clarifying),
        ]);

        assert_eq!(lines[0].speaker, "User");
        assert_eq!(lines[1].speaker, "Consultant");
    }

    #[test]
    fn missing_variables_are_reported() {
        let library = PromptLibrary::new().expect("library");
        let error = library
            .render(PromptTemplate::ManagerGreeting, &Context::new())
            .expect_err("business is required");

        assert!(error.to_string().contains("agents/manager_greeting.txt"));
    }
}
