use std::sync::OnceLock;

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tera::Context;

use chokepoint_core::{
    extract_object, AgentMessage, AgentRole, BusinessProfile, MultiAgentPhase, MultiAgentState,
};

use super::AgentContext;
use crate::prompts::PromptTemplate;

const SALVAGE_CHARS: usize = 200;
const DEFAULT_QUESTION: &str = "Продолжаем анализ. Можете рассказать подробнее?";
const ADVANCING_NOTICE: &str = "Переходим к следующему этапу анализа.";
const SALVAGE_THINKING: &str = "Ответ модели не удалось разобрать, вопрос извлечён из текста";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagerReply {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    should_advance_phase: bool,
    #[serde(default)]
    next_phase: Option<String>,
}

/// What the manager wants to do after an interview answer.
#[derive(Clone, Debug)]
pub struct ManagerDecision {
    pub question: Option<String>,
    pub thinking: String,
    pub advance_to: Option<MultiAgentPhase>,
    pub message: AgentMessage,
}

pub struct ManagerAgent {
    context: AgentContext,
}

impl ManagerAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }

    pub async fn greet(&self, business: &BusinessProfile) -> Result<AgentMessage> {
        let mut context = Context::new();
        context.insert("language", &self.context.language);
        context.insert("business", business);
        let prompt = self.context.prompts.render(PromptTemplate::ManagerGreeting, &context)?;

        let greeting =
            self.context.llm.complete(&prompt).await.context("manager greeting request")?;
        Ok(AgentMessage::new(AgentRole::Manager, MultiAgentPhase::Initialization, greeting.trim()))
    }

    pub async fn continue_dialog(
        &self,
        state: &MultiAgentState,
        answer: &str,
    ) -> Result<ManagerDecision> {
        let answers: Vec<&str> =
            state.answers_in_order().into_iter().map(|entry| entry.answer.as_str()).collect();
        let step_count = state.value_chain_map.as_ref().map(|map| map.steps.len());

        let mut context = Context::new();
        context.insert("language", &self.context.language);
        context.insert("business", &state.business_data);
        context.insert("phase", state.phase.as_str());
        context.insert("answers", &answers);
        context.insert("step_count", &step_count);
        context.insert("answer", answer);
        let prompt = self.context.prompts.render(PromptTemplate::ManagerContinue, &context)?;

        let raw = self.context.llm.complete(&prompt).await.context("manager continuation request")?;
        let Some(reply) = extract_object::<ManagerReply>(&raw).parsed() else {
            let question = salvage_question(&raw);
            return Ok(ManagerDecision {
                message: AgentMessage::new(AgentRole::Manager, state.phase, question.clone()),
                question: Some(question),
                thinking: SALVAGE_THINKING.to_owned(),
                advance_to: None,
            });
        };

        let advance_to = reply
            .next_phase
            .as_deref()
            .and_then(|phase| phase.parse::<MultiAgentPhase>().ok())
            .filter(|_| reply.should_advance_phase);
        let question = reply.question.map(|q| q.trim().to_owned()).filter(|q| !q.is_empty());
        let thinking = reply.thinking.unwrap_or_default();
        let content = question.clone().unwrap_or_else(|| ADVANCING_NOTICE.to_owned());

        let phase = advance_to.unwrap_or(state.phase);
        let message = AgentMessage::new(AgentRole::Manager, phase, content)
            .with_metadata(json!({ "thinking": thinking }));
        Ok(ManagerDecision { question, thinking, advance_to, message })
    }
}

fn question_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:вопрос|спросить|уточнить|question)[:：]?\s*(.+?)(?:\.|$)")
            .expect("valid question pattern")
    })
}

/// Best-effort question from a reply that was supposed to be JSON.
pub fn salvage_question(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(question) = question_pattern()
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim())
        .filter(|found| !found.is_empty())
    {
        return question.to_owned();
    }
    if raw.is_empty() {
        return DEFAULT_QUESTION.to_owned();
    }
    if raw.chars().count() > SALVAGE_CHARS {
        let head: String = raw.chars().take(SALVAGE_CHARS).collect();
        return format!("{head}...");
    }
    raw.to_owned()
}
