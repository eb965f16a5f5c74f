use anyhow::{Context as _, Result};
use serde::Deserialize;
use tera::Context;
use tracing::warn;

use chokepoint_core::domain::multi_agent::{CollectedAnswer, CycleTime};
use chokepoint_core::{
    extract_object, AgentMessage, AgentRole, BusinessProfile, MultiAgentPhase, ProcessStep,
    ValueChainMap,
};

use super::AgentContext;
use crate::prompts::PromptTemplate;

pub const MAX_STEPS: usize = 15;

#[derive(Debug, Default, Deserialize)]
struct MapReply {
    #[serde(default)]
    steps: Vec<StepDraft>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDraft {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    inputs: Option<Vec<String>>,
    #[serde(default)]
    outputs: Option<Vec<String>>,
    #[serde(default)]
    participants: Option<Vec<String>>,
    #[serde(default)]
    cycle_time: Option<CycleTime>,
    #[serde(default)]
    problem_frequency: Option<f64>,
    #[serde(default)]
    queue_size: Option<u32>,
    #[serde(default)]
    utilization: Option<f64>,
}

impl StepDraft {
    /// Keeps the model's id only when asked to, so a refined map stays
    /// addressable by the ids it already had.
    fn into_step(self, keep_id: bool) -> Option<ProcessStep> {
        let name = self.name.map(|name| name.trim().to_owned()).filter(|name| !name.is_empty())?;
        let mut step = ProcessStep::new(name, self.description.unwrap_or_default().trim());
        if let Some(id) = self.id.filter(|id| keep_id && !id.trim().is_empty()) {
            step.id = id;
        }
        step.inputs = self.inputs.unwrap_or_default();
        step.outputs = self.outputs.unwrap_or_default();
        step.participants = self.participants.unwrap_or_default();
        step.cycle_time = self.cycle_time;
        step.problem_frequency = self.problem_frequency;
        step.queue_size = self.queue_size;
        step.utilization = self.utilization;
        step.sanitize_metrics();
        Some(step)
    }
}

fn parse_steps(raw: &str, keep_ids: bool) -> Option<Vec<ProcessStep>> {
    let reply = extract_object::<MapReply>(raw).parsed()?;
    let steps: Vec<ProcessStep> = reply
        .steps
        .into_iter()
        .filter_map(|draft| draft.into_step(keep_ids))
        .take(MAX_STEPS)
        .collect();
    (!steps.is_empty()).then_some(steps)
}

fn step_listing(steps: &[ProcessStep]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| format!("{}. {}", index + 1, step.name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ProcessMiningAgent {
    context: AgentContext,
}

impl ProcessMiningAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }

    pub async fn create_map(
        &self,
        business: &BusinessProfile,
        answers: &[&CollectedAnswer],
    ) -> Result<(ValueChainMap, AgentMessage)> {
        let answers: Vec<&str> = answers.iter().map(|entry| entry.answer.as_str()).collect();
        let mut context = Context::new();
        context.insert("language", &self.context.language);
        context.insert("business", business);
        context.insert("answers", &answers);
        let prompt = self.context.prompts.render(PromptTemplate::ProcessMapCreate, &context)?;
        let raw = self.context.llm.complete(&prompt).await.context("process map request")?;

        let (steps, content) = match parse_steps(&raw, false) {
            Some(steps) => {
                let content = format!(
                    "Создана карта цепочки ценности с {} этапами:\n{}",
                    steps.len(),
                    step_listing(&steps)
                );
                (steps, content)
            }
            None => {
                warn!(event_name = "process_mining.fallback", "process map could not be parsed");
                let steps = vec![ProcessStep::new("Начало процесса", "Начальный этап")];
                (steps, "Создана базовая карта процессов (требуется уточнение)".to_owned())
            }
        };

        let map = ValueChainMap::new(business.product_description.clone(), steps);
        Ok((map, message(content)))
    }

    /// Folds extra information into an existing map. An unusable reply keeps
    /// the map as it was.
    pub async fn refine_map(
        &self,
        map: &ValueChainMap,
        answer: &str,
    ) -> Result<(ValueChainMap, AgentMessage)> {
        let mut context = Context::new();
        context.insert("map_json", &serde_json::to_string_pretty(map)?);
        context.insert("answer", answer);
        let prompt = self.context.prompts.render(PromptTemplate::ProcessMapRefine, &context)?;
        let raw =
            self.context.llm.complete(&prompt).await.context("process map refinement request")?;

        let (map, content) = match parse_steps(&raw, true) {
            Some(steps) => {
                let content = format!(
                    "Карта процессов обновлена, этапов: {}:\n{}",
                    steps.len(),
                    step_listing(&steps)
                );
                (map.with_steps(steps), content)
            }
            None => {
                warn!(
                    event_name = "process_mining.refine.skipped",
                    map_id = %map.id,
                    "refinement could not be parsed"
                );
                (map.clone(), "Карта процессов оставлена без изменений".to_owned())
            }
        };
        Ok((map, message(content)))
    }
}

fn message(content: String) -> AgentMessage {
    AgentMessage::new(AgentRole::ProcessMining, MultiAgentPhase::ProcessMapping, content)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chokepoint_core::{BusinessProfile, MultiAgentState, ProcessStep, ValueChainMap};

    use super::ProcessMiningAgent;
    use crate::orchestrator::AgentContext;
    use crate::prompts::PromptLibrary;
    use crate::testing::ScriptedLlm;

    fn agent(llm: ScriptedLlm) -> ProcessMiningAgent {
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        ProcessMiningAgent::new(AgentContext::new(Arc::new(llm), prompts, "English".to_owned()))
    }

    fn business() -> BusinessProfile {
        BusinessProfile {
            product_description: "Print shop".to_owned(),
            team_size: 8,
            workflows: "orders, printing, delivery".to_owned(),
            kpis: "turnaround".to_owned(),
        }
    }

    #[tokio::test]
    async fn builds_map_from_answers() {
        let llm = ScriptedLlm::new().on(
            "[task:process-map-create]",
            r#"{"steps":[
                {"name":"Order intake","participants":["manager"],"utilization":0.9},
                {"name":"Prepress","problemFrequency":3.5},
                {"name":"  "},
                {"name":"Delivery","cycleTime":{"median":2,"unit":"days"}}
            ]}"#,
        );
        let mut state = MultiAgentState::new(business());
        state.record_answer("Orders come by email");

        let (map, message) =
            agent(llm).create_map(&business(), &state.answers_in_order()).await.expect("map");

        assert_eq!(map.steps.len(), 3);
        assert!(map.id.starts_with("vcm_"));
        assert_eq!(map.steps[0].utilization, Some(0.9));
        assert_eq!(map.steps[1].problem_frequency, None);
        assert!(message.content.contains("3 этапами"));
        assert!(message.content.contains("3. Delivery"));
    }

    #[tokio::test]
    async fn unparseable_map_falls_back_to_single_step() {
        let llm = ScriptedLlm::new().on("[task:process-map-create]", "Sorry, not enough data.");

        let (map, message) = agent(llm).create_map(&business(), &[]).await.expect("map");

        assert_eq!(map.steps.len(), 1);
        assert_eq!(map.steps[0].name, "Начало процесса");
        assert_eq!(message.content, "Создана базовая карта процессов (требуется уточнение)");
    }

    #[tokio::test]
    async fn refinement_keeps_ids_and_map_identity() {
        let mut intake = ProcessStep::new("Intake", "");
        intake.id = "step_intake".to_owned();
        let map = ValueChainMap::new("Print shop", vec![intake]);
        let llm = ScriptedLlm::new().on(
            "[task:process-map-refine]",
            r#"{"steps":[{"id":"step_intake","name":"Intake"},{"name":"Proofing"}]}"#,
        );

        let (refined, _) = agent(llm).refine_map(&map, "we also proof every order").await.expect("refine");

        assert_eq!(refined.id, map.id);
        assert_eq!(refined.steps.len(), 2);
        assert_eq!(refined.steps[0].id, "step_intake");
        assert!(refined.steps[1].id.starts_with("step_"));
    }

    #[tokio::test]
    async fn failed_refinement_keeps_map() {
        let map = ValueChainMap::new("Print shop", vec![ProcessStep::new("Intake", "")]);
        let llm = ScriptedLlm::new().on("[task:process-map-refine]", "no idea");

        let (refined, _) = agent(llm).refine_map(&map, "more info").await.expect("refine");

        assert_eq!(refined, map);
    }
}
