use anyhow::{Context as _, Result};
use serde::Deserialize;
use tera::Context;
use tracing::warn;

use chokepoint_core::{
    extract_object, AgentMessage, AgentRole, Bottleneck, BusinessProfile, MultiAgentPhase,
    ValueChainMap,
};

use super::AgentContext;
use crate::analysis::BottleneckCandidate;
use crate::prompts::PromptTemplate;

pub const MAX_BOTTLENECKS: usize = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinderReply {
    #[serde(default)]
    bottlenecks: Vec<BottleneckCandidate>,
    #[serde(default)]
    bottleneck_steps: Vec<StepFlag>,
}

/// Models return either bare step ids or `{stepId, reason}` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepFlag {
    Detailed {
        #[serde(rename = "stepId")]
        step_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Id(String),
}

impl StepFlag {
    fn step_id(&self) -> &str {
        match self {
            Self::Detailed { step_id, .. } | Self::Id(step_id) => step_id,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            Self::Detailed { reason, .. } => {
                reason.as_deref().filter(|reason| !reason.trim().is_empty())
            }
            Self::Id(_) => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FinderOutcome {
    pub bottlenecks: Vec<Bottleneck>,
    pub map: ValueChainMap,
    pub message: AgentMessage,
}

pub struct BottleneckFinderAgent {
    context: AgentContext,
}

impl BottleneckFinderAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }

    pub async fn find(
        &self,
        business: &BusinessProfile,
        map: &ValueChainMap,
    ) -> Result<FinderOutcome> {
        let mut context = Context::new();
        context.insert("language", &self.context.language);
        context.insert("business", business);
        context.insert("map_json", &serde_json::to_string_pretty(map)?);
        let prompt = self.context.prompts.render(PromptTemplate::BottleneckFinder, &context)?;
        let raw = self.context.llm.complete(&prompt).await.context("bottleneck finder request")?;

        let Some(reply) = extract_object::<FinderReply>(&raw).parsed() else {
            warn!(
                event_name = "bottleneck_finder.fallback",
                map_id = %map.id,
                "bottleneck analysis could not be parsed"
            );
            return Ok(FinderOutcome {
                bottlenecks: Vec::new(),
                map: map.clone(),
                message: message("Анализ узких мест завершен (требуется проверка)".to_owned()),
            });
        };

        let bottlenecks: Vec<Bottleneck> = reply
            .bottlenecks
            .into_iter()
            .filter_map(BottleneckCandidate::into_partial_bottleneck)
            .take(MAX_BOTTLENECKS)
            .collect();

        let mut steps = map.steps.clone();
        for flag in &reply.bottleneck_steps {
            let Some(step) = steps.iter_mut().find(|step| step.id == flag.step_id()) else {
                continue;
            };
            let reason = flag
                .reason()
                .map(str::to_owned)
                .or_else(|| {
                    bottlenecks
                        .iter()
                        .find(|bottleneck| bottleneck.process_area == step.name)
                        .map(|bottleneck| bottleneck.problem_description.clone())
                })
                .unwrap_or_default();
            step.mark_bottleneck(reason);
        }

        let listing: Vec<String> = bottlenecks
            .iter()
            .enumerate()
            .map(|(index, bottleneck)| {
                format!("{}. {} ({})", index + 1, bottleneck.title, bottleneck.priority)
            })
            .collect();
        let content = format!("Найдено {} узких мест:\n{}", bottlenecks.len(), listing.join("\n"));

        Ok(FinderOutcome { map: map.with_steps(steps), bottlenecks, message: message(content) })
    }
}

fn message(content: String) -> AgentMessage {
    AgentMessage::new(AgentRole::BottleneckFinder, MultiAgentPhase::BottleneckAnalysis, content)
}
