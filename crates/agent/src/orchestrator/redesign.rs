use anyhow::{Context as _, Result};
use serde::Deserialize;
use tera::Context;
use tracing::warn;

use chokepoint_core::{
    extract_object, AgentBlueprint, AgentMessage, AgentRole, Bottleneck, BusinessProfile,
    MultiAgentPhase, Roadmap, SolutionProposal,
};

use super::AgentContext;
use crate::prompts::PromptTemplate;

#[derive(Debug, Default, Deserialize)]
struct RedesignReply {
    #[serde(default)]
    solutions: Vec<SolutionDraft>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolutionDraft {
    #[serde(default)]
    bottleneck_id: Option<String>,
    #[serde(default)]
    solution: Option<String>,
    #[serde(default)]
    roadmap: Option<Roadmap>,
    #[serde(default)]
    agents: Option<Vec<AgentBlueprint>>,
}

pub struct RedesignAgent {
    context: AgentContext,
}

impl RedesignAgent {
    pub fn new(context: AgentContext) -> Self {
        Self { context }
    }

    /// Proposals are kept only for bottlenecks that exist in `bottlenecks`.
    pub async fn propose(
        &self,
        business: &BusinessProfile,
        bottlenecks: &[Bottleneck],
    ) -> Result<(Vec<SolutionProposal>, AgentMessage)> {
        let mut context = Context::new();
        context.insert("language", &self.context.language);
        context.insert("business", business);
        context.insert("bottlenecks", bottlenecks);
        let prompt = self.context.prompts.render(PromptTemplate::Redesign, &context)?;
        let raw = self.context.llm.complete(&prompt).await.context("redesign request")?;

        let Some(reply) = extract_object::<RedesignReply>(&raw).parsed() else {
            warn!(event_name = "redesign.fallback", "redesign reply could not be parsed");
            return Ok((Vec::new(), message("Разработка решений завершена".to_owned())));
        };

        let solutions: Vec<SolutionProposal> = reply
            .solutions
            .into_iter()
            .filter_map(|draft| {
                let id = draft.bottleneck_id?.trim().to_owned();
                let bottleneck = bottlenecks.iter().find(|bottleneck| bottleneck.id.as_str() == id)?;
                let solution = draft.solution?.trim().to_owned();
                if solution.is_empty() {
                    return None;
                }
                Some(SolutionProposal {
                    bottleneck_id: bottleneck.id.clone(),
                    solution,
                    roadmap: draft.roadmap.unwrap_or_default(),
                    agents: draft.agents.unwrap_or_default(),
                })
            })
            .collect();

        let content = format!("Предложены решения для {} узких мест", solutions.len());
        Ok((solutions, message(content)))
    }
}

pub(super) fn message(content: String) -> AgentMessage {
    AgentMessage::new(AgentRole::Redesign, MultiAgentPhase::SolutionDesign, content)
}
