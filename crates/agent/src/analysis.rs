use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use serde::Deserialize;
use tera::Context;
use tracing::{info, warn};

use chokepoint_core::{
    extract_array, Bottleneck, BottleneckId, BusinessProfile, LlmOutput, Priority,
};

use crate::llm::LlmClient;
use crate::prompts::{PromptLibrary, PromptTemplate};

/// A bottleneck as proposed by the model, before validation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckCandidate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub process_area: Option<String>,
    #[serde(default)]
    pub problem_description: Option<String>,
    #[serde(default)]
    pub current_impact: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub potential_gain: Option<String>,
    #[serde(default)]
    pub as_is_process: Option<String>,
    #[serde(default)]
    pub to_be_process: Option<String>,
    #[serde(default)]
    pub suggested_agents: Option<Vec<String>>,
    #[serde(default)]
    pub mcp_tools_needed: Option<Vec<String>>,
}

impl BottleneckCandidate {
    /// `None` when any text field is blank or the priority is not exactly one
    /// of `high`, `medium`, `low`. Agent and tool lists may be empty.
    pub fn into_bottleneck(self) -> Option<Bottleneck> {
        let complete = [
            &self.process_area,
            &self.current_impact,
            &self.potential_gain,
            &self.as_is_process,
            &self.to_be_process,
        ]
        .into_iter()
        .all(|value| value.as_deref().is_some_and(|text| !text.trim().is_empty()));
        if !complete {
            return None;
        }
        self.into_partial_bottleneck()
    }

    /// Looser variant for the multi-agent finder: only the title, problem and
    /// priority are required, the remaining texts default to empty.
    pub fn into_partial_bottleneck(self) -> Option<Bottleneck> {
        let title = non_blank(self.title)?;
        let problem_description = non_blank(self.problem_description)?;
        let priority: Priority = self.priority?.trim().parse().ok()?;

        Some(Bottleneck {
            id: BottleneckId::generate(),
            title,
            process_area: text(self.process_area),
            problem_description,
            current_impact: text(self.current_impact),
            priority,
            potential_gain: text(self.potential_gain),
            as_is_process: text(self.as_is_process),
            to_be_process: text(self.to_be_process),
            suggested_agents: list(self.suggested_agents),
            mcp_tools_needed: list(self.mcp_tools_needed),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn text(value: Option<String>) -> String {
    value.map(|value| value.trim().to_owned()).unwrap_or_default()
}

fn list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}

/// One-shot bottleneck discovery from the business profile alone.
pub struct ValueChainAnalyzer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    language: String,
}

impl ValueChainAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, language: String) -> Self {
        Self { llm, prompts, language }
    }

    pub async fn analyze(&self, business: &BusinessProfile) -> Result<Vec<Bottleneck>> {
        let mut context = Context::new();
        context.insert("language", &self.language);
        context.insert("business", business);
        let prompt = self.prompts.render(PromptTemplate::ValueChainAnalysis, &context)?;

        let raw = self.llm.complete(&prompt).await.context("value chain analysis request")?;
        let candidates = match extract_array::<Vec<BottleneckCandidate>>(&raw) {
            LlmOutput::Parsed(candidates) => candidates,
            LlmOutput::Unparseable { reason, .. } => {
                bail!("value chain analysis returned no bottleneck list: {reason}")
            }
        };

        let proposed = candidates.len();
        let bottlenecks: Vec<Bottleneck> =
            candidates.into_iter().filter_map(BottleneckCandidate::into_bottleneck).collect();
        if bottlenecks.len() < proposed {
            warn!(
                event_name = "analysis.candidates.dropped",
                dropped = proposed - bottlenecks.len(),
                "incomplete bottleneck candidates dropped"
            );
        }
        info!(event_name = "analysis.completed", bottlenecks = bottlenecks.len(), "analysis done");
        Ok(bottlenecks)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chokepoint_core::{BusinessProfile, Priority};

    use super::{BottleneckCandidate, ValueChainAnalyzer};
    use crate::prompts::PromptLibrary;
    use crate::testing::ScriptedLlm;

    fn analyzer(llm: ScriptedLlm) -> ValueChainAnalyzer {
        let prompts = Arc::new(PromptLibrary::new().expect("prompts"));
        ValueChainAnalyzer::new(Arc::new(llm), prompts, "English".to_owned())
    }

    fn business() -> BusinessProfile {
        BusinessProfile {
            product_description: "Online language school".to_owned(),
            team_size: 25,
            workflows: "lead intake, trial lesson, enrollment".to_owned(),
            kpis: "trial conversion".to_owned(),
        }
    }

    fn complete_candidate() -> BottleneckCandidate {
        BottleneckCandidate {
            title: Some(" Trial scheduling ".to_owned()),
            process_area: Some("Sales".to_owned()),
            problem_description: Some("Managers book trials by hand".to_owned()),
            current_impact: Some("1 hour per lead".to_owned()),
            priority: Some("high".to_owned()),
            potential_gain: Some("+15% trials".to_owned()),
            as_is_process: Some("Phone calls".to_owned()),
            to_be_process: Some("Agent books the slot".to_owned()),
            suggested_agents: Some(vec!["Scheduler".to_owned(), " ".to_owned()]),
            mcp_tools_needed: None,
        }
    }

    #[test]
    fn candidates_need_every_text_field_and_exact_priority() {
        let bottleneck = complete_candidate().into_bottleneck().expect("valid candidate");
        assert_eq!(bottleneck.title, "Trial scheduling");
        assert_eq!(bottleneck.priority, Priority::High);
        assert_eq!(bottleneck.suggested_agents, vec!["Scheduler".to_owned()]);
        assert!(bottleneck.mcp_tools_needed.is_empty());
        assert!(bottleneck.id.as_str().starts_with("bottleneck_"));

        let rejected = [
            BottleneckCandidate { priority: Some("urgent".to_owned()), ..complete_candidate() },
            BottleneckCandidate { priority: Some("High".to_owned()), ..complete_candidate() },
            BottleneckCandidate { priority: Some("HIGH".to_owned()), ..complete_candidate() },
            BottleneckCandidate { priority: None, ..complete_candidate() },
            BottleneckCandidate { title: Some("  ".to_owned()), ..complete_candidate() },
            BottleneckCandidate { current_impact: None, ..complete_candidate() },
            BottleneckCandidate { to_be_process: Some(String::new()), ..complete_candidate() },
        ];
        for candidate in rejected {
            assert!(candidate.clone().into_bottleneck().is_none(), "accepted {candidate:?}");
        }
    }

    #[test]
    fn partial_candidates_only_need_title_problem_and_exact_priority() {
        let outline = BottleneckCandidate {
            title: Some("Trial scheduling".to_owned()),
            problem_description: Some("Managers book trials by hand".to_owned()),
            priority: Some("low".to_owned()),
            ..BottleneckCandidate::default()
        };

        let bottleneck = outline.clone().into_partial_bottleneck().expect("partial candidate");
        assert!(bottleneck.current_impact.is_empty());
        assert!(outline.clone().into_bottleneck().is_none());

        let shouting = BottleneckCandidate { priority: Some("LOW".to_owned()), ..outline };
        assert!(shouting.into_partial_bottleneck().is_none());
    }

    #[tokio::test]
    async fn analyze_keeps_valid_bottlenecks() {
        let llm = ScriptedLlm::new().on(
            "[task:value-chain-analysis]",
            r#"```json
            [
              {"title":"Lead follow-up","processArea":"Sales","problemDescription":"Leads wait two days","currentImpact":"Lost trials","priority":"high","potentialGain":"+20% trials","asIsProcess":"Manual calls","toBeProcess":"Agent replies instantly","suggestedAgents":["Lead agent"],"mcpToolsNeeded":["crm"]},
              {"title":"","problemDescription":"missing title","priority":"low"},
              {"title":"Invoices","problemDescription":"Late","priority":"critical"}
            ]
            ```"#,
        );

        let bottlenecks = analyzer(llm).analyze(&business()).await.expect("analysis");

        assert_eq!(bottlenecks.len(), 1);
        assert_eq!(bottlenecks[0].title, "Lead follow-up");
        assert_eq!(bottlenecks[0].mcp_tools_needed, vec!["crm".to_owned()]);
    }

    #[tokio::test]
    async fn unparseable_analysis_is_an_error() {
        let llm = ScriptedLlm::new().on("[task:value-chain-analysis]", "I could not find anything");

        let error = analyzer(llm).analyze(&business()).await.expect_err("must fail");

        assert!(error.to_string().contains("no bottleneck list"));
    }
}
