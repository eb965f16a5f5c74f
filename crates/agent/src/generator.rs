use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tera::Context;
use tracing::info;

use chokepoint_core::{Bottleneck, BusinessProfile, RefinedBottleneck};

use crate::llm::LlmClient;
use crate::prompts::{PromptLibrary, PromptTemplate};

/// Which kind of build document to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    #[default]
    Implementation,
    Cursor,
}

pub struct PromptGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    language: String,
}

impl PromptGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, language: String) -> Self {
        Self { llm, prompts, language }
    }

    pub async fn generate(
        &self,
        variant: PromptVariant,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        refined: Option<&RefinedBottleneck>,
    ) -> Result<String> {
        match variant {
            PromptVariant::Implementation => {
                self.implementation_prompt(business, bottleneck, refined).await
            }
            PromptVariant::Cursor => self.cursor_prompt(business, bottleneck, refined).await,
        }
    }

    /// Build document for the improvement point. A refined record overrides
    /// the to-be process with the agreed solution.
    pub async fn implementation_prompt(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        refined: Option<&RefinedBottleneck>,
    ) -> Result<String> {
        let to_be_process = refined
            .map(|refined| refined.agreed_solution.as_str())
            .unwrap_or(bottleneck.to_be_process.as_str());

        let mut context = Context::new();
        context.insert("language", &self.language);
        context.insert("business", business);
        context.insert("bottleneck", bottleneck);
        context.insert("to_be_process", to_be_process);
        context.insert("refined", &refined);
        self.complete(PromptTemplate::ImplementationPrompt, &context, bottleneck).await
    }

    /// Build document for a fixed agent stack, driven by the technical
    /// specification when the dialog produced one.
    pub async fn cursor_prompt(
        &self,
        business: &BusinessProfile,
        bottleneck: &Bottleneck,
        refined: Option<&RefinedBottleneck>,
    ) -> Result<String> {
        let specification = refined
            .map(|refined| refined.technical_spec.as_str())
            .filter(|spec| !spec.trim().is_empty())
            .unwrap_or(bottleneck.problem_description.as_str());

        let mut context = Context::new();
        context.insert("language", &self.language);
        context.insert("business", business);
        context.insert("specification", specification);
        self.complete(PromptTemplate::CursorPrompt, &context, bottleneck).await
    }

    async fn complete(
        &self,
        template: PromptTemplate,
        context: &Context,
        bottleneck: &Bottleneck,
    ) -> Result<String> {
        let prompt = self.prompts.render(template, context)?;
        let text = self.llm.complete(&prompt).await.context("prompt generation request")?;
        info!(
            event_name = "generator.completed",
            bottleneck_id = %bottleneck.id,
            template = template.file(),
            chars = text.chars().count(),
            "build document generated"
        );
        Ok(text.trim().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use chokepoint_core::{Bottleneck, BottleneckId, BusinessProfile, RefinedBottleneck};

    use super::{PromptGenerator, PromptVariant};
    use crate::prompts::PromptLibrary;
    use crate::testing::ScriptedLlm;

    fn generator(llm: Arc<ScriptedLlm>) -> PromptGenerator {
        PromptGenerator::new(llm, Arc::new(PromptLibrary::new().expect("prompts")), "English".to_owned())
    }

    fn business() -> BusinessProfile {
        BusinessProfile {
            product_description: "Car wash".to_owned(),
            team_size: 5,
            workflows: "booking, washing".to_owned(),
            kpis: "cars per day".to_owned(),
        }
    }

    fn bottleneck() -> Bottleneck {
        Bottleneck {
            title: "Phone bookings".to_owned(),
            problem_description: "Staff answer calls while washing".to_owned(),
            to_be_process: "Online booking form".to_owned(),
            suggested_agents: vec!["Booking agent".to_owned()],
            ..Bottleneck::blank(BottleneckId("b-1".to_owned()))
        }
    }

    fn refined(technical_spec: &str) -> RefinedBottleneck {
        RefinedBottleneck {
            bottleneck: bottleneck(),
            user_clarifications: vec!["about 40 calls a day".to_owned()],
            agreed_solution: "Telegram booking bot".to_owned(),
            implementation_details: "Sync with the calendar".to_owned(),
            dialog_summary: "Bookings move to a bot".to_owned(),
            process_description: "Client books, bot confirms".to_owned(),
            technical_spec: technical_spec.to_owned(),
            refined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn implementation_prompt_uses_bottleneck_without_refinement() {
        let llm = Arc::new(ScriptedLlm::new().on("[task:implementation-prompt]", "  # Build plan  "));

        let text = generator(llm.clone())
            .generate(PromptVariant::Implementation, &business(), &bottleneck(), None)
            .await
            .expect("prompt");

        assert_eq!(text, "# Build plan");
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Online booking form"));
        assert!(prompt.contains("Booking agent"));
    }

    #[tokio::test]
    async fn refined_solution_overrides_to_be_process() {
        let llm = Arc::new(ScriptedLlm::new().on("[task:implementation-prompt]", "plan"));
        let refined = refined("Spec: bot with calendar sync");

        generator(llm.clone())
            .implementation_prompt(&business(), &bottleneck(), Some(&refined))
            .await
            .expect("prompt");

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Telegram booking bot"));
        assert!(prompt.contains("about 40 calls a day"));
        assert!(prompt.contains("Spec: bot with calendar sync"));
        assert!(!prompt.contains("Online booking form"));
    }

    #[tokio::test]
    async fn cursor_prompt_prefers_technical_spec() {
        let llm = Arc::new(ScriptedLlm::new().on("[task:cursor-prompt]", "cursor plan"));
        let generator = generator(llm.clone());

        generator
            .generate(PromptVariant::Cursor, &business(), &bottleneck(), Some(&refined("Detailed spec")))
            .await
            .expect("with spec");
        generator
            .generate(PromptVariant::Cursor, &business(), &bottleneck(), Some(&refined("  ")))
            .await
            .expect("blank spec");

        let prompts = llm.prompts();
        assert!(prompts[0].contains("Detailed spec"));
        assert!(prompts[1].contains("Staff answer calls while washing"));
    }
}
