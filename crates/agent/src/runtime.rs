use std::sync::Arc;

use anyhow::Result;

use chokepoint_core::config::AppConfig;

use crate::analysis::ValueChainAnalyzer;
use crate::dialog::{DialogEngine, DialogSettings};
use crate::generator::PromptGenerator;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::orchestrator::{AgentContext, Orchestrator};
use crate::prompts::PromptLibrary;

/// Every model-backed service, wired over one client and one template set.
pub struct AgentRuntime {
    pub analyzer: ValueChainAnalyzer,
    pub dialog: DialogEngine,
    pub orchestrator: Orchestrator,
    pub generator: PromptGenerator,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, config: &AppConfig) -> Result<Self> {
        let prompts = Arc::new(PromptLibrary::new()?);
        let language = config.dialog.reply_language.clone();

        Ok(Self {
            analyzer: ValueChainAnalyzer::new(llm.clone(), prompts.clone(), language.clone()),
            dialog: DialogEngine::new(
                llm.clone(),
                prompts.clone(),
                DialogSettings::from(&config.dialog),
            ),
            orchestrator: Orchestrator::new(AgentContext::new(
                llm.clone(),
                prompts.clone(),
                language.clone(),
            )),
            generator: PromptGenerator::new(llm, prompts, language),
        })
    }

    /// Runtime backed by the HTTP client for the configured provider.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        Self::new(llm, config)
    }
}
