//! Multi-agent value chain interview.
//!
//! A manager agent interviews the user until it has enough to map the value
//! chain, then hands off to three sub-agents in order: process mining builds
//! the map, the bottleneck finder flags the slow stages, and redesign proposes
//! agent-based solutions. The whole session lives in [`MultiAgentState`],
//! which the caller owns and passes back on every turn.

mod bottleneck_finder;
mod manager;
mod process_mining;
mod redesign;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use chokepoint_core::{
    BusinessProfile, MultiAgentPhase, MultiAgentState, OrderedPhase, PhaseMachine,
};

use crate::llm::LlmClient;
use crate::prompts::PromptLibrary;

pub use bottleneck_finder::{BottleneckFinderAgent, FinderOutcome, MAX_BOTTLENECKS};
pub use manager::{salvage_question, ManagerAgent, ManagerDecision};
pub use process_mining::{ProcessMiningAgent, MAX_STEPS};
pub use redesign::RedesignAgent;

const CONFIRMATIONS: [&str; 4] = ["да", "продолжить", "yes", "continue"];

/// What every agent needs to talk to the model.
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<dyn LlmClient>,
    pub prompts: Arc<PromptLibrary>,
    pub language: String,
}

impl AgentContext {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, language: String) -> Self {
        Self { llm, prompts, language }
    }
}

/// A bare go-ahead that carries no new process information.
pub fn is_confirmation(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    CONFIRMATIONS.contains(&answer.as_str())
}

pub struct Orchestrator {
    manager: ManagerAgent,
    process_mining: ProcessMiningAgent,
    bottleneck_finder: BottleneckFinderAgent,
    redesign: RedesignAgent,
    phases: PhaseMachine<MultiAgentPhase>,
}

impl Orchestrator {
    pub fn new(context: AgentContext) -> Self {
        Self {
            manager: ManagerAgent::new(context.clone()),
            process_mining: ProcessMiningAgent::new(context.clone()),
            bottleneck_finder: BottleneckFinderAgent::new(context.clone()),
            redesign: RedesignAgent::new(context),
            phases: PhaseMachine::new(),
        }
    }

    pub async fn initialize(&self, business: BusinessProfile) -> Result<MultiAgentState> {
        let greeting = self.manager.greet(&business).await?;
        let mut state = MultiAgentState::new(business);
        state.current_question = Some(greeting.content.clone());
        state.push_message(greeting);
        info!(event_name = "multi_agent.initialized", "multi-agent session started");
        Ok(state)
    }

    pub async fn process_user_answer(
        &self,
        mut state: MultiAgentState,
        answer: &str,
    ) -> Result<MultiAgentState> {
        let answer = answer.trim();
        let key = state.record_answer(answer);
        let phase = state.phase;

        let state = match phase {
            MultiAgentPhase::Initialization => {
                match self.interview(state.clone(), answer).await {
                    Ok(next) => next,
                    Err(error) => {
                        warn!(
                            event_name = "multi_agent.interview.failed",
                            error = %error,
                            "manager turn failed, asking the user to rephrase"
                        );
                        state.recovered(error)
                    }
                }
            }
            MultiAgentPhase::ProcessMapping => {
                if !is_confirmation(answer) {
                    state = match state.value_chain_map.take() {
                        Some(map) => {
                            let (refined, message) =
                                self.process_mining.refine_map(&map, answer).await?;
                            state.value_chain_map = Some(refined);
                            state.push_message(message);
                            state
                        }
                        None => self.map_process(state).await?,
                    };
                }
                self.find_bottlenecks(state).await?
            }
            MultiAgentPhase::BottleneckAnalysis => self.design_solutions(state).await?,
            MultiAgentPhase::SolutionDesign => {
                self.advance(&mut state, MultiAgentPhase::Complete);
                state.is_complete = true;
                state
            }
            MultiAgentPhase::Complete => state,
        };

        info!(
            event_name = "multi_agent.answer.processed",
            answer_key = %key,
            from_phase = %phase,
            phase = %state.phase,
            "multi-agent answer processed"
        );
        Ok(state)
    }

    async fn interview(&self, mut state: MultiAgentState, answer: &str) -> Result<MultiAgentState> {
        let decision = self.manager.continue_dialog(&state, answer).await?;
        state.push_message(decision.message);
        state.current_question = decision.question;
        state.thinking = decision.thinking;

        let Some(target) = decision.advance_to else {
            return Ok(state);
        };
        if !self.phases.resolve(state.phase, target).advanced {
            return Ok(state);
        }

        state.current_question = None;
        self.run_pipeline(state, target).await
    }

    /// Runs every stage up to and including `target`.
    async fn run_pipeline(
        &self,
        mut state: MultiAgentState,
        target: MultiAgentPhase,
    ) -> Result<MultiAgentState> {
        if target.rank() >= MultiAgentPhase::ProcessMapping.rank() {
            state = self.map_process(state).await?;
        }
        if target.rank() >= MultiAgentPhase::BottleneckAnalysis.rank() {
            state = self.find_bottlenecks(state).await?;
        }
        if target.rank() >= MultiAgentPhase::SolutionDesign.rank() && !state.is_complete {
            state = self.design_solutions(state).await?;
        }
        if target == MultiAgentPhase::Complete {
            self.advance(&mut state, MultiAgentPhase::Complete);
            state.is_complete = true;
        }
        Ok(state)
    }

    async fn map_process(&self, mut state: MultiAgentState) -> Result<MultiAgentState> {
        let (map, message) =
            self.process_mining.create_map(&state.business_data, &state.answers_in_order()).await?;
        state.value_chain_map = Some(map);
        state.push_message(message);
        state.thinking = "Карта процессов создана. Переходим к анализу узких мест.".to_owned();
        self.advance(&mut state, MultiAgentPhase::ProcessMapping);
        Ok(state)
    }

    async fn find_bottlenecks(&self, mut state: MultiAgentState) -> Result<MultiAgentState> {
        if state.value_chain_map.is_none() {
            state = self.map_process(state).await?;
        }
        let Some(map) = state.value_chain_map.as_ref() else {
            return Ok(state);
        };

        let outcome = self.bottleneck_finder.find(&state.business_data, map).await?;
        state.thinking = format!(
            "Найдено {} узких мест. Переходим к проектированию решений.",
            outcome.bottlenecks.len()
        );
        state.value_chain_map = Some(outcome.map);
        state.bottlenecks = outcome.bottlenecks;
        state.push_message(outcome.message);
        self.advance(&mut state, MultiAgentPhase::BottleneckAnalysis);
        Ok(state)
    }

    async fn design_solutions(&self, mut state: MultiAgentState) -> Result<MultiAgentState> {
        if state.bottlenecks.is_empty() {
            let summary = "Узких мест не найдено. Анализ завершен.";
            state.push_message(redesign::message(summary.to_owned()));
            state.thinking = summary.to_owned();
            self.advance(&mut state, MultiAgentPhase::Complete);
            state.is_complete = true;
            return Ok(state);
        }

        let (solutions, message) =
            self.redesign.propose(&state.business_data, &state.bottlenecks).await?;
        state.thinking = format!("Предложены решения для {} узких мест.", solutions.len());
        state.solutions = solutions;
        state.push_message(message);
        self.advance(&mut state, MultiAgentPhase::SolutionDesign);
        Ok(state)
    }

    fn advance(&self, state: &mut MultiAgentState, target: MultiAgentPhase) {
        state.phase = self.phases.resolve(state.phase, target).to;
    }
}
