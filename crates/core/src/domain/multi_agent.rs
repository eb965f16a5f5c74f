use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::bottleneck::{Bottleneck, BottleneckId};
use crate::domain::business::BusinessProfile;
use crate::errors::DomainError;
use crate::phases::OrderedPhase;

pub const APOLOGY_QUESTION: &str =
    "Извините, произошла ошибка. Попробуйте переформулировать ответ.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiAgentPhase {
    Initialization,
    ProcessMapping,
    BottleneckAnalysis,
    SolutionDesign,
    Complete,
}

impl MultiAgentPhase {
    pub const ALL: [Self; 5] = [
        Self::Initialization,
        Self::ProcessMapping,
        Self::BottleneckAnalysis,
        Self::SolutionDesign,
        Self::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::ProcessMapping => "process_mapping",
            Self::BottleneckAnalysis => "bottleneck_analysis",
            Self::SolutionDesign => "solution_design",
            Self::Complete => "complete",
        }
    }
}

impl OrderedPhase for MultiAgentPhase {
    fn rank(&self) -> u8 {
        match self {
            Self::Initialization => 0,
            Self::ProcessMapping => 1,
            Self::BottleneckAnalysis => 2,
            Self::SolutionDesign => 3,
            Self::Complete => 4,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl FromStr for MultiAgentPhase {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == value.trim())
            .ok_or_else(|| DomainError::UnknownPhase(value.to_owned()))
    }
}

impl fmt::Display for MultiAgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Manager,
    ProcessMining,
    BottleneckFinder,
    Redesign,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub agent_type: AgentRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub phase: MultiAgentPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl AgentMessage {
    pub fn new(agent_type: AgentRole, phase: MultiAgentPhase, content: impl Into<String>) -> Self {
        Self { agent_type, content: content.into(), timestamp: Utc::now(), phase, metadata: None }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTimeUnit {
    #[default]
    Hours,
    Days,
    Weeks,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub unit: CycleTimeUnit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStep {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_time: Option<CycleTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bottleneck: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottleneck_reason: Option<String>,
}

impl ProcessStep {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: format!("step_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            participants: Vec::new(),
            cycle_time: None,
            problem_frequency: None,
            queue_size: None,
            utilization: None,
            is_bottleneck: None,
            bottleneck_reason: None,
        }
    }

    /// Drops rate metrics that fall outside [0, 1].
    pub fn sanitize_metrics(&mut self) {
        let in_unit_range = |value: &f64| (0.0..=1.0).contains(value);
        self.problem_frequency = self.problem_frequency.filter(in_unit_range);
        self.utilization = self.utilization.filter(in_unit_range);
    }

    pub fn mark_bottleneck(&mut self, reason: impl Into<String>) {
        self.is_bottleneck = Some(true);
        self.bottleneck_reason = Some(reason.into());
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChainMap {
    pub id: String,
    pub product_description: String,
    #[serde(default)]
    pub steps: Vec<ProcessStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValueChainMap {
    pub fn new(product_description: impl Into<String>, steps: Vec<ProcessStep>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("vcm_{}", uuid::Uuid::new_v4()),
            product_description: product_description.into(),
            steps,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the steps, keeping identity and creation time.
    pub fn with_steps(&self, steps: Vec<ProcessStep>) -> Self {
        Self { steps, updated_at: Utc::now(), ..self.clone() }
    }

    pub fn bottleneck_steps(&self) -> impl Iterator<Item = &ProcessStep> {
        self.steps.iter().filter(|step| step.is_bottleneck == Some(true))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedAnswer {
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    #[serde(default)]
    pub mvp: Vec<String>,
    #[serde(default)]
    pub long_term: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBlueprint {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionProposal {
    pub bottleneck_id: BottleneckId,
    pub solution: String,
    #[serde(default)]
    pub roadmap: Roadmap,
    #[serde(default)]
    pub agents: Vec<AgentBlueprint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiAgentState {
    pub phase: MultiAgentPhase,
    pub business_data: BusinessProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_chain_map: Option<ValueChainMap>,
    #[serde(default)]
    pub agent_messages: Vec<AgentMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<String>,
    #[serde(default)]
    pub collected_answers: BTreeMap<String, CollectedAnswer>,
    #[serde(default)]
    pub bottlenecks: Vec<Bottleneck>,
    #[serde(default)]
    pub solutions: Vec<SolutionProposal>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub thinking: String,
}

impl MultiAgentState {
    pub fn new(business_data: BusinessProfile) -> Self {
        Self {
            phase: MultiAgentPhase::Initialization,
            business_data,
            value_chain_map: None,
            agent_messages: Vec::new(),
            current_question: None,
            collected_answers: BTreeMap::new(),
            bottlenecks: Vec::new(),
            solutions: Vec::new(),
            is_complete: false,
            thinking: String::new(),
        }
    }

    /// Stores an answer under `answer_{n}` and returns the key. `n` follows the
    /// highest stored index, so gaps never lead to an overwrite.
    pub fn record_answer(&mut self, answer: impl Into<String>) -> String {
        let next = self
            .collected_answers
            .keys()
            .filter_map(|key| key.strip_prefix("answer_")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let key = format!("answer_{next}");
        self.collected_answers
            .insert(key.clone(), CollectedAnswer { answer: answer.into(), timestamp: Utc::now() });
        key
    }

    /// Answers in the order they were given.
    pub fn answers_in_order(&self) -> Vec<&CollectedAnswer> {
        let mut entries: Vec<(u64, &CollectedAnswer)> = self
            .collected_answers
            .iter()
            .map(|(key, answer)| {
                let ordinal = key
                    .strip_prefix("answer_")
                    .and_then(|suffix| suffix.parse().ok())
                    .unwrap_or(u64::MAX);
                (ordinal, answer)
            })
            .collect();
        entries.sort_by(|left, right| {
            left.0.cmp(&right.0).then_with(|| left.1.timestamp.cmp(&right.1.timestamp))
        });
        entries.into_iter().map(|(_, answer)| answer).collect()
    }

    pub fn push_message(&mut self, message: AgentMessage) {
        self.agent_messages.push(message);
    }

    /// State handed back when processing an answer failed: the user is asked to
    /// rephrase and the error is surfaced through `thinking`.
    pub fn recovered(mut self, error: impl fmt::Display) -> Self {
        self.current_question = Some(APOLOGY_QUESTION.to_owned());
        self.thinking = format!("Ошибка обработки: {error}");
        self
    }
}
