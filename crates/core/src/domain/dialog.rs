use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bottleneck::BottleneckId;
use crate::errors::DomainError;
use crate::phases::OrderedPhase;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogPhase {
    Clarifying,
    DeepDive,
    SolutionDesign,
    Implementation,
    Complete,
}

impl DialogPhase {
    pub const ALL: [Self; 5] = [
        Self::Clarifying,
        Self::DeepDive,
        Self::SolutionDesign,
        Self::Implementation,
        Self::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clarifying => "clarifying",
            Self::DeepDive => "deep_dive",
            Self::SolutionDesign => "solution_design",
            Self::Implementation => "implementation",
            Self::Complete => "complete",
        }
    }

    /// Whether this phase tracks a proposed solution after each reply.
    pub fn tracks_solution(self) -> bool {
        matches!(self, Self::SolutionDesign | Self::Implementation)
    }
}

impl OrderedPhase for DialogPhase {
    fn rank(&self) -> u8 {
        match self {
            Self::Clarifying => 0,
            Self::DeepDive => 1,
            Self::SolutionDesign => 2,
            Self::Implementation => 3,
            Self::Complete => 4,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl FromStr for DialogPhase {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == value.trim())
            .ok_or_else(|| DomainError::UnknownPhase(value.to_owned()))
    }
}

impl fmt::Display for DialogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DialogPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, phase: DialogPhase) -> Self {
        Self { phase: Some(phase), ..Self::new(MessageRole::Assistant, content) }
    }

    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            phase: None,
            thinking: None,
        }
    }

    pub fn with_thinking(mut self, thinking: Option<String>) -> Self {
        self.thinking = thinking.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn is_question(&self) -> bool {
        self.role == MessageRole::Assistant && self.content.contains('?')
    }
}

/// Conversation about one bottleneck.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogState {
    pub bottleneck_id: BottleneckId,
    pub phase: DialogPhase,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub clarifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_solution: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_spec: Option<String>,
}

impl DialogState {
    pub fn new(bottleneck_id: BottleneckId) -> Self {
        Self {
            bottleneck_id,
            phase: DialogPhase::Clarifying,
            messages: Vec::new(),
            insights: Vec::new(),
            clarifications: Vec::new(),
            proposed_solution: None,
            is_complete: false,
            technical_spec: None,
        }
    }

    /// Assistant turns that asked the user something.
    pub fn question_turns(&self) -> usize {
        self.messages.iter().filter(|message| message.is_question()).count()
    }

    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|message| message.role == MessageRole::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, DialogPhase, DialogState};
    use crate::domain::bottleneck::BottleneckId;

    #[test]
    fn phases_use_snake_case_on_the_wire() {
        let json = serde_json::to_string(&DialogPhase::SolutionDesign).expect("serialize");
        assert_eq!(json, "\"solution_design\"");
        assert_eq!("deep_dive".parse::<DialogPhase>(), Ok(DialogPhase::DeepDive));
        assert!("done".parse::<DialogPhase>().is_err());
    }

    #[test]
    fn question_turns_count_only_assistant_questions() {
        let mut state = DialogState::new(BottleneckId("b-1".to_owned()));
        state.messages.push(ChatMessage::assistant("Как часто это происходит?", DialogPhase::Clarifying));
        state.messages.push(ChatMessage::user("Каждый день?"));
        state.messages.push(ChatMessage::assistant("Понятно.", DialogPhase::DeepDive));

        assert_eq!(state.question_turns(), 1);
        assert_eq!(
            state.last_assistant_message().map(|message| message.content.as_str()),
            Some("Понятно.")
        );
    }

    #[test]
    fn blank_thinking_is_dropped() {
        let message = ChatMessage::assistant("ok", DialogPhase::Clarifying)
            .with_thinking(Some("  ".to_owned()));
        assert_eq!(message.thinking, None);
    }
}
