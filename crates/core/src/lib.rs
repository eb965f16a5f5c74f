pub mod config;
pub mod domain;
pub mod errors;
pub mod exchange;
pub mod extract;
pub mod phases;
pub mod store;
pub mod suggestions;

pub use domain::bottleneck::{Bottleneck, BottleneckField, BottleneckId, BottleneckPatch, Priority};
pub use domain::business::BusinessProfile;
pub use domain::dialog::{ChatMessage, DialogPhase, DialogState, MessageRole};
pub use domain::multi_agent::{
    AgentBlueprint, AgentMessage, AgentRole, MultiAgentPhase, MultiAgentState, ProcessStep,
    Roadmap, SolutionProposal, ValueChainMap,
};
pub use domain::refined::{RefinedBottleneck, RefinementArtifacts};
pub use domain::suggestion::FieldSuggestion;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use extract::{extract_array, extract_object, LlmOutput};
pub use phases::{OrderedPhase, PhaseMachine, PhaseTransition, PhaseTransitionError};
