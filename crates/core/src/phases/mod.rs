pub mod machine;

pub use machine::{OrderedPhase, PhaseMachine, PhaseTransition, PhaseTransitionError};
