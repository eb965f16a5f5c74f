use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;

/// A phase in a linear progression. Higher rank means further along.
pub trait OrderedPhase: Copy + Eq + fmt::Display {
    fn rank(&self) -> u8;
    fn is_terminal(&self) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseTransition<P> {
    pub from: P,
    pub to: P,
    pub advanced: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhaseTransitionError {
    #[error("phase cannot move backward from {from} to {to}")]
    Regression { from: String, to: String },
    #[error("phase {phase} is terminal")]
    Terminal { phase: String },
}

/// Forward-only transitions over an ordered phase enum. Skipping ahead is
/// allowed, moving back never is, and the terminal phase is final.
pub struct PhaseMachine<P> {
    _phase: PhantomData<P>,
}

impl<P> Default for PhaseMachine<P> {
    fn default() -> Self {
        Self { _phase: PhantomData }
    }
}

impl<P> PhaseMachine<P>
where
    P: OrderedPhase,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transition(
        &self,
        current: P,
        requested: P,
    ) -> Result<PhaseTransition<P>, PhaseTransitionError> {
        if current == requested {
            return Ok(PhaseTransition { from: current, to: current, advanced: false });
        }
        if current.is_terminal() {
            return Err(PhaseTransitionError::Terminal { phase: current.to_string() });
        }
        if requested.rank() < current.rank() {
            return Err(PhaseTransitionError::Regression {
                from: current.to_string(),
                to: requested.to_string(),
            });
        }
        Ok(PhaseTransition { from: current, to: requested, advanced: true })
    }

    /// Like [`Self::transition`], but a rejected request keeps the current phase.
    pub fn resolve(&self, current: P, requested: P) -> PhaseTransition<P> {
        self.transition(current, requested).unwrap_or(PhaseTransition {
            from: current,
            to: current,
            advanced: false,
        })
    }
}
