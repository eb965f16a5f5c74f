//! Model-backed services for chokepoint.
//!
//! Everything here talks to a language model through the [`llm::LlmClient`]
//! seam and turns its free-form output into the typed records of
//! `chokepoint-core`:
//!
//! - `analysis` finds candidate bottlenecks from a business profile.
//! - `dialog` runs the phased clarification dialog for one bottleneck.
//! - `suggestions` proposes edits to bottleneck fields from a dialog.
//! - `orchestrator` runs the manager-led multi-agent value chain interview.
//! - `generator` writes build documents for an improvement point.
//!
//! The model never decides what a record may contain. Every reply is
//! validated in core before it reaches state, and unusable replies fall back
//! to fixed texts or empty results.

pub mod analysis;
pub mod dialog;
pub mod generator;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod runtime;
pub mod suggestions;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
