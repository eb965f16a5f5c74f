//! Field suggestions inferred from a dialog.
//!
//! The model proposes rewrites of bottleneck fields; candidates are filtered
//! here and surfaced to the user through a [`SuggestionBoard`], which makes
//! every apply/dismiss decision happen at most once.

mod board;
mod validation;

pub use board::{Resolution, SuggestionBoard};
pub use validation::{validate_candidates, SuggestionCandidate};

/// Suggestions are only extracted once the dialog holds this many messages.
pub const MIN_MESSAGES_FOR_SUGGESTIONS: usize = 2;
