use std::collections::BTreeMap;

use crate::domain::bottleneck::{Bottleneck, BottleneckField, BottleneckPatch};
use crate::domain::suggestion::FieldSuggestion;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    Dismissed,
    /// The suggestion was already applied or dismissed; nothing changed.
    AlreadyResolved,
}

/// Pending suggestions for one bottleneck, keyed by field.
#[derive(Clone, Debug, Default)]
pub struct SuggestionBoard {
    pending: BTreeMap<BottleneckField, FieldSuggestion>,
}

impl SuggestionBoard {
    pub fn new(suggestions: Vec<FieldSuggestion>) -> Self {
        let mut board = Self::default();
        board.extend(suggestions);
        board
    }

    /// Adds fresh suggestions; a field already pending keeps its first entry.
    pub fn extend(&mut self, suggestions: Vec<FieldSuggestion>) {
        for suggestion in suggestions {
            self.pending.entry(suggestion.field).or_insert(suggestion);
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &FieldSuggestion> {
        self.pending.values()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Writes the suggested value into the bottleneck. An invalid priority is
    /// rejected without touching the bottleneck and stays pending.
    pub fn apply(
        &mut self,
        field: BottleneckField,
        bottleneck: &mut Bottleneck,
    ) -> Result<Resolution, DomainError> {
        let Some(suggestion) = self.pending.get(&field) else {
            return Ok(Resolution::AlreadyResolved);
        };
        bottleneck.set_field(field, &suggestion.suggested_value)?;
        self.pending.remove(&field);
        Ok(Resolution::Applied)
    }

    pub fn dismiss(&mut self, field: BottleneckField) -> Resolution {
        match self.pending.remove(&field) {
            Some(_) => Resolution::Dismissed,
            None => Resolution::AlreadyResolved,
        }
    }

    /// Resolves every pending suggestion into one patch. Suggestions that cannot
    /// be applied are returned alongside it and dropped from the board.
    pub fn apply_all(&mut self) -> (BottleneckPatch, Vec<(FieldSuggestion, DomainError)>) {
        let mut patch = BottleneckPatch::default();
        let mut rejected = Vec::new();
        for (field, suggestion) in std::mem::take(&mut self.pending) {
            if let Err(error) = patch.set(field, &suggestion.suggested_value) {
                rejected.push((suggestion, error));
            }
        }
        (patch, rejected)
    }
}
