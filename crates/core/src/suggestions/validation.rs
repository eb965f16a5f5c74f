use std::collections::HashSet;

use serde::Deserialize;

use crate::domain::bottleneck::{Bottleneck, BottleneckField};
use crate::domain::suggestion::FieldSuggestion;

/// Untrusted suggestion as it comes back from the model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionCandidate {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub current_value: Option<String>,
    #[serde(default)]
    pub suggested_value: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Keeps candidates that name an editable field, carry a suggested value and a
/// reason, and actually change something. The current value may be empty since
/// blank fields are the usual target. The first candidate per field wins.
pub fn validate_candidates(
    candidates: Vec<SuggestionCandidate>,
    bottleneck: &Bottleneck,
) -> Vec<FieldSuggestion> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let field: BottleneckField = candidate.field.as_deref()?.trim().parse().ok()?;
            let current_value = candidate.current_value?.trim().to_owned();
            let suggested_value = non_blank(candidate.suggested_value)?;
            let reason = non_blank(candidate.reason)?;

            if current_value == suggested_value || bottleneck.field(field) == suggested_value {
                return None;
            }
            if !seen.insert(field) {
                return None;
            }
            Some(FieldSuggestion { field, current_value, suggested_value, reason })
        })
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_owned()).filter(|text| !text.is_empty())
}
