use serde::{Deserialize, Serialize};

use crate::domain::bottleneck::BottleneckField;

/// Proposed rewrite of one bottleneck field, inferred from a dialog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSuggestion {
    pub field: BottleneckField,
    pub current_value: String,
    pub suggested_value: String,
    pub reason: String,
}
