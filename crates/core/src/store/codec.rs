use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::bottleneck::{Bottleneck, BottleneckId};
use crate::domain::business::BusinessProfile;
use crate::domain::dialog::DialogState;
use crate::domain::multi_agent::MultiAgentState;
use crate::domain::refined::RefinedBottleneck;
use crate::store::state::{PersistedState, ViewMode};
use crate::store::StoreError;

pub const STORAGE_KEY: &str = "bottleneck-analyzer-storage";
pub const SCHEMA_VERSION: u64 = 2;

const LEGACY_VERSION: u64 = 0;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    state: &'a PersistedState,
    version: u64,
}

/// Shape written before the schema was versioned: refinements were a list of
/// `[id, refined]` pairs and only the active dialog was kept.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyState {
    #[serde(default)]
    business_data: Option<BusinessProfile>,
    #[serde(default)]
    bottlenecks: Vec<Bottleneck>,
    #[serde(default)]
    refined_bottlenecks: Vec<(BottleneckId, RefinedBottleneck)>,
    #[serde(default)]
    multi_agent_state: Option<MultiAgentState>,
    #[serde(default)]
    view_mode: ViewMode,
    #[serde(default)]
    dialog_state: Option<DialogState>,
}

impl From<LegacyState> for PersistedState {
    fn from(legacy: LegacyState) -> Self {
        let mut state = PersistedState {
            business_data: legacy.business_data,
            bottlenecks: legacy.bottlenecks,
            multi_agent_state: legacy.multi_agent_state,
            view_mode: legacy.view_mode,
            refined_bottlenecks: legacy.refined_bottlenecks.into_iter().collect(),
            ..PersistedState::default()
        };
        if let Some(dialog) = legacy.dialog_state {
            if state.view_mode == ViewMode::BottleneckDetail {
                state.selected_bottleneck_id = Some(dialog.bottleneck_id.clone());
            }
            state.dialog_states.insert(dialog.bottleneck_id.clone(), dialog);
        }
        state
    }
}

pub fn save(state: &PersistedState) -> Result<String, StoreError> {
    serde_json::to_string(&EnvelopeOut { state, version: SCHEMA_VERSION })
        .map_err(|error| StoreError::Malformed(error.to_string()))
}

/// Reads the current envelope or migrates a legacy one.
pub fn load(raw: &str) -> Result<PersistedState, StoreError> {
    let mut envelope: Value =
        serde_json::from_str(raw).map_err(|error| StoreError::Malformed(error.to_string()))?;
    let version = match envelope.get("version") {
        None => LEGACY_VERSION,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| StoreError::Malformed("version must be a non-negative integer".into()))?,
    };
    let state = envelope
        .get_mut("state")
        .map(Value::take)
        .ok_or_else(|| StoreError::Malformed("missing state object".to_owned()))?;

    let decode = |error: serde_json::Error| StoreError::Malformed(error.to_string());
    match version {
        SCHEMA_VERSION => serde_json::from_value(state).map_err(decode),
        LEGACY_VERSION => serde_json::from_value::<LegacyState>(state)
            .map(PersistedState::from)
            .map_err(decode),
        other => Err(StoreError::UnsupportedVersion(other)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{load, save, SCHEMA_VERSION};
    use crate::domain::bottleneck::{Bottleneck, BottleneckId};
    use crate::domain::dialog::DialogState;
    use crate::store::state::{PersistedState, ViewMode};
    use crate::store::StoreError;

    fn refined_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": "Slow approvals",
            "processArea": "Finance",
            "problemDescription": "Approvals wait in email",
            "currentImpact": "3 days",
            "priority": "high",
            "potentialGain": "1 day",
            "asIsProcess": "email",
            "toBeProcess": "bot",
            "suggestedAgents": [],
            "mcpToolsNeeded": [],
            "userClarifications": ["CFO signs"],
            "agreedSolution": "Approval bot",
            "implementationDetails": "",
            "dialogSummary": "",
            "processDescription": "",
            "technicalSpec": "",
            "refinedAt": "2025-01-10T10:00:00Z"
        })
    }

    #[test]
    fn saved_state_reloads_unchanged() {
        let mut state = PersistedState::default();
        state.add_bottleneck(Bottleneck::blank(BottleneckId("b-1".to_owned()))).expect("add");
        state.upsert_dialog_state(DialogState::new(BottleneckId("b-1".to_owned()))).expect("dialog");
        state.view_mode = ViewMode::BottlenecksList;

        let raw = save(&state).expect("save");
        let envelope: serde_json::Value = serde_json::from_str(&raw).expect("json");

        assert_eq!(envelope["version"], SCHEMA_VERSION);
        assert!(envelope["state"]["dialogStates"]["b-1"].is_object());
        assert_eq!(load(&raw).expect("load"), state);
    }

    #[test]
    fn legacy_array_of_pairs_is_migrated() {
        let raw = json!({
            "state": {
                "bottlenecks": [],
                "refinedBottlenecks": [["b-4", refined_json("b-4")]],
                "viewMode": "bottleneck_detail",
                "dialogState": {
                    "bottleneckId": "b-4",
                    "phase": "complete",
                    "messages": [],
                    "insights": [],
                    "clarifications": [],
                    "isComplete": true
                }
            },
            "version": 0
        })
        .to_string();

        let state = load(&raw).expect("legacy load");
        let id = BottleneckId("b-4".to_owned());

        assert_eq!(state.refined_bottlenecks[&id].agreed_solution, "Approval bot");
        assert!(state.dialog_states[&id].is_complete);
        assert_eq!(state.selected_bottleneck_id, Some(id));
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let raw = json!({"state": {}, "version": 7}).to_string();
        assert!(matches!(load(&raw), Err(StoreError::UnsupportedVersion(7))));
        assert!(matches!(load("not json"), Err(StoreError::Malformed(_))));
        assert!(matches!(load("{\"version\": 2}"), Err(StoreError::Malformed(_))));
    }
}
