//! Portable export files for one improvement point or a whole analysis.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::bottleneck::{Bottleneck, BottleneckId};
use crate::domain::business::BusinessProfile;
use crate::domain::dialog::DialogState;
use crate::domain::multi_agent::MultiAgentState;
use crate::domain::refined::RefinedBottleneck;
use crate::store::PersistedState;

pub const EXPORT_VERSION: &str = "1.0";

const MAX_TITLE_SLUG_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleBottleneckExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub bottleneck: Bottleneck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_state: Option<DialogState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_bottleneck: Option<RefinedBottleneck>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_data: Option<BusinessProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_agent_state: Option<MultiAgentState>,
    pub bottlenecks: Vec<Bottleneck>,
    #[serde(default)]
    pub dialog_states: BTreeMap<BottleneckId, DialogState>,
    #[serde(default)]
    pub refined_bottlenecks: BTreeMap<BottleneckId, RefinedBottleneck>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExportFile {
    SingleBottleneck(SingleBottleneckExport),
    FullExport(FullExport),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid export file: missing required field {0}")]
    MissingField(&'static str),
    #[error("unsupported export version {0}")]
    UnsupportedVersion(String),
    #[error("invalid export file: bottleneck must have an id and a title")]
    InvalidBottleneck,
    #[error("invalid export file: {0} must be an array")]
    ExpectedArray(&'static str),
    #[error("invalid export file: {0} must be an object")]
    ExpectedObject(&'static str),
    #[error("unknown export type {0}")]
    UnknownType(String),
    #[error("invalid export file: {0}")]
    Malformed(String),
    #[error("invalid export file: dialog filed under {key} belongs to {found}")]
    MisfiledDialog { key: BottleneckId, found: BottleneckId },
    #[error("invalid export file: refined record {0} has no completed dialog")]
    RefinedWithoutCompletedDialog(BottleneckId),
}

pub fn export_bottleneck(state: &PersistedState, id: &BottleneckId) -> Option<ExportFile> {
    let bottleneck = state.bottleneck(id)?.clone();
    Some(ExportFile::SingleBottleneck(SingleBottleneckExport {
        version: EXPORT_VERSION.to_owned(),
        exported_at: Utc::now(),
        bottleneck,
        dialog_state: state.dialog_states.get(id).cloned(),
        refined_bottleneck: state.refined_bottlenecks.get(id).cloned(),
    }))
}

pub fn export_all(state: &PersistedState) -> ExportFile {
    ExportFile::FullExport(FullExport {
        version: EXPORT_VERSION.to_owned(),
        exported_at: Utc::now(),
        business_data: state.business_data.clone(),
        multi_agent_state: state.multi_agent_state.clone(),
        bottlenecks: state.bottlenecks.clone(),
        dialog_states: state.dialog_states.clone(),
        refined_bottlenecks: state.refined_bottlenecks.clone(),
    })
}

/// Checks the envelope field by field so the user learns what is wrong, then
/// decodes the typed payload.
pub fn validate_import(raw: &str) -> Result<ExportFile, ImportError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| ImportError::InvalidJson(error.to_string()))?;
    let kind = value.get("type").and_then(Value::as_str).ok_or(ImportError::MissingField("type"))?;
    let version =
        value.get("version").and_then(Value::as_str).ok_or(ImportError::MissingField("version"))?;
    if value.get("exportedAt").is_none() {
        return Err(ImportError::MissingField("exportedAt"));
    }
    if version != EXPORT_VERSION {
        return Err(ImportError::UnsupportedVersion(version.to_owned()));
    }

    match kind {
        "single_bottleneck" => {
            let bottleneck = value.get("bottleneck").ok_or(ImportError::InvalidBottleneck)?;
            let has_text = |key: &str| {
                bottleneck.get(key).and_then(Value::as_str).is_some_and(|text| !text.is_empty())
            };
            if !has_text("id") || !has_text("title") {
                return Err(ImportError::InvalidBottleneck);
            }
        }
        "full_export" => {
            if !value.get("bottlenecks").is_some_and(Value::is_array) {
                return Err(ImportError::ExpectedArray("bottlenecks"));
            }
            for key in ["dialogStates", "refinedBottlenecks"] {
                if value.get(key).is_some_and(|field| !field.is_object()) {
                    return Err(ImportError::ExpectedObject(key));
                }
            }
        }
        other => return Err(ImportError::UnknownType(other.to_owned())),
    }

    let file: ExportFile =
        serde_json::from_value(value).map_err(|error| ImportError::Malformed(error.to_string()))?;
    check_links(&file)?;
    Ok(file)
}

/// Dialogs must sit under their own bottleneck id and a refined record needs
/// a completed dialog for the same bottleneck, as in a live session.
fn check_links(file: &ExportFile) -> Result<(), ImportError> {
    match file {
        ExportFile::SingleBottleneck(export) => {
            let id = &export.bottleneck.id;
            if let Some(dialog) = &export.dialog_state {
                check_dialog_key(id, dialog)?;
            }
            if let Some(refined) = &export.refined_bottleneck {
                check_refined(id, refined, export.dialog_state.as_ref())?;
            }
        }
        ExportFile::FullExport(export) => {
            for (key, dialog) in &export.dialog_states {
                check_dialog_key(key, dialog)?;
            }
            for (key, refined) in &export.refined_bottlenecks {
                check_refined(key, refined, export.dialog_states.get(key))?;
            }
        }
    }
    Ok(())
}

fn check_dialog_key(key: &BottleneckId, dialog: &DialogState) -> Result<(), ImportError> {
    if &dialog.bottleneck_id != key {
        return Err(ImportError::MisfiledDialog {
            key: key.clone(),
            found: dialog.bottleneck_id.clone(),
        });
    }
    Ok(())
}

fn check_refined(
    key: &BottleneckId,
    refined: &RefinedBottleneck,
    dialog: Option<&DialogState>,
) -> Result<(), ImportError> {
    if &refined.bottleneck.id != key || !dialog.is_some_and(|dialog| dialog.is_complete) {
        return Err(ImportError::RefinedWithoutCompletedDialog(key.clone()));
    }
    Ok(())
}

impl ExportFile {
    /// Merges an import into the session. Entries with the same id are
    /// replaced; a full export also replaces the business profile.
    pub fn merge_into(self, state: &mut PersistedState) {
        match self {
            Self::SingleBottleneck(export) => {
                let id = export.bottleneck.id.clone();
                upsert_bottleneck(state, export.bottleneck);
                match export.dialog_state {
                    Some(dialog) => {
                        state.dialog_states.insert(id.clone(), dialog);
                    }
                    None => {
                        state.dialog_states.remove(&id);
                    }
                }
                match export.refined_bottleneck {
                    Some(refined) => {
                        state.refined_bottlenecks.insert(id, refined);
                    }
                    None => {
                        state.refined_bottlenecks.remove(&id);
                    }
                }
            }
            Self::FullExport(export) => {
                if export.business_data.is_some() {
                    state.business_data = export.business_data;
                }
                if export.multi_agent_state.is_some() {
                    state.multi_agent_state = export.multi_agent_state;
                }
                for bottleneck in export.bottlenecks {
                    upsert_bottleneck(state, bottleneck);
                }
                state.dialog_states.extend(export.dialog_states);
                state.refined_bottlenecks.extend(export.refined_bottlenecks);
            }
        }
    }

    pub fn suggested_filename(&self, today: NaiveDate) -> String {
        let date = today.format("%Y-%m-%d");
        match self {
            Self::SingleBottleneck(export) => {
                format!("improvement-{}-{date}.json", sanitize_title(&export.bottleneck.title))
            }
            Self::FullExport(_) => format!("business-analysis-{date}.json"),
        }
    }
}

fn upsert_bottleneck(state: &mut PersistedState, bottleneck: Bottleneck) {
    match state.bottlenecks.iter_mut().find(|existing| existing.id == bottleneck.id) {
        Some(existing) => *existing = bottleneck,
        None => state.bottlenecks.push(bottleneck),
    }
}

/// Lowercase alphanumerics (any script) joined by single dashes.
fn sanitize_title(title: &str) -> String {
    let mut slug = String::new();
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let trimmed: String = slug.trim_end_matches('-').chars().take(MAX_TITLE_SLUG_CHARS).collect();
    if trimmed.is_empty() {
        "untitled".to_owned()
    } else {
        trimmed.trim_end_matches('-').to_owned()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{export_all, export_bottleneck, validate_import, ExportFile, ImportError};
    use crate::domain::bottleneck::{Bottleneck, BottleneckId};
    use crate::domain::dialog::DialogState;
    use crate::store::PersistedState;

    fn session() -> PersistedState {
        let mut state = PersistedState::default();
        let bottleneck = Bottleneck {
            title: "Ручная сверка счетов / Q3".to_owned(),
            ..Bottleneck::blank(BottleneckId("b-1".to_owned()))
        };
        state.add_bottleneck(bottleneck).expect("add");
        state.upsert_dialog_state(DialogState::new(BottleneckId("b-1".to_owned()))).expect("dialog");
        state
    }

    #[test]
    fn single_export_round_trips_through_validation() {
        let export =
            export_bottleneck(&session(), &BottleneckId("b-1".to_owned())).expect("export");
        let raw = serde_json::to_string(&export).expect("serialize");

        let parsed = validate_import(&raw).expect("valid");

        assert!(raw.contains("\"type\":\"single_bottleneck\""));
        assert_eq!(parsed, export);
    }

    #[test]
    fn full_export_merges_into_empty_session() {
        let raw = serde_json::to_string(&export_all(&session())).expect("serialize");
        let mut target = PersistedState::default();

        validate_import(&raw).expect("valid").merge_into(&mut target);

        assert_eq!(target.bottlenecks.len(), 1);
        assert_eq!(target.dialog_states.len(), 1);
    }

    #[test]
    fn reports_specific_validation_errors() {
        let cases = [
            (json!({"version": "1.0", "exportedAt": "x"}), ImportError::MissingField("type")),
            (
                json!({"type": "full_export", "version": "2.0", "exportedAt": "x"}),
                ImportError::UnsupportedVersion("2.0".to_owned()),
            ),
            (
                json!({"type": "single_bottleneck", "version": "1.0", "exportedAt": "x",
                       "bottleneck": {"id": "b"}}),
                ImportError::InvalidBottleneck,
            ),
            (
                json!({"type": "full_export", "version": "1.0", "exportedAt": "x",
                       "bottlenecks": {}}),
                ImportError::ExpectedArray("bottlenecks"),
            ),
            (
                json!({"type": "full_export", "version": "1.0", "exportedAt": "x",
                       "bottlenecks": [], "dialogStates": []}),
                ImportError::ExpectedObject("dialogStates"),
            ),
            (
                json!({"type": "partial", "version": "1.0", "exportedAt": "x"}),
                ImportError::UnknownType("partial".to_owned()),
            ),
        ];

        for (payload, expected) in cases {
            assert_eq!(validate_import(&payload.to_string()), Err(expected));
        }
    }

    fn refined(id: &str) -> serde_json::Value {
        json!({"id": id, "title": "Manual invoicing", "agreedSolution": "Invoice agent",
               "refinedAt": "2026-01-01T00:00:00Z"})
    }

    #[test]
    fn rejects_dialog_filed_under_another_bottleneck() {
        let single = json!({
            "type": "single_bottleneck", "version": "1.0", "exportedAt": "2026-01-01T00:00:00Z",
            "bottleneck": {"id": "b-1", "title": "Manual invoicing"},
            "dialogState": {"bottleneckId": "b-OTHER", "phase": "clarifying"}
        });
        let full = json!({
            "type": "full_export", "version": "1.0", "exportedAt": "2026-01-01T00:00:00Z",
            "bottlenecks": [{"id": "b-1", "title": "Manual invoicing"}],
            "dialogStates": {"b-1": {"bottleneckId": "b-OTHER", "phase": "clarifying"}}
        });

        for payload in [single, full] {
            assert_eq!(
                validate_import(&payload.to_string()),
                Err(ImportError::MisfiledDialog {
                    key: BottleneckId("b-1".to_owned()),
                    found: BottleneckId("b-OTHER".to_owned()),
                })
            );
        }
    }

    #[test]
    fn rejects_refined_record_without_completed_dialog() {
        let open_dialog = json!({
            "type": "single_bottleneck", "version": "1.0", "exportedAt": "2026-01-01T00:00:00Z",
            "bottleneck": {"id": "b-1", "title": "Manual invoicing"},
            "dialogState": {"bottleneckId": "b-1", "phase": "implementation", "isComplete": false},
            "refinedBottleneck": refined("b-1")
        });
        let no_dialog = json!({
            "type": "full_export", "version": "1.0", "exportedAt": "2026-01-01T00:00:00Z",
            "bottlenecks": [{"id": "b-1", "title": "Manual invoicing"}],
            "refinedBottlenecks": {"b-1": refined("b-1")}
        });

        for payload in [open_dialog, no_dialog] {
            assert_eq!(
                validate_import(&payload.to_string()),
                Err(ImportError::RefinedWithoutCompletedDialog(BottleneckId("b-1".to_owned())))
            );
        }
    }

    #[test]
    fn accepts_refined_record_with_completed_dialog() {
        let payload = json!({
            "type": "single_bottleneck", "version": "1.0", "exportedAt": "2026-01-01T00:00:00Z",
            "bottleneck": {"id": "b-1", "title": "Manual invoicing"},
            "dialogState": {"bottleneckId": "b-1", "phase": "complete", "isComplete": true},
            "refinedBottleneck": refined("b-1")
        });
        let mut target = PersistedState::default();

        validate_import(&payload.to_string()).expect("valid").merge_into(&mut target);

        assert!(target.refined_bottlenecks.contains_key(&BottleneckId("b-1".to_owned())));
    }

    #[test]
    fn filenames_are_sanitized_and_dated() {
        let export =
            export_bottleneck(&session(), &BottleneckId("b-1".to_owned())).expect("export");
        let today = NaiveDate::from_ymd_opt(2025, 3, 9).expect("date");

        assert_eq!(
            export.suggested_filename(today),
            "improvement-ручная-сверка-счетов-q3-2025-03-09.json"
        );
        assert_eq!(
            export_all(&PersistedState::default()).suggested_filename(today),
            "business-analysis-2025-03-09.json"
        );
        assert!(matches!(export, ExportFile::SingleBottleneck(_)));
    }
}
