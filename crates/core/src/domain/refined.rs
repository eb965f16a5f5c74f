use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bottleneck::Bottleneck;
use crate::domain::dialog::DialogState;
use crate::errors::DomainError;

/// A bottleneck enriched with everything a completed dialog agreed on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedBottleneck {
    #[serde(flatten)]
    pub bottleneck: Bottleneck,
    #[serde(default)]
    pub user_clarifications: Vec<String>,
    pub agreed_solution: String,
    #[serde(default)]
    pub implementation_details: String,
    #[serde(default)]
    pub dialog_summary: String,
    #[serde(default)]
    pub process_description: String,
    #[serde(default)]
    pub technical_spec: String,
    pub refined_at: DateTime<Utc>,
}

/// Texts produced by the synthesis calls once a dialog completes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefinementArtifacts {
    pub implementation_details: String,
    pub dialog_summary: String,
    pub process_description: String,
    pub technical_spec: String,
}

impl RefinedBottleneck {
    /// Builds the record for a completed dialog. Fails unless the dialog is in
    /// its terminal phase with an agreed solution for this bottleneck.
    pub fn from_dialog(
        bottleneck: &Bottleneck,
        state: &DialogState,
        artifacts: RefinementArtifacts,
    ) -> Result<Self, DomainError> {
        if state.bottleneck_id != bottleneck.id {
            return Err(DomainError::InvariantViolation(format!(
                "dialog belongs to {} not {}",
                state.bottleneck_id, bottleneck.id
            )));
        }
        if !state.is_complete {
            return Err(DomainError::InvariantViolation(
                "refinement requires a completed dialog".to_owned(),
            ));
        }
        let agreed_solution = state
            .proposed_solution
            .clone()
            .filter(|solution| !solution.trim().is_empty())
            .ok_or_else(|| {
                DomainError::InvariantViolation("refinement requires an agreed solution".to_owned())
            })?;

        Ok(Self {
            bottleneck: bottleneck.clone(),
            user_clarifications: state.clarifications.clone(),
            agreed_solution,
            implementation_details: artifacts.implementation_details,
            dialog_summary: artifacts.dialog_summary,
            process_description: artifacts.process_description,
            technical_spec: artifacts.technical_spec,
            refined_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RefinedBottleneck, RefinementArtifacts};
    use crate::domain::bottleneck::{Bottleneck, BottleneckId};
    use crate::domain::dialog::{DialogPhase, DialogState};

    fn completed_state(id: &BottleneckId) -> DialogState {
        let mut state = DialogState::new(id.clone());
        state.phase = DialogPhase::Complete;
        state.is_complete = true;
        state.clarifications = vec!["Orders arrive by email".to_owned()];
        state.proposed_solution = Some("Parse emails into CRM automatically".to_owned());
        state
    }

    #[test]
    fn builds_from_completed_dialog() {
        let bottleneck = Bottleneck::blank(BottleneckId("b-7".to_owned()));
        let refined = RefinedBottleneck::from_dialog(
            &bottleneck,
            &completed_state(&bottleneck.id),
            RefinementArtifacts {
                technical_spec: "## Spec".to_owned(),
                ..RefinementArtifacts::default()
            },
        )
        .expect("completed dialog refines");

        assert_eq!(refined.agreed_solution, "Parse emails into CRM automatically");
        assert_eq!(refined.user_clarifications.len(), 1);
        assert_eq!(refined.technical_spec, "## Spec");
    }

    #[test]
    fn rejects_incomplete_dialog() {
        let bottleneck = Bottleneck::blank(BottleneckId("b-7".to_owned()));
        let mut state = completed_state(&bottleneck.id);
        state.is_complete = false;

        assert!(
            RefinedBottleneck::from_dialog(&bottleneck, &state, RefinementArtifacts::default())
                .is_err()
        );
    }

    #[test]
    fn rejects_missing_solution() {
        let bottleneck = Bottleneck::blank(BottleneckId("b-7".to_owned()));
        let mut state = completed_state(&bottleneck.id);
        state.proposed_solution = None;

        assert!(
            RefinedBottleneck::from_dialog(&bottleneck, &state, RefinementArtifacts::default())
                .is_err()
        );
    }

    #[test]
    fn flattens_bottleneck_fields_on_the_wire() {
        let bottleneck = Bottleneck::blank(BottleneckId("b-7".to_owned()));
        let refined = RefinedBottleneck::from_dialog(
            &bottleneck,
            &completed_state(&bottleneck.id),
            RefinementArtifacts::default(),
        )
        .expect("refined");

        let json = serde_json::to_value(&refined).expect("serialize");
        assert_eq!(json["id"], "b-7");
        assert_eq!(json["agreedSolution"], "Parse emails into CRM automatically");
        assert!(json.get("bottleneck").is_none());
    }
}
