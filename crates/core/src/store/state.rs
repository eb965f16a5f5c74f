use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::bottleneck::{Bottleneck, BottleneckId, BottleneckPatch};
use crate::domain::business::BusinessProfile;
use crate::domain::dialog::DialogState;
use crate::domain::multi_agent::MultiAgentState;
use crate::domain::refined::RefinedBottleneck;
use crate::domain::suggestion::FieldSuggestion;
use crate::errors::DomainError;
use crate::phases::PhaseMachine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    MultiAgentDialog,
    BottlenecksList,
    BottleneckDetail,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_data: Option<BusinessProfile>,
    #[serde(default)]
    pub bottlenecks: Vec<Bottleneck>,
    #[serde(default)]
    pub dialog_states: BTreeMap<BottleneckId, DialogState>,
    #[serde(default)]
    pub refined_bottlenecks: BTreeMap<BottleneckId, RefinedBottleneck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_agent_state: Option<MultiAgentState>,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_bottleneck_id: Option<BottleneckId>,
}

impl PersistedState {
    pub fn set_business_data(&mut self, business_data: BusinessProfile) {
        self.business_data = Some(business_data);
    }

    pub fn bottleneck(&self, id: &BottleneckId) -> Option<&Bottleneck> {
        self.bottlenecks.iter().find(|bottleneck| &bottleneck.id == id)
    }

    fn bottleneck_mut(&mut self, id: &BottleneckId) -> Result<&mut Bottleneck, DomainError> {
        self.bottlenecks
            .iter_mut()
            .find(|bottleneck| &bottleneck.id == id)
            .ok_or_else(|| unknown_bottleneck(id))
    }

    /// Replaces the list, dropping dialogs and refinements of removed entries.
    pub fn replace_bottlenecks(&mut self, bottlenecks: Vec<Bottleneck>) {
        self.bottlenecks = bottlenecks;
        let ids: Vec<BottleneckId> = self.bottlenecks.iter().map(|b| b.id.clone()).collect();
        self.dialog_states.retain(|id, _| ids.contains(id));
        self.refined_bottlenecks.retain(|id, _| ids.contains(id));
        if self.selected_bottleneck_id.as_ref().is_some_and(|id| !ids.contains(id)) {
            self.selected_bottleneck_id = None;
        }
    }

    pub fn add_bottleneck(&mut self, bottleneck: Bottleneck) -> Result<(), DomainError> {
        if self.bottleneck(&bottleneck.id).is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "bottleneck {} already exists",
                bottleneck.id
            )));
        }
        self.bottlenecks.push(bottleneck);
        Ok(())
    }

    pub fn update_bottleneck(
        &mut self,
        id: &BottleneckId,
        patch: &BottleneckPatch,
    ) -> Result<&Bottleneck, DomainError> {
        let bottleneck = self.bottleneck_mut(id)?;
        bottleneck.apply_patch(patch);
        Ok(bottleneck)
    }

    /// Removes the bottleneck with its dialog and refinement. Returns whether
    /// anything was removed.
    pub fn delete_bottleneck(&mut self, id: &BottleneckId) -> bool {
        let before = self.bottlenecks.len();
        self.bottlenecks.retain(|bottleneck| &bottleneck.id != id);
        self.dialog_states.remove(id);
        self.refined_bottlenecks.remove(id);
        if self.selected_bottleneck_id.as_ref() == Some(id) {
            self.selected_bottleneck_id = None;
            self.view_mode = ViewMode::BottlenecksList;
        }
        before != self.bottlenecks.len()
    }

    /// Stores a newer snapshot of a dialog. The phase may not move back, the
    /// message log only grows, and a completed dialog is frozen.
    pub fn upsert_dialog_state(&mut self, state: DialogState) -> Result<(), DomainError> {
        if self.bottleneck(&state.bottleneck_id).is_none() {
            return Err(unknown_bottleneck(&state.bottleneck_id));
        }
        if let Some(existing) = self.dialog_states.get(&state.bottleneck_id) {
            if existing.is_complete && existing != &state {
                return Err(DomainError::InvariantViolation(format!(
                    "dialog for {} is complete",
                    state.bottleneck_id
                )));
            }
            PhaseMachine::new().transition(existing.phase, state.phase)?;
            if !state.messages.starts_with(&existing.messages) {
                return Err(DomainError::InvariantViolation(
                    "dialog messages are append-only".to_owned(),
                ));
            }
        }
        self.dialog_states.insert(state.bottleneck_id.clone(), state);
        Ok(())
    }

    pub fn record_refined(&mut self, refined: RefinedBottleneck) -> Result<(), DomainError> {
        let id = refined.bottleneck.id.clone();
        let complete = self.dialog_states.get(&id).is_some_and(|state| state.is_complete);
        if !complete {
            return Err(DomainError::InvariantViolation(format!(
                "dialog for {id} has not completed"
            )));
        }
        self.refined_bottlenecks.insert(id, refined);
        Ok(())
    }

    pub fn apply_suggestion(
        &mut self,
        id: &BottleneckId,
        suggestion: &FieldSuggestion,
    ) -> Result<(), DomainError> {
        self.bottleneck_mut(id)?.set_field(suggestion.field, &suggestion.suggested_value)
    }

    pub fn select_bottleneck(&mut self, id: &BottleneckId) -> Result<(), DomainError> {
        if self.bottleneck(id).is_none() {
            return Err(unknown_bottleneck(id));
        }
        self.selected_bottleneck_id = Some(id.clone());
        self.view_mode = ViewMode::BottleneckDetail;
        Ok(())
    }

    pub fn show_list(&mut self) {
        self.selected_bottleneck_id = None;
        self.view_mode = ViewMode::BottlenecksList;
    }
}

fn unknown_bottleneck(id: &BottleneckId) -> DomainError {
    DomainError::InvariantViolation(format!("unknown bottleneck {id}"))
}
