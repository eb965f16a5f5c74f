use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BottleneckId(pub String);

impl BottleneckId {
    pub fn generate() -> Self {
        Self(format!("bottleneck_{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BottleneckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(DomainError::InvalidPriority(other.to_owned())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The improvement point the user works on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub id: BottleneckId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub process_area: String,
    #[serde(default)]
    pub problem_description: String,
    #[serde(default)]
    pub current_impact: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub potential_gain: String,
    #[serde(default)]
    pub as_is_process: String,
    #[serde(default)]
    pub to_be_process: String,
    #[serde(default)]
    pub suggested_agents: Vec<String>,
    #[serde(default)]
    pub mcp_tools_needed: Vec<String>,
}

/// Text fields a dialog is allowed to rewrite. List fields are never suggested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BottleneckField {
    Title,
    ProcessArea,
    ProblemDescription,
    CurrentImpact,
    Priority,
    PotentialGain,
    AsIsProcess,
    ToBeProcess,
}

impl BottleneckField {
    pub const ALL: [Self; 8] = [
        Self::Title,
        Self::ProcessArea,
        Self::ProblemDescription,
        Self::CurrentImpact,
        Self::Priority,
        Self::PotentialGain,
        Self::AsIsProcess,
        Self::ToBeProcess,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::ProcessArea => "processArea",
            Self::ProblemDescription => "problemDescription",
            Self::CurrentImpact => "currentImpact",
            Self::Priority => "priority",
            Self::PotentialGain => "potentialGain",
            Self::AsIsProcess => "asIsProcess",
            Self::ToBeProcess => "toBeProcess",
        }
    }
}

impl FromStr for BottleneckField {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| DomainError::UnknownField(value.to_owned()))
    }
}

impl fmt::Display for BottleneckField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Bottleneck {
    /// A blank bottleneck, as created when the user starts from scratch.
    pub fn blank(id: BottleneckId) -> Self {
        Self {
            id,
            title: String::new(),
            process_area: String::new(),
            problem_description: String::new(),
            current_impact: String::new(),
            priority: Priority::Medium,
            potential_gain: String::new(),
            as_is_process: String::new(),
            to_be_process: String::new(),
            suggested_agents: Vec::new(),
            mcp_tools_needed: Vec::new(),
        }
    }

    pub fn field(&self, field: BottleneckField) -> String {
        match field {
            BottleneckField::Title => self.title.clone(),
            BottleneckField::ProcessArea => self.process_area.clone(),
            BottleneckField::ProblemDescription => self.problem_description.clone(),
            BottleneckField::CurrentImpact => self.current_impact.clone(),
            BottleneckField::Priority => self.priority.as_str().to_owned(),
            BottleneckField::PotentialGain => self.potential_gain.clone(),
            BottleneckField::AsIsProcess => self.as_is_process.clone(),
            BottleneckField::ToBeProcess => self.to_be_process.clone(),
        }
    }

    /// Writes one editable field. A priority outside the enum is rejected and
    /// leaves the bottleneck untouched.
    pub fn set_field(&mut self, field: BottleneckField, value: &str) -> Result<(), DomainError> {
        match field {
            BottleneckField::Title => self.title = value.to_owned(),
            BottleneckField::ProcessArea => self.process_area = value.to_owned(),
            BottleneckField::ProblemDescription => self.problem_description = value.to_owned(),
            BottleneckField::CurrentImpact => self.current_impact = value.to_owned(),
            BottleneckField::Priority => self.priority = value.parse()?,
            BottleneckField::PotentialGain => self.potential_gain = value.to_owned(),
            BottleneckField::AsIsProcess => self.as_is_process = value.to_owned(),
            BottleneckField::ToBeProcess => self.to_be_process = value.to_owned(),
        }
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &BottleneckPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(process_area) = &patch.process_area {
            self.process_area = process_area.clone();
        }
        if let Some(problem_description) = &patch.problem_description {
            self.problem_description = problem_description.clone();
        }
        if let Some(current_impact) = &patch.current_impact {
            self.current_impact = current_impact.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(potential_gain) = &patch.potential_gain {
            self.potential_gain = potential_gain.clone();
        }
        if let Some(as_is_process) = &patch.as_is_process {
            self.as_is_process = as_is_process.clone();
        }
        if let Some(to_be_process) = &patch.to_be_process {
            self.to_be_process = to_be_process.clone();
        }
        if let Some(suggested_agents) = &patch.suggested_agents {
            self.suggested_agents = suggested_agents.clone();
        }
        if let Some(mcp_tools_needed) = &patch.mcp_tools_needed {
            self.mcp_tools_needed = mcp_tools_needed.clone();
        }
    }
}

/// Partial update of a bottleneck; absent fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleneckPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_gain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_is_process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_be_process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_agents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_tools_needed: Option<Vec<String>>,
}

impl BottleneckPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn set(&mut self, field: BottleneckField, value: &str) -> Result<(), DomainError> {
        match field {
            BottleneckField::Title => self.title = Some(value.to_owned()),
            BottleneckField::ProcessArea => self.process_area = Some(value.to_owned()),
            BottleneckField::ProblemDescription => {
                self.problem_description = Some(value.to_owned())
            }
            BottleneckField::CurrentImpact => self.current_impact = Some(value.to_owned()),
            BottleneckField::Priority => self.priority = Some(value.parse()?),
            BottleneckField::PotentialGain => self.potential_gain = Some(value.to_owned()),
            BottleneckField::AsIsProcess => self.as_is_process = Some(value.to_owned()),
            BottleneckField::ToBeProcess => self.to_be_process = Some(value.to_owned()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Bottleneck, BottleneckField, BottleneckId, BottleneckPatch, Priority};
    use crate::errors::DomainError;

    fn sample() -> Bottleneck {
        Bottleneck {
            title: "Manual invoice matching".to_owned(),
            problem_description: "Accountants reconcile by hand".to_owned(),
            priority: Priority::High,
            ..Bottleneck::blank(BottleneckId("bottleneck_1".to_owned()))
        }
    }

    #[test]
    fn priority_rejects_values_outside_enum() {
        assert_eq!("low".parse::<Priority>(), Ok(Priority::Low));
        assert_eq!(
            "urgent".parse::<Priority>(),
            Err(DomainError::InvalidPriority("urgent".to_owned()))
        );
        assert!("High".parse::<Priority>().is_err());
    }

    #[test]
    fn field_names_follow_wire_format() {
        for field in BottleneckField::ALL {
            assert_eq!(field.as_str().parse::<BottleneckField>(), Ok(field));
        }
        assert!("suggestedAgents".parse::<BottleneckField>().is_err());
    }

    #[test]
    fn set_field_mutates_only_named_field() {
        let mut bottleneck = sample();
        bottleneck.set_field(BottleneckField::CurrentImpact, "2 days per month").expect("set");

        assert_eq!(bottleneck.current_impact, "2 days per month");
        assert_eq!(bottleneck.title, "Manual invoice matching");
    }

    #[test]
    fn invalid_priority_leaves_bottleneck_unchanged() {
        let mut bottleneck = sample();
        let before = bottleneck.clone();

        let error = bottleneck.set_field(BottleneckField::Priority, "critical");

        assert!(error.is_err());
        assert_eq!(bottleneck, before);
    }

    #[test]
    fn patch_merges_present_fields() {
        let mut bottleneck = sample();
        let patch = BottleneckPatch {
            to_be_process: Some("Automatic matching bot".to_owned()),
            priority: Some(Priority::Low),
            ..BottleneckPatch::default()
        };

        bottleneck.apply_patch(&patch);

        assert_eq!(bottleneck.to_be_process, "Automatic matching bot");
        assert_eq!(bottleneck.priority, Priority::Low);
        assert_eq!(bottleneck.title, "Manual invoice matching");
        assert!(BottleneckPatch::default().is_empty());
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(sample()).expect("serialize");

        assert_eq!(json["id"], "bottleneck_1");
        assert_eq!(json["problemDescription"], "Accountants reconcile by hand");
        assert_eq!(json["priority"], "high");
        assert!(json["mcpToolsNeeded"].is_array());
    }
}
