use serde::{Deserialize, Serialize};

/// Company profile captured once per session and injected into every prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    pub product_description: String,
    pub team_size: u32,
    pub workflows: String,
    pub kpis: String,
}

impl BusinessProfile {
    /// Names of the fields that are blank (or zero for the team size).
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.product_description.trim().is_empty() {
            missing.push("productDescription");
        }
        if self.team_size == 0 {
            missing.push("teamSize");
        }
        if self.workflows.trim().is_empty() {
            missing.push("workflows");
        }
        if self.kpis.trim().is_empty() {
            missing.push("kpis");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}
