//! Incident type registry entries.

use serde::{Deserialize, Serialize};

/// An incident type, carrying the SLA policy for both tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentType {
    pub name: String,
    pub description: Option<String>,
    /// Minutes allowed from registration to work acceptance.
    pub fast_sla_minutes: Option<i64>,
    /// Minutes allowed from registration to closure.
    pub full_sla_minutes: Option<i64>,
    /// Whether incidents of this type may be handed off to a contractor.
    pub contractor_eligible: bool,
}

impl IncidentType {
    /// Validate the policy: SLA durations must be positive when present.
    pub fn validate(&self) -> Result<(), String> {
        for (track, minutes) in [
            ("fast_sla_minutes", self.fast_sla_minutes),
            ("full_sla_minutes", self.full_sla_minutes),
        ] {
            if let Some(m) = minutes {
                if m <= 0 {
                    return Err(format!("{track} must be positive, got {m}"));
                }
            }
        }
        Ok(())
    }
}
