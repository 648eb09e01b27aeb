//! Incident records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use towerops_core::sla::{track_facts, SlaFacts};
use towerops_core::IncidentId;

use super::IncidentType;

/// The unit of work tracked by the system.
///
/// Created by correlation (or registered straight from a remote issue),
/// mutated by reconciliation and status transitions, never physically
/// deleted. `tracker_key` is unique when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the triggering outage was reported. SLA start for both tracks.
    pub registered_at: DateTime<Utc>,
    /// When the work was first accepted. Fast-response SLA end.
    pub responded_at: Option<DateTime<Utc>>,
    /// When the incident was closed. Full-resolution SLA end.
    pub finished_at: Option<DateTime<Utc>>,
    pub is_finished: bool,
    /// Site identifier, enriched from mail text or the remote issue.
    pub site_code: Option<String>,
    /// Equipment identifier, enriched from mail text or the remote issue.
    pub equipment_code: Option<String>,
    /// Name of the incident type, maps to the SLA policy.
    pub incident_type: Option<String>,
    /// Responsible dispatcher username. Remote tracker is authoritative.
    pub assignee: Option<String>,
    /// Work category. Remote tracker is authoritative.
    pub category: Option<String>,
    /// Issue key in the remote tracker, the reconciliation join key.
    pub tracker_key: Option<String>,
}

impl Incident {
    /// Fast-response SLA facts: registration to work acceptance.
    #[must_use]
    pub fn fast_track_facts(
        &self,
        policy: Option<&IncidentType>,
        now: DateTime<Utc>,
    ) -> SlaFacts {
        track_facts(
            Some(self.registered_at),
            self.responded_at,
            policy.and_then(|p| p.fast_sla_minutes),
            now,
        )
    }

    /// Full-resolution SLA facts: registration to closure.
    #[must_use]
    pub fn full_track_facts(
        &self,
        policy: Option<&IncidentType>,
        now: DateTime<Utc>,
    ) -> SlaFacts {
        track_facts(
            Some(self.registered_at),
            self.finished_at,
            policy.and_then(|p| p.full_sla_minutes),
            now,
        )
    }

    /// Full-resolution deadline, when a policy applies.
    #[must_use]
    pub fn sla_deadline(
        &self,
        policy: Option<&IncidentType>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.full_track_facts(policy, now).deadline
    }
}

/// Payload for creating a new incident.
#[derive(Debug, Clone, Default)]
pub struct NewIncident {
    pub registered_at: DateTime<Utc>,
    pub site_code: Option<String>,
    pub equipment_code: Option<String>,
    pub incident_type: Option<String>,
    pub tracker_key: Option<String>,
}
