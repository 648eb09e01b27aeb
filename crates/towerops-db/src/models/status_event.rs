//! Append-only status history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use towerops_core::{IncidentId, IncidentStatus};

/// One entry in an incident's status history.
///
/// Timestamps are monotonically non-decreasing per incident; the recorder
/// reads the latest event before appending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: i64,
    pub incident_id: IncidentId,
    pub status: IncidentStatus,
    pub recorded_at: DateTime<Utc>,
    pub comment: Option<String>,
}

/// Payload for appending a status event.
#[derive(Debug, Clone)]
pub struct NewStatusEvent {
    pub incident_id: IncidentId,
    pub status: IncidentStatus,
    pub recorded_at: DateTime<Utc>,
    pub comment: Option<String>,
}
