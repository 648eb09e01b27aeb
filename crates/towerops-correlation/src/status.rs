//! Store-backed status recorder.
//!
//! Applies the append guards from `towerops_core::status` and keeps the
//! incident's lifecycle fields in step with its history: first `InWork`
//! stamps the fast-response end, `Closed` finishes the incident exactly
//! once. Append plus field update happen in one store transaction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use towerops_core::{status::should_append, IncidentStatus};
use towerops_db::{Incident, IncidentStore, NewStatusEvent, StoreResult};

/// Records guarded status transitions for incidents.
pub struct StatusRecorder<S> {
    store: Arc<S>,
}

impl<S> Clone for StatusRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: IncidentStore> StatusRecorder<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append `status` unless the guards suppress it. Returns whether an
    /// event was recorded. The caller's `incident` is updated in place when
    /// lifecycle fields change.
    pub async fn record(
        &self,
        incident: &mut Incident,
        status: IncidentStatus,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let latest = self.store.latest_status(incident.id).await?;
        let seen_before = if status.is_once_only() {
            self.store.has_status(incident.id, status).await?
        } else {
            false
        };

        if !should_append(status, latest.as_ref().map(|l| l.status), seen_before) {
            debug!(incident_id = %incident.id, status = %status, "Status append suppressed");
            return Ok(false);
        }

        // Keep per-incident history monotonic even if the wall clock moved.
        let recorded_at = match &latest {
            Some(l) if l.recorded_at > now => l.recorded_at,
            _ => now,
        };

        match status {
            IncidentStatus::InWork if incident.responded_at.is_none() => {
                incident.responded_at = Some(recorded_at);
            }
            IncidentStatus::Closed if !incident.is_finished => {
                incident.is_finished = true;
                incident.finished_at = Some(recorded_at);
            }
            _ => {}
        }

        self.store
            .record_status_and_update(
                incident,
                NewStatusEvent {
                    incident_id: incident.id,
                    status,
                    recorded_at,
                    comment,
                },
            )
            .await?;

        debug!(incident_id = %incident.id, status = %status, "Status recorded");
        Ok(true)
    }
}
