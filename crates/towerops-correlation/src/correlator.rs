//! Thread-to-incident correlation.
//!
//! One incident per weakly-connected thread component. An incident is only
//! ever opened when the component contains its conversation head and that
//! head arrived in the ingestion inbox; orphaned continuations stay
//! unattached until their head turns up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};
use towerops_core::{IncidentStatus, MailId};
use towerops_db::{
    DirectoryStore, Incident, IncidentStore, MailMessage, MailStore, NewIncident, StoreError,
};

use crate::enrich::extract_code_from_thread;
use crate::status::StatusRecorder;
use crate::thread::ThreadResolver;

/// Errors from correlation.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A thread member points at an incident row that does not exist.
    /// Treated by callers as already-handled-by-someone-else.
    #[error("Incident {0} referenced by thread no longer exists")]
    DanglingIncident(i64),
}

/// Correlator configuration.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Pattern matching remote issue keys quoted in subjects, used as the
    /// secondary incident lookup.
    pub issue_key_pattern: Regex,
}

/// Result of a successful correlation.
#[derive(Debug, Clone)]
pub struct Correlated {
    pub incident: Incident,
    /// Whether the incident was opened by this call.
    pub created: bool,
}

/// Attaches mail threads to incidents.
pub struct IncidentCorrelator<S> {
    store: Arc<S>,
    recorder: StatusRecorder<S>,
    config: CorrelatorConfig,
}

impl<S> IncidentCorrelator<S>
where
    S: MailStore + IncidentStore + DirectoryStore,
{
    #[must_use]
    pub fn new(store: Arc<S>, config: CorrelatorConfig) -> Self {
        Self {
            recorder: StatusRecorder::new(store.clone()),
            store,
            config,
        }
    }

    /// Correlate the thread around `trigger` to an incident.
    ///
    /// Returns `None` when the thread has no conversation head yet, or when
    /// the head arrived in a side folder. Idempotent: re-running on an
    /// already-correlated thread changes nothing beyond the enrichment
    /// pass.
    pub async fn correlate(
        &self,
        trigger: &MailMessage,
        now: DateTime<Utc>,
    ) -> Result<Option<Correlated>, CorrelationError> {
        let thread = ThreadResolver::new(self.store.as_ref())
            .resolve(&trigger.message_id)
            .await?;

        let Some(head) = thread
            .iter()
            .filter(|m| m.is_thread_head)
            .min_by_key(|m| (m.received_at, m.id))
        else {
            debug!(
                message_id = %trigger.message_id,
                "Thread has no conversation head yet, leaving it unattached"
            );
            return Ok(None);
        };

        let (mut incident, created) = match self.existing_incident(&thread, trigger).await? {
            Some(incident) => (incident, false),
            None => {
                if !head.is_from_inbox() {
                    debug!(
                        message_id = %head.message_id,
                        folder = %head.folder,
                        "Head arrived outside the inbox, not opening an incident"
                    );
                    return Ok(None);
                }
                match self.open_incident(head, now).await {
                    Ok(incident) => (incident, true),
                    Err(CorrelationError::Store(e)) if e.is_unique_violation() => {
                        // Lost the race: someone correlated this thread in
                        // parallel. Re-read and carry on.
                        let thread = ThreadResolver::new(self.store.as_ref())
                            .resolve(&trigger.message_id)
                            .await?;
                        match self.existing_incident(&thread, trigger).await? {
                            Some(incident) => (incident, false),
                            None => return Ok(None),
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.enrich(&mut incident, &thread).await?;

        let mail_ids: Vec<MailId> = thread.iter().map(|m| m.id).collect();
        let attached = self.store.attach_incident(&mail_ids, incident.id).await?;
        if attached > 0 {
            debug!(
                incident_id = %incident.id,
                attached,
                thread_len = thread.len(),
                "Attached thread messages to incident"
            );
        }

        Ok(Some(Correlated { incident, created }))
    }

    /// Register an incident straight from a remote issue that carries no
    /// local mail yet. Bypasses thread reconstruction. A tracker-key race
    /// resolves to the incident that won.
    pub async fn register_from_tracker(
        &self,
        tracker_key: &str,
        summary: Option<&str>,
        registered_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Incident, CorrelationError> {
        if let Some(existing) = self.store.incident_by_tracker_key(tracker_key).await? {
            return Ok(existing);
        }

        match self
            .store
            .create_incident(NewIncident {
                registered_at: registered_at.unwrap_or(now),
                tracker_key: Some(tracker_key.to_string()),
                ..NewIncident::default()
            })
            .await
        {
            Ok(mut incident) => {
                info!(
                    incident_id = %incident.id,
                    tracker_key,
                    "Registered incident from tracker issue"
                );
                let comment = summary.map_or_else(
                    || format!("Registered from tracker issue {tracker_key}"),
                    |s| format!("Registered from tracker issue {tracker_key}: {s}"),
                );
                self.recorder
                    .record(&mut incident, IncidentStatus::New, Some(comment), now)
                    .await?;
                Ok(incident)
            }
            Err(e) if e.is_unique_violation() => self
                .store
                .incident_by_tracker_key(tracker_key)
                .await?
                .ok_or(CorrelationError::Store(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// The canonical incident for a thread: the lowest already-assigned
    /// incident id, falling back to a tracker key quoted in the trigger's
    /// subject.
    async fn existing_incident(
        &self,
        thread: &[MailMessage],
        trigger: &MailMessage,
    ) -> Result<Option<Incident>, CorrelationError> {
        if let Some(id) = thread.iter().filter_map(|m| m.incident_id).min() {
            let incident = self
                .store
                .incident(id)
                .await?
                .ok_or(CorrelationError::DanglingIncident(id.as_i64()))?;
            return Ok(Some(incident));
        }

        if let Some(subject) = &trigger.subject {
            for key in self.config.issue_key_pattern.find_iter(subject) {
                if let Some(incident) =
                    self.store.incident_by_tracker_key(key.as_str()).await?
                {
                    debug!(
                        tracker_key = key.as_str(),
                        incident_id = %incident.id,
                        "Correlated thread through subject tracker key"
                    );
                    return Ok(Some(incident));
                }
            }
        }

        Ok(None)
    }

    async fn open_incident(
        &self,
        head: &MailMessage,
        now: DateTime<Utc>,
    ) -> Result<Incident, CorrelationError> {
        let mut incident = self
            .store
            .create_incident(NewIncident {
                registered_at: head.received_at,
                ..NewIncident::default()
            })
            .await?;

        info!(
            incident_id = %incident.id,
            message_id = %head.message_id,
            "Opened incident from mail thread"
        );

        self.recorder
            .record(
                &mut incident,
                IncidentStatus::New,
                Some(format!("Registered from mail {}", head.message_id)),
                now,
            )
            .await?;

        Ok(incident)
    }

    /// Fill unset site/equipment codes from the thread text. Set codes are
    /// never overwritten.
    async fn enrich(
        &self,
        incident: &mut Incident,
        thread: &[MailMessage],
    ) -> Result<(), CorrelationError> {
        if incident.site_code.is_some() && incident.equipment_code.is_some() {
            return Ok(());
        }

        let mut changed = false;

        if incident.site_code.is_none() {
            let sites = self.store.sites().await?;
            let codes: Vec<&str> = sites.iter().map(|s| s.code.as_str()).collect();
            if let Some(code) = extract_code_from_thread(thread, &codes) {
                incident.site_code = Some(code);
                changed = true;
            }
        }

        if incident.equipment_code.is_none() {
            let equipment = self.store.equipment().await?;
            let names: Vec<&str> = equipment.iter().map(|e| e.name.as_str()).collect();
            if let Some(name) = extract_code_from_thread(thread, &names) {
                incident.equipment_code = Some(name);
                changed = true;
            }
        }

        if changed {
            self.store.update_incident(incident).await?;
            debug!(
                incident_id = %incident.id,
                site_code = ?incident.site_code,
                equipment_code = ?incident.equipment_code,
                "Enriched incident codes from thread text"
            );
        }

        Ok(())
    }
}
