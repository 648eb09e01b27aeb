//! In-memory store implementation.
//!
//! Backs unit and scenario tests for the correlation and reconciliation
//! crates, and doubles as a scratch store for local experiments. Mirrors
//! the Postgres implementation's semantics, including unique-violation
//! errors on duplicate `Message-ID` and `tracker_key`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use towerops_core::{IncidentId, IncidentStatus, MailId};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    DispatchUser, Equipment, Incident, IncidentType, MailMessage, NewIncident, NewMailMessage,
    NewStatusEvent, Site, StatusEvent,
};
use crate::store::{DirectoryStore, IncidentStore, LockStore, MailStore};

#[derive(Default)]
struct Inner {
    mail: Vec<MailMessage>,
    incidents: Vec<Incident>,
    statuses: Vec<StatusEvent>,
    sites: Vec<Site>,
    equipment: Vec<Equipment>,
    dispatchers: Vec<DispatchUser>,
    incident_types: Vec<IncidentType>,
    locks: HashMap<String, DateTime<Utc>>,
    next_mail_id: i64,
    next_incident_id: i64,
    next_status_id: i64,
}

/// In-memory [`crate::Store`] implementation.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry site.
    pub fn add_site(&self, site: Site) {
        self.inner.lock().expect("store lock").sites.push(site);
    }

    /// Seed registry equipment.
    pub fn add_equipment(&self, equipment: Equipment) {
        self.inner.lock().expect("store lock").equipment.push(equipment);
    }

    /// Seed a dispatcher account.
    pub fn add_dispatcher(&self, user: DispatchUser) {
        self.inner.lock().expect("store lock").dispatchers.push(user);
    }

    /// Seed an incident type.
    pub fn add_incident_type(&self, incident_type: IncidentType) {
        self.inner
            .lock()
            .expect("store lock")
            .incident_types
            .push(incident_type);
    }

    /// Number of status events across all incidents. Test helper for
    /// convergence assertions.
    #[must_use]
    pub fn status_event_count(&self) -> usize {
        self.inner.lock().expect("store lock").statuses.len()
    }

    /// Number of stored incidents. Test helper.
    #[must_use]
    pub fn incident_count(&self) -> usize {
        self.inner.lock().expect("store lock").incidents.len()
    }
}

#[async_trait]
impl MailStore for InMemoryStore {
    async fn insert_mail(&self, new: NewMailMessage) -> StoreResult<MailMessage> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.mail.iter().any(|m| m.message_id == new.message_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "mail_messages_message_id_key".into(),
            });
        }
        inner.next_mail_id += 1;
        let msg = MailMessage {
            id: MailId::new(inner.next_mail_id),
            message_id: new.message_id,
            reply_to_id: new.reply_to_id,
            references: new.references,
            subject: new.subject,
            body: new.body,
            sender: new.sender,
            recipients_to: new.recipients_to,
            recipients_cc: new.recipients_cc,
            received_at: new.received_at,
            folder: new.folder,
            is_thread_head: new.is_thread_head,
            from_tracker: new.from_tracker,
            mirrored_to_tracker: false,
            incident_id: None,
        };
        inner.mail.push(msg.clone());
        Ok(msg)
    }

    async fn mail_by_message_id(&self, message_id: &str) -> StoreResult<Option<MailMessage>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .mail
            .iter()
            .find(|m| m.message_id == message_id)
            .cloned())
    }

    async fn replies_to(&self, message_id: &str) -> StoreResult<Vec<MailMessage>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .mail
            .iter()
            .filter(|m| m.reply_to_id.as_deref() == Some(message_id))
            .cloned()
            .collect())
    }

    async fn referencing(&self, message_id: &str) -> StoreResult<Vec<MailMessage>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .mail
            .iter()
            .filter(|m| m.references.iter().any(|r| r == message_id))
            .cloned()
            .collect())
    }

    async fn mail_by_incident(&self, incident_id: IncidentId) -> StoreResult<Vec<MailMessage>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .mail
            .iter()
            .filter(|m| m.incident_id == Some(incident_id))
            .cloned()
            .collect())
    }

    async fn thread_head_for_incident(
        &self,
        incident_id: IncidentId,
    ) -> StoreResult<Option<MailMessage>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .mail
            .iter()
            .filter(|m| m.incident_id == Some(incident_id) && m.is_thread_head)
            .min_by_key(|m| (m.received_at, m.id))
            .cloned())
    }

    async fn attach_incident(
        &self,
        mail_ids: &[MailId],
        incident_id: IncidentId,
    ) -> StoreResult<u64> {
        let mut inner = self.inner.lock().expect("store lock");
        let mut changed = 0;
        for msg in &mut inner.mail {
            if mail_ids.contains(&msg.id) && msg.incident_id != Some(incident_id) {
                msg.incident_id = Some(incident_id);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl IncidentStore for InMemoryStore {
    async fn create_incident(&self, new: NewIncident) -> StoreResult<Incident> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(key) = &new.tracker_key {
            if inner
                .incidents
                .iter()
                .any(|i| i.tracker_key.as_deref() == Some(key))
            {
                return Err(StoreError::UniqueViolation {
                    constraint: "incidents_tracker_key_key".into(),
                });
            }
        }
        inner.next_incident_id += 1;
        let incident = Incident {
            id: IncidentId::new(inner.next_incident_id),
            created_at: Utc::now(),
            registered_at: new.registered_at,
            responded_at: None,
            finished_at: None,
            is_finished: false,
            site_code: new.site_code,
            equipment_code: new.equipment_code,
            incident_type: new.incident_type,
            assignee: None,
            category: None,
            tracker_key: new.tracker_key,
        };
        inner.incidents.push(incident.clone());
        Ok(incident)
    }

    async fn incident(&self, id: IncidentId) -> StoreResult<Option<Incident>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.incidents.iter().find(|i| i.id == id).cloned())
    }

    async fn incidents_by_ids(&self, ids: &[IncidentId]) -> StoreResult<Vec<Incident>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .incidents
            .iter()
            .filter(|i| ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn incident_by_tracker_key(&self, key: &str) -> StoreResult<Option<Incident>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .incidents
            .iter()
            .find(|i| i.tracker_key.as_deref() == Some(key))
            .cloned())
    }

    async fn update_incident(&self, incident: &Incident) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(key) = &incident.tracker_key {
            if inner
                .incidents
                .iter()
                .any(|i| i.id != incident.id && i.tracker_key.as_deref() == Some(key))
            {
                return Err(StoreError::UniqueViolation {
                    constraint: "incidents_tracker_key_key".into(),
                });
            }
        }
        let slot = inner
            .incidents
            .iter_mut()
            .find(|i| i.id == incident.id)
            .ok_or(StoreError::NotFound {
                resource: "Incident",
                id: incident.id.to_string(),
            })?;
        *slot = incident.clone();
        Ok(())
    }

    async fn record_status_and_update(
        &self,
        incident: &Incident,
        event: NewStatusEvent,
    ) -> StoreResult<StatusEvent> {
        self.update_incident(incident).await?;
        let mut inner = self.inner.lock().expect("store lock");
        inner.next_status_id += 1;
        let stored = StatusEvent {
            id: inner.next_status_id,
            incident_id: event.incident_id,
            status: event.status,
            recorded_at: event.recorded_at,
            comment: event.comment,
        };
        inner.statuses.push(stored.clone());
        Ok(stored)
    }

    async fn latest_status(&self, id: IncidentId) -> StoreResult<Option<StatusEvent>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .statuses
            .iter()
            .filter(|s| s.incident_id == id)
            .max_by_key(|s| (s.recorded_at, s.id))
            .cloned())
    }

    async fn has_status(&self, id: IncidentId, status: IncidentStatus) -> StoreResult<bool> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .statuses
            .iter()
            .any(|s| s.incident_id == id && s.status == status))
    }

    async fn status_history(&self, id: IncidentId) -> StoreResult<Vec<StatusEvent>> {
        let inner = self.inner.lock().expect("store lock");
        let mut events: Vec<_> = inner
            .statuses
            .iter()
            .filter(|s| s.incident_id == id)
            .cloned()
            .collect();
        events.sort_by_key(|s| (s.recorded_at, s.id));
        Ok(events)
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn sites(&self) -> StoreResult<Vec<Site>> {
        Ok(self.inner.lock().expect("store lock").sites.clone())
    }

    async fn equipment(&self) -> StoreResult<Vec<Equipment>> {
        Ok(self.inner.lock().expect("store lock").equipment.clone())
    }

    async fn active_dispatchers(&self) -> StoreResult<Vec<DispatchUser>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock")
            .dispatchers
            .iter()
            .filter(|u| u.active)
            .cloned()
            .collect())
    }

    async fn incident_types(&self) -> StoreResult<Vec<IncidentType>> {
        Ok(self.inner.lock().expect("store lock").incident_types.clone())
    }
}

#[async_trait]
impl LockStore for InMemoryStore {
    async fn try_lock_run(&self, name: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.lock().expect("store lock");
        let now = Utc::now();
        match inner.locks.get(name) {
            Some(until) if *until > now => Ok(false),
            _ => {
                inner.locks.insert(name.to_string(), now + ttl);
                Ok(true)
            }
        }
    }

    async fn unlock_run(&self, name: &str) -> StoreResult<()> {
        self.inner.lock().expect("store lock").locks.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(message_id: &str, reply_to: Option<&str>) -> NewMailMessage {
        NewMailMessage {
            message_id: message_id.into(),
            reply_to_id: reply_to.map(String::from),
            sender: "op@example.com".into(),
            received_at: Utc::now(),
            folder: crate::models::INBOX_FOLDER.into(),
            is_thread_head: reply_to.is_none(),
            ..NewMailMessage::default()
        }
    }

    #[tokio::test]
    async fn duplicate_message_id_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_mail(mail("<a@x>", None)).await.unwrap();
        let err = store.insert_mail(mail("<a@x>", None)).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn attach_incident_is_idempotent() {
        let store = InMemoryStore::new();
        let m = store.insert_mail(mail("<a@x>", None)).await.unwrap();
        let incident = store
            .create_incident(NewIncident {
                registered_at: Utc::now(),
                ..NewIncident::default()
            })
            .await
            .unwrap();

        let first = store.attach_incident(&[m.id], incident.id).await.unwrap();
        let second = store.attach_incident(&[m.id], incident.id).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn duplicate_tracker_key_is_rejected() {
        let store = InMemoryStore::new();
        store
            .create_incident(NewIncident {
                registered_at: Utc::now(),
                tracker_key: Some("OUT-1".into()),
                ..NewIncident::default()
            })
            .await
            .unwrap();
        let err = store
            .create_incident(NewIncident {
                registered_at: Utc::now(),
                tracker_key: Some("OUT-1".into()),
                ..NewIncident::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn latest_status_follows_recorded_order() {
        let store = InMemoryStore::new();
        let incident = store
            .create_incident(NewIncident {
                registered_at: Utc::now(),
                ..NewIncident::default()
            })
            .await
            .unwrap();
        let t0 = Utc::now();
        for (offset, status) in [(0, IncidentStatus::New), (1, IncidentStatus::InWork)] {
            store
                .record_status_and_update(
                    &incident,
                    NewStatusEvent {
                        incident_id: incident.id,
                        status,
                        recorded_at: t0 + Duration::seconds(offset),
                        comment: None,
                    },
                )
                .await
                .unwrap();
        }
        let latest = store.latest_status(incident.id).await.unwrap().unwrap();
        assert_eq!(latest.status, IncidentStatus::InWork);
        assert!(store
            .has_status(incident.id, IncidentStatus::New)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn run_lock_expires_after_ttl() {
        let store = InMemoryStore::new();
        assert!(store
            .try_lock_run("sweep", Duration::milliseconds(-1))
            .await
            .unwrap());
        // ttl already elapsed, a second acquisition must succeed
        assert!(store
            .try_lock_run("sweep", Duration::minutes(5))
            .await
            .unwrap());
        // and now a live holder blocks others
        assert!(!store
            .try_lock_run("sweep", Duration::minutes(5))
            .await
            .unwrap());
        store.unlock_run("sweep").await.unwrap();
        assert!(store
            .try_lock_run("sweep", Duration::minutes(5))
            .await
            .unwrap());
    }
}
