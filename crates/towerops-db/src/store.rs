//! Store traits: the seam every component is written against.
//!
//! The thread resolver and correlator see only [`MailStore`] and
//! [`IncidentStore`]; the reconciliation engine additionally snapshots the
//! registries through [`DirectoryStore`] once per batch and serializes runs
//! through [`LockStore`]. Implementations: [`crate::PgStore`] for
//! production, [`crate::InMemoryStore`] as the test double.

use async_trait::async_trait;
use chrono::Duration;
use towerops_core::{IncidentId, IncidentStatus, MailId};

use crate::error::StoreResult;
use crate::models::{
    DispatchUser, Equipment, Incident, IncidentType, MailMessage, NewIncident, NewMailMessage,
    NewStatusEvent, Site, StatusEvent,
};

/// Read/write access to stored mail messages.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Insert a newly ingested message. Fails with a unique violation when
    /// the protocol `Message-ID` is already known.
    async fn insert_mail(&self, new: NewMailMessage) -> StoreResult<MailMessage>;

    /// Look up a message by its protocol `Message-ID`.
    async fn mail_by_message_id(&self, message_id: &str) -> StoreResult<Option<MailMessage>>;

    /// Messages whose `In-Reply-To` points at the given `Message-ID`.
    async fn replies_to(&self, message_id: &str) -> StoreResult<Vec<MailMessage>>;

    /// Messages whose `References` list contains the given `Message-ID`.
    async fn referencing(&self, message_id: &str) -> StoreResult<Vec<MailMessage>>;

    /// All messages already attached to an incident.
    async fn mail_by_incident(&self, incident_id: IncidentId) -> StoreResult<Vec<MailMessage>>;

    /// The earliest conversation head attached to an incident, used to pick
    /// notification recipients.
    async fn thread_head_for_incident(
        &self,
        incident_id: IncidentId,
    ) -> StoreResult<Option<MailMessage>>;

    /// Attach messages to an incident. Already-attached rows are left
    /// untouched, so re-running correlation is a no-op. Returns the number
    /// of rows that actually changed.
    async fn attach_incident(
        &self,
        mail_ids: &[MailId],
        incident_id: IncidentId,
    ) -> StoreResult<u64>;
}

/// Read/write access to incidents and their status history.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn create_incident(&self, new: NewIncident) -> StoreResult<Incident>;

    async fn incident(&self, id: IncidentId) -> StoreResult<Option<Incident>>;

    /// Batch fetch, preserving only incidents that exist.
    async fn incidents_by_ids(&self, ids: &[IncidentId]) -> StoreResult<Vec<Incident>>;

    async fn incident_by_tracker_key(&self, key: &str) -> StoreResult<Option<Incident>>;

    /// Persist the mutable fields of an incident.
    async fn update_incident(&self, incident: &Incident) -> StoreResult<()>;

    /// Atomically append a status event and persist the incident's mutable
    /// fields in the same transaction. This is the single-incident
    /// transaction boundary; no lock is held across network calls.
    async fn record_status_and_update(
        &self,
        incident: &Incident,
        event: NewStatusEvent,
    ) -> StoreResult<StatusEvent>;

    async fn latest_status(&self, id: IncidentId) -> StoreResult<Option<StatusEvent>>;

    /// Whether the given status occurs anywhere in the incident's history.
    async fn has_status(&self, id: IncidentId, status: IncidentStatus) -> StoreResult<bool>;

    /// Full history, oldest first.
    async fn status_history(&self, id: IncidentId) -> StoreResult<Vec<StatusEvent>>;
}

/// Read access to the registries snapshotted once per reconciliation batch.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn sites(&self) -> StoreResult<Vec<Site>>;

    async fn equipment(&self) -> StoreResult<Vec<Equipment>>;

    async fn active_dispatchers(&self) -> StoreResult<Vec<DispatchUser>>;

    async fn incident_types(&self) -> StoreResult<Vec<IncidentType>>;
}

/// Advisory run lock with a bounded lifetime.
///
/// A lock abandoned by a crashed holder expires after its ttl, so a stuck
/// run cannot deadlock subsequent runs forever.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Try to take the named lock for at most `ttl`. Returns false when a
    /// live holder exists.
    async fn try_lock_run(&self, name: &str, ttl: Duration) -> StoreResult<bool>;

    /// Release the named lock.
    async fn unlock_run(&self, name: &str) -> StoreResult<()>;
}

/// Everything the reconciliation engine needs from the data layer.
pub trait Store: MailStore + IncidentStore + DirectoryStore + LockStore {}

impl<T> Store for T where T: MailStore + IncidentStore + DirectoryStore + LockStore {}
