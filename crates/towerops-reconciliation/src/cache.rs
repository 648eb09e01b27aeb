//! Per-batch directory snapshot.
//!
//! Users, sites, equipment and incident types are fetched once per batch so
//! per-issue validation never goes back to the store, and every issue in a
//! batch is judged against the same consistent view.

use std::collections::{HashMap, HashSet};

use towerops_db::{DirectoryStore, Equipment, IncidentType, Site};
use towerops_tracker::TrackerApi;

use crate::error::{EngineError, EngineResult};

/// Read-only caches shared by every issue in a batch.
pub struct DirectoryCache {
    /// Sites by code.
    pub sites: HashMap<String, Site>,
    /// Equipment by name.
    pub equipment: HashMap<String, Equipment>,
    /// Active dispatcher usernames.
    pub dispatchers: HashSet<String>,
    /// Incident types by name.
    pub incident_types: HashMap<String, IncidentType>,
    /// Tracker user id to login, robots excluded.
    pub tracker_users: HashMap<i64, String>,
}

impl DirectoryCache {
    /// Snapshot the registries and the tracker's user list.
    pub async fn load<S, T>(store: &S, tracker: &T) -> EngineResult<Self>
    where
        S: DirectoryStore,
        T: TrackerApi,
    {
        let sites = store
            .sites()
            .await?
            .into_iter()
            .map(|s| (s.code.clone(), s))
            .collect();
        let equipment = store
            .equipment()
            .await?
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        let dispatchers = store
            .active_dispatchers()
            .await?
            .into_iter()
            .map(|u| u.username)
            .collect();
        let incident_types = store
            .incident_types()
            .await?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        let tracker_users = tracker
            .list_users()
            .await
            .map_err(EngineError::from_tracker)?
            .into_iter()
            .filter(|u| !u.is_robot)
            .map(|u| (u.id, u.login))
            .collect();

        Ok(Self {
            sites,
            equipment,
            dispatchers,
            incident_types,
            tracker_users,
        })
    }

    /// The site an incident points at, when both code and registry row
    /// exist.
    #[must_use]
    pub fn site_of(&self, code: Option<&str>) -> Option<&Site> {
        code.and_then(|c| self.sites.get(c))
    }

    /// The equipment an incident points at.
    #[must_use]
    pub fn equipment_of(&self, name: Option<&str>) -> Option<&Equipment> {
        name.and_then(|n| self.equipment.get(n))
    }

    /// The SLA policy behind an incident's type name.
    #[must_use]
    pub fn policy_of(&self, type_name: Option<&str>) -> Option<&IncidentType> {
        type_name.and_then(|t| self.incident_types.get(t))
    }
}
