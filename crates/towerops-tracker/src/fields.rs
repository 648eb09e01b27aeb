//! Typed accessor over the tracker's schema-less issue payload.
//!
//! The remote API hands back arbitrary JSON keyed by tracker-configured
//! field ids. This module is the single translation layer: everything past
//! it works with typed getters, and the untyped boundary never leaks into
//! the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use towerops_core::IncidentId;

/// Ids of the custom fields the engine tracks on every issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldIds {
    /// Integer custom field carrying the local `Incident.id`, the join key.
    pub local_id: String,
    pub site_code: String,
    pub equipment_code: String,
    pub registered_at: String,
    pub sla_deadline: String,
    pub sla_state: String,
    pub incident_type: String,
    pub contractor: String,
    pub operators: String,
    pub category: String,
}

impl Default for FieldIds {
    fn default() -> Self {
        Self {
            local_id: "localIncidentId".into(),
            site_code: "siteCode".into(),
            equipment_code: "equipmentCode".into(),
            registered_at: "registeredAt".into(),
            sla_deadline: "slaDeadline".into(),
            sla_state: "slaState".into(),
            incident_type: "incidentType".into(),
            contractor: "contractor".into(),
            operators: "operators".into(),
            category: "category".into(),
        }
    }
}

/// Remote status keys that drive status-linked side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStatuses {
    pub error: String,
    pub in_work: String,
    pub on_generator: String,
    pub closed: String,
    pub notify_operator_in_work: String,
    pub notified_operator_in_work: String,
    pub notify_operator_closed: String,
    pub notified_operator_closed: String,
    pub notify_contractor: String,
    pub notified_contractor: String,
}

impl Default for TrackerStatuses {
    fn default() -> Self {
        Self {
            error: "error".into(),
            in_work: "inWork".into(),
            on_generator: "onGenerator".into(),
            closed: "closed".into(),
            notify_operator_in_work: "notifyOperatorInWork".into(),
            notified_operator_in_work: "notifiedOperatorInWork".into(),
            notify_operator_closed: "notifyOperatorClosed".into(),
            notified_operator_closed: "notifiedOperatorClosed".into(),
            notify_contractor: "notifyContractor".into(),
            notified_contractor: "notifiedContractor".into(),
        }
    }
}

/// One issue as returned by the tracker, wrapped for typed access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteIssue {
    raw: Value,
}

impl RemoteIssue {
    #[must_use]
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// The issue key, e.g. `OUT-42`.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.raw.get("key").and_then(Value::as_str)
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.raw.get("summary").and_then(Value::as_str)
    }

    /// Current workflow status key.
    #[must_use]
    pub fn status_key(&self) -> Option<&str> {
        self.raw
            .get("status")
            .and_then(|s| s.get("key"))
            .and_then(Value::as_str)
    }

    /// Numeric id of the assigned tracker user.
    #[must_use]
    pub fn assignee_id(&self) -> Option<i64> {
        let id = self.raw.get("assignee")?.get("id")?;
        id.as_i64().or_else(|| id.as_str()?.parse().ok())
    }

    /// The local incident id embedded in the join-key custom field.
    /// Tolerates both a JSON number and a numeric string.
    #[must_use]
    pub fn local_incident_id(&self, ids: &FieldIds) -> Option<IncidentId> {
        let value = self.raw.get(&ids.local_id)?;
        let raw = value
            .as_i64()
            .or_else(|| value.as_str()?.trim().parse().ok())?;
        Some(IncidentId::new(raw))
    }

    /// A plain string custom field, empty strings treated as absent.
    #[must_use]
    pub fn str_field(&self, field_id: &str) -> Option<&str> {
        self.raw
            .get(field_id)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// An RFC 3339 datetime custom field; unparseable values are absent.
    #[must_use]
    pub fn datetime_field(&self, field_id: &str) -> Option<DateTime<Utc>> {
        let raw = self.str_field(field_id)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    #[must_use]
    pub fn site_code(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.site_code)
    }

    #[must_use]
    pub fn equipment_code(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.equipment_code)
    }

    #[must_use]
    pub fn incident_type(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.incident_type)
    }

    #[must_use]
    pub fn registered_at(&self, ids: &FieldIds) -> Option<DateTime<Utc>> {
        self.datetime_field(&ids.registered_at)
    }

    #[must_use]
    pub fn sla_deadline(&self, ids: &FieldIds) -> Option<DateTime<Utc>> {
        self.datetime_field(&ids.sla_deadline)
    }

    #[must_use]
    pub fn sla_state(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.sla_state)
    }

    #[must_use]
    pub fn contractor(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.contractor)
    }

    #[must_use]
    pub fn operators(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.operators)
    }

    #[must_use]
    pub fn category(&self, ids: &FieldIds) -> Option<&str> {
        self.str_field(&ids.category)
    }
}

/// Builder for a field-update payload.
///
/// `set` writes a value, `clear` writes an explicit null so the tracker
/// drops the field; untouched fields are left alone by the API.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IssuePatch {
    fields: Map<String, Value>,
}

impl IssuePatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field_id: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field_id.to_string(), value.into());
        self
    }

    /// Set the field when a value is present, clear it otherwise.
    #[must_use]
    pub fn set_or_clear(mut self, field_id: &str, value: Option<impl Into<Value>>) -> Self {
        let json = value.map_or(Value::Null, Into::into);
        self.fields.insert(field_id.to_string(), json);
        self
    }

    #[must_use]
    pub fn clear(mut self, field_id: &str) -> Self {
        self.fields.insert(field_id.to_string(), Value::Null);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}
