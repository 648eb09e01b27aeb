//! Incident status vocabulary and append-guard rules.
//!
//! Statuses form an append-only history, not a validated transition graph:
//! any status may follow any other. The guards here only suppress noise:
//! duplicate consecutive events, and re-announcing work acceptance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default status set used by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Incident registered, nothing has happened yet.
    New,
    /// A dispatcher accepted the work.
    InWork,
    /// Waiting for the operator to accept the resolution.
    WaitingAcceptance,
    /// An operator notification is being sent.
    NotifyingOperator,
    /// The operator notification went out.
    NotifiedOperator,
    /// A contractor hand-off notification is being sent.
    NotifyingContractor,
    /// The contractor hand-off notification went out.
    NotifiedContractor,
    /// The incident is finished.
    Closed,
    /// The site is running on generator power.
    OnGenerator,
    /// Something about the incident needs operator attention.
    Error,
}

impl IncidentStatus {
    /// Statuses that may only ever be recorded once per incident.
    ///
    /// Re-entering `InWork` would re-announce work acceptance to the
    /// operator, so it is guarded by full-history presence rather than
    /// just the latest event.
    #[must_use]
    pub fn is_once_only(&self) -> bool {
        matches!(self, Self::InWork)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::InWork => write!(f, "in_work"),
            Self::WaitingAcceptance => write!(f, "waiting_acceptance"),
            Self::NotifyingOperator => write!(f, "notifying_operator"),
            Self::NotifiedOperator => write!(f, "notified_operator"),
            Self::NotifyingContractor => write!(f, "notifying_contractor"),
            Self::NotifiedContractor => write!(f, "notified_contractor"),
            Self::Closed => write!(f, "closed"),
            Self::OnGenerator => write!(f, "on_generator"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "in_work" => Ok(Self::InWork),
            "waiting_acceptance" => Ok(Self::WaitingAcceptance),
            "notifying_operator" => Ok(Self::NotifyingOperator),
            "notified_operator" => Ok(Self::NotifiedOperator),
            "notifying_contractor" => Ok(Self::NotifyingContractor),
            "notified_contractor" => Ok(Self::NotifiedContractor),
            "closed" => Ok(Self::Closed),
            "on_generator" => Ok(Self::OnGenerator),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown incident status: {s}")),
        }
    }
}

/// Decide whether `candidate` should be appended to an incident's history.
///
/// `latest` is the most recent recorded status, `seen_before` whether
/// `candidate` occurs anywhere in the history (only consulted for once-only
/// statuses).
#[must_use]
pub fn should_append(
    candidate: IncidentStatus,
    latest: Option<IncidentStatus>,
    seen_before: bool,
) -> bool {
    if candidate.is_once_only() && seen_before {
        return false;
    }
    latest != Some(candidate)
}
