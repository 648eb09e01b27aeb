//! SLA deadline and expiry computation.
//!
//! Two independent tracks are computed per incident: fast-response (time to
//! accept the work) and full-resolution (time to clear the outage). Both
//! share the same rules and differ only in which timestamps feed them. The
//! functions here are pure; only the raw start/end timestamps are persisted,
//! facts are recomputed on every read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived SLA facts for one track.
///
/// When `end` is absent, exactly one of `expired`, `less_than_one_hour_left`
/// and `in_progress` holds (provided a deadline is computable). When `end` is
/// present, exactly one of `closed_on_time` and `expired` holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaFacts {
    /// Whether the track has begun (a start timestamp exists).
    pub started: bool,
    /// Start plus the policy duration; absent without a policy.
    pub deadline: Option<DateTime<Utc>>,
    /// The deadline passed before the track ended.
    pub expired: bool,
    /// The track ended at or before the deadline.
    pub closed_on_time: bool,
    /// Still open, with less than one hour to the deadline.
    pub less_than_one_hour_left: bool,
    /// Still open, with more than one hour to the deadline.
    pub in_progress: bool,
}

impl SlaFacts {
    /// Collapse the facts into the single state label mirrored to the
    /// remote tracker.
    #[must_use]
    pub fn state(&self) -> SlaState {
        if self.closed_on_time {
            SlaState::ClosedOnTime
        } else if self.expired {
            SlaState::Expired
        } else if self.less_than_one_hour_left {
            SlaState::UnderOneHour
        } else if self.in_progress {
            SlaState::InProgress
        } else {
            SlaState::Unknown
        }
    }
}

/// Human-readable SLA state pushed to the remote tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    Unknown,
    InProgress,
    UnderOneHour,
    Expired,
    ClosedOnTime,
}

impl fmt::Display for SlaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::InProgress => write!(f, "in progress"),
            Self::UnderOneHour => write!(f, "under one hour left"),
            Self::Expired => write!(f, "expired"),
            Self::ClosedOnTime => write!(f, "closed on time"),
        }
    }
}

impl std::str::FromStr for SlaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "in progress" => Ok(Self::InProgress),
            "under one hour left" => Ok(Self::UnderOneHour),
            "expired" => Ok(Self::Expired),
            "closed on time" => Ok(Self::ClosedOnTime),
            _ => Err(format!("Unknown SLA state: {s}")),
        }
    }
}

/// Compute the facts for one track.
///
/// Rules:
/// - no `start`: the track has not begun, every fact is false/absent;
/// - `start` without a policy duration: only `started` is known;
/// - with an `end`: `closed_on_time` iff `end <= deadline`, else `expired`;
/// - without an `end`: compare the deadline against `now` with a one hour
///   warning window.
#[must_use]
pub fn track_facts(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    deadline_minutes: Option<i64>,
    now: DateTime<Utc>,
) -> SlaFacts {
    let Some(start) = start else {
        return SlaFacts::default();
    };

    let mut facts = SlaFacts {
        started: true,
        ..SlaFacts::default()
    };

    let Some(minutes) = deadline_minutes else {
        return facts;
    };

    let deadline = start + Duration::minutes(minutes);
    facts.deadline = Some(deadline);

    match end {
        Some(end) => {
            facts.closed_on_time = end <= deadline;
            facts.expired = end > deadline;
        }
        None => {
            if deadline < now {
                facts.expired = true;
            } else if deadline <= now + Duration::hours(1) {
                facts.less_than_one_hour_left = true;
            } else {
                facts.in_progress = true;
            }
        }
    }

    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 10, minute, 0).unwrap()
    }

    #[test]
    fn no_start_yields_empty_facts() {
        let facts = track_facts(None, None, Some(60), at(0));
        assert_eq!(facts, SlaFacts::default());
        assert_eq!(facts.state(), SlaState::Unknown);
    }

    #[test]
    fn start_without_policy_only_marks_started() {
        let facts = track_facts(Some(at(0)), None, None, at(30));
        assert!(facts.started);
        assert!(facts.deadline.is_none());
        assert!(!facts.expired && !facts.in_progress && !facts.less_than_one_hour_left);
    }

    #[test]
    fn open_track_past_deadline_is_expired() {
        // start=T, deadline 60 minutes, now=T+61m, no end
        let start = at(0);
        let now = start + Duration::minutes(61);
        let facts = track_facts(Some(start), None, Some(60), now);
        assert!(facts.expired);
        assert!(!facts.closed_on_time);
        assert!(!facts.less_than_one_hour_left);
        assert!(!facts.in_progress);
        assert_eq!(facts.state(), SlaState::Expired);
    }

    #[test]
    fn closed_before_deadline_is_on_time() {
        let start = at(0);
        let end = start + Duration::minutes(30);
        let facts = track_facts(Some(start), Some(end), Some(60), end + Duration::days(10));
        assert!(facts.closed_on_time);
        assert!(!facts.expired);
        assert_eq!(facts.state(), SlaState::ClosedOnTime);
    }

    #[test]
    fn closed_after_deadline_is_expired() {
        let start = at(0);
        let end = start + Duration::minutes(90);
        let facts = track_facts(Some(start), Some(end), Some(60), end);
        assert!(facts.expired);
        assert!(!facts.closed_on_time);
    }

    #[test]
    fn closing_exactly_at_deadline_counts_as_on_time() {
        let start = at(0);
        let end = start + Duration::minutes(60);
        let facts = track_facts(Some(start), Some(end), Some(60), end);
        assert!(facts.closed_on_time);
    }

    #[test]
    fn warning_window_within_last_hour() {
        let start = at(0);
        // deadline at T+90m, now at T+45m: 45 minutes left
        let facts = track_facts(Some(start), None, Some(90), start + Duration::minutes(45));
        assert!(facts.less_than_one_hour_left);
        assert!(!facts.in_progress);
        assert!(!facts.expired);
        assert_eq!(facts.state(), SlaState::UnderOneHour);
    }

    #[test]
    fn comfortably_open_track_is_in_progress() {
        let start = at(0);
        let facts = track_facts(Some(start), None, Some(600), start + Duration::minutes(5));
        assert!(facts.in_progress);
        assert_eq!(facts.state(), SlaState::InProgress);
    }

    #[test]
    fn exactly_one_open_fact_holds() {
        let start = at(0);
        for now_offset in [0i64, 29, 59, 60, 61, 120, 600] {
            let facts = track_facts(Some(start), None, Some(60), start + Duration::minutes(now_offset));
            let held = [facts.expired, facts.less_than_one_hour_left, facts.in_progress]
                .iter()
                .filter(|f| **f)
                .count();
            assert_eq!(held, 1, "offset {now_offset} held {held} facts");
        }
    }

    #[test]
    fn state_label_round_trips() {
        for state in [
            SlaState::Unknown,
            SlaState::InProgress,
            SlaState::UnderOneHour,
            SlaState::Expired,
            SlaState::ClosedOnTime,
        ] {
            let parsed: SlaState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }
}
