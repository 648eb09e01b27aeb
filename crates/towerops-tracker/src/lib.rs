//! towerops remote issue-tracker boundary
//!
//! Everything that talks to the external tracker lives here: the
//! [`api::TrackerApi`] trait the engine is written against, the typed
//! [`fields`] accessor isolating the tracker's schema-less payloads, the
//! explicit [`retry::RetryPolicy`] wrapping every call, and the
//! [`rest::RestTrackerClient`] production implementation.

pub mod api;
pub mod error;
pub mod fields;
pub mod rest;
pub mod retry;

pub use api::{IssueComment, TrackerApi, TrackerUser};
pub use error::{TrackerError, TrackerResult};
pub use fields::{FieldIds, IssuePatch, RemoteIssue, TrackerStatuses};
pub use rest::{RestTrackerClient, RestTrackerConfig};
pub use retry::RetryPolicy;

use regex::Regex;

/// Regex matching issue keys of the given queue, e.g. `OUT-1234`.
///
/// Used by correlation to spot a tracker key quoted in a mail subject.
#[must_use]
pub fn issue_key_regex(queue: &str) -> Regex {
    Regex::new(&format!(r"{}-\d+", regex::escape(queue))).expect("static pattern is valid")
}

/// All issue keys of the given queue found in a piece of text.
#[must_use]
pub fn find_issue_keys(text: &str, queue: &str) -> Vec<String> {
    issue_key_regex(queue)
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
