//! The tracker API trait the engine is written against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use towerops_core::IncidentId;

use crate::error::TrackerResult;
use crate::fields::{IssuePatch, RemoteIssue};

/// A user account on the remote tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerUser {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub display: Option<String>,
    /// Robot/service accounts are excluded from assignee validation.
    #[serde(default)]
    pub is_robot: bool,
}

/// A comment on a remote issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Remote tracker operations used by correlation and reconciliation.
///
/// Every call is fallible and retryable; implementations own retry and
/// token-refresh behavior so callers treat one invocation as one logical
/// attempt.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// The authenticated account. Doubles as the cheapest auth probe.
    async fn current_user(&self) -> TrackerResult<TrackerUser>;

    /// All non-robot users known to the tracker.
    async fn list_users(&self) -> TrackerResult<Vec<TrackerUser>>;

    /// Issues of the incident queue still open, touched within the lookback
    /// window.
    async fn open_issues(&self, lookback_days: i64) -> TrackerResult<Vec<RemoteIssue>>;

    /// Issues of the incident queue resolved within the lookback window.
    async fn closed_issues(&self, lookback_days: i64) -> TrackerResult<Vec<RemoteIssue>>;

    /// Create an issue for a locally registered incident, embedding the
    /// local id in the join-key field.
    async fn create_issue(
        &self,
        summary: &str,
        description: &str,
        local_id: IncidentId,
    ) -> TrackerResult<RemoteIssue>;

    /// Patch custom fields on an issue.
    async fn update_fields(&self, issue_key: &str, patch: &IssuePatch) -> TrackerResult<()>;

    /// Execute a workflow transition, optionally attaching a comment.
    /// Returns whether the tracker accepted the transition.
    async fn update_status(
        &self,
        issue_key: &str,
        transition: &str,
        comment: Option<&str>,
    ) -> TrackerResult<bool>;

    /// Append a plain comment.
    async fn add_comment(&self, issue_key: &str, text: &str) -> TrackerResult<()>;

    /// Append a comment that the tracker also delivers as an outbound email.
    async fn send_comment_email(
        &self,
        issue_key: &str,
        subject: &str,
        text: &str,
        to: &[String],
        cc: &[String],
    ) -> TrackerResult<()>;

    /// Comments on an issue, oldest first.
    async fn list_comments(&self, issue_key: &str) -> TrackerResult<Vec<IssueComment>>;
}
