//! Outbound notification boundary.
//!
//! The engine only decides *that* a notification must go out and records
//! the surrounding statuses; delivery is behind the [`Notifier`] trait.
//! The production implementation routes through the tracker's
//! comment-as-email endpoint, since the tracker keeps no record of plain
//! outbound mail.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use towerops_db::{Equipment, Incident, IncidentType, MailMessage, Site};
use towerops_tracker::TrackerApi;

/// Longest mail-body fragment quoted into notification text.
const MAX_PREVIEW_LEN: usize = 500;

/// What kind of notification is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    /// Tell the operator the work was accepted.
    OperatorAccepted,
    /// Tell the operator the issue was closed.
    OperatorClosed,
    /// Hand the incident off to the repair contractor.
    ContractorAssignment,
    /// Tell a late replier the incident is already closed.
    AlreadyClosed,
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub template: NotificationTemplate,
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

/// Delivery collaborator. Returns whether the notification went out; the
/// engine only needs that boolean to decide whether to advance status.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, incident: &Incident, notification: &Notification) -> bool;
}

/// Notifier that delivers through the tracker's comment-email endpoint.
pub struct TrackerCommentNotifier<T> {
    tracker: Arc<T>,
}

impl<T> TrackerCommentNotifier<T> {
    #[must_use]
    pub fn new(tracker: Arc<T>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl<T: TrackerApi> Notifier for TrackerCommentNotifier<T> {
    async fn notify(&self, incident: &Incident, notification: &Notification) -> bool {
        let Some(issue_key) = incident.tracker_key.as_deref() else {
            warn!(incident_id = %incident.id, "Cannot notify without a tracker key");
            return false;
        };

        match self
            .tracker
            .send_comment_email(
                issue_key,
                &notification.subject,
                &notification.body,
                &notification.to,
                &notification.cc,
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    issue_key,
                    error = %e,
                    "Failed to deliver notification through the tracker"
                );
                false
            }
        }
    }
}

/// Truncate a quoted mail body for inclusion in a notification.
fn preview(text: &str) -> String {
    let trimmed = text.trim().replace("```", "");
    if trimmed.chars().count() > MAX_PREVIEW_LEN {
        let cut: String = trimmed.chars().take(MAX_PREVIEW_LEN).collect();
        format!("{} ...", cut.trim_end())
    } else {
        trimmed
    }
}

/// Render the contractor hand-off brief: site, equipment, deadline and the
/// correspondence so far.
#[must_use]
pub fn contractor_brief(
    incident: &Incident,
    site: Option<&Site>,
    equipment: Option<&Equipment>,
    policy: Option<&IncidentType>,
    thread: &[MailMessage],
    now: DateTime<Utc>,
) -> String {
    let mut parts = vec!["A new incident has been assigned to you.\n".to_string()];

    if let Some(site) = site {
        parts.push("**SITE:**".into());
        parts.push(format!("   - Site code: {}", site.code));
        if let Some(region) = &site.region {
            parts.push(format!("   - Region: {region}"));
        }
        if let Some(address) = &site.address {
            parts.push(format!("   - Address: {address}"));
        }
        if let (Some(lat), Some(lon)) = (site.latitude, site.longitude) {
            parts.push(format!("   - Coordinates: {lat}, {lon}"));
        }
    }

    if let Some(equipment) = equipment {
        parts.push("\n**EQUIPMENT:**".into());
        parts.push(format!("   - Name: {}", equipment.name));
        if !equipment.operators.is_empty() {
            parts.push(format!("   - Operators: {}", equipment.operators.join(", ")));
        }
    }

    parts.push("\n**INCIDENT:**".into());
    if let Some(contractor) = site.and_then(|s| s.contractor_name.as_deref()) {
        parts.push(format!("   - Contractor: {contractor}"));
    }
    parts.push(format!(
        "   - Registered at: {}",
        incident.registered_at.format("%d.%m.%Y %H:%M")
    ));
    if let Some(deadline) = incident.sla_deadline(policy, now) {
        parts.push(format!(
            "   - SLA deadline: {}",
            deadline.format("%d.%m.%Y %H:%M")
        ));
    }
    if let Some(policy) = policy {
        parts.push(format!("   - Type: {}", policy.name));
        if let Some(description) = &policy.description {
            parts.push(format!("   - Type details: {description}"));
        }
    }

    let with_bodies: Vec<&MailMessage> =
        thread.iter().filter(|m| m.body.is_some()).collect();
    if !with_bodies.is_empty() {
        parts.push("\n**CORRESPONDENCE:**".into());
        for (index, msg) in with_bodies.iter().enumerate() {
            let body = msg.body.as_deref().unwrap_or_default();
            parts.push(format!(
                "\n**Message {}** ({}):",
                index + 1,
                msg.received_at.format("%d.%m.%Y %H:%M")
            ));
            parts.push(format!("```\n{}\n```", preview(body)));
            parts.push("---".into());
        }
    }

    parts.push("\n\n**IMPORTANT:** do NOT change the subject when replying".into());
    parts.join("\n")
}

/// Render the auto-reply sent when mail arrives for an already-closed
/// incident.
#[must_use]
pub fn already_closed_reply(late_mail: &MailMessage) -> String {
    let mut parts = vec![
        "Hello,\n".to_string(),
        "Your message used the subject of an already closed incident or \
         replied to one."
            .to_string(),
        "If you have new information, please send it as a separate message \
         so a new incident is opened."
            .to_string(),
    ];

    if let Some(body) = &late_mail.body {
        parts.push("\nFor reference, a fragment of your message:\n".into());
        parts.push(format!("```\n{}\n```", preview(body)));
    }

    parts.join("\n")
}
