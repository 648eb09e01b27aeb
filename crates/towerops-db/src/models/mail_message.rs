//! Inbound/outbound mail message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use towerops_core::{IncidentId, MailId};

/// Folder name of the default ingestion mailbox. Only conversation heads
/// arriving here may open a new incident; side folders never do.
pub const INBOX_FOLDER: &str = "INBOX";

/// A stored mail message.
///
/// Immutable once ingested except for [`MailMessage::incident_id`] and
/// [`MailMessage::mirrored_to_tracker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Local row id.
    pub id: MailId,
    /// Globally unique protocol `Message-ID`.
    pub message_id: String,
    /// `In-Reply-To` target, when present.
    pub reply_to_id: Option<String>,
    /// `References` header, oldest first. May be empty or inconsistent.
    pub references: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    /// Sender address.
    pub sender: String,
    /// `To` recipients.
    pub recipients_to: Vec<String>,
    /// `Cc` recipients.
    pub recipients_cc: Vec<String>,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Mailbox folder the message was ingested from.
    pub folder: String,
    /// Whether ingestion judged this the first message of its conversation.
    pub is_thread_head: bool,
    /// The message originated from the remote tracker itself.
    pub from_tracker: bool,
    /// The message has been mirrored into the remote tracker.
    pub mirrored_to_tracker: bool,
    /// Set once the message is correlated to an incident.
    pub incident_id: Option<IncidentId>,
}

impl MailMessage {
    /// Whether the message arrived in the default ingestion mailbox.
    #[must_use]
    pub fn is_from_inbox(&self) -> bool {
        self.folder == INBOX_FOLDER
    }
}

/// Payload for inserting a new mail message.
#[derive(Debug, Clone, Default)]
pub struct NewMailMessage {
    pub message_id: String,
    pub reply_to_id: Option<String>,
    pub references: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub sender: String,
    pub recipients_to: Vec<String>,
    pub recipients_cc: Vec<String>,
    pub received_at: DateTime<Utc>,
    pub folder: String,
    pub is_thread_head: bool,
    pub from_tracker: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_detection() {
        let mut msg = MailMessage {
            id: MailId::new(1),
            message_id: "<a@example>".into(),
            reply_to_id: None,
            references: vec![],
            subject: None,
            body: None,
            sender: "op@example.com".into(),
            recipients_to: vec![],
            recipients_cc: vec![],
            received_at: Utc::now(),
            folder: INBOX_FOLDER.into(),
            is_thread_head: true,
            from_tracker: false,
            mirrored_to_tracker: false,
            incident_id: None,
        };
        assert!(msg.is_from_inbox());
        msg.folder = "Sent".into();
        assert!(!msg.is_from_inbox());
    }
}
