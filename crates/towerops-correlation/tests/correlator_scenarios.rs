//! End-to-end correlation scenarios over the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use towerops_correlation::{is_conversation_head, CorrelatorConfig, IncidentCorrelator};
use towerops_db::{
    Equipment, IncidentStore, InMemoryStore, MailMessage, MailStore, NewMailMessage, Site,
    INBOX_FOLDER,
};
use towerops_tracker::issue_key_regex;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
}

/// Build a message the way ingestion would, running the real head
/// heuristic over the headers.
fn mail(message_id: &str, reply_to: Option<&str>, minute: i64) -> NewMailMessage {
    let references: Vec<String> = reply_to.map(String::from).into_iter().collect();
    let known: HashSet<String> = reply_to.map(String::from).into_iter().collect();
    let is_thread_head = is_conversation_head(message_id, reply_to, &references, &known);
    NewMailMessage {
        message_id: message_id.into(),
        reply_to_id: reply_to.map(String::from),
        references,
        subject: Some("Tower outage".into()),
        sender: "operator@example.com".into(),
        received_at: t0() + Duration::minutes(minute),
        folder: INBOX_FOLDER.into(),
        is_thread_head,
        ..NewMailMessage::default()
    }
}

fn correlator(store: &Arc<InMemoryStore>) -> IncidentCorrelator<InMemoryStore> {
    IncidentCorrelator::new(
        store.clone(),
        CorrelatorConfig {
            issue_key_pattern: issue_key_regex("OUT"),
        },
    )
}

async fn stored(store: &InMemoryStore, message_id: &str) -> MailMessage {
    store
        .mail_by_message_id(message_id)
        .await
        .unwrap()
        .expect("message exists")
}

#[tokio::test]
async fn reply_to_head_opens_exactly_one_incident() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_mail(mail("<m1@x>", None, 0)).await.unwrap();
    store.insert_mail(mail("<m2@x>", Some("<m1@x>"), 5)).await.unwrap();

    let correlator = correlator(&store);
    let m2 = stored(&store, "<m2@x>").await;
    let result = correlator.correlate(&m2, Utc::now()).await.unwrap().unwrap();

    assert!(result.created);
    // registration time comes from the conversation head, not the trigger
    assert_eq!(result.incident.registered_at, t0());
    assert_eq!(store.incident_count(), 1);

    let m1 = stored(&store, "<m1@x>").await;
    let m2 = stored(&store, "<m2@x>").await;
    assert_eq!(m1.incident_id, Some(result.incident.id));
    assert_eq!(m2.incident_id, Some(result.incident.id));
}

#[tokio::test]
async fn correlation_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_mail(mail("<m1@x>", None, 0)).await.unwrap();
    store.insert_mail(mail("<m2@x>", Some("<m1@x>"), 5)).await.unwrap();

    let correlator = correlator(&store);
    let m2 = stored(&store, "<m2@x>").await;

    let first = correlator.correlate(&m2, Utc::now()).await.unwrap().unwrap();
    let events_after_first = store.status_event_count();
    let second = correlator.correlate(&m2, Utc::now()).await.unwrap().unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.incident.id, second.incident.id);
    assert_eq!(store.incident_count(), 1);
    assert_eq!(store.status_event_count(), events_after_first);
}

#[tokio::test]
async fn orphaned_continuation_waits_for_its_head() {
    let store = Arc::new(InMemoryStore::new());
    // a reply whose head is still in flight
    store
        .insert_mail(mail("<m2@x>", Some("<never-seen@x>"), 5))
        .await
        .unwrap();

    let correlator = correlator(&store);
    let m2 = stored(&store, "<m2@x>").await;
    let result = correlator.correlate(&m2, Utc::now()).await.unwrap();

    assert!(result.is_none());
    assert_eq!(store.incident_count(), 0);
}

#[tokio::test]
async fn disjoint_threads_get_distinct_incidents() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_mail(mail("<a1@x>", None, 0)).await.unwrap();
    store.insert_mail(mail("<b1@x>", None, 1)).await.unwrap();

    let correlator = correlator(&store);
    let a = correlator
        .correlate(&stored(&store, "<a1@x>").await, Utc::now())
        .await
        .unwrap()
        .unwrap();
    let b = correlator
        .correlate(&stored(&store, "<b1@x>").await, Utc::now())
        .await
        .unwrap()
        .unwrap();

    assert_ne!(a.incident.id, b.incident.id);
    assert_eq!(store.incident_count(), 2);
}

#[tokio::test]
async fn subject_tracker_key_links_to_existing_incident() {
    let store = Arc::new(InMemoryStore::new());
    let correlator = correlator(&store);

    let existing = correlator
        .register_from_tracker("OUT-17", Some("Tower down"), Some(t0()), Utc::now())
        .await
        .unwrap();

    // head mail re-reporting the same issue with the key quoted in the
    // subject, no header connection to anything
    store
        .insert_mail(NewMailMessage {
            subject: Some("Fwd: OUT-17 still down".into()),
            ..mail("<late@x>", None, 30)
        })
        .await
        .unwrap();

    let late = stored(&store, "<late@x>").await;
    let result = correlator.correlate(&late, Utc::now()).await.unwrap().unwrap();

    assert!(!result.created);
    assert_eq!(result.incident.id, existing.id);
    assert_eq!(store.incident_count(), 1);
}

#[tokio::test]
async fn side_folder_head_never_opens_an_incident() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_mail(NewMailMessage {
            folder: "Sent".into(),
            ..mail("<s1@x>", None, 0)
        })
        .await
        .unwrap();

    let correlator = correlator(&store);
    let msg = stored(&store, "<s1@x>").await;
    let result = correlator.correlate(&msg, Utc::now()).await.unwrap();

    assert!(result.is_none());
    assert_eq!(store.incident_count(), 0);
}

#[tokio::test]
async fn enrichment_fills_unset_codes_with_longest_match() {
    let store = Arc::new(InMemoryStore::new());
    store.add_site(Site {
        code: "MSK-1".into(),
        region: None,
        address: None,
        latitude: None,
        longitude: None,
        contractor_name: None,
        contractor_emails: vec![],
    });
    store.add_site(Site {
        code: "MSK-12".into(),
        region: None,
        address: None,
        latitude: None,
        longitude: None,
        contractor_name: None,
        contractor_emails: vec![],
    });
    store.add_equipment(Equipment {
        name: "BS-7710".into(),
        site_code: Some("MSK-12".into()),
        operators: vec!["carrier-a".into()],
    });

    store
        .insert_mail(NewMailMessage {
            subject: Some("Outage at MSK-12".into()),
            body: Some("Station BS-7710 lost power".into()),
            ..mail("<m1@x>", None, 0)
        })
        .await
        .unwrap();

    let correlator = correlator(&store);
    let msg = stored(&store, "<m1@x>").await;
    let result = correlator.correlate(&msg, Utc::now()).await.unwrap().unwrap();

    assert_eq!(result.incident.site_code.as_deref(), Some("MSK-12"));
    assert_eq!(result.incident.equipment_code.as_deref(), Some("BS-7710"));
}

#[tokio::test]
async fn register_from_tracker_is_idempotent_per_key() {
    let store = Arc::new(InMemoryStore::new());
    let correlator = correlator(&store);

    let first = correlator
        .register_from_tracker("OUT-4", None, None, Utc::now())
        .await
        .unwrap();
    let second = correlator
        .register_from_tracker("OUT-4", None, None, Utc::now())
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.incident_count(), 1);
}
