//! Thread reconstruction.
//!
//! Mail headers form an adversarial, partially corrupt directed graph:
//! missing `In-Reply-To`, duplicated `References`, injected auto-reply
//! headers, even cycles. The resolver computes the weakly-connected
//! component around a seed with an iterative closure and an explicit
//! visited set, then additionally pulls in every message that shares an
//! already-assigned incident with a member of the component.

use std::collections::{BTreeMap, HashSet, VecDeque};

use towerops_db::{MailMessage, MailStore, StoreResult};

/// Read-only thread resolver over a mail store.
pub struct ThreadResolver<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: MailStore + ?Sized> ThreadResolver<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Every message reachable from the seed via reply, reference and
    /// shared-incident edges, ordered by receive time with conversation
    /// heads before auto-continuations on ties.
    ///
    /// An unknown seed yields an empty thread; absent links are simply not
    /// followed.
    pub async fn resolve(&self, seed_message_id: &str) -> StoreResult<Vec<MailMessage>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut visited_incidents: HashSet<i64> = HashSet::new();
        // keyed by local row id to deduplicate across edge kinds
        let mut found: BTreeMap<i64, MailMessage> = BTreeMap::new();
        let mut queue: VecDeque<String> = VecDeque::from([seed_message_id.to_string()]);

        while let Some(message_id) = queue.pop_front() {
            if !visited.insert(message_id.clone()) {
                continue;
            }

            let mut batch = Vec::new();
            if let Some(msg) = self.store.mail_by_message_id(&message_id).await? {
                batch.push(msg);
            }
            batch.extend(self.store.replies_to(&message_id).await?);
            batch.extend(self.store.referencing(&message_id).await?);

            for msg in batch {
                if let Some(incident_id) = msg.incident_id {
                    if visited_incidents.insert(incident_id.as_i64()) {
                        for linked in self.store.mail_by_incident(incident_id).await? {
                            queue.push_back(linked.message_id.clone());
                        }
                    }
                }

                if let Some(parent) = &msg.reply_to_id {
                    queue.push_back(parent.clone());
                }
                for reference in &msg.references {
                    queue.push_back(reference.clone());
                }
                queue.push_back(msg.message_id.clone());

                found.insert(msg.id.as_i64(), msg);
            }
        }

        let mut thread: Vec<MailMessage> = found.into_values().collect();
        thread.sort_by_key(|m| (m.received_at, !m.is_thread_head, m.id));
        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use towerops_db::{IncidentStore, InMemoryStore, NewMailMessage, INBOX_FOLDER};

    fn message(message_id: &str, reply_to: Option<&str>, minute: i64) -> NewMailMessage {
        NewMailMessage {
            message_id: message_id.into(),
            reply_to_id: reply_to.map(String::from),
            sender: "op@example.com".into(),
            received_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
            folder: INBOX_FOLDER.into(),
            is_thread_head: reply_to.is_none(),
            ..NewMailMessage::default()
        }
    }

    #[tokio::test]
    async fn unknown_seed_yields_empty_thread() {
        let store = InMemoryStore::new();
        let thread = ThreadResolver::new(&store).resolve("<ghost@x>").await.unwrap();
        assert!(thread.is_empty());
    }

    #[tokio::test]
    async fn reply_chain_resolves_from_any_member() {
        let store = InMemoryStore::new();
        store.insert_mail(message("<a@x>", None, 0)).await.unwrap();
        store.insert_mail(message("<b@x>", Some("<a@x>"), 1)).await.unwrap();
        store.insert_mail(message("<c@x>", Some("<b@x>"), 2)).await.unwrap();
        // unrelated noise
        store.insert_mail(message("<z@x>", None, 3)).await.unwrap();

        let resolver = ThreadResolver::new(&store);
        for seed in ["<a@x>", "<b@x>", "<c@x>"] {
            let thread = resolver.resolve(seed).await.unwrap();
            let ids: Vec<&str> = thread.iter().map(|m| m.message_id.as_str()).collect();
            assert_eq!(ids, ["<a@x>", "<b@x>", "<c@x>"], "seed {seed}");
        }
    }

    #[tokio::test]
    async fn reference_edges_connect_forwards() {
        let store = InMemoryStore::new();
        store.insert_mail(message("<a@x>", None, 0)).await.unwrap();
        // a forward carrying only a References header
        store
            .insert_mail(NewMailMessage {
                references: vec!["<a@x>".into()],
                ..message("<f@x>", Some("<external@y>"), 5)
            })
            .await
            .unwrap();

        let thread = ThreadResolver::new(&store).resolve("<a@x>").await.unwrap();
        assert_eq!(thread.len(), 2);
    }

    #[tokio::test]
    async fn cycles_terminate_and_return_each_message_once() {
        let store = InMemoryStore::new();
        // a replies to b, b replies to a
        store.insert_mail(message("<a@x>", Some("<b@x>"), 0)).await.unwrap();
        store.insert_mail(message("<b@x>", Some("<a@x>"), 1)).await.unwrap();

        let thread = ThreadResolver::new(&store).resolve("<a@x>").await.unwrap();
        assert_eq!(thread.len(), 2);
    }

    #[tokio::test]
    async fn shared_incident_closes_side_channels() {
        let store = InMemoryStore::new();
        let a = store.insert_mail(message("<a@x>", None, 0)).await.unwrap();
        let b = store.insert_mail(message("<b@x>", Some("<a@x>"), 1)).await.unwrap();
        // manually linked to the same incident, no header connection
        let side = store.insert_mail(message("<side@x>", None, 2)).await.unwrap();

        let incident = store
            .create_incident(towerops_db::NewIncident {
                registered_at: a.received_at,
                ..towerops_db::NewIncident::default()
            })
            .await
            .unwrap();
        store
            .attach_incident(&[a.id, side.id], incident.id)
            .await
            .unwrap();

        let thread = ThreadResolver::new(&store).resolve("<b@x>").await.unwrap();
        let ids: Vec<&str> = thread.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["<a@x>", "<b@x>", "<side@x>"]);
        assert!(thread.iter().any(|m| m.id == b.id));
    }

    #[tokio::test]
    async fn heads_sort_before_continuations_on_equal_timestamp() {
        let store = InMemoryStore::new();
        // same timestamp: the auto-continuation must sort after the head
        store
            .insert_mail(NewMailMessage {
                references: vec!["<a@x>".into()],
                ..message("<auto@x>", Some("<a@x>"), 0)
            })
            .await
            .unwrap();
        store.insert_mail(message("<a@x>", None, 0)).await.unwrap();

        let thread = ThreadResolver::new(&store).resolve("<a@x>").await.unwrap();
        let ids: Vec<&str> = thread.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["<a@x>", "<auto@x>"]);
    }
}
