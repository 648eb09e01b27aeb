//! Shared fixtures: a programmable in-memory tracker and store seeding.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use towerops_core::IncidentId;
use towerops_db::{DispatchUser, Equipment, InMemoryStore, IncidentType, Site};
use towerops_reconciliation::{EngineConfig, ReconciliationEngine, TrackerCommentNotifier};
use towerops_tracker::{
    IssueComment, IssuePatch, RemoteIssue, TrackerApi, TrackerError, TrackerResult, TrackerUser,
};

/// An email the mock tracker "delivered".
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub issue_key: String,
    pub subject: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

#[derive(Default)]
struct TrackerState {
    open: Vec<Value>,
    closed: Vec<Value>,
    users: Vec<TrackerUser>,
    comments: Vec<(String, String)>,
    emails: Vec<SentEmail>,
    transitions: Vec<(String, String)>,
    fail_field_updates_for: HashSet<String>,
    apply_transitions: bool,
    fail_emails: bool,
    fail_auth: bool,
}

/// In-memory [`TrackerApi`] with scriptable behavior.
#[derive(Default)]
pub struct MockTracker {
    state: Mutex<TrackerState>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_open_issue(&self, issue: Value) {
        self.state.lock().unwrap().open.push(issue);
    }

    pub fn add_closed_issue(&self, issue: Value) {
        self.state.lock().unwrap().closed.push(issue);
    }

    pub fn add_user(&self, id: i64, login: &str) {
        self.state.lock().unwrap().users.push(TrackerUser {
            id,
            login: login.into(),
            display: None,
            is_robot: false,
        });
    }

    /// Make workflow transitions mutate the stored issue's status.
    pub fn apply_transitions(&self) {
        self.state.lock().unwrap().apply_transitions = true;
    }

    pub fn fail_field_updates_for(&self, issue_key: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_field_updates_for
            .insert(issue_key.into());
    }

    pub fn fail_emails(&self) {
        self.state.lock().unwrap().fail_emails = true;
    }

    pub fn fail_auth(&self) {
        self.state.lock().unwrap().fail_auth = true;
    }

    pub fn emails(&self) -> Vec<SentEmail> {
        self.state.lock().unwrap().emails.clone()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn transitions(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().transitions.clone()
    }

    /// Current payload of an issue, searching open then closed.
    pub fn issue(&self, key: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .open
            .iter()
            .chain(state.closed.iter())
            .find(|i| i.get("key").and_then(Value::as_str) == Some(key))
            .cloned()
    }

    fn check_auth(&self) -> TrackerResult<()> {
        if self.state.lock().unwrap().fail_auth {
            Err(TrackerError::AuthenticationFailed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TrackerApi for MockTracker {
    async fn current_user(&self) -> TrackerResult<TrackerUser> {
        self.check_auth()?;
        Ok(TrackerUser {
            id: 1,
            login: "towerops-bot".into(),
            display: None,
            is_robot: true,
        })
    }

    async fn list_users(&self) -> TrackerResult<Vec<TrackerUser>> {
        self.check_auth()?;
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn open_issues(&self, _lookback_days: i64) -> TrackerResult<Vec<RemoteIssue>> {
        self.check_auth()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .open
            .iter()
            .cloned()
            .map(RemoteIssue::new)
            .collect())
    }

    async fn closed_issues(&self, _lookback_days: i64) -> TrackerResult<Vec<RemoteIssue>> {
        self.check_auth()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .closed
            .iter()
            .cloned()
            .map(RemoteIssue::new)
            .collect())
    }

    async fn create_issue(
        &self,
        summary: &str,
        _description: &str,
        local_id: IncidentId,
    ) -> TrackerResult<RemoteIssue> {
        self.check_auth()?;
        let mut state = self.state.lock().unwrap();
        let key = format!("OUT-{}", state.open.len() + state.closed.len() + 1);
        let issue = json!({
            "key": key,
            "summary": summary,
            "status": {"key": "open"},
            "localIncidentId": local_id.as_i64(),
        });
        state.open.push(issue.clone());
        Ok(RemoteIssue::new(issue))
    }

    async fn update_fields(&self, issue_key: &str, patch: &IssuePatch) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_field_updates_for.contains(issue_key) {
            return Err(TrackerError::Network("push rejected by test".into()));
        }
        let state = &mut *state;
        for issue in state.open.iter_mut().chain(state.closed.iter_mut()) {
            if issue.get("key").and_then(Value::as_str) == Some(issue_key) {
                if let Some(map) = issue.as_object_mut() {
                    for (field, value) in patch.as_map() {
                        map.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn update_status(
        &self,
        issue_key: &str,
        transition: &str,
        comment: Option<&str>,
    ) -> TrackerResult<bool> {
        let mut state = self.state.lock().unwrap();
        state
            .transitions
            .push((issue_key.to_string(), transition.to_string()));
        if let Some(comment) = comment {
            state
                .comments
                .push((issue_key.to_string(), comment.to_string()));
        }
        if state.apply_transitions {
            let state = &mut *state;
            for issue in state.open.iter_mut().chain(state.closed.iter_mut()) {
                if issue.get("key").and_then(Value::as_str) == Some(issue_key) {
                    if let Some(map) = issue.as_object_mut() {
                        map.insert("status".into(), json!({ "key": transition }));
                    }
                }
            }
        }
        Ok(true)
    }

    async fn add_comment(&self, issue_key: &str, text: &str) -> TrackerResult<()> {
        self.state
            .lock()
            .unwrap()
            .comments
            .push((issue_key.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_comment_email(
        &self,
        issue_key: &str,
        subject: &str,
        _text: &str,
        to: &[String],
        cc: &[String],
    ) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_emails {
            return Err(TrackerError::Network("smtp relay down".into()));
        }
        state.emails.push(SentEmail {
            issue_key: issue_key.to_string(),
            subject: subject.to_string(),
            to: to.to_vec(),
            cc: cc.to_vec(),
        });
        Ok(())
    }

    async fn list_comments(&self, issue_key: &str) -> TrackerResult<Vec<IssueComment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .comments
            .iter()
            .filter(|(key, _)| key == issue_key)
            .enumerate()
            .map(|(index, (_, text))| IssueComment {
                id: index as i64 + 1,
                text: text.clone(),
                created_at: None,
            })
            .collect())
    }
}

pub type TestEngine =
    ReconciliationEngine<InMemoryStore, MockTracker, TrackerCommentNotifier<MockTracker>>;

/// Engine over the in-memory store and mock tracker, with the production
/// comment-email notifier in between.
pub fn engine_with_cooldown(
    store: Arc<InMemoryStore>,
    tracker: Arc<MockTracker>,
    cooldown_secs: i64,
) -> TestEngine {
    let notifier = Arc::new(TrackerCommentNotifier::new(tracker.clone()));
    let mut config = EngineConfig::new("OUT");
    config.notify_cooldown = chrono::Duration::seconds(cooldown_secs);
    ReconciliationEngine::new(store, tracker, notifier, config)
}

pub fn seed_site(store: &InMemoryStore, code: &str, contractor_emails: &[&str]) {
    store.add_site(Site {
        code: code.into(),
        region: Some("North".into()),
        address: None,
        latitude: None,
        longitude: None,
        contractor_name: Some("RepairCo".into()),
        contractor_emails: contractor_emails.iter().map(|s| (*s).to_string()).collect(),
    });
}

pub fn seed_equipment(store: &InMemoryStore, name: &str, site_code: Option<&str>) {
    store.add_equipment(Equipment {
        name: name.into(),
        site_code: site_code.map(String::from),
        operators: vec!["carrier-a".into()],
    });
}

pub fn seed_dispatcher(store: &InMemoryStore, username: &str) {
    store.add_dispatcher(DispatchUser {
        username: username.into(),
        active: true,
    });
}

pub fn seed_incident_type(store: &InMemoryStore, name: &str, full_minutes: Option<i64>) {
    store.add_incident_type(IncidentType {
        name: name.into(),
        description: None,
        fast_sla_minutes: Some(30),
        full_sla_minutes: full_minutes,
        contractor_eligible: true,
    });
}
