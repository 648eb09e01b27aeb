//! The reconciliation engine.
//!
//! Two sweeps over the remote tracker: the open-issue sweep pulls
//! remote-authoritative fields, validates remote claims against the
//! registries, queues corrective pushes for local-authoritative drift and
//! runs status-linked side effects; the closed-issue sweep finishes local
//! incidents and fixes their final SLA state. Issues are processed
//! independently: one bad record is flagged and skipped, never aborting
//! the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use towerops_core::{IncidentStatus, SlaState};
use towerops_correlation::{CorrelatorConfig, IncidentCorrelator, StatusRecorder};
use towerops_db::{Incident, IncidentStore, MailStore, Store};
use towerops_tracker::{
    issue_key_regex, FieldIds, IssuePatch, RemoteIssue, TrackerApi, TrackerError, TrackerStatuses,
};

use crate::cache::DirectoryCache;
use crate::error::{EngineError, EngineResult};
use crate::notify::{
    already_closed_reply, contractor_brief, Notification, NotificationTemplate, Notifier,
};
use crate::push::PushQueue;
use crate::report::SweepReport;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote queue holding incident issues.
    pub queue: String,
    /// How far back to search for open/closed issues, in days.
    pub lookback_days: i64,
    /// Minimum age of the latest status event before a notification may be
    /// sent. Violations produce an explanatory error instead of re-sending.
    pub notify_cooldown: Duration,
    /// Push worker pool size is `cpu_count * this` (I/O-bound calls).
    pub push_multiplier: usize,
    pub field_ids: FieldIds,
    pub statuses: TrackerStatuses,
}

impl EngineConfig {
    #[must_use]
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            lookback_days: 30,
            notify_cooldown: Duration::seconds(60),
            push_multiplier: 10,
            field_ids: FieldIds::default(),
            statuses: TrackerStatuses::default(),
        }
    }
}

/// Result of pulling remote-authoritative fields for one issue.
enum PullOutcome {
    Synced { changed: bool },
    Rejected { reason: String },
}

/// The reconciliation engine over a store, a tracker and a notifier.
pub struct ReconciliationEngine<S, T, N> {
    store: Arc<S>,
    tracker: Arc<T>,
    notifier: Arc<N>,
    correlator: IncidentCorrelator<S>,
    recorder: StatusRecorder<S>,
    config: EngineConfig,
}

impl<S, T, N> ReconciliationEngine<S, T, N>
where
    S: Store,
    T: TrackerApi + 'static,
    N: Notifier,
{
    #[must_use]
    pub fn new(store: Arc<S>, tracker: Arc<T>, notifier: Arc<N>, config: EngineConfig) -> Self {
        let correlator = IncidentCorrelator::new(
            store.clone(),
            CorrelatorConfig {
                issue_key_pattern: issue_key_regex(&config.queue),
            },
        );
        Self {
            correlator,
            recorder: StatusRecorder::new(store.clone()),
            store,
            tracker,
            notifier,
            config,
        }
    }

    /// The store, for callers that coordinate locking around runs.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Sweep the open issues of the incident queue.
    pub async fn sweep_open(&self, stop: &AtomicBool) -> EngineResult<SweepReport> {
        let issues = self
            .tracker
            .open_issues(self.config.lookback_days)
            .await
            .map_err(EngineError::from_tracker)?;
        let cache = DirectoryCache::load(self.store.as_ref(), self.tracker.as_ref()).await?;

        info!(total = issues.len(), "Processing open tracker issues");

        let mut report = SweepReport::default();
        let mut pushes = PushQueue::new();

        for issue in &issues {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested, leaving open sweep early");
                break;
            }
            report.processed += 1;
            match self.sync_open_issue(issue, &cache, &mut pushes).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) if e.is_fatal_auth() => return Err(e),
                Err(e) => {
                    warn!(
                        issue_key = issue.key().unwrap_or("<missing>"),
                        error = %e,
                        "Failed to process open issue"
                    );
                    report.errors += 1;
                }
            }
        }

        let stats = pushes.execute(self.config.push_multiplier).await;
        report.pushed = stats.succeeded;
        report.push_failures = stats.failed;

        info!(
            processed = report.processed,
            updated = report.updated,
            errors = report.errors,
            pushed = report.pushed,
            push_failures = report.push_failures,
            "Open sweep finished"
        );
        Ok(report)
    }

    /// Sweep the closed issues: finish local incidents and correct their
    /// final SLA state.
    pub async fn sweep_closed(&self, stop: &AtomicBool) -> EngineResult<SweepReport> {
        let issues = self
            .tracker
            .closed_issues(self.config.lookback_days)
            .await
            .map_err(EngineError::from_tracker)?;
        let cache = DirectoryCache::load(self.store.as_ref(), self.tracker.as_ref()).await?;

        info!(total = issues.len(), "Processing closed tracker issues");

        let mut report = SweepReport::default();
        let mut pushes = PushQueue::new();

        for issue in &issues {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested, leaving closed sweep early");
                break;
            }
            report.processed += 1;
            match self.sync_closed_issue(issue, &cache, &mut pushes).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) if e.is_fatal_auth() => return Err(e),
                Err(e) => {
                    warn!(
                        issue_key = issue.key().unwrap_or("<missing>"),
                        error = %e,
                        "Failed to process closed issue"
                    );
                    report.errors += 1;
                }
            }
        }

        let stats = pushes.execute(self.config.push_multiplier).await;
        report.pushed = stats.succeeded;
        report.push_failures = stats.failed;

        info!(
            processed = report.processed,
            updated = report.updated,
            errors = report.errors,
            "Closed sweep finished"
        );
        Ok(report)
    }

    /// Process one open issue. Returns whether anything was mutated.
    async fn sync_open_issue(
        &self,
        issue: &RemoteIssue,
        cache: &DirectoryCache,
        pushes: &mut PushQueue,
    ) -> EngineResult<bool> {
        let issue_key = issue
            .key()
            .ok_or_else(|| EngineError::Tracker(TrackerError::Parse("issue without key".into())))?;
        let now = Utc::now();
        let ids = &self.config.field_ids;

        // Resolve the local incident through the join key.
        let Some(local_id) = issue.local_incident_id(ids) else {
            // Not locally known yet: register it and write the join key back.
            let incident = self
                .correlator
                .register_from_tracker(issue_key, issue.summary(), issue.registered_at(ids), now)
                .await?;
            let patch = IssuePatch::new().set(&ids.local_id, incident.id.as_i64());
            self.queue_patch(pushes, issue_key, patch);
            debug!(issue_key, incident_id = %incident.id, "Linked remote-only issue to a new incident");
            return Ok(true);
        };

        let Some(mut incident) = self.store.incident(local_id).await? else {
            // The join key points nowhere. Flag it where the operator looks.
            if issue.status_key() != Some(self.config.statuses.error.as_str()) {
                let comment =
                    format!("Unknown local incident id {local_id} in the tracker issue");
                self.tracker
                    .update_status(issue_key, &self.config.statuses.error, Some(&comment))
                    .await
                    .map_err(EngineError::from_tracker)?;
                warn!(issue_key, local_id = %local_id, "Issue references a missing incident");
            }
            return Ok(true);
        };

        let mut updated = false;

        if incident.tracker_key.as_deref() != Some(issue_key) {
            incident.tracker_key = Some(issue_key.to_string());
            self.store.update_incident(&incident).await?;
            updated = true;
        }

        // An open issue means the incident is not finished, whatever a
        // previous closed sweep concluded.
        if incident.is_finished {
            incident.is_finished = false;
            incident.finished_at = None;
            self.store.update_incident(&incident).await?;
            debug!(issue_key, incident_id = %incident.id, "Reopened incident for open issue");
            updated = true;
        }

        match self.pull_remote_fields(issue, &mut incident, cache).await? {
            PullOutcome::Rejected { reason } => {
                // Validation gate tripped: reassert local truth remotely,
                // flag the issue, stop processing it.
                let patch = self.local_field_patch(issue, &incident, cache, now, true);
                self.queue_patch(pushes, issue_key, patch);
                self.flag_error(issue.status_key(), issue_key, &mut incident, reason, now)
                    .await?;
                return Ok(true);
            }
            PullOutcome::Synced { changed } => updated |= changed,
        }

        let drift = self.local_field_patch(issue, &incident, cache, now, false);
        if !drift.is_empty() {
            debug!(issue_key, fields = drift.len(), "Queueing drift corrections");
            self.queue_patch(pushes, issue_key, drift);
            updated = true;
        }

        updated |= self
            .apply_status_effects(issue, issue_key, &mut incident, cache, now)
            .await?;

        Ok(updated)
    }

    /// Process one closed issue.
    async fn sync_closed_issue(
        &self,
        issue: &RemoteIssue,
        cache: &DirectoryCache,
        pushes: &mut PushQueue,
    ) -> EngineResult<bool> {
        let issue_key = issue
            .key()
            .ok_or_else(|| EngineError::Tracker(TrackerError::Parse("issue without key".into())))?;
        let ids = &self.config.field_ids;
        let now = Utc::now();

        let Some(local_id) = issue.local_incident_id(ids) else {
            return Ok(false);
        };
        let Some(mut incident) = self.store.incident(local_id).await? else {
            return Ok(false);
        };

        let mut updated = self
            .recorder
            .record(
                &mut incident,
                IncidentStatus::Closed,
                Some("Issue closed in the tracker".into()),
                now,
            )
            .await?;

        // With the finish time set the final SLA verdict is fixed; make the
        // tracker agree.
        let policy = cache.policy_of(incident.incident_type.as_deref());
        let expected = incident.full_track_facts(policy, now).state();
        if issue.sla_state(ids) != Some(expected.to_string().as_str()) {
            let patch =
                IssuePatch::new().set(&ids.sla_state, expected.to_string());
            self.queue_patch(pushes, issue_key, patch);
            updated = true;
        }

        Ok(updated)
    }

    /// Pull remote-authoritative fields (assignee, incident type, category)
    /// and validated site/equipment claims into unset local fields.
    async fn pull_remote_fields(
        &self,
        issue: &RemoteIssue,
        incident: &mut Incident,
        cache: &DirectoryCache,
    ) -> EngineResult<PullOutcome> {
        use crate::validate::{
            resolve_assignee, resolve_equipment, resolve_incident_type, resolve_site,
        };

        let ids = &self.config.field_ids;
        let mut changed = false;

        match resolve_assignee(issue.assignee_id(), cache) {
            Ok(assignee) => {
                if incident.assignee != assignee {
                    incident.assignee = assignee;
                    changed = true;
                }
            }
            Err(reason) => return Ok(PullOutcome::Rejected { reason }),
        }

        match resolve_incident_type(issue.incident_type(ids), cache) {
            Ok(incident_type) => {
                if incident.incident_type != incident_type {
                    incident.incident_type = incident_type;
                    changed = true;
                }
            }
            Err(reason) => return Ok(PullOutcome::Rejected { reason }),
        }

        let category = issue.category(ids).map(String::from);
        if incident.category != category {
            incident.category = category;
            changed = true;
        }

        let site_claim = issue.site_code(ids);

        // Equipment first: a resolved station can pin down the site too.
        if let Some(claim) = issue.equipment_code(ids) {
            match resolve_equipment(claim, site_claim, &cache.equipment) {
                Ok(equipment) => {
                    if incident.equipment_code.is_none() {
                        if incident.site_code.is_none() {
                            if let Some(site_code) = equipment.site_code.clone() {
                                incident.site_code = Some(site_code);
                                changed = true;
                            }
                        }
                        incident.equipment_code = Some(equipment.name);
                        changed = true;
                    }
                }
                Err(reason) => return Ok(PullOutcome::Rejected { reason }),
            }
        }

        if let Some(claim) = site_claim {
            match resolve_site(claim, &cache.sites) {
                Ok(code) => {
                    if incident.site_code.is_none() {
                        incident.site_code = Some(code);
                        changed = true;
                    }
                }
                Err(reason) => return Ok(PullOutcome::Rejected { reason }),
            }
        }

        if changed {
            self.store.update_incident(incident).await?;
        }

        Ok(PullOutcome::Synced { changed })
    }

    /// Patch of local-authoritative fields.
    ///
    /// With `force` every tracked field is asserted (used after a rejected
    /// validation to overwrite bogus claims); otherwise only drifted fields
    /// are included.
    fn local_field_patch(
        &self,
        issue: &RemoteIssue,
        incident: &Incident,
        cache: &DirectoryCache,
        now: DateTime<Utc>,
        force: bool,
    ) -> IssuePatch {
        let ids = &self.config.field_ids;
        let mut patch = IssuePatch::new();

        if force || issue.site_code(ids) != incident.site_code.as_deref() {
            patch = patch.set_or_clear(&ids.site_code, incident.site_code.clone());
        }
        if force || issue.equipment_code(ids) != incident.equipment_code.as_deref() {
            patch = patch.set_or_clear(&ids.equipment_code, incident.equipment_code.clone());
        }

        if force || issue.registered_at(ids) != Some(incident.registered_at) {
            patch = patch.set(&ids.registered_at, incident.registered_at.to_rfc3339());
        }

        let policy = cache.policy_of(incident.incident_type.as_deref());
        let deadline = incident.sla_deadline(policy, now);
        if force || issue.sla_deadline(ids) != deadline {
            patch = patch.set_or_clear(&ids.sla_deadline, deadline.map(|d| d.to_rfc3339()));
        }

        let expected_state = self.expected_sla_state(incident, cache, now);
        if force || issue.sla_state(ids) != Some(expected_state.to_string().as_str()) {
            patch = patch.set(&ids.sla_state, expected_state.to_string());
        }

        let contractor = cache
            .site_of(incident.site_code.as_deref())
            .and_then(|site| site.contractor_name.clone());
        if force || issue.contractor(ids) != contractor.as_deref() {
            patch = patch.set_or_clear(&ids.contractor, contractor);
        }

        let operators = cache
            .equipment_of(incident.equipment_code.as_deref())
            .filter(|eq| !eq.operators.is_empty())
            .map(|eq| eq.operators.join(", "));
        if force || issue.operators(ids) != operators.as_deref() {
            patch = patch.set_or_clear(&ids.operators, operators);
        }

        patch
    }

    /// The SLA state label the tracker should display.
    fn expected_sla_state(
        &self,
        incident: &Incident,
        cache: &DirectoryCache,
        now: DateTime<Utc>,
    ) -> SlaState {
        let policy = cache.policy_of(incident.incident_type.as_deref());
        incident.full_track_facts(policy, now).state()
    }

    /// Map the remote workflow status to local history entries and
    /// notification side effects.
    async fn apply_status_effects(
        &self,
        issue: &RemoteIssue,
        issue_key: &str,
        incident: &mut Incident,
        cache: &DirectoryCache,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let Some(status_key) = issue.status_key() else {
            return Ok(false);
        };
        let st = self.config.statuses.clone();

        if status_key == st.error {
            return Ok(self
                .recorder
                .record(
                    incident,
                    IncidentStatus::Error,
                    Some("Issue carries the error status in the tracker".into()),
                    now,
                )
                .await?);
        }

        if status_key == st.in_work {
            return Ok(self
                .recorder
                .record(
                    incident,
                    IncidentStatus::InWork,
                    Some("Dispatcher accepted the work in the tracker".into()),
                    now,
                )
                .await?);
        }

        if status_key == st.on_generator {
            return Ok(self
                .recorder
                .record(
                    incident,
                    IncidentStatus::OnGenerator,
                    Some("Dispatcher reported the site running on generator power".into()),
                    now,
                )
                .await?);
        }

        if status_key == st.notified_operator_in_work || status_key == st.notified_operator_closed
        {
            return Ok(self
                .recorder
                .record(incident, IncidentStatus::NotifiedOperator, None, now)
                .await?);
        }

        if status_key == st.notified_contractor {
            return Ok(self
                .recorder
                .record(incident, IncidentStatus::NotifiedContractor, None, now)
                .await?);
        }

        if status_key == st.notify_operator_in_work {
            return self
                .run_notification(
                    issue,
                    issue_key,
                    incident,
                    cache,
                    NotificationTemplate::OperatorAccepted,
                    now,
                )
                .await;
        }

        if status_key == st.notify_operator_closed {
            return self
                .run_notification(
                    issue,
                    issue_key,
                    incident,
                    cache,
                    NotificationTemplate::OperatorClosed,
                    now,
                )
                .await;
        }

        if status_key == st.notify_contractor {
            return self
                .run_notification(
                    issue,
                    issue_key,
                    incident,
                    cache,
                    NotificationTemplate::ContractorAssignment,
                    now,
                )
                .await;
        }

        Ok(false)
    }

    /// The guarded notification flow: workflow check, anti-spam cooldown,
    /// record-notify-record, with every failure reflected on both sides.
    async fn run_notification(
        &self,
        issue: &RemoteIssue,
        issue_key: &str,
        incident: &mut Incident,
        cache: &DirectoryCache,
        template: NotificationTemplate,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let latest = self.store.latest_status(incident.id).await?;

        let done_status = match template {
            NotificationTemplate::ContractorAssignment => IncidentStatus::NotifiedContractor,
            _ => IncidentStatus::NotifiedOperator,
        };

        // The dispatcher asked for a notification that already went out (or
        // the incident sits in an error state): a workflow violation.
        if let Some(latest) = &latest {
            if latest.status == done_status || latest.status == IncidentStatus::Error {
                self.tracker
                    .update_status(
                        issue_key,
                        &self.config.statuses.error,
                        Some("Workflow error: this notification step was already handled"),
                    )
                    .await
                    .map_err(EngineError::from_tracker)?;
                debug!(issue_key, "Rejected notification request as a workflow violation");
                return Ok(true);
            }

            // Anti-spam cooldown since the last status change.
            let elapsed = now - latest.recorded_at;
            if elapsed < self.config.notify_cooldown {
                let comment = format!(
                    "Notification suppressed: the incident status changed {}s ago, \
                     the cooldown is {}s",
                    elapsed.num_seconds(),
                    self.config.notify_cooldown.num_seconds()
                );
                self.tracker
                    .add_comment(issue_key, &comment)
                    .await
                    .map_err(EngineError::from_tracker)?;
                self.recorder
                    .record(incident, IncidentStatus::Error, Some(comment), now)
                    .await?;
                return Ok(true);
            }
        }

        let notification = match self
            .build_notification(issue_key, issue.summary(), incident, cache, template, now)
            .await?
        {
            Ok(notification) => notification,
            Err(reason) => {
                self.flag_error(issue.status_key(), issue_key, incident, reason, now)
                    .await?;
                return Ok(true);
            }
        };

        let (pending_status, pending_comment, success_transition, success_comment, failure_comment) =
            match template {
                NotificationTemplate::OperatorAccepted => (
                    IncidentStatus::NotifyingOperator,
                    "Dispatcher sent the applicant an auto-reply that the work was accepted",
                    &self.config.statuses.notified_operator_in_work,
                    "Notified the operator that the work was accepted",
                    "Failed to notify the operator that the work was accepted",
                ),
                NotificationTemplate::OperatorClosed => (
                    IncidentStatus::NotifyingOperator,
                    "Dispatcher sent the applicant an auto-reply that the issue was closed",
                    &self.config.statuses.notified_operator_closed,
                    "Notified the operator that the issue was closed",
                    "Failed to notify the operator that the issue was closed",
                ),
                NotificationTemplate::ContractorAssignment | NotificationTemplate::AlreadyClosed => (
                    IncidentStatus::NotifyingContractor,
                    "Dispatcher sent the contractor the incident hand-off",
                    &self.config.statuses.notified_contractor,
                    "Notified the contractor about the incident",
                    "Failed to notify the contractor about the incident",
                ),
            };

        self.recorder
            .record(incident, pending_status, Some(pending_comment.into()), now)
            .await?;

        if self.notifier.notify(incident, &notification).await {
            self.tracker
                .update_status(issue_key, success_transition, Some(success_comment))
                .await
                .map_err(EngineError::from_tracker)?;
            self.recorder
                .record(incident, done_status, Some(success_comment.into()), now)
                .await?;
            info!(issue_key, template = ?template, "Notification delivered");
        } else {
            self.flag_error(
                issue.status_key(),
                issue_key,
                incident,
                failure_comment.into(),
                now,
            )
            .await?;
        }

        Ok(true)
    }

    /// Auto-reply to mail that arrived for an already-closed incident.
    /// Called by the mail-ingestion collaborator after correlation resolves
    /// to a finished incident. Returns whether the reply went out.
    pub async fn reply_already_closed(&self, incident: &mut Incident) -> EngineResult<bool> {
        let now = Utc::now();
        let Some(issue_key) = incident.tracker_key.clone() else {
            debug!(incident_id = %incident.id, "Closed incident has no tracker key, skipping reply");
            return Ok(false);
        };

        let cache = DirectoryCache::load(self.store.as_ref(), self.tracker.as_ref()).await?;
        let notification = match self
            .build_notification(
                &issue_key,
                None,
                incident,
                &cache,
                NotificationTemplate::AlreadyClosed,
                now,
            )
            .await?
        {
            Ok(notification) => notification,
            Err(reason) => {
                self.flag_error(None, &issue_key, incident, reason, now).await?;
                return Ok(false);
            }
        };

        if self.notifier.notify(incident, &notification).await {
            info!(issue_key, "Sent already-closed auto-reply");
            Ok(true)
        } else {
            self.flag_error(
                None,
                &issue_key,
                incident,
                "Failed to tell the applicant the incident is already closed".into(),
                now,
            )
            .await?;
            Ok(false)
        }
    }

    /// Render a notification, or explain why it cannot be built.
    async fn build_notification(
        &self,
        issue_key: &str,
        summary: Option<&str>,
        incident: &Incident,
        cache: &DirectoryCache,
        template: NotificationTemplate,
        now: DateTime<Utc>,
    ) -> EngineResult<Result<Notification, String>> {
        let summary = summary.unwrap_or("incident");
        let subject = format!("Re: {issue_key}: {summary}");

        match template {
            NotificationTemplate::OperatorAccepted | NotificationTemplate::OperatorClosed => {
                let Some(head) = self.store.thread_head_for_incident(incident.id).await? else {
                    return Ok(Err(
                        "No originating mail found to address the operator notification".into(),
                    ));
                };

                let to = vec![head.sender.clone()];
                let cc: Vec<String> = head
                    .recipients_to
                    .iter()
                    .chain(head.recipients_cc.iter())
                    .filter(|addr| **addr != head.sender)
                    .cloned()
                    .collect();

                let body = match template {
                    NotificationTemplate::OperatorAccepted => {
                        format!("Issue \"{issue_key}\" was accepted for work.")
                    }
                    _ => format!("Issue \"{issue_key}\" was closed."),
                };

                Ok(Ok(Notification {
                    template,
                    subject,
                    body,
                    to,
                    cc,
                }))
            }

            NotificationTemplate::ContractorAssignment => {
                let policy = cache.policy_of(incident.incident_type.as_deref());
                if let Some(policy) = policy {
                    if !policy.contractor_eligible {
                        return Ok(Err(format!(
                            "Incidents of type \"{}\" cannot be handed off to a contractor",
                            policy.name
                        )));
                    }
                }

                let site = cache.site_of(incident.site_code.as_deref());
                let Some(site) = site else {
                    return Ok(Err(
                        "To hand the issue to the contractor, specify the site code \
                         and/or equipment name"
                            .into(),
                    ));
                };
                if site.contractor_emails.is_empty() {
                    return Ok(Err("No contractor email found for the hand-off".into()));
                }

                let equipment = cache.equipment_of(incident.equipment_code.as_deref());
                let thread = self.store.mail_by_incident(incident.id).await?;
                let body = contractor_brief(incident, Some(site), equipment, policy, &thread, now);

                Ok(Ok(Notification {
                    template,
                    subject,
                    body,
                    to: site.contractor_emails.clone(),
                    cc: vec![],
                }))
            }

            NotificationTemplate::AlreadyClosed => {
                let Some(head) = self.store.thread_head_for_incident(incident.id).await? else {
                    return Ok(Err("No mail to answer on a closed incident".into()));
                };
                let body = already_closed_reply(&head);
                Ok(Ok(Notification {
                    template,
                    subject,
                    body,
                    to: vec![head.sender.clone()],
                    cc: vec![],
                }))
            }
        }
    }

    /// Reflect a per-issue failure on both sides: error status plus comment
    /// on the remote issue, guarded `Error` event locally.
    ///
    /// `current_status` is the issue's status when known; an issue already
    /// sitting in the error state is not re-flagged.
    async fn flag_error(
        &self,
        current_status: Option<&str>,
        issue_key: &str,
        incident: &mut Incident,
        comment: String,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if current_status != Some(self.config.statuses.error.as_str()) {
            let applied = self
                .tracker
                .update_status(issue_key, &self.config.statuses.error, Some(&comment))
                .await
                .map_err(EngineError::from_tracker)?;
            if applied {
                self.recorder
                    .record(incident, IncidentStatus::Error, Some(comment.clone()), now)
                    .await?;
            }
        } else {
            self.recorder
                .record(incident, IncidentStatus::Error, Some(comment.clone()), now)
                .await?;
        }
        warn!(issue_key, comment = %comment, "Issue flagged with an error");
        Ok(())
    }

    /// Queue a non-empty field patch for the concurrent push phase.
    fn queue_patch(&self, pushes: &mut PushQueue, issue_key: &str, patch: IssuePatch) {
        if patch.is_empty() {
            return;
        }
        let tracker = self.tracker.clone();
        let key = issue_key.to_string();
        pushes.enqueue(format!("fields:{key}"), async move {
            tracker.update_fields(&key, &patch).await
        });
    }
}
