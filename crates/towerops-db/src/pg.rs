//! Postgres store implementation over `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use towerops_core::{IncidentId, IncidentStatus, MailId};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    DispatchUser, Equipment, Incident, IncidentType, MailMessage, NewIncident, NewMailMessage,
    NewStatusEvent, Site, StatusEvent,
};
use crate::store::{DirectoryStore, IncidentStore, LockStore, MailStore};

const MAIL_COLUMNS: &str = "id, message_id, reply_to_id, refs, subject, body, sender, \
     recipients_to, recipients_cc, received_at, folder, is_thread_head, \
     from_tracker, mirrored_to_tracker, incident_id";

const INCIDENT_COLUMNS: &str = "id, created_at, registered_at, responded_at, finished_at, \
     is_finished, site_code, equipment_code, incident_type, assignee, category, tracker_key";

/// Postgres-backed [`crate::Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for wiring health checks.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Row from mail queries.
#[derive(Debug, sqlx::FromRow)]
struct MailRow {
    id: i64,
    message_id: String,
    reply_to_id: Option<String>,
    refs: Vec<String>,
    subject: Option<String>,
    body: Option<String>,
    sender: String,
    recipients_to: Vec<String>,
    recipients_cc: Vec<String>,
    received_at: DateTime<Utc>,
    folder: String,
    is_thread_head: bool,
    from_tracker: bool,
    mirrored_to_tracker: bool,
    incident_id: Option<i64>,
}

impl MailRow {
    fn into_message(self) -> MailMessage {
        MailMessage {
            id: MailId::new(self.id),
            message_id: self.message_id,
            reply_to_id: self.reply_to_id,
            references: self.refs,
            subject: self.subject,
            body: self.body,
            sender: self.sender,
            recipients_to: self.recipients_to,
            recipients_cc: self.recipients_cc,
            received_at: self.received_at,
            folder: self.folder,
            is_thread_head: self.is_thread_head,
            from_tracker: self.from_tracker,
            mirrored_to_tracker: self.mirrored_to_tracker,
            incident_id: self.incident_id.map(IncidentId::new),
        }
    }
}

/// Row from incident queries.
#[derive(Debug, sqlx::FromRow)]
struct IncidentRow {
    id: i64,
    created_at: DateTime<Utc>,
    registered_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    is_finished: bool,
    site_code: Option<String>,
    equipment_code: Option<String>,
    incident_type: Option<String>,
    assignee: Option<String>,
    category: Option<String>,
    tracker_key: Option<String>,
}

impl IncidentRow {
    fn into_incident(self) -> Incident {
        Incident {
            id: IncidentId::new(self.id),
            created_at: self.created_at,
            registered_at: self.registered_at,
            responded_at: self.responded_at,
            finished_at: self.finished_at,
            is_finished: self.is_finished,
            site_code: self.site_code,
            equipment_code: self.equipment_code,
            incident_type: self.incident_type,
            assignee: self.assignee,
            category: self.category,
            tracker_key: self.tracker_key,
        }
    }
}

/// Row from status queries.
#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    id: i64,
    incident_id: i64,
    status: String,
    recorded_at: DateTime<Utc>,
    comment: Option<String>,
}

impl StatusRow {
    fn into_event(self) -> StatusEvent {
        StatusEvent {
            id: self.id,
            incident_id: IncidentId::new(self.incident_id),
            status: self.status.parse().unwrap_or(IncidentStatus::Error),
            recorded_at: self.recorded_at,
            comment: self.comment,
        }
    }
}

#[async_trait]
impl MailStore for PgStore {
    async fn insert_mail(&self, new: NewMailMessage) -> StoreResult<MailMessage> {
        let row: MailRow = sqlx::query_as(&format!(
            r"
            INSERT INTO mail_messages
                (message_id, reply_to_id, refs, subject, body, sender,
                 recipients_to, recipients_cc, received_at, folder,
                 is_thread_head, from_tracker)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {MAIL_COLUMNS}
            "
        ))
        .bind(&new.message_id)
        .bind(&new.reply_to_id)
        .bind(&new.references)
        .bind(&new.subject)
        .bind(&new.body)
        .bind(&new.sender)
        .bind(&new.recipients_to)
        .bind(&new.recipients_cc)
        .bind(new.received_at)
        .bind(&new.folder)
        .bind(new.is_thread_head)
        .bind(new.from_tracker)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.into_message())
    }

    async fn mail_by_message_id(&self, message_id: &str) -> StoreResult<Option<MailMessage>> {
        let row: Option<MailRow> = sqlx::query_as(&format!(
            "SELECT {MAIL_COLUMNS} FROM mail_messages WHERE message_id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(MailRow::into_message))
    }

    async fn replies_to(&self, message_id: &str) -> StoreResult<Vec<MailMessage>> {
        let rows: Vec<MailRow> = sqlx::query_as(&format!(
            "SELECT {MAIL_COLUMNS} FROM mail_messages WHERE reply_to_id = $1"
        ))
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(MailRow::into_message).collect())
    }

    async fn referencing(&self, message_id: &str) -> StoreResult<Vec<MailMessage>> {
        let rows: Vec<MailRow> = sqlx::query_as(&format!(
            "SELECT {MAIL_COLUMNS} FROM mail_messages WHERE $1 = ANY(refs)"
        ))
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(MailRow::into_message).collect())
    }

    async fn mail_by_incident(&self, incident_id: IncidentId) -> StoreResult<Vec<MailMessage>> {
        let rows: Vec<MailRow> = sqlx::query_as(&format!(
            r"
            SELECT {MAIL_COLUMNS} FROM mail_messages
            WHERE incident_id = $1
            ORDER BY received_at, is_thread_head DESC, id
            "
        ))
        .bind(incident_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(MailRow::into_message).collect())
    }

    async fn thread_head_for_incident(
        &self,
        incident_id: IncidentId,
    ) -> StoreResult<Option<MailMessage>> {
        let row: Option<MailRow> = sqlx::query_as(&format!(
            r"
            SELECT {MAIL_COLUMNS} FROM mail_messages
            WHERE incident_id = $1 AND is_thread_head
            ORDER BY received_at, id
            LIMIT 1
            "
        ))
        .bind(incident_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(MailRow::into_message))
    }

    async fn attach_incident(
        &self,
        mail_ids: &[MailId],
        incident_id: IncidentId,
    ) -> StoreResult<u64> {
        let raw_ids: Vec<i64> = mail_ids.iter().map(MailId::as_i64).collect();
        let result = sqlx::query(
            r"
            UPDATE mail_messages
            SET incident_id = $2
            WHERE id = ANY($1)
              AND (incident_id IS DISTINCT FROM $2)
            ",
        )
        .bind(&raw_ids)
        .bind(incident_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IncidentStore for PgStore {
    async fn create_incident(&self, new: NewIncident) -> StoreResult<Incident> {
        let row: IncidentRow = sqlx::query_as(&format!(
            r"
            INSERT INTO incidents
                (registered_at, site_code, equipment_code, incident_type, tracker_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {INCIDENT_COLUMNS}
            "
        ))
        .bind(new.registered_at)
        .bind(&new.site_code)
        .bind(&new.equipment_code)
        .bind(&new.incident_type)
        .bind(&new.tracker_key)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.into_incident())
    }

    async fn incident(&self, id: IncidentId) -> StoreResult<Option<Incident>> {
        let row: Option<IncidentRow> = sqlx::query_as(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(IncidentRow::into_incident))
    }

    async fn incidents_by_ids(&self, ids: &[IncidentId]) -> StoreResult<Vec<Incident>> {
        let raw_ids: Vec<i64> = ids.iter().map(IncidentId::as_i64).collect();
        let rows: Vec<IncidentRow> = sqlx::query_as(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = ANY($1)"
        ))
        .bind(&raw_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(IncidentRow::into_incident).collect())
    }

    async fn incident_by_tracker_key(&self, key: &str) -> StoreResult<Option<Incident>> {
        let row: Option<IncidentRow> = sqlx::query_as(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE tracker_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(IncidentRow::into_incident))
    }

    async fn update_incident(&self, incident: &Incident) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE incidents
            SET registered_at = $2,
                responded_at = $3,
                finished_at = $4,
                is_finished = $5,
                site_code = $6,
                equipment_code = $7,
                incident_type = $8,
                assignee = $9,
                category = $10,
                tracker_key = $11
            WHERE id = $1
            ",
        )
        .bind(incident.id.as_i64())
        .bind(incident.registered_at)
        .bind(incident.responded_at)
        .bind(incident.finished_at)
        .bind(incident.is_finished)
        .bind(&incident.site_code)
        .bind(&incident.equipment_code)
        .bind(&incident.incident_type)
        .bind(&incident.assignee)
        .bind(&incident.category)
        .bind(&incident.tracker_key)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    async fn record_status_and_update(
        &self,
        incident: &Incident,
        event: NewStatusEvent,
    ) -> StoreResult<StatusEvent> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r"
            UPDATE incidents
            SET registered_at = $2,
                responded_at = $3,
                finished_at = $4,
                is_finished = $5,
                site_code = $6,
                equipment_code = $7,
                incident_type = $8,
                assignee = $9,
                category = $10,
                tracker_key = $11
            WHERE id = $1
            ",
        )
        .bind(incident.id.as_i64())
        .bind(incident.registered_at)
        .bind(incident.responded_at)
        .bind(incident.finished_at)
        .bind(incident.is_finished)
        .bind(&incident.site_code)
        .bind(&incident.equipment_code)
        .bind(&incident.incident_type)
        .bind(&incident.assignee)
        .bind(&incident.category)
        .bind(&incident.tracker_key)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        let row: StatusRow = sqlx::query_as(
            r"
            INSERT INTO status_events (incident_id, status, recorded_at, comment)
            VALUES ($1, $2, $3, $4)
            RETURNING id, incident_id, status, recorded_at, comment
            ",
        )
        .bind(event.incident_id.as_i64())
        .bind(event.status.to_string())
        .bind(event.recorded_at)
        .bind(&event.comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;

        Ok(row.into_event())
    }

    async fn latest_status(&self, id: IncidentId) -> StoreResult<Option<StatusEvent>> {
        let row: Option<StatusRow> = sqlx::query_as(
            r"
            SELECT id, incident_id, status, recorded_at, comment
            FROM status_events
            WHERE incident_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(StatusRow::into_event))
    }

    async fn has_status(&self, id: IncidentId, status: IncidentStatus) -> StoreResult<bool> {
        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM status_events WHERE incident_id = $1 AND status = $2 LIMIT 1",
        )
        .bind(id.as_i64())
        .bind(status.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(exists.is_some())
    }

    async fn status_history(&self, id: IncidentId) -> StoreResult<Vec<StatusEvent>> {
        let rows: Vec<StatusRow> = sqlx::query_as(
            r"
            SELECT id, incident_id, status, recorded_at, comment
            FROM status_events
            WHERE incident_id = $1
            ORDER BY recorded_at, id
            ",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(StatusRow::into_event).collect())
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn sites(&self) -> StoreResult<Vec<Site>> {
        #[derive(sqlx::FromRow)]
        struct SiteRow {
            code: String,
            region: Option<String>,
            address: Option<String>,
            latitude: Option<f64>,
            longitude: Option<f64>,
            contractor_name: Option<String>,
            contractor_emails: Vec<String>,
        }

        let rows: Vec<SiteRow> = sqlx::query_as(
            "SELECT code, region, address, latitude, longitude, contractor_name, \
             contractor_emails FROM sites",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|r| Site {
                code: r.code,
                region: r.region,
                address: r.address,
                latitude: r.latitude,
                longitude: r.longitude,
                contractor_name: r.contractor_name,
                contractor_emails: r.contractor_emails,
            })
            .collect())
    }

    async fn equipment(&self) -> StoreResult<Vec<Equipment>> {
        #[derive(sqlx::FromRow)]
        struct EquipmentRow {
            name: String,
            site_code: Option<String>,
            operators: Vec<String>,
        }

        let rows: Vec<EquipmentRow> =
            sqlx::query_as("SELECT name, site_code, operators FROM equipment")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|r| Equipment {
                name: r.name,
                site_code: r.site_code,
                operators: r.operators,
            })
            .collect())
    }

    async fn active_dispatchers(&self) -> StoreResult<Vec<DispatchUser>> {
        #[derive(sqlx::FromRow)]
        struct UserRow {
            username: String,
            active: bool,
        }

        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT username, active FROM dispatch_users WHERE active")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|r| DispatchUser {
                username: r.username,
                active: r.active,
            })
            .collect())
    }

    async fn incident_types(&self) -> StoreResult<Vec<IncidentType>> {
        #[derive(sqlx::FromRow)]
        struct TypeRow {
            name: String,
            description: Option<String>,
            fast_sla_minutes: Option<i64>,
            full_sla_minutes: Option<i64>,
            contractor_eligible: bool,
        }

        let rows: Vec<TypeRow> = sqlx::query_as(
            "SELECT name, description, fast_sla_minutes, full_sla_minutes, \
             contractor_eligible FROM incident_types",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|r| IncidentType {
                name: r.name,
                description: r.description,
                fast_sla_minutes: r.fast_sla_minutes,
                full_sla_minutes: r.full_sla_minutes,
                contractor_eligible: r.contractor_eligible,
            })
            .collect())
    }
}

#[async_trait]
impl LockStore for PgStore {
    async fn try_lock_run(&self, name: &str, ttl: Duration) -> StoreResult<bool> {
        let locked_until = Utc::now() + ttl;
        let result = sqlx::query(
            r"
            INSERT INTO run_locks (name, locked_until)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE
            SET locked_until = EXCLUDED.locked_until
            WHERE run_locks.locked_until < now()
            ",
        )
        .bind(name)
        .bind(locked_until)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn unlock_run(&self, name: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM run_locks WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        Ok(())
    }
}
