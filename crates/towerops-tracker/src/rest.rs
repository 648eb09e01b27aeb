//! REST implementation of [`TrackerApi`].
//!
//! Wraps the tracker's HTTP API with bearer auth, a single token
//! refresh-plus-retry on 401, and the crate retry policy for transient
//! failures. Rate-limit responses surface the server's `Retry-After` so the
//! policy can honor it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use towerops_core::IncidentId;

use crate::api::{IssueComment, TrackerApi, TrackerUser};
use crate::error::{TrackerError, TrackerResult};
use crate::fields::{FieldIds, IssuePatch, RemoteIssue};
use crate::retry::RetryPolicy;

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct RestTrackerConfig {
    /// API root, e.g. `https://api.tracker.example.net`.
    pub base_url: String,
    /// Organization id sent with every request.
    pub org_id: String,
    /// Queue holding incident issues, e.g. `OUT`.
    pub queue: String,
    /// Initial bearer token.
    pub access_token: String,
    /// OAuth token endpoint for refresh-on-401. Refresh is disabled when
    /// unset and a 401 becomes fatal immediately.
    pub refresh_url: Option<String>,
    pub refresh_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    pub field_ids: FieldIds,
    pub retry: RetryPolicy,
}

impl RestTrackerConfig {
    #[must_use]
    pub fn new(base_url: &str, org_id: &str, queue: &str, access_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            org_id: org_id.to_string(),
            queue: queue.to_string(),
            access_token: access_token.to_string(),
            refresh_url: None,
            refresh_token: None,
            timeout: Duration::from_secs(30),
            field_ids: FieldIds::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// REST tracker client.
pub struct RestTrackerClient {
    config: RestTrackerConfig,
    http: Client,
    token: Arc<RwLock<String>>,
}

impl std::fmt::Debug for RestTrackerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTrackerClient")
            .field("base_url", &self.config.base_url)
            .field("queue", &self.config.queue)
            .finish()
    }
}

impl RestTrackerClient {
    /// Build a client from configuration.
    pub fn new(config: RestTrackerConfig) -> TrackerResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TrackerError::Network(format!("Failed to build HTTP client: {e}")))?;

        let token = Arc::new(RwLock::new(config.access_token.clone()));

        Ok(Self {
            config,
            http,
            token,
        })
    }

    /// The configured custom-field ids.
    #[must_use]
    pub fn field_ids(&self) -> &FieldIds {
        &self.config.field_ids
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// One logical request: transparent single refresh-and-retry on 401,
    /// everything else mapped into the error taxonomy.
    async fn request_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> TrackerResult<Value> {
        let mut refreshed = false;

        loop {
            let token = self.token.read().await.clone();
            let mut builder = self
                .http
                .request(method.clone(), self.url(path))
                .header(header::AUTHORIZATION, format!("OAuth {token}"))
                .header("X-Org-ID", &self.config.org_id);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(TrackerError::from)?;
            let status = response.status();

            if status.is_success() {
                let text = response.text().await.map_err(TrackerError::from)?;
                if text.is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&text)
                    .map_err(|e| TrackerError::Parse(e.to_string()));
            }

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(TrackerError::AuthenticationFailed);
                }
                debug!(path, "Tracker returned 401, refreshing token");
                self.refresh_access_token().await?;
                refreshed = true;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10);
                return Err(TrackerError::RateLimited { retry_after_secs });
            }

            let message = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }
    }

    /// One logical call with the retry policy on top.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> TrackerResult<Value> {
        self.config
            .retry
            .execute(|| self.request_once(method.clone(), path, body.as_ref()))
            .await
    }

    /// Exchange the refresh token for a fresh access token.
    async fn refresh_access_token(&self) -> TrackerResult<()> {
        let (Some(refresh_url), Some(refresh_token)) = (
            self.config.refresh_url.as_deref(),
            self.config.refresh_token.as_deref(),
        ) else {
            return Err(TrackerError::AuthenticationFailed);
        };

        let response = self
            .http
            .post(refresh_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|_| TrackerError::AuthenticationFailed)?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Token refresh rejected");
            return Err(TrackerError::AuthenticationFailed);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| TrackerError::AuthenticationFailed)?;

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or(TrackerError::AuthenticationFailed)?;

        *self.token.write().await = token.to_string();
        debug!("Tracker access token refreshed");
        Ok(())
    }

    async fn search_issues(&self, query: String) -> TrackerResult<Vec<RemoteIssue>> {
        let body = self
            .request(
                Method::POST,
                "/v2/issues/_search",
                Some(json!({ "query": query })),
            )
            .await?;

        let items = body
            .as_array()
            .ok_or_else(|| TrackerError::Parse("expected an issue array".into()))?;

        Ok(items.iter().cloned().map(RemoteIssue::new).collect())
    }
}

fn user_from_value(value: &Value) -> TrackerResult<TrackerUser> {
    let id_value = value
        .get("uid")
        .or_else(|| value.get("id"))
        .ok_or_else(|| TrackerError::Parse("user without id".into()))?;
    let id = id_value
        .as_i64()
        .or_else(|| id_value.as_str()?.parse().ok())
        .ok_or_else(|| TrackerError::Parse("non-numeric user id".into()))?;
    let login = value
        .get("login")
        .and_then(Value::as_str)
        .ok_or_else(|| TrackerError::Parse("user without login".into()))?
        .to_string();

    Ok(TrackerUser {
        id,
        login,
        display: value
            .get("display")
            .and_then(Value::as_str)
            .map(String::from),
        is_robot: value
            .get("isRobot")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

#[async_trait]
impl TrackerApi for RestTrackerClient {
    async fn current_user(&self) -> TrackerResult<TrackerUser> {
        let body = self.request(Method::GET, "/v2/myself", None).await?;
        user_from_value(&body)
    }

    async fn list_users(&self) -> TrackerResult<Vec<TrackerUser>> {
        let body = self.request(Method::GET, "/v2/users", None).await?;
        let items = body
            .as_array()
            .ok_or_else(|| TrackerError::Parse("expected a user array".into()))?;

        items.iter().map(user_from_value).collect()
    }

    async fn open_issues(&self, lookback_days: i64) -> TrackerResult<Vec<RemoteIssue>> {
        self.search_issues(format!(
            "Queue: {} AND Resolution: empty() AND Updated: >= now()-{}d",
            self.config.queue, lookback_days
        ))
        .await
    }

    async fn closed_issues(&self, lookback_days: i64) -> TrackerResult<Vec<RemoteIssue>> {
        self.search_issues(format!(
            "Queue: {} AND Resolution: notEmpty() AND Updated: >= now()-{}d",
            self.config.queue, lookback_days
        ))
        .await
    }

    async fn create_issue(
        &self,
        summary: &str,
        description: &str,
        local_id: IncidentId,
    ) -> TrackerResult<RemoteIssue> {
        let mut payload = json!({
            "queue": self.config.queue,
            "summary": summary,
            "description": description,
        });
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                self.config.field_ids.local_id.clone(),
                json!(local_id.as_i64()),
            );
        }

        let body = self
            .request(Method::POST, "/v2/issues", Some(payload))
            .await?;

        Ok(RemoteIssue::new(body))
    }

    async fn update_fields(&self, issue_key: &str, patch: &IssuePatch) -> TrackerResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(patch).map_err(|e| TrackerError::Parse(e.to_string()))?;
        self.request(Method::PATCH, &format!("/v2/issues/{issue_key}"), Some(body))
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        issue_key: &str,
        transition: &str,
        comment: Option<&str>,
    ) -> TrackerResult<bool> {
        let mut body = json!({});
        if let Some(comment) = comment {
            body = json!({ "comment": comment });
        }

        let result = self
            .request(
                Method::POST,
                &format!("/v2/issues/{issue_key}/transitions/{transition}/_execute"),
                Some(body),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            // The workflow rejected the transition; callers treat this as
            // "status not applied", not as a failed call.
            Err(TrackerError::Api { status: 409, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn add_comment(&self, issue_key: &str, text: &str) -> TrackerResult<()> {
        self.request(
            Method::POST,
            &format!("/v2/issues/{issue_key}/comments"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn send_comment_email(
        &self,
        issue_key: &str,
        subject: &str,
        text: &str,
        to: &[String],
        cc: &[String],
    ) -> TrackerResult<()> {
        self.request(
            Method::POST,
            &format!("/v2/issues/{issue_key}/comments"),
            Some(json!({
                "text": text,
                "email": {
                    "subject": subject,
                    "text": text,
                    "info": { "to": to, "cc": cc },
                },
            })),
        )
        .await?;
        Ok(())
    }

    async fn list_comments(&self, issue_key: &str) -> TrackerResult<Vec<IssueComment>> {
        let body = self
            .request(
                Method::GET,
                &format!("/v2/issues/{issue_key}/comments"),
                None,
            )
            .await?;

        let items = body
            .as_array()
            .ok_or_else(|| TrackerError::Parse("expected a comment array".into()))?;

        items
            .iter()
            .map(|item| {
                let id = item
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| TrackerError::Parse("comment without id".into()))?;
                let text = item
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let created_at = item
                    .get("createdAt")
                    .and_then(Value::as_str)
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&chrono::Utc));
                Ok(IssueComment {
                    id,
                    text,
                    created_at,
                })
            })
            .collect()
    }
}
