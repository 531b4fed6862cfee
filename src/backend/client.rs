//! Typed HTTP client for the analysis backend.
//!
//! Endpoint shapes follow the backend API: `GET /api/health` (200 =
//! healthy), `POST /api/session` (returns the new session), and
//! `POST /api/activity/batch` (returns accepted event ids). A generic
//! passthrough wraps arbitrary calls in a uniform success/error envelope
//! so relay logic never branches on transport failure types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::models::activity::ActivityEvent;
use crate::models::session::Session;
use crate::{AppError, Result};

/// Uniform outcome of a generic backend request. Never raised as an
/// error — transport failures are folded into `success: false`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiOutcome {
    /// Whether the request completed with a 2xx status.
    pub success: bool,
    /// Response body on success, when the backend returned JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiOutcome {
    fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Accepted-event summary returned by a batch submission.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchAccepted {
    /// Whether every event in the batch was accepted.
    pub success: bool,
    /// Number of events the backend acknowledged.
    pub received_count: usize,
    /// Backend-acknowledged event ids, in submission order.
    pub received_ids: Vec<String>,
    /// Per-event failure descriptions, when any.
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

/// Wire body for a session-create request.
#[derive(Debug, Serialize)]
struct SessionCreateBody<'a> {
    user_id: Option<&'a str>,
}

/// Wire body for a batch submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    events: &'a [ActivityEvent],
    extension_version: &'a str,
    timestamp: DateTime<Utc>,
}

/// Wire shape of the backend's session-create reply.
#[derive(Debug, Deserialize)]
struct SessionResponseBody {
    session_id: String,
    #[serde(default)]
    user_id: Option<String>,
    start_time: DateTime<Utc>,
}

/// HTTP client for the analysis backend on the loopback interface.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
    request_timeout: Duration,
}

impl BackendClient {
    /// Build a client from backend settings.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::Backend(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            health_timeout: config.health_timeout(),
            request_timeout: config.request_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Probe the backend health endpoint. 200 means healthy.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] on network failure, timeout, or a
    /// non-success status.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(self.url("/api/health"))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(|err| AppError::Backend(format!("health check failed: {err}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::Backend(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }

    /// Create a new tracking session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] on network failure or an unusable
    /// reply body.
    pub async fn create_session(&self, user_id: Option<&str>) -> Result<Session> {
        let response = self
            .http
            .post(self.url("/api/session"))
            .timeout(self.request_timeout)
            .json(&SessionCreateBody { user_id })
            .send()
            .await
            .map_err(|err| AppError::Backend(format!("session create failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "session create returned {}",
                response.status()
            )));
        }

        let body: SessionResponseBody = response
            .json()
            .await
            .map_err(|err| AppError::Backend(format!("invalid session reply: {err}")))?;

        Ok(Session::active(body.session_id, body.user_id, body.start_time))
    }

    /// Submit a batch of activity events and return the accepted ids.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] on network failure, a non-success
    /// status, or an unusable reply body.
    pub async fn submit_batch(
        &self,
        events: &[ActivityEvent],
        extension_version: Option<&str>,
    ) -> Result<BatchAccepted> {
        let body = BatchBody {
            kind: "activity_batch",
            events,
            extension_version: extension_version.unwrap_or(env!("CARGO_PKG_VERSION")),
            timestamp: Utc::now(),
        };

        let response = self
            .http
            .post(self.url("/api/activity/batch"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Backend(format!("batch submit failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "batch submit returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AppError::Backend(format!("invalid batch reply: {err}")))
    }

    /// Generic `{method, path, body}` passthrough with a fixed timeout.
    ///
    /// Always returns an [`ApiOutcome`]; transport failures become
    /// `success: false` with an error description.
    pub async fn request(&self, method: &str, path: &str, body: Option<Value>) -> ApiOutcome {
        let url = self.url(path);
        let builder = match method.to_ascii_uppercase().as_str() {
            "GET" => self.http.get(&url),
            "POST" => self.http.post(&url),
            "PUT" => self.http.put(&url),
            "PATCH" => self.http.patch(&url),
            "DELETE" => self.http.delete(&url),
            other => return ApiOutcome::err(format!("unsupported method: {other}")),
        };

        let builder = match body {
            Some(json) => builder.json(&json),
            None => builder,
        };

        let response = match builder.timeout(self.request_timeout).send().await {
            Ok(resp) => resp,
            Err(err) => return ApiOutcome::err(format!("request failed: {err}")),
        };

        let status = response.status();
        let data = response.json::<Value>().await.ok();

        if status.is_success() {
            ApiOutcome::ok(data)
        } else {
            let detail = data
                .as_ref()
                .and_then(|v| v.get("detail"))
                .and_then(Value::as_str)
                .map_or_else(String::new, |d| format!(": {d}"));
            ApiOutcome::err(format!("backend returned {status}{detail}"))
        }
    }
}
