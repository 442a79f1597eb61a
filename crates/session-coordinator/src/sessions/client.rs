//! HTTP client for the session persistence API.
//!
//! # Endpoints
//!
//! - `GET {base}/internal/sessions/{id}` returns the session record, 404 when absent
//! - `PATCH {base}/internal/sessions/{id}/status` with `{"status": "..."}`
//!
//! # Security
//!
//! - The coordinator authenticates with its own service bearer token
//! - Timeouts prevent hanging connections
//! - Errors are logged server-side with generic messages returned

use crate::errors::CoordinatorError;
use crate::sessions::{SessionDirectory, SessionStatusWriter};
use common::secret::{ExposeSecret, SecretString};
use common::types::{SessionId, SessionRecord, SessionStatus};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Default timeout for session API requests in seconds.
const SESSION_API_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Connect timeout for session API requests in seconds.
const SESSION_API_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct StatusUpdateRequest {
    status: SessionStatus,
}

/// HTTP client for the session persistence API.
#[derive(Clone)]
pub struct SessionApiClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL without trailing slash.
    base_url: String,

    /// Service token for authenticating to the session API.
    service_token: SecretString,
}

impl SessionApiClient {
    /// Create a new session API client.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, service_token: SecretString) -> Result<Self, CoordinatorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SESSION_API_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(SESSION_API_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "sc.sessions.client", error = %e, "Failed to build HTTP client");
                CoordinatorError::Internal(format!("http client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        })
    }

    fn session_url(&self, session_id: &SessionId) -> String {
        format!("{}/internal/sessions/{}", self.base_url, session_id)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.service_token.expose_secret())
    }
}

#[async_trait::async_trait]
impl SessionDirectory for SessionApiClient {
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn fetch_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, CoordinatorError> {
        let response = self
            .client
            .get(self.session_url(session_id))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sc.sessions.client", error = %e, "Session lookup request failed");
                CoordinatorError::SessionApi(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(target: "sc.sessions.client", status = %status, "Session lookup returned error status");
            return Err(CoordinatorError::SessionApi(format!(
                "lookup returned {status}"
            )));
        }

        response.json::<SessionRecord>().await.map(Some).map_err(|e| {
            error!(target: "sc.sessions.client", error = %e, "Failed to parse session record");
            CoordinatorError::SessionApi(format!("invalid session record: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl SessionStatusWriter for SessionApiClient {
    #[instrument(skip(self), fields(session_id = %session_id, status = %status))]
    async fn update_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), CoordinatorError> {
        let url = format!("{}/status", self.session_url(session_id));

        let response = self
            .client
            .patch(&url)
            .header("Authorization", self.bearer())
            .json(&StatusUpdateRequest { status })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sc.sessions.client", error = %e, "Status update request failed");
                CoordinatorError::SessionApi(format!("request failed: {e}"))
            })?;

        let code = response.status();
        if code.is_success() {
            Ok(())
        } else if code == StatusCode::UNAUTHORIZED || code == StatusCode::FORBIDDEN {
            error!(target: "sc.sessions.client", status = %code, "Service token rejected by session API");
            Err(CoordinatorError::SessionApi(format!(
                "status update rejected: {code}"
            )))
        } else {
            warn!(target: "sc.sessions.client", status = %code, "Status update returned error status");
            Err(CoordinatorError::SessionApi(format!(
                "status update returned {code}"
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::UserId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SessionApiClient {
        SessionApiClient::new(
            format!("{}/", server.uri()),
            SecretString::from("svc-token"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_session_parses_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/sessions/sess-1"))
            .and(header("Authorization", "Bearer svc-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sess-1",
                "teacher": "teacher-1",
                "learner": "learner-1",
                "status": "scheduled"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = client_for(&server)
            .fetch_session(&SessionId::from("sess-1"))
            .await
            .unwrap()
            .expect("record");

        assert_eq!(record.teacher, UserId::from("teacher-1"));
        assert_eq!(record.learner, UserId::from("learner-1"));
        assert_eq!(record.status, SessionStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_fetch_session_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/sessions/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_session(&SessionId::from("missing"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_fetch_session_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_session(&SessionId::from("sess-1"))
            .await;
        assert!(matches!(result, Err(CoordinatorError::SessionApi(_))));
    }

    #[tokio::test]
    async fn test_fetch_session_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .fetch_session(&SessionId::from("sess-1"))
            .await;
        assert!(matches!(result, Err(CoordinatorError::SessionApi(_))));
    }

    #[tokio::test]
    async fn test_update_status_sends_kebab_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/internal/sessions/sess-1/status"))
            .and(header("Authorization", "Bearer svc-token"))
            .and(body_json(serde_json::json!({ "status": "in-progress" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_status(&SessionId::from("sess-1"), SessionStatus::InProgress)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_status_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .update_status(&SessionId::from("sess-1"), SessionStatus::Completed)
            .await;
        assert!(matches!(result, Err(CoordinatorError::SessionApi(_))));
    }
}
