use std::future::Future;
use std::time::Duration;

use envelo_core::error::ApiError;
use envelo_core::telemetry::{Heartbeat, SessionEnd, SessionRegistration, TelemetryBatch};
use envelo_core::{Boundary, parse_boundary_payload};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Failure of a single registry call, already classified for the agent's
/// local decision (fall back, requeue, count, or shut down).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// 401: the certificate credential was revoked. Never retried.
    #[error("registry rejected the agent credential (401)")]
    Unauthorized,
    #[error("registry returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("registry request timed out")]
    Timeout,
    #[error("failed to reach registry: {0}")]
    Transport(String),
    #[error("unexpected registry response: {0}")]
    Decode(String),
}

impl RegistryError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Client side of the Certification Registry contract.
///
/// Every method is one outbound call. Implementations must not retry
/// internally; the runtime owns retry and shutdown policy.
pub trait Registry: Send + Sync + 'static {
    fn fetch_boundaries(
        &self,
        certificate_id: &str,
    ) -> impl Future<Output = Result<Vec<Boundary>, RegistryError>> + Send;

    fn register_session(
        &self,
        registration: &SessionRegistration<'_>,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn heartbeat(
        &self,
        beat: &Heartbeat<'_>,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn deliver_telemetry(
        &self,
        batch: &TelemetryBatch<'_>,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    fn end_session(&self, end: &SessionEnd)
    -> impl Future<Output = Result<(), RegistryError>> + Send;
}

/// Run a registry call under a hard deadline; elapsing counts as a timeout.
pub async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RegistryError>>,
) -> Result<T, RegistryError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RegistryError::Timeout),
    }
}

/// HTTPS registry client authenticated with the certificate's bearer key.
#[derive(Clone)]
pub struct HttpRegistry {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpRegistry {
    pub fn new(
        api_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        url::Url::parse(api_url)
            .map_err(|e| RegistryError::Transport(format!("invalid registry URL {api_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("envelo-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RegistryError::from_reqwest)?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url, RegistryError> {
        reqwest::Url::parse(&format!("{}{}", self.api_url, path))
            .map_err(|e| RegistryError::Transport(format!("invalid registry URL/path: {e}")))
    }

    async fn post_json<T: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), RegistryError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(RegistryError::from_reqwest)?;
        ensure_success(response).await.map(|_| ())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(RegistryError::Unauthorized);
    }
    if status.is_success() {
        return Ok(response);
    }
    let bytes = response.bytes().await.unwrap_or_default();
    Err(RegistryError::Status {
        status: status.as_u16(),
        message: error_message(&bytes),
    })
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ApiError>(body) {
        Ok(api_error) => match api_error.docs_hint {
            Some(hint) => format!("{} ({hint})", api_error.message),
            None => api_error.message,
        },
        Err(_) => String::from_utf8_lossy(body)
            .chars()
            .take(ERROR_BODY_PREVIEW_CHARS)
            .collect(),
    }
}

impl Registry for HttpRegistry {
    async fn fetch_boundaries(&self, certificate_id: &str) -> Result<Vec<Boundary>, RegistryError> {
        let url = self.endpoint(&format!(
            "/v1/envelo/certificates/{certificate_id}/boundaries"
        ))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(RegistryError::from_reqwest)?;
        let payload: serde_json::Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(RegistryError::from_reqwest)?;
        parse_boundary_payload(&payload).map_err(|e| RegistryError::Decode(e.to_string()))
    }

    async fn register_session(
        &self,
        registration: &SessionRegistration<'_>,
    ) -> Result<(), RegistryError> {
        self.post_json("/v1/envelo/sessions", registration).await
    }

    async fn heartbeat(&self, beat: &Heartbeat<'_>) -> Result<(), RegistryError> {
        self.post_json("/v1/envelo/heartbeat", beat).await
    }

    async fn deliver_telemetry(&self, batch: &TelemetryBatch<'_>) -> Result<(), RegistryError> {
        self.post_json("/v1/envelo/telemetry", batch).await
    }

    async fn end_session(&self, end: &SessionEnd) -> Result<(), RegistryError> {
        self.post_json(&format!("/v1/envelo/sessions/{}/end", end.session_id), end)
            .await
    }
}
