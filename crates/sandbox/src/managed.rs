//! Managed sandbox provider: a remote service that hands out short-lived
//! sandbox sessions over HTTP.
//!
//! Protocol:
//! - `POST   {base}/v1/sessions`               create, returns `{ "id" }`
//! - `POST   {base}/v1/sessions/{id}/execute`  run code in the session
//! - `DELETE {base}/v1/sessions/{id}`          teardown (always attempted)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use fg_domain::config::ProviderConfig;
use fg_domain::error::Error;

use crate::provider::{
    ExecMode, ExecutionOutput, ExecutionRequest, ProviderDescriptor, ProviderError,
    SandboxProvider,
};

/// Network allowance on top of the execution timeout for the execute call.
const HTTP_SLACK: Duration = Duration::from_millis(200);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(15);

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSession<'a> {
    language: &'a str,
    image: &'a str,
    memory_mb: u64,
    cpus: f64,
    network: bool,
}

#[derive(Deserialize)]
struct SessionCreated {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteBody<'a> {
    file_name: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdin: Option<&'a str>,
    command: Vec<String>,
    timeout_ms: u64,
    max_output_bytes: usize,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ExecuteResult {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    timed_out: bool,
    truncated: bool,
    duration_ms: Option<u64>,
}

// ── Error classification ────────────────────────────────────────────

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::BAD_GATEWAY
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::GATEWAY_TIMEOUT
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let msg = format!("HTTP {} - {}", status.as_u16(), body.trim());
    if is_transient_status(status) {
        ProviderError::Unavailable(msg)
    } else {
        ProviderError::Failed(msg)
    }
}

fn classify_send(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() {
        ProviderError::Unavailable(e.to_string())
    } else {
        ProviderError::Failed(e.to_string())
    }
}

// ── Provider ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ManagedProvider {
    descriptor: ProviderDescriptor,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ManagedProvider {
    pub fn new(
        descriptor: ProviderDescriptor,
        base_url: &str,
        api_key: Option<String>,
    ) -> fg_domain::error::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            descriptor,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Resolve the API key from `api_key_env` (if set) and build the client.
    pub fn from_config(
        descriptor: ProviderDescriptor,
        pc: &ProviderConfig,
    ) -> fg_domain::error::Result<Self> {
        let base_url = pc
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::invalid(format!("provider '{}' has no base_url", pc.name)))?;
        let api_key = match pc.api_key_env.as_deref() {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                Error::invalid(format!(
                    "environment variable '{var}' for provider '{}' is not set",
                    pc.name
                ))
            })?),
            None => None,
        };
        Self::new(descriptor, base_url, api_key)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn create_session(&self, req: &ExecutionRequest) -> Result<String, ProviderError> {
        let resp = self
            .request(reqwest::Method::POST, "/v1/sessions")
            .timeout(CONTROL_TIMEOUT)
            .json(&CreateSession {
                language: req.language.id,
                image: req.language.image,
                memory_mb: req.limits.memory_mb,
                cpus: req.limits.cpus,
                network: req.limits.allow_network,
            })
            .send()
            .await
            .map_err(classify_send)?;

        let status = resp.status();
        let body = resp.text().await.map_err(classify_send)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        let created: SessionCreated = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Failed(format!("malformed session response: {e}")))?;
        Ok(created.id)
    }

    async fn run_in_session(
        &self,
        session_id: &str,
        req: &ExecutionRequest,
    ) -> Result<ExecutionOutput, ProviderError> {
        let template = match req.mode {
            ExecMode::Run => req.language.run,
            ExecMode::Check => req.language.check,
        };
        let body = ExecuteBody {
            file_name: req.language.file_name,
            code: &req.code,
            stdin: req.stdin.as_deref(),
            command: crate::language::render(template, req.language.file_name),
            timeout_ms: req.timeout.as_millis() as u64,
            max_output_bytes: req.limits.max_output_bytes,
        };

        let started = Instant::now();
        let sent = self
            .request(reqwest::Method::POST, &format!("/v1/sessions/{session_id}/execute"))
            .timeout(req.timeout + HTTP_SLACK)
            .json(&body)
            .send()
            .await;

        let resp = match sent {
            Ok(resp) => resp,
            // The service accepted the session but never answered in time.
            Err(e) if e.is_timeout() => {
                return Ok(ExecutionOutput {
                    timed_out: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                });
            }
            Err(e) => return Err(classify_send(e)),
        };

        let status = resp.status();
        let text = resp.text().await.map_err(classify_send)?;
        if !status.is_success() {
            return Err(classify_status(status, &text));
        }
        let result: ExecuteResult = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Failed(format!("malformed execute response: {e}")))?;

        Ok(ExecutionOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            truncated: result.truncated,
            duration_ms: result
                .duration_ms
                .unwrap_or_else(|| started.elapsed().as_millis() as u64),
        })
    }

    async fn delete_session(&self, session_id: &str) {
        let result = self
            .request(reqwest::Method::DELETE, &format!("/v1/sessions/{session_id}"))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND => {
                tracing::debug!(
                    provider = %self.descriptor.name,
                    session_id,
                    "sandbox session deleted"
                );
            }
            Ok(resp) => {
                tracing::warn!(
                    provider = %self.descriptor.name,
                    session_id,
                    status = resp.status().as_u16(),
                    "sandbox session delete returned an error"
                );
            }
            Err(e) => {
                tracing::warn!(
                    provider = %self.descriptor.name,
                    session_id,
                    error = %e,
                    "sandbox session delete failed"
                );
            }
        }
    }
}

#[async_trait]
impl SandboxProvider for ManagedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        req: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ProviderError> {
        let session_id = tokio::select! {
            created = self.create_session(req) => created?,
            _ = cancel.cancelled() => {
                return Err(ProviderError::Failed("cancelled before the session started".into()));
            }
        };

        // Session teardown must survive the caller dropping this future, so
        // the execute + delete pair runs on its own task.
        let provider = self.clone();
        let req = req.clone();
        let task = tokio::spawn(async move {
            let result = tokio::select! {
                out = provider.run_in_session(&session_id, &req) => out,
                _ = cancel.cancelled() => {
                    Err(ProviderError::Failed("cancelled".into()))
                }
            };
            provider.delete_session(&session_id).await;
            result
        });

        task.await
            .map_err(|e| ProviderError::Failed(format!("sandbox task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language;
    use crate::provider::Limits;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            name: "managed".into(),
            priority: 1,
            languages: vec!["python".into()],
            default_timeout: None,
        }
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "bad").is_transient());
        assert!(!classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
    }

    #[test]
    fn from_config_requires_base_url() {
        let pc = ProviderConfig {
            name: "remote".into(),
            kind: fg_domain::config::ProviderKind::Managed,
            priority: 1,
            languages: vec!["python".into()],
            default_timeout_secs: None,
            runtime: "docker".into(),
            base_url: None,
            api_key_env: None,
        };
        assert!(ManagedProvider::from_config(descriptor(), &pc).is_err());
    }

    #[tokio::test]
    async fn unreachable_service_is_transient() {
        // Port 9 (discard) on localhost is essentially never listening.
        let provider = ManagedProvider::new(descriptor(), "http://127.0.0.1:9", None).unwrap();
        let req = ExecutionRequest {
            language: language::lookup("python").unwrap(),
            code: "print(1)".into(),
            stdin: None,
            mode: ExecMode::Run,
            timeout: Duration::from_secs(2),
            limits: Limits {
                memory_mb: 128,
                cpus: 1.0,
                allow_network: false,
                max_output_bytes: 1024,
            },
        };
        let err = provider.execute(&req, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }
}
