//! Command dispatcher.
//!
//! One entry point for every facade: resolve the domain, refuse disabled
//! ones, charge the caller's budget, parse the typed command, run the
//! handler and wrap whatever comes back into the response envelope.  The
//! dispatcher is the only place that builds [`ResponseEnvelope`]s.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::Instrument;

use fg_domain::command::Command;
use fg_domain::envelope::{Outcome, RequestEnvelope, ResponseEnvelope};
use fg_domain::error::{Error, ErrorCode, Result};
use fg_domain::trace::TraceEvent;

use crate::rate_limit::RateLimiter;
use crate::registry::{CallContext, DomainRegistry};

/// A response envelope plus the bits the transport layer needs.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub response: ResponseEnvelope,
    pub error_code: Option<ErrorCode>,
    /// Set when the caller was throttled.
    pub retry_after_secs: Option<u64>,
}

impl Dispatched {
    pub fn is_ok(&self) -> bool {
        self.response.ok
    }
}

pub struct Dispatcher {
    registry: Arc<DomainRegistry>,
    limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    pub fn new(registry: Arc<DomainRegistry>, limiter: Arc<RateLimiter>) -> Self {
        Self { registry, limiter }
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Dispatch a raw JSON body.  Bodies that are not a valid envelope fail
    /// with `invalid_input`, echoing `cmd` when one can be recovered.
    pub async fn dispatch_json(&self, domain: &str, body: &[u8], caller: &str) -> Dispatched {
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                return self.reject(
                    domain,
                    String::new(),
                    Error::invalid(format!("request body is not valid JSON: {e}")),
                );
            }
        };
        let cmd = value
            .get("cmd")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<RequestEnvelope>(value) {
            Ok(envelope) => self.dispatch(domain, envelope, caller).await,
            Err(e) => self.reject(domain, cmd, Error::invalid(format!("malformed envelope: {e}"))),
        }
    }

    pub async fn dispatch(
        &self,
        domain: &str,
        envelope: RequestEnvelope,
        caller: &str,
    ) -> Dispatched {
        let span = tracing::info_span!("dispatch", domain = %domain, cmd = %envelope.cmd);
        let started = Instant::now();
        let cmd = envelope.cmd.clone();

        let result = self
            .route(domain, envelope, caller)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        let dispatched = self.finish(&cmd, result);
        TraceEvent::CommandDispatched {
            domain: domain.to_string(),
            cmd,
            ok: dispatched.is_ok(),
            error_code: dispatched.error_code.map(|c| c.as_str().to_string()),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        dispatched
    }

    async fn route(&self, domain: &str, envelope: RequestEnvelope, caller: &str) -> Result<Outcome> {
        if envelope.cmd.trim().is_empty() {
            return Err(Error::invalid("cmd must not be empty"));
        }

        let registered = self.registry.resolve(domain)?;
        if !registered.enabled {
            return Err(Error::Disabled(format!("domain '{domain}' is disabled")));
        }

        // Budget is charged only once the domain resolved and is enabled.
        let class = registered.domain.as_str();
        let decision = self.limiter.try_consume(caller, class);
        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs();
            TraceEvent::RateLimitDenied {
                operation_class: class.to_string(),
                retry_after_secs,
            }
            .emit();
            return Err(Error::RateLimited { retry_after_secs });
        }

        let command = Command::parse(registered.domain, &envelope.cmd, envelope.params)?;
        let ctx = CallContext::new(caller, envelope.detail);
        let _cancel_on_drop = ctx.cancel.clone().drop_guard();
        registered.handler.handle(command, &ctx).await
    }

    fn finish(&self, cmd: &str, result: Result<Outcome>) -> Dispatched {
        match result {
            Ok(outcome) => {
                tracing::debug!(count = ?outcome.count, "command succeeded");
                Dispatched {
                    response: ResponseEnvelope::success(cmd, outcome),
                    error_code: None,
                    retry_after_secs: None,
                }
            }
            Err(e) => self.failure(cmd, e),
        }
    }

    fn reject(&self, domain: &str, cmd: String, error: Error) -> Dispatched {
        let dispatched = self.failure(&cmd, error);
        TraceEvent::CommandDispatched {
            domain: domain.to_string(),
            cmd,
            ok: false,
            error_code: dispatched.error_code.map(|c| c.as_str().to_string()),
            duration_ms: 0,
        }
        .emit();
        dispatched
    }

    fn failure(&self, cmd: &str, error: Error) -> Dispatched {
        let code = error.code();
        let retry_after_secs = match &error {
            Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let message = if error.is_internal() {
            let correlation_id = uuid::Uuid::new_v4();
            tracing::error!(
                correlation_id = %correlation_id,
                error = %error,
                "command failed with an internal error"
            );
            format!("{} (ref {correlation_id})", error.public_message())
        } else {
            tracing::debug!(code = %code, error = %error, "command failed");
            error.public_message()
        };

        Dispatched {
            response: ResponseEnvelope::failure(cmd, format!("{code}: {message}")),
            error_code: Some(code),
            retry_after_secs,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
