//! Execution orchestrator: provider selection, fallback and timeouts.
//!
//! For a language, providers are tried in priority order.  A transient
//! provider failure moves on to the next provider; anything else (including
//! the program exiting non-zero or timing out) is final.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use fg_domain::command::{RunCode, ValidateCode};
use fg_domain::config::ExecutionConfig;
use fg_domain::error::{Error, Result};
use fg_domain::trace::TraceEvent;

use crate::language::{self, Language, LANGUAGES};
use crate::provider::{ExecMode, ExecutionOutput, ExecutionRequest, Limits};
use crate::registry::ProviderRegistry;

/// How far past an attempt's timeout the orchestrator waits before it
/// cancels the attempt itself.
const DEADLINE_GRACE: Duration = Duration::from_millis(300);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub language: &'static str,
    pub provider: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub timed_out: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub language: &'static str,
    pub provider: String,
    pub valid: bool,
    /// Checker diagnostics; empty when valid.
    pub diagnostics: String,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageInfo {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub providers: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ExecutionOrchestrator {
    registry: ProviderRegistry,
    default_timeout: Duration,
    max_timeout: Duration,
    limits: Limits,
}

impl ExecutionOrchestrator {
    pub fn new(registry: ProviderRegistry, config: &ExecutionConfig) -> Self {
        Self {
            registry,
            default_timeout: Duration::from_secs(config.default_timeout_secs),
            max_timeout: Duration::from_secs(config.max_timeout_secs),
            limits: Limits::from(config),
        }
    }

    pub fn from_config(config: &ExecutionConfig) -> Result<Self> {
        Ok(Self::new(ProviderRegistry::from_config(config)?, config))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Execute `req.code`.  A timed-out run is still `Ok` with `timed_out` set.
    pub async fn run(&self, req: &RunCode, cancel: &CancellationToken) -> Result<RunResult> {
        let requested = match req.timeout {
            Some(0) => return Err(Error::invalid("timeout must be greater than 0")),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };
        let lang = self.resolve_language(&req.language)?;
        let (provider, output) = self
            .execute(lang, &req.code, req.stdin.clone(), ExecMode::Run, requested, cancel)
            .await?;

        Ok(RunResult {
            language: lang.id,
            provider,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            execution_time_ms: output.duration_ms,
            timed_out: output.timed_out,
            truncated: output.truncated,
        })
    }

    /// Syntax-check `req.code` without running it.
    pub async fn validate(
        &self,
        req: &ValidateCode,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        let lang = self.resolve_language(&req.language)?;
        let (provider, output) = self
            .execute(lang, &req.code, None, ExecMode::Check, None, cancel)
            .await?;

        if output.timed_out {
            return Err(Error::Timeout(format!(
                "syntax check for {} exceeded its deadline",
                lang.id
            )));
        }
        let valid = output.exit_code == Some(0);
        let diagnostics = if valid {
            String::new()
        } else if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };

        Ok(ValidationResult {
            language: lang.id,
            provider,
            valid,
            diagnostics,
            execution_time_ms: output.duration_ms,
        })
    }

    /// Languages at least one registered provider accepts.
    pub fn languages(&self) -> Vec<LanguageInfo> {
        LANGUAGES
            .iter()
            .filter_map(|lang| {
                let providers: Vec<String> = self
                    .registry
                    .candidates(lang.id)
                    .iter()
                    .map(|p| p.descriptor().name.clone())
                    .collect();
                (!providers.is_empty()).then_some(LanguageInfo {
                    id: lang.id,
                    aliases: lang.aliases,
                    providers,
                })
            })
            .collect()
    }

    fn resolve_language(&self, name: &str) -> Result<&'static Language> {
        language::lookup(name)
            .filter(|lang| !self.registry.candidates(lang.id).is_empty())
            .ok_or_else(|| Error::not_found(format!("unsupported language '{name}'")))
    }

    fn attempt_timeout(
        &self,
        requested: Option<Duration>,
        provider_default: Option<Duration>,
    ) -> Duration {
        requested
            .or(provider_default)
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout)
    }

    async fn execute(
        &self,
        lang: &'static Language,
        code: &str,
        stdin: Option<String>,
        mode: ExecMode,
        requested_timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<(String, ExecutionOutput)> {
        let candidates = self.registry.candidates(lang.id);
        if candidates.is_empty() {
            return Err(Error::not_found(format!("unsupported language '{}'", lang.id)));
        }

        // Cancels the in-flight attempt when the caller cancels or drops us.
        let attempt_cancel = cancel.child_token();
        let _guard = attempt_cancel.clone().drop_guard();

        let mut failures: Vec<String> = Vec::new();
        for (idx, provider) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Timeout("execution cancelled".into()));
            }
            let descriptor = provider.descriptor();
            let request = ExecutionRequest {
                language: lang,
                code: code.to_owned(),
                stdin: stdin.clone(),
                mode,
                timeout: self.attempt_timeout(requested_timeout, descriptor.default_timeout),
                limits: self.limits,
            };

            let started = Instant::now();
            let deadline = request.timeout + DEADLINE_GRACE;
            let attempt = provider.execute(&request, attempt_cancel.clone());
            let result = match tokio::time::timeout(deadline, attempt).await {
                Ok(result) => result,
                Err(_) => {
                    // Provider overran its own timeout: tear the sandbox down.
                    attempt_cancel.cancel();
                    tracing::warn!(
                        provider = %descriptor.name,
                        language = lang.id,
                        timeout_ms = request.timeout.as_millis() as u64,
                        "provider missed its deadline, sandbox cancelled"
                    );
                    Ok(ExecutionOutput {
                        timed_out: true,
                        duration_ms: started.elapsed().as_millis() as u64,
                        ..Default::default()
                    })
                }
            };
            match result {
                Ok(output) => {
                    TraceEvent::ExecutionFinished {
                        provider: descriptor.name.clone(),
                        language: lang.id.to_string(),
                        exit_code: output.exit_code,
                        timed_out: output.timed_out,
                        duration_ms: started.elapsed().as_millis() as u64,
                    }
                    .emit();
                    return Ok((descriptor.name.clone(), output));
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        provider = %descriptor.name,
                        language = lang.id,
                        error = %e,
                        "sandbox provider unavailable, trying next"
                    );
                    TraceEvent::ProviderFallback {
                        from_provider: descriptor.name.clone(),
                        to_provider: candidates
                            .get(idx + 1)
                            .map(|p| p.descriptor().name.clone()),
                        language: lang.id.to_string(),
                        reason: e.to_string(),
                    }
                    .emit();
                    failures.push(descriptor.name.clone());
                }
                Err(e) => {
                    return Err(Error::internal(format!(
                        "provider '{}' failed: {e}",
                        descriptor.name
                    )));
                }
            }
        }

        Err(Error::ProviderUnavailable(format!(
            "every provider for {} is unavailable ({})",
            lang.id,
            failures.join(", ")
        )))
    }
}
