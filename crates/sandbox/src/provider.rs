//! The sandbox provider seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use fg_domain::config::ExecutionConfig;

use crate::language::Language;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    Run,
    /// Syntax check only.
    Check,
}

/// Resource ceilings passed through to every provider.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub memory_mb: u64,
    pub cpus: f64,
    pub allow_network: bool,
    pub max_output_bytes: usize,
}

impl From<&ExecutionConfig> for Limits {
    fn from(cfg: &ExecutionConfig) -> Self {
        Self {
            memory_mb: cfg.memory_mb,
            cpus: cfg.cpus,
            allow_network: cfg.allow_network,
            max_output_bytes: cfg.max_output_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub language: &'static Language,
    pub code: String,
    pub stdin: Option<String>,
    pub mode: ExecMode,
    pub timeout: Duration,
    pub limits: Limits,
}

/// What the sandboxed program did.  A non-zero exit is still an output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration_ms: u64,
}

/// Provider-level failures.  Only `Unavailable` triggers fallback.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The backend could not be reached or refused the work (transient).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the work and then broke.
    #[error("failed: {0}")]
    Failed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static facts about a provider, loaded from config at startup.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Lower runs first.
    pub priority: u32,
    /// Canonical language ids.
    pub languages: Vec<String>,
    pub default_timeout: Option<Duration>,
}

impl ProviderDescriptor {
    pub fn supports(&self, language_id: &str) -> bool {
        self.languages.iter().any(|l| l == language_id)
    }
}

/// One execution backend.
///
/// Implementations own teardown: every sandbox they create must be gone
/// when `execute` returns or when `cancel` fires, whichever comes first.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    async fn execute(
        &self,
        req: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ProviderError>;
}
