use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Code execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sandbox execution configuration: limits applied to every attempt plus
/// the priority-ordered provider list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Timeout used when neither the request nor the provider sets one.
    #[serde(default = "d_30")]
    pub default_timeout_secs: u64,
    /// Requested timeouts are clamped to this ceiling.
    #[serde(default = "d_300")]
    pub max_timeout_secs: u64,
    /// Sandboxes get no network unless this is set.
    #[serde(default)]
    pub allow_network: bool,
    #[serde(default = "d_256")]
    pub memory_mb: u64,
    #[serde(default = "d_cpus")]
    pub cpus: f64,
    /// Per-stream cap on captured stdout / stderr.
    #[serde(default = "d_output_cap")]
    pub max_output_bytes: usize,
    /// Parent directory for per-invocation scratch dirs (system temp when unset).
    #[serde(default)]
    pub scratch_root: Option<PathBuf>,
    #[serde(default = "d_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            allow_network: false,
            memory_mb: 256,
            cpus: 1.0,
            max_output_bytes: d_output_cap(),
            scratch_root: None,
            providers: d_providers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local container runtime driven through its CLI (docker / podman).
    Container,
    /// Remote managed sandbox service over HTTP.
    Managed,
}

/// One execution backend.  Lower `priority` is tried first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default = "d_priority")]
    pub priority: u32,
    /// Language ids this provider accepts (see the sandbox language table).
    pub languages: Vec<String>,
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
    /// Container CLI binary (container providers only).
    #[serde(default = "d_runtime")]
    pub runtime: String,
    /// Base URL of the managed sandbox API (managed providers only).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the managed sandbox API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_30() -> u64 {
    30
}
fn d_300() -> u64 {
    300
}
fn d_256() -> u64 {
    256
}
fn d_cpus() -> f64 {
    1.0
}
fn d_output_cap() -> usize {
    1024 * 1024
}
fn d_priority() -> u32 {
    100
}
fn d_runtime() -> String {
    "docker".into()
}
fn d_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "docker".into(),
        kind: ProviderKind::Container,
        priority: 10,
        languages: vec![
            "python".into(),
            "javascript".into(),
            "typescript".into(),
            "bash".into(),
            "ruby".into(),
            "go".into(),
        ],
        default_timeout_secs: None,
        runtime: d_runtime(),
        base_url: None,
        api_key_env: None,
    }]
}
