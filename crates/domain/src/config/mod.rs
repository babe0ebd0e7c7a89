mod domains;
mod execution;
mod files;
mod observability;
mod rate_limits;
mod server;

pub use domains::*;
pub use execution::*;
pub use files::*;
pub use observability::*;
pub use rate_limits::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read once at startup; everything derived from it is immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub domains: DomainsConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: String, message: &str| {
            errors.push(ConfigError {
                severity,
                field,
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            push(ConfigSeverity::Error, "server.port".into(), "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host".into(), "host must not be empty");
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins".into(),
                "wildcard \"*\" allows all origins (not recommended for production)",
            );
        }

        let obs = &self.observability;
        if !(0.0..=1.0).contains(&obs.sample_rate) {
            push(
                ConfigSeverity::Warning,
                "observability.sample_rate".into(),
                "sample_rate outside [0, 1] is clamped",
            );
        }
        if obs.otlp_endpoint.is_some() && obs.service_name.trim().is_empty() {
            push(
                ConfigSeverity::Error,
                "observability.service_name".into(),
                "service_name must not be empty when exporting traces",
            );
        }

        // Rate limit windows.
        let limits = std::iter::once(("default".to_string(), self.rate_limits.default)).chain(
            self.rate_limits
                .classes
                .iter()
                .map(|(k, v)| (format!("classes.{k}"), *v)),
        );
        for (name, limit) in limits {
            if limit.limit == 0 {
                push(
                    ConfigSeverity::Error,
                    format!("rate_limits.{name}.limit"),
                    "limit must be greater than 0",
                );
            }
            if limit.window_secs == 0 {
                push(
                    ConfigSeverity::Error,
                    format!("rate_limits.{name}.window_secs"),
                    "window_secs must be greater than 0",
                );
            }
        }

        if self.files.manifest_ttl_secs == 0 {
            push(
                ConfigSeverity::Error,
                "files.manifest_ttl_secs".into(),
                "manifest TTL must be greater than 0",
            );
        }

        // Execution.
        let exec = &self.execution;
        if exec.default_timeout_secs == 0 {
            push(
                ConfigSeverity::Error,
                "execution.default_timeout_secs".into(),
                "default timeout must be greater than 0",
            );
        }
        if exec.max_timeout_secs < exec.default_timeout_secs {
            push(
                ConfigSeverity::Error,
                "execution.max_timeout_secs".into(),
                "max timeout must not be below the default timeout",
            );
        }
        if exec.allow_network {
            push(
                ConfigSeverity::Warning,
                "execution.allow_network".into(),
                "sandboxes will have network access",
            );
        }
        if self.domains.code && exec.providers.is_empty() {
            push(
                ConfigSeverity::Warning,
                "execution.providers".into(),
                "code domain is enabled but no execution providers are configured",
            );
        }

        let mut seen = HashSet::new();
        for (i, p) in exec.providers.iter().enumerate() {
            if p.name.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("execution.providers[{i}].name"),
                    "provider name must not be empty",
                );
            } else if !seen.insert(p.name.as_str()) {
                push(
                    ConfigSeverity::Error,
                    format!("execution.providers[{i}].name"),
                    "duplicate provider name",
                );
            }
            if p.languages.is_empty() {
                push(
                    ConfigSeverity::Warning,
                    format!("execution.providers[{i}].languages"),
                    "provider declares no languages and will never be selected",
                );
            }
            match p.kind {
                ProviderKind::Managed if p.base_url.as_deref().unwrap_or("").is_empty() => {
                    push(
                        ConfigSeverity::Error,
                        format!("execution.providers[{i}].base_url"),
                        "managed providers need a base_url",
                    );
                }
                ProviderKind::Container if p.runtime.is_empty() => {
                    push(
                        ConfigSeverity::Error,
                        format!("execution.providers[{i}].runtime"),
                        "container providers need a runtime binary",
                    );
                }
                _ => {}
            }
        }

        errors
    }
}
