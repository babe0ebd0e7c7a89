use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging and trace export
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `[observability]`: how `facadegw serve` logs and exports traces.
///
/// JSON logs always go to stdout.  `otlp_endpoint` additionally ships every
/// dispatch, roundtrip and sandbox span to an OTLP/gRPC collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// Collector address, e.g. `http://localhost:4317`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Reported as the `service.name` resource attribute.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of traces exported, decided once per trace id.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl ObservabilityConfig {
    /// Whether spans leave the process at all.
    pub fn exports_traces(&self) -> bool {
        self.otlp_endpoint
            .as_deref()
            .is_some_and(|endpoint| !endpoint.trim().is_empty())
            && self.sampling_ratio() > 0.0
    }

    /// `sample_rate` clamped into `[0, 1]`; NaN samples nothing.
    pub fn sampling_ratio(&self) -> f64 {
        if self.sample_rate.is_nan() {
            0.0
        } else {
            self.sample_rate.clamp(0.0, 1.0)
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

fn d_log_filter() -> String {
    "info,fg_gateway=debug".into()
}

fn d_service_name() -> String {
    "facadegw".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
