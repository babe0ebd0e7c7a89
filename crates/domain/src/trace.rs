use serde::Serialize;

/// Structured trace events emitted across all facadegw crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    CommandDispatched {
        domain: String,
        cmd: String,
        ok: bool,
        error_code: Option<String>,
        duration_ms: u64,
    },
    RateLimitDenied {
        operation_class: String,
        retry_after_secs: u64,
    },
    RoundtripStarted {
        manifest_id: String,
        project_id: String,
        paths: usize,
    },
    RoundtripPreviewed {
        manifest_id: String,
        changes: usize,
        conflicts: usize,
    },
    RoundtripCommitted {
        manifest_id: String,
        files_written: usize,
        files_deleted: usize,
    },
    RoundtripAborted {
        manifest_id: String,
        reason: String,
    },
    ProviderFallback {
        from_provider: String,
        to_provider: Option<String>,
        language: String,
        reason: String,
    },
    ExecutionFinished {
        provider: String,
        language: String,
        exit_code: Option<i32>,
        timed_out: bool,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "fg_event");
    }
}
