use std::sync::Arc;

use fg_domain::config::Config;
use fg_sandbox::ExecutionOrchestrator;
use fg_tools::TransactionManager;

use crate::dispatcher::Dispatcher;
use crate::store::RecordStore;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,

    // ── Domain services (also reachable through the dispatcher) ───────
    pub transactions: Arc<TransactionManager>,
    pub orchestrator: Arc<ExecutionOrchestrator>,
    pub records: Arc<dyn RecordStore>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
