//! AppState construction and background-task spawning.
//!
//! Shared by `serve` and the one-shot `dispatch` command so both boot the
//! same runtime; only `serve` binds a listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use fg_domain::command::Domain;
use fg_domain::config::{Config, ConfigSeverity};
use fg_sandbox::ExecutionOrchestrator;
use fg_tools::{LocalProjects, ProjectFiles, RoundtripSettings, TransactionManager};

use crate::dispatcher::Dispatcher;
use crate::handlers::{CodeHandler, FilesHandler, HydrationHandler, RecordsHandler, SearchHandler};
use crate::rate_limit::RateLimiter;
use crate::registry::{DomainHandler, DomainRegistry};
use crate::state::AppState;
use crate::store::{MemoryRecordStore, RecordStore};

/// How often idle rate-limit buckets are dropped.
const BUCKET_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Log every config issue and fail on errors.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }
    Ok(())
}

/// Wire every facade into a registry, honoring the `[domains]` switches.
pub fn build_registry(
    config: &Config,
    transactions: Arc<TransactionManager>,
    orchestrator: Arc<ExecutionOrchestrator>,
    records: Arc<dyn RecordStore>,
) -> DomainRegistry {
    let crud: Arc<dyn DomainHandler> = Arc::new(RecordsHandler::new(records.clone()));
    let mut registry = DomainRegistry::new();
    for domain in Domain::ALL {
        let handler: Arc<dyn DomainHandler> = match domain {
            Domain::Memories | Domain::Knowledge | Domain::Projects | Domain::Conversations => {
                crud.clone()
            }
            Domain::Files => Arc::new(FilesHandler::new(transactions.clone())),
            Domain::Code => Arc::new(CodeHandler::new(orchestrator.clone())),
            Domain::Search => Arc::new(SearchHandler::new(records.clone())),
            Domain::Hydration => Arc::new(HydrationHandler::new(records.clone())),
        };
        registry.register(domain, handler, config.domains.is_enabled(domain));
    }
    registry
}

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    check_config(&config)?;

    // ── Files / roundtrip ────────────────────────────────────────────
    let projects_root = &config.files.projects_root;
    std::fs::create_dir_all(projects_root)
        .with_context(|| format!("creating projects root {}", projects_root.display()))?;
    let projects: Arc<dyn ProjectFiles> = Arc::new(LocalProjects::new(projects_root.clone()));
    let transactions = Arc::new(TransactionManager::new(
        projects,
        RoundtripSettings::from(&config.files),
    ));
    tracing::info!(
        root = %projects_root.display(),
        ttl_secs = config.files.manifest_ttl_secs,
        "transaction manager ready"
    );

    // ── Execution providers ──────────────────────────────────────────
    let orchestrator = Arc::new(
        ExecutionOrchestrator::from_config(&config.execution)
            .context("initializing sandbox providers")?,
    );
    if orchestrator.registry().is_empty() {
        tracing::info!("no sandbox providers initialized; code execution is unavailable");
    } else {
        tracing::info!(
            providers = ?orchestrator.registry().list_providers(),
            "execution orchestrator ready"
        );
    }

    // ── Records ──────────────────────────────────────────────────────
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());

    // ── Registry + dispatcher ────────────────────────────────────────
    let registry = build_registry(&config, transactions.clone(), orchestrator.clone(), records.clone());
    tracing::info!(
        enabled = registry.domains().iter().filter(|d| d.enabled).count(),
        total = registry.len(),
        "domain registry ready"
    );
    let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), limiter));

    // ── API token (read once) ────────────────────────────────────────
    let api_token_hash = std::env::var(&config.server.api_token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| Sha256::digest(t.as_bytes()).to_vec());
    if api_token_hash.is_none() {
        tracing::warn!(
            env = %config.server.api_token_env,
            "API token not set; /v1 endpoints are unauthenticated"
        );
    }

    Ok(AppState {
        config,
        dispatcher,
        transactions,
        orchestrator,
        records,
        api_token_hash,
    })
}

/// Manifest sweeper and rate-limit bucket pruning.
pub fn spawn_background_tasks(state: &AppState) {
    let every = Duration::from_secs(state.config.files.sweep_interval_secs.max(1));
    TransactionManager::spawn_sweeper(&state.transactions, every);

    let limiter = state.dispatcher.rate_limiter().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BUCKET_PRUNE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = limiter.prune();
            if pruned > 0 {
                tracing::debug!(pruned, remaining = limiter.bucket_count(), "rate-limit buckets pruned");
            }
        }
    });
}
