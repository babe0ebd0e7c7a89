#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use fg_domain::config::Config;
use fg_domain::envelope::RequestEnvelope;
use fg_gateway::bootstrap::build_registry;
use fg_gateway::dispatcher::{Dispatched, Dispatcher};
use fg_gateway::rate_limit::RateLimiter;
use fg_gateway::state::AppState;
use fg_gateway::store::{MemoryRecordStore, RecordStore};
use fg_sandbox::{
    ExecutionOrchestrator, ExecutionOutput, ExecutionRequest, ProviderDescriptor, ProviderError,
    ProviderRegistry, SandboxProvider,
};
use fg_tools::{LocalProjects, ProjectFiles, RoundtripSettings, TransactionManager};

pub const PROJECT: &str = "demo";

/// A fully wired gateway over a temp projects root and scripted sandboxes.
pub struct Harness {
    _root: TempDir,
    pub project_dir: PathBuf,
    pub state: AppState,
}

impl Harness {
    pub fn new(config: Config, providers: Vec<Arc<dyn SandboxProvider>>) -> Self {
        let root = TempDir::new().unwrap();
        let project_dir = root.path().join(PROJECT);
        std::fs::create_dir_all(&project_dir).unwrap();

        let mut config = config;
        config.files.projects_root = root.path().to_path_buf();
        let config = Arc::new(config);

        let projects: Arc<dyn ProjectFiles> = Arc::new(LocalProjects::new(root.path()));
        let transactions = Arc::new(TransactionManager::new(
            projects,
            RoundtripSettings::from(&config.files),
        ));
        let orchestrator = Arc::new(ExecutionOrchestrator::new(
            ProviderRegistry::new(providers),
            &config.execution,
        ));
        let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let registry = build_registry(
            &config,
            transactions.clone(),
            orchestrator.clone(),
            records.clone(),
        );
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), limiter));

        Self {
            _root: root,
            project_dir,
            state: AppState {
                config,
                dispatcher,
                transactions,
                orchestrator,
                records,
                api_token_hash: None,
            },
        }
    }

    pub fn write(&self, name: &str, content: &str) {
        let path = self.project_dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.project_dir.join(name)).unwrap()
    }

    pub async fn call(&self, domain: &str, cmd: &str, params: Value) -> Dispatched {
        self.call_as("tester", domain, cmd, params).await
    }

    pub async fn call_as(&self, caller: &str, domain: &str, cmd: &str, params: Value) -> Dispatched {
        self.state
            .dispatcher
            .dispatch(domain, RequestEnvelope::new(cmd, params), caller)
            .await
    }
}

/// `data` of a successful envelope; panics with the error otherwise.
pub fn data(dispatched: &Dispatched) -> &Value {
    assert!(
        dispatched.is_ok(),
        "expected ok, got {:?}",
        dispatched.response.error
    );
    dispatched.response.data.as_ref().unwrap()
}

// ── Scripted sandbox ──────────────────────────────────────────────────

#[derive(Clone)]
pub enum Script {
    Unavailable,
    Prints(&'static str),
    TimesOut,
    /// Ignores its timeout and runs until cancelled, then raises the flag.
    Hangs(Arc<AtomicBool>),
}

pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    script: Script,
}

impl ScriptedProvider {
    pub fn shared(name: &str, priority: u32, script: Script) -> Arc<dyn SandboxProvider> {
        Arc::new(Self {
            descriptor: ProviderDescriptor {
                name: name.into(),
                priority,
                languages: vec!["python".into(), "bash".into()],
                default_timeout: None,
            },
            script,
        })
    }
}

#[async_trait]
impl SandboxProvider for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _req: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ProviderError> {
        match &self.script {
            Script::Unavailable => Err(ProviderError::Unavailable("backend offline".into())),
            Script::Prints(out) => Ok(ExecutionOutput {
                stdout: (*out).into(),
                exit_code: Some(0),
                duration_ms: 12,
                ..Default::default()
            }),
            Script::TimesOut => Ok(ExecutionOutput {
                exit_code: None,
                timed_out: true,
                duration_ms: 1000,
                ..Default::default()
            }),
            Script::Hangs(cancelled) => {
                let cancelled = cancelled.clone();
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    cancelled.store(true, Ordering::SeqCst);
                });
                std::future::pending::<()>().await;
                Ok(ExecutionOutput::default())
            }
        }
    }
}
