//! Container provider: one throwaway container per invocation, driven
//! through the docker / podman CLI.
//!
//! The submitted source is written into a fresh scratch directory that is
//! the only host path mounted into the container.  The container runs with
//! `--rm`, no network (unless configured), memory / CPU / pid ceilings and
//! all capabilities dropped.  When the CLI does not exit on its own (timeout
//! or cancellation) the container is force-removed by name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use fg_domain::config::{ExecutionConfig, ProviderConfig};

use crate::language;
use crate::process::{self, ProcessSpec, Termination};
use crate::provider::{
    ExecMode, ExecutionOutput, ExecutionRequest, ProviderDescriptor, ProviderError,
    SandboxProvider,
};

/// Mount point of the scratch directory inside the container.
const WORKDIR: &str = "/work";

/// `docker run` exits with 125 when the daemon or the run itself failed,
/// before any user code started.
const RUNTIME_ERROR_EXIT: i32 = 125;

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ContainerProvider {
    descriptor: ProviderDescriptor,
    runtime: String,
    scratch_root: Option<PathBuf>,
}

impl ContainerProvider {
    pub fn new(descriptor: ProviderDescriptor, runtime: impl Into<String>) -> Self {
        Self {
            descriptor,
            runtime: runtime.into(),
            scratch_root: None,
        }
    }

    pub fn from_config(
        descriptor: ProviderDescriptor,
        pc: &ProviderConfig,
        exec: &ExecutionConfig,
    ) -> Self {
        Self {
            descriptor,
            runtime: pc.runtime.clone(),
            scratch_root: exec.scratch_root.clone(),
        }
    }

    /// Full `run` argument vector (without the runtime binary itself).
    pub fn run_args(
        &self,
        req: &ExecutionRequest,
        container_name: &str,
        scratch: &Path,
    ) -> Vec<String> {
        let limits = &req.limits;
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            container_name.into(),
            "--memory".into(),
            format!("{}m", limits.memory_mb),
            "--cpus".into(),
            format!("{}", limits.cpus),
            "--pids-limit".into(),
            "256".into(),
            "--cap-drop".into(),
            "ALL".into(),
            "--security-opt".into(),
            "no-new-privileges".into(),
            "--read-only".into(),
            "--tmpfs".into(),
            "/tmp:rw,size=64m".into(),
            "-e".into(),
            "HOME=/tmp".into(),
            "-v".into(),
            format!("{}:{WORKDIR}", scratch.display()),
            "-w".into(),
            WORKDIR.into(),
        ];
        if !limits.allow_network {
            args.push("--network".into());
            args.push("none".into());
        }
        if req.stdin.is_some() {
            args.push("-i".into());
        }
        args.push(req.language.image.into());

        let file = format!("{WORKDIR}/{}", req.language.file_name);
        let template = match req.mode {
            ExecMode::Run => req.language.run,
            ExecMode::Check => req.language.check,
        };
        args.extend(language::render(template, &file));
        args
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fg-sbx-");
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

/// Force-remove a container by name.  Missing containers are fine.
async fn teardown(runtime: &str, container_name: &str) {
    let args = vec!["rm".into(), "-f".into(), container_name.into()];
    let mut spec = ProcessSpec::new(runtime, args);
    spec.timeout = TEARDOWN_TIMEOUT;
    match process::run(spec, CancellationToken::new()).await {
        Ok(outcome) if outcome.output.exit_code == Some(0) => {
            tracing::debug!(container = %container_name, "sandbox container removed");
        }
        Ok(outcome) => {
            tracing::warn!(
                container = %container_name,
                stderr = %outcome.output.stderr.trim(),
                "sandbox container removal reported an error"
            );
        }
        Err(e) => {
            tracing::error!(
                container = %container_name,
                error = %e,
                "failed to run container teardown"
            );
        }
    }
}

#[async_trait]
impl SandboxProvider for ContainerProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        req: &ExecutionRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput, ProviderError> {
        let scratch = self
            .scratch_dir()
            .map_err(|e| ProviderError::Unavailable(format!("cannot create scratch dir: {e}")))?;
        let source = scratch.path().join(req.language.file_name);
        tokio::fs::write(&source, &req.code)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("cannot write source file: {e}")))?;

        let container_name = format!("fg-sbx-{}", uuid::Uuid::new_v4().simple());
        let args = self.run_args(req, &container_name, scratch.path());
        let mut spec = ProcessSpec::new(&self.runtime, args);
        spec.stdin = req.stdin.clone().map(String::into_bytes);
        spec.timeout = req.timeout;
        spec.max_output_bytes = req.limits.max_output_bytes;

        let runtime = self.runtime.clone();
        let provider = self.descriptor.name.clone();

        // Own task so teardown still runs if our caller goes away.
        let task = tokio::spawn(async move {
            let result = process::run(spec, cancel).await;
            if let Ok(outcome) = &result {
                if outcome.termination != Termination::Exited {
                    teardown(&runtime, &container_name).await;
                }
            }
            drop(scratch);
            result
        });

        let outcome = task
            .await
            .map_err(|e| ProviderError::Failed(format!("sandbox task failed: {e}")))?
            .map_err(|e| {
                ProviderError::Unavailable(format!("cannot start '{}': {e}", self.runtime))
            })?;

        if outcome.output.exit_code == Some(RUNTIME_ERROR_EXIT) {
            tracing::warn!(
                provider = %provider,
                stderr = %outcome.output.stderr.trim(),
                "container runtime refused the run"
            );
            return Err(ProviderError::Unavailable(format!(
                "container runtime error: {}",
                outcome.output.stderr.trim()
            )));
        }

        Ok(outcome.output)
    }
}
