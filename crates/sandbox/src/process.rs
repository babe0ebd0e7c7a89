//! Child-process runner shared by the providers.
//!
//! Spawns a command with piped stdio, feeds stdin, captures stdout / stderr
//! up to a byte cap, and races the exit against the timeout and the
//! cancellation token.  The child is killed on every path that does not end
//! in a normal exit, and `kill_on_drop` covers the caller dropping us.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::provider::ExecutionOutput;

/// How long to keep draining pipes after the child was killed.  Grandchildren
/// may still hold them open.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub workdir: Option<PathBuf>,
    /// Environment passed to the child.  The parent environment is cleared
    /// except for `PATH`.
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            workdir: None,
            env: Vec::new(),
            timeout: Duration::from_secs(30),
            max_output_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub output: ExecutionOutput,
    pub termination: Termination,
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                // Keep draining past the cap so the child never blocks on a full pipe.
                let room = cap.saturating_sub(buf.len());
                if n > room {
                    buf.extend_from_slice(&chunk[..room]);
                    truncated = true;
                } else {
                    buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
    (buf, truncated)
}

async fn join_reader(
    handle: tokio::task::JoinHandle<(Vec<u8>, bool)>,
    grace: Option<Duration>,
) -> (Vec<u8>, bool) {
    let abort = handle.abort_handle();
    let joined = match grace {
        Some(grace) => match tokio::time::timeout(grace, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return (Vec::new(), false);
            }
        },
        None => handle.await,
    };
    joined.unwrap_or_default()
}

/// Run `spec` to completion, timeout or cancellation.
///
/// Errors only when the process cannot be spawned.
pub async fn run(spec: ProcessSpec, cancel: CancellationToken) -> std::io::Result<ProcessOutcome> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env_clear();
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    for (k, v) in &spec.env {
        cmd.env(k, v);
    }
    if let Some(ref wd) = spec.workdir {
        cmd.current_dir(wd);
    }

    let started = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let cap = spec.max_output_bytes;
    let stdout_task = tokio::spawn(async move {
        match stdout {
            Some(out) => read_capped(out, cap).await,
            None => (Vec::new(), false),
        }
    });
    let stderr_task = tokio::spawn(async move {
        match stderr {
            Some(err) => read_capped(err, cap).await,
            None => (Vec::new(), false),
        }
    });

    if let (Some(mut stdin), Some(data)) = (child.stdin.take(), spec.stdin) {
        tokio::spawn(async move {
            let _ = stdin.write_all(&data).await;
            let _ = stdin.shutdown().await;
        });
    }

    let (exit_code, termination) = tokio::select! {
        status = child.wait() => {
            (status.ok().and_then(|s| s.code()), Termination::Exited)
        }
        _ = tokio::time::sleep(spec.timeout) => {
            let _ = child.kill().await;
            (None, Termination::TimedOut)
        }
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            (None, Termination::Cancelled)
        }
    };

    let grace = (termination != Termination::Exited).then_some(DRAIN_GRACE);
    let (stdout, out_truncated) = join_reader(stdout_task, grace).await;
    let (stderr, err_truncated) = join_reader(stderr_task, grace).await;

    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::debug!(
        program = %spec.program,
        exit_code = ?exit_code,
        termination = ?termination,
        duration_ms,
        "sandbox process finished"
    );

    Ok(ProcessOutcome {
        output: ExecutionOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            timed_out: termination == Termination::TimedOut,
            truncated: out_truncated || err_truncated,
            duration_ms,
        },
        termination,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let outcome = run(sh("echo out; echo err >&2; exit 3"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.termination, Termination::Exited);
        assert_eq!(outcome.output.stdout, "out\n");
        assert_eq!(outcome.output.stderr, "err\n");
        assert_eq!(outcome.output.exit_code, Some(3));
        assert!(!outcome.output.timed_out);
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let mut spec = sh("cat");
        spec.stdin = Some(b"hello from stdin".to_vec());
        let outcome = run(spec, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.output.stdout, "hello from stdin");
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let mut spec = sh(&format!("sleep 3; touch {}", marker.display()));
        spec.timeout = Duration::from_secs(1);

        let started = Instant::now();
        let outcome = run(spec, CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(2500));
        assert_eq!(outcome.termination, Termination::TimedOut);
        assert!(outcome.output.timed_out);
        assert_eq!(outcome.output.exit_code, None);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists(), "killed process must not finish its work");
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let mut spec = sh("sleep 5");
        spec.timeout = Duration::from_secs(10);
        let started = Instant::now();
        let outcome = run(spec, cancel).await.unwrap();
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn output_is_truncated_at_cap() {
        let mut spec = sh("head -c 5000 /dev/zero | tr '\\0' 'x'");
        spec.max_output_bytes = 1000;
        let outcome = run(spec, CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.output.stdout.len(), 1000);
        assert!(outcome.output.truncated);
    }

    #[tokio::test]
    async fn parent_environment_is_not_inherited() {
        std::env::set_var("FG_SANDBOX_TEST_SECRET", "leak");
        let outcome = run(sh("echo \"[$FG_SANDBOX_TEST_SECRET]\""), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.output.stdout, "[]\n");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let spec = ProcessSpec::new("definitely-not-a-real-binary-fg", vec![]);
        assert!(run(spec, CancellationToken::new()).await.is_err());
    }
}
