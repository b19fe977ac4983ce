//! Child-process backend.
//!
//! Each execution gets a fresh temporary directory and an interpreter
//! process with an empty environment, `RLIMIT_AS`/`RLIMIT_CPU` ceilings and,
//! on Linux, new user and network namespaces. If isolation cannot be set up
//! the run fails closed as `Crashed`.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::resource::{setrlimit, Resource as Limit};
use nix::sys::signal::Signal;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use super::executor::SandboxExecutor;
use super::result::{ExecutionResult, Resource};
use super::settings::ProcessSettings;

const AGENT_FILE: &str = "agent.py";
const RUNNER_FILE: &str = "runner.py";
const STDERR_LIMIT: usize = 16 * 1024;
const STDERR_TAIL: usize = 400;

const RUNNER: &str = r#"import json
import sys

sys.path.insert(0, sys.argv[1])
from agent import decide

state = json.load(sys.stdin)
json.dump(decide(state), sys.stdout)
"#;

pub struct ProcessSandbox {
    settings: ProcessSettings,
}

impl ProcessSandbox {
    pub fn new(settings: ProcessSettings) -> Self {
        Self { settings }
    }

    /// Write the code (and harness) into `dir`, returning the script to run.
    fn prepare(&self, dir: &Path, code: &str) -> std::io::Result<PathBuf> {
        if self.settings.harness {
            std::fs::write(dir.join(AGENT_FILE), code)?;
            let runner = dir.join(RUNNER_FILE);
            std::fs::write(&runner, RUNNER)?;
            Ok(runner)
        } else {
            let script = dir.join(AGENT_FILE);
            std::fs::write(&script, code)?;
            Ok(script)
        }
    }

    fn command(&self, dir: &Path, script: &Path) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.args).arg(script);
        if self.settings.harness {
            cmd.arg(dir);
        }
        cmd.current_dir(dir)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let memory_bytes = self.settings.memory_limit_mb * 1024 * 1024;
        let cpu_secs = self.settings.cpu_time_limit_secs;
        let isolate_net = self.settings.network_disabled;

        // SAFETY: runs between fork and exec; only issues setrlimit/unshare.
        unsafe {
            cmd.pre_exec(move || {
                setrlimit(Limit::RLIMIT_AS, memory_bytes, memory_bytes)
                    .map_err(std::io::Error::from)?;
                if cpu_secs > 0 {
                    // Soft limit raises SIGXCPU; hard limit one second later kills.
                    setrlimit(Limit::RLIMIT_CPU, cpu_secs, cpu_secs + 1)
                        .map_err(std::io::Error::from)?;
                }
                if isolate_net {
                    isolate_network()?;
                }
                Ok(())
            });
        }
        cmd
    }

    async fn run(&self, code: &str, input: &Value) -> ExecutionResult {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        let workdir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => return ExecutionResult::crashed(format!("workspace setup failed: {e}"), 0),
        };
        let script = match self.prepare(workdir.path(), code) {
            Ok(path) => path,
            Err(e) => return ExecutionResult::crashed(format!("workspace setup failed: {e}"), 0),
        };

        let mut child = match self.command(workdir.path(), &script).spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::crashed(format!("isolation setup failed: {e}"), elapsed())
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // The code may exit without reading its input.
            let _ = stdin.write_all(input.to_string().as_bytes()).await;
        }

        let limit = self.settings.max_output_bytes;
        let (stdout, stderr) = tokio::join!(
            read_bounded(child.stdout.take(), limit, false),
            read_bounded(child.stderr.take(), STDERR_LIMIT, true),
        );

        let stdout = match stdout {
            Ok((_, true)) => {
                let _ = child.start_kill();
                return ExecutionResult::resource_exceeded(
                    Resource::Output,
                    format!("output exceeded {limit} bytes"),
                    elapsed(),
                );
            }
            Ok((bytes, false)) => bytes,
            Err(e) => return ExecutionResult::crashed(format!("reading output: {e}"), elapsed()),
        };
        let stderr = stderr.map(|(bytes, _)| bytes).unwrap_or_default();

        match child.wait().await {
            Ok(status) => classify(status, &stdout, &stderr, elapsed()),
            Err(e) => ExecutionResult::crashed(format!("waiting for process: {e}"), elapsed()),
        }
    }
}

#[cfg(target_os = "linux")]
fn isolate_network() -> std::io::Result<()> {
    use nix::sched::{unshare, CloneFlags};
    unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNET).map_err(std::io::Error::from)
}

#[cfg(not(target_os = "linux"))]
fn isolate_network() -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "network isolation requires Linux namespaces",
    ))
}

/// Read at most `limit` bytes. The flag reports whether more was available.
/// With `drain`, the rest of the stream is discarded so the child never
/// blocks on a full pipe.
async fn read_bounded<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
    drain: bool,
) -> std::io::Result<(Vec<u8>, bool)> {
    let Some(reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    let mut limited = reader.take(limit as u64 + 1);
    limited.read_to_end(&mut buf).await?;
    let overflow = buf.len() > limit;
    buf.truncate(limit);
    if overflow && drain {
        let mut rest = limited.into_inner();
        tokio::io::copy(&mut rest, &mut tokio::io::sink()).await?;
    }
    Ok((buf, overflow))
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

fn classify(status: ExitStatus, stdout: &[u8], stderr: &[u8], elapsed_ms: u64) -> ExecutionResult {
    if let Some(signo) = status.signal() {
        return match Signal::try_from(signo) {
            Ok(Signal::SIGXCPU) => ExecutionResult::resource_exceeded(
                Resource::Cpu,
                "cpu time limit reached",
                elapsed_ms,
            ),
            Ok(Signal::SIGKILL) => ExecutionResult::resource_exceeded(
                Resource::Memory,
                "killed by SIGKILL",
                elapsed_ms,
            ),
            Ok(Signal::SIGSEGV) | Ok(Signal::SIGBUS) => ExecutionResult::resource_exceeded(
                Resource::Memory,
                "invalid memory access",
                elapsed_ms,
            ),
            Ok(other) => {
                ExecutionResult::crashed(format!("terminated by {}", other.as_str()), elapsed_ms)
            }
            Err(_) => ExecutionResult::crashed(format!("terminated by signal {signo}"), elapsed_ms),
        };
    }

    let stderr_text = String::from_utf8_lossy(stderr);
    if stderr_text.contains("MemoryError") || stderr_text.contains("Cannot allocate memory") {
        return ExecutionResult::resource_exceeded(Resource::Memory, tail(stderr), elapsed_ms);
    }

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        return ExecutionResult::crashed(format!("exit code {code}: {}", tail(stderr)), elapsed_ms);
    }

    match serde_json::from_slice::<Value>(stdout) {
        Ok(output) => ExecutionResult::success(output, elapsed_ms),
        Err(e) => {
            debug!(error = %e, bytes = stdout.len(), "agent output is not JSON");
            ExecutionResult::crashed(format!("invalid output: {e}"), elapsed_ms)
        }
    }
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    async fn execute(&self, code: &str, input: &Value, timeout: Duration) -> ExecutionResult {
        match tokio::time::timeout(timeout, self.run(code, input)).await {
            Ok(result) => result,
            Err(_elapsed) => ExecutionResult::timeout(timeout.as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::result::ExecutionStatus;

    fn exit_with(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }

    fn killed_by(signal: Signal) -> ExitStatus {
        ExitStatus::from_raw(signal as i32)
    }

    #[test]
    fn test_classify_json_success() {
        let r = classify(exit_with(0), br#"{"done": true}"#, b"", 7);
        assert_eq!(r.output().unwrap()["done"], true);
        assert_eq!(r.elapsed_ms, 7);
    }

    #[test]
    fn test_classify_bad_json_crashes() {
        let r = classify(exit_with(0), b"hello", b"", 1);
        match r.status {
            ExecutionStatus::Crashed { reason } => assert!(reason.starts_with("invalid output")),
            other => panic!("expected Crashed, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_nonzero_exit_keeps_stderr_tail() {
        let r = classify(exit_with(1), b"", b"Traceback\nValueError: boom\n", 1);
        match r.status {
            ExecutionStatus::Crashed { reason } => {
                assert!(reason.contains("exit code 1"));
                assert!(reason.contains("ValueError: boom"));
            }
            other => panic!("expected Crashed, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_signals() {
        let cpu = classify(killed_by(Signal::SIGXCPU), b"", b"", 1);
        assert!(matches!(
            cpu.status,
            ExecutionStatus::ResourceExceeded { resource: Resource::Cpu, .. }
        ));
        let mem = classify(killed_by(Signal::SIGKILL), b"", b"", 1);
        assert!(matches!(
            mem.status,
            ExecutionStatus::ResourceExceeded { resource: Resource::Memory, .. }
        ));
        let term = classify(killed_by(Signal::SIGTERM), b"", b"", 1);
        assert!(matches!(term.status, ExecutionStatus::Crashed { .. }));
    }

    #[test]
    fn test_classify_memory_error_on_stderr() {
        let r = classify(exit_with(1), b"", b"MemoryError\n", 1);
        assert!(matches!(
            r.status,
            ExecutionStatus::ResourceExceeded { resource: Resource::Memory, .. }
        ));
    }

    #[test]
    fn test_tail_is_bounded() {
        let long = "x".repeat(5_000);
        assert!(tail(long.as_bytes()).len() <= STDERR_TAIL + 1);
    }
}
