//! Handler process execution.
//!
//! Handlers are started fire-and-forget: [`CommandExecutor::spawn`] only
//! reports whether the process could be started. The exit status is collected
//! on a detached task and logged, without timeout or cancellation.
//!
//! # Example
//!
//! ```ignore
//! use sflow_ratewatchd::executor::{CommandExecutor, HandlerInvocation, ProcessExecutor};
//!
//! let invocation = HandlerInvocation::new("/usr/local/bin/on-alert")
//!     .env("PPS", "1200")
//!     .env("MBPS", "9.60");
//! ProcessExecutor.spawn(&invocation)?;
//! ```

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{RatewatchError, Result};

/// One handler run: executable plus environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInvocation {
    pub program: PathBuf,
    pub env: Vec<(String, String)>,
}

impl HandlerInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
        }
    }

    /// Adds an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Looks up an environment variable set on this invocation
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Starts handler processes
pub trait CommandExecutor {
    /// Starts the handler without waiting for it to finish.
    fn spawn(&self, invocation: &HandlerInvocation) -> Result<()>;
}

/// Runs handlers as real child processes on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn spawn(&self, invocation: &HandlerInvocation) -> Result<()> {
        let program = invocation.program.clone();
        debug!(handler = %program.display(), "Starting handler");

        let child = Command::new(&program)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RatewatchError::Handler {
                path: program.clone(),
                source,
            })?;

        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) => log_exit(&program, &output),
                Err(e) => {
                    warn!(handler = %program.display(), error = %e, "Failed to wait for handler");
                }
            }
        });

        Ok(())
    }
}

/// Logs a finished handler; only failures carry its output
fn log_exit(program: &Path, output: &Output) {
    if output.status.success() {
        debug!(handler = %program.display(), "Handler finished");
        return;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    // exit code is None when the handler was killed by a signal
    warn!(
        handler = %program.display(),
        exit_code = ?output.status.code(),
        stdout = %stdout.trim(),
        stderr = %stderr.trim(),
        "Handler failed"
    );
}

/// Captures invocations instead of starting processes.
///
/// Clones share the same capture buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    invocations: Arc<Mutex<Vec<HandlerInvocation>>>,
    fail: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor that records the attempt and then reports handler-not-found
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn invocations(&self) -> Vec<HandlerInvocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn spawn(&self, invocation: &HandlerInvocation) -> Result<()> {
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(invocation.clone());
        }
        if self.fail {
            return Err(RatewatchError::Handler {
                path: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "recording executor"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_env() {
        let invocation = HandlerInvocation::new("/opt/a.sh")
            .env("PPS", "10")
            .env("MBPS", "0.50");
        assert_eq!(invocation.get_env("PPS"), Some("10"));
        assert_eq!(invocation.get_env("MBPS"), Some("0.50"));
        assert_eq!(invocation.get_env("SEVERITY"), None);
    }

    #[test]
    fn test_recording_executor_shares_buffer() {
        let executor = RecordingExecutor::new();
        let handle = executor.clone();
        executor
            .spawn(&HandlerInvocation::new("/opt/a.sh"))
            .unwrap();
        assert_eq!(handle.invocations().len(), 1);
    }

    #[test]
    fn test_failing_executor() {
        let executor = RecordingExecutor::failing();
        let err = executor
            .spawn(&HandlerInvocation::new("/opt/a.sh"))
            .unwrap_err();
        assert!(err.is_handler_not_found());
        assert_eq!(executor.invocations().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_log_exit_handles_codes_and_signals() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        let program = Path::new("/opt/a.sh");
        for raw in [0, 3 << 8, 9] {
            let output = Output {
                status: ExitStatus::from_raw(raw),
                stdout: b"out\n".to_vec(),
                stderr: vec![0xff, b'e'],
            };
            log_exit(program, &output);
        }
        assert!(ExitStatus::from_raw(9).code().is_none());
    }

    #[tokio::test]
    async fn test_process_executor_missing_program() {
        let err = ProcessExecutor
            .spawn(&HandlerInvocation::new("/nonexistent/ratewatchd-handler"))
            .unwrap_err();
        assert!(err.is_handler_not_found());
    }

    #[tokio::test]
    async fn test_process_executor_starts_program() {
        // /bin/sh without args reads the null stdin and exits 0
        let invocation = HandlerInvocation::new("/bin/sh").env("PPS", "1");
        assert!(ProcessExecutor.spawn(&invocation).is_ok());
    }
}
