//! # Remote-command facility (§6)
//!
//! The narrow external collaborator the action taxonomy's lifecycle and
//! disturb actions shell out through: run a command on a remote host over
//! SSH, get back an exit code plus captured stdout/stderr. Grounded in the
//! original's `utils/SshHelper.h`.

pub mod target;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum RemoteExecError {
    #[error("failed to spawn ssh: {0}")]
    Spawn(String),
    #[error("io error communicating with remote process: {0}")]
    Io(String),
}

#[derive(Debug, Clone)]
pub struct RemoteOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs a command on a remote host and returns its captured output.
///
/// Contract (SPEC_FULL.md §6): synchronous from the caller's point of view
/// (the `async fn` resolves only once the remote process exits); stdout
/// and stderr are buffered whole, not streamed incrementally.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn run(&self, command: &str, host: &str, owner: Option<&str>) -> Result<RemoteOutput, RemoteExecError>;
}

/// Shells out to the system `ssh` binary. This is the only implementation
/// shipped for production use; the real transport (auth, known_hosts,
/// multiplexing) is an out-of-scope external collaborator per spec.md §1.
pub struct SshExec;

#[async_trait]
impl RemoteExec for SshExec {
    #[instrument(skip(self))]
    async fn run(&self, command: &str, host: &str, owner: Option<&str>) -> Result<RemoteOutput, RemoteExecError> {
        let target = match owner {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        };

        let start = std::time::Instant::now();
        let output = Command::new("ssh")
            .arg(&target)
            .arg(command)
            .output()
            .await
            .map_err(|e| RemoteExecError::Spawn(e.to_string()))?;
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(RemoteOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms,
        })
    }
}

/// In-memory fake for tests: scripted responses keyed by exact command
/// string, recording every invocation for assertions.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    pub struct FakeRemoteExec {
        responses: HashMap<String, RemoteOutput>,
        pub invocations: Mutex<Vec<(String, String)>>,
    }

    impl FakeRemoteExec {
        pub fn new() -> Self {
            Self { responses: HashMap::new(), invocations: Mutex::new(Vec::new()) }
        }

        pub fn with_response(mut self, command: &str, output: RemoteOutput) -> Self {
            self.responses.insert(command.to_string(), output);
            self
        }
    }

    impl Default for FakeRemoteExec {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RemoteExec for FakeRemoteExec {
        async fn run(&self, command: &str, host: &str, _owner: Option<&str>) -> Result<RemoteOutput, RemoteExecError> {
            self.invocations.lock().await.push((command.to_string(), host.to_string()));
            Ok(self.responses.get(command).cloned().unwrap_or(RemoteOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
            }))
        }
    }
}
