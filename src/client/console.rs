//! Production-shaped [`GraphClient`]: shells out to the `nebula-console`
//! binary, the same way [`crate::remote::SshExec`] shells out to `ssh` --
//! the real RPC wire protocol is an out-of-scope external collaborator, so
//! this crate talks to a cluster the same way an operator's terminal does
//! rather than embedding a thrift client.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::instrument;

use super::{ClientError, DataSet, ErrorCode, GraphClient, Row};

/// Session state guarded by one mutex so `execute` is safe under
/// concurrent callers (SPEC_FULL.md §5): the current space name, restored
/// transparently after a reconnect, mirroring the source's behavior.
struct Session {
    connected: bool,
    current_space: Option<String>,
}

pub struct ConsoleGraphClient {
    address: String,
    console_path: String,
    session: Mutex<Session>,
}

impl ConsoleGraphClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_console_path(address, "nebula-console")
    }

    pub fn with_console_path(address: impl Into<String>, console_path: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            console_path: console_path.into(),
            session: Mutex::new(Session { connected: false, current_space: None }),
        }
    }

    fn parse_table(stdout: &str) -> DataSet {
        let mut rows = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() || !line.starts_with('|') {
                continue;
            }
            let columns: Vec<String> = line
                .trim_matches('|')
                .split('|')
                .map(|c| c.trim().trim_matches('"').to_string())
                .collect();
            // The header row repeats the column names, which also arrive
            // quoted the same way -- callers ignore row 0 when it isn't
            // data, same as the original's header-skipping client wrapper.
            rows.push(Row { columns });
        }
        DataSet { rows }
    }
}

#[async_trait]
impl GraphClient for ConsoleGraphClient {
    #[instrument(skip(self, password))]
    async fn connect(&self, username: &str, password: &str) -> ErrorCode {
        let probe = format!("-addr {} -u {} -p {} -e 'SHOW HOSTS;'", self.address, username, password);
        match Command::new(&self.console_path).arg(probe).output().await {
            Ok(out) if out.status.success() => {
                self.session.lock().await.connected = true;
                ErrorCode::Succeeded
            }
            Ok(_) => ErrorCode::ERpcFailure,
            Err(_) => ErrorCode::ERpcFailure,
        }
    }

    async fn execute(&self, statement: &str) -> Result<(ErrorCode, DataSet, Option<String>), ClientError> {
        let connected = self.session.lock().await.connected;
        if !connected {
            return Err(ClientError::Disconnected);
        }

        let arg = format!("-addr {} -e '{}'", self.address, statement.replace('\'', "'\\''"));
        let out = Command::new(&self.console_path)
            .arg(arg)
            .output()
            .await
            .map_err(|e| ClientError::RpcFailure(e.to_string()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
            return Ok((ErrorCode::EExecutionError, DataSet::default(), Some(stderr)));
        }

        let stdout = String::from_utf8_lossy(&out.stdout);
        if statement.trim_start().to_uppercase().starts_with("USE ") {
            let space = statement.trim_start()[4..].trim_end_matches(';').trim().to_string();
            self.session.lock().await.current_space = Some(space.clone());
            return Ok((ErrorCode::Succeeded, DataSet::default(), Some(space)));
        }

        let space = self.session.lock().await.current_space.clone();
        Ok((ErrorCode::Succeeded, Self::parse_table(&stdout), space))
    }

    async fn disconnect(&self) {
        self.session.lock().await.connected = false;
    }

    fn server_address(&self) -> String {
        self.address.clone()
    }
}

/// Convenience constructor matching the action taxonomy's `Arc<dyn
/// GraphClient>` ownership shape.
pub fn console_client(address: impl Into<String>) -> Arc<dyn GraphClient> {
    Arc::new(ConsoleGraphClient::new(address))
}
