//! # Database client (§6 external interface)
//!
//! ## Para todos entenderem:
//!
//! As ações de query (`WriteCircle`, `WalkThrough`) e as ações de meta
//! (`CreateSpace`, `BalanceData`, ...) nunca falam com o cluster
//! diretamente: elas recebem um `Arc<dyn GraphClient>` e só usam
//! `connect`/`execute`/`disconnect`. Isso permite testar toda a lógica de
//! retry e parsing de resposta com [`fake::FakeGraphClient`], sem um
//! cluster de verdade.
//!
//! Grounded in `nebula/client/GraphClient.h`.

pub mod console;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Succeeded,
    ERpcFailure,
    EDisconnected,
    EExecutionError,
}

impl ErrorCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ErrorCode::Succeeded)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rpc failure: {0}")]
    RpcFailure(String),
    #[error("disconnected")]
    Disconnected,
    #[error("execution error: {0}")]
    Execution(String),
}

/// One row of a [`DataSet`]: heterogeneous columns, typed accessors rather
/// than a single `Value` type since the wire format keeps string/int/
/// double columns distinct.
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub columns: Vec<String>,
}

impl Row {
    pub fn col(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataSet {
    pub rows: Vec<Row>,
}

impl DataSet {
    pub fn single_row(row: Row) -> Self {
        Self { rows: vec![row] }
    }
}

/// One database client per plan (SPEC_FULL.md §5): `execute` must be safe
/// under concurrent callers, so implementations guard their session with
/// their own interior mutex rather than relying on callers to serialize.
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn connect(&self, username: &str, password: &str) -> ErrorCode;

    /// Returns the result set plus an optional error message and the
    /// space name the statement executed against (mirrors the source
    /// restoring the current-space context after a reconnect).
    async fn execute(&self, statement: &str) -> Result<(ErrorCode, DataSet, Option<String>), ClientError>;

    async fn disconnect(&self);

    fn server_address(&self) -> String;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use tokio::sync::Mutex;

    /// Scripted responses keyed by exact statement text; records every
    /// invocation so tests can assert retry counts.
    pub struct FakeGraphClient {
        address: String,
        responses: std::collections::HashMap<String, (ErrorCode, DataSet)>,
        pub invocations: Mutex<Vec<String>>,
    }

    impl FakeGraphClient {
        pub fn new(address: impl Into<String>) -> Self {
            Self { address: address.into(), responses: std::collections::HashMap::new(), invocations: Mutex::new(Vec::new()) }
        }

        pub fn with_response(mut self, stmt: &str, code: ErrorCode, data: DataSet) -> Self {
            self.responses.insert(stmt.to_string(), (code, data));
            self
        }
    }

    #[async_trait]
    impl GraphClient for FakeGraphClient {
        async fn connect(&self, _username: &str, _password: &str) -> ErrorCode {
            ErrorCode::Succeeded
        }

        async fn execute(&self, statement: &str) -> Result<(ErrorCode, DataSet, Option<String>), ClientError> {
            self.invocations.lock().await.push(statement.to_string());
            match self.responses.get(statement) {
                Some((code, data)) => Ok((*code, data.clone(), None)),
                None => Ok((ErrorCode::Succeeded, DataSet::default(), None)),
            }
        }

        async fn disconnect(&self) {}

        fn server_address(&self) -> String {
            self.address.clone()
        }
    }
}
