//! Meta-action family: schema/cluster-management statements sent to a
//! graphd client, sharing one retry-and-converge `doRun` implementation.
//! Grounded in `nebula/NebulaAction.{h,cpp}`'s `MetaAction` and its
//! concrete subclasses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::action::{ActionBehavior, ActionContext, ResultCode};
use crate::client::{DataSet, ErrorCode, GraphClient};

/// Shared retry/convergence loop: every concrete meta action supplies its
/// statement text via [`command`] and, optionally, a response check via
/// [`check_resp`] (default: any successful execution is `OK`).
///
/// `retry_times` is inclusive (SPEC_FULL.md §9.3 resolves the source's
/// `while(++retry < retryTimes_)` off-by-one: `retry_times = 1` performs
/// exactly one attempt here, not zero).
#[async_trait]
pub trait MetaAction: Send + Sync {
    fn client(&self) -> &Arc<dyn GraphClient>;
    fn command(&self) -> String;
    fn retry_times(&self) -> u32 {
        32
    }

    /// Inspects a successful response; `OK` terminates the retry loop,
    /// `ErrFailedNoRetry` aborts it immediately, anything else (typically
    /// `ErrNotFinished`) triggers another attempt.
    async fn check_resp(&self, _resp: &DataSet) -> ResultCode {
        ResultCode::Ok
    }

    async fn run_meta_action(&self) -> ResultCode {
        let cmd = self.command();
        for attempt in 1..=self.retry_times() {
            match self.client().execute(&cmd).await {
                Ok((ErrorCode::Succeeded, data, _)) => {
                    let rc = self.check_resp(&data).await;
                    match rc {
                        ResultCode::Ok => {
                            info!(cmd = %cmd, "meta action converged");
                            return ResultCode::Ok;
                        }
                        ResultCode::ErrFailedNoRetry => return rc,
                        _ => {
                            warn!(attempt, cmd = %cmd, "meta action not yet converged, retrying");
                        }
                    }
                }
                Ok((code, _, err)) => {
                    warn!(attempt, cmd = %cmd, ?code, err = ?err, "meta action execution failed, retrying");
                }
                Err(e) => {
                    warn!(attempt, cmd = %cmd, error = %e, "meta action client error, retrying");
                }
            }
            tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
        }
        ResultCode::ErrFailed
    }
}

/// Adapts any [`MetaAction`] to the scheduler's [`ActionBehavior`].
pub struct MetaActionAdapter<M: MetaAction>(pub M);

#[async_trait]
impl<M: MetaAction> ActionBehavior for MetaActionAdapter<M> {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        self.0.run_meta_action().await
    }

    fn describe(&self) -> String {
        self.0.command()
    }
}

pub struct CreateSpaceAction {
    client: Arc<dyn GraphClient>,
    space_name: String,
    replica: i32,
    parts: i32,
}

impl CreateSpaceAction {
    pub fn new(client: Arc<dyn GraphClient>, space_name: impl Into<String>, replica: i32, parts: i32) -> Self {
        Self { client, space_name: space_name.into(), replica, parts }
    }
}

#[async_trait]
impl MetaAction for CreateSpaceAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        format!(
            "CREATE SPACE IF NOT EXISTS {} (replica_factor={}, partition_num={})",
            self.space_name, self.replica, self.parts
        )
    }
}

pub struct UseSpaceAction {
    client: Arc<dyn GraphClient>,
    space_name: String,
}

impl UseSpaceAction {
    pub fn new(client: Arc<dyn GraphClient>, space_name: impl Into<String>) -> Self {
        Self { client, space_name: space_name.into() }
    }
}

#[async_trait]
impl MetaAction for UseSpaceAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        format!("USE {}", self.space_name)
    }
}

/// `true` creates an edge type, `false` a tag.
pub struct CreateSchemaAction {
    client: Arc<dyn GraphClient>,
    name: String,
    props: Vec<(String, String)>,
    is_edge: bool,
}

impl CreateSchemaAction {
    pub fn new(client: Arc<dyn GraphClient>, name: impl Into<String>, props: Vec<(String, String)>, is_edge: bool) -> Self {
        Self { client, name: name.into(), props, is_edge }
    }
}

#[async_trait]
impl MetaAction for CreateSchemaAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        let kind = if self.is_edge { "EDGE" } else { "TAG" };
        let mut cmd = format!("CREATE {kind} IF NOT EXISTS {}", self.name);
        if self.props.is_empty() {
            return cmd;
        }
        let body = self
            .props
            .iter()
            .map(|(name, ty)| format!("{name} {ty}"))
            .collect::<Vec<_>>()
            .join(",");
        cmd.push('(');
        cmd.push_str(&body);
        cmd.push(')');
        cmd
    }
}

/// Must be scheduled after a `UseSpaceAction` on the same space.
pub struct BalanceLeaderAction {
    client: Arc<dyn GraphClient>,
}

impl BalanceLeaderAction {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetaAction for BalanceLeaderAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        "balance leader".to_string()
    }
}

/// Must be scheduled after a `UseSpaceAction` on the same space. Keeps
/// retrying while the response isn't yet "The cluster is balanced!".
pub struct BalanceDataAction {
    client: Arc<dyn GraphClient>,
    retry_times: u32,
}

impl BalanceDataAction {
    pub fn new(client: Arc<dyn GraphClient>, retry_times: u32) -> Self {
        Self { client, retry_times }
    }
}

#[async_trait]
impl MetaAction for BalanceDataAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        "balance data".to_string()
    }

    fn retry_times(&self) -> u32 {
        self.retry_times
    }

    async fn check_resp(&self, resp: &DataSet) -> ResultCode {
        let converged = resp
            .rows
            .last()
            .and_then(|row| row.col(0))
            .map(|s| s.contains("The cluster is balanced!"))
            .unwrap_or(false);
        if converged {
            ResultCode::Ok
        } else {
            ResultCode::ErrNotFinished
        }
    }
}

/// Resolves and caches a space's numeric id by parsing `desc space`'s
/// single-row response `(spaceId, name, ...)`.
pub struct DescSpaceAction {
    client: Arc<dyn GraphClient>,
    space_name: String,
    space_id: tokio::sync::Mutex<Option<i64>>,
}

impl DescSpaceAction {
    pub fn new(client: Arc<dyn GraphClient>, space_name: impl Into<String>) -> Self {
        Self { client, space_name: space_name.into(), space_id: tokio::sync::Mutex::new(None) }
    }

    pub async fn space_id(&self) -> Option<i64> {
        *self.space_id.lock().await
    }
}

#[async_trait]
impl MetaAction for DescSpaceAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        format!("desc space {}", self.space_name)
    }

    async fn check_resp(&self, resp: &DataSet) -> ResultCode {
        let Some(row) = resp.rows.first() else {
            return ResultCode::ErrFailed;
        };
        let Some(id_col) = row.col(0) else {
            return ResultCode::ErrFailed;
        };
        match id_col.parse::<i64>() {
            Ok(id) => {
                *self.space_id.lock().await = Some(id);
                ResultCode::Ok
            }
            Err(_) => ResultCode::ErrFailed,
        }
    }
}

/// Parses `show hosts`' final "Total" row and compares the leader count
/// (column index 3) against `expected_num`.
pub struct CheckLeadersAction {
    client: Arc<dyn GraphClient>,
    expected_num: i64,
}

impl CheckLeadersAction {
    pub fn new(client: Arc<dyn GraphClient>, expected_num: i64) -> Self {
        Self { client, expected_num }
    }
}

#[async_trait]
impl MetaAction for CheckLeadersAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        "show hosts".to_string()
    }

    async fn check_resp(&self, resp: &DataSet) -> ResultCode {
        let Some(row) = resp.rows.last() else {
            warn!("CheckLeadersAction: result should not be empty");
            return ResultCode::ErrFailed;
        };
        if row.columns.len() != 6 {
            warn!(columns = row.columns.len(), "CheckLeadersAction: column count is wrong");
            return ResultCode::ErrFailed;
        }
        let is_total_row = row.col(0) == Some("Total");
        let leader_count = row.col(3).and_then(|s| s.parse::<i64>().ok());
        if is_total_row && leader_count == Some(self.expected_num) {
            ResultCode::Ok
        } else {
            warn!(?leader_count, expected = self.expected_num, "CheckLeadersAction: leader count mismatch");
            ResultCode::ErrFailed
        }
    }
}

/// `layer` must be one of `storage|meta|graph`; `name` one of
/// `disable_auto_compactions|wal_ttl` (SPEC_FULL.md §4.3).
pub struct UpdateConfigsAction {
    client: Arc<dyn GraphClient>,
    layer: String,
    name: String,
    value: String,
}

impl UpdateConfigsAction {
    pub fn new(client: Arc<dyn GraphClient>, layer: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Result<Self, String> {
        let layer = layer.into();
        let name = name.into();
        if !matches!(layer.as_str(), "storage" | "meta" | "graph") {
            return Err(format!("invalid layer: {layer}"));
        }
        if !matches!(name.as_str(), "disable_auto_compactions" | "wal_ttl") {
            return Err(format!("invalid config name: {name}"));
        }
        Ok(Self { client, layer, name, value: value.into() })
    }
}

#[async_trait]
impl MetaAction for UpdateConfigsAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        format!("UPDATE CONFIGS {}:{} = {}", self.layer, self.name, self.value)
    }
}

pub struct CompactionAction {
    client: Arc<dyn GraphClient>,
}

impl CompactionAction {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetaAction for CompactionAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        "submit job compact".to_string()
    }
}

pub struct CreateCheckpointAction {
    client: Arc<dyn GraphClient>,
}

impl CreateCheckpointAction {
    pub fn new(client: Arc<dyn GraphClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetaAction for CreateCheckpointAction {
    fn client(&self) -> &Arc<dyn GraphClient> {
        &self.client
    }

    fn command(&self) -> String {
        "CREATE SNAPSHOT".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeGraphClient;
    use crate::client::Row;

    #[tokio::test]
    async fn create_space_command_text() {
        let client = Arc::new(FakeGraphClient::new("h"));
        let a = CreateSpaceAction::new(client, "test", 3, 100);
        assert_eq!(a.command(), "CREATE SPACE IF NOT EXISTS test (replica_factor=3, partition_num=100)");
    }

    #[tokio::test]
    async fn update_configs_rejects_unknown_name() {
        let client = Arc::new(FakeGraphClient::new("h"));
        assert!(UpdateConfigsAction::new(client, "storage", "bogus", "1").is_err());
    }

    #[tokio::test]
    async fn balance_data_retries_until_converged() {
        let client = Arc::new(
            FakeGraphClient::new("h").with_response(
                "balance data",
                ErrorCode::Succeeded,
                DataSet::single_row(Row { columns: vec!["The cluster is balanced!".to_string()] }),
            ),
        );
        let a = BalanceDataAction::new(client, 5);
        assert_eq!(a.run_meta_action().await, ResultCode::Ok);
    }

    #[tokio::test]
    async fn desc_space_caches_parsed_id() {
        let client = Arc::new(
            FakeGraphClient::new("h").with_response(
                "desc space test",
                ErrorCode::Succeeded,
                DataSet::single_row(Row { columns: vec!["42".to_string(), "test".to_string()] }),
            ),
        );
        let a = DescSpaceAction::new(client, "test");
        assert_eq!(a.run_meta_action().await, ResultCode::Ok);
        assert_eq!(a.space_id().await, Some(42));
    }

    #[tokio::test]
    async fn check_leaders_matches_total_row() {
        let client = Arc::new(
            FakeGraphClient::new("h").with_response(
                "show hosts",
                ErrorCode::Succeeded,
                DataSet::single_row(Row {
                    columns: vec!["Total".to_string(), "".to_string(), "".to_string(), "3".to_string(), "".to_string(), "".to_string()],
                }),
            ),
        );
        let a = CheckLeadersAction::new(client, 3);
        assert_eq!(a.run_meta_action().await, ResultCode::Ok);
    }
}
