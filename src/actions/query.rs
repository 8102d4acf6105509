//! Database-traffic actions: connect, write a circular chain of vertices,
//! and walk it back to verify every row is reachable. Grounded in
//! `nebula/NebulaAction.{h,cpp}`'s `ClientConnectAction`, `WriteCircleAction`,
//! `WalkThroughAction`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::action::{ActionBehavior, ActionContext, ResultCode};
use crate::client::GraphClient;

/// Up to 32 linear-backoff connection attempts (SPEC_FULL.md §4.3).
pub struct ClientConnectAction {
    client: Arc<dyn GraphClient>,
    username: String,
    password: String,
}

impl ClientConnectAction {
    pub fn new(client: Arc<dyn GraphClient>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { client, username: username.into(), password: password.into() }
    }
}

#[async_trait]
impl ActionBehavior for ClientConnectAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        for retry in 1..=32u32 {
            let code = self.client.connect(&self.username, &self.password).await;
            if code.is_ok() {
                return ResultCode::Ok;
            }
            warn!(retry, "ClientConnectAction: connect failed");
            tokio::time::sleep(Duration::from_secs(retry as u64)).await;
        }
        ResultCode::ErrFailed
    }

    fn describe(&self) -> String {
        format!("Connect to {}", self.client.server_address())
    }
}

/// Inserts `total_rows` vertices in a ring (`1->2, 2->3, ..., N->1`), in
/// batches of `batch_num`, retrying each batch up to `try_num` times with
/// linearly-increasing backoff.
pub struct WriteCircleAction {
    client: Arc<dyn GraphClient>,
    tag: String,
    col: String,
    total_rows: u64,
    batch_num: u32,
    start_id: u64,
    try_num: u32,
    retry_interval_ms: u64,
}

impl WriteCircleAction {
    pub fn new(client: Arc<dyn GraphClient>, tag: impl Into<String>, col: impl Into<String>, total_rows: u64) -> Self {
        Self {
            client,
            tag: tag.into(),
            col: col.into(),
            total_rows,
            batch_num: 1,
            start_id: 1,
            try_num: 32,
            retry_interval_ms: 100,
        }
    }

    fn insert_stmt(&self, from: u64, to: u64) -> String {
        format!(
            "INSERT VERTEX {}({}) VALUES {}:({});",
            self.tag, self.col, from, to
        )
    }

    async fn send_batch(&self, stmts: &[String]) -> ResultCode {
        for attempt in 1..=self.try_num {
            let mut all_ok = true;
            for stmt in stmts {
                match self.client.execute(stmt).await {
                    Ok((code, _, _)) if code.is_ok() => {}
                    _ => {
                        all_ok = false;
                        break;
                    }
                }
            }
            if all_ok {
                return ResultCode::Ok;
            }
            warn!(attempt, "WriteCircleAction: batch failed, retrying");
            tokio::time::sleep(Duration::from_millis(self.retry_interval_ms * attempt as u64)).await;
        }
        ResultCode::ErrFailed
    }
}

#[async_trait]
impl ActionBehavior for WriteCircleAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let mut batch = Vec::with_capacity(self.batch_num as usize);
        for i in 0..self.total_rows {
            let from = self.start_id + i;
            let to = self.start_id + ((i + 1) % self.total_rows);
            batch.push(self.insert_stmt(from, to));
            if batch.len() as u32 >= self.batch_num {
                let rc = self.send_batch(&batch).await;
                if !rc.is_ok() {
                    return rc;
                }
                batch.clear();
            }
        }
        if !batch.is_empty() {
            let rc = self.send_batch(&batch).await;
            if !rc.is_ok() {
                return rc;
            }
        }
        ResultCode::Ok
    }

    fn describe(&self) -> String {
        format!("Write data to {}", self.client.server_address())
    }
}

/// Starts at a random vertex in `[0, total_rows)` and follows the ring
/// built by [`WriteCircleAction`], asserting it returns to the start after
/// exactly `total_rows` hops.
pub struct WalkThroughAction {
    client: Arc<dyn GraphClient>,
    tag: String,
    col: String,
    total_rows: u64,
    start: u64,
    try_num: u32,
    retry_interval_ms: u64,
}

impl WalkThroughAction {
    pub fn new(client: Arc<dyn GraphClient>, tag: impl Into<String>, col: impl Into<String>, total_rows: u64, start: u64) -> Self {
        Self {
            client,
            tag: tag.into(),
            col: col.into(),
            total_rows,
            start,
            try_num: 32,
            retry_interval_ms: 1,
        }
    }

    async fn send_command(&self, cmd: &str) -> Result<u64, ResultCode> {
        for attempt in 1..=self.try_num {
            match self.client.execute(cmd).await {
                Ok((code, data, _)) if code.is_ok() => {
                    let Some(row) = data.rows.first() else {
                        return Err(ResultCode::ErrFailed);
                    };
                    let Some(next_raw) = row.col(0) else {
                        return Err(ResultCode::ErrFailed);
                    };
                    return next_raw.parse::<u64>().map_err(|_| ResultCode::ErrFailed);
                }
                _ => {
                    warn!(attempt, "WalkThroughAction: query failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.retry_interval_ms * attempt as u64)).await;
                }
            }
        }
        Err(ResultCode::ErrFailed)
    }
}

#[async_trait]
impl ActionBehavior for WalkThroughAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let mut current = self.start;
        for hop in 0..self.total_rows {
            let cmd = format!(
                "FETCH PROP ON {} {} YIELD {}.{};",
                self.tag, current, self.tag, self.col
            );
            match self.send_command(&cmd).await {
                Ok(next) => current = next,
                Err(rc) => {
                    warn!(hop, "WalkThroughAction: failed to follow ring");
                    return rc;
                }
            }
        }
        if current == self.start {
            ResultCode::Ok
        } else {
            warn!(expected = self.start, got = current, "WalkThroughAction: did not return to start after total_rows hops");
            ResultCode::ErrFailed
        }
    }

    fn describe(&self) -> String {
        format!("Walk through the circle, from {}, total {}", self.start, self.total_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeGraphClient;
    use crate::client::{DataSet, ErrorCode, Row};

    #[tokio::test]
    async fn write_circle_inserts_every_row() {
        let client = Arc::new(FakeGraphClient::new("127.0.0.1:3699"));
        let a = WriteCircleAction::new(client.clone(), "person", "next", 3);
        let ctx = Arc::new(ActionContext::new());
        assert_eq!(a.do_run(ctx).await, ResultCode::Ok);
        assert_eq!(client.invocations.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn walk_through_returns_ok_when_ring_closes() {
        let client = Arc::new(
            FakeGraphClient::new("127.0.0.1:3699")
                .with_response(
                    "FETCH PROP ON person 0 YIELD person.next;",
                    ErrorCode::Succeeded,
                    DataSet::single_row(Row { columns: vec!["0".to_string()] }),
                ),
        );
        let a = WalkThroughAction::new(client, "person", "next", 1, 0);
        let ctx = Arc::new(ActionContext::new());
        assert_eq!(a.do_run(ctx).await, ResultCode::Ok);
    }

    #[tokio::test]
    async fn walk_through_fails_when_ring_does_not_close() {
        let client = Arc::new(
            FakeGraphClient::new("127.0.0.1:3699")
                .with_response(
                    "FETCH PROP ON person 0 YIELD person.next;",
                    ErrorCode::Succeeded,
                    DataSet::single_row(Row { columns: vec!["99".to_string()] }),
                ),
        );
        let a = WalkThroughAction::new(client, "person", "next", 1, 0);
        let ctx = Arc::new(ActionContext::new());
        assert_eq!(a.do_run(ctx).await, ResultCode::ErrFailed);
    }
}
