//! Lifecycle actions: Start, Stop, Crash, and the clean/restore family.
//! Grounded in `nebula/NebulaAction.{h,cpp}`'s `StartAction`, `StopAction`,
//! `CrashAction`, `CleanDataAction`, `CleanWalAction`, `CleanCheckpointAction`,
//! `RestoreFromCheckpointAction`, `RestoreFromDataDirAction`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::action::{ActionBehavior, ActionContext, ResultCode};
use crate::remote::target::{RemoteTarget, RunState};
use crate::remote::RemoteExec;

/// Kills the process without a graceful shutdown (`kill -9`).
pub struct CrashAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
}

impl CrashAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>) -> Self {
        Self { target, remote }
    }
}

#[async_trait]
impl ActionBehavior for CrashAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let Some(pid) = self.target.pid().await else {
            return ResultCode::ErrNotFound;
        };
        let cmd = format!("kill -9 {pid}");
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => {
                self.target.set_run_state(RunState::Stopped).await;
                ResultCode::Ok
            }
            Ok(out) => {
                warn!(exit_code = out.exit_code, "CrashAction: kill failed");
                ResultCode::ErrFailed
            }
            Err(e) => {
                warn!(error = %e, "CrashAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("kill -9 {}", self.target.describe())
    }
}

/// Starts the process and resolves its pid by probing `ps` after launch.
pub struct StartAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
}

impl StartAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>) -> Self {
        Self { target, remote }
    }

    fn start_cmd(&self) -> String {
        format!(
            "{}/scripts/{}.service start",
            self.target.install_path,
            self.target.role.process_name()
        )
    }
}

#[async_trait]
impl ActionBehavior for StartAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let cmd = self.start_cmd();
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => {
                let pidfile = self.target.pidfile_path();
                let cat_cmd = format!("cat {pidfile}");
                let pid = match self.remote.run(&cat_cmd, &self.target.host, self.target.owner.as_deref()).await {
                    Ok(pid_out) => pid_out.stdout.trim().parse::<u32>().ok(),
                    Err(_) => None,
                };
                self.target.set_pid(pid).await;
                self.target.set_run_state(RunState::Running).await;
                ResultCode::Ok
            }
            Ok(out) => {
                warn!(exit_code = out.exit_code, stderr = %out.stderr, "StartAction: start command failed");
                ResultCode::ErrFailed
            }
            Err(e) => {
                warn!(error = %e, "StartAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("start {}", self.target.describe())
    }
}

/// Graceful stop; retries up to 10 times with increasing sleep, probing
/// `ps` for the pid's liveness between attempts (SPEC_FULL.md §4.3).
pub struct StopAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
}

impl StopAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>) -> Self {
        Self { target, remote }
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let cmd = format!("ps -p {pid} > /dev/null 2>&1");
        matches!(
            self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await,
            Ok(out) if out.exit_code == 0
        )
    }
}

#[async_trait]
impl ActionBehavior for StopAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let Some(pid) = self.target.pid().await else {
            return ResultCode::ErrNotFound;
        };

        let stop_cmd = format!("kill {pid}");
        if let Err(e) = self.remote.run(&stop_cmd, &self.target.host, self.target.owner.as_deref()).await {
            warn!(error = %e, "StopAction: ssh failed issuing kill");
            return ResultCode::ErrFailed;
        }

        for attempt in 1..=10u32 {
            tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
            if !self.is_alive(pid).await {
                self.target.set_run_state(RunState::Stopped).await;
                return ResultCode::Ok;
            }
        }

        warn!(pid, "StopAction: process still alive after 10 retries");
        ResultCode::ErrTimeout
    }

    fn describe(&self) -> String {
        format!("stop {}", self.target.describe())
    }
}

/// Removes the data directory (or a single space's data, if resolved).
/// Refuses while the target is RUNNING (SPEC_FULL.md §4.3).
pub struct CleanDataAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
    /// Pre-resolved space id; `None` removes the whole data root. Callers
    /// resolve this via a `DescSpace` action upstream, matching the
    /// source's `CleanDataAction(inst, client, spaceName)` which resolves
    /// the id lazily inside `doRun`.
    space_id: Option<i64>,
}

impl CleanDataAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>, space_id: Option<i64>) -> Self {
        Self { target, remote, space_id }
    }
}

#[async_trait]
impl ActionBehavior for CleanDataAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        if self.target.run_state().await == Some(RunState::Running) {
            warn!("CleanDataAction: refusing to clean data of a running instance");
            return ResultCode::Ok;
        }

        let path = match self.space_id {
            Some(id) => format!("{}/data/nebula/{}", self.target.install_path, id),
            None => self.target.data_path(),
        };
        let cmd = format!("rm -rf {path}");
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            Ok(_) => ResultCode::ErrFailed,
            Err(e) => {
                warn!(error = %e, "CleanDataAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("clean data {}", self.target.describe())
    }
}

/// Removes the WAL directory of a resolved space on one instance.
pub struct CleanWalAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
    space_id: i64,
}

impl CleanWalAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>, space_id: i64) -> Self {
        Self { target, remote, space_id }
    }
}

#[async_trait]
impl ActionBehavior for CleanWalAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let path = self.target.wal_path(self.space_id);
        let cmd = format!("rm -rf {path}");
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            Ok(_) => ResultCode::ErrFailed,
            Err(e) => {
                warn!(error = %e, "CleanWalAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("clean space {} wal on {}", self.space_id, self.target.describe())
    }
}

/// Removes all checkpoint (snapshot) directories on one instance.
pub struct CleanCheckpointAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
}

impl CleanCheckpointAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>) -> Self {
        Self { target, remote }
    }
}

#[async_trait]
impl ActionBehavior for CleanCheckpointAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let cmd = format!("rm -rf {}/data/nebula/*/checkpoints", self.target.install_path);
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            Ok(_) => ResultCode::ErrFailed,
            Err(e) => {
                warn!(error = %e, "CleanCheckpointAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("clean snapshot on {}", self.target.describe())
    }
}

/// Restores data files from the most recent checkpoint directory.
pub struct RestoreFromCheckpointAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
}

impl RestoreFromCheckpointAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>) -> Self {
        Self { target, remote }
    }
}

#[async_trait]
impl ActionBehavior for RestoreFromCheckpointAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let data_root = self.target.data_path();
        let cmd = format!(
            "for d in {data_root}/nebula/*/checkpoints/*; do cp -r \"$d\"/* {data_root}/nebula/$(basename $(dirname \"$d\"))/; done"
        );
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            Ok(_) => ResultCode::ErrFailed,
            Err(e) => {
                warn!(error = %e, "RestoreFromCheckpointAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("restore db from snapshot on {}", self.target.describe())
    }
}

/// Restores data files from an externally-supplied data directory.
pub struct RestoreFromDataDirAction {
    target: Arc<RemoteTarget>,
    remote: Arc<dyn RemoteExec>,
    src_data_path: String,
}

impl RestoreFromDataDirAction {
    pub fn new(target: Arc<RemoteTarget>, remote: Arc<dyn RemoteExec>, src_data_path: impl Into<String>) -> Self {
        Self { target, remote, src_data_path: src_data_path.into() }
    }
}

#[async_trait]
impl ActionBehavior for RestoreFromDataDirAction {
    async fn do_run(&self, _ctx: Arc<ActionContext>) -> ResultCode {
        let cmd = format!("cp -r {}/* {}/", self.src_data_path, self.target.data_path());
        match self.remote.run(&cmd, &self.target.host, self.target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            Ok(_) => ResultCode::ErrFailed,
            Err(e) => {
                warn!(error = %e, "RestoreFromDataDirAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("restore db from data folder on {}", self.target.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeRemoteExec;
    use crate::remote::target::Role;
    use crate::remote::RemoteOutput;

    fn target() -> Arc<RemoteTarget> {
        Arc::new(RemoteTarget::new("h1", "/usr/local/nebula", "/usr/local/nebula/etc", Role::Storage, None))
    }

    #[tokio::test]
    async fn crash_action_requires_a_known_pid() {
        let t = target();
        let remote = Arc::new(FakeRemoteExec::new());
        let a = CrashAction::new(t, remote);
        let ctx = Arc::new(ActionContext::new());
        assert_eq!(a.do_run(ctx).await, ResultCode::ErrNotFound);
    }

    #[tokio::test]
    async fn crash_action_marks_instance_stopped_on_success() {
        let t = target();
        t.set_pid(Some(42)).await;
        let remote = Arc::new(
            FakeRemoteExec::new().with_response(
                "kill -9 42",
                RemoteOutput { exit_code: 0, stdout: String::new(), stderr: String::new(), duration_ms: 0 },
            ),
        );
        let a = CrashAction::new(t.clone(), remote);
        let ctx = Arc::new(ActionContext::new());
        assert_eq!(a.do_run(ctx).await, ResultCode::Ok);
        assert_eq!(t.run_state().await, Some(RunState::Stopped));
    }

    #[tokio::test]
    async fn clean_data_refuses_while_running() {
        let t = target();
        t.set_run_state(RunState::Running).await;
        let remote = Arc::new(FakeRemoteExec::new());
        let a = CleanDataAction::new(t, remote, None);
        let ctx = Arc::new(ActionContext::new());
        assert_eq!(a.do_run(ctx).await, ResultCode::Ok);
    }
}
