//! Concrete fault types wired through [`crate::action::disturb::DisturbAction`].
//! Grounded in `nebula/NebulaAction.{h,cpp}`'s `RandomRestartAction`,
//! `RandomPartitionAction`, `RandomTrafficControlAction`, `FillDiskAction`,
//! `SlowDiskAction`, and `TruncateWalAction`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::warn;

use crate::action::disturb::DisturbAction;
use crate::action::ResultCode;
use crate::remote::target::RemoteTarget;
use crate::remote::RemoteExec;

fn pick<'a>(targets: &'a [Arc<RemoteTarget>]) -> &'a Arc<RemoteTarget> {
    let idx = rand::thread_rng().gen_range(0..targets.len());
    &targets[idx]
}

/// Randomly stops (graceful or crash) one instance, optionally cleans its
/// data, then restarts it -- up to 32 start attempts with linear backoff.
pub struct RandomRestartAction {
    instances: Vec<Arc<RemoteTarget>>,
    remote: Arc<dyn RemoteExec>,
    loop_times: u32,
    time_to_disturb: Duration,
    time_to_recover: Duration,
    graceful: bool,
    picked: Mutex<Option<Arc<RemoteTarget>>>,
}

impl RandomRestartAction {
    pub fn new(
        instances: Vec<Arc<RemoteTarget>>,
        remote: Arc<dyn RemoteExec>,
        loop_times: u32,
        time_to_disturb: Duration,
        time_to_recover: Duration,
        graceful: bool,
    ) -> Self {
        Self { instances, remote, loop_times, time_to_disturb, time_to_recover, graceful, picked: Mutex::new(None) }
    }

    async fn stop_picked(&self, target: &Arc<RemoteTarget>) -> ResultCode {
        if self.graceful {
            let a = crate::actions::lifecycle::StopAction::new(target.clone(), self.remote.clone());
            run_lifecycle(&a).await
        } else {
            let a = crate::actions::lifecycle::CrashAction::new(target.clone(), self.remote.clone());
            run_lifecycle(&a).await
        }
    }

    async fn start_picked(&self, target: &Arc<RemoteTarget>) -> ResultCode {
        for attempt in 1..=32u32 {
            let a = crate::actions::lifecycle::StartAction::new(target.clone(), self.remote.clone());
            let rc = run_lifecycle(&a).await;
            if rc == ResultCode::Ok {
                return rc;
            }
            warn!(attempt, "RandomRestartAction: start failed, retrying");
            tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
        }
        ResultCode::ErrFailed
    }
}

/// Runs a bare `ActionBehavior` against a throwaway context -- disturb
/// actions reuse the lifecycle actions' logic without needing the shared
/// plan context they'd receive inside a real DAG node.
async fn run_lifecycle(behavior: &impl crate::action::ActionBehavior) -> ResultCode {
    let ctx = Arc::new(crate::action::ActionContext::new());
    behavior.do_run(ctx).await
}

#[async_trait]
impl DisturbAction for RandomRestartAction {
    async fn disturb(&self) -> ResultCode {
        let target = pick(&self.instances).clone();
        let rc = self.stop_picked(&target).await;
        *self.picked.lock().await = Some(target);
        rc
    }

    async fn recover(&self) -> ResultCode {
        let Some(target) = self.picked.lock().await.clone() else {
            return ResultCode::ErrBadArgument;
        };
        self.start_picked(&target).await
    }

    fn loop_times(&self) -> u32 {
        self.loop_times
    }

    fn time_to_disturb(&self) -> Duration {
        self.time_to_disturb
    }

    fn time_to_recover(&self) -> Duration {
        self.time_to_recover
    }
}

/// Isolates one storage instance from its peers and the meta cluster with
/// `iptables DROP` rules on the data and raft ports; recovery deletes the
/// same rules (`iptables -D` mirrors `-A`, so abort leakage per SPEC_FULL.md
/// §9.4 leaves the `-A` rule in place if `disturb` itself fails midway).
pub struct RandomPartitionAction {
    metas: Vec<Arc<RemoteTarget>>,
    storages: Vec<Arc<RemoteTarget>>,
    remote: Arc<dyn RemoteExec>,
    loop_times: u32,
    time_to_disturb: Duration,
    time_to_recover: Duration,
    picked: Mutex<Option<Arc<RemoteTarget>>>,
}

impl RandomPartitionAction {
    pub fn new(
        metas: Vec<Arc<RemoteTarget>>,
        storages: Vec<Arc<RemoteTarget>>,
        remote: Arc<dyn RemoteExec>,
        loop_times: u32,
        time_to_disturb: Duration,
        time_to_recover: Duration,
    ) -> Self {
        Self { metas, storages, remote, loop_times, time_to_disturb, time_to_recover, picked: Mutex::new(None) }
    }

    fn peer_hosts(&self, picked: &Arc<RemoteTarget>) -> Vec<String> {
        self.metas
            .iter()
            .chain(self.storages.iter())
            .filter(|t| !Arc::ptr_eq(t, picked))
            .map(|t| t.host.clone())
            .collect()
    }

    async fn apply_rules(&self, picked: &Arc<RemoteTarget>, add: bool) -> ResultCode {
        let flag = if add { "-A" } else { "-D" };
        for peer_host in self.peer_hosts(picked) {
            let cmd = format!("iptables {flag} INPUT -s {peer_host} -j DROP && iptables {flag} OUTPUT -d {peer_host} -j DROP");
            if let Err(e) = self.remote.run(&cmd, &picked.host, picked.owner.as_deref()).await {
                warn!(error = %e, peer_host, "RandomPartitionAction: iptables rule failed");
                return ResultCode::ErrFailed;
            }
        }
        ResultCode::Ok
    }
}

#[async_trait]
impl DisturbAction for RandomPartitionAction {
    async fn disturb(&self) -> ResultCode {
        let target = pick(&self.storages).clone();
        let rc = self.apply_rules(&target, true).await;
        *self.picked.lock().await = Some(target);
        rc
    }

    async fn recover(&self) -> ResultCode {
        let Some(target) = self.picked.lock().await.clone() else {
            return ResultCode::ErrBadArgument;
        };
        self.apply_rules(&target, false).await
    }

    fn loop_times(&self) -> u32 {
        self.loop_times
    }

    fn time_to_disturb(&self) -> Duration {
        self.time_to_disturb
    }

    fn time_to_recover(&self) -> Duration {
        self.time_to_recover
    }
}

/// Adds bidirectional `tc netem` delay/loss/duplication on one storage
/// instance's network device; recovery deletes the qdisc.
pub struct RandomTrafficControlAction {
    storages: Vec<Arc<RemoteTarget>>,
    remote: Arc<dyn RemoteExec>,
    loop_times: u32,
    time_to_disturb: Duration,
    time_to_recover: Duration,
    device: String,
    delay: String,
    jitter: String,
    loss_pct: i32,
    duplicate_pct: i32,
    picked: Mutex<Option<Arc<RemoteTarget>>>,
}

impl RandomTrafficControlAction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storages: Vec<Arc<RemoteTarget>>,
        remote: Arc<dyn RemoteExec>,
        loop_times: u32,
        time_to_disturb: Duration,
        time_to_recover: Duration,
        device: impl Into<String>,
        delay: impl Into<String>,
        jitter: impl Into<String>,
        loss_pct: i32,
        duplicate_pct: i32,
    ) -> Self {
        Self {
            storages,
            remote,
            loop_times,
            time_to_disturb,
            time_to_recover,
            device: device.into(),
            delay: delay.into(),
            jitter: jitter.into(),
            loss_pct,
            duplicate_pct,
            picked: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DisturbAction for RandomTrafficControlAction {
    async fn disturb(&self) -> ResultCode {
        let target = pick(&self.storages).clone();
        let cmd = format!(
            "tc qdisc add dev {} root netem delay {} {} loss {}% duplicate {}%",
            self.device, self.delay, self.jitter, self.loss_pct, self.duplicate_pct
        );
        let rc = match self.remote.run(&cmd, &target.host, target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            _ => ResultCode::ErrFailed,
        };
        *self.picked.lock().await = Some(target);
        rc
    }

    async fn recover(&self) -> ResultCode {
        let Some(target) = self.picked.lock().await.clone() else {
            return ResultCode::ErrBadArgument;
        };
        let cmd = format!("tc qdisc del dev {} root", self.device);
        match self.remote.run(&cmd, &target.host, target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            _ => ResultCode::ErrFailed,
        }
    }

    fn loop_times(&self) -> u32 {
        self.loop_times
    }

    fn time_to_disturb(&self) -> Duration {
        self.time_to_disturb
    }

    fn time_to_recover(&self) -> Duration {
        self.time_to_recover
    }
}

/// Writes `/dev/zero` into `count` randomly-picked storage instances' data
/// directories until they run out of space (expected exit code 1);
/// recovery removes the filler file and restarts the instance.
pub struct FillDiskAction {
    storages: Vec<Arc<RemoteTarget>>,
    remote: Arc<dyn RemoteExec>,
    loop_times: u32,
    time_to_disturb: Duration,
    time_to_recover: Duration,
    count: usize,
    picked: Mutex<Vec<Arc<RemoteTarget>>>,
}

impl FillDiskAction {
    pub fn new(
        storages: Vec<Arc<RemoteTarget>>,
        remote: Arc<dyn RemoteExec>,
        loop_times: u32,
        time_to_disturb: Duration,
        time_to_recover: Duration,
        count: usize,
    ) -> Self {
        Self { storages, remote, loop_times, time_to_disturb, time_to_recover, count, picked: Mutex::new(Vec::new()) }
    }

    fn filler_path(target: &RemoteTarget) -> String {
        format!("{}/filler.bin", target.data_path())
    }
}

#[async_trait]
impl DisturbAction for FillDiskAction {
    async fn disturb(&self) -> ResultCode {
        let mut rng = rand::thread_rng();
        let mut indices: Vec<usize> = (0..self.storages.len()).collect();
        let n = self.count.min(self.storages.len());
        let mut chosen = Vec::with_capacity(n);
        for _ in 0..n {
            let i = rng.gen_range(0..indices.len());
            chosen.push(self.storages[indices.remove(i)].clone());
        }

        for target in &chosen {
            let cmd = format!("dd if=/dev/zero of={} bs=1M", Self::filler_path(target));
            match self.remote.run(&cmd, &target.host, target.owner.as_deref()).await {
                // out-of-space is the expected, successful outcome: `dd`
                // exits 1 once the filesystem fills up.
                Ok(out) if out.exit_code == 1 => {}
                Ok(out) => {
                    warn!(exit_code = out.exit_code, "FillDiskAction: dd did not exit with expected out-of-space status");
                    return ResultCode::ErrFailed;
                }
                Err(e) => {
                    warn!(error = %e, "FillDiskAction: ssh failed");
                    return ResultCode::ErrFailed;
                }
            }
        }
        *self.picked.lock().await = chosen;
        ResultCode::Ok
    }

    async fn recover(&self) -> ResultCode {
        let picked = self.picked.lock().await.clone();
        for target in &picked {
            let rm_cmd = format!("rm -f {}", Self::filler_path(target));
            if self.remote.run(&rm_cmd, &target.host, target.owner.as_deref()).await.is_err() {
                return ResultCode::ErrFailed;
            }
            let start = crate::actions::lifecycle::StartAction::new(target.clone(), self.remote.clone());
            if run_lifecycle(&start).await != ResultCode::Ok {
                return ResultCode::ErrFailed;
            }
        }
        ResultCode::Ok
    }

    fn loop_times(&self) -> u32 {
        self.loop_times
    }

    fn time_to_disturb(&self) -> Duration {
        self.time_to_disturb
    }

    fn time_to_recover(&self) -> Duration {
        self.time_to_recover
    }
}

/// Attaches a SystemTap probe delaying `vfs_write` for a picked instance's
/// pid; recovery kills the stap process if it's still alive.
pub struct SlowDiskAction {
    storages: Vec<Arc<RemoteTarget>>,
    remote: Arc<dyn RemoteExec>,
    loop_times: u32,
    time_to_disturb: Duration,
    time_to_recover: Duration,
    delay_ms: u32,
    stap_pid: Mutex<Option<(Arc<RemoteTarget>, u32)>>,
}

impl SlowDiskAction {
    pub fn new(
        storages: Vec<Arc<RemoteTarget>>,
        remote: Arc<dyn RemoteExec>,
        loop_times: u32,
        time_to_disturb: Duration,
        time_to_recover: Duration,
        delay_ms: u32,
    ) -> Self {
        Self { storages, remote, loop_times, time_to_disturb, time_to_recover, delay_ms, stap_pid: Mutex::new(None) }
    }
}

#[async_trait]
impl DisturbAction for SlowDiskAction {
    async fn disturb(&self) -> ResultCode {
        let target = pick(&self.storages).clone();
        let Some(pid) = target.pid().await else {
            return ResultCode::ErrNotFound;
        };
        let cmd = format!(
            "stap -g -e 'probe vfs.write {{ if (pid() == {pid}) mdelay({}) }}' & echo $!",
            self.delay_ms
        );
        match self.remote.run(&cmd, &target.host, target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => {
                let stap_pid = out.stdout.trim().parse::<u32>().ok();
                if let Some(sp) = stap_pid {
                    *self.stap_pid.lock().await = Some((target, sp));
                    ResultCode::Ok
                } else {
                    ResultCode::ErrFailed
                }
            }
            _ => ResultCode::ErrFailed,
        }
    }

    async fn recover(&self) -> ResultCode {
        let Some((target, stap_pid)) = self.stap_pid.lock().await.clone() else {
            return ResultCode::ErrBadArgument;
        };
        let probe_cmd = format!("ps -p {stap_pid} > /dev/null 2>&1");
        let alive = matches!(
            self.remote.run(&probe_cmd, &target.host, target.owner.as_deref()).await,
            Ok(out) if out.exit_code == 0
        );
        if !alive {
            return ResultCode::Ok;
        }
        let kill_cmd = format!("kill {stap_pid}");
        match self.remote.run(&kill_cmd, &target.host, target.owner.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            _ => ResultCode::ErrFailed,
        }
    }

    fn loop_times(&self) -> u32 {
        self.loop_times
    }

    fn time_to_disturb(&self) -> Duration {
        self.time_to_disturb
    }

    fn time_to_recover(&self) -> Duration {
        self.time_to_recover
    }
}

/// Finds the most recently modified WAL file on `count` picked storage
/// instances (`ls -lt | head`) and truncates it by `bytes`. Single-shot:
/// always reported as an ordinary [`crate::action::ActionBehavior`]
/// action, not a disturb template, since the source has no recover phase
/// for a truncation.
pub struct TruncateWalAction {
    storages: Vec<Arc<RemoteTarget>>,
    remote: Arc<dyn RemoteExec>,
    space_id: i64,
    part_id: i32,
    count: usize,
    bytes: u64,
}

impl TruncateWalAction {
    pub fn new(
        storages: Vec<Arc<RemoteTarget>>,
        remote: Arc<dyn RemoteExec>,
        space_id: i64,
        part_id: i32,
        count: usize,
        bytes: u64,
    ) -> Self {
        Self { storages, remote, space_id, part_id, count, bytes }
    }
}

#[async_trait]
impl crate::action::ActionBehavior for TruncateWalAction {
    async fn do_run(&self, _ctx: Arc<crate::action::ActionContext>) -> ResultCode {
        let mut rng = rand::thread_rng();
        let mut indices: Vec<usize> = (0..self.storages.len()).collect();
        let n = self.count.min(self.storages.len());

        for _ in 0..n {
            let i = rng.gen_range(0..indices.len());
            let target = &self.storages[indices.remove(i)];
            let wal_dir = format!("{}/part-{}", target.wal_path(self.space_id), self.part_id);
            let find_cmd = format!("ls -lt {wal_dir} | head -2 | tail -1 | awk '{{print $NF}}'");
            let latest = match self.remote.run(&find_cmd, &target.host, target.owner.as_deref()).await {
                Ok(out) if out.exit_code == 0 && !out.stdout.trim().is_empty() => out.stdout.trim().to_string(),
                _ => {
                    warn!(host = %target.host, "TruncateWalAction: could not find latest wal file");
                    return ResultCode::ErrFailed;
                }
            };
            let truncate_cmd = format!("truncate -s -{} {wal_dir}/{latest}", self.bytes);
            match self.remote.run(&truncate_cmd, &target.host, target.owner.as_deref()).await {
                Ok(out) if out.exit_code == 0 => {}
                _ => {
                    warn!(host = %target.host, "TruncateWalAction: truncate failed");
                    return ResultCode::ErrFailed;
                }
            }
        }
        ResultCode::Ok
    }

    fn describe(&self) -> String {
        format!("Truncate space {} wal", self.space_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeRemoteExec;
    use crate::remote::target::Role;
    use crate::remote::RemoteOutput;

    fn target(host: &str) -> Arc<RemoteTarget> {
        Arc::new(RemoteTarget::new(host, "/usr/local/nebula", "/usr/local/nebula/etc", Role::Storage, None))
    }

    #[tokio::test]
    async fn random_partition_recover_requires_prior_disturb() {
        let storages = vec![target("h1")];
        let metas = vec![target("m1")];
        let remote = Arc::new(FakeRemoteExec::new());
        let a = RandomPartitionAction::new(metas, storages, remote, 1, Duration::ZERO, Duration::ZERO);
        assert_eq!(a.recover().await, ResultCode::ErrBadArgument);
    }

    #[tokio::test]
    async fn fill_disk_treats_exit_1_as_success() {
        let storages = vec![target("h1")];
        let remote = Arc::new(FakeRemoteExec::new().with_response(
            "dd if=/dev/zero of=/usr/local/nebula/data/filler.bin bs=1M",
            RemoteOutput { exit_code: 1, stdout: String::new(), stderr: String::new(), duration_ms: 0 },
        ));
        let a = FillDiskAction::new(storages, remote, 1, Duration::ZERO, Duration::ZERO, 1);
        assert_eq!(a.disturb().await, ResultCode::Ok);
    }
}
