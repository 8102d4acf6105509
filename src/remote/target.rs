//! Remote target / cluster instance (SPEC_FULL.md §3).
//!
//! One storaged/metad/graphd process: host, install/conf paths, role, and
//! mutable runtime state (cached pid, RUNNING/STOPPED). Lifecycle actions
//! (`Start`, `Stop`, `Crash`, ...) mutate `state`/`pid` through interior
//! mutability since a target is shared (`Arc`) across every action that
//! references it.

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Storage,
    Meta,
    Graph,
}

impl Role {
    pub fn process_name(&self) -> &'static str {
        match self {
            Role::Storage => "storaged",
            Role::Meta => "metad",
            Role::Graph => "graphd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug, Default)]
pub struct MutableState {
    pub state: Option<RunState>,
    pub pid: Option<u32>,
}

/// Immutable identity plus mutable runtime state, guarded by a mutex since
/// concurrent disturb/lifecycle actions may race on the same instance.
pub struct RemoteTarget {
    pub host: String,
    pub install_path: String,
    pub config_path: String,
    pub role: Role,
    pub owner: Option<String>,
    state: Mutex<MutableState>,
}

impl RemoteTarget {
    pub fn new(
        host: impl Into<String>,
        install_path: impl Into<String>,
        config_path: impl Into<String>,
        role: Role,
        owner: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            install_path: install_path.into(),
            config_path: config_path.into(),
            role,
            owner,
            state: Mutex::new(MutableState::default()),
        }
    }

    pub fn describe(&self) -> String {
        format!("{}@{}", self.role.process_name(), self.host)
    }

    pub async fn set_pid(&self, pid: Option<u32>) {
        self.state.lock().await.pid = pid;
    }

    pub async fn pid(&self) -> Option<u32> {
        self.state.lock().await.pid
    }

    pub async fn set_run_state(&self, state: RunState) {
        self.state.lock().await.state = Some(state);
    }

    pub async fn run_state(&self) -> Option<RunState> {
        self.state.lock().await.state
    }

    pub fn pidfile_path(&self) -> String {
        format!("{}/pids/{}.pid", self.install_path, self.role.process_name())
    }

    pub fn data_path(&self) -> String {
        format!("{}/data", self.install_path)
    }

    pub fn wal_path(&self, space_id: i64) -> String {
        format!("{}/data/nebula/{}/wal", self.install_path, space_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pid_and_state_are_independently_settable() {
        let t = RemoteTarget::new("h1", "/usr/local/nebula", "/usr/local/nebula/etc", Role::Storage, None);
        assert!(t.pid().await.is_none());
        t.set_pid(Some(123)).await;
        t.set_run_state(RunState::Running).await;
        assert_eq!(t.pid().await, Some(123));
        assert_eq!(t.run_state().await, Some(RunState::Running));
    }
}
