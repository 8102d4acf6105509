//! # Disturb-action template (component C6)
//!
//! Grounded in `core/Action.h`'s `DisturbAction`. Repeats
//! `sleep(t_d); disturb(); sleep(t_r); recover()` for `loop_times`
//! iterations, aborting at the first non-OK result from either phase.
//!
//! Fail-fast leakage is intentional, not an oversight (SPEC_FULL.md §4.4,
//! §9.4): a failed `disturb()` or `recover()` can leave a fault
//! un-recovered (an iptables rule still in place, a filler file still on
//! disk). Plan authors are expected to add compensating cleanup actions
//! if that leakage is unacceptable for a given scenario.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::action::{ActionBehavior, ActionContext, ResultCode};

/// Concrete fault types implement `disturb`/`recover`; [`run_cycle`]
/// supplies the shared iteration/timing/abort logic.
#[async_trait]
pub trait DisturbAction: Send + Sync {
    async fn disturb(&self) -> ResultCode;
    async fn recover(&self) -> ResultCode;

    fn loop_times(&self) -> u32;
    fn time_to_disturb(&self) -> Duration;
    fn time_to_recover(&self) -> Duration;

    async fn run_cycle(&self) -> ResultCode {
        for i in 1..=self.loop_times() {
            tokio::time::sleep(self.time_to_disturb()).await;
            let rc = self.disturb().await;
            if !rc.is_ok() {
                warn!(iteration = i, result = %rc, "disturb-action: disturb() failed, aborting cycle");
                return rc;
            }

            tokio::time::sleep(self.time_to_recover()).await;
            let rc = self.recover().await;
            if !rc.is_ok() {
                warn!(iteration = i, result = %rc, "disturb-action: recover() failed, aborting cycle");
                return rc;
            }
            info!(iteration = i, total = self.loop_times(), "disturb-action: cycle complete");
        }
        ResultCode::Ok
    }
}

/// Adapts any [`DisturbAction`] to the generic [`ActionBehavior`] the
/// scheduler runs, so concrete fault types only ever implement the
/// narrower trait above.
pub struct DisturbActionAdapter<D: DisturbAction> {
    inner: D,
    label: String,
}

impl<D: DisturbAction> DisturbActionAdapter<D> {
    pub fn new(inner: D, label: impl Into<String>) -> Self {
        Self { inner, label: label.into() }
    }
}

#[async_trait]
impl<D: DisturbAction> ActionBehavior for DisturbActionAdapter<D> {
    async fn do_run(&self, _ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        self.inner.run_cycle().await
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingDisturb {
        disturb_calls: AtomicU32,
        recover_calls: AtomicU32,
        fail_on_disturb_at: Option<u32>,
    }

    #[async_trait]
    impl DisturbAction for CountingDisturb {
        async fn disturb(&self) -> ResultCode {
            let n = self.disturb_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_disturb_at == Some(n) {
                ResultCode::ErrFailed
            } else {
                ResultCode::Ok
            }
        }

        async fn recover(&self) -> ResultCode {
            self.recover_calls.fetch_add(1, Ordering::SeqCst);
            ResultCode::Ok
        }

        fn loop_times(&self) -> u32 {
            3
        }

        fn time_to_disturb(&self) -> Duration {
            Duration::from_millis(0)
        }

        fn time_to_recover(&self) -> Duration {
            Duration::from_millis(0)
        }
    }

    #[tokio::test]
    async fn runs_all_iterations_when_nothing_fails() {
        let d = CountingDisturb {
            disturb_calls: AtomicU32::new(0),
            recover_calls: AtomicU32::new(0),
            fail_on_disturb_at: None,
        };
        assert_eq!(d.run_cycle().await, ResultCode::Ok);
        assert_eq!(d.disturb_calls.load(Ordering::SeqCst), 3);
        assert_eq!(d.recover_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn aborts_immediately_on_disturb_failure_leaving_recover_unrun() {
        let d = CountingDisturb {
            disturb_calls: AtomicU32::new(0),
            recover_calls: AtomicU32::new(0),
            fail_on_disturb_at: Some(2),
        };
        assert_eq!(d.run_cycle().await, ResultCode::ErrFailed);
        assert_eq!(d.disturb_calls.load(Ordering::SeqCst), 2);
        // recover() from iteration 1 ran, but iteration 2's did not --
        // this is the documented leakage, not a bug.
        assert_eq!(d.recover_calls.load(Ordering::SeqCst), 1);
    }
}
