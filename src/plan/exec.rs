//! Generic bounded-concurrency DAG executor shared by the top-level plan
//! scheduler (C8, `plan::ChaosPlan`) and the loop action's private
//! sub-scheduler (C7, `action::loop_action::LoopAction`).
//!
//! Grounded in `core/ChaosPlan.cpp`'s `schedule()`: for every action,
//! await all of its dependees' completion signals, then either run it or
//! mark it failed -- all on a bounded worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::action::{ActionContext, ActionNode};

/// Runs every node in `nodes` respecting dependency edges, bounded to
/// `concurrency` concurrent `doRun`s. Returns once every node has either
/// run or been marked failed.
#[instrument(skip(nodes, ctx))]
pub async fn execute_dag(nodes: Arc<Vec<Arc<ActionNode>>>, ctx: Arc<ActionContext>, concurrency: usize) {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let by_id: Arc<HashMap<u32, Arc<ActionNode>>> =
        Arc::new(nodes.iter().map(|n| (n.id, Arc::clone(n))).collect());

    let mut join_set = JoinSet::new();
    for node in nodes.iter() {
        let node = Arc::clone(node);
        let ctx = Arc::clone(&ctx);
        let sem = Arc::clone(&semaphore);
        let by_id = Arc::clone(&by_id);

        join_set.spawn(async move {
            let mut failure: Option<String> = None;
            for dep_id in &node.dependees {
                if let Some(dep) = by_id.get(dep_id) {
                    if let Err(reason) = dep.await_outcome().await {
                        failure = Some(reason);
                        // Keep waiting on the rest so their outcomes are
                        // drained too, but the first failure is enough to
                        // decide this node's fate.
                    }
                }
            }

            if let Some(reason) = failure {
                node.mark_failed(format!("dependency failed: {reason}"));
                return;
            }

            let _permit = sem.acquire().await.expect("semaphore closed");
            node.run(ctx).await;
        });
    }

    while join_set.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::control_flow::{EmptyAction, RunTaskAction};
    use crate::action::{ActionBehavior, ResultCode};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn node(id: u32, behavior: impl ActionBehavior + 'static) -> Arc<ActionNode> {
        Arc::new(ActionNode::new(id, Box::new(behavior)))
    }

    #[tokio::test]
    async fn linear_failure_propagates_forward_without_running_downstream() {
        let ran_b = Arc::new(AtomicBool::new(false));
        let ran_b2 = Arc::clone(&ran_b);

        let a = node(0, RunTaskAction::new("A", || ResultCode::ErrFailed));
        let mut b = ActionNode::new(1, Box::new(RunTaskAction::new("B", move || {
            ran_b2.store(true, Ordering::SeqCst);
            ResultCode::Ok
        })));
        b.dependees.push(0);
        let b = Arc::new(b);
        let mut c = ActionNode::new(2, Box::new(EmptyAction::new("C")));
        c.dependees.push(1);
        let c = Arc::new(c);

        let nodes: Arc<Vec<Arc<ActionNode>>> = Arc::new(vec![a.clone(), b.clone(), c.clone()]);
        let ctx = Arc::new(ActionContext::new());
        execute_dag(nodes, ctx, 10).await;

        assert_eq!(a.status(), crate::action::Status::Failed);
        assert_eq!(b.status(), crate::action::Status::Failed);
        assert_eq!(c.status(), crate::action::Status::Failed);
        assert!(!ran_b.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn diamond_runs_independent_branches_and_joins() {
        let a = node(0, EmptyAction::new("A"));
        let mut b = ActionNode::new(1, Box::new(EmptyAction::new("B")));
        b.dependees.push(0);
        let mut c = ActionNode::new(2, Box::new(EmptyAction::new("C")));
        c.dependees.push(0);
        let mut d = ActionNode::new(3, Box::new(EmptyAction::new("D")));
        d.dependees.push(1);
        d.dependees.push(2);

        let nodes: Arc<Vec<Arc<ActionNode>>> =
            Arc::new(vec![a, Arc::new(b), Arc::new(c), Arc::new(d)]);
        let ctx = Arc::new(ActionContext::new());
        execute_dag(Arc::clone(&nodes), ctx, 10).await;

        for n in nodes.iter() {
            assert_eq!(n.status(), crate::action::Status::Succeeded);
        }
    }
}
