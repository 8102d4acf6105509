//! # Loop action (component C7)
//!
//! Grounded in `core/LoopAction.{h,cpp}`. Re-executes an embedded sub-DAG
//! while a parsed condition evaluates true, resetting every sub-action
//! between iterations. Owns a private worker pool distinct from the outer
//! plan's -- outer concurrency never bounds inner-loop concurrency
//! (SPEC_FULL.md §4.5 invariant).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::action::{ActionBehavior, ActionContext, ActionNode, ResultCode};
use crate::action::control_flow::EmptyAction;
use crate::expr::{self, Expression};
use crate::plan::exec::execute_dag;

pub struct LoopAction {
    cond_text: String,
    /// The embedded sub-plan's actions, already wired to each other but
    /// not yet to the synthetic Begin/End markers -- those are added once
    /// at construction time, mirroring the source rewriting the sub-plan
    /// exactly once rather than per iteration.
    nodes: Vec<Arc<ActionNode>>,
    begin_id: u32,
    end_id: u32,
    concurrency: usize,
}

impl LoopAction {
    /// `sub_actions` must already carry their internal dependency wiring
    /// (ids dense, starting at 0); this constructor appends the Begin
    /// (source) and End (sink) synthetic markers and wires them to the
    /// sub-plan's roots and leaves, identical in shape to the top-level
    /// scheduler's synthetic nodes (§4.2).
    pub fn new(cond_text: impl Into<String>, mut sub_actions: Vec<ActionNode>, concurrency: usize) -> Self {
        let roots: Vec<u32> = sub_actions
            .iter()
            .filter(|n| n.dependees.is_empty())
            .map(|n| n.id)
            .collect();
        let leaves: Vec<u32> = sub_actions
            .iter()
            .filter(|n| n.dependers.is_empty())
            .map(|n| n.id)
            .collect();

        let next_id = sub_actions.len() as u32;
        let begin_id = next_id;
        let end_id = next_id + 1;

        let mut begin = ActionNode::new(begin_id, Box::new(EmptyAction::new("Begin")));
        for root_id in &roots {
            begin.dependers.push(*root_id);
        }
        let mut end = ActionNode::new(end_id, Box::new(EmptyAction::new("End")));
        for leaf_id in &leaves {
            end.dependees.push(*leaf_id);
        }

        for n in sub_actions.iter_mut() {
            if roots.contains(&n.id) {
                n.dependees.push(begin_id);
            }
            if leaves.contains(&n.id) {
                n.dependers.push(end_id);
            }
        }

        let mut nodes: Vec<Arc<ActionNode>> = sub_actions.into_iter().map(Arc::new).collect();
        nodes.push(Arc::new(begin));
        nodes.push(Arc::new(end));

        Self { cond_text: cond_text.into(), nodes, begin_id, end_id, concurrency }
    }

    fn parse_condition(&self) -> Result<Expression, String> {
        expr::parse_checked(&self.cond_text)
    }
}

#[async_trait]
impl ActionBehavior for LoopAction {
    async fn do_run(&self, ctx: Arc<ActionContext>) -> ResultCode {
        let cond = match self.parse_condition() {
            Ok(cond) => cond,
            Err(e) => {
                tracing::warn!(error = %e, cond = %self.cond_text, "LoopAction: condition parse failed");
                return ResultCode::ErrFailedNoRetry;
            }
        };

        let mut iterations = 0u32;
        loop {
            let snapshot = ctx.snapshot_expr_ctx().await;
            let should_continue = match cond.eval(&snapshot) {
                Ok(v) => v.as_bool(),
                Err(e) => {
                    tracing::warn!(error = %e, "LoopAction: condition eval failed");
                    return ResultCode::ErrFailedNoRetry;
                }
            };
            if !should_continue {
                break;
            }

            for node in &self.nodes {
                node.reset();
            }

            let nodes = Arc::new(self.nodes.clone());
            execute_dag(nodes, ctx.clone(), self.concurrency).await;

            iterations += 1;

            let end_node = self.nodes.iter().find(|n| n.id == self.end_id).expect("End node present");
            if let Err(reason) = end_node.await_outcome().await {
                tracing::warn!(iterations, error = %reason, "LoopAction: iteration failed");
                return ResultCode::ErrFailed;
            }
        }

        info!(iterations, "LoopAction: condition false, loop finished");
        let _ = self.begin_id;
        ResultCode::Ok
    }

    fn describe(&self) -> String {
        format!("Loop while {}", self.cond_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::control_flow::AssignAction;
    use crate::action::ActionBehavior;
    use crate::expr::Value;

    #[tokio::test]
    async fn loop_runs_body_exactly_condition_count_times() {
        let ctx = Arc::new(ActionContext::new());
        ctx.set_var("i", Value::Int64(0)).await;

        let body = vec![ActionNode::new(0, Box::new(AssignAction::new("i", "$i+1")))];
        let loop_action = LoopAction::new("$i < 3", body, 1);

        let rc = loop_action.do_run(ctx.clone()).await;
        assert_eq!(rc, ResultCode::Ok);
        assert_eq!(ctx.get_var("i").await.unwrap(), Value::Int64(3));
    }

    #[tokio::test]
    async fn loop_runs_zero_iterations_when_condition_false_at_entry() {
        let ctx = Arc::new(ActionContext::new());
        ctx.set_var("i", Value::Int64(5)).await;

        let body = vec![ActionNode::new(0, Box::new(AssignAction::new("i", "$i+1")))];
        let loop_action = LoopAction::new("$i < 3", body, 1);

        let rc = loop_action.do_run(ctx.clone()).await;
        assert_eq!(rc, ResultCode::Ok);
        assert_eq!(ctx.get_var("i").await.unwrap(), Value::Int64(5));
    }
}
