//! # Chaos plan & scheduler (component C8)
//!
//! ## Para todos entenderem:
//!
//! Um `ChaosPlan` é a lista completa de ações de um teste de caos: "mate o
//! processo X", "espere 5s", "verifique que o cluster convergiu", etc., cada
//! uma com suas dependências. Este módulo monta essa lista num DAG de
//! verdade: adiciona um nó SOURCE sintético no começo (do qual todas as
//! raízes dependem) e um nó SINK sintético no fim (que depende de todas as
//! folhas e carrega o relatório/notificação final), entrega o grafo
//! completo para [`exec::execute_dag`], e espera o SINK terminar.
//!
//! Grounded in `core/ChaosPlan.{h,cpp}`.

pub mod exec;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::action::control_flow::EmptyAction;
use crate::action::{ActionBehavior, ActionContext, ActionNode, Status};
use crate::report::{ActionReport, PlanReport};

/// Default bounded worker pool size when a plan document doesn't specify
/// one (SPEC_FULL.md §5).
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlanStatus {
    Running = 0,
    Succeeded = 1,
    Failed = 2,
}

impl PlanStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PlanStatus::Running,
            1 => PlanStatus::Succeeded,
            _ => PlanStatus::Failed,
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanStatus::Running => "RUNNING",
            PlanStatus::Succeeded => "SUCCEEDED",
            PlanStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Owns the action arena for one top-level chaos run. Ids are the
/// insertion index into the caller-supplied action list, re-numbered here
/// once the synthetic SOURCE/SINK nodes are appended.
pub struct ChaosPlan {
    pub name: String,
    pub email: Option<String>,
    nodes: Vec<Arc<ActionNode>>,
    source_id: u32,
    sink_id: u32,
    concurrency: usize,
    ctx: Arc<ActionContext>,
    status: AtomicU8,
}

impl ChaosPlan {
    /// `actions` must carry dense ids `0..actions.len()` with internal
    /// dependency wiring already in place (mirrors [`crate::action::loop_action::LoopAction::new`]'s
    /// contract for its own sub-plan). `sink_behavior` becomes the final
    /// report/notification action; pass an [`EmptyAction`] when no
    /// notification step is configured.
    pub fn new(
        mut actions: Vec<ActionNode>,
        sink_behavior: Box<dyn ActionBehavior>,
        name: impl Into<String>,
        email: Option<String>,
        concurrency: usize,
    ) -> Self {
        let roots: Vec<u32> = actions.iter().filter(|n| n.dependees.is_empty()).map(|n| n.id).collect();
        let leaves: Vec<u32> = actions.iter().filter(|n| n.dependers.is_empty()).map(|n| n.id).collect();

        let next_id = actions.len() as u32;
        let source_id = next_id;
        let sink_id = next_id + 1;

        let mut source = ActionNode::new(source_id, Box::new(EmptyAction::new("SOURCE")));
        for root_id in &roots {
            source.dependers.push(*root_id);
        }
        let mut sink = ActionNode::new(sink_id, sink_behavior);
        for leaf_id in &leaves {
            sink.dependees.push(*leaf_id);
        }

        for n in actions.iter_mut() {
            if roots.contains(&n.id) {
                n.dependees.push(source_id);
            }
            if leaves.contains(&n.id) {
                n.dependers.push(sink_id);
            }
        }

        let mut nodes: Vec<Arc<ActionNode>> = actions.into_iter().map(Arc::new).collect();
        nodes.push(Arc::new(source));
        nodes.push(Arc::new(sink));

        Self {
            name: name.into(),
            email,
            nodes,
            source_id,
            sink_id,
            concurrency: concurrency.max(1),
            ctx: Arc::new(ActionContext::new()),
            status: AtomicU8::new(PlanStatus::Running as u8),
        }
    }

    pub fn status(&self) -> PlanStatus {
        PlanStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Latches FAILED; never flips a FAILED plan back to SUCCEEDED
    /// (SPEC_FULL.md §4.2).
    fn mark_failed(&self) {
        self.status.store(PlanStatus::Failed as u8, Ordering::SeqCst);
    }

    /// Runs the whole DAG to completion and blocks on the SINK's signal.
    /// If SINK itself failed, re-invokes its `doRun` once synchronously as
    /// a best-effort delivery guarantee for the final report -- this does
    /// not change the plan's already-latched status.
    #[instrument(skip(self), fields(plan = %self.name))]
    pub async fn run(&self) -> PlanReport {
        let started_at = chrono::Utc::now();
        let wall_clock_start = Instant::now();

        let nodes = Arc::new(self.nodes.clone());
        exec::execute_dag(nodes, Arc::clone(&self.ctx), self.concurrency).await;

        for node in &self.nodes {
            if node.id == self.source_id || node.id == self.sink_id {
                continue;
            }
            if node.status() == Status::Failed {
                self.mark_failed();
            }
        }

        let sink = self.nodes.iter().find(|n| n.id == self.sink_id).expect("sink node present");
        if sink.status() == Status::Failed {
            self.mark_failed();
            warn!("SINK action failed; re-invoking its doRun once as a best-effort delivery guarantee");
            sink.run(Arc::clone(&self.ctx)).await;
        }

        let _ = self.status.compare_exchange(
            PlanStatus::Running as u8,
            PlanStatus::Succeeded as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        let duration_ms = wall_clock_start.elapsed().as_millis() as u64;
        let finished_at = chrono::Utc::now();

        let actions: Vec<ActionReport> = self
            .nodes
            .iter()
            .filter(|n| n.id != self.source_id && n.id != self.sink_id)
            .map(|n| ActionReport {
                id: n.id,
                description: n.describe(),
                status: n.status(),
                duration_ms: n.duration().map(|d| d.as_millis() as u64).unwrap_or(0),
                dependee_ids: n
                    .dependees
                    .iter()
                    .copied()
                    .filter(|id| *id != self.source_id)
                    .collect(),
            })
            .collect();

        info!(status = %self.status(), duration_ms, "plan finished");

        PlanReport {
            plan_name: self.name.clone(),
            status: self.status(),
            started_at,
            finished_at,
            duration_ms,
            actions,
        }
    }
}
