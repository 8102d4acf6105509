//! # Action framework (components C3, C4)
//!
//! ## Para todos entenderem:
//!
//! Toda ação do plano de caos -- matar um processo, escrever dados, esperar
//! um tempo -- passa pelo mesmo ciclo de vida: `INIT -> RUNNING -> (SUCCEEDED
//! | FAILED)`. Esse módulo define esse ciclo uma única vez (`ActionNode`) e
//! um traço (`ActionBehavior`) que cada ação concreta implementa com o seu
//! próprio "o que fazer" (`do_run`). O agendador (C8) só enxerga o ciclo de
//! vida genérico; nunca precisa saber se está rodando um `kill -9` ou um
//! `CREATE SPACE`.

pub mod context;
pub mod control_flow;
pub mod disturb;
pub mod loop_action;

pub use context::ActionContext;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::instrument;

/// Result codes surfaced by `doRun`, per SPEC_FULL.md §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    ErrTimeout,
    ErrNotFound,
    ErrBadArgument,
    ErrFailed,
    /// Do-not-retry: aborts the owning retry loop immediately.
    ErrFailedNoRetry,
    /// Accepted but not yet converged: retry with backoff.
    ErrNotFinished,
}

impl ResultCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Ok => "OK",
            ResultCode::ErrTimeout => "ERR_TIMEOUT",
            ResultCode::ErrNotFound => "ERR_NOT_FOUND",
            ResultCode::ErrBadArgument => "ERR_BAD_ARGUMENT",
            ResultCode::ErrFailed => "ERR_FAILED",
            ResultCode::ErrFailedNoRetry => "ERR_FAILED_NO_RETRY",
            ResultCode::ErrNotFinished => "ERR_NOT_FINISHED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Init = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl Status {
    fn from_u8(v: u8) -> Status {
        match v {
            0 => Status::Init,
            1 => Status::Running,
            2 => Status::Succeeded,
            _ => Status::Failed,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Init => "INIT",
            Status::Running => "RUNNING",
            Status::Succeeded => "SUCCEEDED",
            Status::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// The value stored in an action's one-shot completion signal: success,
/// or a source-free textual failure reason.
pub type ActionOutcome = Result<(), String>;

/// The behavior a concrete action contributes: everything except the
/// generic lifecycle, which [`ActionNode`] owns.
///
/// `&self` rather than `&mut self` because a node is shared across the
/// scheduler's tasks; actions that need mutable scratch state (e.g.
/// `DescSpace` caching a resolved space id) use interior mutability
/// (`tokio::sync::Mutex`) the way the source's `mutable` fields did.
#[async_trait]
pub trait ActionBehavior: Send + Sync {
    /// Takes the context as a shared `Arc` rather than a borrow: loop
    /// actions spawn a private sub-scheduler whose tasks each need their
    /// own owned handle to the same context, and a plain reference can't
    /// cross that `'static`-bound `tokio::spawn` boundary.
    async fn do_run(&self, ctx: Arc<ActionContext>) -> ResultCode;

    /// Human-readable one-line description, used in the textual report.
    fn describe(&self) -> String;
}

/// A node in the plan's action arena: stable id, dependency edges (by id),
/// lifecycle status, one-shot completion signal, and the concrete
/// behavior. Owned exclusively by the plan / loop sub-plan that holds it.
pub struct ActionNode {
    pub id: u32,
    pub behavior: Box<dyn ActionBehavior>,
    pub dependees: Vec<u32>,
    pub dependers: Vec<u32>,
    status: AtomicU8,
    started_at: std::sync::Mutex<Option<Instant>>,
    duration: std::sync::Mutex<Option<Duration>>,
    signal_tx: watch::Sender<Option<ActionOutcome>>,
}

impl ActionNode {
    pub fn new(id: u32, behavior: Box<dyn ActionBehavior>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            id,
            behavior,
            dependees: Vec::new(),
            dependers: Vec::new(),
            status: AtomicU8::new(Status::Init as u8),
            started_at: std::sync::Mutex::new(None),
            duration: std::sync::Mutex::new(None),
            signal_tx: tx,
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn duration(&self) -> Option<Duration> {
        *self.duration.lock().unwrap()
    }

    pub fn describe(&self) -> String {
        self.behavior.describe()
    }

    /// A receiver that observes this action's completion. Late subscribers
    /// (created after the signal already fired) immediately read the
    /// stored outcome -- `watch` channels retain their last value, which is
    /// exactly the "multi-observer, latch-once" contract SPEC_FULL.md §4.2
    /// requires.
    pub fn subscribe(&self) -> watch::Receiver<Option<ActionOutcome>> {
        self.signal_tx.subscribe()
    }

    /// Blocks the caller until this action's signal fires, returning the
    /// stored outcome.
    pub async fn await_outcome(&self) -> ActionOutcome {
        let mut rx = self.subscribe();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without ever firing -- treat as failure
                // rather than hang forever.
                return Err("action dropped before completing".to_string());
            }
        }
    }

    /// `run()`: INIT -> RUNNING -> (SUCCEEDED | FAILED), fulfilling the
    /// completion signal exactly once.
    #[instrument(skip(self, ctx), fields(action_id = self.id))]
    pub async fn run(&self, ctx: Arc<ActionContext>) {
        self.status.store(Status::Running as u8, Ordering::SeqCst);
        *self.started_at.lock().unwrap() = Some(Instant::now());

        let rc = self.behavior.do_run(ctx).await;

        let elapsed = self.started_at.lock().unwrap().map(|s| s.elapsed());
        *self.duration.lock().unwrap() = elapsed;

        let outcome: ActionOutcome = if rc.is_ok() {
            self.status.store(Status::Succeeded as u8, Ordering::SeqCst);
            Ok(())
        } else {
            self.status.store(Status::Failed as u8, Ordering::SeqCst);
            Err(format!("{rc}"))
        };
        let _ = self.signal_tx.send(Some(outcome));
    }

    /// Scheduler-driven failure propagation: a dependee failed, so this
    /// action never runs. Does not invoke `do_run`.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.status.store(Status::Failed as u8, Ordering::SeqCst);
        let _ = self.signal_tx.send(Some(Err(reason.into())));
    }

    /// Re-creates the completion signal and returns status to INIT. No-op
    /// while the action is INIT or RUNNING (used by [`loop_action`] between
    /// iterations).
    pub fn reset(&self) {
        let status = self.status();
        if status == Status::Init || status == Status::Running {
            tracing::warn!(action_id = self.id, status = %status, "reset() ignored, action not terminal");
            return;
        }
        self.status.store(Status::Init as u8, Ordering::SeqCst);
        *self.started_at.lock().unwrap() = None;
        *self.duration.lock().unwrap() = None;
        let _ = self.signal_tx.send(None);
    }
}
