//! Control-flow and notifier actions: the simplest members of the C5
//! taxonomy, grounded in `core/EmptyAction.h`, `RunTaskAction.h`,
//! `WaitAction.h`, `AssignAction.h`, `SendEmailAction.h` and
//! `CheckProcAction.h` of the original source.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::action::{ActionBehavior, ActionContext, ResultCode};
use crate::expr::{self, Value};
use crate::remote::RemoteExec;

/// Always-OK marker, used as the synthetic SOURCE/SINK/Begin/End nodes
/// normalizing multi-root and multi-leaf DAGs (§4.2, §4.5), and as a plain
/// no-op placeholder within a plan.
pub struct EmptyAction {
    name: String,
}

impl EmptyAction {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ActionBehavior for EmptyAction {
    async fn do_run(&self, _ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        ResultCode::Ok
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// A one-shot closure wrapped as an action. Used internally by the
/// scheduler for the synthetic report/notification SINK.
pub struct RunTaskAction {
    name: String,
    task: Box<dyn Fn() -> ResultCode + Send + Sync>,
}

impl RunTaskAction {
    pub fn new(name: impl Into<String>, task: impl Fn() -> ResultCode + Send + Sync + 'static) -> Self {
        Self { name: name.into(), task: Box::new(task) }
    }
}

#[async_trait]
impl ActionBehavior for RunTaskAction {
    async fn do_run(&self, _ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        (self.task)()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Sleeps for a fixed duration. `wait_time_ms` must be strictly positive --
/// the source enforces this with `CHECK_LT(0, waitTimeMs)`; this port
/// rejects it as a construction-time error rather than aborting the
/// process (see `WaitAction::new`).
pub struct WaitAction {
    wait_time_ms: u64,
}

impl WaitAction {
    pub fn new(wait_time_ms: u64) -> Result<Self, String> {
        if wait_time_ms == 0 {
            return Err("wait_time_ms must be > 0".to_string());
        }
        Ok(Self { wait_time_ms })
    }
}

#[async_trait]
impl ActionBehavior for WaitAction {
    async fn do_run(&self, _ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        tokio::time::sleep(std::time::Duration::from_millis(self.wait_time_ms)).await;
        ResultCode::Ok
    }

    fn describe(&self) -> String {
        format!("wait {}ms", self.wait_time_ms)
    }
}

/// Parses `expr`, evaluates it against the action context, stores the
/// result under `var`. Fails (no retry) if either parse or eval fails.
pub struct AssignAction {
    var: String,
    expr_text: String,
}

impl AssignAction {
    pub fn new(var: impl Into<String>, expr_text: impl Into<String>) -> Self {
        Self { var: var.into(), expr_text: expr_text.into() }
    }
}

#[async_trait]
impl ActionBehavior for AssignAction {
    async fn do_run(&self, ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        let Some(expr) = expr::parse(&self.expr_text) else {
            warn!(expr = %self.expr_text, "AssignAction: parse failed");
            return ResultCode::ErrFailedNoRetry;
        };
        let snapshot = ctx.snapshot_expr_ctx().await;
        match expr.eval(&snapshot) {
            Ok(value) => {
                ctx.set_var(self.var.clone(), value).await;
                ResultCode::Ok
            }
            Err(e) => {
                warn!(error = %e, "AssignAction: eval failed");
                ResultCode::ErrFailedNoRetry
            }
        }
    }

    fn describe(&self) -> String {
        format!("${}={}", self.var, self.expr_text)
    }
}

/// Parses and evaluates `cond` purely for its boolean side effect -- used
/// as an assertion, distinct from the loop condition which is parsed and
/// evaluated internally by `LoopAction`.
pub struct ExecutionExpressionAction {
    cond_text: String,
}

impl ExecutionExpressionAction {
    pub fn new(cond_text: impl Into<String>) -> Self {
        Self { cond_text: cond_text.into() }
    }
}

#[async_trait]
impl ActionBehavior for ExecutionExpressionAction {
    async fn do_run(&self, ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        let Some(expr) = expr::parse(&self.cond_text) else {
            warn!(expr = %self.cond_text, "ExecutionExpressionAction: parse failed");
            return ResultCode::ErrFailedNoRetry;
        };
        let snapshot = ctx.snapshot_expr_ctx().await;
        match expr.eval(&snapshot) {
            Ok(value) if value.as_bool() => ResultCode::Ok,
            Ok(_) => ResultCode::ErrFailed,
            Err(e) => {
                warn!(error = %e, "ExecutionExpressionAction: eval failed");
                ResultCode::ErrFailedNoRetry
            }
        }
    }

    fn describe(&self) -> String {
        format!("Execution expression {}", self.cond_text)
    }
}

/// Liveness probe distinct from Start/Stop's pidfile-based check: SSH's to
/// `host` and checks whether `pid` is alive.
pub struct CheckProcAction {
    host: String,
    pid: u32,
    user: Option<String>,
    remote: std::sync::Arc<dyn RemoteExec>,
}

impl CheckProcAction {
    pub fn new(host: impl Into<String>, pid: u32, user: Option<String>, remote: std::sync::Arc<dyn RemoteExec>) -> Self {
        Self { host: host.into(), pid, user, remote }
    }
}

#[async_trait]
impl ActionBehavior for CheckProcAction {
    async fn do_run(&self, _ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        let cmd = format!("ps -p {} > /dev/null 2>&1", self.pid);
        match self.remote.run(&cmd, &self.host, self.user.as_deref()).await {
            Ok(out) if out.exit_code == 0 => ResultCode::Ok,
            Ok(_) => ResultCode::ErrNotFound,
            Err(e) => {
                warn!(error = %e, "CheckProcAction: ssh failed");
                ResultCode::ErrFailed
            }
        }
    }

    fn describe(&self) -> String {
        format!("check process {} on {}", self.pid, self.host)
    }
}

/// Shells out to a local `mail`-compatible command. Delivery failure never
/// changes plan status (§6) -- it only affects this one action's own
/// result, and this action is only ever wired as the scheduler's SINK.
pub struct SendEmailAction {
    subject: String,
    content: String,
    to: String,
    attachment: Option<String>,
}

impl SendEmailAction {
    pub fn new(subject: impl Into<String>, content: impl Into<String>, to: impl Into<String>, attachment: Option<String>) -> Self {
        Self { subject: subject.into(), content: content.into(), to: to.into(), attachment }
    }
}

#[async_trait]
impl ActionBehavior for SendEmailAction {
    async fn do_run(&self, _ctx: std::sync::Arc<ActionContext>) -> ResultCode {
        let mut mail_args = vec!["-s".to_string(), self.subject.clone()];
        if let Some(attachment) = &self.attachment {
            mail_args.push("-a".to_string());
            mail_args.push(attachment.clone());
        }
        mail_args.push(self.to.clone());

        let echo = Command::new("echo").arg(&self.content).output().await;
        let piped = match echo {
            Ok(out) => out.stdout,
            Err(e) => {
                warn!(error = %e, "SendEmailAction: failed to prepare body");
                return ResultCode::ErrFailed;
            }
        };

        let mut child = match Command::new("mail")
            .args(&mail_args)
            .stdin(std::process::Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "SendEmailAction: failed to spawn mail");
                return ResultCode::ErrFailed;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            if stdin.write_all(&piped).await.is_err() {
                return ResultCode::ErrFailed;
            }
        }

        match child.wait().await {
            Ok(status) if status.success() => ResultCode::Ok,
            _ => ResultCode::ErrFailed,
        }
    }

    fn describe(&self) -> String {
        format!("send email to {}: {}", self.to, self.subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionContext;

    #[tokio::test]
    async fn empty_action_always_ok() {
        let ctx = std::sync::Arc::new(ActionContext::new());
        let a = EmptyAction::new("Begin");
        assert_eq!(a.do_run(ctx).await, ResultCode::Ok);
        assert_eq!(a.describe(), "Begin");
    }

    #[tokio::test]
    async fn wait_action_rejects_zero() {
        assert!(WaitAction::new(0).is_err());
        assert!(WaitAction::new(5).is_ok());
    }

    #[tokio::test]
    async fn assign_action_stores_result() {
        let ctx = std::sync::Arc::new(ActionContext::new());
        let a = AssignAction::new("a", "1+2*3");
        assert_eq!(a.do_run(ctx.clone()).await, ResultCode::Ok);
        assert_eq!(ctx.get_var("a").await.unwrap(), Value::Int64(7));
    }

    #[tokio::test]
    async fn assign_action_parse_failure_is_no_retry() {
        let ctx = std::sync::Arc::new(ActionContext::new());
        let a = AssignAction::new("a", "$a +");
        assert_eq!(a.do_run(ctx).await, ResultCode::ErrFailedNoRetry);
    }

    #[tokio::test]
    async fn execution_expression_parse_failure_propagates() {
        let ctx = std::sync::Arc::new(ActionContext::new());
        let a = ExecutionExpressionAction::new("$a +");
        assert_eq!(a.do_run(ctx).await, ResultCode::ErrFailedNoRetry);
    }

    #[tokio::test]
    async fn execution_expression_false_is_failed() {
        let ctx = std::sync::Arc::new(ActionContext::new());
        let a = ExecutionExpressionAction::new("1 > 2");
        assert_eq!(a.do_run(ctx).await, ResultCode::ErrFailed);
    }
}
