//! Per-plan shared mutable state (component C3).

use tokio::sync::Mutex;

use crate::expr::{ExprContext, Value};

/// State shared by every action in one plan: today just the expression
/// variable map, but kept as its own type (rather than a bare
/// `Mutex<ExprContext>`) as an explicit extension point for future shared
/// resources -- a database client handle, a remote-target registry, etc.
pub struct ActionContext {
    expr_ctx: Mutex<ExprContext>,
}

impl ActionContext {
    pub fn new() -> Self {
        Self { expr_ctx: Mutex::new(ExprContext::new()) }
    }

    pub async fn get_var(&self, name: &str) -> Result<Value, crate::expr::ExprError> {
        self.expr_ctx.lock().await.get_var(name)
    }

    pub async fn set_var(&self, name: impl Into<String>, value: Value) {
        self.expr_ctx.lock().await.set_var(name, value);
    }

    /// Runs a closure against a snapshot clone of the expression context.
    /// Used by action bodies that need to evaluate an expression without
    /// holding the lock across an `.await`.
    pub async fn snapshot_expr_ctx(&self) -> ExprContext {
        self.expr_ctx.lock().await.clone()
    }
}

impl Default for ActionContext {
    fn default() -> Self {
        Self::new()
    }
}
