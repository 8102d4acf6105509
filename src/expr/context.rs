//! Expression evaluation context: a flat `name -> Value` map.
//!
//! This is distinct from `crate::action::ActionContext`, which wraps this
//! context plus whatever other shared state actions need; kept separate so
//! the expression evaluator has no dependency on the action framework.

use std::collections::HashMap;

use crate::expr::{ExprError, Value};

/// Variable bindings visible to the expression evaluator.
#[derive(Debug, Clone, Default)]
pub struct ExprContext {
    vars: HashMap<String, Value>,
}

impl ExprContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Err(ExprError::Null)` when the variable is not bound,
    /// matching the source's `getVar` contract.
    pub fn get_var(&self, name: &str) -> Result<Value, ExprError> {
        self.vars.get(name).cloned().ok_or(ExprError::Null)
    }

    /// Inserts or overwrites a binding.
    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_null() {
        let ctx = ExprContext::new();
        assert_eq!(ctx.get_var("missing"), Err(ExprError::Null));
    }

    #[test]
    fn set_then_get() {
        let mut ctx = ExprContext::new();
        ctx.set_var("a", Value::Int64(7));
        assert_eq!(ctx.get_var("a"), Ok(Value::Int64(7)));
    }
}
