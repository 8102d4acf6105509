//! Expression AST and evaluator (component C1).
//!
//! ## Para todos entenderem:
//!
//! Uma expressão como `"$i + 1 < 3"` vira uma pequena árvore:
//!
//! ```text
//!          <
//!         / \
//!        +   3
//!       / \
//!     $i   1
//! ```
//!
//! `eval()` percorre essa árvore recursivamente: primeiro avalia os filhos,
//! depois combina os resultados de acordo com o operador do nó.

use std::fmt;

use crate::expr::{ExprContext, ExprError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

/// A node of the expression tree. Owned, no sharing, no cycles.
#[derive(Debug, Clone)]
pub enum Expression {
    Constant(Value),
    Variable(String),
    Unary(UnaryOp, Box<Expression>),
    Arithmetic(ArithOp, Box<Expression>, Box<Expression>),
    Relational(RelOp, Box<Expression>, Box<Expression>),
    Logical(LogicalOp, Box<Expression>, Box<Expression>),
}

impl Expression {
    /// Evaluates this expression against `ctx`. Pure in `ctx` -- never
    /// mutates it.
    pub fn eval(&self, ctx: &ExprContext) -> Result<Value, ExprError> {
        match self {
            Expression::Constant(v) => Ok(v.clone()),
            Expression::Variable(name) => ctx.get_var(name),
            Expression::Unary(op, inner) => eval_unary(*op, inner.eval(ctx)?),
            Expression::Arithmetic(op, l, r) => eval_arithmetic(*op, l.eval(ctx)?, r.eval(ctx)?),
            Expression::Relational(op, l, r) => eval_relational(*op, l.eval(ctx)?, r.eval(ctx)?),
            Expression::Logical(op, l, r) => eval_logical(*op, l, r, ctx),
        }
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, ExprError> {
    match op {
        UnaryOp::Plus => {
            if v.is_arithmetic() {
                Ok(v)
            } else {
                Err(ExprError::UnsupportedOp)
            }
        }
        UnaryOp::Negate => match v {
            Value::Int64(i) => i
                .checked_neg()
                .map(Value::Int64)
                .ok_or(ExprError::ArithmeticOverflow),
            Value::Double(d) => Ok(Value::Double(-d)),
            _ => Err(ExprError::UnsupportedOp),
        },
        UnaryOp::Not => Ok(Value::Bool(!v.as_bool())),
    }
}

fn eval_arithmetic(op: ArithOp, l: Value, r: Value) -> Result<Value, ExprError> {
    // String concatenation is the one non-arithmetic case `+` accepts.
    if let (ArithOp::Add, Value::String(a), Value::String(b)) = (op, &l, &r) {
        return Ok(Value::String(format!("{a}{b}")));
    }
    if l.is_string() || r.is_string() {
        return Err(ExprError::UnsupportedOp);
    }
    if !l.is_arithmetic() || !r.is_arithmetic() {
        return Err(ExprError::UnsupportedOp);
    }

    if l.is_int() && r.is_int() {
        let (a, b) = (l.as_int().unwrap(), r.as_int().unwrap());
        return eval_int_arithmetic(op, a, b);
    }

    let (a, b) = (l.as_double().unwrap(), r.as_double().unwrap());
    eval_double_arithmetic(op, a, b)
}

fn eval_int_arithmetic(op: ArithOp, a: i64, b: i64) -> Result<Value, ExprError> {
    let overflow = ExprError::ArithmeticOverflow;
    match op {
        ArithOp::Add => a.checked_add(b).map(Value::Int64).ok_or(overflow),
        ArithOp::Sub => a.checked_sub(b).map(Value::Int64).ok_or(overflow),
        ArithOp::Mul => a.checked_mul(b).map(Value::Int64).ok_or(overflow),
        ArithOp::Div => {
            if b == 0 {
                Err(ExprError::DivideByZero)
            } else {
                a.checked_div(b).map(Value::Int64).ok_or(overflow)
            }
        }
        ArithOp::Mod => {
            if b == 0 {
                Err(ExprError::DivideByZero)
            } else {
                a.checked_rem(b).map(Value::Int64).ok_or(overflow)
            }
        }
    }
}

fn eval_double_arithmetic(op: ArithOp, a: f64, b: f64) -> Result<Value, ExprError> {
    match op {
        ArithOp::Add => Ok(Value::Double(a + b)),
        ArithOp::Sub => Ok(Value::Double(a - b)),
        ArithOp::Mul => Ok(Value::Double(a * b)),
        ArithOp::Div => {
            if b.abs() < Value::EPSILON {
                Err(ExprError::DivideByZero)
            } else {
                Ok(Value::Double(a / b))
            }
        }
        ArithOp::Mod => {
            if b.abs() < Value::EPSILON {
                Err(ExprError::DivideByZero)
            } else {
                Ok(Value::Double(a % b))
            }
        }
    }
}

fn eval_relational(op: RelOp, l: Value, r: Value) -> Result<Value, ExprError> {
    match op {
        RelOp::Lt | RelOp::Le | RelOp::Gt | RelOp::Ge => eval_ordering(op, l, r),
        RelOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        RelOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
    }
}

fn eval_ordering(op: RelOp, l: Value, r: Value) -> Result<Value, ExprError> {
    // Cross-type comparison is rejected rather than compared by tag --
    // see DESIGN.md open question #2.
    let ordering = if l.is_arithmetic() && r.is_arithmetic() {
        let (a, b) = (l.as_double().unwrap(), r.as_double().unwrap());
        a.partial_cmp(&b).ok_or(ExprError::UnsupportedOp)?
    } else if let (Value::String(a), Value::String(b)) = (&l, &r) {
        a.cmp(b)
    } else if let (Value::Bool(a), Value::Bool(b)) = (&l, &r) {
        a.cmp(b)
    } else {
        return Err(ExprError::UnsupportedOp);
    };

    let result = match op {
        RelOp::Lt => ordering.is_lt(),
        RelOp::Le => ordering.is_le(),
        RelOp::Gt => ordering.is_gt(),
        RelOp::Ge => ordering.is_ge(),
        RelOp::Eq | RelOp::Ne => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// `=`/`!=` semantics: epsilon compare when either side is Double,
/// exact compare otherwise. Cross-type operands are simply unequal,
/// mirroring the source's fallback to the tagged union's raw `==`.
fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int64(a), Value::Int64(b)) => a == b,
        (Value::Double(_), _) | (_, Value::Double(_)) if l.is_arithmetic() && r.is_arithmetic() => {
            Value::almost_equal(l.as_double().unwrap(), r.as_double().unwrap())
        }
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn eval_logical(
    op: LogicalOp,
    l: &Expression,
    r: &Expression,
    ctx: &ExprContext,
) -> Result<Value, ExprError> {
    match op {
        LogicalOp::And => {
            let lv = l.eval(ctx)?;
            if !lv.as_bool() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(r.eval(ctx)?.as_bool()))
        }
        LogicalOp::Or => {
            let lv = l.eval(ctx)?;
            if lv.as_bool() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(r.eval(ctx)?.as_bool()))
        }
        LogicalOp::Xor => {
            let lv = l.eval(ctx)?.as_bool();
            let rv = r.eval(ctx)?.as_bool();
            Ok(Value::Bool(lv ^ rv))
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(v) => write!(f, "{v}"),
            Expression::Variable(name) => write!(f, "${name}"),
            Expression::Unary(op, inner) => {
                let sym = match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Negate => "-",
                    UnaryOp::Not => "!",
                };
                write!(f, "{sym}{inner}")
            }
            Expression::Arithmetic(op, l, r) => write!(f, "({l} {} {r})", arith_sym(*op)),
            Expression::Relational(op, l, r) => write!(f, "({l} {} {r})", rel_sym(*op)),
            Expression::Logical(op, l, r) => write!(f, "({l} {} {r})", logical_sym(*op)),
        }
    }
}

fn arith_sym(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "+",
        ArithOp::Sub => "-",
        ArithOp::Mul => "*",
        ArithOp::Div => "/",
        ArithOp::Mod => "%",
    }
}

fn rel_sym(op: RelOp) -> &'static str {
    match op {
        RelOp::Lt => "<",
        RelOp::Le => "<=",
        RelOp::Gt => ">",
        RelOp::Ge => ">=",
        RelOp::Eq => "==",
        RelOp::Ne => "!=",
    }
}

fn logical_sym(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "&&",
        LogicalOp::Or => "||",
        LogicalOp::Xor => "xor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExprContext {
        ExprContext::new()
    }

    #[test]
    fn string_concat() {
        let e = Expression::Arithmetic(
            ArithOp::Add,
            Box::new(Expression::Constant(Value::String("a".into()))),
            Box::new(Expression::Constant(Value::String("b".into()))),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::String("ab".into()));
    }

    #[test]
    fn string_plus_int_is_error() {
        let e = Expression::Arithmetic(
            ArithOp::Add,
            Box::new(Expression::Constant(Value::String("a".into()))),
            Box::new(Expression::Constant(Value::Int64(1))),
        );
        assert_eq!(e.eval(&ctx()), Err(ExprError::UnsupportedOp));
    }

    #[test]
    fn int_overflow_is_arithmetic_overflow_not_panic() {
        let e = Expression::Arithmetic(
            ArithOp::Add,
            Box::new(Expression::Constant(Value::Int64(i64::MAX))),
            Box::new(Expression::Constant(Value::Int64(1))),
        );
        assert_eq!(e.eval(&ctx()), Err(ExprError::ArithmeticOverflow));
    }

    #[test]
    fn divide_by_zero_int() {
        let e = Expression::Arithmetic(
            ArithOp::Div,
            Box::new(Expression::Constant(Value::Int64(1))),
            Box::new(Expression::Constant(Value::Int64(0))),
        );
        assert_eq!(e.eval(&ctx()), Err(ExprError::DivideByZero));
    }

    #[test]
    fn double_promotion_on_mixed_arithmetic() {
        let e = Expression::Arithmetic(
            ArithOp::Add,
            Box::new(Expression::Constant(Value::Int64(1))),
            Box::new(Expression::Constant(Value::Double(2.5))),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::Double(3.5));
    }

    #[test]
    fn epsilon_equality() {
        let e = Expression::Relational(
            RelOp::Eq,
            Box::new(Expression::Constant(Value::Double(0.1 + 0.2))),
            Box::new(Expression::Constant(Value::Double(0.3))),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn one_point_zero_equals_one_int() {
        let e = Expression::Relational(
            RelOp::Eq,
            Box::new(Expression::Constant(Value::Double(1.0))),
            Box::new(Expression::Constant(Value::Int64(1))),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn cross_type_ordering_rejected() {
        let e = Expression::Relational(
            RelOp::Lt,
            Box::new(Expression::Constant(Value::Int64(1))),
            Box::new(Expression::Constant(Value::String("x".into()))),
        );
        assert_eq!(e.eval(&ctx()), Err(ExprError::UnsupportedOp));
    }

    #[test]
    fn and_short_circuits_without_evaluating_rhs() {
        // RHS would error (string - int) if evaluated; it must not be.
        let rhs = Expression::Arithmetic(
            ArithOp::Add,
            Box::new(Expression::Constant(Value::String("x".into()))),
            Box::new(Expression::Constant(Value::Int64(1))),
        );
        let e = Expression::Logical(
            LogicalOp::And,
            Box::new(Expression::Constant(Value::Bool(false))),
            Box::new(rhs),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::Bool(false));
    }

    #[test]
    fn or_short_circuits_without_evaluating_rhs() {
        let rhs = Expression::Arithmetic(
            ArithOp::Add,
            Box::new(Expression::Constant(Value::String("x".into()))),
            Box::new(Expression::Constant(Value::Int64(1))),
        );
        let e = Expression::Logical(
            LogicalOp::Or,
            Box::new(Expression::Constant(Value::Bool(true))),
            Box::new(rhs),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn xor_evaluates_both_sides() {
        let e = Expression::Logical(
            LogicalOp::Xor,
            Box::new(Expression::Constant(Value::Bool(true))),
            Box::new(Expression::Constant(Value::Bool(false))),
        );
        assert_eq!(e.eval(&ctx()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn variable_lookup_missing_is_null_error() {
        let e = Expression::Variable("missing".into());
        assert_eq!(e.eval(&ctx()), Err(ExprError::Null));
    }

    #[test]
    fn negate_int_overflow() {
        let e = Expression::Unary(UnaryOp::Negate, Box::new(Expression::Constant(Value::Int64(i64::MIN))));
        assert_eq!(e.eval(&ctx()), Err(ExprError::ArithmeticOverflow));
    }
}
