//! Tree-walking evaluator over a [`CaptureContext`].
//!
//! Values are `serde_json::Value`s borrowed from the context where possible.
//! Integer arithmetic stays in `i64` and falls back to `f64` on overflow.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;

use liveprobe_core::ConditionError;

use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::capture::{CaptureContext, Scope};

pub(crate) fn eval<'c>(expr: &Expr, ctx: &'c CaptureContext) -> Result<Cow<'c, Value>, ConditionError> {
    match expr {
        Expr::Literal(v) => Ok(Cow::Owned(v.clone())),
        Expr::Var(name) => resolve_var(name, ctx),
        Expr::Member(inner, field) => {
            if let Expr::Var(root) = inner.as_ref() {
                if ctx.resolve(root).is_none() {
                    if let Some(scope) = Scope::from_root(root) {
                        return ctx
                            .scope(scope)
                            .get(field)
                            .map(Cow::Borrowed)
                            .ok_or_else(|| undefined(expr));
                    }
                }
            }
            match eval(inner, ctx)? {
                Cow::Borrowed(v) => v.get(field).map(Cow::Borrowed),
                Cow::Owned(v) => v.get(field).cloned().map(Cow::Owned),
            }
            .ok_or_else(|| undefined(expr))
        }
        Expr::Index(inner, index) => {
            let index = eval(index, ctx)?;
            let base = eval(inner, ctx)?;
            let found = match (&*index, base) {
                (Value::Number(n), Cow::Borrowed(v)) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| v.get(i))
                    .map(Cow::Borrowed),
                (Value::Number(n), Cow::Owned(v)) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| v.get(i).cloned())
                    .map(Cow::Owned),
                (Value::String(key), Cow::Borrowed(v)) => v.get(key).map(Cow::Borrowed),
                (Value::String(key), Cow::Owned(v)) => v.get(key).cloned().map(Cow::Owned),
                _ => None,
            };
            found.ok_or_else(|| undefined(expr))
        }
        Expr::Unary(UnaryOp::Not, inner) => {
            let v = eval(inner, ctx)?;
            Ok(Cow::Owned(Value::Bool(!as_bool(&v)?)))
        }
        Expr::Unary(UnaryOp::Neg, inner) => {
            let v = eval(inner, ctx)?;
            match &*v {
                Value::Number(n) => Ok(Cow::Owned(negate(n))),
                other => Err(ConditionError::TypeMismatch {
                    op: "-",
                    left: "number",
                    right: type_name(other),
                }),
            }
        }
        Expr::Binary(BinaryOp::And, l, r) => {
            if !as_bool(&*eval(l, ctx)?)? {
                return Ok(Cow::Owned(Value::Bool(false)));
            }
            Ok(Cow::Owned(Value::Bool(as_bool(&*eval(r, ctx)?)?)))
        }
        Expr::Binary(BinaryOp::Or, l, r) => {
            if as_bool(&*eval(l, ctx)?)? {
                return Ok(Cow::Owned(Value::Bool(true)));
            }
            Ok(Cow::Owned(Value::Bool(as_bool(&*eval(r, ctx)?)?)))
        }
        Expr::Binary(op, l, r) => {
            let left = eval(l, ctx)?;
            let right = eval(r, ctx)?;
            binary(*op, &left, &right).map(Cow::Owned)
        }
    }
}

fn resolve_var<'c>(name: &str, ctx: &'c CaptureContext) -> Result<Cow<'c, Value>, ConditionError> {
    if let Some(v) = ctx.resolve(name) {
        return Ok(Cow::Borrowed(v));
    }
    Scope::from_root(name)
        .map(|scope| Cow::Owned(Value::Object(ctx.scope(scope).clone())))
        .ok_or_else(|| ConditionError::UndefinedVariable(name.to_owned()))
}

fn undefined(expr: &Expr) -> ConditionError {
    ConditionError::UndefinedVariable(expr.to_string())
}

pub(crate) fn as_bool(v: &Value) -> Result<bool, ConditionError> {
    v.as_bool().ok_or(ConditionError::NotBoolean(type_name(v)))
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn negate(n: &serde_json::Number) -> Value {
    match n.as_i64().and_then(i64::checked_neg) {
        Some(i) => Value::from(i),
        None => Value::from(-n.as_f64().unwrap_or(0.0)),
    }
}

fn mismatch(op: BinaryOp, l: &Value, r: &Value) -> ConditionError {
    ConditionError::TypeMismatch {
        op: op.symbol(),
        left: type_name(l),
        right: type_name(r),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ConditionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(l, r).ok_or_else(|| mismatch(op, l, r))?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (l, r) {
            (Value::String(a), b) => Ok(Value::String(format!("{a}{}", display(b)))),
            (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", display(a)))),
            (Value::Number(_), Value::Number(_)) => arithmetic(op, l, r),
            _ => Err(mismatch(op, l, r)),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, l, r),
        // short-circuited in eval
        BinaryOp::And | BinaryOp::Or => Err(mismatch(op, l, r)),
    }
}

fn display(v: &Value) -> Cow<'_, str> {
    match v {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ConditionError> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(mismatch(op, l, r));
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div | BinaryOp::Rem if y == 0 => return Err(ConditionError::DivisionByZero),
            BinaryOp::Div => x.checked_div(y),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(n) = exact {
            return Ok(Value::from(n));
        }
    }
    let (x, y) = (
        a.as_f64().ok_or_else(|| mismatch(op, l, r))?,
        b.as_f64().ok_or_else(|| mismatch(op, l, r))?,
    );
    let n = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => return Err(ConditionError::DivisionByZero),
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        _ => return Err(mismatch(op, l, r)),
    };
    // serde_json stores non-finite floats as null
    if !n.is_finite() {
        return Err(ConditionError::NonFinite(op.symbol()));
    }
    Ok(Value::from(n))
}
