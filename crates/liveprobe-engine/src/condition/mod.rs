//! Boolean predicates over captured context.
//!
//! The language covers what instrument conditions need:
//!
//! - literals: integers, floats, `'single'` or `"double"` quoted strings,
//!   `true`, `false`, `null`
//! - identifiers, resolved against locals, then fields, then statics;
//!   `localVariables`, `fields` and `staticFields` name one scope explicitly
//! - member access `a.b` and indexing `a[0]`, `a['key']`
//! - `== != < <= > >=`, `&& || !` (also `and or not`), `+ - * / %`,
//!   parentheses
//!
//! Expressions are capped at 1024 tokens and 64 levels of nesting.
//!
//! A condition must evaluate to a boolean. Unresolvable names are errors,
//! not `false`.
//!
//! ```text
//! let p = compile("order.total > 100 && !fields.flagged")?;
//! assert!(p.evaluate(&ctx)?);
//! ```

mod eval;
mod lexer;
mod parser;

use std::fmt;

use liveprobe_core::ConditionError;

use crate::capture::CaptureContext;

/// A parsed condition, ready for repeated evaluation.
#[derive(Clone)]
pub struct CompiledPredicate {
    source: String,
    expr: parser::Expr,
}

impl CompiledPredicate {
    /// Parse `source`.
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_owned(),
            expr,
        })
    }

    /// Evaluate against a captured context.
    pub fn evaluate(&self, ctx: &CaptureContext) -> Result<bool, ConditionError> {
        let value = eval::eval(&self.expr, ctx)?;
        eval::as_bool(&value)
    }

    /// The expression text this predicate was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for CompiledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledPredicate")
            .field(&self.source)
            .finish()
    }
}

/// Compile a condition expression.
pub fn compile(source: &str) -> Result<CompiledPredicate, ConditionError> {
    CompiledPredicate::compile(source)
}

/// Evaluate a compiled predicate against a context.
pub fn evaluate(predicate: &CompiledPredicate, ctx: &CaptureContext) -> Result<bool, ConditionError> {
    predicate.evaluate(ctx)
}
