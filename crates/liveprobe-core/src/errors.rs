//! Error taxonomy.
//!
//! [`InstrumentError`] is what install/remove callers see and what gets
//! attached as the cause of a removal event. [`TransformError`] and
//! [`ConditionError`] are the lower-level failures of the code transform
//! engine and the condition evaluator; they are wrapped as the `source` of
//! the matching [`InstrumentError`] variant.

use thiserror::Error;

use crate::ids::InstrumentId;

/// Failures reported by the external code transform engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The unit is not (or no longer) loaded.
    #[error("unit not found: {0}")]
    UnitNotFound(String),

    /// The engine refused to patch or unpatch the unit.
    #[error("transform rejected for '{unit}': {message}")]
    Rejected {
        /// Unit identifier.
        unit: String,
        /// Engine-supplied reason.
        message: String,
    },

    /// Any other engine failure.
    #[error("{0}")]
    Internal(String),
}

/// Failures compiling or evaluating a condition expression.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    /// The expression text does not parse.
    #[error("syntax error at offset {position}: {message}")]
    Syntax {
        /// Byte offset into the expression.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A name did not resolve against the captured context.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// Operand types are not valid for the operator.
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        /// Operator symbol.
        op: &'static str,
        /// Left operand type name.
        left: &'static str,
        /// Right operand type name.
        right: &'static str,
    },

    /// A unary operator or a condition result had the wrong type.
    #[error("expected boolean, found {0}")]
    NotBoolean(&'static str),

    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Floating-point arithmetic overflowed to infinity.
    #[error("'{0}' produced a non-finite number")]
    NonFinite(&'static str),
}

/// Errors surfaced by instrument install, removal, and hit evaluation.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// The condition expression failed to compile. Nothing was registered.
    #[error("invalid condition for instrument {id}: {source}")]
    ConditionInvalid {
        /// Instrument id.
        id: InstrumentId,
        /// Compile failure.
        #[source]
        source: ConditionError,
    },

    /// The target unit could not be resolved and the instrument required
    /// immediate application.
    #[error("target unit '{unit}' not found for instrument {id}")]
    TargetNotFound {
        /// Instrument id.
        id: InstrumentId,
        /// Unit that failed to resolve.
        unit: String,
    },

    /// The transform engine failed to patch the target.
    #[error("patch failed for instrument {id}: {source}")]
    PatchFailed {
        /// Instrument id.
        id: InstrumentId,
        /// Engine failure.
        #[source]
        source: TransformError,
    },

    /// The condition failed at hit time.
    #[error("condition evaluation failed for instrument {id}: {source}")]
    EvaluationFailed {
        /// Instrument id.
        id: InstrumentId,
        /// Evaluation failure.
        #[source]
        source: ConditionError,
    },

    /// The transform engine failed to remove a patch.
    #[error("unpatch failed for instrument {id}: {source}")]
    UnpatchFailed {
        /// Instrument id.
        id: InstrumentId,
        /// Engine failure.
        #[source]
        source: TransformError,
    },

    /// A deferred install ran out of retry attempts.
    #[error("instrument {id} not applied after {attempts} attempts")]
    RetriesExhausted {
        /// Instrument id.
        id: InstrumentId,
        /// Attempts made.
        attempts: u32,
    },

    /// A control-plane command could not be interpreted.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl InstrumentError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConditionInvalid { .. } => "CONDITION_INVALID",
            Self::TargetNotFound { .. } => "TARGET_NOT_FOUND",
            Self::PatchFailed { .. } => "PATCH_FAILED",
            Self::EvaluationFailed { .. } => "EVALUATION_FAILED",
            Self::UnpatchFailed { .. } => "UNPATCH_FAILED",
            Self::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Self::InvalidCommand(_) => "INVALID_COMMAND",
        }
    }

    /// Whether this error ends an install attempt without a live instrument.
    pub fn is_fatal_to_install(&self) -> bool {
        !matches!(
            self,
            Self::EvaluationFailed { .. } | Self::UnpatchFailed { .. }
        )
    }

    /// The instrument this error concerns, if any.
    pub fn instrument_id(&self) -> Option<&InstrumentId> {
        match self {
            Self::ConditionInvalid { id, .. }
            | Self::TargetNotFound { id, .. }
            | Self::PatchFailed { id, .. }
            | Self::EvaluationFailed { id, .. }
            | Self::UnpatchFailed { id, .. }
            | Self::RetriesExhausted { id, .. } => Some(id),
            Self::InvalidCommand(_) => None,
        }
    }
}
