//! Error taxonomy for the filter/derived-channel engine.
//!
//! Two layers: [`ExpressionError`] is raised by the expression evaluator and
//! carries the original failure text; [`EngineError`] classifies how a caller
//! must react. `Validation` blocks a create/edit dialog; `Apply` and
//! `Configuration` mean "skip this import, keep going". No failure in one
//! import's evaluation may abort any other import, filter or definition.

use thiserror::Error;

/// Failure inside the expression evaluator (unknown name, arity mismatch,
/// zero division, ...). The payload is the original error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExpressionError(pub String);

impl ExpressionError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

/// Errors surfaced by the engine around the evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Expression rejected at create/edit time. Blocks acceptance of the
    /// definition; shown inline by the UI.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Evaluation failed while materializing a definition for one specific
    /// import. That import is skipped; all others continue.
    #[error("import {import}: {source}")]
    Apply { import: u64, source: ExpressionError },

    /// A mandatory slot is unbound, or a bound slot names a channel the
    /// import does not carry. Recovered exactly like `Apply`.
    #[error("configuration: {0}")]
    Configuration(String),
}
