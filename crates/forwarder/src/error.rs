//! Generation faults.
//!
//! These indicate a bug in the generator, not a bad spec: invalid specs are
//! reported through status reasons and never surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// A routing edge targets an output that is not live
    #[error("routing edge {input} -> {output} references a store that is not live")]
    DanglingEdge { input: String, output: String },

    /// Writing the configuration text failed
    #[error("failed to render collector configuration: {0}")]
    Render(#[from] std::fmt::Error),
}

pub type Result<T, E = GenerateError> = std::result::Result<T, E>;
