//! Error types for array operations.

/// Data-level failures raised while reshaping or indexing arrays.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArrayError {
    #[error("Unknown dimension: '{0}'")]
    UnknownDim(String),

    #[error("Index {index} out of range for dimension '{dim}' of size {size}")]
    IndexOutOfRange { dim: String, index: i64, size: usize },

    #[error("Slice step must not be zero (dimension '{0}')")]
    ZeroStep(String),

    #[error("Dimension '{dim}' has size {size}, expected 1")]
    NotSizeOne { dim: String, size: usize },

    #[error("Values length {actual} does not match shape product {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Dimension '{dim}' has conflicting sizes {left} and {right}")]
    DimSizeConflict { dim: String, left: usize, right: usize },
}
