//! Core types for tessera layers.
//!
//! `tessera-core` provides the foundational types (`Tensor`, `IntTensor`,
//! `DType`, `Shape`), the shared error type, and the `Ops` primitives
//! (allocation, row gather, scatter-add) that layers consume rather than
//! reimplement.

pub mod ops;
pub mod tensor;
pub mod types;
pub mod width;

pub use ops::{CpuOps, Ops, default_ops};
pub use tensor::{IntTensor, Tensor};
pub use types::{DType, Shape};
pub use width::get_width;

pub type Result<T> = std::result::Result<T, TesseraError>;

#[derive(thiserror::Error, Debug)]
pub enum TesseraError {
    #[error("dimension {dim} not resolved")]
    DimensionUnset { dim: &'static str },

    #[error("attempt to change dimension {dim} from {old} to {new}")]
    DimensionConflict {
        dim: &'static str,
        old: usize,
        new: usize,
    },

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("layer {layer} used before initialize")]
    NotInitialized { layer: String },

    #[error("parameter {0} has no value")]
    MissingParam(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TesseraError {
    /// Missing or contradictory dimension configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TesseraError::DimensionUnset { .. }
                | TesseraError::DimensionConflict { .. }
                | TesseraError::UnknownDimension(_)
        )
    }

    /// An operation invoked in a state that does not allow it.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            TesseraError::NotInitialized { .. } | TesseraError::MissingParam(_)
        )
    }

    /// Build a `ShapeMismatch` from two shapes.
    pub fn shape_mismatch(expected: &Shape, got: &Shape) -> Self {
        TesseraError::ShapeMismatch {
            expected: expected.dims().to_vec(),
            got: got.dims().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(TesseraError::DimensionUnset { dim: "nV" }.is_configuration());
        assert!(
            TesseraError::DimensionConflict {
                dim: "nO",
                old: 4,
                new: 8
            }
            .is_configuration()
        );
        let usage = TesseraError::NotInitialized {
            layer: "embed".into(),
        };
        assert!(usage.is_usage());
        assert!(!usage.is_configuration());
        assert!(
            !TesseraError::ShapeMismatch {
                expected: vec![2],
                got: vec![3]
            }
            .is_usage()
        );
    }

    #[test]
    fn test_error_messages() {
        let e = TesseraError::DimensionUnset { dim: "nO" };
        assert_eq!(e.to_string(), "dimension nO not resolved");
        let e = TesseraError::ShapeMismatch {
            expected: vec![3, 2],
            got: vec![2, 2],
        };
        assert_eq!(e.to_string(), "Shape mismatch: expected [3, 2], got [2, 2]");
    }
}
