//! Error types for the cortical engine.
//!
//! This module provides a unified error type for all operations in the
//! engine, using the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

/// The main error type for cortical operations.
///
/// Configuration and snapshot errors are reported at load time; the engine
/// refuses to start (or discards partial state) when one occurs. The step
/// function itself is total once configuration is accepted.
#[derive(Error, Debug)]
pub enum CorticalError {
    /// A network description parameter is malformed or out of range
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A region names an input data space that does not exist (or is
    /// declared after the region itself)
    #[error("unknown input data space: {id}")]
    UnknownInput {
        /// The id that failed to resolve
        id: String,
    },

    /// Snapshot state is incompatible with the loaded network
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    /// Index out of bounds
    #[error("index out of bounds: index {index}, length {length}")]
    IndexOutOfBounds {
        /// The index that was accessed
        index: usize,
        /// The valid length
        length: usize,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary serialization error occurred
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON error occurred
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// A specialized `Result` type for cortical operations.
pub type Result<T> = std::result::Result<T, CorticalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CorticalError::Config("sizeX must be divisible by hypercolumnDiameter".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: sizeX must be divisible by hypercolumnDiameter"
        );

        let err = CorticalError::UnknownInput { id: "retina".into() };
        assert_eq!(err.to_string(), "unknown input data space: retina");

        let err = CorticalError::IndexOutOfBounds { index: 12, length: 4 };
        assert_eq!(err.to_string(), "index out of bounds: index 12, length 4");
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
