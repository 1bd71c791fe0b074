use thiserror::Error;

/// Unified error type for the galleon execution core.
///
/// Recoverable failures (allocation, mismatched inputs) surface through this
/// enum; out-of-bounds access on columns is reported through `Option`/`bool`
/// return shapes instead and never reaches an error value.
#[derive(Error, Debug, PartialEq)]
pub enum GalleonError {
    #[error("Memory error: {0}")]
    Memory(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution error: {0}")]
    Execution(String),
}
