//! Engine error types
//!
//! Re-exports codeact-error and provides engine-specific conveniences.

// Re-export the core error types
pub use codeact_error::{Error, ErrorKind, ErrorStatus, Result};

// =============================================================================
// Engine-specific error constructors
// =============================================================================

/// Create an InterpreterInit error
pub fn interpreter_init(reason: impl Into<String>) -> Error {
    Error::interpreter_init(reason)
}

/// Create a BindingNotFound error
pub fn binding_not_found(name: impl Into<String>) -> Error {
    Error::binding_not_found(name)
}

/// Create an ExecFailed error
pub fn exec_failed(reason: impl Into<String>) -> Error {
    Error::exec_failed(reason)
}

/// Create an ExecTimeout error
pub fn exec_timeout(secs: u64) -> Error {
    Error::exec_timeout(secs)
}

/// Create a ParseFailed error
pub fn parse_error(message: impl Into<String>) -> Error {
    Error::parse_failed(message)
}

/// Create a BufferOverflow error
pub fn buffer_overflow(len: usize, max: usize) -> Error {
    Error::buffer_overflow(len, max)
}

/// Create an InferenceFailed error
pub fn inference_failed(reason: impl Into<String>) -> Error {
    Error::inference_failed(reason)
}

/// Create an InvalidArgument error
pub fn invalid_argument(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidArgument, message)
}

/// Create an IoError error
pub fn io_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::IoFailed, message)
}

/// Create a SerializationError error
pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::SerializationFailed, message)
}

/// Create a NotImplemented error
pub fn not_implemented(feature: impl Into<String>) -> Error {
    let feature = feature.into();
    Error::new(ErrorKind::NotImplemented, format!("'{}' not yet implemented", feature))
        .with_context("feature", feature)
}
