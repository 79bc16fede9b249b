//! Error types for recoverable paths.
//!
//! Per the error-handling model, almost nothing in the hot path is a recoverable
//! error: stale handles, async-context misuse, and size mismatches are programmer
//! errors caught by `debug_assert!` at the call site. `EcdbError` exists only for the
//! genuinely recoverable paths: level-file I/O and decoding.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EcdbError {
    #[error("table not found: {0:?}")]
    TableNotFound(crate::database::TableId),

    #[error("attribute '{0}' is not registered")]
    AttributeNotFound(String),

    #[error("attribute '{0}' is already registered with a different size")]
    AttributeSizeMismatch(String),

    #[error("raw value size mismatch for attribute {attribute}: expected {expected}, got {got}")]
    ValueSizeMismatch {
        attribute: String,
        expected: usize,
        got: usize,
    },

    #[error("level file schema drift: {0}")]
    SchemaDrift(String),

    #[error("world capacity exceeded: {0}")]
    WorldCapacityExceeded(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("transient I/O error, retry advised: {0}")]
    TransientIoError(String),

    #[error("disk full: {0}")]
    DiskFull(String),
}

impl From<serde_json::Error> for EcdbError {
    fn from(e: serde_json::Error) -> Self {
        EcdbError::SerializationError(e.to_string())
    }
}

/// Classifies a raw I/O error into the recoverable-vs-transient buckets the
/// persistence layer retries against, mirroring the teacher's `classify_io_error`.
pub fn classify_io_error(error: std::io::Error, context: &str) -> EcdbError {
    use std::io::ErrorKind::*;
    match error.kind() {
        OutOfMemory => EcdbError::DiskFull(format!("{context}: {error}")),
        WouldBlock | TimedOut | Interrupted => {
            EcdbError::TransientIoError(format!("{context}: {error}"))
        }
        _ => EcdbError::IoError(format!("{context}: {error}")),
    }
}

/// Retries `operation` while it keeps failing with `EcdbError::TransientIoError`,
/// sleeping `retry_delay_ms` between attempts. Mirrors the teacher's
/// `retry_io_operation`.
pub fn retry_io_operation<F, T>(
    mut operation: F,
    max_retries: u32,
    retry_delay_ms: u64,
    context: &str,
) -> Result<T, EcdbError>
where
    F: FnMut() -> Result<T, EcdbError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(v) => return Ok(v),
            Err(EcdbError::TransientIoError(msg)) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries,
                    context,
                    "transient I/O error, retrying: {msg}"
                );
                std::thread::sleep(std::time::Duration::from_millis(retry_delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}
