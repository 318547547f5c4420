//! Custom error types for the log device and its backends.
//!
//! This module defines the primary error type, `DeviceError`, shared by the
//! ring buffer device, the backend seam, and the connection handlers. Using
//! the `thiserror` crate, it provides a centralized and consistent way to
//! handle the failure modes of the append/replay path:
//!
//! - **`Fault`**: The caller's view of the device is no longer valid, for
//!   example a working slot that should hold a partial record but does not.
//! - **`Interrupted`**: The wait for the device lock was aborted. Callers may
//!   retry; the log is unchanged.
//! - **`OutOfMemory`**: A record buffer could not be allocated. An extending
//!   append that fails this way leaves the existing partial record intact.
//! - **`Invalid`**: A seek named a record or intra-record offset that the
//!   currently retained log does not contain. No state change.
//! - **`Unsupported`**: The active backend cannot honour the operation (the
//!   character device carries no repositioning command).
//! - **`Io`**: Wraps `std::io::Error` from backend file and device-node I/O.
//!
//! By using `#[from]`, `DeviceError` can be seamlessly created from
//! underlying I/O errors, simplifying error handling throughout the crate
//! with the `?` operator. The binary boundary converts to `anyhow::Error`
//! with context.

use thiserror::Error;

/// Convenience alias for results using the device error type.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Failure modes of the append/replay path.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device state is no longer valid")]
    Fault,

    #[error("interrupted while waiting for the device lock")]
    Interrupted,

    #[error("record buffer allocation failed")]
    OutOfMemory,

    #[error("invalid seek: {0}")]
    Invalid(String),

    #[error("operation not supported by this log backend")]
    Unsupported,

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}
