//! Error types for the display client.

use braillink_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while binding to the display service.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No service is available to bind to.
    #[error("Display service unavailable: {0}")]
    Unavailable(String),

    /// Binding did not complete in time.
    #[error("Bind timeout after {0}ms")]
    BindTimeout(u64),

    /// The service refused or dropped a request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
