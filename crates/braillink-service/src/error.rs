//! Error types for the display service.

use std::net::SocketAddr;

use braillink_hardware::HardwareError;
use braillink_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by the display service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The connection state machine has shut down.
    #[error("Display service stopped")]
    Stopped,

    /// The driver thread could not be started or vanished.
    #[error("Driver thread error: {0}")]
    DriverThread(String),

    /// Failed to bind the service listener.
    #[error("Failed to bind to {0}")]
    BindFailed(SocketAddr),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hardware or driver failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Transport failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
