use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Addressing errors
    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    // Device errors
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Driver initialization failed: {0}")]
    DriverInitFailed(String),

    // Lifecycle errors
    #[error("Static data is not available: {0}")]
    StaticDataUnavailable(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
