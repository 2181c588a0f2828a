//! Error types for the service protocol.

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while framing messages or talking to a service.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A frame exceeded the codec's size limit.
    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    /// A frame was not a valid message.
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The subscriber can no longer receive events.
    #[error("Subscriber unreachable")]
    Unreachable,

    /// The display service is gone.
    #[error("Display service unavailable")]
    ServiceUnavailable,

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
