//! Service configuration.
//!
//! All fields have defaults matching the long-standing behavior of the
//! service, so an empty JSON object is a valid configuration:
//!
//! ```
//! use braillink_service::ServiceConfig;
//! use std::time::Duration;
//!
//! let config = ServiceConfig::from_json(r#"{ "screen_off_disconnect_delay_ms": 2000 }"#).unwrap();
//! assert_eq!(config.screen_off_disconnect_delay(), Duration::from_secs(2));
//! assert_eq!(config.read_buffer_size, 128);
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use braillink_core::constants::{
    DEFAULT_DRIVER_STOP_TIMEOUT, DEFAULT_READ_BUFFER_SIZE, DEFAULT_SCREEN_OFF_DISCONNECT_DELAY,
};
use serde::Deserialize;

use crate::error::{Result, ServiceError};

/// Behavior of the connection state machine and its supervisors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Grace period between device sleep and disconnect (ms).
    pub screen_off_disconnect_delay_ms: u64,

    /// How long to wait for the driver thread to exit (ms).
    pub driver_stop_timeout_ms: u64,

    /// Size of a single read from the serial link.
    pub read_buffer_size: usize,

    /// Whether the static data gate starts open.
    pub static_data_ready: bool,
}

impl ServiceConfig {
    /// Parse a JSON configuration, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if the read buffer size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(ServiceError::Config(
                "read_buffer_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn screen_off_disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.screen_off_disconnect_delay_ms)
    }

    pub fn driver_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.driver_stop_timeout_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            screen_off_disconnect_delay_ms: DEFAULT_SCREEN_OFF_DISCONNECT_DELAY,
            driver_stop_timeout_ms: DEFAULT_DRIVER_STOP_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            static_data_ready: false,
        }
    }
}

/// Configuration for the TCP service server.
///
/// # Example
///
/// ```
/// use braillink_service::ServiceServerConfig;
///
/// let config = ServiceServerConfig {
///     bind_addr: "127.0.0.1:0".parse().unwrap(),
///     max_connections: 8,
/// };
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Maximum number of simultaneous client connections
    pub max_connections: usize,
}

impl Default for ServiceServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7878)),
            max_connections: 16,
        }
    }
}
