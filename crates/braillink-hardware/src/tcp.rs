//! Serial links tunnelled over TCP.
//!
//! Hosts without direct RFCOMM access typically reach a display through a
//! serial bridge that exposes each bonded device on its own TCP port. The
//! [`TcpConnector`] maps display addresses to those bridge endpoints.
//!
//! ```text
//! TcpConnector ──TCP──> serial bridge ──RFCOMM──> Esys-40 (00:11:22:33:44:55)
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use braillink_core::BluetoothAddress;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{HardwareError, Result};
use crate::traits::{BoxedLink, SerialConnector};
use crate::types::ConnectionCandidate;

/// Configuration for [`TcpConnector`].
///
/// # Example
///
/// ```
/// use braillink_hardware::TcpConnectorConfig;
///
/// let config: TcpConnectorConfig = serde_json::from_str(r#"{
///     "endpoints": { "00:11:22:33:44:55": "127.0.0.1:9000" },
///     "connect_timeout_ms": 2000
/// }"#).unwrap();
/// assert_eq!(config.endpoints.len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpConnectorConfig {
    /// Display address → bridge endpoint.
    pub endpoints: HashMap<BluetoothAddress, SocketAddr>,

    /// Timeout for a single connect attempt (ms).
    pub connect_timeout_ms: u64,
}

impl Default for TcpConnectorConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            connect_timeout_ms: 5000,
        }
    }
}

/// Connector opening serial links through a TCP serial bridge.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: TcpConnectorConfig,
}

impl TcpConnector {
    pub fn new(config: TcpConnectorConfig) -> Self {
        Self { config }
    }

    /// Bridge endpoint for a display, if configured.
    pub fn endpoint(&self, address: &BluetoothAddress) -> Option<SocketAddr> {
        self.config.endpoints.get(address).copied()
    }
}

impl SerialConnector for TcpConnector {
    async fn connect(&self, candidate: &ConnectionCandidate) -> Result<BoxedLink> {
        let Some(endpoint) = self.endpoint(candidate.address()) else {
            return Err(HardwareError::connect_failed(
                candidate.address().to_string(),
                "no serial bridge endpoint configured",
            ));
        };

        debug!(
            address = %candidate.address(),
            endpoint = %endpoint,
            secure = candidate.profile.connect_securely,
            "Opening serial link"
        );

        let limit = Duration::from_millis(self.config.connect_timeout_ms);
        let stream = match timeout(limit, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(HardwareError::connect_failed(
                    candidate.address().to_string(),
                    e.to_string(),
                ));
            }
            Err(_) => return Err(HardwareError::timeout(self.config.connect_timeout_ms)),
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", endpoint, e);
        }

        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceProfile, PairedDevice};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn candidate(address: &BluetoothAddress) -> ConnectionCandidate {
        ConnectionCandidate::new(
            PairedDevice::new(address.clone(), "Esys-40"),
            Arc::new(DeviceProfile::new("Esys", "eu")),
        )
    }

    #[tokio::test]
    async fn test_connects_to_configured_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        let address = BluetoothAddress::new("00:11:22:33:44:55").unwrap();

        let mut config = TcpConnectorConfig::default();
        config.endpoints.insert(address.clone(), endpoint);
        let connector = TcpConnector::new(config);

        let bridge = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut link = connector.connect(&candidate(&address)).await.unwrap();
        link.write_all(b"ping").await.unwrap();

        assert_eq!(&bridge.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_unknown_address_fails_without_io() {
        let connector = TcpConnector::new(TcpConnectorConfig::default());
        let address = BluetoothAddress::new("00:11:22:33:44:55").unwrap();

        let result = connector.connect(&candidate(&address)).await;
        assert!(matches!(result, Err(HardwareError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);

        let address = BluetoothAddress::new("00:11:22:33:44:55").unwrap();
        let mut config = TcpConnectorConfig::default();
        config.endpoints.insert(address.clone(), endpoint);

        let result = TcpConnector::new(config).connect(&candidate(&address)).await;
        assert!(result.is_err());
    }
}
