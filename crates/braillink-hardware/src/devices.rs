//! Enum wrapper for serial connector dispatch.
//!
//! Native `async fn` in traits (RPITIT, Edition 2024) is not object-safe, so
//! `Box<dyn SerialConnector>` is unavailable. [`AnyConnector`] provides
//! concrete dispatch instead, which also keeps the returned futures `Send`
//! so the connection supervisor can run on any runtime worker.
//!
//! # Examples
//!
//! ```
//! use braillink_hardware::devices::AnyConnector;
//! use braillink_hardware::mock::MockConnector;
//!
//! let (connector, _handle) = MockConnector::new();
//! let any_connector = AnyConnector::Mock(connector);
//! ```

use crate::Result;
use crate::mock::MockConnector;
use crate::tcp::TcpConnector;
use crate::traits::{BoxedLink, SerialConnector};
use crate::types::ConnectionCandidate;

/// Enum wrapper for serial connector dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyConnector {
    /// Links through a TCP serial bridge.
    Tcp(TcpConnector),

    /// In-memory links for development and testing.
    Mock(MockConnector),
}

impl SerialConnector for AnyConnector {
    async fn connect(&self, candidate: &ConnectionCandidate) -> Result<BoxedLink> {
        match self {
            Self::Tcp(connector) => connector.connect(candidate).await,
            Self::Mock(connector) => connector.connect(candidate).await,
        }
    }
}

impl From<TcpConnector> for AnyConnector {
    fn from(connector: TcpConnector) -> Self {
        Self::Tcp(connector)
    }
}

impl From<MockConnector> for AnyConnector {
    fn from(connector: MockConnector) -> Self {
        Self::Mock(connector)
    }
}
