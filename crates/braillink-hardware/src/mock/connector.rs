//! Mock serial connector for testing and development.
//!
//! Every accepted connection is an in-memory duplex pipe. The connector keeps
//! one end and hands the other, the "device end", to the test through the
//! [`MockConnectorHandle`], which can then play the display's side of the
//! conversation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use braillink_core::BluetoothAddress;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::error::{HardwareError, Result};
use crate::traits::{BoxedLink, SerialConnector};
use crate::types::ConnectionCandidate;

const PIPE_CAPACITY: usize = 4096;

/// How the mock reacts to a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Open a link.
    Accept,

    /// Fail immediately.
    Refuse,

    /// Never complete, like a display that does not answer.
    Hang,
}

/// The display side of an accepted mock connection.
#[derive(Debug)]
pub struct MockDeviceEnd {
    pub address: BluetoothAddress,
    pub stream: DuplexStream,
}

#[derive(Debug)]
struct ConnectorState {
    default_behavior: ConnectBehavior,
    behaviors: HashMap<BluetoothAddress, ConnectBehavior>,
    attempts: Vec<BluetoothAddress>,
}

/// Mock serial connector.
///
/// # Examples
///
/// ```
/// use braillink_core::BluetoothAddress;
/// use braillink_hardware::mock::{ConnectBehavior, MockConnector};
///
/// let (connector, handle) = MockConnector::new();
/// handle.set_behavior(
///     &BluetoothAddress::new("00:11:22:33:44:55").unwrap(),
///     ConnectBehavior::Refuse,
/// );
/// assert!(handle.attempts().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
    accepted_tx: mpsc::UnboundedSender<MockDeviceEnd>,
}

impl MockConnector {
    /// Create a connector that accepts every address by default.
    pub fn new() -> (Self, MockConnectorHandle) {
        let state = Arc::new(Mutex::new(ConnectorState {
            default_behavior: ConnectBehavior::Accept,
            behaviors: HashMap::new(),
            attempts: Vec::new(),
        }));
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

        let connector = Self {
            state: state.clone(),
            accepted_tx,
        };
        let handle = MockConnectorHandle {
            state,
            accepted_rx: Arc::new(tokio::sync::Mutex::new(accepted_rx)),
        };

        (connector, handle)
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SerialConnector for MockConnector {
    async fn connect(&self, candidate: &ConnectionCandidate) -> Result<BoxedLink> {
        let behavior = {
            let mut state = self.lock();
            state.attempts.push(candidate.address().clone());
            state
                .behaviors
                .get(candidate.address())
                .copied()
                .unwrap_or(state.default_behavior)
        };

        match behavior {
            ConnectBehavior::Accept => {
                let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
                self.accepted_tx
                    .send(MockDeviceEnd {
                        address: candidate.address().clone(),
                        stream: remote,
                    })
                    .map_err(|_| HardwareError::other("Mock connector handle dropped"))?;
                Ok(Box::new(local))
            }
            ConnectBehavior::Refuse => Err(HardwareError::connect_failed(
                candidate.address().to_string(),
                "connection refused",
            )),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Handle for controlling a mock connector.
#[derive(Debug, Clone)]
pub struct MockConnectorHandle {
    state: Arc<Mutex<ConnectorState>>,
    accepted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MockDeviceEnd>>>,
}

impl MockConnectorHandle {
    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the behavior for one address.
    pub fn set_behavior(&self, address: &BluetoothAddress, behavior: ConnectBehavior) {
        self.lock().behaviors.insert(address.clone(), behavior);
    }

    /// Set the behavior for addresses without an explicit one.
    pub fn set_default_behavior(&self, behavior: ConnectBehavior) {
        self.lock().default_behavior = behavior;
    }

    /// Addresses of every connect attempt so far, in order.
    pub fn attempts(&self) -> Vec<BluetoothAddress> {
        self.lock().attempts.clone()
    }

    /// Wait for the next accepted connection.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn next_device(&self) -> Option<MockDeviceEnd> {
        self.accepted_rx.lock().await.recv().await
    }
}
