//! Hardware trait definitions.
//!
//! These traits are the contract between the connection service and
//! everything outside it that touches hardware or host facilities:
//!
//! - [`SerialConnector`] opens a serial link to a candidate display.
//! - [`BrailleDriver`] is the native, non-reentrant display driver.
//! - [`PairingSource`] enumerates bonded devices.
//! - [`AddressStore`] persists the last device that worked.
//!
//! `SerialConnector` uses native `async fn` (Edition 2024 RPITIT) and is
//! dispatched through the [`AnyConnector`](crate::devices::AnyConnector)
//! enum. The other traits are synchronous and object-safe.

#![allow(async_fn_in_trait)]

use tokio::io::{AsyncRead, AsyncWrite};

use braillink_core::BluetoothAddress;

use crate::driver::DriverContext;
use crate::error::Result;
use crate::types::{ConnectionCandidate, DriverInfo, PairedDevice};

/// A bidirectional byte stream to a display.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> SerialLink for T {}

/// Boxed serial link as returned by connectors.
pub type BoxedLink = Box<dyn SerialLink>;

/// Opens serial links to candidate displays.
///
/// # Examples
///
/// ```no_run
/// use braillink_hardware::traits::SerialConnector;
/// use braillink_hardware::ConnectionCandidate;
///
/// async fn first_reachable<C: SerialConnector>(
///     connector: &C,
///     candidates: &[ConnectionCandidate],
/// ) -> Option<usize> {
///     for (i, candidate) in candidates.iter().enumerate() {
///         if connector.connect(candidate).await.is_ok() {
///             return Some(i);
///         }
///     }
///     None
/// }
/// ```
pub trait SerialConnector {
    /// Open a link, honoring the profile's security mode.
    ///
    /// The returned future may be dropped at any point to abort the attempt.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::ConnectFailed`](crate::HardwareError::ConnectFailed)
    /// or [`HardwareError::Timeout`](crate::HardwareError::Timeout).
    async fn connect(&self, candidate: &ConnectionCandidate) -> Result<BoxedLink>;
}

/// A native braille display driver.
///
/// Implementations are single-threaded and non-reentrant: the caller
/// guarantees that calls never overlap and always come from the same thread.
/// The driver is therefore not required to be `Send`.
pub trait BrailleDriver {
    /// Initialize the driver and the display.
    ///
    /// # Errors
    ///
    /// Returns an error if the display does not answer the protocol handshake.
    fn start(&mut self, ctx: &mut DriverContext) -> Result<DriverInfo>;

    /// Replace the display contents, one byte per cell.
    fn write_window(&mut self, ctx: &mut DriverContext, pattern: &[u8]) -> Result<()>;

    /// Decode the next pending command from received bytes.
    ///
    /// Returns the packed command, or `None` when nothing is decodable yet.
    fn read_command(&mut self, ctx: &mut DriverContext) -> Result<Option<u32>>;

    /// Uninitialize the driver. Called exactly once after a successful start.
    fn stop(&mut self, ctx: &mut DriverContext);
}

/// Creates drivers on the thread that will own them.
pub trait DriverFactory: Send + Sync + 'static {
    fn create(&self, candidate: &ConnectionCandidate) -> Box<dyn BrailleDriver>;
}

/// Host facility listing bonded devices.
pub trait PairingSource: Send + Sync + 'static {
    /// Currently bonded devices, or `None` when no adapter is present.
    fn bonded_devices(&self) -> Option<Vec<PairedDevice>>;
}

/// Small persistent store for the last successfully used device.
pub trait AddressStore: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`HardwareError::StoreError`](crate::HardwareError::StoreError)
    /// if the backing storage cannot be read.
    fn load(&self) -> Result<Option<BluetoothAddress>>;

    /// # Errors
    ///
    /// Returns [`HardwareError::StoreError`](crate::HardwareError::StoreError)
    /// if the backing storage cannot be written.
    fn save(&self, address: &BluetoothAddress) -> Result<()>;
}
