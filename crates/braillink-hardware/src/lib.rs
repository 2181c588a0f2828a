//! Hardware abstraction layer for refreshable braille displays.
//!
//! This crate knows which displays are supported and how to reach them. It
//! provides trait-based seams for everything that touches the outside world,
//! so the connection service can run against real hardware or against the
//! mocks in [`mock`].
//!
//! # Overview
//!
//! ```text
//!  PairingSource ──> DeviceCatalog ──> [ConnectionCandidate]
//!                        │   ^                 │
//!                        v   │                 v
//!                   AddressStore        SerialConnector ──> serial link
//!                                                               │
//!                                     DriverFactory ──> BrailleDriver
//! ```
//!
//! - [`DeviceCatalog`] matches bonded devices against the profile table in
//!   [`profiles`] and orders them for connection attempts.
//! - [`SerialConnector`] implementations open links; [`AnyConnector`]
//!   dispatches between them.
//! - [`BrailleDriver`] is the native protocol driver. It is not thread-safe
//!   and must only ever be driven from one thread.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use braillink_core::BluetoothAddress;
//! use braillink_hardware::{DeviceCatalog, MemoryAddressStore, PairedDevice, StaticPairingSource};
//!
//! let pairing = StaticPairingSource::with_devices(vec![
//!     PairedDevice::new(BluetoothAddress::new("00:11:22:33:44:01").unwrap(), "Headphones"),
//!     PairedDevice::new(BluetoothAddress::new("00:11:22:33:44:02").unwrap(), "Esys-40"),
//! ]);
//! let catalog = DeviceCatalog::new(Arc::new(pairing), Arc::new(MemoryAddressStore::new()));
//!
//! let candidates = catalog.find_candidates();
//! assert_eq!(candidates.len(), 1);
//! assert_eq!(candidates[0].profile.driver_code, "eu");
//! ```

pub mod catalog;
pub mod devices;
pub mod driver;
pub mod error;
pub mod mock;
pub mod pairing;
pub mod profiles;
pub mod store;
pub mod tcp;
pub mod traits;
pub mod types;

pub use catalog::{DeviceCatalog, prefer_address, promote_remembered};
pub use devices::AnyConnector;
pub use driver::{DriverContext, InputBuffer};
pub use error::{HardwareError, Result};
pub use pairing::StaticPairingSource;
pub use profiles::{KeyNames, supported_profiles};
pub use store::{JsonFileAddressStore, MemoryAddressStore};
pub use tcp::{TcpConnector, TcpConnectorConfig};
pub use traits::{
    AddressStore, BoxedLink, BrailleDriver, DriverFactory, PairingSource, SerialConnector,
    SerialLink,
};
pub use types::{ConnectionCandidate, DeviceProfile, DriverInfo, NamePattern, PairedDevice};
