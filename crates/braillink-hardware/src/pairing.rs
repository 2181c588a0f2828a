//! Pairing sources backed by explicit device lists.

use std::sync::RwLock;

use braillink_core::BluetoothAddress;

use crate::traits::PairingSource;
use crate::types::PairedDevice;

/// Pairing source whose bonded devices are managed by the host application.
///
/// ```
/// use braillink_core::BluetoothAddress;
/// use braillink_hardware::{PairedDevice, PairingSource, StaticPairingSource};
///
/// let pairing = StaticPairingSource::new();
/// pairing.add(PairedDevice::new(
///     BluetoothAddress::new("00:11:22:33:44:55").unwrap(),
///     "Esys-40",
/// ));
/// assert_eq!(pairing.bonded_devices().unwrap().len(), 1);
///
/// assert!(StaticPairingSource::without_adapter().bonded_devices().is_none());
/// ```
#[derive(Debug)]
pub struct StaticPairingSource {
    adapter_present: bool,
    devices: RwLock<Vec<PairedDevice>>,
}

impl StaticPairingSource {
    pub fn new() -> Self {
        Self::with_devices(Vec::new())
    }

    pub fn with_devices(devices: Vec<PairedDevice>) -> Self {
        Self {
            adapter_present: true,
            devices: RwLock::new(devices),
        }
    }

    /// A host without a Bluetooth adapter.
    pub fn without_adapter() -> Self {
        Self {
            adapter_present: false,
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Record a newly bonded device, replacing any entry with the same address.
    pub fn add(&self, device: PairedDevice) {
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        devices.retain(|d| d.address != device.address);
        devices.push(device);
    }

    pub fn remove(&self, address: &BluetoothAddress) {
        self.devices
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|d| &d.address != address);
    }
}

impl Default for StaticPairingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingSource for StaticPairingSource {
    fn bonded_devices(&self) -> Option<Vec<PairedDevice>> {
        if !self.adapter_present {
            return None;
        }
        Some(
            self.devices
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        )
    }
}
