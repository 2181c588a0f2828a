//! Matching of paired devices against the supported display table.
//!
//! # Candidate ordering
//!
//! Candidates follow the order in which the pairing facility reports bonded
//! devices. The last device that initialized successfully is then moved to
//! the front by swapping it with whatever occupies index 0:
//!
//! ```text
//! bonded:      [A, B, C]      remembered: C
//! candidates:  [C, B, A]
//! ```
//!
//! The swap is idempotent: a remembered device already at index 0 leaves
//! the list untouched.

use std::sync::Arc;

use braillink_core::BluetoothAddress;
use tracing::{debug, warn};

use crate::error::Result;
use crate::profiles::supported_profiles;
use crate::traits::{AddressStore, PairingSource};
use crate::types::{ConnectionCandidate, DeviceProfile, PairedDevice};

/// Finds connectable displays among bonded devices.
pub struct DeviceCatalog {
    profiles: Vec<Arc<DeviceProfile>>,
    pairing: Arc<dyn PairingSource>,
    store: Arc<dyn AddressStore>,
}

impl DeviceCatalog {
    /// Catalog over the built-in profile table.
    pub fn new(pairing: Arc<dyn PairingSource>, store: Arc<dyn AddressStore>) -> Self {
        Self::with_profiles(supported_profiles().to_vec(), pairing, store)
    }

    pub fn with_profiles(
        profiles: Vec<Arc<DeviceProfile>>,
        pairing: Arc<dyn PairingSource>,
        store: Arc<dyn AddressStore>,
    ) -> Self {
        Self {
            profiles,
            pairing,
            store,
        }
    }

    /// First profile, in table order, whose patterns match the device name.
    pub fn match_device(&self, device: &PairedDevice) -> Option<Arc<DeviceProfile>> {
        self.profiles.iter().find(|p| p.matches(device)).cloned()
    }

    /// Ordered connection candidates.
    ///
    /// Empty when there is no adapter or no bonded device is supported.
    pub fn find_candidates(&self) -> Vec<ConnectionCandidate> {
        let Some(bonded) = self.pairing.bonded_devices() else {
            debug!("No Bluetooth adapter present");
            return Vec::new();
        };

        let mut candidates: Vec<ConnectionCandidate> = bonded
            .into_iter()
            .filter_map(|device| {
                let profile = self.match_device(&device)?;
                Some(ConnectionCandidate::new(device, profile))
            })
            .collect();

        match self.store.load() {
            Ok(Some(remembered)) => promote_remembered(&mut candidates, &remembered),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not read remembered display address"),
        }

        debug!(count = candidates.len(), "Found display candidates");
        candidates
    }

    /// Persist the candidate as the device to try first next time.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn remember_success(&self, candidate: &ConnectionCandidate) -> Result<()> {
        self.store.save(candidate.address())
    }
}

impl std::fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCatalog")
            .field("profiles", &self.profiles.len())
            .finish_non_exhaustive()
    }
}

/// Swap the first candidate at index k>0 with `remembered` into index 0.
pub fn promote_remembered(candidates: &mut [ConnectionCandidate], remembered: &BluetoothAddress) {
    let found = candidates
        .iter()
        .skip(1)
        .position(|c| c.address() == remembered);

    if let Some(offset) = found {
        candidates.swap(0, offset + 1);
    }
}

/// Move the candidate with `address` to the front, keeping the others in order.
pub fn prefer_address(candidates: &mut [ConnectionCandidate], address: &BluetoothAddress) {
    if let Some(index) = candidates.iter().position(|c| c.address() == address) {
        candidates[..=index].rotate_right(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::StaticPairingSource;
    use crate::store::MemoryAddressStore;
    use crate::types::NamePattern;
    use rstest::rstest;

    fn address(last: u8) -> BluetoothAddress {
        BluetoothAddress::new(&format!("00:11:22:33:44:{last:02X}")).unwrap()
    }

    fn device(last: u8, name: &str) -> PairedDevice {
        PairedDevice::new(address(last), name)
    }

    fn catalog(devices: Vec<PairedDevice>, remembered: Option<u8>) -> DeviceCatalog {
        let store = match remembered {
            Some(last) => MemoryAddressStore::with_address(address(last)),
            None => MemoryAddressStore::new(),
        };
        DeviceCatalog::new(
            Arc::new(StaticPairingSource::with_devices(devices)),
            Arc::new(store),
        )
    }

    fn addresses(candidates: &[ConnectionCandidate]) -> Vec<u8> {
        candidates
            .iter()
            .map(|c| u8::from_str_radix(&c.address().as_str()[15..], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_unsupported_devices_are_skipped() {
        let catalog = catalog(
            vec![
                device(1, "Headphones"),
                device(2, "Esys-40"),
                device(3, "Keyboard"),
                device(4, "Focus 40 BT"),
            ],
            None,
        );

        let candidates = catalog.find_candidates();
        assert_eq!(addresses(&candidates), vec![2, 4]);
        assert_eq!(candidates[0].profile.driver_code, "eu");
        assert_eq!(candidates[1].profile.driver_code, "fs");
    }

    #[test]
    fn test_first_matching_profile_wins() {
        let first = Arc::new(DeviceProfile::new("First", "aa").with_pattern(NamePattern::prefix("Dual")));
        let second = Arc::new(DeviceProfile::new("Second", "bb").with_pattern(NamePattern::prefix("Dual")));
        let catalog = DeviceCatalog::with_profiles(
            vec![first, second],
            Arc::new(StaticPairingSource::with_devices(vec![device(1, "Dual display")])),
            Arc::new(MemoryAddressStore::new()),
        );

        let candidates = catalog.find_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].profile.driver_code, "aa");
    }

    #[test]
    fn test_no_adapter_yields_no_candidates() {
        let catalog = DeviceCatalog::new(
            Arc::new(StaticPairingSource::without_adapter()),
            Arc::new(MemoryAddressStore::with_address(address(1))),
        );
        assert!(catalog.find_candidates().is_empty());
    }

    #[rstest]
    #[case::absent(Some(9), vec![1, 2, 3])]
    #[case::already_first(Some(1), vec![1, 2, 3])]
    #[case::second(Some(2), vec![2, 1, 3])]
    #[case::last(Some(3), vec![3, 2, 1])]
    #[case::none(None, vec![1, 2, 3])]
    fn test_remembered_device_is_swapped_to_front(
        #[case] remembered: Option<u8>,
        #[case] expected: Vec<u8>,
    ) {
        let catalog = catalog(
            vec![device(1, "Esys-1"), device(2, "Esys-2"), device(3, "Esys-3")],
            remembered,
        );
        assert_eq!(addresses(&catalog.find_candidates()), expected);
    }

    #[test]
    fn test_promotion_is_idempotent() {
        let catalog = catalog(
            vec![device(1, "Esys-1"), device(2, "Esys-2"), device(3, "Esys-3")],
            Some(3),
        );
        let mut candidates = catalog.find_candidates();
        let once = addresses(&candidates);

        promote_remembered(&mut candidates, &address(3));
        assert_eq!(addresses(&candidates), once);
    }

    #[test]
    fn test_remember_success_changes_next_order() {
        let catalog = catalog(vec![device(1, "Esys-1"), device(2, "TS5 40")], None);

        let candidates = catalog.find_candidates();
        catalog.remember_success(&candidates[1]).unwrap();

        assert_eq!(addresses(&catalog.find_candidates()), vec![2, 1]);
    }

    #[test]
    fn test_prefer_address_rotates() {
        let catalog = catalog(
            vec![device(1, "Esys-1"), device(2, "Esys-2"), device(3, "Esys-3")],
            None,
        );
        let mut candidates = catalog.find_candidates();

        prefer_address(&mut candidates, &address(3));
        assert_eq!(addresses(&candidates), vec![3, 1, 2]);

        prefer_address(&mut candidates, &address(7));
        assert_eq!(addresses(&candidates), vec![3, 1, 2]);
    }
}
