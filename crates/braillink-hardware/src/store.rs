//! Persistence for the last successfully used display address.
//!
//! Two stores are provided: [`MemoryAddressStore`] for tests and embedded
//! use, and [`JsonFileAddressStore`], which keeps a small JSON key-value file
//! shared with other preferences:
//!
//! ```text
//! { "lastBluetoothDevice": "00:11:22:33:44:55", "otherKey": ... }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use braillink_core::BluetoothAddress;
use braillink_core::constants::LAST_CONNECTED_DEVICE_KEY;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HardwareError, Result};
use crate::traits::AddressStore;

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryAddressStore {
    address: Mutex<Option<BluetoothAddress>>,
}

impl MemoryAddressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(address: BluetoothAddress) -> Self {
        Self {
            address: Mutex::new(Some(address)),
        }
    }
}

impl AddressStore for MemoryAddressStore {
    fn load(&self) -> Result<Option<BluetoothAddress>> {
        Ok(self
            .address
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, address: &BluetoothAddress) -> Result<()> {
        *self.address.lock().unwrap_or_else(|e| e.into_inner()) = Some(address.clone());
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// Unknown keys in the file are preserved. Writes go to a sibling temporary
/// file that is then renamed over the original.
#[derive(Debug)]
pub struct JsonFileAddressStore {
    path: PathBuf,

    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileAddressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(HardwareError::store(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(HardwareError::store(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

impl AddressStore for JsonFileAddressStore {
    fn load(&self) -> Result<Option<BluetoothAddress>> {
        let map = self.read_map()?;
        match map.get(LAST_CONNECTED_DEVICE_KEY) {
            Some(Value::String(address)) => Ok(Some(BluetoothAddress::new(address)?)),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(HardwareError::store(format!(
                "unexpected value for {LAST_CONNECTED_DEVICE_KEY}: {other}"
            ))),
        }
    }

    fn save(&self, address: &BluetoothAddress) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut map = self.read_map()?;
        map.insert(
            LAST_CONNECTED_DEVICE_KEY.to_string(),
            Value::String(address.to_string()),
        );

        let contents = serde_json::to_vec_pretty(&Value::Object(map))
            .map_err(|e| HardwareError::store(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), address = %address, "Remembered display address");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> BluetoothAddress {
        BluetoothAddress::new(s).unwrap()
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryAddressStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&address("00:11:22:33:44:55")).unwrap();
        assert_eq!(store.load().unwrap(), Some(address("00:11:22:33:44:55")));
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileAddressStore::new(dir.path().join("prefs.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_json_store_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"brailleTable":"en-US-g2"}"#).unwrap();

        let store = JsonFileAddressStore::new(&path);
        store.save(&address("aa:bb:cc:dd:ee:ff")).unwrap();

        let reopened = JsonFileAddressStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(address("AA:BB:CC:DD:EE:FF")));

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["brailleTable"], "en-US-g2");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileAddressStore::new(&path);
        assert!(matches!(store.load(), Err(HardwareError::StoreError { .. })));
    }

    #[test]
    fn test_json_store_rejects_invalid_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"lastBluetoothDevice":"not-an-address"}"#).unwrap();

        let store = JsonFileAddressStore::new(&path);
        assert!(matches!(store.load(), Err(HardwareError::Core(_))));
    }
}
