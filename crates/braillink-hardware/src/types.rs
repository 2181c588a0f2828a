//! Common types for hardware devices.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use braillink_core::constants::SERIAL_PORT_SERVICE_UUID;
use braillink_core::{BluetoothAddress, KeyBinding};
use serde::{Deserialize, Serialize};

/// A bonded peer device as reported by the host pairing facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub address: BluetoothAddress,

    /// Advertised name, matched against profile name patterns.
    pub name: String,
}

impl PairedDevice {
    pub fn new(address: BluetoothAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

/// Advertised-name pattern of a device profile.
///
/// Every pattern is anchored at the start of the name; trailing characters
/// are allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// Name starts with the given text.
    Prefix(String),

    /// Name starts with the given text, ignoring ASCII case.
    PrefixIgnoreCase(String),

    /// Name is one of the model names followed by a serial number of the
    /// form `/<letter><digit>-<5 digits>`, e.g. `Active Braille AB4/S1-00012`.
    SerialNumbered(Vec<String>),
}

impl NamePattern {
    pub fn prefix(text: impl Into<String>) -> Self {
        Self::Prefix(text.into())
    }

    pub fn prefix_ignore_case(text: impl Into<String>) -> Self {
        Self::PrefixIgnoreCase(text.into())
    }

    pub fn serial_numbered<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SerialNumbered(models.into_iter().map(Into::into).collect())
    }

    /// Check whether an advertised name matches this pattern.
    ///
    /// ```
    /// use braillink_hardware::NamePattern;
    ///
    /// assert!(NamePattern::prefix("Esys-").matches("Esys-12 0042"));
    /// assert!(!NamePattern::prefix("Esys-").matches("My Esys-12"));
    /// assert!(NamePattern::prefix_ignore_case("Alva BC").matches("ALVA BC640"));
    /// assert!(NamePattern::serial_numbered(["BS4"]).matches("BS4/S1-12345"));
    /// assert!(!NamePattern::serial_numbered(["BS4"]).matches("BS4/S1-1234"));
    /// ```
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::PrefixIgnoreCase(prefix) => name
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            Self::SerialNumbered(models) => models.iter().any(|model| {
                name.strip_prefix(model.as_str())
                    .is_some_and(has_serial_number_prefix)
            }),
        }
    }
}

/// `/<letter><digit>-<digit x5>` at the start of `rest`.
fn has_serial_number_prefix(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() >= 9
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2].is_ascii_digit()
        && bytes[3] == b'-'
        && bytes[4..9].iter().all(u8::is_ascii_digit)
}

/// Static description of a class of supported hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Human readable family name, used in logs.
    pub label: String,

    /// Protocol identifier passed to the native driver.
    pub driver_code: String,

    /// Service class UUID to connect to.
    pub service_uuid: String,

    /// Whether to use an authenticated, encrypted link.
    pub connect_securely: bool,

    /// Driver key name → friendly name.
    pub friendly_key_names: BTreeMap<String, String>,

    /// Advertised-name patterns, tried in order.
    pub name_patterns: Vec<NamePattern>,
}

impl DeviceProfile {
    pub fn new(label: impl Into<String>, driver_code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            driver_code: driver_code.into(),
            service_uuid: SERIAL_PORT_SERVICE_UUID.to_string(),
            connect_securely: true,
            friendly_key_names: BTreeMap::new(),
            name_patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn connect_securely(mut self, secure: bool) -> Self {
        self.connect_securely = secure;
        self
    }

    #[must_use]
    pub fn with_key_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.friendly_key_names = names;
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: NamePattern) -> Self {
        self.name_patterns.push(pattern);
        self
    }

    /// Check whether a paired device belongs to this profile.
    pub fn matches(&self, device: &PairedDevice) -> bool {
        self.name_patterns.iter().any(|p| p.matches(&device.name))
    }

    /// Whether every key of `binding` has a friendly name.
    pub fn names_all_keys(&self, binding: &KeyBinding) -> bool {
        binding
            .key_names
            .iter()
            .all(|key| self.friendly_key_names.contains_key(key))
    }
}

/// A paired device matched to the profile used to talk to it.
#[derive(Debug, Clone)]
pub struct ConnectionCandidate {
    pub device: PairedDevice,
    pub profile: Arc<DeviceProfile>,
}

impl ConnectionCandidate {
    pub fn new(device: PairedDevice, profile: Arc<DeviceProfile>) -> Self {
        Self { device, profile }
    }

    pub fn address(&self) -> &BluetoothAddress {
        &self.device.address
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }
}

impl fmt::Display for ConnectionCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device.name, self.device.address)
    }
}

/// What the native driver reports after a successful start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverInfo {
    pub text_cells: usize,
    pub status_cells: usize,

    /// Full key map, including bindings the profile has no names for.
    pub key_bindings: Vec<KeyBinding>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Braille Wave BRW/A1-00001", true)]
    #[case("Braille Wave/A1-00001", true)]
    #[case("Basic Braille BB4/z9-99999 extra", true)]
    #[case("Basic Braille BB/z9-99999", true)]
    #[case("Braille Wave BRW/11-00001", false)]
    #[case("Braille Wave BRW/A1_00001", false)]
    #[case("Braille Wave BRW", false)]
    #[case("Braille Wave BRW/A1-0001", false)]
    fn test_serial_numbered_pattern(#[case] name: &str, #[case] expected: bool) {
        let pattern = NamePattern::serial_numbered([
            "Braille Wave BRW",
            "Braille Wave",
            "Basic Braille BB4",
            "Basic Braille BB",
        ]);
        assert_eq!(pattern.matches(name), expected);
    }

    #[test]
    fn test_serial_number_needs_five_digits() {
        let pattern = NamePattern::serial_numbered(["BS4"]);
        assert!(pattern.matches("BS4/S1-12345"));
        assert!(pattern.matches("BS4/S1-123456"));
        assert!(!pattern.matches("BS4/S1-1234"));
        assert!(!pattern.matches("BS4/S1-1234x"));
    }

    #[test]
    fn test_prefix_ignore_case_handles_short_and_multibyte_names() {
        let pattern = NamePattern::prefix_ignore_case("Alva BC");
        assert!(!pattern.matches("Alva"));
        assert!(!pattern.matches("Älva BC640"));
        assert!(pattern.matches("alva bc680"));
    }

    #[test]
    fn test_profile_names_all_keys() {
        let profile = DeviceProfile::new("Test", "tt").with_key_names(
            [("Dot1".to_string(), "Dot 1".to_string())].into(),
        );
        assert!(profile.names_all_keys(&KeyBinding::new(1, ["Dot1"])));
        assert!(!profile.names_all_keys(&KeyBinding::new(2, ["Dot1", "Space"])));
    }
}
