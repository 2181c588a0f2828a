use crate::{
    Result,
    constants::{INPUT_ARGUMENT_MASK, INPUT_ARGUMENT_SHIFT, INPUT_COMMAND_MASK},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bluetooth device address (`AA:BB:CC:DD:EE:FF`, normalized to uppercase).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BluetoothAddress(String);

impl BluetoothAddress {
    /// Create a new address with validation.
    ///
    /// The address is trimmed and uppercased before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidAddress` unless the input is six colon-separated
    /// pairs of hex digits.
    pub fn new(address: &str) -> Result<Self> {
        let address = address.trim().to_ascii_uppercase();

        let octets: Vec<&str> = address.split(':').collect();
        let well_formed = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

        if !well_formed {
            return Err(Error::InvalidAddress(address));
        }

        Ok(BluetoothAddress(address))
    }

    /// Get the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BluetoothAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BluetoothAddress::new(s)
    }
}

impl TryFrom<String> for BluetoothAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        BluetoothAddress::new(&value)
    }
}

impl From<BluetoothAddress> for String {
    fn from(address: BluetoothAddress) -> Self {
        address.0
    }
}

/// Global connection state of the braille display.
///
/// Valid flows:
/// - Disconnected → Connecting → Connected → Disconnected
/// - Connecting → Disconnected (every candidate failed, or disconnect requested)
/// - any → Error
///
/// `Error` is terminal: leaving it requires a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Check if transition to `target` is valid from this state.
    ///
    /// ```
    /// use braillink_core::ConnectionState;
    ///
    /// assert!(ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connecting));
    /// assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::Connected));
    /// assert!(!ConnectionState::Error.can_transition_to(&ConnectionState::Connecting));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            (ConnectionState::Disconnected, ConnectionState::Connecting)
                | (
                    ConnectionState::Connecting,
                    ConnectionState::Connected | ConnectionState::Disconnected
                )
                | (ConnectionState::Connected, ConnectionState::Disconnected)
                | (
                    ConnectionState::Disconnected
                        | ConnectionState::Connecting
                        | ConnectionState::Connected,
                    ConnectionState::Error
                )
        )
    }

    /// `true` for states that no trigger can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        };
        write!(f, "{}", state_str)
    }
}

/// A decoded key command from the display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Driver command code (low 16 bits of the packed value).
    pub command: u16,

    /// Command argument, e.g. the routing key index (bits 16-30).
    pub argument: u16,

    pub timestamp: DateTime<Utc>,
}

impl InputEvent {
    pub fn new(command: u16, argument: u16) -> Self {
        Self {
            command,
            argument,
            timestamp: Utc::now(),
        }
    }

    /// Decode a packed native command.
    ///
    /// Bit 31 is ignored.
    ///
    /// ```
    /// use braillink_core::InputEvent;
    ///
    /// let event = InputEvent::from_packed(0x8003_0021);
    /// assert_eq!(event.command, 0x21);
    /// assert_eq!(event.argument, 3);
    /// ```
    pub fn from_packed(raw: u32) -> Self {
        let command = (raw & INPUT_COMMAND_MASK) as u16;
        let argument = ((raw & INPUT_ARGUMENT_MASK) >> INPUT_ARGUMENT_SHIFT) as u16;
        Self::new(command, argument)
    }
}

/// One entry of a display's key map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    /// Command issued when the keys are pressed.
    pub command: u16,

    /// Keys that must be pressed together, in driver order.
    pub key_names: Vec<String>,

    /// Whether the keys must be held.
    pub long_press: bool,
}

impl KeyBinding {
    pub fn new(command: u16, key_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command,
            key_names: key_names.into_iter().map(Into::into).collect(),
            long_press: false,
        }
    }

    #[must_use]
    pub fn with_long_press(mut self, long_press: bool) -> Self {
        self.long_press = long_press;
        self
    }
}

/// Properties of a connected display, produced once per native initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayProperties {
    pub text_cells: usize,
    pub status_cells: usize,
    pub key_bindings: Vec<KeyBinding>,

    /// Key name → human readable name, for every key used by `key_bindings`.
    pub friendly_key_names: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("00:11:22:aa:bb:cc", "00:11:22:AA:BB:CC")]
    #[case("  01:23:45:67:89:AB ", "01:23:45:67:89:AB")]
    fn test_address_normalization(#[case] input: &str, #[case] expected: &str) {
        let address = BluetoothAddress::new(input).unwrap();
        assert_eq!(address.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("00:11:22:33:44")]
    #[case("00:11:22:33:44:55:66")]
    #[case("00-11-22-33-44-55")]
    #[case("0G:11:22:33:44:55")]
    #[case("000:11:22:33:44:5")]
    fn test_address_rejects_malformed(#[case] input: &str) {
        assert!(matches!(
            BluetoothAddress::new(input),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_address_serde_validates() {
        let json = "\"aa:bb:cc:dd:ee:ff\"";
        let address: BluetoothAddress = serde_json::from_str(json).unwrap();
        assert_eq!(address.to_string(), "AA:BB:CC:DD:EE:FF");

        let bad: std::result::Result<BluetoothAddress, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[rstest]
    #[case(ConnectionState::Disconnected, ConnectionState::Connecting, true)]
    #[case(ConnectionState::Connecting, ConnectionState::Connected, true)]
    #[case(ConnectionState::Connecting, ConnectionState::Disconnected, true)]
    #[case(ConnectionState::Connected, ConnectionState::Disconnected, true)]
    #[case(ConnectionState::Connected, ConnectionState::Error, true)]
    #[case(ConnectionState::Disconnected, ConnectionState::Connected, false)]
    #[case(ConnectionState::Connected, ConnectionState::Connecting, false)]
    #[case(ConnectionState::Error, ConnectionState::Disconnected, false)]
    #[case(ConnectionState::Error, ConnectionState::Error, false)]
    fn test_state_transitions(
        #[case] from: ConnectionState,
        #[case] to: ConnectionState,
        #[case] valid: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[rstest]
    #[case(0x0000_0000, 0, 0)]
    #[case(0x0000_1234, 0x1234, 0)]
    #[case(0x0005_0021, 0x21, 5)]
    #[case(0x7fff_ffff, 0xffff, 0x7fff)]
    #[case(0xffff_ffff, 0xffff, 0x7fff)]
    fn test_input_event_unpacking(#[case] raw: u32, #[case] command: u16, #[case] argument: u16) {
        let event = InputEvent::from_packed(raw);
        assert_eq!(event.command, command);
        assert_eq!(event.argument, argument);
    }

    #[test]
    fn test_key_binding_builder() {
        let binding = KeyBinding::new(12, ["Dot1", "Space"]).with_long_press(true);
        assert_eq!(binding.key_names, vec!["Dot1", "Space"]);
        assert!(binding.long_press);
    }

    #[test]
    fn test_connection_state_display_and_serde() {
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
        assert!(ConnectionState::Error.is_terminal());
    }
}
