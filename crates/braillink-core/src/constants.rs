//! Timing, sizing and encoding constants shared by the service and client.
//!
//! The values here are the defaults used when no explicit configuration is
//! supplied. Durations are expressed in milliseconds so they can be embedded
//! in configuration files verbatim.
//!
//! # Input event packing
//!
//! The native driver reports key presses as a single packed integer:
//!
//! ```text
//!  31 30                    16 15                     0
//! +--+------------------------+------------------------+
//! |  |        argument        |      command code      |
//! +--+------------------------+------------------------+
//! ```
//!
//! ```
//! use braillink_core::constants::*;
//!
//! let raw: u32 = (7 << INPUT_ARGUMENT_SHIFT) | 0x0042;
//! assert_eq!(raw & INPUT_COMMAND_MASK, 0x0042);
//! assert_eq!((raw & INPUT_ARGUMENT_MASK) >> INPUT_ARGUMENT_SHIFT, 7);
//! ```

// Input event decoding
pub const INPUT_COMMAND_MASK: u32 = 0x0000_ffff;
pub const INPUT_ARGUMENT_MASK: u32 = 0x7fff_0000;
pub const INPUT_ARGUMENT_SHIFT: u32 = 16;

// Bluetooth
/// Service class UUID of the serial port profile used by every supported display.
pub const SERIAL_PORT_SERVICE_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

/// Key under which the last successfully initialized device address is stored.
pub const LAST_CONNECTED_DEVICE_KEY: &str = "lastBluetoothDevice";

// Driver executor
/// How long `stop()` waits for the driver thread before giving up (ms).
pub const DEFAULT_DRIVER_STOP_TIMEOUT: u64 = 1000;

/// Size of a single read from the serial link.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 128;

// Connection state machine
/// Grace period between the display going to sleep and the disconnect (ms).
pub const DEFAULT_SCREEN_OFF_DISCONNECT_DELAY: u64 = 7000;

// Client rebind policy
/// Base delay of the client's exponential rebind backoff (ms).
pub const DEFAULT_REBIND_BASE_DELAY: u64 = 500;

/// Number of rebind attempts before the client gives up.
pub const DEFAULT_MAX_REBIND_ATTEMPTS: u32 = 5;

// Progress descriptions
pub const PROGRESS_NO_DEVICES: &str = "No paired braille display found";
pub const PROGRESS_TRYING_PREFIX: &str = "Trying to connect to";
pub const PROGRESS_INITIALIZING_PREFIX: &str = "Initializing";
pub const PROGRESS_INIT_FAILED_PREFIX: &str = "Failed to initialize";
