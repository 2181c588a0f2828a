//! Mock hardware for development and testing.
//!
//! Like real hardware, each mock comes as a pair: the device object handed to
//! the service, and a handle that lets a test script and observe it.

mod connector;
mod driver;

pub use connector::{ConnectBehavior, MockConnector, MockConnectorHandle, MockDeviceEnd};
pub use driver::{DriverCall, MockDriver, MockDriverFactory, MockDriverHandle};
