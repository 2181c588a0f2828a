//! Client side of the braille display service.
//!
//! Applications create one [`ClientConnectionManager`] and receive display
//! state, connection progress and key input through a [`DisplayListener`].
//! The manager reaches the service through a binder:
//!
//! - [`TcpBinder`] for a service running in another process
//! - [`LocalBinder`] for a service in the same process
//!
//! Losing the service is survivable: the manager rebinds with the
//! exponential schedule in [`RebindPolicy`] and only reports
//! [`ConnectionState::Error`](braillink_core::ConnectionState::Error) once it
//! has run out of attempts.

pub mod backoff;
pub mod binder;
pub mod error;
pub mod manager;

pub use backoff::RebindPolicy;
pub use binder::{AnyBinder, Binding, LocalBinder, ServiceBinder, TcpBinder, TcpBinderConfig};
pub use error::{ClientError, Result};
pub use manager::{ClientConnectionManager, DisplayListener};
