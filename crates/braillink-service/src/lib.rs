//! The braille display connection service.
//!
//! This crate decides when to connect to a display, finds and opens one,
//! runs its native driver and tells every subscriber what is going on.
//!
//! # Components
//!
//! - [`ConnectionStateMachine`] owns the global [`ConnectionState`] and
//!   serializes every trigger through one queue. [`ServiceHandle`] is the
//!   cloneable front door and implements
//!   [`DisplayService`](braillink_protocol::DisplayService).
//! - [`ConnectionSupervisor`] runs one connection attempt: candidate
//!   iteration, driver start-up, the read pump and teardown.
//! - [`DriverExecutor`] confines the native driver to one dedicated thread.
//! - [`ServiceServer`] exposes the service to remote clients over TCP.
//!
//! ```text
//!  host events ──┐
//!  clients ──────┼──> ConnectionStateMachine ──> ConnectionSupervisor ──> serial link
//!  ServiceServer ┘            │                          │
//!                             v                          v
//!                        subscribers              DriverExecutor ──> driver thread
//! ```
//!
//! [`ConnectionState`]: braillink_core::ConnectionState

pub mod config;
pub mod error;
pub mod executor;
pub mod server;
pub mod state_machine;
pub mod subscribers;
pub mod supervisor;
pub mod transitions;

pub use config::{ServiceConfig, ServiceServerConfig};
pub use error::{Result, ServiceError};
pub use executor::{DRIVER_THREAD_NAME, DriverExecutor, InputSink, display_properties};
pub use server::{ConnectionInfo, ServiceServer, Sessions};
pub use state_machine::{ConnectionStateMachine, DataReadiness, ServiceHandle, ServiceSnapshot};
pub use subscribers::SubscriberRegistry;
pub use supervisor::{ConnectionSupervisor, DisplayBackend, ReportSink, SupervisorEvent};
pub use transitions::{ConnectionTracker, StateTransition};
