//! Shared domain types for the braille display connection subsystem.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the coarse [`ConnectionState`] that subscribers observe, the
//! [`DisplayProperties`] produced by a successful driver initialization, and
//! the [`InputEvent`]s decoded from the display's keys.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
