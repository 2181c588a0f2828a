//! Wire protocol between the braille display service and its clients.
//!
//! # Architecture
//!
//! ```text
//!  application ──> DisplayService ──> display service
//!       ^                                   │
//!       └──────────── Subscriber <──────────┘
//!                (state, progress, input)
//! ```
//!
//! [`DisplayService`] and [`Subscriber`] are the in-process seam. Over TCP the
//! same calls travel as [`ServiceRequest`]s and [`ServiceEvent`]s framed by
//! the newline-delimited JSON codec in [`codec`].

pub mod codec;
pub mod error;
pub mod message;
pub mod service;

pub use codec::{ClientCodec, JsonLinesCodec, ServerCodec};
pub use error::{ProtocolError, Result};
pub use message::{ServiceEvent, ServiceRequest};
pub use service::{ChannelSubscriber, DisplayService, Subscriber, SubscriberId};
