//! Tokio codec for newline-delimited JSON framing.
//!
//! Every message is one JSON document followed by `\n`. The codec is generic
//! over the type it decodes so the same framing serves both directions:
//!
//! ```text
//! client ── ServiceRequest ──> ServerCodec  (decodes requests, encodes events)
//! client <── ServiceEvent ──── ClientCodec  (decodes events, encodes requests)
//! ```
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use braillink_protocol::{ClientCodec, ServiceRequest};
//!
//! # async fn example() -> braillink_protocol::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:7878").await?;
//! let mut framed = Framed::new(stream, ClientCodec::new());
//!
//! framed.send(ServiceRequest::Register).await?;
//! while let Some(event) = framed.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # DoS Protection
//!
//! A line longer than the maximum frame size (default 64 KB) is rejected as
//! soon as the buffered bytes exceed the limit, without waiting for the
//! terminating newline.

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};
use crate::message::{ServiceEvent, ServiceRequest};

/// Default maximum frame size in bytes (64 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Codec used by the service side of a connection.
pub type ServerCodec = JsonLinesCodec<ServiceRequest>;

/// Codec used by the client side of a connection.
pub type ClientCodec = JsonLinesCodec<ServiceEvent>;

/// Newline-delimited JSON codec decoding `D` and encoding any `Serialize` type.
#[derive(Debug)]
pub struct JsonLinesCodec<D> {
    /// Index up to which the buffer is known to contain no newline.
    next_index: usize,

    /// Maximum allowed frame size in bytes, newline excluded.
    max_frame_size: usize,

    _decodes: PhantomData<fn() -> D>,
}

impl<D> JsonLinesCodec<D> {
    /// Create a new codec with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new codec with a custom maximum frame size.
    ///
    /// ```
    /// use braillink_protocol::ServerCodec;
    ///
    /// let codec = ServerCodec::with_max_frame_size(1024);
    /// assert_eq!(codec.max_frame_size(), 1024);
    /// ```
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            next_index: 0,
            max_frame_size,
            _decodes: PhantomData,
        }
    }

    /// Get the current maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl<D> Default for JsonLinesCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DeserializeOwned> Decoder for JsonLinesCodec<D> {
    type Item = D;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<D>> {
        loop {
            self.next_index = self.next_index.min(src.len());
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if src.len() > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        size: src.len(),
                        max_size: self.max_frame_size,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let line_end = self.next_index + offset;
            self.next_index = 0;

            if line_end > self.max_frame_size {
                return Err(ProtocolError::FrameTooLarge {
                    size: line_end,
                    max_size: self.max_frame_size,
                });
            }

            let line = src.split_to(line_end + 1);
            let payload = line[..line_end].trim_ascii();

            // Blank keep-alive lines
            if payload.is_empty() {
                continue;
            }

            return Ok(Some(serde_json::from_slice(payload)?));
        }
    }
}

impl<D, E: Serialize> Encoder<E> for JsonLinesCodec<D> {
    type Error = ProtocolError;

    fn encode(&mut self, item: E, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(&item)?;

        if payload.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max_size: self.max_frame_size,
            });
        }

        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}
