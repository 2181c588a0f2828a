//! The environment a native driver runs in.
//!
//! A driver never touches the serial link directly. Bytes received from the
//! display are appended to a shared [`InputBuffer`] by the read pump and
//! pulled out by the driver; bytes the driver wants to send are handed to the
//! owner of the link through a channel.
//!
//! ```text
//!  serial link ──read pump──> InputBuffer ──> driver.read_command()
//!  serial link <──writer───── output channel <── ctx.send_to_device()
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{HardwareError, Result};

/// Bytes received from the display and not yet consumed by the driver.
///
/// Appending is safe from any thread.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    inner: Arc<Mutex<BytesMut>>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append freshly received bytes.
    pub fn push(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Move up to `buf.len()` bytes into `buf`, returning how many were copied.
    pub fn read_into(&self, buf: &mut [u8]) -> usize {
        let mut pending = self.lock();
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.advance(n);
        n
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Callbacks available to a driver while one of its methods runs.
#[derive(Debug)]
pub struct DriverContext {
    input: InputBuffer,
    output: mpsc::UnboundedSender<Bytes>,
    wake_at: Option<Instant>,
}

impl DriverContext {
    pub fn new(input: InputBuffer, output: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            input,
            output,
            wake_at: None,
        }
    }

    /// Queue raw bytes for the display.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Disconnected`] once the link owner has gone away.
    pub fn send_to_device(&self, bytes: &[u8]) -> Result<()> {
        self.output
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| HardwareError::disconnected("serial link closed"))
    }

    /// Pull received bytes, returning how many were copied.
    pub fn read_from_device(&mut self, buf: &mut [u8]) -> usize {
        self.input.read_into(buf)
    }

    /// Number of received bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.input.len()
    }

    /// Ask to be polled again after `delay` even if no bytes arrive.
    ///
    /// Only the earliest pending request is kept.
    pub fn read_delayed(&mut self, delay: Duration) {
        let at = Instant::now() + delay;
        self.wake_at = Some(self.wake_at.map_or(at, |current| current.min(at)));
    }

    /// Deadline of the pending self-wake, if any.
    pub fn wake_deadline(&self) -> Option<Instant> {
        self.wake_at
    }

    /// Forget the pending self-wake.
    pub fn clear_wake(&mut self) {
        self.wake_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_buffer_reads_in_order() {
        let buffer = InputBuffer::new();
        buffer.push(&[1, 2, 3]);
        buffer.push(&[4]);

        let mut out = [0u8; 3];
        assert_eq!(buffer.read_into(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(buffer.len(), 1);

        let mut rest = [0u8; 8];
        assert_eq!(buffer.read_into(&mut rest), 1);
        assert_eq!(rest[0], 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_send_to_device_fails_after_owner_drops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = DriverContext::new(InputBuffer::new(), tx);

        ctx.send_to_device(b"\x1b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"\x1b"));

        drop(rx);
        assert!(matches!(
            ctx.send_to_device(b"x"),
            Err(HardwareError::Disconnected { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_delayed_keeps_earliest_deadline() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = DriverContext::new(InputBuffer::new(), tx);
        let start = Instant::now();

        ctx.read_delayed(Duration::from_millis(300));
        ctx.read_delayed(Duration::from_millis(100));
        ctx.read_delayed(Duration::from_millis(200));

        assert_eq!(ctx.wake_deadline(), Some(start + Duration::from_millis(100)));
        ctx.clear_wake();
        assert!(ctx.wake_deadline().is_none());
    }
}
