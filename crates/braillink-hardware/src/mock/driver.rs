//! Mock native driver for testing and development.
//!
//! The mock speaks a trivial protocol: every 4 bytes received from the
//! display form one little-endian packed command, and `write_window` echoes
//! the pattern back to the display verbatim. Commands can also be queued
//! directly and released through the driver's delayed self-wake.
//!
//! The shared state records every call, the threads they came from, and
//! whether any two calls ever overlapped, so tests can check the driver's
//! exclusivity requirements.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;
use std::time::Duration;

use braillink_core::{BluetoothAddress, KeyBinding};

use crate::driver::DriverContext;
use crate::error::{HardwareError, Result};
use crate::traits::{BrailleDriver, DriverFactory};
use crate::types::{ConnectionCandidate, DriverInfo};

/// One recorded call into a mock driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Start { address: BluetoothAddress },
    WriteWindow(Vec<u8>),
    ReadCommand,
    Stop,
}

#[derive(Debug)]
struct Script {
    info: DriverInfo,
    init_failure: Option<String>,
    init_delay: Duration,
    stop_delay: Duration,
    wake_after_start: Option<Duration>,
    queued: VecDeque<u32>,
}

#[derive(Debug)]
struct Shared {
    script: Mutex<Script>,
    calls: Mutex<Vec<DriverCall>>,
    threads: Mutex<HashSet<ThreadId>>,
    in_call: AtomicBool,
    overlaps: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a call and flag it if another one is still in flight.
    fn enter(&self, call: DriverCall) -> CallGuard<'_> {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(std::thread::current().id());
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        CallGuard { shared: self }
    }
}

struct CallGuard<'a> {
    shared: &'a Shared,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.shared.in_call.store(false, Ordering::SeqCst);
    }
}

/// Factory producing [`MockDriver`]s that share one script and call log.
///
/// # Examples
///
/// ```
/// use braillink_hardware::mock::MockDriverFactory;
///
/// let (factory, handle) = MockDriverFactory::new();
/// handle.set_cells(40, 0);
/// handle.fail_init("no answer from display");
/// assert!(handle.calls().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockDriverFactory {
    shared: Arc<Shared>,
}

impl MockDriverFactory {
    pub fn new() -> (Self, MockDriverHandle) {
        let shared = Arc::new(Shared {
            script: Mutex::new(Script {
                info: DriverInfo {
                    text_cells: 40,
                    status_cells: 0,
                    key_bindings: Vec::new(),
                },
                init_failure: None,
                init_delay: Duration::ZERO,
                stop_delay: Duration::ZERO,
                wake_after_start: None,
                queued: VecDeque::new(),
            }),
            calls: Mutex::new(Vec::new()),
            threads: Mutex::new(HashSet::new()),
            in_call: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
        });

        (
            Self {
                shared: shared.clone(),
            },
            MockDriverHandle { shared },
        )
    }
}

impl DriverFactory for MockDriverFactory {
    fn create(&self, candidate: &ConnectionCandidate) -> Box<dyn BrailleDriver> {
        Box::new(MockDriver {
            shared: self.shared.clone(),
            address: candidate.address().clone(),
            started: false,
        })
    }
}

/// Mock native driver.
#[derive(Debug)]
pub struct MockDriver {
    shared: Arc<Shared>,
    address: BluetoothAddress,
    started: bool,
}

impl BrailleDriver for MockDriver {
    fn start(&mut self, ctx: &mut DriverContext) -> Result<DriverInfo> {
        let _call = self.shared.enter(DriverCall::Start {
            address: self.address.clone(),
        });

        let (delay, failure, info, wake) = {
            let script = self.shared.script();
            (
                script.init_delay,
                script.init_failure.clone(),
                script.info.clone(),
                script.wake_after_start,
            )
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(message) = failure {
            return Err(HardwareError::initialization_failed(message));
        }

        self.started = true;
        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);

        if let Some(wake) = wake {
            ctx.read_delayed(wake);
        }
        Ok(info)
    }

    fn write_window(&mut self, ctx: &mut DriverContext, pattern: &[u8]) -> Result<()> {
        let _call = self.shared.enter(DriverCall::WriteWindow(pattern.to_vec()));
        ctx.send_to_device(pattern)
    }

    fn read_command(&mut self, ctx: &mut DriverContext) -> Result<Option<u32>> {
        let _call = self.shared.enter(DriverCall::ReadCommand);

        if let Some(command) = self.shared.script().queued.pop_front() {
            return Ok(Some(command));
        }

        if ctx.available() < 4 {
            return Ok(None);
        }
        let mut raw = [0u8; 4];
        ctx.read_from_device(&mut raw);
        Ok(Some(u32::from_le_bytes(raw)))
    }

    fn stop(&mut self, _ctx: &mut DriverContext) {
        let _call = self.shared.enter(DriverCall::Stop);

        let delay = self.shared.script().stop_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if std::mem::take(&mut self.started) {
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Handle for scripting and inspecting mock drivers.
#[derive(Debug, Clone)]
pub struct MockDriverHandle {
    shared: Arc<Shared>,
}

impl MockDriverHandle {
    /// Cell counts reported by the next successful start.
    pub fn set_cells(&self, text_cells: usize, status_cells: usize) {
        let mut script = self.shared.script();
        script.info.text_cells = text_cells;
        script.info.status_cells = status_cells;
    }

    /// Key map reported by the next successful start.
    pub fn set_key_bindings(&self, bindings: Vec<KeyBinding>) {
        self.shared.script().info.key_bindings = bindings;
    }

    /// Make every subsequent start fail.
    pub fn fail_init(&self, message: impl Into<String>) {
        self.shared.script().init_failure = Some(message.into());
    }

    /// Let subsequent starts succeed again.
    pub fn succeed_init(&self) {
        self.shared.script().init_failure = None;
    }

    /// Block inside `start` for `delay`.
    pub fn set_init_delay(&self, delay: Duration) {
        self.shared.script().init_delay = delay;
    }

    /// Block inside `stop` for `delay`.
    pub fn set_stop_delay(&self, delay: Duration) {
        self.shared.script().stop_delay = delay;
    }

    /// Request a self-wake `delay` after each successful start.
    pub fn wake_after_start(&self, delay: Duration) {
        self.shared.script().wake_after_start = Some(delay);
    }

    /// Queue a packed command returned by the next read, ahead of device bytes.
    pub fn queue_command(&self, command: u32) {
        self.shared.script().queued.push_back(command);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Patterns passed to `write_window`, in order.
    pub fn written_windows(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::WriteWindow(pattern) => Some(pattern),
                _ => None,
            })
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, DriverCall::Stop))
            .count()
    }

    /// Number of calls that began while another call was in flight.
    pub fn overlapping_calls(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    /// Number of distinct threads that called into any mock driver.
    pub fn calling_threads(&self) -> usize {
        self.shared
            .threads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Drivers started and not yet stopped.
    pub fn live_drivers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live drivers observed.
    pub fn max_live_drivers(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::InputBuffer;
    use crate::types::{DeviceProfile, PairedDevice};
    use tokio::sync::mpsc;

    fn candidate() -> ConnectionCandidate {
        ConnectionCandidate::new(
            PairedDevice::new(BluetoothAddress::new("00:11:22:33:44:55").unwrap(), "Esys-40"),
            Arc::new(DeviceProfile::new("Esys", "eu")),
        )
    }

    #[test]
    fn test_decodes_little_endian_commands() {
        let (factory, handle) = MockDriverFactory::new();
        let input = InputBuffer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = DriverContext::new(input.clone(), tx);
        let mut driver = factory.create(&candidate());

        driver.start(&mut ctx).unwrap();
        input.push(&0x0003_0021u32.to_le_bytes());
        input.push(&[0xff, 0xff]);

        assert_eq!(driver.read_command(&mut ctx).unwrap(), Some(0x0003_0021));
        assert_eq!(driver.read_command(&mut ctx).unwrap(), None);
        assert_eq!(handle.live_drivers(), 1);

        driver.stop(&mut ctx);
        assert_eq!(handle.live_drivers(), 0);
        assert_eq!(handle.stop_count(), 1);
    }

    #[test]
    fn test_queued_commands_come_first() {
        let (factory, handle) = MockDriverFactory::new();
        let input = InputBuffer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = DriverContext::new(input.clone(), tx);
        let mut driver = factory.create(&candidate());

        handle.queue_command(7);
        input.push(&9u32.to_le_bytes());

        assert_eq!(driver.read_command(&mut ctx).unwrap(), Some(7));
        assert_eq!(driver.read_command(&mut ctx).unwrap(), Some(9));
    }

    #[test]
    fn test_init_failure_is_reported() {
        let (factory, handle) = MockDriverFactory::new();
        handle.fail_init("handshake timeout");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ctx = DriverContext::new(InputBuffer::new(), tx);

        let result = factory.create(&candidate()).start(&mut ctx);
        assert!(matches!(
            result,
            Err(HardwareError::InitializationFailed { .. })
        ));
        assert_eq!(handle.live_drivers(), 0);
    }

    #[test]
    fn test_write_window_echoes_to_device() {
        let (factory, handle) = MockDriverFactory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ctx = DriverContext::new(InputBuffer::new(), tx);
        let mut driver = factory.create(&candidate());

        driver.write_window(&mut ctx, &[1, 2, 3]).unwrap();
        assert_eq!(rx.try_recv().unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(handle.written_windows(), vec![vec![1, 2, 3]]);
        assert_eq!(handle.overlapping_calls(), 0);
        assert_eq!(handle.calling_threads(), 1);
    }
}
