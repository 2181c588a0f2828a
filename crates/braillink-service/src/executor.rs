//! Single-thread executor for the native driver.
//!
//! The native driver is not reentrant and must always be called from the
//! same thread. [`DriverExecutor`] owns a dedicated OS thread, named
//! `braille-driver`, that creates the driver, initializes it and then serves
//! commands from a queue until asked to stop.
//!
//! ```text
//!  supervisor ──write_window──> pending window (latest wins) ─┐
//!  supervisor ──add_bytes────> InputBuffer ──> READ ──────────┤
//!                                                             v
//!                                          braille-driver thread ──> driver
//!                                                 │    ^
//!                                 input events <──┘    └── self-wake deadline
//! ```
//!
//! # Commands
//!
//! - `WRITE` passes the most recent pattern to the driver. Patterns posted
//!   while an earlier write is queued replace it, so a burst of updates costs
//!   one driver call.
//! - `READ` drains decodable commands from the input buffer and forwards each
//!   one to the input sink. It is also issued when a delayed read requested by
//!   the driver falls due.
//! - `STOP` ends the loop; the driver is uninitialized on the way out.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use braillink_core::{DisplayProperties, InputEvent};
use braillink_hardware::{
    BrailleDriver, ConnectionCandidate, DeviceProfile, DriverContext, DriverFactory, DriverInfo,
    InputBuffer,
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};

/// Name of the driver thread.
pub const DRIVER_THREAD_NAME: &str = "braille-driver";

/// Receives every command decoded by the driver, on the driver thread.
pub type InputSink = Box<dyn FnMut(InputEvent) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverCommand {
    Write,
    Read,
    Stop,
}

/// Handle to a running driver thread.
#[derive(Debug)]
pub struct DriverExecutor {
    commands: mpsc::UnboundedSender<DriverCommand>,
    pending_window: Arc<Mutex<Option<Bytes>>>,
    input: InputBuffer,
    exited: oneshot::Receiver<()>,
    device: String,
}

impl DriverExecutor {
    /// Spawn the driver thread and wait for driver initialization.
    ///
    /// Bytes the driver sends to the display appear on `output`. Received
    /// bytes are expected in `input`, which the caller may already be
    /// filling while initialization runs.
    ///
    /// # Errors
    ///
    /// Returns the driver's initialization error, or
    /// [`ServiceError::DriverThread`] if the thread could not be spawned or
    /// died before reporting.
    pub async fn start(
        factory: Arc<dyn DriverFactory>,
        candidate: ConnectionCandidate,
        input: InputBuffer,
        output: mpsc::UnboundedSender<Bytes>,
        sink: InputSink,
    ) -> Result<(Self, DisplayProperties)> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (init_tx, init_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let pending_window = Arc::new(Mutex::new(None));

        let worker = Worker {
            factory,
            candidate: candidate.clone(),
            ctx: DriverContext::new(input.clone(), output),
            commands: commands_rx,
            pending_window: pending_window.clone(),
            sink,
        };

        std::thread::Builder::new()
            .name(DRIVER_THREAD_NAME.into())
            .spawn(move || worker.run(init_tx, exit_tx))
            .map_err(|e| ServiceError::DriverThread(e.to_string()))?;

        let info = init_rx
            .await
            .map_err(|_| ServiceError::DriverThread("driver thread exited during init".into()))??;

        info!(
            device = %candidate,
            text_cells = info.text_cells,
            status_cells = info.status_cells,
            "Driver initialized"
        );

        let properties = display_properties(&candidate.profile, info);
        let executor = Self {
            commands: commands_tx,
            pending_window,
            input,
            exited: exit_rx,
            device: candidate.to_string(),
        };
        Ok((executor, properties))
    }

    /// Queue a new display pattern, replacing any pattern not yet written.
    pub fn write_window(&self, pattern: Bytes) {
        *self
            .pending_window
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(pattern);
        self.post(DriverCommand::Write);
    }

    /// Append bytes read from the display and schedule a read.
    pub fn add_bytes(&self, bytes: &[u8]) {
        self.input.push(bytes);
        self.post(DriverCommand::Read);
    }

    /// Schedule a read of whatever is already buffered.
    pub fn request_read(&self) {
        self.post(DriverCommand::Read);
    }

    /// Stop the driver and wait up to `limit` for its thread to exit.
    ///
    /// Returns `false` if the thread was still running when the wait ended;
    /// it is then left to finish on its own.
    pub async fn stop(self, limit: Duration) -> bool {
        self.post(DriverCommand::Stop);

        match tokio::time::timeout(limit, self.exited).await {
            Ok(_) => {
                debug!(device = %self.device, "Driver thread exited");
                true
            }
            Err(_) => {
                error!(device = %self.device, "Driver thread takes very long to terminate");
                false
            }
        }
    }

    fn post(&self, command: DriverCommand) {
        if self.commands.send(command).is_err() {
            debug!(device = %self.device, ?command, "Driver thread already gone");
        }
    }
}

/// Everything the driver thread owns.
struct Worker {
    factory: Arc<dyn DriverFactory>,
    candidate: ConnectionCandidate,
    ctx: DriverContext,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
    pending_window: Arc<Mutex<Option<Bytes>>>,
    sink: InputSink,
}

impl Worker {
    fn run(mut self, init_tx: oneshot::Sender<Result<DriverInfo>>, exit_tx: oneshot::Sender<()>) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = init_tx.send(Err(ServiceError::Io(e)));
                return;
            }
        };

        runtime.block_on(self.serve(init_tx));
        let _ = exit_tx.send(());
    }

    async fn serve(&mut self, init_tx: oneshot::Sender<Result<DriverInfo>>) {
        let mut driver = self.factory.create(&self.candidate);

        match driver.start(&mut self.ctx) {
            Ok(info) => {
                if init_tx.send(Ok(info)).is_err() {
                    warn!(device = %self.candidate, "Nobody waiting for driver init, stopping");
                    driver.stop(&mut self.ctx);
                    return;
                }
            }
            Err(e) => {
                warn!(device = %self.candidate, error = %e, "Driver initialization failed");
                let _ = init_tx.send(Err(e.into()));
                return;
            }
        }

        loop {
            let command = match self.ctx.wake_deadline() {
                Some(deadline) => tokio::select! {
                    biased;
                    command = self.commands.recv() => command,
                    () = tokio::time::sleep_until(deadline) => {
                        self.ctx.clear_wake();
                        Some(DriverCommand::Read)
                    }
                },
                None => self.commands.recv().await,
            };

            match command {
                Some(DriverCommand::Write) => self.write(driver.as_mut()),
                Some(DriverCommand::Read) => self.drain(driver.as_mut()),
                Some(DriverCommand::Stop) | None => break,
            }
        }

        driver.stop(&mut self.ctx);
        debug!(device = %self.candidate, "Driver stopped");
    }

    fn write(&mut self, driver: &mut dyn BrailleDriver) {
        let pattern = self
            .pending_window
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        // Coalesced into an earlier write.
        let Some(pattern) = pattern else { return };

        if let Err(e) = driver.write_window(&mut self.ctx, &pattern) {
            warn!(device = %self.candidate, error = %e, "Failed to write display window");
        }
    }

    fn drain(&mut self, driver: &mut dyn BrailleDriver) {
        loop {
            match driver.read_command(&mut self.ctx) {
                Ok(Some(raw)) => (self.sink)(InputEvent::from_packed(raw)),
                Ok(None) => break,
                Err(e) => {
                    warn!(device = %self.candidate, error = %e, "Driver read failed");
                    break;
                }
            }
        }
    }
}

/// Display properties for a freshly initialized driver.
///
/// Only key bindings whose every key has a friendly name in the profile are
/// published; the friendly name table covers exactly the keys they use.
pub fn display_properties(profile: &DeviceProfile, info: DriverInfo) -> DisplayProperties {
    let key_bindings: Vec<_> = info
        .key_bindings
        .into_iter()
        .filter(|binding| profile.names_all_keys(binding))
        .collect();

    let mut friendly_key_names = BTreeMap::new();
    for key in key_bindings.iter().flat_map(|b| b.key_names.iter()) {
        let name = profile
            .friendly_key_names
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.clone());
        friendly_key_names.insert(key.clone(), name);
    }

    DisplayProperties {
        text_cells: info.text_cells,
        status_cells: info.status_cells,
        key_bindings,
        friendly_key_names,
    }
}
