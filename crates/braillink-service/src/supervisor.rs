//! One connection attempt from candidate discovery to teardown.
//!
//! A [`ConnectionSupervisor`] is a tokio task that:
//!
//! 1. asks the [`DeviceCatalog`] for candidates and tries each in order
//!    until a serial link opens,
//! 2. starts a [`DriverExecutor`] on the link and waits for initialization,
//! 3. pumps bytes between the link and the driver until the link fails or
//!    a disconnect is requested,
//! 4. closes the link, stops the driver and reports that it has finished.
//!
//! Everything it has to say goes through a [`ReportSink`] tagged with the
//! supervisor's generation, so the state machine can ignore stragglers from
//! a supervisor it has already replaced. `Finished` is always the last
//! report and is sent exactly once.

use std::sync::Arc;
use std::time::Duration;

use braillink_core::constants::{
    PROGRESS_INIT_FAILED_PREFIX, PROGRESS_INITIALIZING_PREFIX, PROGRESS_NO_DEVICES,
    PROGRESS_TRYING_PREFIX,
};
use braillink_core::{BluetoothAddress, DisplayProperties, InputEvent};
use braillink_hardware::{
    AnyConnector, BoxedLink, ConnectionCandidate, DeviceCatalog, DriverFactory, InputBuffer,
    SerialConnector, prefer_address,
};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::executor::{DriverExecutor, InputSink};

/// What a supervisor reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// New progress description, `None` to clear it.
    Progress(Option<String>),

    /// The driver initialized; the display is usable.
    Connected(DisplayProperties),

    /// A key command from the display.
    Input(InputEvent),

    /// The supervisor has released the link and the driver.
    Finished,
}

/// Receives `(generation, event)` reports. Called from any thread.
pub type ReportSink = Arc<dyn Fn(u64, SupervisorEvent) + Send + Sync>;

/// The hardware side of the service.
pub struct DisplayBackend {
    pub catalog: Arc<DeviceCatalog>,
    pub connector: AnyConnector,
    pub drivers: Arc<dyn DriverFactory>,
}

impl std::fmt::Debug for DisplayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayBackend")
            .field("catalog", &self.catalog)
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

/// Handle to a running connection attempt.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    generation: u64,
    cancel: CancellationToken,
    windows: mpsc::UnboundedSender<Bytes>,
}

impl ConnectionSupervisor {
    /// Start a supervisor task on the current runtime.
    ///
    /// `preferred` is tried first if it is among the candidates.
    pub fn spawn(
        backend: Arc<DisplayBackend>,
        config: &ServiceConfig,
        generation: u64,
        preferred: Option<BluetoothAddress>,
        report: ReportSink,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (windows_tx, windows_rx) = mpsc::unbounded_channel();

        let session = Session {
            backend,
            generation,
            read_buffer_size: config.read_buffer_size.max(1),
            stop_timeout: config.driver_stop_timeout(),
            cancel: cancel.clone(),
            windows: windows_rx,
            report,
        };
        tokio::spawn(session.run(preferred));

        Self {
            generation,
            cancel,
            windows: windows_tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ask the supervisor to wind down. Idempotent.
    pub fn disconnect(&self) {
        if !self.cancel.is_cancelled() {
            debug!(generation = self.generation, "Cancelling supervisor");
            self.cancel.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Forward a pattern to the driver once connected.
    pub fn display_dots(&self, pattern: Bytes) {
        let _ = self.windows.send(pattern);
    }
}

struct Session {
    backend: Arc<DisplayBackend>,
    generation: u64,
    read_buffer_size: usize,
    stop_timeout: Duration,
    cancel: CancellationToken,
    windows: mpsc::UnboundedReceiver<Bytes>,
    report: ReportSink,
}

impl Session {
    async fn run(mut self, preferred: Option<BluetoothAddress>) {
        if let Some((candidate, link)) = self.open_link(preferred.as_ref()).await {
            self.serve(candidate, link).await;
        }
        debug!(generation = self.generation, "Supervisor finished");
        self.report(SupervisorEvent::Finished);
    }

    fn report(&self, event: SupervisorEvent) {
        (self.report)(self.generation, event);
    }

    fn progress(&self, description: Option<String>) {
        self.report(SupervisorEvent::Progress(description));
    }

    async fn open_link(
        &mut self,
        preferred: Option<&BluetoothAddress>,
    ) -> Option<(ConnectionCandidate, BoxedLink)> {
        let mut candidates = self.backend.catalog.find_candidates();
        if candidates.is_empty() {
            info!("No supported display is paired");
            self.progress(Some(PROGRESS_NO_DEVICES.into()));
            return None;
        }
        if let Some(address) = preferred {
            prefer_address(&mut candidates, address);
        }

        for candidate in candidates {
            if self.cancel.is_cancelled() {
                break;
            }
            self.progress(Some(format!("{PROGRESS_TRYING_PREFIX} {}", candidate.name())));

            let attempt = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                attempt = self.backend.connector.connect(&candidate) => attempt,
            };

            match attempt {
                Ok(link) => {
                    info!(device = %candidate, "Serial link open");
                    return Some((candidate, link));
                }
                Err(e) => warn!(device = %candidate, error = %e, "Connection attempt failed"),
            }
        }

        self.progress(None);
        None
    }

    async fn serve(&mut self, candidate: ConnectionCandidate, link: BoxedLink) {
        self.progress(Some(format!(
            "{PROGRESS_INITIALIZING_PREFIX} {}",
            candidate.name()
        )));

        let (mut reader, mut writer) = tokio::io::split(link);
        let input = InputBuffer::new();
        let (output_tx, mut output) = mpsc::unbounded_channel::<Bytes>();
        let mut buf = vec![0u8; self.read_buffer_size];

        let report = self.report.clone();
        let generation = self.generation;
        let sink: InputSink =
            Box::new(move |event| report(generation, SupervisorEvent::Input(event)));

        // The driver may talk to the display while it initializes, so keep
        // the link pumping until the init result is in.
        let start = DriverExecutor::start(
            self.backend.drivers.clone(),
            candidate.clone(),
            input.clone(),
            output_tx,
            sink,
        );
        tokio::pin!(start);

        let mut link_open = true;
        let started = loop {
            tokio::select! {
                result = &mut start => break result,
                () = self.cancel.cancelled(), if link_open => {
                    debug!(device = %candidate, "Disconnect requested during init");
                    let _ = writer.shutdown().await;
                    link_open = false;
                }
                read = reader.read(&mut buf), if link_open => match read {
                    Ok(0) => link_open = false,
                    Ok(n) => input.push(&buf[..n]),
                    Err(e) => {
                        warn!(device = %candidate, error = %e, "Read failed during init");
                        link_open = false;
                    }
                },
                Some(bytes) = output.recv(), if link_open => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        warn!(device = %candidate, error = %e, "Write failed during init");
                        link_open = false;
                    }
                }
            }
        };

        let (executor, properties) = match started {
            Ok(started) => started,
            Err(e) => {
                warn!(device = %candidate, error = %e, "Display initialization failed");
                self.progress(Some(format!(
                    "{PROGRESS_INIT_FAILED_PREFIX} {}",
                    candidate.name()
                )));
                return;
            }
        };

        if !link_open || self.cancel.is_cancelled() {
            debug!(device = %candidate, "Link gone before the display became usable");
            executor.stop(self.stop_timeout).await;
            return;
        }

        if let Err(e) = self.backend.catalog.remember_success(&candidate) {
            warn!(device = %candidate, error = %e, "Could not remember display");
        }
        self.progress(None);
        self.report(SupervisorEvent::Connected(properties));
        executor.request_read();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!(device = %candidate, "Disconnect requested");
                    break;
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!(device = %candidate, "Serial link closed by display");
                        break;
                    }
                    Ok(n) => executor.add_bytes(&buf[..n]),
                    Err(e) => {
                        warn!(device = %candidate, error = %e, "Serial link read failed");
                        break;
                    }
                },
                Some(bytes) = output.recv() => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        warn!(device = %candidate, error = %e, "Serial link write failed");
                        break;
                    }
                }
                Some(pattern) = self.windows.recv() => executor.write_window(pattern),
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!(device = %candidate, error = %e, "Error closing serial link");
        }
        drop(reader);
        drop(writer);
        executor.stop(self.stop_timeout).await;
    }
}
