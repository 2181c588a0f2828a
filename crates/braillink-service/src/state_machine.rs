//! The service's single source of truth for the connection state.
//!
//! [`ConnectionStateMachine`] is a tokio task that owns the connection
//! state, the subscriber registry and the current [`ConnectionSupervisor`].
//! Every trigger, whether it comes from a client, from the host (screen
//! on/off, pairing, static data) or from a supervisor, is a message on one
//! queue, so triggers are handled strictly one at a time.
//!
//! ```text
//!  ServiceHandle ──┐
//!  ServiceHandle ──┼──> command queue ──> ConnectionStateMachine ──> subscribers
//!  supervisor ─────┘                              │
//!                                                 └──spawn/cancel──> ConnectionSupervisor
//! ```
//!
//! # Static data gate
//!
//! Nothing connects until the host reports its static data (driver tables)
//! as ready. A connect requested earlier is remembered and replayed. If the
//! data fails to load the service enters the terminal `Error` state and
//! answers every later connect with the same `Error` broadcast.
//!
//! # Late subscribers
//!
//! A subscriber that registers while a connect or disconnect is in flight
//! receives nothing until that operation concludes, then exactly one state
//! event. One that registers while the service is settled immediately
//! receives the current progress (if any) followed by the current state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use braillink_hardware::mock::{MockConnector, MockDriverFactory};
//! use braillink_hardware::{DeviceCatalog, MemoryAddressStore, StaticPairingSource};
//! use braillink_protocol::ChannelSubscriber;
//! use braillink_service::{ConnectionStateMachine, DisplayBackend, ServiceConfig};
//!
//! # async fn example() -> braillink_service::Result<()> {
//! let (connector, _link) = MockConnector::new();
//! let (drivers, _driver) = MockDriverFactory::new();
//! let backend = DisplayBackend {
//!     catalog: Arc::new(DeviceCatalog::new(
//!         Arc::new(StaticPairingSource::new()),
//!         Arc::new(MemoryAddressStore::new()),
//!     )),
//!     connector: connector.into(),
//!     drivers: Arc::new(drivers),
//! };
//!
//! let service = ConnectionStateMachine::spawn(backend, ServiceConfig::default());
//! let (subscriber, mut events) = ChannelSubscriber::new();
//! service.subscribe(Arc::new(subscriber))?;
//! service.static_data_ready()?;
//! service.connect()?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use braillink_core::{BluetoothAddress, ConnectionState, DisplayProperties};
use braillink_protocol::{DisplayService, ProtocolError, ServiceEvent, Subscriber, SubscriberId};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::subscribers::SubscriberRegistry;
use crate::supervisor::{ConnectionSupervisor, DisplayBackend, ReportSink, SupervisorEvent};
use crate::transitions::{ConnectionTracker, StateTransition};

/// Whether the host's static data has loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataReadiness {
    Pending,
    Ready,
    Failed(String),
}

/// Point-in-time view of the service, for diagnostics.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub state: ConnectionState,
    pub progress: Option<String>,
    pub properties: Option<DisplayProperties>,
    pub data: DataReadiness,
    pub subscribers: usize,
    pub supervisor_active: bool,
    pub sleep_pending: bool,
    pub transitions: Vec<StateTransition>,
}

enum Command {
    Connect,
    Disconnect,
    DeviceWake,
    DeviceSleep,
    PairingAdded(BluetoothAddress),
    StaticData(std::result::Result<(), String>),
    Register(Arc<dyn Subscriber>),
    Unregister(SubscriberId),
    DisplayDots(Bytes),
    Poll,
    Report { generation: u64, event: SupervisorEvent },
    Snapshot(oneshot::Sender<ServiceSnapshot>),
    Shutdown,
}

/// Cloneable handle to a running [`ConnectionStateMachine`].
///
/// Every method enqueues a message and returns immediately.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ServiceHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ServiceError::Stopped)
    }

    /// Try to connect to a display.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// The host screen turned on.
    pub fn device_wake(&self) -> Result<()> {
        self.send(Command::DeviceWake)
    }

    /// The host screen turned off; disconnect after the grace period.
    pub fn device_sleep(&self) -> Result<()> {
        self.send(Command::DeviceSleep)
    }

    /// A device finished bonding.
    pub fn pairing_added(&self, address: BluetoothAddress) -> Result<()> {
        self.send(Command::PairingAdded(address))
    }

    pub fn static_data_ready(&self) -> Result<()> {
        self.send(Command::StaticData(Ok(())))
    }

    pub fn static_data_failed(&self, reason: impl Into<String>) -> Result<()> {
        self.send(Command::StaticData(Err(reason.into())))
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        self.send(Command::Register(subscriber))
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.send(Command::Unregister(id))
    }

    /// Show a pattern if a display is connected; dropped otherwise.
    pub fn show(&self, pattern: impl Into<Bytes>) -> Result<()> {
        self.send(Command::DisplayDots(pattern.into()))
    }

    /// Current state, progress and transition history.
    pub async fn snapshot(&self) -> Result<ServiceSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Stop the state machine. A running supervisor is told to disconnect.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl DisplayService for ServiceHandle {
    fn register(&self, subscriber: Arc<dyn Subscriber>) -> braillink_protocol::Result<()> {
        self.subscribe(subscriber)
            .map_err(|_| ProtocolError::ServiceUnavailable)
    }

    fn unregister(&self, id: SubscriberId) -> braillink_protocol::Result<()> {
        self.unsubscribe(id)
            .map_err(|_| ProtocolError::ServiceUnavailable)
    }

    fn display_dots(&self, pattern: &[u8]) -> braillink_protocol::Result<()> {
        self.show(Bytes::copy_from_slice(pattern))
            .map_err(|_| ProtocolError::ServiceUnavailable)
    }

    fn poll(&self) -> braillink_protocol::Result<()> {
        self.send(Command::Poll)
            .map_err(|_| ProtocolError::ServiceUnavailable)
    }
}

/// The connection state machine task.
pub struct ConnectionStateMachine {
    config: ServiceConfig,
    backend: Arc<DisplayBackend>,
    commands: mpsc::UnboundedReceiver<Command>,
    reports: mpsc::WeakUnboundedSender<Command>,
    tracker: ConnectionTracker,
    data: DataReadiness,
    registry: SubscriberRegistry,
    awaiting: Vec<SubscriberId>,
    supervisor: Option<ConnectionSupervisor>,
    generation: u64,
    connect_pending: bool,
    deferred_connect: bool,
    preferred: Option<BluetoothAddress>,
    progress: Option<String>,
    properties: Option<DisplayProperties>,
    sleep_deadline: Option<Instant>,
}

impl ConnectionStateMachine {
    /// Start the state machine on the current tokio runtime.
    ///
    /// The task ends on [`ServiceHandle::shutdown`] or once every handle has
    /// been dropped.
    pub fn spawn(backend: DisplayBackend, config: ServiceConfig) -> ServiceHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let data = if config.static_data_ready {
            DataReadiness::Ready
        } else {
            DataReadiness::Pending
        };

        let machine = Self {
            config,
            backend: Arc::new(backend),
            commands: commands_rx,
            reports: commands_tx.downgrade(),
            tracker: ConnectionTracker::new(),
            data,
            registry: SubscriberRegistry::new(),
            awaiting: Vec::new(),
            supervisor: None,
            generation: 0,
            connect_pending: false,
            deferred_connect: false,
            preferred: None,
            progress: None,
            properties: None,
            sleep_deadline: None,
        };
        tokio::spawn(machine.run());

        ServiceHandle {
            commands: commands_tx,
        }
    }

    async fn run(mut self) {
        info!("Display service started");

        loop {
            let command = match self.sleep_deadline {
                Some(deadline) => tokio::select! {
                    biased;
                    command = self.commands.recv() => command,
                    () = tokio::time::sleep_until(deadline) => {
                        self.sleep_deadline = None;
                        debug!("Screen-off grace period elapsed");
                        self.disconnect();
                        continue;
                    }
                },
                None => self.commands.recv().await,
            };

            match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => self.handle(command),
            }
        }

        if let Some(supervisor) = self.supervisor.take() {
            supervisor.disconnect();
        }
        info!("Display service stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Poll => {
                debug!("Poll requested");
                self.connect();
            }
            Command::Disconnect => self.disconnect(),
            Command::DeviceWake => {
                if self.sleep_deadline.take().is_some() {
                    debug!("Screen on within grace period");
                }
                self.connect();
            }
            Command::DeviceSleep => {
                if self.sleep_deadline.is_none() {
                    let delay = self.config.screen_off_disconnect_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "Screen off, scheduling disconnect");
                    self.sleep_deadline = Some(Instant::now() + delay);
                }
            }
            Command::PairingAdded(address) => self.pairing_added(address),
            Command::StaticData(result) => self.static_data(result),
            Command::Register(subscriber) => self.register(subscriber),
            Command::Unregister(id) => {
                self.registry.remove(id);
                self.awaiting.retain(|waiting| *waiting != id);
            }
            Command::DisplayDots(pattern) => self.display_dots(pattern),
            Command::Report { generation, event } => self.supervisor_report(generation, event),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn state(&self) -> ConnectionState {
        self.tracker.current_state()
    }

    fn connect(&mut self) {
        match &self.data {
            DataReadiness::Failed(_) => {
                debug!("Static data failed, repeating error");
                self.broadcast_state();
                return;
            }
            DataReadiness::Pending => {
                debug!("Static data not ready, deferring connect");
                self.deferred_connect = true;
                return;
            }
            DataReadiness::Ready => {}
        }

        if self.state() == ConnectionState::Connected {
            return;
        }
        if let Some(supervisor) = &self.supervisor {
            debug!(generation = supervisor.generation(), "Supervisor busy, connect pending");
            self.connect_pending = true;
            return;
        }

        self.spawn_supervisor();
    }

    fn spawn_supervisor(&mut self) {
        let Some(commands) = self.reports.upgrade() else {
            return;
        };
        let report: ReportSink = Arc::new(move |generation, event| {
            let _ = commands.send(Command::Report { generation, event });
        });

        self.generation += 1;
        let preferred = self.preferred.take();
        info!(generation = self.generation, preferred = ?preferred, "Starting connection supervisor");

        self.supervisor = Some(ConnectionSupervisor::spawn(
            self.backend.clone(),
            &self.config,
            self.generation,
            preferred,
            report,
        ));
        self.set_state(ConnectionState::Connecting);
    }

    fn disconnect(&mut self) {
        self.connect_pending = false;
        self.deferred_connect = false;

        if let Some(supervisor) = &self.supervisor {
            supervisor.disconnect();
        }
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn pairing_added(&mut self, address: BluetoothAddress) {
        if self.state() == ConnectionState::Connected {
            debug!(%address, "Already connected, ignoring new pairing");
            return;
        }
        info!(%address, "New display paired");
        self.preferred = Some(address);
        self.connect();
    }

    fn static_data(&mut self, result: std::result::Result<(), String>) {
        if self.data != DataReadiness::Pending {
            warn!(data = ?self.data, "Static data already settled");
            return;
        }

        match result {
            Ok(()) => {
                info!("Static data ready");
                self.data = DataReadiness::Ready;
                if std::mem::take(&mut self.deferred_connect) || !self.registry.is_empty() {
                    self.connect();
                }
            }
            Err(reason) => {
                error!(%reason, "Static data unavailable, display service disabled");
                self.data = DataReadiness::Failed(reason);
                self.deferred_connect = false;
                self.set_state(ConnectionState::Error);
            }
        }
    }

    fn register(&mut self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        self.registry.insert(subscriber);

        if self.in_flight() {
            debug!(subscriber = %id, "Registered mid-operation, holding events");
            if !self.awaiting.contains(&id) {
                self.awaiting.push(id);
            }
            return;
        }
        self.send_current(id);
    }

    fn display_dots(&mut self, pattern: Bytes) {
        match (&self.supervisor, self.state()) {
            (Some(supervisor), ConnectionState::Connected) => supervisor.display_dots(pattern),
            _ => debug!(cells = pattern.len(), "Not connected, dropping pattern"),
        }
    }

    fn supervisor_report(&mut self, generation: u64, event: SupervisorEvent) {
        let cancelled = match &self.supervisor {
            Some(supervisor) if supervisor.generation() == generation => supervisor.is_cancelled(),
            _ => {
                debug!(generation, "Ignoring report from retired supervisor");
                return;
            }
        };

        match event {
            SupervisorEvent::Progress(description) => {
                if !cancelled {
                    self.set_progress(description);
                }
            }
            SupervisorEvent::Connected(properties) => {
                if cancelled {
                    debug!(generation, "Connected after disconnect was requested");
                    return;
                }
                self.connect_pending = false;
                self.properties = Some(properties);
                self.set_state(ConnectionState::Connected);
            }
            SupervisorEvent::Input(event) => {
                if !cancelled && self.state() == ConnectionState::Connected {
                    self.registry.broadcast(&ServiceEvent::Input { event });
                }
            }
            SupervisorEvent::Finished => self.supervisor_finished(cancelled),
        }
    }

    fn supervisor_finished(&mut self, cancelled: bool) {
        self.supervisor = None;
        if cancelled {
            self.set_progress(None);
        }

        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            self.set_state(ConnectionState::Disconnected);
        } else {
            for id in std::mem::take(&mut self.awaiting) {
                self.send_current(id);
            }
        }

        if std::mem::take(&mut self.connect_pending) {
            debug!("Replaying pending connect");
            self.connect();
        }
    }

    /// A connect or disconnect has not yet concluded.
    fn in_flight(&self) -> bool {
        self.data == DataReadiness::Pending
            || (self.supervisor.is_some() && self.state() != ConnectionState::Connected)
    }

    fn set_state(&mut self, target: ConnectionState) {
        match self.tracker.transition_to(target) {
            Ok(transition) => {
                info!(from = %transition.from, to = %transition.to, "Connection state changed");
                if target != ConnectionState::Connected {
                    self.properties = None;
                }
                self.broadcast_state();
            }
            Err(e) => warn!(error = %e, "Rejected connection state change"),
        }
    }

    fn state_event(&self) -> ServiceEvent {
        match (self.state(), &self.properties) {
            (ConnectionState::Connected, Some(properties)) => {
                ServiceEvent::connected(properties.clone())
            }
            (state, _) => ServiceEvent::state(state),
        }
    }

    /// State events conclude whatever late subscribers were waiting for.
    fn broadcast_state(&mut self) {
        let event = self.state_event();
        self.registry.broadcast(&event);
        self.awaiting.clear();
    }

    fn set_progress(&mut self, description: Option<String>) {
        if self.progress == description {
            return;
        }
        self.progress = description.clone();
        self.registry
            .broadcast_except(&ServiceEvent::progress(description), &self.awaiting);
    }

    fn send_current(&mut self, id: SubscriberId) {
        if let Some(description) = &self.progress {
            let event = ServiceEvent::progress(Some(description.clone()));
            if !self.registry.send_to(id, &event) {
                return;
            }
        }
        let event = self.state_event();
        self.registry.send_to(id, &event);
    }

    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            state: self.state(),
            progress: self.progress.clone(),
            properties: self.properties.clone(),
            data: self.data.clone(),
            subscribers: self.registry.len(),
            supervisor_active: self.supervisor.is_some(),
            sleep_pending: self.sleep_deadline.is_some(),
            transitions: self.tracker.history().iter().cloned().collect(),
        }
    }
}
