//! Application-side connection to the display service.
//!
//! [`ClientConnectionManager`] binds to the service, subscribes to its
//! events and hands them to a [`DisplayListener`]. If binding fails or the
//! service goes away it rebinds following a [`RebindPolicy`]; once the
//! policy is exhausted the listener sees [`ConnectionState::Error`] and the
//! manager stays idle until it is rebuilt.
//!
//! Every listener callback runs on one task spawned at construction, so the
//! listener never sees two callbacks at once, whichever thread the service
//! delivered the event on.

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use braillink_core::{ConnectionState, DisplayProperties, InputEvent};
use braillink_protocol::{DisplayService, ProtocolError, ServiceEvent, Subscriber, SubscriberId};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::RebindPolicy;
use crate::binder::{AnyBinder, Binding, ServiceBinder};

/// Receives display events on the manager's callback task.
pub trait DisplayListener: Send + 'static {
    /// Called only when the state differs from the last one reported.
    fn on_connection_state_changed(&mut self, state: ConnectionState);

    fn on_connection_progress(&mut self, _description: Option<&str>) {}

    fn on_input(&mut self, _event: InputEvent) {}
}

/// Event tagged with the binding generation it arrived on.
type Tagged = (u64, ServiceEvent);

struct ClientSubscriber {
    id: SubscriberId,
    generation: u64,
    lost: CancellationToken,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl Subscriber for ClientSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, event: &ServiceEvent) -> braillink_protocol::Result<()> {
        if self.lost.is_cancelled() {
            return Err(ProtocolError::Unreachable);
        }
        self.tx
            .send((self.generation, event.clone()))
            .map_err(|_| ProtocolError::Unreachable)
    }
}

struct BoundService {
    service: Arc<dyn DisplayService>,
    subscriber: SubscriberId,
}

struct Shared {
    bound: Mutex<Option<BoundService>>,
    properties: Mutex<Option<DisplayProperties>>,
    shut_down: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    fn bound(&self) -> MutexGuard<'_, Option<BoundService>> {
        self.bound.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn properties(&self) -> MutexGuard<'_, Option<DisplayProperties>> {
        self.properties.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn service(&self) -> Option<Arc<dyn DisplayService>> {
        self.bound().as_ref().map(|b| b.service.clone())
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Unregister from and forget the current service, if any.
    fn release(&self) {
        if let Some(bound) = self.bound().take() {
            if let Err(e) = bound.service.unregister(bound.subscriber) {
                debug!(error = %e, "Unregister failed");
            }
        }
    }
}

/// Keeps an application bound to the display service.
///
/// Must be created inside a tokio runtime; the callback task runs there.
///
/// # Example
///
/// ```no_run
/// use braillink_client::{
///     ClientConnectionManager, DisplayListener, RebindPolicy, TcpBinder, TcpBinderConfig,
/// };
/// use braillink_core::ConnectionState;
///
/// struct Printer;
///
/// impl DisplayListener for Printer {
///     fn on_connection_state_changed(&mut self, state: ConnectionState) {
///         println!("display is now {state:?}");
///     }
/// }
///
/// # async fn example() {
/// let binder = TcpBinder::new(TcpBinderConfig::default());
/// let manager = ClientConnectionManager::new(binder, RebindPolicy::default(), Printer);
/// manager.poll();
/// manager.display_dots(&[0x01, 0x03, 0x07]);
/// manager.shutdown();
/// # }
/// ```
pub struct ClientConnectionManager {
    shared: Arc<Shared>,
}

impl ClientConnectionManager {
    /// Start binding immediately and deliver callbacks to `listener`.
    pub fn new(
        binder: impl Into<AnyBinder>,
        policy: RebindPolicy,
        listener: impl DisplayListener,
    ) -> Self {
        let shared = Arc::new(Shared {
            bound: Mutex::new(None),
            properties: Mutex::new(None),
            shut_down: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            binder: binder.into(),
            policy,
            listener,
            shared: shared.clone(),
            events_tx,
            failed_binds: 0,
            generation: 0,
            state: None,
            lost: None,
            next_bind: Some(Instant::now()),
        };
        tokio::spawn(worker.run(events_rx));

        Self { shared }
    }

    /// Properties of the connected display; `None` unless connected.
    pub fn display_properties(&self) -> Option<DisplayProperties> {
        self.shared.properties().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.shared.bound().is_some()
    }

    /// Show `pattern` on the display. Dropped while unbound.
    pub fn display_dots(&self, pattern: &[u8]) {
        match self.shared.service() {
            Some(service) => {
                if let Err(e) = service.display_dots(pattern) {
                    warn!(error = %e, "Error in display_dots");
                }
            }
            None => trace!("display_dots dropped: service not bound"),
        }
    }

    /// Ask the service to look for a display. Dropped while unbound.
    pub fn poll(&self) {
        match self.shared.service() {
            Some(service) => {
                if let Err(e) = service.poll() {
                    warn!(error = %e, "Error in poll");
                }
            }
            None => trace!("poll dropped: service not bound"),
        }
    }

    /// Unregister, unbind and stop calling the listener. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down display client");
        self.shared.release();
        self.shared.cancel.cancel();
    }
}

impl Drop for ClientConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ClientConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnectionManager")
            .field("bound", &self.is_bound())
            .field("shut_down", &self.shared.is_shut_down())
            .finish()
    }
}

struct Worker<L> {
    binder: AnyBinder,
    policy: RebindPolicy,
    listener: L,
    shared: Arc<Shared>,
    events_tx: mpsc::UnboundedSender<Tagged>,
    failed_binds: u32,
    generation: u64,
    state: Option<ConnectionState>,
    lost: Option<CancellationToken>,
    next_bind: Option<Instant>,
}

impl<L: DisplayListener> Worker<L> {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Tagged>) {
        let cancel = self.shared.cancel.clone();

        loop {
            let lost = self.lost.clone();
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some((generation, event)) = events.recv() => {
                    if generation == self.generation {
                        self.handle_event(event);
                    } else {
                        trace!(generation, "Dropping event from an old binding");
                    }
                }
                () = wait_lost(lost.as_ref()) => self.on_lost(),
                () = wait_until(self.next_bind) => {
                    self.next_bind = None;
                    self.bind(&cancel).await;
                }
            }
        }

        if let Some(lost) = self.lost.take() {
            lost.cancel();
        }
        self.shared.release();
        debug!("Display client task finished");
    }

    async fn bind(&mut self, cancel: &CancellationToken) {
        let result = tokio::select! {
            () = cancel.cancelled() => return,
            result = self.binder.bind() => result,
        };

        let binding = match result {
            Ok(binding) => binding,
            Err(e) => {
                error!(error = %e, "Failed to bind display service");
                self.schedule_rebind();
                return;
            }
        };

        if let Err(e) = self.register(binding) {
            error!(error = %e, "Failed to register with display service");
            self.on_lost();
        }
    }

    fn register(&mut self, binding: Binding) -> braillink_protocol::Result<()> {
        self.generation += 1;
        let subscriber = ClientSubscriber {
            id: SubscriberId::next(),
            generation: self.generation,
            lost: binding.lost.clone(),
            tx: self.events_tx.clone(),
        };
        let id = subscriber.id;

        self.lost = Some(binding.lost.clone());
        binding.service.register(Arc::new(subscriber))?;

        *self.shared.bound() = Some(BoundService {
            service: binding.service,
            subscriber: id,
        });
        self.failed_binds = 0;
        info!(subscriber = %id, "Connected to display service");
        Ok(())
    }

    fn on_lost(&mut self) {
        if let Some(lost) = self.lost.take() {
            lost.cancel();
        }
        *self.shared.bound() = None;
        error!("Disconnected from display service");

        // Reported as a plain disconnect; the rebind outcome decides what follows.
        self.report_state(ConnectionState::Disconnected, None);
        self.schedule_rebind();
    }

    fn schedule_rebind(&mut self) {
        match self.policy.delay_for(self.failed_binds) {
            Some(delay) => {
                self.failed_binds += 1;
                // An unrepresentable deadline never fires.
                self.next_bind = Instant::now().checked_add(delay);
                warn!(
                    attempt = self.failed_binds,
                    delay_ms = delay.as_millis() as u64,
                    "Will rebind to display service"
                );
            }
            None => {
                error!(
                    attempts = self.failed_binds,
                    "Giving up on the display service"
                );
                self.report_state(ConnectionState::Error, None);
            }
        }
    }

    fn handle_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::StateChanged { state, properties } => {
                self.report_state(state, properties);
            }
            ServiceEvent::Progress { description } => {
                if !self.shared.is_shut_down() {
                    self.listener.on_connection_progress(description.as_deref());
                }
            }
            ServiceEvent::Input { event } => {
                if !self.shared.is_shut_down() {
                    self.listener.on_input(event);
                }
            }
        }
    }

    fn report_state(&mut self, state: ConnectionState, properties: Option<DisplayProperties>) {
        if self.shared.is_shut_down() {
            return;
        }
        *self.shared.properties() = properties;

        if self.state != Some(state) {
            self.state = Some(state);
            self.listener.on_connection_state_changed(state);
        }
    }
}

async fn wait_lost(lost: Option<&CancellationToken>) {
    match lost {
        Some(lost) => lost.cancelled().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
