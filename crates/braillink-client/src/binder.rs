//! Ways for a client to reach the display service.
//!
//! A [`ServiceBinder`] produces a [`Binding`]: something implementing
//! [`DisplayService`] plus a token that is cancelled when the binding dies.
//!
//! - [`TcpBinder`] talks to a remote `ServiceServer` over TCP.
//! - [`LocalBinder`] hands out an in-process service and can sever the
//!   binding on demand, the way a service process dying would.

#![allow(async_fn_in_trait)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use braillink_protocol::{
    ClientCodec, DisplayService, ProtocolError, ServiceRequest, Subscriber, SubscriberId,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{ClientError, Result};

/// A live connection to the display service.
#[derive(Clone)]
pub struct Binding {
    pub service: Arc<dyn DisplayService>,

    /// Cancelled when the service goes away.
    pub lost: CancellationToken,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("lost", &self.lost.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Establishes bindings to the display service.
pub trait ServiceBinder {
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached.
    async fn bind(&self) -> Result<Binding>;
}

/// Enum wrapper for binder dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AnyBinder {
    Tcp(TcpBinder),
    Local(LocalBinder),
}

impl ServiceBinder for AnyBinder {
    async fn bind(&self) -> Result<Binding> {
        match self {
            Self::Tcp(binder) => binder.bind().await,
            Self::Local(binder) => binder.bind().await,
        }
    }
}

impl From<TcpBinder> for AnyBinder {
    fn from(binder: TcpBinder) -> Self {
        Self::Tcp(binder)
    }
}

impl From<LocalBinder> for AnyBinder {
    fn from(binder: LocalBinder) -> Self {
        Self::Local(binder)
    }
}

/// Configuration for [`TcpBinder`].
///
/// ```
/// use braillink_client::TcpBinderConfig;
///
/// let config = TcpBinderConfig {
///     service_addr: "127.0.0.1:7878".parse().unwrap(),
///     connect_timeout_ms: 1000,
/// };
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TcpBinderConfig {
    /// Address of the display service
    pub service_addr: SocketAddr,

    /// Timeout for establishing the connection (ms)
    pub connect_timeout_ms: u64,
}

impl Default for TcpBinderConfig {
    fn default() -> Self {
        Self {
            service_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7878)),
            connect_timeout_ms: 3000,
        }
    }
}

/// Binds to a display service over TCP.
#[derive(Debug, Clone)]
pub struct TcpBinder {
    config: TcpBinderConfig,
}

impl TcpBinder {
    pub fn new(config: TcpBinderConfig) -> Self {
        Self { config }
    }
}

impl ServiceBinder for TcpBinder {
    async fn bind(&self) -> Result<Binding> {
        let addr = self.config.service_addr;
        debug!("Binding to display service at {}", addr);

        let stream = timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| ClientError::BindTimeout(self.config.connect_timeout_ms))??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let subscriber = Arc::new(Mutex::new(None));
        let lost = CancellationToken::new();

        tokio::spawn(pump(
            Framed::new(stream, ClientCodec::new()),
            requests_rx,
            subscriber.clone(),
            lost.clone(),
        ));

        info!("Bound to display service at {}", addr);
        Ok(Binding {
            service: Arc::new(RemoteService {
                requests: requests_tx,
                subscriber,
            }),
            lost,
        })
    }
}

type SubscriberSlot = Arc<Mutex<Option<Arc<dyn Subscriber>>>>;

/// Client-side stand-in for a remote display service.
struct RemoteService {
    requests: mpsc::UnboundedSender<ServiceRequest>,
    subscriber: SubscriberSlot,
}

impl RemoteService {
    fn send(&self, request: ServiceRequest) -> braillink_protocol::Result<()> {
        self.requests
            .send(request)
            .map_err(|_| ProtocolError::ServiceUnavailable)
    }
}

impl DisplayService for RemoteService {
    fn register(&self, subscriber: Arc<dyn Subscriber>) -> braillink_protocol::Result<()> {
        *self.subscriber.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscriber);
        self.send(ServiceRequest::Register)
    }

    fn unregister(&self, id: SubscriberId) -> braillink_protocol::Result<()> {
        {
            let mut slot = self.subscriber.lock().unwrap_or_else(|e| e.into_inner());
            if slot.as_ref().is_some_and(|s| s.id() == id) {
                *slot = None;
            }
        }
        self.send(ServiceRequest::Unregister)
    }

    fn display_dots(&self, pattern: &[u8]) -> braillink_protocol::Result<()> {
        self.send(ServiceRequest::DisplayDots {
            pattern: pattern.to_vec(),
        })
    }

    fn poll(&self) -> braillink_protocol::Result<()> {
        self.send(ServiceRequest::Poll)
    }
}

/// Moves requests out and events in until either side closes.
async fn pump(
    framed: Framed<TcpStream, ClientCodec>,
    mut requests: mpsc::UnboundedReceiver<ServiceRequest>,
    subscriber: SubscriberSlot,
    lost: CancellationToken,
) {
    let (mut sink, mut events) = framed.split();

    loop {
        tokio::select! {
            () = lost.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => {
                    trace!(?request, "Sending request");
                    if let Err(e) = sink.send(request).await {
                        warn!(error = %e, "Failed to send request");
                        break;
                    }
                }
                None => break,
            },
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let target = subscriber
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .clone();
                    if let Some(target) = target {
                        let _ = target.deliver(&event);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Display service connection failed");
                    break;
                }
                None => {
                    info!("Display service closed the connection");
                    break;
                }
            },
        }
    }

    lost.cancel();
}

#[derive(Default)]
struct LocalState {
    service: Option<Arc<dyn DisplayService>>,
    lost: Option<CancellationToken>,
    binds: usize,
}

/// Binds to a service living in the same process.
///
/// ```
/// use braillink_client::LocalBinder;
///
/// let binder = LocalBinder::new();
/// assert!(!binder.is_published());
/// binder.sever();
/// assert_eq!(binder.bind_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct LocalBinder {
    state: Arc<Mutex<LocalState>>,
}

impl LocalBinder {
    /// A binder with no service published yet; binding fails until one is.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(service: Arc<dyn DisplayService>) -> Self {
        let binder = Self::new();
        binder.publish(service);
        binder
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `service` available to subsequent binds.
    pub fn publish(&self, service: Arc<dyn DisplayService>) {
        self.lock().service = Some(service);
    }

    /// Withdraw the service and kill the current binding.
    pub fn sever(&self) {
        let mut state = self.lock();
        state.service = None;
        if let Some(lost) = state.lost.take() {
            debug!("Severing local binding");
            lost.cancel();
        }
    }

    pub fn is_published(&self) -> bool {
        self.lock().service.is_some()
    }

    /// Number of bind attempts so far, successful or not.
    pub fn bind_count(&self) -> usize {
        self.lock().binds
    }
}

impl std::fmt::Debug for LocalBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LocalBinder")
            .field("published", &state.service.is_some())
            .field("binds", &state.binds)
            .finish()
    }
}

impl ServiceBinder for LocalBinder {
    async fn bind(&self) -> Result<Binding> {
        let mut state = self.lock();
        state.binds += 1;

        let Some(service) = state.service.clone() else {
            return Err(ClientError::Unavailable("no local service published".into()));
        };

        let lost = CancellationToken::new();
        state.lost = Some(lost.clone());
        Ok(Binding { service, lost })
    }
}
