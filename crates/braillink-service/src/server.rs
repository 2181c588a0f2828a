//! TCP front end of the display service.
//!
//! Each accepted connection gets its own subscriber and speaks the
//! newline-delimited JSON protocol from `braillink_protocol`: requests come
//! in, broadcasts go out.
//!
//! ```text
//! client 1 ┐                     ┌─> ServiceHandle ──> ConnectionStateMachine
//!          ├──> ServiceServer ───┤
//! client 2 ┘    (ServerCodec)    └─< ChannelSubscriber <── broadcasts
//! ```
//!
//! # Example
//!
//! ```no_run
//! use braillink_service::{ServiceHandle, ServiceServer, ServiceServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(service: ServiceHandle) -> braillink_service::Result<()> {
//! let server = ServiceServer::bind(ServiceServerConfig::default(), service).await?;
//! let shutdown = CancellationToken::new();
//! server.run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use braillink_protocol::{
    ChannelSubscriber, DisplayService, ProtocolError, ServerCodec, ServiceRequest, Subscriber,
    SubscriberId,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ServiceServerConfig;
use crate::error::{Result, ServiceError};
use crate::state_machine::ServiceHandle;

/// Connection information snapshot.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,

    /// Subscriber standing in for this connection.
    pub subscriber: SubscriberId,

    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }
}

/// Live view of the server's client connections.
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    inner: Arc<Mutex<HashMap<SocketAddr, ConnectionInfo>>>,
}

impl Sessions {
    fn lock(&self) -> MutexGuard<'_, HashMap<SocketAddr, ConnectionInfo>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn list(&self) -> Vec<ConnectionInfo> {
        self.lock().values().cloned().collect()
    }
}

/// TCP server exposing a [`ServiceHandle`] to remote clients.
pub struct ServiceServer {
    listener: TcpListener,
    config: ServiceServerConfig,
    service: ServiceHandle,
    sessions: Sessions,
}

impl ServiceServer {
    /// Bind the listener. Use port 0 to let the OS choose.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BindFailed`] if the address cannot be bound.
    pub async fn bind(config: ServiceServerConfig, service: ServiceHandle) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|_| ServiceError::BindFailed(config.bind_addr))?;

        info!(
            "Display service listening on {} (max {} connections)",
            listener.local_addr().unwrap_or(config.bind_addr),
            config.max_connections
        );

        Ok(Self {
            listener,
            config,
            service,
            sessions: Sessions::default(),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn sessions(&self) -> Sessions {
        self.sessions.clone()
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Open connections are closed when the shutdown token fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let (stream, addr) = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };
            debug!("Accepted new connection from {}", addr);

            if self.sessions.len() >= self.config.max_connections {
                error!(
                    addr = %addr,
                    max_connections = self.config.max_connections,
                    "Connection rejected: maximum connections reached"
                );
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            tokio::spawn(serve_connection(
                stream,
                addr,
                self.service.clone(),
                self.sessions.clone(),
                shutdown.child_token(),
            ));
        }

        info!("Display service listener closed");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    service: ServiceHandle,
    sessions: Sessions,
    shutdown: CancellationToken,
) {
    let (mut sink, mut requests) = Framed::new(stream, ServerCodec::new()).split();
    let (subscriber, mut events) = ChannelSubscriber::new();
    let subscriber: Arc<dyn Subscriber> = Arc::new(subscriber);
    let id = subscriber.id();

    sessions.lock().insert(
        addr,
        ConnectionInfo {
            remote_addr: addr,
            subscriber: id,
            connected_at: Utc::now(),
        },
    );
    info!(client = %addr, subscriber = %id, "Client connected (total: {})", sessions.len());

    let mut registered = false;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            request = requests.next() => match request {
                Some(Ok(request)) => {
                    trace!(client = %addr, ?request, "Request");
                    let result = match request {
                        ServiceRequest::Register => {
                            registered = true;
                            service.register(subscriber.clone())
                        }
                        ServiceRequest::Unregister => {
                            registered = false;
                            service.unregister(id)
                        }
                        ServiceRequest::DisplayDots { pattern } => service.display_dots(&pattern),
                        ServiceRequest::Poll => service.poll(),
                    };
                    if let Err(e) = result {
                        warn!(client = %addr, error = %e, "Display service unavailable");
                        break;
                    }
                }
                Some(Err(e @ ProtocolError::Malformed(_))) => {
                    warn!(client = %addr, error = %e, "Malformed request, closing connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(client = %addr, error = %e, "Client connection failed");
                    break;
                }
                None => break,
            },
            Some(event) = events.recv() => {
                if let Err(e) = sink.send(event).await {
                    debug!(client = %addr, error = %e, "Failed to send event");
                    break;
                }
            }
        }
    }

    if registered {
        let _ = service.unregister(id);
    }
    sessions.lock().remove(&addr);
    info!(client = %addr, "Client disconnected");
}
