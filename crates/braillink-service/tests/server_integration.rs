//! The TCP front end against a live state machine.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use braillink_core::ConnectionState;
use braillink_protocol::{ClientCodec, ServiceEvent, ServiceRequest};
use braillink_service::{ServiceServer, ServiceServerConfig, Sessions};
use common::{EVENT_TIMEOUT, Harness, esys};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

type Client = Framed<TcpStream, ClientCodec>;

async fn start_server(
    harness: &Harness,
    max_connections: usize,
) -> (SocketAddr, CancellationToken, Sessions) {
    let config = ServiceServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        max_connections,
    };
    let server = ServiceServer::bind(config, harness.service.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let sessions = server.sessions();
    let shutdown = CancellationToken::new();
    tokio::spawn(server.run(shutdown.clone()));
    (addr, shutdown, sessions)
}

async fn next_event(client: &mut Client) -> ServiceEvent {
    timeout(EVENT_TIMEOUT, client.next())
        .await
        .expect("timed out waiting for event")
        .expect("server closed connection")
        .expect("malformed event")
}

async fn next_state(client: &mut Client) -> ConnectionState {
    loop {
        if let ServiceEvent::StateChanged { state, .. } = next_event(client).await {
            return state;
        }
    }
}

#[tokio::test]
async fn test_remote_client_full_session() {
    let harness = Harness::start(vec![esys(1)]);
    let (addr, shutdown, _sessions) = start_server(&harness, 4).await;

    let mut client = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
    client.send(ServiceRequest::Register).await.unwrap();
    assert_eq!(next_state(&mut client).await, ConnectionState::Disconnected);

    client.send(ServiceRequest::Poll).await.unwrap();
    assert_eq!(next_state(&mut client).await, ConnectionState::Connecting);
    assert_eq!(next_state(&mut client).await, ConnectionState::Connected);

    let mut device = harness.device().await;
    client
        .send(ServiceRequest::DisplayDots {
            pattern: vec![0x3f, 0x07],
        })
        .await
        .unwrap();

    let mut buf = [0u8; 2];
    timeout(EVENT_TIMEOUT, device.stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buf, [0x3f, 0x07]);

    shutdown.cancel();
}

#[tokio::test]
async fn test_closing_connection_unregisters() {
    let harness = Harness::start(vec![esys(1)]);
    let (addr, shutdown, sessions) = start_server(&harness, 4).await;

    let mut client = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
    client.send(ServiceRequest::Register).await.unwrap();
    next_state(&mut client).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(harness.service.snapshot().await.unwrap().subscribers, 1);

    drop(client);

    timeout(EVENT_TIMEOUT, async {
        while !sessions.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(harness.service.snapshot().await.unwrap().subscribers, 0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_connections_over_limit_are_rejected() {
    let harness = Harness::start(vec![esys(1)]);
    let (addr, shutdown, _sessions) = start_server(&harness, 1).await;

    let mut first = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
    first.send(ServiceRequest::Register).await.unwrap();
    next_state(&mut first).await;

    let mut second = Framed::new(TcpStream::connect(addr).await.unwrap(), ClientCodec::new());
    let _ = second.send(ServiceRequest::Register).await;
    let closed = timeout(EVENT_TIMEOUT, second.next()).await.unwrap();
    assert!(!matches!(closed, Some(Ok(_))));

    shutdown.cancel();
}

#[tokio::test]
async fn test_malformed_request_closes_connection() {
    use tokio::io::AsyncWriteExt;

    let harness = Harness::start(vec![esys(1)]);
    let (addr, shutdown, sessions) = start_server(&harness, 4).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"{\"type\":\"bogus\"}\n").await.unwrap();

    let mut buf = [0u8; 16];
    let read = timeout(EVENT_TIMEOUT, stream.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    timeout(EVENT_TIMEOUT, async {
        while !sessions.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    shutdown.cancel();
}
