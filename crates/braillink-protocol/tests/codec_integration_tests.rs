//! Integration tests for the JSON-lines codec over real async streams.

use braillink_core::{ConnectionState, DisplayProperties, InputEvent, KeyBinding};
use braillink_protocol::{ClientCodec, ServerCodec, ServiceEvent, ServiceRequest};
use futures::{SinkExt, StreamExt};
use rstest::rstest;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Framed, FramedRead};

fn sample_properties() -> DisplayProperties {
    DisplayProperties {
        text_cells: 40,
        status_cells: 4,
        key_bindings: vec![
            KeyBinding::new(1, ["Dot1", "Space"]),
            KeyBinding::new(2, ["RoutingKey"]).with_long_press(true),
        ],
        friendly_key_names: [
            ("Dot1".to_string(), "Dot 1".to_string()),
            ("Space".to_string(), "Space".to_string()),
            ("RoutingKey".to_string(), "Routing key".to_string()),
        ]
        .into(),
    }
}

#[tokio::test]
async fn test_request_and_event_exchange_over_duplex() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    let mut client = Framed::new(client_io, ClientCodec::new());
    let mut server = Framed::new(server_io, ServerCodec::new());

    client.send(ServiceRequest::Register).await.unwrap();
    client
        .send(ServiceRequest::DisplayDots {
            pattern: vec![0x01, 0x1b, 0xff],
        })
        .await
        .unwrap();

    assert_eq!(
        server.next().await.unwrap().unwrap(),
        ServiceRequest::Register
    );
    assert_eq!(
        server.next().await.unwrap().unwrap(),
        ServiceRequest::DisplayDots {
            pattern: vec![0x01, 0x1b, 0xff]
        }
    );

    let input = InputEvent::from_packed(0x0002_0010);
    server
        .send(ServiceEvent::connected(sample_properties()))
        .await
        .unwrap();
    server
        .send(ServiceEvent::Input {
            event: input.clone(),
        })
        .await
        .unwrap();

    assert_eq!(
        client.next().await.unwrap().unwrap(),
        ServiceEvent::connected(sample_properties())
    );
    assert_eq!(
        client.next().await.unwrap().unwrap(),
        ServiceEvent::Input { event: input }
    );
}

#[tokio::test]
async fn test_frames_split_across_writes() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut events = FramedRead::new(reader, ClientCodec::new());

    tokio::spawn(async move {
        let frame = b"{\"type\":\"progress\",\"description\":\"Trying to connect to Esys-1\"}\n";
        for chunk in frame.chunks(7) {
            writer.write_all(chunk).await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    assert_eq!(
        events.next().await.unwrap().unwrap(),
        ServiceEvent::progress(Some("Trying to connect to Esys-1".into()))
    );
    assert!(events.next().await.is_none());
}

#[rstest]
#[case(ConnectionState::Disconnected)]
#[case(ConnectionState::Connecting)]
#[case(ConnectionState::Error)]
#[tokio::test]
async fn test_state_events_survive_transport(#[case] state: ConnectionState) {
    let (client_io, server_io) = tokio::io::duplex(256);
    let mut client = Framed::new(client_io, ClientCodec::new());
    let mut server = Framed::new(server_io, ServerCodec::new());

    server.send(ServiceEvent::state(state)).await.unwrap();
    assert_eq!(
        client.next().await.unwrap().unwrap(),
        ServiceEvent::state(state)
    );
}
