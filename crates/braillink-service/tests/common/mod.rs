//! Shared fixtures for display service integration tests.
//!
//! [`Harness`] wires a real [`ConnectionStateMachine`] to mock hardware:
//! bonded devices come from a [`StaticPairingSource`], links from a
//! [`MockConnector`] and drivers from a [`MockDriverFactory`]. Tests drive
//! the service through its handle and observe it through a [`Recorder`].

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use braillink_core::{BluetoothAddress, ConnectionState};
use braillink_hardware::mock::{
    MockConnector, MockConnectorHandle, MockDeviceEnd, MockDriverFactory, MockDriverHandle,
};
use braillink_hardware::{
    AddressStore, DeviceCatalog, MemoryAddressStore, PairedDevice, StaticPairingSource,
};
use braillink_protocol::{ChannelSubscriber, ServiceEvent, Subscriber, SubscriberId};
use braillink_service::{ConnectionStateMachine, DisplayBackend, ServiceConfig, ServiceHandle};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Longest a test waits for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn address(last: u8) -> BluetoothAddress {
    BluetoothAddress::new(&format!("00:11:22:33:44:{last:02X}")).unwrap()
}

/// A bonded Esys display; the name matches the Eurobraille profile.
pub fn esys(last: u8) -> PairedDevice {
    PairedDevice::new(address(last), format!("Esys-{last}"))
}

/// Short delays so real-time tests stay fast.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        screen_off_disconnect_delay_ms: 200,
        driver_stop_timeout_ms: 1000,
        read_buffer_size: 128,
        static_data_ready: true,
    }
}

pub struct Harness {
    pub service: ServiceHandle,
    pub links: MockConnectorHandle,
    pub driver: MockDriverHandle,
    pub pairing: Arc<StaticPairingSource>,
    pub store: Arc<MemoryAddressStore>,
}

impl Harness {
    pub fn start(devices: Vec<PairedDevice>) -> Self {
        Self::with_config(devices, test_config())
    }

    pub fn with_config(devices: Vec<PairedDevice>, config: ServiceConfig) -> Self {
        init_tracing();

        let pairing = Arc::new(StaticPairingSource::with_devices(devices));
        let store = Arc::new(MemoryAddressStore::new());
        let (connector, links) = MockConnector::new();
        let (drivers, driver) = MockDriverFactory::new();

        let backend = DisplayBackend {
            catalog: Arc::new(DeviceCatalog::new(pairing.clone(), store.clone())),
            connector: connector.into(),
            drivers: Arc::new(drivers),
        };

        Self {
            service: ConnectionStateMachine::spawn(backend, config),
            links,
            driver,
            pairing,
            store,
        }
    }

    pub fn subscribe(&self) -> Recorder {
        let (subscriber, events) = ChannelSubscriber::new();
        let id = subscriber.id();
        self.service.subscribe(Arc::new(subscriber)).unwrap();
        Recorder { id, events }
    }

    /// Wait for the display end of the next accepted link.
    pub async fn device(&self) -> MockDeviceEnd {
        timeout(EVENT_TIMEOUT, self.links.next_device())
            .await
            .expect("no link was opened")
            .expect("connector dropped")
    }

    pub fn remembered(&self) -> Option<BluetoothAddress> {
        self.store.load().unwrap()
    }

    pub async fn state(&self) -> ConnectionState {
        self.service.snapshot().await.unwrap().state
    }

    /// Wait until no supervisor is running.
    pub async fn settle(&self) {
        timeout(EVENT_TIMEOUT, async {
            while self.service.snapshot().await.unwrap().supervisor_active {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("supervisor did not finish");
    }
}

/// Events delivered to one subscriber.
pub struct Recorder {
    pub id: SubscriberId,
    events: mpsc::UnboundedReceiver<ServiceEvent>,
}

impl Recorder {
    pub async fn next(&mut self) -> ServiceEvent {
        timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("subscriber channel closed")
    }

    /// Next state event, skipping progress and input.
    pub async fn next_state(&mut self) -> ConnectionState {
        loop {
            if let ServiceEvent::StateChanged { state, .. } = self.next().await {
                return state;
            }
        }
    }

    /// Collect events up to and including the first `state` event.
    pub async fn until_state(&mut self, state: ConnectionState) -> Vec<ServiceEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next().await;
            let done = matches!(&event, ServiceEvent::StateChanged { state: s, .. } if *s == state);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Events that arrive within `window`.
    pub async fn quiet(&mut self, window: Duration) -> Vec<ServiceEvent> {
        tokio::time::sleep(window).await;
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }

    pub fn close(self) {
        drop(self.events);
    }
}

pub fn states(events: &[ServiceEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|event| match event {
            ServiceEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

pub fn progress(events: &[ServiceEvent]) -> Vec<Option<String>> {
    events
        .iter()
        .filter_map(|event| match event {
            ServiceEvent::Progress { description } => Some(description.clone()),
            _ => None,
        })
        .collect()
}
