//! BLE transport seam and its BlueZ implementation.
//!
//! The session layer only sees [`Transport`] and [`Connection`]; the
//! concrete `bluer` backend lives in [`link`] and [`scanner`], and tests
//! use the in-memory [`mock`] transport.

pub mod link;
#[cfg(test)]
pub mod mock;
pub mod scanner;

use log::{debug, warn};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;

pub use link::BluerTransport;

/// Nordic UART service advertised by the wearable.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
/// Characteristic carrying the text telemetry notifications.
pub const TELEMETRY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Inbound queue of raw notification payloads for one session.
///
/// Closed by the transport when the link drops.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: Option<String>,
    pub address: String,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name.as_deref().unwrap_or("Unknown"),
            self.address
        )
    }
}

/// Discovery and connection establishment.
///
/// Futures are polled on the application's single-threaded `LocalSet`, so
/// they need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait Transport: Clone + 'static {
    type Connection: Connection;

    async fn discover(&self, timeout: Duration) -> Result<Vec<DeviceDescriptor>, TransportError>;

    async fn connect(&self, address: &str) -> Result<Self::Connection, TransportError>;
}

/// An established link to one device.
#[allow(async_fn_in_trait)]
pub trait Connection: 'static {
    fn address(&self) -> &str;

    /// Start notifications; every payload is pushed onto the returned queue
    /// in delivery order.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<NotificationReceiver, TransportError>;

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError>;

    async fn disconnect(self) -> Result<(), TransportError>;
}

/// Connect and subscribe, tearing the link back down if subscribing fails.
pub async fn open_link<T: Transport>(
    transport: &T,
    address: &str,
    characteristic: Uuid,
) -> Result<(T::Connection, NotificationReceiver), TransportError> {
    let mut connection = transport.connect(address).await?;
    match connection.subscribe(characteristic).await {
        Ok(notifications) => {
            debug!("Subscribed to {} on {}", characteristic, address);
            Ok((connection, notifications))
        }
        Err(e) => {
            if let Err(close) = connection.disconnect().await {
                warn!("Failed to disconnect {} after subscribe error: {}", address, close);
            }
            Err(e)
        }
    }
}

/// Unsubscribe (best effort) and disconnect.
pub async fn close_link<C: Connection>(
    mut connection: C,
    characteristic: Uuid,
) -> Result<(), TransportError> {
    if let Err(e) = connection.unsubscribe(characteristic).await {
        warn!("Failed to unsubscribe from {}: {}", connection.address(), e);
    }
    connection.disconnect().await
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    #[test]
    fn descriptors_display_like_the_picker() {
        let named = DeviceDescriptor {
            name: Some("Sensor".into()),
            address: "AA:BB:CC:DD:EE:FF".into(),
        };
        let unnamed = DeviceDescriptor {
            name: None,
            address: "11:22:33:44:55:66".into(),
        };
        assert_eq!(named.to_string(), "Sensor (AA:BB:CC:DD:EE:FF)");
        assert_eq!(unnamed.to_string(), "Unknown (11:22:33:44:55:66)");
    }

    #[tokio::test]
    async fn open_link_delivers_notifications_in_order() {
        let transport = MockTransport::new();
        let (_connection, mut rx) = open_link(&transport, "AA", TELEMETRY_CHARACTERISTIC)
            .await
            .unwrap();
        transport.notify("AA", b"1,2,3,4,5");
        transport.notify("AA", b"6,7,8,9,10");
        assert_eq!(rx.recv().await.unwrap(), b"1,2,3,4,5".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"6,7,8,9,10".to_vec());
    }

    #[tokio::test]
    async fn failed_subscribe_disconnects() {
        let transport = MockTransport::new();
        transport.fail_subscribe("AA");
        let result = open_link(&transport, "AA", TELEMETRY_CHARACTERISTIC).await;
        assert!(result.is_err());
        assert_eq!(transport.disconnected(), vec!["AA".to_string()]);
    }

    #[tokio::test]
    async fn close_link_unsubscribes_then_disconnects() {
        let transport = MockTransport::new();
        let (connection, mut rx) = open_link(&transport, "AA", TELEMETRY_CHARACTERISTIC)
            .await
            .unwrap();
        close_link(connection, TELEMETRY_CHARACTERISTIC).await.unwrap();
        assert_eq!(transport.disconnected(), vec!["AA".to_string()]);
        assert!(rx.recv().await.is_none());
    }
}
