/// GATT connections to the wearable through BlueZ
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::bluetooth::scanner::{discover_devices, open_adapter};
use crate::bluetooth::{
    Connection, DeviceDescriptor, NotificationReceiver, Transport, SERVICE_UUID,
};
use crate::error::TransportError;

// BlueZ reports the link up before the remote GATT database is cached
const SERVICES_RESOLVE_POLL: Duration = Duration::from_millis(100);
const SERVICES_RESOLVE_ATTEMPTS: u32 = 50;

/// Transport backed by the default BlueZ adapter.
#[derive(Clone)]
pub struct BluerTransport {
    _session: bluer::Session,
    adapter: bluer::Adapter,
}

impl BluerTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let (session, adapter) = open_adapter().await?;
        Ok(BluerTransport {
            _session: session,
            adapter,
        })
    }
}

impl Transport for BluerTransport {
    type Connection = BluerConnection;

    async fn discover(&self, timeout: Duration) -> Result<Vec<DeviceDescriptor>, TransportError> {
        discover_devices(&self.adapter, timeout).await
    }

    async fn connect(&self, address: &str) -> Result<BluerConnection, TransportError> {
        let addr: bluer::Address = address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;
        let device = self.adapter.device(addr)?;

        if !device.is_connected().await? {
            debug!("Connecting to {}", address);
            device.connect().await?;
        }
        info!("Connected to {}", address);

        Ok(BluerConnection {
            address: address.to_string(),
            device,
            forwarders: HashMap::new(),
        })
    }
}

/// An open GATT link with its notification forwarding tasks.
pub struct BluerConnection {
    address: String,
    device: bluer::Device,
    forwarders: HashMap<Uuid, JoinHandle<()>>,
}

impl BluerConnection {
    async fn wait_for_services(&self) -> Result<(), TransportError> {
        for _ in 0..SERVICES_RESOLVE_ATTEMPTS {
            if self.device.is_services_resolved().await? {
                return Ok(());
            }
            sleep(SERVICES_RESOLVE_POLL).await;
        }
        warn!("Services of {} not resolved yet, continuing anyway", self.address);
        Ok(())
    }

    async fn find_characteristic(
        &self,
        uuid: Uuid,
    ) -> Result<bluer::gatt::remote::Characteristic, TransportError> {
        self.wait_for_services().await?;

        for service in self.device.services().await? {
            let service_uuid = service.uuid().await?;
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? == uuid {
                    if service_uuid != SERVICE_UUID {
                        debug!("{} found outside the UART service ({})", uuid, service_uuid);
                    }
                    return Ok(characteristic);
                }
            }
        }

        Err(TransportError::CharacteristicNotFound(uuid))
    }
}

impl Connection for BluerConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<NotificationReceiver, TransportError> {
        let target = self.find_characteristic(characteristic).await?;
        let stream = target.notify().await?;
        let (tx, rx) = mpsc::unbounded_channel();

        // Forward on the local set so delivery order is the stream order
        let address = self.address.clone();
        let handle = tokio::task::spawn_local(async move {
            futures_util::pin_mut!(stream);
            while let Some(value) = stream.next().await {
                if tx.send(value).is_err() {
                    break;
                }
            }
            debug!("Notification stream of {} ended", address);
        });

        if let Some(previous) = self.forwarders.insert(characteristic, handle) {
            previous.abort();
        }
        Ok(rx)
    }

    async fn unsubscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError> {
        // dropping the notify stream stops notifications in BlueZ
        if let Some(handle) = self.forwarders.remove(&characteristic) {
            handle.abort();
        }
        Ok(())
    }

    async fn disconnect(mut self) -> Result<(), TransportError> {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
        self.device.disconnect().await?;
        info!("Disconnected from {}", self.address);
        Ok(())
    }
}
