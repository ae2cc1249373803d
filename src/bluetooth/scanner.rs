/// Bluetooth Low Energy adapter setup and device discovery
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::time::{sleep, Duration};

use crate::bluetooth::{DeviceDescriptor, SERVICE_UUID};
use crate::error::TransportError;

/// Open a BlueZ session and power on the default adapter
///
/// The session is returned alongside the adapter so the caller can keep
/// the D-Bus connection alive for as long as the adapter is used.
///
/// # Returns
/// Result containing the session and its powered default adapter
pub async fn open_adapter() -> Result<(bluer::Session, bluer::Adapter), TransportError> {
    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    // Ensure Bluetooth adapter is powered on
    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    info!("Using Bluetooth adapter {}", adapter.name());
    Ok((session, adapter))
}

/// Scan for nearby Low Energy devices
///
/// Runs discovery for `timeout` and returns every device the adapter knows
/// about afterwards. Devices advertising the telemetry service are listed
/// first; the rest keep address order.
///
/// # Arguments
/// * `adapter` - Powered adapter from [`open_adapter`]
/// * `timeout` - How long to actively scan
///
/// # Returns
/// Result containing the discovered devices, or error if the scan fails
pub async fn discover_devices(
    adapter: &bluer::Adapter,
    timeout: Duration,
) -> Result<Vec<DeviceDescriptor>, TransportError> {
    // Configure discovery filter for Low Energy devices only
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: false,
        ..Default::default()
    };

    // Apply the discovery filter (warn if it fails, but continue)
    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    // Start device discovery in background
    let discovery_handle = {
        match adapter.discover_devices().await {
            Ok(discovery_stream) => tokio::spawn(async move {
                let mut stream = discovery_stream;
                while let Some(event) = stream.next().await {
                    debug!("Discovery event: {:?}", event);
                }
            }),
            Err(e) => {
                error!("Failed to start device discovery: {}", e);
                return Err(e.into());
            }
        }
    };

    // Let discovery run for the requested duration
    sleep(timeout).await;

    // Stop discovery
    discovery_handle.abort();

    // Get all discovered device addresses
    let addresses = match adapter.device_addresses().await {
        Ok(addresses) => addresses,
        Err(e) => {
            error!("Failed to get device addresses: {}", e);
            return Err(e.into());
        }
    };

    let mut advertised = Vec::new();
    let mut others = Vec::new();
    for addr in addresses {
        let device = match adapter.device(addr) {
            Ok(device) => device,
            Err(_) => continue,
        };

        let name = device.name().await.ok().flatten();
        let offers_telemetry = matches!(
            device.uuids().await,
            Ok(Some(uuids)) if uuids.contains(&SERVICE_UUID)
        );

        let descriptor = DeviceDescriptor {
            name,
            address: addr.to_string(),
        };
        debug!("Discovered {} (telemetry service: {})", descriptor, offers_telemetry);

        if offers_telemetry {
            advertised.push(descriptor);
        } else {
            others.push(descriptor);
        }
    }

    advertised.sort_by(|a, b| a.address.cmp(&b.address));
    others.sort_by(|a, b| a.address.cmp(&b.address));
    advertised.extend(others);
    info!("Discovery finished: {} device(s) found", advertised.len());
    Ok(advertised)
}
