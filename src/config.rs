use log::{debug, info, warn};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::TELEMETRY_CHARACTERISTIC;
use crate::error::ConfigError;
use crate::models::{Slot, SLOT_COUNT};
use crate::session::coordinator::default_log_path;
use crate::session::WindowLength;

const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 5;
const DEFAULT_RENDER_INTERVAL_MS: u64 = 20;
const DEFAULT_STATUS_INTERVAL_MS: u64 = 1000;

/// Per-slot settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device to connect to without asking when a scan finds it.
    pub address: Option<String>,
    /// Log filename offered when `save <n>` is given no name.
    pub log_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub devices: [DeviceConfig; SLOT_COUNT],
    pub window: WindowLength,
    pub scan_timeout: Duration,
    pub render_interval: Duration,
    pub status_interval: Duration,
    pub characteristic: Uuid,
    /// Save default filenames and scan at startup for slots with an address.
    pub autoconnect: bool,
}

impl AppConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        let config = Self::from_lookup(|key| env::var(key).ok())?;

        for (slot, device) in Slot::ALL.iter().zip(&config.devices) {
            match &device.address {
                Some(address) => info!("{}: {} -> '{}'", slot, address, device.log_path.display()),
                None => debug!("{}: no device configured", slot),
            }
        }
        Ok(config)
    }

    /// Build the configuration from any key lookup (the process environment
    /// in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut addresses: [Option<String>; SLOT_COUNT] = Default::default();

        // Try SENSOR_DEVICES format first
        if let Some(devices) = lookup("SENSOR_DEVICES") {
            debug!("Found SENSOR_DEVICES: '{}'", devices);
            for pair in devices.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((number, address)) => {
                        let slot = number
                            .trim()
                            .parse()
                            .ok()
                            .and_then(Slot::from_number)
                            .ok_or_else(|| ConfigError::InvalidSlot(number.trim().to_string()))?;
                        let address = address.trim();
                        if !address.is_empty() {
                            addresses[slot.index()] = Some(address.to_string());
                        }
                    }
                    None => warn!("Ignoring malformed SENSOR_DEVICES entry '{}'", pair),
                }
            }
        } else {
            // Fallback to individual environment variables
            for slot in Slot::ALL {
                let key = format!("SENSOR_DEVICE_{}_ADDRESS", slot.number());
                addresses[slot.index()] = lookup(&key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty());
            }
        }

        let devices = Slot::ALL.map(|slot| DeviceConfig {
            address: addresses[slot.index()].take(),
            log_path: lookup(&format!("SENSOR_DEVICE_{}_LOG", slot.number()))
                .filter(|name| !name.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| default_log_path(slot)),
        });

        let window_secs: u32 = number(&lookup, "SENSOR_WINDOW_SECS", WindowLength::default().secs())?;
        let window = WindowLength::new(window_secs);
        if window.secs() != window_secs {
            warn!(
                "SENSOR_WINDOW_SECS={} is outside 10-60, using {}",
                window_secs,
                window.secs()
            );
        }

        let characteristic = match lookup("SENSOR_CHARACTERISTIC_UUID") {
            Some(value) => Uuid::parse_str(value.trim()).map_err(|_| ConfigError::InvalidUuid {
                key: "SENSOR_CHARACTERISTIC_UUID".into(),
                value,
            })?,
            None => TELEMETRY_CHARACTERISTIC,
        };

        Ok(AppConfig {
            devices,
            window,
            scan_timeout: Duration::from_secs(number(
                &lookup,
                "SENSOR_SCAN_TIMEOUT_SECS",
                DEFAULT_SCAN_TIMEOUT_SECS,
            )?),
            render_interval: Duration::from_millis(
                number(&lookup, "SENSOR_RENDER_INTERVAL_MS", DEFAULT_RENDER_INTERVAL_MS)?.max(1),
            ),
            status_interval: Duration::from_millis(
                number(&lookup, "SENSOR_STATUS_INTERVAL_MS", DEFAULT_STATUS_INTERVAL_MS)?.max(1),
            ),
            characteristic,
            autoconnect: flag(&lookup, "SENSOR_AUTOCONNECT")?,
        })
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key: key.to_string(),
            value,
        }),
    }
}
