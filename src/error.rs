//! Error types for each layer of the application.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionState;

/// Failures reported by a BLE transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("Invalid device address: {0:?}")]
    InvalidAddress(String),

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("Transport rejected request: {0}")]
    Rejected(String),
}

/// Why a notification payload could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("field {index} is not an integer: {token:?}")]
    InvalidField { index: usize, token: String },
}

/// Conditions surfaced at the session boundary. None of them are fatal.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    Connection(#[from] TransportError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] PayloadError),

    #[error("Insufficient data to log event")]
    InsufficientData,

    #[error("Cannot open log file {}: {source}", path.display())]
    SinkOpen { path: PathBuf, source: io::Error },

    #[error("Failed to write log row: {0}")]
    LogWrite(#[from] io::Error),

    #[error("Log filename must be saved before connecting")]
    FilenameNotSaved,

    #[error("Log filename is already saved")]
    FilenameLocked,

    #[error("Log filename is empty")]
    EmptyFilename,

    #[error("No devices found")]
    NoDevicesFound,

    #[error("No discovered device numbered {0}")]
    UnknownCandidate(usize),

    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
}

/// Invalid environment configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key} must be true or false, got {value:?}")]
    InvalidFlag { key: String, value: String },

    #[error("{key} is not a valid UUID: {value:?}")]
    InvalidUuid { key: String, value: String },

    #[error("Unknown device slot {0:?} in SENSOR_DEVICES")]
    InvalidSlot(String),
}

/// A line typed on the command interface that could not be understood.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?} (type 'help')")]
    Unknown(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("device must be 1, 2 or 3, got {0:?}")]
    InvalidSlot(String),

    #[error("expected a number, got {0:?}")]
    InvalidNumber(String),
}
