//! Connection lifecycle of a single device section.
//!
//! A [`DeviceSession`] is a synchronous state machine. Everything that has
//! to wait on the radio (discovery, connect, disconnect) is issued by the
//! [`coordinator`] as a [`TransportOp`] and fed back as a
//! [`TransportOutcome`], so buffer and log updates never interleave with a
//! suspension point.

pub mod context;
pub mod coordinator;

use log::info;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};
use time::OffsetDateTime;

use crate::bluetooth::{DeviceDescriptor, NotificationReceiver};
use crate::error::{SessionError, TransportError};
use crate::models::{DeviceKind, EventLabel, Reading, Sample, Slot};
use crate::storage::EventLogger;
use crate::telemetry::{decode_payload, SampleBuffer, SamplingRateEstimator};

pub use context::{SharedContext, WindowLength};
pub use coordinator::{EventSummary, SessionCoordinator, TransportOp, TransportOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    /// Linked and subscribed, no payload decoded yet.
    Connected,
    Streaming,
    Disconnecting,
}

/// Progress inside [`SessionState::Scanning`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanPhase {
    Discovering,
    Choosing(Vec<DeviceDescriptor>),
    Connecting(String),
}

pub struct DeviceSession<C> {
    slot: Slot,
    state: SessionState,
    scan: Option<ScanPhase>,
    /// Bumped on every scan and every abandoned scan so late transport
    /// outcomes can be told apart from current ones.
    attempt: u64,
    connection: Option<C>,
    notifications: Option<NotificationReceiver>,
    log_path: Option<PathBuf>,
    buffer: SampleBuffer,
    logger: EventLogger,
    rate: SamplingRateEstimator,
    latest: Option<Reading>,
    has_received_data: bool,
    malformed: u64,
}

impl<C> DeviceSession<C> {
    pub fn new(slot: Slot) -> Self {
        DeviceSession {
            slot,
            state: SessionState::Idle,
            scan: None,
            attempt: 0,
            connection: None,
            notifications: None,
            log_path: None,
            buffer: SampleBuffer::new(),
            logger: EventLogger::new(),
            rate: SamplingRateEstimator::new(0.0),
            latest: None,
            has_received_data: false,
            malformed: 0,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn kind(&self) -> DeviceKind {
        self.slot.kind()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Last decoded values, kept for display after a disconnect.
    pub fn latest(&self) -> Option<Reading> {
        self.latest
    }

    pub fn has_received_data(&self) -> bool {
        self.has_received_data
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn candidates(&self) -> &[DeviceDescriptor] {
        match &self.scan {
            Some(ScanPhase::Choosing(devices)) => devices,
            _ => &[],
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_current(&self, attempt: u64) -> bool {
        self.attempt == attempt
    }

    /// Number the next triggered event will carry.
    pub fn event_sequence(&self) -> u32 {
        self.logger.next_event()
    }

    pub fn malformed_count(&self) -> u64 {
        self.malformed
    }

    /// Connected or streaming: notifications are being consumed.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Connected | SessionState::Streaming)
    }

    pub fn connect_enabled(&self) -> bool {
        self.log_path.is_some() && self.state == SessionState::Idle
    }

    pub fn disconnect_enabled(&self) -> bool {
        self.has_received_data
    }

    /// Whether a connect for `attempt` is still wanted.
    pub fn awaiting_connection(&self, attempt: u64) -> bool {
        self.is_current(attempt) && matches!(self.scan, Some(ScanPhase::Connecting(_)))
    }

    /// Lock in the log filename. It cannot be changed afterwards.
    pub fn save_log_path(&mut self, path: PathBuf) -> Result<&Path, SessionError> {
        if self.log_path.is_some() {
            return Err(SessionError::FilenameLocked);
        }
        if path.as_os_str().is_empty() {
            return Err(SessionError::EmptyFilename);
        }
        info!("Filename '{}' saved for {}.", path.display(), self.slot);
        Ok(self.log_path.insert(path).as_path())
    }

    /// Idle → Scanning. Returns the attempt number of this scan.
    pub fn begin_scan(&mut self) -> Result<u64, SessionError> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("scan"));
        }
        if self.log_path.is_none() {
            return Err(SessionError::FilenameNotSaved);
        }
        self.attempt += 1;
        self.state = SessionState::Scanning;
        self.scan = Some(ScanPhase::Discovering);
        Ok(self.attempt)
    }

    /// Store discovery results as candidates. Failure or an empty result
    /// returns to Idle. Returns the number of candidates.
    pub fn discovery_finished(
        &mut self,
        result: Result<Vec<DeviceDescriptor>, TransportError>,
    ) -> Result<usize, SessionError> {
        if self.scan != Some(ScanPhase::Discovering) {
            return Err(self.invalid("present candidates"));
        }
        match result {
            Err(e) => {
                self.reset_to_idle();
                Err(e.into())
            }
            Ok(devices) if devices.is_empty() => {
                self.reset_to_idle();
                Err(SessionError::NoDevicesFound)
            }
            Ok(devices) => {
                let count = devices.len();
                self.scan = Some(ScanPhase::Choosing(devices));
                Ok(count)
            }
        }
    }

    /// Pick the candidate at `index` (0-based); returns its address.
    pub fn select(&mut self, index: usize) -> Result<String, SessionError> {
        let address = match &self.scan {
            Some(ScanPhase::Choosing(devices)) => devices
                .get(index)
                .map(|device| device.address.clone())
                .ok_or(SessionError::UnknownCandidate(index + 1))?,
            _ => return Err(self.invalid("select a device")),
        };
        self.scan = Some(ScanPhase::Connecting(address.clone()));
        Ok(address)
    }

    /// Pick the candidate with `address`, if it was discovered.
    pub fn select_address(&mut self, address: &str) -> Option<String> {
        let index = self
            .candidates()
            .iter()
            .position(|device| device.address.eq_ignore_ascii_case(address))?;
        self.select(index).ok()
    }

    /// Abandon a scan in progress. Returns whether anything was cancelled.
    pub fn cancel_scan(&mut self) -> bool {
        if self.state != SessionState::Scanning {
            return false;
        }
        self.attempt += 1;
        self.reset_to_idle();
        true
    }

    /// The transport could not connect or subscribe.
    pub fn connect_failed(&mut self, error: TransportError) -> SessionError {
        self.reset_to_idle();
        error.into()
    }

    /// Take over a subscribed connection and open the log
    ///
    /// Clears the buffer and restarts rate estimation. If the log cannot be
    /// opened the session returns to Idle and hands the connection back so
    /// it can be torn down.
    pub fn attach(
        &mut self,
        connection: C,
        notifications: NotificationReceiver,
        now: f64,
    ) -> Result<(), (SessionError, C)> {
        if !matches!(self.scan, Some(ScanPhase::Connecting(_))) {
            return Err((self.invalid("attach a connection"), connection));
        }

        let opened = match self.log_path.as_deref() {
            Some(path) => self.logger.open(path),
            None => Err(SessionError::FilenameNotSaved),
        };
        if let Err(e) = opened {
            self.reset_to_idle();
            return Err((e, connection));
        }

        self.buffer.clear();
        self.rate.reset(now);
        self.latest = None;
        self.has_received_data = false;
        self.connection = Some(connection);
        self.notifications = Some(notifications);
        self.scan = None;
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Decode one payload and record it
    ///
    /// A malformed payload changes nothing but the malformed counter.
    /// Returns `true` for the first sample since connecting.
    pub fn handle_notification(
        &mut self,
        payload: &[u8],
        now: f64,
        wall: OffsetDateTime,
    ) -> Result<bool, SessionError> {
        if !self.is_active() {
            return Err(self.invalid("handle a notification"));
        }

        let reading = match decode_payload(payload) {
            Ok(reading) => reading,
            Err(e) => {
                self.malformed += 1;
                return Err(e.into());
            }
        };

        let sample = Sample::new(now, reading);
        self.buffer.append(&sample);
        self.rate.record();
        self.latest = Some(reading);

        let first = !self.has_received_data;
        if first {
            self.has_received_data = true;
            self.state = SessionState::Streaming;
        }

        self.logger.log_sample(&sample, wall)?;
        Ok(first)
    }

    /// Log an event snapshot of the latest values.
    pub fn trigger_event(&mut self, wall: OffsetDateTime) -> Result<EventLabel, SessionError> {
        if !self.is_active() {
            return Err(SessionError::InsufficientData);
        }
        self.logger.log_event(&self.buffer, wall)
    }

    /// Start tearing the session down
    ///
    /// Drops the inbound queue (pending notifications are discarded whole),
    /// closes the log and returns the connection for the transport to close.
    /// A scan in progress is simply abandoned. No-op when Idle.
    pub fn begin_disconnect(&mut self) -> Option<C> {
        match self.state {
            SessionState::Idle | SessionState::Disconnecting => None,
            SessionState::Scanning => {
                self.cancel_scan();
                None
            }
            SessionState::Connected | SessionState::Streaming => {
                self.notifications = None;
                self.logger.close();
                self.has_received_data = false;
                match self.connection.take() {
                    Some(connection) => {
                        self.state = SessionState::Disconnecting;
                        Some(connection)
                    }
                    None => {
                        self.state = SessionState::Idle;
                        None
                    }
                }
            }
        }
    }

    /// Disconnecting → Idle. Returns whether the state changed.
    pub fn finish_disconnect(&mut self) -> bool {
        if self.state != SessionState::Disconnecting {
            return false;
        }
        self.state = SessionState::Idle;
        true
    }

    /// Tick the rate estimator and return the display string.
    pub fn refresh_rate(&mut self, now: f64) -> String {
        self.rate.tick(now);
        self.rate.display()
    }

    /// Poll the inbound queue; pending forever while unsubscribed.
    pub(crate) fn poll_notification(&mut self, cx: &mut Context<'_>) -> Poll<Option<Vec<u8>>> {
        match self.notifications.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Pending,
        }
    }

    fn reset_to_idle(&mut self) {
        self.scan = None;
        self.state = SessionState::Idle;
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            state: self.state,
        }
    }
}
