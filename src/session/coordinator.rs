//! Owns the three device sessions and routes transport results to them.

use log::{debug, error, info, warn};
use std::future::{poll_fn, Future};
use std::path::PathBuf;
use std::task::Poll;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::bluetooth::{
    close_link, open_link, DeviceDescriptor, NotificationReceiver, Transport,
};
use crate::error::{SessionError, TransportError};
use crate::models::{EventLabel, Slot, SLOT_COUNT};
use crate::session::{DeviceSession, SharedContext};

/// Radio work requested by the coordinator, run outside the event loop.
pub enum TransportOp<C> {
    Discover {
        slot: Slot,
        attempt: u64,
        timeout: Duration,
    },
    Connect {
        slot: Slot,
        attempt: u64,
        address: String,
    },
    Disconnect {
        slot: Slot,
        attempt: u64,
        connection: C,
    },
}

/// Result of a [`TransportOp`], tagged with the attempt that issued it.
pub enum TransportOutcome<C> {
    Discovered {
        slot: Slot,
        attempt: u64,
        result: Result<Vec<DeviceDescriptor>, TransportError>,
    },
    Connected {
        slot: Slot,
        attempt: u64,
        result: Result<(C, NotificationReceiver), TransportError>,
    },
    Disconnected {
        slot: Slot,
        attempt: u64,
        result: Result<(), TransportError>,
    },
}

/// Execute one transport operation to completion
///
/// # Arguments
/// * `transport` - Radio backend
/// * `op` - Operation issued by the coordinator
/// * `characteristic` - Telemetry characteristic to subscribe to
///
/// # Returns
/// The outcome to hand back to [`SessionCoordinator::apply`]
pub async fn run_transport_op<T: Transport>(
    transport: &T,
    op: TransportOp<T::Connection>,
    characteristic: Uuid,
) -> TransportOutcome<T::Connection> {
    match op {
        TransportOp::Discover {
            slot,
            attempt,
            timeout,
        } => TransportOutcome::Discovered {
            slot,
            attempt,
            result: transport.discover(timeout).await,
        },
        TransportOp::Connect {
            slot,
            attempt,
            address,
        } => TransportOutcome::Connected {
            slot,
            attempt,
            result: open_link(transport, &address, characteristic).await,
        },
        TransportOp::Disconnect {
            slot,
            attempt,
            connection,
        } => TransportOutcome::Disconnected {
            slot,
            attempt,
            result: close_link(connection, characteristic).await,
        },
    }
}

/// Per-slot result of a global event trigger.
#[derive(Debug, Default)]
pub struct EventSummary {
    pub logged: Vec<(Slot, EventLabel)>,
    /// Sessions without data since their last connect.
    pub skipped: Vec<Slot>,
    pub failed: Vec<(Slot, SessionError)>,
}

pub struct SessionCoordinator<C> {
    sessions: [DeviceSession<C>; SLOT_COUNT],
    preferred: [Option<String>; SLOT_COUNT],
    default_paths: [PathBuf; SLOT_COUNT],
    scan_timeout: Duration,
    // round-robin start so one chatty device cannot starve the others
    next_poll: usize,
}

impl<C> SessionCoordinator<C> {
    pub fn new(scan_timeout: Duration) -> Self {
        SessionCoordinator {
            sessions: Slot::ALL.map(DeviceSession::new),
            preferred: Default::default(),
            default_paths: Slot::ALL.map(default_log_path),
            scan_timeout,
            next_poll: 0,
        }
    }

    /// Address to connect to without asking when it shows up in a scan.
    pub fn set_preferred_address(&mut self, slot: Slot, address: Option<String>) {
        self.preferred[slot.index()] = address;
    }

    pub fn preferred_address(&self, slot: Slot) -> Option<&str> {
        self.preferred[slot.index()].as_deref()
    }

    pub fn set_default_path(&mut self, slot: Slot, path: PathBuf) {
        self.default_paths[slot.index()] = path;
    }

    pub fn session(&self, slot: Slot) -> &DeviceSession<C> {
        &self.sessions[slot.index()]
    }

    pub fn sessions(&self) -> impl Iterator<Item = &DeviceSession<C>> {
        self.sessions.iter()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut DeviceSession<C>> {
        self.sessions.iter_mut()
    }

    pub fn any_active(&self) -> bool {
        self.sessions.iter().any(DeviceSession::is_active)
    }

    /// Save the log filename for `slot`, falling back to its default.
    pub fn save_filename(&mut self, slot: Slot, path: Option<PathBuf>) -> Result<(), SessionError> {
        let path = path.unwrap_or_else(|| self.default_paths[slot.index()].clone());
        self.sessions[slot.index()].save_log_path(path)?;
        Ok(())
    }

    pub fn begin_scan(&mut self, slot: Slot) -> Result<TransportOp<C>, SessionError> {
        let attempt = self.sessions[slot.index()].begin_scan()?;
        info!("Scanning for devices for {}...", slot);
        Ok(TransportOp::Discover {
            slot,
            attempt,
            timeout: self.scan_timeout,
        })
    }

    /// Connect to candidate `number` (1-based, as listed).
    pub fn select_device(&mut self, slot: Slot, number: usize) -> Result<TransportOp<C>, SessionError> {
        let index = number
            .checked_sub(1)
            .ok_or(SessionError::UnknownCandidate(number))?;
        let session = &mut self.sessions[slot.index()];
        let address = session.select(index)?;
        info!("Connecting {} to {}", slot, address);
        Ok(TransportOp::Connect {
            slot,
            attempt: session.attempt(),
            address,
        })
    }

    pub fn cancel_scan(&mut self, slot: Slot) -> bool {
        let cancelled = self.sessions[slot.index()].cancel_scan();
        if cancelled {
            info!("Scan for {} cancelled", slot);
        }
        cancelled
    }

    /// Tear down `slot`. Returns the transport work still needed, if any.
    pub fn disconnect(&mut self, slot: Slot) -> Option<TransportOp<C>> {
        let session = &mut self.sessions[slot.index()];
        let attempt = session.attempt();
        let connection = session.begin_disconnect()?;
        info!("Disconnecting {}...", slot);
        Some(TransportOp::Disconnect {
            slot,
            attempt,
            connection,
        })
    }

    /// The notification queue of `slot` closed under an active session.
    pub fn link_lost(&mut self, slot: Slot) -> Option<TransportOp<C>> {
        warn!("Lost the link to {}", slot);
        self.disconnect(slot)
    }

    /// Feed a transport result back into its session
    ///
    /// Results from an attempt that was cancelled or superseded are
    /// ignored; a connection that nobody wants any more is returned for
    /// teardown.
    pub fn apply(
        &mut self,
        outcome: TransportOutcome<C>,
        ctx: &mut SharedContext,
        now: f64,
    ) -> Option<TransportOp<C>> {
        match outcome {
            TransportOutcome::Discovered {
                slot,
                attempt,
                result,
            } => self.on_discovered(slot, attempt, result),
            TransportOutcome::Connected {
                slot,
                attempt,
                result,
            } => self.on_connected(slot, attempt, result, ctx, now),
            TransportOutcome::Disconnected {
                slot,
                attempt,
                result,
            } => {
                self.on_disconnected(slot, attempt, result);
                None
            }
        }
    }

    fn on_discovered(
        &mut self,
        slot: Slot,
        attempt: u64,
        result: Result<Vec<DeviceDescriptor>, TransportError>,
    ) -> Option<TransportOp<C>> {
        let session = &mut self.sessions[slot.index()];
        if !session.is_current(attempt) {
            debug!("Ignoring stale scan result for {}", slot);
            return None;
        }

        if let Err(e) = session.discovery_finished(result) {
            error!("Scan for {} failed: {}", slot, e);
            return None;
        }

        if let Some(preferred) = self.preferred[slot.index()].as_deref() {
            if let Some(address) = session.select_address(preferred) {
                info!("Connecting {} to configured device {}", slot, address);
                return Some(TransportOp::Connect {
                    slot,
                    attempt,
                    address,
                });
            }
            warn!("Configured device {} for {} not found", preferred, slot);
        }

        info!(
            "Devices found for {} (select {} <number> to connect):",
            slot,
            slot.number()
        );
        for (i, device) in session.candidates().iter().enumerate() {
            info!("  [{}] {}", i + 1, device);
        }
        None
    }

    fn on_connected(
        &mut self,
        slot: Slot,
        attempt: u64,
        result: Result<(C, NotificationReceiver), TransportError>,
        ctx: &mut SharedContext,
        now: f64,
    ) -> Option<TransportOp<C>> {
        let session = &mut self.sessions[slot.index()];
        let wanted = session.awaiting_connection(attempt);

        match result {
            Err(e) if wanted => {
                let err = session.connect_failed(e);
                error!("Failed to connect {}: {}", slot, err);
                None
            }
            Err(e) => {
                debug!("Ignoring stale connect failure for {}: {}", slot, e);
                None
            }
            Ok((connection, _)) if !wanted => {
                warn!("Dropping connection for {} made after its scan ended", slot);
                Some(TransportOp::Disconnect {
                    slot,
                    attempt,
                    connection,
                })
            }
            Ok((connection, notifications)) => match session.attach(connection, notifications, now) {
                Ok(()) => {
                    info!("{} connected.", slot);
                    ctx.clock.start_once(now);
                    None
                }
                Err((e, connection)) => {
                    error!("Failed to connect {}: {}", slot, e);
                    Some(TransportOp::Disconnect {
                        slot,
                        attempt,
                        connection,
                    })
                }
            },
        }
    }

    fn on_disconnected(&mut self, slot: Slot, attempt: u64, result: Result<(), TransportError>) {
        if let Err(e) = result {
            warn!("Disconnect of {} reported an error: {}", slot, e);
        }
        let session = &mut self.sessions[slot.index()];
        if session.is_current(attempt) && session.finish_disconnect() {
            info!("{} disconnected.", slot);
        }
    }

    /// Apply one notification payload to `slot`.
    pub fn handle_notification(&mut self, slot: Slot, payload: &[u8], now: f64, wall: OffsetDateTime) {
        let session = &mut self.sessions[slot.index()];
        match session.handle_notification(payload, now, wall) {
            Ok(true) => info!("{} is streaming", slot),
            Ok(false) => {}
            Err(SessionError::MalformedPayload(e)) => warn!(
                "Malformed data received for {} ({} so far): {}",
                slot,
                session.malformed_count(),
                e
            ),
            Err(e) => error!("Failed to record data for {}: {}", slot, e),
        }
    }

    /// Wait for the next payload from any subscribed session
    ///
    /// Yields `None` for a slot whose queue closed, which means the link
    /// was lost.
    pub fn next_notification(&mut self) -> impl Future<Output = (Slot, Option<Vec<u8>>)> + '_ {
        poll_fn(move |cx| {
            for offset in 0..SLOT_COUNT {
                let index = (self.next_poll + offset) % SLOT_COUNT;
                if let Poll::Ready(payload) = self.sessions[index].poll_notification(cx) {
                    self.next_poll = (index + 1) % SLOT_COUNT;
                    return Poll::Ready((Slot::ALL[index], payload));
                }
            }
            Poll::Pending
        })
    }

    /// Log an event row for every session that has data.
    pub fn trigger_event_for_all(&mut self, wall: OffsetDateTime) -> EventSummary {
        let mut summary = EventSummary::default();
        for session in self.sessions.iter_mut() {
            let slot = session.slot();
            if !session.has_received_data() {
                debug!("No data for {}, event skipped", slot);
                summary.skipped.push(slot);
                continue;
            }
            match session.trigger_event(wall) {
                Ok(label) => {
                    info!("{} logged for {}", label, slot);
                    summary.logged.push((slot, label));
                }
                Err(e) => {
                    error!("Failed to log event for {}: {}", slot, e);
                    summary.failed.push((slot, e));
                }
            }
        }

        if summary.logged.is_empty() {
            warn!("Event not logged: no device has received data yet");
        }
        summary
    }

    /// Disconnect every session; returns the teardown work to run.
    pub fn shutdown(&mut self) -> Vec<TransportOp<C>> {
        Slot::ALL
            .iter()
            .filter_map(|&slot| self.disconnect(slot))
            .collect()
    }
}

/// `Device N_data_log.txt`
pub fn default_log_path(slot: Slot) -> PathBuf {
    PathBuf::from(format!("{}_data_log.txt", slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::mock::{MockConnection, MockTransport};
    use crate::bluetooth::TELEMETRY_CHARACTERISTIC;
    use crate::session::SessionState;
    use std::fs;
    use std::path::Path;
    use time::macros::datetime;

    const WALL: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);
    const A: &str = "AA:AA:AA:AA:AA:01";
    const B: &str = "BB:BB:BB:BB:BB:02";

    type Coordinator = SessionCoordinator<MockConnection>;

    fn slot(n: usize) -> Slot {
        Slot::from_number(n).unwrap()
    }

    async fn run(
        coordinator: &mut Coordinator,
        transport: &MockTransport,
        ctx: &mut SharedContext,
        op: TransportOp<MockConnection>,
        now: f64,
    ) -> Option<TransportOp<MockConnection>> {
        let outcome = run_transport_op(transport, op, TELEMETRY_CHARACTERISTIC).await;
        coordinator.apply(outcome, ctx, now)
    }

    /// Save a filename in `dir`, scan and connect to candidate `number`.
    async fn connect(
        coordinator: &mut Coordinator,
        transport: &MockTransport,
        ctx: &mut SharedContext,
        dir: &Path,
        n: usize,
        number: usize,
        now: f64,
    ) {
        coordinator
            .save_filename(slot(n), Some(dir.join(format!("device{n}.txt"))))
            .unwrap();
        let op = coordinator.begin_scan(slot(n)).unwrap();
        assert!(run(coordinator, transport, ctx, op, now).await.is_none());
        let op = coordinator.select_device(slot(n), number).unwrap();
        assert!(run(coordinator, transport, ctx, op, now).await.is_none());
    }

    async fn deliver(coordinator: &mut Coordinator, count: usize, now: f64) {
        for _ in 0..count {
            let (slot, payload) = coordinator.next_notification().await;
            let payload = payload.expect("link open");
            coordinator.handle_notification(slot, &payload, now, WALL);
        }
    }

    #[test]
    fn default_filenames_follow_the_slot_name() {
        assert_eq!(default_log_path(slot(2)), PathBuf::from("Device 2_data_log.txt"));
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        coordinator.save_filename(slot(3), None).unwrap();
        assert_eq!(
            coordinator.session(slot(3)).log_path(),
            Some(Path::new("Device 3_data_log.txt"))
        );
    }

    #[tokio::test]
    async fn connect_flow_starts_the_clock_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A), ("Sensor B", B)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();

        assert!(matches!(
            coordinator.begin_scan(slot(1)),
            Err(SessionError::FilenameNotSaved)
        ));

        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 1, 1, 5.0).await;
        assert_eq!(coordinator.session(slot(1)).state(), SessionState::Connected);
        assert!(coordinator.any_active());
        assert_eq!(ctx.clock.elapsed_secs(65.0), Some(60));

        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 2, 2, 40.0).await;
        assert_eq!(transport.connected(), vec![A.to_string(), B.to_string()]);
        assert_eq!(ctx.clock.elapsed_secs(65.0), Some(60));
    }

    #[tokio::test]
    async fn notifications_reach_their_own_session_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A), ("Sensor B", B)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();
        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 1, 1, 0.0).await;
        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 2, 2, 0.0).await;

        transport.notify(A, b"20,5,0,0,0");
        transport.notify(A, b"21,6,1,0,0");
        transport.notify(B, b"30,1,1,1,1");
        deliver(&mut coordinator, 3, 1.0).await;

        let first = coordinator.session(slot(1));
        assert_eq!(first.state(), SessionState::Streaming);
        assert_eq!(first.buffer().len(), 2);
        assert_eq!(first.latest().map(|r| r.temperature), Some(21));
        assert_eq!(coordinator.session(slot(2)).buffer().len(), 1);
    }

    #[tokio::test]
    async fn global_trigger_skips_sessions_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A), ("Sensor B", B)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();
        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 1, 1, 0.0).await;
        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 2, 2, 0.0).await;

        transport.notify(A, b"22,3,-1,0,2");
        deliver(&mut coordinator, 1, 1.0).await;

        let summary = coordinator.trigger_event_for_all(WALL);
        assert_eq!(summary.logged, vec![(slot(1), EventLabel::Event(1))]);
        assert_eq!(summary.skipped, vec![slot(2), slot(3)]);
        assert!(summary.failed.is_empty());
        assert_eq!(coordinator.session(slot(2)).event_sequence(), 1);

        for op in coordinator.shutdown() {
            run(&mut coordinator, &transport, &mut ctx, op, 2.0).await;
        }
        let a_log = fs::read_to_string(dir.path().join("device1.txt")).unwrap();
        assert!(a_log.lines().last().unwrap().ends_with(", 22, 3, -1, 0, 2, event 1"));
        let b_log = fs::read_to_string(dir.path().join("device2.txt")).unwrap();
        assert_eq!(b_log.lines().count(), 1);
        assert!(!coordinator.any_active());
    }

    #[tokio::test]
    async fn unwritable_log_tears_the_link_down() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();

        coordinator
            .save_filename(slot(1), Some(dir.path().join("no-such-dir").join("a.txt")))
            .unwrap();
        let op = coordinator.begin_scan(slot(1)).unwrap();
        run(&mut coordinator, &transport, &mut ctx, op, 0.0).await;
        let op = coordinator.select_device(slot(1), 1).unwrap();
        let teardown = run(&mut coordinator, &transport, &mut ctx, op, 0.0).await;

        assert!(matches!(teardown, Some(TransportOp::Disconnect { .. })));
        assert_eq!(coordinator.session(slot(1)).state(), SessionState::Idle);
        assert!(!ctx.clock.is_running());
        run(&mut coordinator, &transport, &mut ctx, teardown.unwrap(), 0.0).await;
        assert_eq!(transport.disconnected(), vec![A.to_string()]);
    }

    #[tokio::test]
    async fn connect_and_discovery_failures_return_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A)]);
        transport.fail_connect(A);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();

        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 1, 1, 0.0).await;
        assert_eq!(coordinator.session(slot(1)).state(), SessionState::Idle);
        assert!(coordinator.session(slot(1)).connect_enabled());

        transport.fail_discover();
        let op = coordinator.begin_scan(slot(1)).unwrap();
        run(&mut coordinator, &transport, &mut ctx, op, 0.0).await;
        assert_eq!(coordinator.session(slot(1)).state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn connection_finishing_after_cancel_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();

        coordinator
            .save_filename(slot(1), Some(dir.path().join("a.txt")))
            .unwrap();
        let op = coordinator.begin_scan(slot(1)).unwrap();
        run(&mut coordinator, &transport, &mut ctx, op, 0.0).await;
        let op = coordinator.select_device(slot(1), 1).unwrap();
        assert!(coordinator.cancel_scan(slot(1)));

        let teardown = run(&mut coordinator, &transport, &mut ctx, op, 0.0).await;
        assert!(matches!(teardown, Some(TransportOp::Disconnect { .. })));
        assert_eq!(coordinator.session(slot(1)).state(), SessionState::Idle);
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn preferred_address_connects_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A), ("Sensor B", B)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();
        coordinator.set_preferred_address(slot(3), Some(B.to_lowercase()));
        coordinator
            .save_filename(slot(3), Some(dir.path().join("c.txt")))
            .unwrap();

        let op = coordinator.begin_scan(slot(3)).unwrap();
        let connect = run(&mut coordinator, &transport, &mut ctx, op, 0.0).await;
        match &connect {
            Some(TransportOp::Connect { address, .. }) => assert_eq!(address, B),
            _ => panic!("expected an automatic connect"),
        }
        run(&mut coordinator, &transport, &mut ctx, connect.unwrap(), 0.0).await;
        assert!(coordinator.session(slot(3)).is_active());
    }

    #[tokio::test]
    async fn lost_link_disconnects_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::with_devices(&[("Sensor A", A)]);
        let mut coordinator = Coordinator::new(Duration::from_secs(1));
        let mut ctx = SharedContext::default();
        connect(&mut coordinator, &transport, &mut ctx, dir.path(), 1, 1, 0.0).await;

        transport.drop_link(A);
        let (lost, payload) = coordinator.next_notification().await;
        assert_eq!((lost, payload), (slot(1), None));

        let op = coordinator.link_lost(lost).expect("teardown");
        assert_eq!(
            coordinator.session(slot(1)).state(),
            SessionState::Disconnecting
        );
        run(&mut coordinator, &transport, &mut ctx, op, 1.0).await;
        assert_eq!(coordinator.session(slot(1)).state(), SessionState::Idle);
        assert!(ctx.clock.is_running());
    }
}
