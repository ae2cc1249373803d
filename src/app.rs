//! The single-threaded event loop tying sessions, transport and rendering
//! together.

use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use uuid::Uuid;

use crate::bluetooth::Transport;
use crate::command::{Command, HELP};
use crate::config::AppConfig;
use crate::models::Slot;
use crate::render::{RenderSurface, WindowRenderer};
use crate::session::coordinator::run_transport_op;
use crate::session::{SessionCoordinator, SharedContext, TransportOp, TransportOutcome, WindowLength};
use crate::utils::{Timebase, WallClock};

const CLOCK_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct App<T: Transport> {
    transport: T,
    characteristic: Uuid,
    coordinator: SessionCoordinator<T::Connection>,
    ctx: SharedContext,
    renderer: WindowRenderer,
    timebase: Timebase,
    wall: WallClock,
    outcome_tx: mpsc::UnboundedSender<TransportOutcome<T::Connection>>,
    outcome_rx: mpsc::UnboundedReceiver<TransportOutcome<T::Connection>>,
    /// Transport operations spawned and not yet reported back.
    pending: usize,
    render_interval: Duration,
    status_interval: Duration,
}

impl<T: Transport> App<T> {
    pub fn new(transport: T, config: &AppConfig, wall: WallClock) -> Self {
        let mut coordinator = SessionCoordinator::new(config.scan_timeout);
        for (slot, device) in Slot::ALL.into_iter().zip(&config.devices) {
            coordinator.set_preferred_address(slot, device.address.clone());
            coordinator.set_default_path(slot, device.log_path.clone());
        }

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        App {
            transport,
            characteristic: config.characteristic,
            coordinator,
            ctx: SharedContext::new(config.window),
            renderer: WindowRenderer::new(),
            timebase: Timebase::start(),
            wall,
            outcome_tx,
            outcome_rx,
            pending: 0,
            render_interval: config.render_interval,
            status_interval: config.status_interval,
        }
    }

    pub fn coordinator(&self) -> &SessionCoordinator<T::Connection> {
        &self.coordinator
    }

    /// Save default filenames and start scanning for every slot that has a
    /// configured device.
    pub fn autoconnect(&mut self) {
        for slot in Slot::ALL {
            if self.coordinator.preferred_address(slot).is_none() {
                continue;
            }
            if let Err(e) = self.coordinator.save_filename(slot, None) {
                error!("Cannot autoconnect {}: {}", slot, e);
                continue;
            }
            match self.coordinator.begin_scan(slot) {
                Ok(op) => self.perform(op),
                Err(e) => error!("Cannot autoconnect {}: {}", slot, e),
            }
        }
    }

    /// Run transport work on the local set; its outcome comes back through
    /// the outcome channel.
    fn perform(&mut self, op: TransportOp<T::Connection>) {
        let transport = self.transport.clone();
        let outcome_tx = self.outcome_tx.clone();
        let characteristic = self.characteristic;
        self.pending += 1;

        tokio::task::spawn_local(async move {
            let outcome = run_transport_op(&transport, op, characteristic).await;
            if outcome_tx.send(outcome).is_err() {
                debug!("Transport outcome dropped, event loop has exited");
            }
        });
    }

    fn apply(&mut self, outcome: TransportOutcome<T::Connection>) {
        self.pending = self.pending.saturating_sub(1);
        let now = self.timebase.now();
        if let Some(op) = self.coordinator.apply(outcome, &mut self.ctx, now) {
            self.perform(op);
        }
    }

    fn on_notification(&mut self, slot: Slot, payload: Option<Vec<u8>>) {
        match payload {
            Some(bytes) => {
                let now = self.timebase.now();
                self.coordinator
                    .handle_notification(slot, &bytes, now, self.wall.now());
            }
            None => {
                if let Some(op) = self.coordinator.link_lost(slot) {
                    self.perform(op);
                }
            }
        }
    }

    /// Process transport outcomes until nothing is in flight.
    async fn drain_outcomes(&mut self) {
        while self.pending > 0 {
            match self.outcome_rx.recv().await {
                Some(outcome) => self.apply(outcome),
                None => break,
            }
        }
    }

    pub fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        if line.is_empty() {
            return ControlFlow::Continue(());
        }
        match line.parse::<Command>() {
            Ok(command) => self.execute(command),
            Err(e) => {
                warn!("{}", e);
                ControlFlow::Continue(())
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Save { slot, filename } => {
                if let Err(e) = self.coordinator.save_filename(slot, filename) {
                    error!("{}: {}", slot, e);
                }
            }
            Command::Connect(slot) => match self.coordinator.begin_scan(slot) {
                Ok(op) => self.perform(op),
                Err(e) => error!("Cannot connect {}: {}", slot, e),
            },
            Command::Select { slot, candidate } => {
                match self.coordinator.select_device(slot, candidate) {
                    Ok(op) => self.perform(op),
                    Err(e) => error!("Cannot connect {}: {}", slot, e),
                }
            }
            Command::Cancel(slot) => {
                if !self.coordinator.cancel_scan(slot) {
                    warn!("{} is not scanning", slot);
                }
            }
            Command::Disconnect(slot) => match self.coordinator.disconnect(slot) {
                Some(op) => self.perform(op),
                None => debug!("{} has nothing to disconnect", slot),
            },
            Command::Event => {
                let summary = self.coordinator.trigger_event_for_all(self.wall.now());
                debug!("Event summary: {:?}", summary);
            }
            Command::Window(secs) => {
                self.ctx.window = WindowLength::new(secs);
                info!("Window length set to {} s", self.ctx.window.secs());
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {
                info!("Quit requested.");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Run until `quit` or the shutdown signal, then disconnect everything
    ///
    /// # Arguments
    /// * `lines` - Command lines, typically from the stdin reader thread
    /// * `shutdown` - Fires on Ctrl+C
    /// * `surface` - Where plots and labels are pushed
    pub async fn run<S: RenderSurface>(
        mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
        mut shutdown: oneshot::Receiver<()>,
        surface: &mut S,
    ) {
        info!("Starting telemetry streaming. Type 'help' for commands.");
        self.renderer
            .initialize(&self.coordinator, &self.ctx, self.timebase.now(), surface);
        surface.present();

        let mut render_tick = interval(self.render_interval);
        render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock_tick = interval(CLOCK_INTERVAL);
        clock_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut status_tick = interval(self.status_interval);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut lines_open = true;

        loop {
            tokio::select! {
                (slot, payload) = self.coordinator.next_notification() => {
                    self.on_notification(slot, payload);
                }
                Some(outcome) = self.outcome_rx.recv() => {
                    self.apply(outcome);
                }
                line = lines.recv(), if lines_open => match line {
                    Some(line) => {
                        if self.handle_line(&line).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("Command input closed");
                        lines_open = false;
                    }
                },
                _ = render_tick.tick() => {
                    let now = self.timebase.now();
                    if self.coordinator.any_active() {
                        self.renderer.render(&mut self.coordinator, &self.ctx, now, surface);
                    }
                    self.renderer.render_window_length(&self.ctx, surface);
                }
                _ = clock_tick.tick() => {
                    self.renderer.render_clock(&self.ctx, self.timebase.now(), surface);
                }
                _ = status_tick.tick() => {
                    surface.present();
                }
                _ = &mut shutdown => {
                    info!("Program terminated by user. Exiting gracefully.");
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Disconnect every session and wait (bounded) for the transport.
    pub async fn shutdown(&mut self) {
        for op in self.coordinator.shutdown() {
            self.perform(op);
        }
        if timeout(SHUTDOWN_GRACE, self.drain_outcomes()).await.is_err() {
            warn!("Transport still busy after {:?}, exiting anyway", SHUTDOWN_GRACE);
        }
        info!("All devices disconnected");
    }
}
