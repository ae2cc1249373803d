use crate::models::Slot;
use crate::render::{RenderSurface, WidgetId};
use crate::session::{DeviceSession, SessionCoordinator, SharedContext, WindowLength};

pub fn sampling_rate_title(slot: Slot, rate: &str) -> String {
    format!("Sampling Rate {}: {}", slot.number(), rate)
}

pub fn window_length_title(window: WindowLength) -> String {
    format!("Window Length: {} s", window.secs())
}

/// Pushes the trailing window of every active session to a surface.
#[derive(Debug, Default)]
pub struct WindowRenderer {
    shown_window: Option<WindowLength>,
}

impl WindowRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push the initial titles of every widget.
    pub fn initialize<C>(
        &mut self,
        coordinator: &SessionCoordinator<C>,
        ctx: &SharedContext,
        now: f64,
        surface: &mut impl RenderSurface,
    ) {
        for session in coordinator.sessions() {
            let slot = session.slot();
            let kind = session.kind();
            for &channel in kind.channel_plots() {
                surface.set_title(WidgetId::Channel(slot, channel), &channel.title(None));
            }
            if let Some(aux) = kind.auxiliary_plot() {
                surface.set_title(WidgetId::Auxiliary(slot, aux), aux.title());
            }
            surface.set_title(WidgetId::SamplingRate(slot), &sampling_rate_title(slot, "-- Hz"));
        }
        self.render_clock(ctx, now, surface);
        self.shown_window = None;
        self.render_window_length(ctx, surface);
    }

    /// One render tick over every connected or streaming session.
    pub fn render<C>(
        &mut self,
        coordinator: &mut SessionCoordinator<C>,
        ctx: &SharedContext,
        now: f64,
        surface: &mut impl RenderSurface,
    ) {
        for session in coordinator.sessions_mut().filter(|s| s.is_active()) {
            render_session(session, ctx.window, now, surface);
        }
    }

    pub fn render_clock(&self, ctx: &SharedContext, now: f64, surface: &mut impl RenderSurface) {
        surface.set_title(WidgetId::ElapsedTime, &ctx.clock.label(now));
    }

    /// Push the window length display if it changed since last shown.
    pub fn render_window_length(&mut self, ctx: &SharedContext, surface: &mut impl RenderSurface) {
        if self.shown_window == Some(ctx.window) {
            return;
        }
        surface.set_title(WidgetId::WindowLength, &window_length_title(ctx.window));
        self.shown_window = Some(ctx.window);
    }
}

fn render_session<C>(
    session: &mut DeviceSession<C>,
    window: WindowLength,
    now: f64,
    surface: &mut impl RenderSurface,
) {
    let slot = session.slot();
    let kind = session.kind();
    let latest = session.latest();

    {
        let buffer = session.buffer();
        let range = buffer.slice_since(now, window.as_f64());
        let time = &buffer.time()[range.clone()];

        for &channel in kind.channel_plots() {
            let id = WidgetId::Channel(slot, channel);
            surface.set_series(id, time, &buffer.channel(channel)[range.clone()]);
            surface.set_title(id, &channel.title(latest.map(|r| r.value(channel))));
        }

        if let Some(aux) = kind.auxiliary_plot() {
            let id = WidgetId::Auxiliary(slot, aux);
            match aux.source() {
                Some(channel) => surface.set_series(id, time, &buffer.channel(channel)[range.clone()]),
                None => surface.set_series(id, &[], &[]),
            }
        }
    }

    let rate = session.refresh_rate(now);
    surface.set_title(WidgetId::SamplingRate(slot), &sampling_rate_title(slot, &rate));
}
