//! Process-wide state shared by every device section.

use log::info;

use crate::utils::{duration_to_seconds, format_elapsed};

pub const MIN_WINDOW_SECS: u32 = 10;
pub const MAX_WINDOW_SECS: u32 = 60;
pub const DEFAULT_WINDOW_SECS: u32 = 30;

/// Length of the trailing window every plot shows, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLength(u32);

impl Default for WindowLength {
    fn default() -> Self {
        WindowLength(DEFAULT_WINDOW_SECS)
    }
}

impl WindowLength {
    /// Clamp into the 10..=60 s range of the control.
    pub fn new(secs: u32) -> Self {
        WindowLength(secs.clamp(MIN_WINDOW_SECS, MAX_WINDOW_SECS))
    }

    pub fn secs(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

/// Time since the first device connected
///
/// Starts once, on the first successful connect of any session, and then
/// keeps running for the life of the process even if every device
/// disconnects.
#[derive(Debug, Clone, Default)]
pub struct ElapsedClock {
    started_at: Option<f64>,
}

impl ElapsedClock {
    /// Start the clock at `now` unless it already runs. Returns whether
    /// this call started it.
    pub fn start_once(&mut self, now: f64) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        info!("Elapsed time clock started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn elapsed_secs(&self, now: f64) -> Option<u64> {
        self.started_at
            .map(|start| duration_to_seconds(now - start))
    }

    pub fn label(&self, now: f64) -> String {
        format!(
            "Elapsed Time: {}",
            format_elapsed(self.elapsed_secs(now).unwrap_or(0))
        )
    }
}

/// Shared configuration passed by reference to the coordinator and the
/// renderer.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    pub window: WindowLength,
    pub clock: ElapsedClock,
}

impl SharedContext {
    pub fn new(window: WindowLength) -> Self {
        SharedContext {
            window,
            clock: ElapsedClock::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_clamped_to_control_range() {
        assert_eq!(WindowLength::new(5).secs(), 10);
        assert_eq!(WindowLength::new(45).secs(), 45);
        assert_eq!(WindowLength::new(600).secs(), 60);
        assert_eq!(WindowLength::default().secs(), 30);
    }

    #[test]
    fn clock_starts_only_once() {
        let mut clock = ElapsedClock::default();
        assert_eq!(clock.label(100.0), "Elapsed Time: 00:00");
        assert!(clock.start_once(10.0));
        assert!(!clock.start_once(50.0));
        assert_eq!(clock.elapsed_secs(85.5), Some(75));
        assert_eq!(clock.label(85.5), "Elapsed Time: 01:15");
    }
}
