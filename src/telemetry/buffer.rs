/// Append-only per-device time series
use std::ops::Range;

use crate::models::{Channel, Reading, Sample};

/// Index-aligned history of every sample received in a session
///
/// Six parallel sequences (time plus five channels) that always have the
/// same length. Nothing is evicted: the plots only view a trailing window
/// of it, and the full history lives until the next connect.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    time: Vec<f64>,
    temperature: Vec<i32>,
    audio: Vec<i32>,
    x: Vec<i32>,
    y: Vec<i32>,
    z: Vec<i32>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: &Sample) {
        self.time.push(sample.captured_at);
        self.temperature.push(sample.temperature);
        self.audio.push(sample.audio);
        self.x.push(sample.x);
        self.y.push(sample.y);
        self.z.push(sample.z);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn clear(&mut self) {
        self.time.clear();
        self.temperature.clear();
        self.audio.clear();
        self.x.clear();
        self.y.clear();
        self.z.clear();
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channel(&self, channel: Channel) -> &[i32] {
        match channel {
            Channel::Temperature => &self.temperature,
            Channel::Audio => &self.audio,
            Channel::X => &self.x,
            Channel::Y => &self.y,
            Channel::Z => &self.z,
        }
    }

    /// Whether every channel holds at least one value.
    pub fn channels_populated(&self) -> bool {
        Channel::ALL
            .iter()
            .all(|&channel| !self.channel(channel).is_empty())
    }

    /// Last value of every channel, if all of them have one.
    pub fn latest(&self) -> Option<Reading> {
        Some(Reading {
            temperature: *self.temperature.last()?,
            audio: *self.audio.last()?,
            x: *self.x.last()?,
            y: *self.y.last()?,
            z: *self.z.last()?,
        })
    }

    /// Maximal suffix of samples captured within `window_secs` of `now`
    ///
    /// Returns `[i, len)` where `i` is the first index whose time is at
    /// least `now - window_secs`. The time axis is monotonic, so this is a
    /// binary search.
    pub fn slice_since(&self, now: f64, window_secs: f64) -> Range<usize> {
        let cutoff = now - window_secs;
        let start = self.time.partition_point(|&t| t < cutoff);
        start..self.time.len()
    }
}
