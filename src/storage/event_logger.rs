/// Sample and event rows for one device log
use log::error;
use std::io;
use std::path::Path;
use time::OffsetDateTime;

use crate::error::SessionError;
use crate::models::{EventLabel, EventRecord, Reading, Sample};
use crate::storage::sink::LogSink;
use crate::telemetry::SampleBuffer;
use crate::utils::format_log_timestamp;

/// Render a record as a log row (without newline)
///
/// `2024-01-01 12:00:00.000000, 22, 3, -1, 0, 2, false`
pub fn format_row(record: &EventRecord) -> String {
    let r = &record.reading;
    format!(
        "{}, {}, {}, {}, {}, {}, {}",
        format_log_timestamp(&record.timestamp),
        r.temperature,
        r.audio,
        r.x,
        r.y,
        r.z,
        record.label
    )
}

/// Writes the rows of one device's log
///
/// The event counter belongs to the logger rather than to a file, so it
/// keeps counting across reconnects of the same session.
pub struct EventLogger {
    sink: Option<LogSink>,
    next_event: u32,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger {
    pub fn new() -> Self {
        EventLogger {
            sink: None,
            next_event: 1,
        }
    }

    /// Open a fresh sink at `path`, closing any previous one.
    pub fn open(&mut self, path: &Path) -> Result<(), SessionError> {
        self.close();
        self.sink = Some(LogSink::create(path)?);
        Ok(())
    }

    /// Flush and drop the sink, if any.
    pub fn close(&mut self) {
        if let Some(sink) = self.sink.take() {
            let path = sink.path().display().to_string();
            if let Err(e) = sink.close() {
                error!("Failed to flush log file {}: {}", path, e);
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Number the next triggered event will carry.
    pub fn next_event(&self) -> u32 {
        self.next_event
    }

    /// Append a routine row for a streamed sample.
    pub fn log_sample(&mut self, sample: &Sample, at: OffsetDateTime) -> io::Result<()> {
        self.write(&EventRecord {
            timestamp: at,
            reading: sample.reading(),
            label: EventLabel::Streamed,
        })
    }

    /// Append an event row holding the latest value of every channel
    ///
    /// Fails with [`SessionError::InsufficientData`] when any channel is
    /// still empty; nothing is written and the counter does not move.
    pub fn log_event(
        &mut self,
        buffer: &SampleBuffer,
        at: OffsetDateTime,
    ) -> Result<EventLabel, SessionError> {
        let reading: Reading = buffer.latest().ok_or(SessionError::InsufficientData)?;
        let label = EventLabel::Event(self.next_event);

        self.write(&EventRecord {
            timestamp: at,
            reading,
            label,
        })?;

        self.next_event += 1;
        Ok(label)
    }

    fn write(&mut self, record: &EventRecord) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.append_line(&format_row(record)),
            None => Ok(()),
        }
    }
}
