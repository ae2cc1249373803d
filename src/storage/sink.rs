/// Line-oriented append-only log file
use log::{debug, error};
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SessionError;

/// Fixed first line of every device log.
pub const LOG_HEADER: &str = "Timestamp, Temperature, Audio, X, Y, Z, Event";

/// An open device log
///
/// Created at connect time, truncating any earlier file of the same name,
/// and flushed line by line so a crash loses at most the row being written.
pub struct LogSink {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl LogSink {
    /// Create (or truncate) the log file and write the header row.
    pub fn create(path: &Path) -> Result<Self, SessionError> {
        let open = || -> io::Result<LineWriter<File>> {
            let mut writer = LineWriter::new(File::create(path)?);
            writeln!(writer, "{LOG_HEADER}")?;
            Ok(writer)
        };

        match open() {
            Ok(writer) => {
                debug!("Opened log file {}", path.display());
                Ok(LogSink {
                    path: path.to_path_buf(),
                    writer,
                })
            }
            Err(source) => {
                error!("Failed to open log file {}: {}", path.display(), source);
                Err(SessionError::SinkOpen {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. `line` must not contain the trailing newline.
    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        // single write so a row is never split across flushes
        let mut row = String::with_capacity(line.len() + 1);
        row.push_str(line);
        row.push('\n');
        self.writer.write_all(row.as_bytes())
    }

    /// Flush and close the file.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        debug!("Closed log file {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn create_writes_header_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.txt");
        fs::write(&path, "stale contents\n").unwrap();

        let mut sink = LogSink::create(&path).unwrap();
        sink.append_line("row").unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{LOG_HEADER}\nrow\n"));
    }

    #[test]
    fn unwritable_location_is_a_sink_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("device.txt");
        match LogSink::create(&path) {
            Err(SessionError::SinkOpen { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected SinkOpen, got {:?}", other.map(|s| s.path().to_path_buf())),
        }
    }
}
