pub mod event_logger;
pub mod sink;

pub use event_logger::EventLogger;
pub use sink::{LogSink, LOG_HEADER};
