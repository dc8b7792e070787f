//! Duplicates each line to every configured sink. Every sink is always
//! attempted even if an earlier one fails, so a broken log file doesn't
//! silently stop stdout echoing too; the first error encountered is
//! returned to the caller once all sinks have had their turn.

use std::io;

use super::rotating_writer::{OutputError, RotatingWriter};
use super::timestamp::TimestampFormat;
use chrono::Utc;

pub trait Sink {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()>;

    /// Closes the sink, fsyncing durable sinks where that applies.
    /// Idempotent: calling it again after a failure returns the same error.
    fn close(&mut self) -> io::Result<()>;
}

fn to_io_error(err: OutputError) -> io::Error {
    match err {
        OutputError::Write { source, .. } | OutputError::Close { source, .. } => source,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

impl Sink for RotatingWriter {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.write_line(line).map_err(to_io_error)
    }

    fn close(&mut self) -> io::Result<()> {
        self.close().map_err(to_io_error)
    }
}

pub struct StdSink<W: io::Write>(pub W);

impl<W: io::Write> Sink for StdSink<W> {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.0.write_all(line)?;
        self.0.write_all(b"\n")
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

pub struct FanoutWriter {
    sinks: Vec<Box<dyn Sink + Send>>,
    timestamp: Option<TimestampFormat>,
    closed: Option<Option<String>>,
}

impl FanoutWriter {
    pub fn new(sinks: Vec<Box<dyn Sink + Send>>, timestamp: Option<TimestampFormat>) -> Self {
        Self {
            sinks,
            timestamp,
            closed: None,
        }
    }

    /// Closes every sink, attempting all of them even if an earlier one
    /// fails, and returns the first error encountered. Idempotent: once
    /// closed, replays the same outcome without touching the sinks again.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(outcome) = &self.closed {
            return match outcome {
                None => Ok(()),
                Some(message) => Err(io::Error::new(io::ErrorKind::Other, message.clone())),
            };
        }
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.close() {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        self.closed = Some(first_error.as_ref().map(|err| err.to_string()));
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Writes `line` to every sink, prefixing it with a rendered timestamp
    /// first if one was configured. Returns the first error encountered,
    /// having still attempted every remaining sink.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let prefixed;
        let line = match &self.timestamp {
            Some(format) => {
                prefixed = format!("{} {}", format.render(Utc::now()), String::from_utf8_lossy(line));
                prefixed.as_bytes()
            }
            None => line,
        };

        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.write_line(line) {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl Sink for RecordingSink {
        fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
            self.0.lock().unwrap().push(line.to_vec());
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn write_line(&mut self, _line: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        }

        fn close(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        }
    }

    #[test]
    fn writes_to_every_sink() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FanoutWriter::new(
            vec![
                Box::new(RecordingSink(recorded.clone())),
                Box::new(RecordingSink(recorded.clone())),
            ],
            None,
        );
        fanout.write_line(b"hello").unwrap();
        assert_eq!(recorded.lock().unwrap().len(), 2);
    }

    #[test]
    fn continues_to_remaining_sinks_after_a_failure() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FanoutWriter::new(
            vec![
                Box::new(FailingSink),
                Box::new(RecordingSink(recorded.clone())),
            ],
            None,
        );
        let result = fanout.write_line(b"hello");
        assert!(result.is_err());
        assert_eq!(recorded.lock().unwrap().len(), 1);
    }

    #[test]
    fn prefixes_timestamp_when_configured() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FanoutWriter::new(
            vec![Box::new(RecordingSink(recorded.clone()))],
            Some(TimestampFormat::parse("%Y")),
        );
        fanout.write_line(b"hello").unwrap();
        let line = recorded.lock().unwrap()[0].clone();
        let text = String::from_utf8(line).unwrap();
        assert!(text.ends_with("hello"));
        assert!(text.len() > "hello".len());
    }

    #[test]
    fn close_attempts_every_sink_and_returns_first_error() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FanoutWriter::new(
            vec![
                Box::new(FailingSink),
                Box::new(RecordingSink(recorded.clone())),
            ],
            None,
        );
        assert!(fanout.close().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let mut fanout = FanoutWriter::new(vec![Box::new(RecordingSink(recorded))], None);
        fanout.close().unwrap();
        fanout.close().unwrap();
    }

    #[test]
    fn close_replays_same_error_on_repeat_calls() {
        let mut fanout = FanoutWriter::new(vec![Box::new(FailingSink)], None);
        let first = fanout.close().unwrap_err().to_string();
        let second = fanout.close().unwrap_err().to_string();
        assert_eq!(first, second);
    }
}
