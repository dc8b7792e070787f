//! Output pipeline: reassembling process output into lines, timestamping
//! them, and fanning them out to rotating log files (and/or the
//! supervisor's own stdout/stderr for interactive use).

pub mod fanout;
pub mod line_buffer;
pub mod rotating_writer;
pub mod sinks;
pub mod size;
pub mod timestamp;

pub use fanout::{FanoutWriter, Sink, StdSink};
pub use line_buffer::LineBuffer;
pub use rotating_writer::{OutputError, RotatingWriter};
pub use sinks::build_service_sinks;
pub use size::parse_size;
pub use timestamp::TimestampFormat;
