//! Reassembles complete lines out of arbitrarily-chunked reads off a child's
//! stdout/stderr pipe. A chunk boundary never lines up with a newline, so
//! any trailing partial line is held back until the next chunk completes it.

#[derive(Debug, Default)]
pub struct LineBuffer {
    tail: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes in, returning the complete lines it produced
    /// (newline stripped). Any trailing partial line is retained internally.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.tail.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.tail.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.tail.drain(..=pos).collect();
            line.pop(); // drop the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Flushes whatever partial line remains, e.g. when the stream closes
    /// without a trailing newline. Returns `None` if nothing is pending.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.tail.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.tail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_with_trailing_newline_yields_one_line() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"hello\n");
        assert_eq!(lines, vec![b"hello".to_vec()]);
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn split_line_reassembles_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"hel").is_empty());
        let lines = buf.feed(b"lo\n");
        assert_eq!(lines, vec![b"hello".to_vec()]);
    }

    #[test]
    fn multiple_lines_in_one_chunk() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"a\nb\nc\n");
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn strips_carriage_return() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"hi\r\n");
        assert_eq!(lines, vec![b"hi".to_vec()]);
    }

    #[test]
    fn flush_returns_pending_partial_line() {
        let mut buf = LineBuffer::new();
        buf.feed(b"no newline yet");
        assert_eq!(buf.flush(), Some(b"no newline yet".to_vec()));
        assert_eq!(buf.flush(), None);
    }
}
