// Live output buffer: an OutputSink that keeps what a running job has printed so far

use super::lock_unpoisoned;
use crate::port::{OutputSink, StreamKind};
use std::sync::Mutex;

/// Capped per-stream buffers filled while a run is in progress
pub struct LiveOutput {
    limit: usize,
    stdout: Mutex<Vec<u8>>,
    stderr: Mutex<Vec<u8>>,
}

impl LiveOutput {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout: Mutex::new(Vec::new()),
            stderr: Mutex::new(Vec::new()),
        }
    }

    /// Current (stdout, stderr) as text; invalid UTF-8 is replaced
    pub fn snapshot(&self) -> (String, String) {
        let stdout = String::from_utf8_lossy(&lock_unpoisoned(&self.stdout)).into_owned();
        let stderr = String::from_utf8_lossy(&lock_unpoisoned(&self.stderr)).into_owned();
        (stdout, stderr)
    }
}

impl OutputSink for LiveOutput {
    fn on_output(&self, stream: StreamKind, chunk: &[u8]) {
        let buffer = match stream {
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        };
        let mut buffer = lock_unpoisoned(buffer);
        let room = self.limit.saturating_sub(buffer.len());
        buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_accumulate_per_stream() {
        let live = LiveOutput::new(1024);
        live.on_output(StreamKind::Stdout, b"hel");
        live.on_output(StreamKind::Stdout, b"lo\n");
        live.on_output(StreamKind::Stderr, b"warn\n");

        let (stdout, stderr) = live.snapshot();
        assert_eq!(stdout, "hello\n");
        assert_eq!(stderr, "warn\n");
    }

    #[test]
    fn test_limit_caps_buffer() {
        let live = LiveOutput::new(4);
        live.on_output(StreamKind::Stdout, b"abcdef");
        live.on_output(StreamKind::Stdout, b"gh");
        assert_eq!(live.snapshot().0, "abcd");
    }

    #[test]
    fn test_split_utf8_is_rejoined() {
        let live = LiveOutput::new(1024);
        let bytes = "é".as_bytes();
        live.on_output(StreamKind::Stdout, &bytes[..1]);
        live.on_output(StreamKind::Stdout, &bytes[1..]);
        assert_eq!(live.snapshot().0, "é");
    }
}
