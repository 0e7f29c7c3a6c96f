//! Size-bounded output capture
//!
//! Commands can print without limit; we keep at most `max_bytes` and count
//! the rest.

use std::io;

/// Byte buffer that stops growing at a limit but keeps counting
#[derive(Debug, Clone)]
pub struct LimitedBuffer {
    buf: Vec<u8>,
    max_bytes: usize,
    original_length: u64,
}

impl LimitedBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_bytes.min(8192)),
            max_bytes,
            original_length: 0,
        }
    }

    /// Append up to `room` bytes of `chunk`; the full length is always counted
    fn push(&mut self, chunk: &[u8], room: usize) {
        self.original_length += chunk.len() as u64;
        let take = chunk.len().min(room);
        self.buf.extend_from_slice(&chunk[..take]);
    }

    pub fn write_bytes(&mut self, chunk: &[u8]) {
        let room = self.max_bytes.saturating_sub(self.buf.len());
        self.push(chunk, room);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn original_length(&self) -> u64 {
        self.original_length
    }

    pub fn is_truncated(&self) -> bool {
        self.original_length > self.buf.len() as u64
    }

    /// Captured bytes as text; a multi-byte character cut at the limit
    /// becomes U+FFFD
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

impl io::Write for LimitedBuffer {
    fn write(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.write_bytes(chunk);
        Ok(chunk.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// stdout and stderr of one command sharing a single byte budget
#[derive(Debug, Clone)]
pub struct OutputCapture {
    stdout: LimitedBuffer,
    stderr: LimitedBuffer,
    max_bytes: usize,
}

impl OutputCapture {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            stdout: LimitedBuffer::new(max_bytes),
            stderr: LimitedBuffer::new(max_bytes),
            max_bytes,
        }
    }

    fn room(&self) -> usize {
        self.max_bytes
            .saturating_sub(self.stdout.len() + self.stderr.len())
    }

    pub fn write_stdout(&mut self, chunk: &[u8]) {
        let room = self.room();
        self.stdout.push(chunk, room);
    }

    pub fn write_stderr(&mut self, chunk: &[u8]) {
        let room = self.room();
        self.stderr.push(chunk, room);
    }

    pub fn captured_len(&self) -> usize {
        self.stdout.len() + self.stderr.len()
    }

    pub fn original_length(&self) -> u64 {
        self.stdout.original_length() + self.stderr.original_length()
    }

    pub fn is_truncated(&self) -> bool {
        self.original_length() > self.captured_len() as u64
    }

    pub fn stdout(&self) -> &LimitedBuffer {
        &self.stdout
    }

    pub fn stderr(&self) -> &LimitedBuffer {
        &self.stderr
    }
}
