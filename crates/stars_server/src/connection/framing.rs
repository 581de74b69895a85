//! Line framing for the text protocol.
//!
//! Inbound bytes are split into newline-terminated lines with any trailing
//! partial line kept for the next read. Outbound text is queued per
//! connection and drained with partial-write tracking.

use std::io;

/// Longest line accepted from a peer, in bytes, excluding the newline.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// A peer sent more than the line limit without a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Result of a single non-blocking read attempt.
///
/// Only [`ReadOutcome::Eof`] and [`ReadOutcome::Fatal`] end a connection;
/// [`ReadOutcome::WouldBlock`] just means the readiness was spurious.
#[derive(Debug)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
    Fatal(io::Error),
}

impl ReadOutcome {
    /// Classifies the result of a `try_read` into `buf`.
    pub fn classify(result: io::Result<usize>, buf: &[u8]) -> Self {
        match result {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => ReadOutcome::Data(buf[..n].to_vec()),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                ReadOutcome::WouldBlock
            }
            Err(e) => ReadOutcome::Fatal(e),
        }
    }

    /// Whether the connection must be torn down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadOutcome::Eof | ReadOutcome::Fatal(_))
    }
}

/// Accumulates inbound bytes and yields complete lines.
///
/// Bytes are kept undecoded until a `\n` arrives, so a multi-byte UTF-8
/// character split across two reads is still decoded correctly. No line may
/// grow past `limit` bytes; the unfinished tail therefore never holds more
/// than the limit.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Appends `data` and returns every line it completed, in arrival order.
    ///
    /// Trailing `\r` characters are stripped and empty lines are dropped.
    /// Fails when any line, finished or not, is longer than the limit; the
    /// connection cannot be resynchronised after that and should be dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<String>, LineTooLong> {
        self.pending.extend_from_slice(data);
        let too_long = LineTooLong { limit: self.limit };
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            if self.pending.len() > self.limit {
                self.pending.clear();
                return Err(too_long);
            }
            return Ok(Vec::new());
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        if self.pending.len() > self.limit {
            self.pending.clear();
            return Err(too_long);
        }

        let mut lines = Vec::new();
        for line in complete.split(|&b| b == b'\n') {
            let end = line.iter().rposition(|&b| b != b'\r').map_or(0, |i| i + 1);
            if end > self.limit {
                self.pending.clear();
                return Err(too_long);
            }
            if end > 0 {
                lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
            }
        }
        Ok(lines)
    }

    /// Bytes of the unfinished line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Per-connection outbound byte queue.
///
/// `pending()` is whatever has not been written yet; after a partial write
/// the caller reports the byte count with `consume()` and the next write
/// resumes from the remainder.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    buffer: Vec<u8>,
    sent: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &str) {
        if self.sent > 0 && self.sent >= self.buffer.len() / 2 {
            self.buffer.drain(..self.sent);
            self.sent = 0;
        }
        self.buffer.extend_from_slice(data.as_bytes());
    }

    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.sent..]
    }

    /// Marks `n` bytes of `pending()` as written.
    pub fn consume(&mut self, n: usize) {
        self.sent = (self.sent + n).min(self.buffer.len());
        if self.sent == self.buffer.len() {
            self.buffer.clear();
            self.sent = 0;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len() - self.sent
    }

    /// Drops everything still queued.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.sent = 0;
    }
}
