//! Line reassembly across arbitrary chunk boundaries.
//!
//! Bytes are only decoded once a line is complete, so a multi-byte UTF-8
//! sequence split between two chunks still decodes to the right character.
//! Invalid sequences are replaced, never rejected.

const BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct LineReassembler {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    /// Set when the current line overflowed; bytes are dropped until `\n`
    discarding: bool,
    at_start: bool,
    truncated_lines: u64,
    bytes_seen: u64,
}

impl LineReassembler {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
            at_start: true,
            truncated_lines: 0,
            bytes_seen: 0,
        }
    }

    /// Feed one chunk and return every line completed by it.
    /// A trailing segment without terminator stays buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes_seen += chunk.len() as u64;
        let mut lines = Vec::new();
        let mut rest = chunk;

        if self.at_start {
            // A BOM may itself be split; wait for enough bytes to decide.
            if self.buffer.len() + rest.len() < BOM.len() && BOM.starts_with(&[&self.buffer[..], rest].concat()) {
                self.buffer.extend_from_slice(rest);
                return lines;
            }
            let mut head = std::mem::take(&mut self.buffer);
            head.extend_from_slice(rest);
            self.at_start = false;
            let start = if head.starts_with(BOM) { BOM.len() } else { 0 };
            return self.feed_after_start(&head[start..], lines);
        }

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.push_bytes(&rest[..pos]);
            lines.push(self.take_line());
            rest = &rest[pos + 1..];
        }
        self.push_bytes(rest);
        lines
    }

    fn feed_after_start(&mut self, mut rest: &[u8], mut lines: Vec<String>) -> Vec<String> {
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.push_bytes(&rest[..pos]);
            lines.push(self.take_line());
            rest = &rest[pos + 1..];
        }
        self.push_bytes(rest);
        lines
    }

    /// Return the final unterminated line, if any, at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        if self.at_start {
            // Stream shorter than a BOM.
            self.at_start = false;
            if self.buffer == BOM {
                self.buffer.clear();
            }
        }
        if self.buffer.is_empty() && !self.discarding {
            return None;
        }
        Some(self.take_line())
    }

    /// Lines cut down to `max_line_bytes` so far.
    pub fn truncated_lines(&self) -> u64 {
        self.truncated_lines
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Bytes currently held for an unterminated line.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Keeps one byte past the cap: it may be the `\r` of a `\r\n`
    /// terminator, which does not count against the line.
    fn push_bytes(&mut self, bytes: &[u8]) {
        if self.discarding {
            return;
        }
        let room = self.max_line_bytes + 1 - self.buffer.len();
        if bytes.len() > room {
            self.buffer.extend_from_slice(&bytes[..room]);
            self.discarding = true;
        } else {
            self.buffer.extend_from_slice(bytes);
        }
    }

    fn take_line(&mut self) -> String {
        let mut raw = std::mem::take(&mut self.buffer);
        if !self.discarding && raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if raw.len() > self.max_line_bytes {
            raw.truncate(self.max_line_bytes);
            drop_partial_char(&mut raw);
            self.truncated_lines += 1;
        }
        self.discarding = false;
        String::from_utf8_lossy(&raw).into_owned()
    }
}

/// Remove a multi-byte sequence cut off by truncation.
fn drop_partial_char(raw: &mut Vec<u8>) {
    let tail = raw.len().saturating_sub(3);
    let lead = (tail..raw.len()).rev().find(|&i| raw[i] & 0xC0 != 0x80);
    if let Some(lead) = lead {
        if let Err(e) = std::str::from_utf8(&raw[lead..]) {
            if e.error_len().is_none() {
                raw.truncate(lead);
            }
        }
    }
}

/// Split a fully buffered text the same way [`LineReassembler`] does:
/// `\n` terminators, optional `\r` before them, no empty final segment,
/// leading BOM removed, lines capped at `max_line_bytes`.
pub fn split_lines(text: &str, max_line_bytes: usize) -> SplitLines<'_> {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
    let empty = text.is_empty();
    let text = text.strip_suffix('\n').unwrap_or(text);
    SplitLines {
        inner: text.split('\n'),
        max: max_line_bytes.max(1),
        empty,
        truncated: 0,
    }
}

pub struct SplitLines<'a> {
    inner: std::str::Split<'a, char>,
    max: usize,
    empty: bool,
    truncated: u64,
}

impl<'a> SplitLines<'a> {
    /// Lines cut down to the cap so far.
    pub fn truncated(&self) -> u64 {
        self.truncated
    }
}

impl<'a> Iterator for SplitLines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.empty {
            return None;
        }
        let line = self.inner.next()?;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.len() <= self.max {
            return Some(line);
        }
        self.truncated += 1;
        let mut end = self.max;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        Some(&line[..end])
    }
}
