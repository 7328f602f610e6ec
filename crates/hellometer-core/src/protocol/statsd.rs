//! StatsD counter line codec (panic-free).
//!
//! Line format: `<prefix>.<key>:<value>|c[|@<rate>]`.
//! Lines are joined with `\n` into datagrams no larger than the configured
//! packet size. A line that alone exceeds the limit is emitted on its own.

use std::fmt::Write;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{HellometerError, Result};

/// Conservative payload size that fits a 1500-byte MTU after IP/UDP headers.
pub const DEFAULT_MAX_PACKET_BYTES: usize = 1432;

/// Characters that carry meaning in the line grammar.
const RESERVED: [char; 4] = [':', '|', '@', '\n'];

/// Reject names that would corrupt the line grammar.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HellometerError::Config("statsd name must not be empty".into()));
    }
    if let Some(c) = name.chars().find(|c| RESERVED.contains(c) || c.is_whitespace()) {
        return Err(HellometerError::Config(format!(
            "statsd name {name:?} contains reserved character {c:?}"
        )));
    }
    Ok(())
}

/// Render one counter line. `prefix` may be empty.
pub fn encode_counter(prefix: &str, key: &str, value: i64, sample_rate: f32) -> String {
    let mut line = String::with_capacity(prefix.len() + key.len() + 24);
    if !prefix.is_empty() {
        line.push_str(prefix);
        line.push('.');
    }
    let _ = write!(line, "{key}:{value}|c");
    if sample_rate < 1.0 {
        let _ = write!(line, "|@{sample_rate}");
    }
    line
}

/// Packs lines into datagrams of at most `max_bytes`.
#[derive(Debug)]
pub struct PacketBuilder {
    max_bytes: usize,
    buf: BytesMut,
    packets: Vec<Bytes>,
}

impl PacketBuilder {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            buf: BytesMut::with_capacity(max_bytes),
            packets: Vec::new(),
        }
    }

    /// Append one line, starting a new datagram when it would not fit.
    pub fn push_line(&mut self, line: &str) {
        if !self.buf.is_empty() && self.buf.len() + 1 + line.len() > self.max_bytes {
            self.seal();
        }
        if !self.buf.is_empty() {
            self.buf.put_u8(b'\n');
        }
        self.buf.put_slice(line.as_bytes());
    }

    /// Finish and return all datagrams in push order.
    pub fn finish(mut self) -> Vec<Bytes> {
        self.seal();
        self.packets
    }

    fn seal(&mut self) {
        if !self.buf.is_empty() {
            self.packets.push(self.buf.split().freeze());
        }
    }
}
