//! Incremental decoder for incoming frames.
//!
//! Socket reads can end anywhere: inside a length prefix, inside a payload,
//! or after several complete frames. [`FrameReader`] accumulates bytes in a
//! single growable buffer and tracks a consumption cursor, so each byte is
//! copied once on the way in and partial frames survive until the rest of
//! their bytes arrive.

/// Width of a frame's big-endian length prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixWidth {
    /// Two-byte prefix used by control frames.
    Short,
    /// Four-byte prefix used by opaque payload frames.
    Long,
}

impl PrefixWidth {
    /// Number of prefix bytes.
    pub const fn len(self) -> usize {
        match self {
            PrefixWidth::Short => 2,
            PrefixWidth::Long => 4,
        }
    }

    fn decode(self, bytes: &[u8]) -> usize {
        match self {
            PrefixWidth::Short => usize::from(u16::from_be_bytes([bytes[0], bytes[1]])),
            PrefixWidth::Long => {
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
        }
    }
}

/// Resumable frame decoder.
#[derive(Debug)]
pub struct FrameReader {
    width: PrefixWidth,
    buf: Vec<u8>,
    start: usize,
}

impl FrameReader {
    /// Create a reader for frames with the given prefix width.
    pub fn new(width: PrefixWidth) -> Self {
        Self {
            width,
            buf: Vec::new(),
            start: 0,
        }
    }

    /// Reader for short (control) frames, the only form the Router sends.
    pub fn short() -> Self {
        Self::new(PrefixWidth::Short)
    }

    /// Reader for long (opaque payload) frames.
    pub fn long() -> Self {
        Self::new(PrefixWidth::Long)
    }

    /// Append freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Bytes still missing before the next frame can be decoded.
    ///
    /// While the prefix is incomplete this counts only the missing prefix
    /// bytes, because the payload length is not yet known.
    pub fn bytes_needed(&self) -> usize {
        let pending = &self.buf[self.start..];
        let prefix = self.width.len();
        if pending.len() < prefix {
            return prefix - pending.len();
        }
        let total = prefix + self.width.decode(pending);
        total.saturating_sub(pending.len())
    }

    /// Consume the next complete frame and return its raw payload.
    pub fn next_payload(&mut self) -> Option<Vec<u8>> {
        if self.bytes_needed() > 0 {
            return None;
        }
        let prefix = self.width.len();
        let pending = &self.buf[self.start..];
        let len = self.width.decode(pending);
        let payload = pending[prefix..prefix + len].to_vec();
        self.start += prefix + len;
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
        Some(payload)
    }

    /// Consume the next complete frame and split its payload on NUL bytes.
    pub fn next_fields(&mut self) -> Option<Vec<String>> {
        self.next_payload().map(|payload| split_fields(&payload))
    }

    /// Discard everything buffered, including a partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }
}

/// Split a short-frame payload into its NUL-separated text fields.
///
/// An empty payload yields a single empty field, mirroring the encoder,
/// which turns `[""]` into an empty payload.
pub fn split_fields(payload: &[u8]) -> Vec<String> {
    payload
        .split(|byte| *byte == 0)
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}
