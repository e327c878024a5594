//! Portage wire format — on-wire layout for every packet exchanged
//! with remote clients.
//!
//! These definitions ARE the protocol. A frame is laid out as
//!
//! ```text
//! [cmd:1][msg_id:8][header_len:4][header bytes][body_len:4][body bytes]
//! ```
//!
//! with all integers big-endian. The header carries a JSON-serialized
//! [`RecordHeader`](crate::record::RecordHeader); the body is either a
//! single key/value pair (push packets) or a sequence of batch sub-frames
//! (pull responses). Changing any width here is a breaking change.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Fixed prologue: cmd byte + msg_id + header length prefix.
const PROLOGUE_LEN: usize = 1 + 8 + 4;

/// Each variable-length field is preceded by a 4-byte length.
pub const LEN_PREFIX: usize = 4;

/// Largest header the decoder accepts. Headers are small JSON objects;
/// anything bigger is a corrupt or hostile frame.
pub const MAX_HEADER_LEN: u32 = 64 * 1024;

/// Largest body the decoder accepts. Bounds a batch response.
pub const MAX_BODY_LEN: u32 = 64 * 1024 * 1024;

// ── Commands ──────────────────────────────────────────────────────────────────

/// Wire opcode. One byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Server → client: a single record actively forwarded.
    Push = 0x01,
    /// Client → server: request a batch of records.
    Pull = 0x02,
    /// Server → client: batch response to a `Pull`.
    PullResp = 0x03,
    /// Client → server: acknowledge a delivered packet by msg_id.
    Ack = 0x04,
    /// Client → server: liveness probe.
    Heartbeat = 0x05,
    /// Client → server: leave the connection set gracefully.
    Unregister = 0x06,
}

impl TryFrom<u8> for Command {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Push),
            0x02 => Ok(Command::Pull),
            0x03 => Ok(Command::PullResp),
            0x04 => Ok(Command::Ack),
            0x05 => Ok(Command::Heartbeat),
            0x06 => Ok(Command::Unregister),
            other => Err(WireError::UnknownCommand(other)),
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// The framed wire unit.
///
/// `header` and `body` are opaque byte fields here; their interpretation
/// belongs to the engines and handlers. Both are `Bytes`, so clones are
/// reference-counted and cheap — a retried packet is byte-identical to the
/// original send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: Command,
    pub msg_id: u64,
    pub header: Bytes,
    pub body: Bytes,
}

impl Packet {
    /// An empty-header, empty-body packet. Heartbeats, unregisters, and
    /// empty pull responses look like this.
    pub fn new(cmd: Command, msg_id: u64) -> Self {
        Self {
            cmd,
            msg_id,
            header: Bytes::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_parts(cmd: Command, msg_id: u64, header: Bytes, body: Bytes) -> Self {
        Self {
            cmd,
            msg_id,
            header,
            body,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn is_body_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Exact encoded size on the wire.
    pub fn encoded_len(&self) -> usize {
        PROLOGUE_LEN + self.header.len() + LEN_PREFIX + self.body.len()
    }

    /// Append this packet's frame to `dst`. Reserves exact capacity first.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(self.cmd.into());
        dst.put_u64(self.msg_id);
        dst.put_u32(self.header.len() as u32);
        dst.put_slice(&self.header);
        dst.put_u32(self.body.len() as u32);
        dst.put_slice(&self.body);
    }

    /// Decode one frame from the front of `src`, consuming it.
    ///
    /// Returns `Ok(None)` when `src` does not yet hold a complete frame;
    /// nothing is consumed in that case. Oversized length prefixes and
    /// unknown opcodes are errors — the connection should be dropped.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Packet>, WireError> {
        if src.len() < PROLOGUE_LEN {
            return Ok(None);
        }

        let mut peek: &[u8] = &src[..];
        let cmd_byte = peek.get_u8();
        let msg_id = peek.get_u64();
        let header_len = peek.get_u32();
        if header_len > MAX_HEADER_LEN {
            return Err(WireError::FrameTooLarge {
                len: header_len,
                max: MAX_HEADER_LEN,
            });
        }
        if peek.remaining() < header_len as usize + LEN_PREFIX {
            return Ok(None);
        }
        peek.advance(header_len as usize);
        let body_len = peek.get_u32();
        if body_len > MAX_BODY_LEN {
            return Err(WireError::FrameTooLarge {
                len: body_len,
                max: MAX_BODY_LEN,
            });
        }
        if peek.remaining() < body_len as usize {
            return Ok(None);
        }

        let cmd = Command::try_from(cmd_byte)?;
        src.advance(PROLOGUE_LEN);
        let header = src.split_to(header_len as usize).freeze();
        src.advance(LEN_PREFIX);
        let body = src.split_to(body_len as usize).freeze();

        Ok(Some(Packet {
            cmd,
            msg_id,
            header,
            body,
        }))
    }
}

// ── Batch body framing ────────────────────────────────────────────────────────

/// Append one record sub-frame to a batch body:
/// `len(header)|header|len(key)|key|len(value)|value`.
///
/// Grows `body` to exactly the required capacity before copying.
pub fn append_record(body: &mut BytesMut, header: &[u8], key: &[u8], value: &[u8]) {
    body.reserve(3 * LEN_PREFIX + header.len() + key.len() + value.len());
    body.put_u32(header.len() as u32);
    body.put_slice(header);
    body.put_u32(key.len() as u32);
    body.put_slice(key);
    body.put_u32(value.len() as u32);
    body.put_slice(value);
}

/// Append a previously framed packet's body verbatim. Retried packets
/// already carry their own sub-frame layout; nothing is re-serialized.
pub fn append_packet_body(body: &mut BytesMut, packet: &Packet) {
    body.reserve(packet.body.len());
    body.put_slice(&packet.body);
}

/// Build a push packet's body: `len(key)|key|len(value)|value`.
pub fn encode_key_value(key: &[u8], value: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(2 * LEN_PREFIX + key.len() + value.len());
    body.put_u32(key.len() as u32);
    body.put_slice(key);
    body.put_u32(value.len() as u32);
    body.put_slice(value);
    body.freeze()
}

/// One decoded batch sub-frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub header: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

/// Iterator over the sub-frames of a pull-response body.
///
/// Yields an error (and then stops) if the body is truncated mid-frame.
pub struct BatchIter {
    buf: Bytes,
    failed: bool,
}

impl BatchIter {
    pub fn new(body: Bytes) -> Self {
        Self {
            buf: body,
            failed: false,
        }
    }

    fn read_field(&mut self) -> Result<Bytes, WireError> {
        if self.buf.len() < LEN_PREFIX {
            return Err(WireError::TruncatedBatch);
        }
        let len = self.buf.get_u32() as usize;
        if self.buf.len() < len {
            return Err(WireError::TruncatedBatch);
        }
        Ok(self.buf.split_to(len))
    }
}

impl Iterator for BatchIter {
    type Item = Result<BatchEntry, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        let entry = (|| {
            let header = self.read_field()?;
            let key = self.read_field()?;
            let value = self.read_field()?;
            Ok(BatchEntry { header, key, value })
        })();
        if entry.is_err() {
            self.failed = true;
        }
        Some(entry)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown command byte: 0x{0:02x}")]
    UnknownCommand(u8),
    #[error("frame field of {len} bytes exceeds limit {max}")]
    FrameTooLarge { len: u32, max: u32 },
    #[error("truncated batch sub-frame")]
    TruncatedBatch,
}
