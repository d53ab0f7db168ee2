//! gRPC-Web message framing.
//!
//! Frame format: [1 flag byte][4-byte big-endian length][payload bytes]
//! Flag bit 7 set marks a trailer frame; the remaining bits must be zero.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ScribeError;

/// Bytes in a frame header: one flag byte plus a 32-bit length
pub const FRAME_HEADER_LEN: usize = 5;

/// Flag bit that marks a trailer frame
pub const TRAILER_FLAG: u8 = 0b1000_0000;

/// Kind of a gRPC-Web frame, taken from bit 7 of the flag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Trailer,
}

impl FrameKind {
    pub fn flag_byte(&self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Trailer => TRAILER_FLAG,
        }
    }
}

/// A single gRPC-Web frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    /// Create a data frame
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Data,
            payload: payload.into(),
        }
    }

    /// Create a trailer frame
    pub fn trailer(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Trailer,
            payload: payload.into(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.kind == FrameKind::Data
    }

    pub fn is_trailer(&self) -> bool {
        self.kind == FrameKind::Trailer
    }

    /// Encode this frame to bytes
    pub fn encode(&self) -> Result<Bytes, ScribeError> {
        let payload_len = self.payload.len();
        if payload_len > u32::MAX as usize {
            return Err(ScribeError::PayloadTooLarge(payload_len));
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload_len);
        buf.put_u8(self.kind.flag_byte());
        buf.put_u32(payload_len as u32);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns the frame and the total bytes it occupied, or `Ok(None)` when the
/// buffer does not yet hold a complete frame. Nothing is consumed either way,
/// so retrying after the buffer grows is idempotent.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Frame, usize)>, ScribeError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None); // Need more data
    }

    let flag = buf[0];
    if flag & !TRAILER_FLAG != 0 {
        return Err(ScribeError::MalformedFrame(format!(
            "reserved bits set in flag byte {flag:#04x}"
        )));
    }
    let kind = if flag & TRAILER_FLAG != 0 {
        FrameKind::Trailer
    } else {
        FrameKind::Data
    };

    let payload_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    let total_len = FRAME_HEADER_LEN + payload_len;
    if buf.len() < total_len {
        return Ok(None); // Need more data
    }

    let payload = Bytes::copy_from_slice(&buf[FRAME_HEADER_LEN..total_len]);
    Ok(Some((Frame { kind, payload }, total_len)))
}

/// Frame parser that assembles complete frames from a chunked byte stream
#[derive(Debug)]
pub struct FrameParser {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_frame_len(u32::MAX as usize)
    }

    /// Parser that rejects frames whose declared length exceeds `limit`
    pub fn with_max_frame_len(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_len: limit,
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to parse a complete frame from the front of the buffer.
    ///
    /// Each extracted frame removes its bytes from the buffer; a partial tail
    /// stays buffered until further `feed` calls complete it.
    pub fn parse_frame(&mut self) -> Result<Option<Frame>, ScribeError> {
        if self.buffer.len() >= FRAME_HEADER_LEN {
            let declared = u32::from_be_bytes([
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
                self.buffer[4],
            ]) as usize;
            if declared > self.max_frame_len {
                return Err(ScribeError::MalformedFrame(format!(
                    "declared length {declared} exceeds the {} byte limit",
                    self.max_frame_len
                )));
            }
        }

        match decode_frame(&self.buffer)? {
            Some((frame, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes buffered but not yet consumed by a complete frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
