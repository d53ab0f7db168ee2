//! Hand-written protobuf field encoding.
//!
//! No schema compiler is involved. Callers write and read numbered fields
//! directly against the protobuf binary format; unknown fields can be
//! skipped so message definitions may grow on either side.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ScribeError;
use crate::varint;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

/// Builder for an encoded protobuf message.
///
/// Fields whose value is the proto3 default (zero, empty) are skipped, so an
/// empty writer finishes as an empty message.
#[derive(Debug, Default)]
pub struct MessageWriter {
    buf: BytesMut,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unsigned varint field
    pub fn write_varint(&mut self, field: u32, value: u64) -> &mut Self {
        if value != 0 {
            self.write_key(field, WireType::Varint);
            varint::encode(value, &mut self.buf);
        }
        self
    }

    /// Append a signed 32-bit field, sign-extended to 64 bits like proto int32
    pub fn write_int32(&mut self, field: u32, value: i32) -> &mut Self {
        if value != 0 {
            self.write_key(field, WireType::Varint);
            varint::encode(value as i64 as u64, &mut self.buf);
        }
        self
    }

    /// Append a string field
    pub fn write_string(&mut self, field: u32, value: &str) -> &mut Self {
        self.write_bytes(field, value.as_bytes())
    }

    /// Append a bytes field
    pub fn write_bytes(&mut self, field: u32, value: &[u8]) -> &mut Self {
        if !value.is_empty() {
            self.write_key(field, WireType::LengthDelimited);
            varint::encode(value.len() as u64, &mut self.buf);
            self.buf.put_slice(value);
        }
        self
    }

    /// Append an embedded message field
    pub fn write_message(&mut self, field: u32, body: &[u8]) -> &mut Self {
        self.write_bytes(field, body)
    }

    /// Append a packed repeated varint field
    pub fn write_packed_varints(&mut self, field: u32, values: &[u64]) -> &mut Self {
        if !values.is_empty() {
            let mut packed = BytesMut::new();
            for &value in values {
                varint::encode(value, &mut packed);
            }
            self.write_key(field, WireType::LengthDelimited);
            varint::encode(packed.len() as u64, &mut self.buf);
            self.buf.put_slice(&packed);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the encoded message
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn write_key(&mut self, field: u32, wire: WireType) {
        varint::encode(u64::from(field) << 3 | wire as u64, &mut self.buf);
    }
}

/// Cursor that walks the fields of an encoded protobuf message
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Read the next field key, or `None` at the end of the message
    pub fn next_field(&mut self) -> Result<Option<(u32, WireType)>, ScribeError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }

        let tag = self.read_varint()?;
        let field = u32::try_from(tag >> 3).map_err(|_| {
            ScribeError::MalformedMessage(format!("field number {} out of range", tag >> 3))
        })?;
        if field == 0 {
            return Err(ScribeError::MalformedMessage(
                "field number zero".to_string(),
            ));
        }

        let wire = match tag & 0x7 {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::LengthDelimited,
            5 => WireType::Fixed32,
            other => {
                return Err(ScribeError::MalformedMessage(format!(
                    "unsupported wire type {other}"
                )))
            }
        };
        Ok(Some((field, wire)))
    }

    /// Read a varint value at the cursor
    pub fn read_varint(&mut self) -> Result<u64, ScribeError> {
        let (value, consumed) = varint::decode(&self.buf[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    /// Read a length-delimited value at the cursor
    pub fn read_bytes(&mut self) -> Result<&'a [u8], ScribeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| {
            ScribeError::MalformedMessage(format!("length {len} overflows this platform"))
        })?;
        self.take(len)
    }

    /// Read a length-delimited value as UTF-8 text
    pub fn read_string(&mut self) -> Result<&'a str, ScribeError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map_err(|_| ScribeError::MalformedMessage("string field is not UTF-8".to_string()))
    }

    /// Read a packed repeated varint field
    pub fn read_packed_varints(&mut self) -> Result<Vec<u64>, ScribeError> {
        let mut packed = self.read_bytes()?;
        let mut values = Vec::new();
        while !packed.is_empty() {
            let (value, consumed) = varint::decode(packed)?;
            values.push(value);
            packed = &packed[consumed..];
        }
        Ok(values)
    }

    /// Skip a field's value, for callers that do not recognize the field
    pub fn skip(&mut self, wire: WireType) -> Result<(), ScribeError> {
        match wire {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
        }
        Ok(())
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ScribeError> {
        if self.remaining() < len {
            return Err(ScribeError::MalformedMessage(format!(
                "value of {len} bytes exceeds the {} remaining",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Concatenate messages, each preceded by its varint-encoded length
pub fn encode_length_prefixed<'a>(messages: impl IntoIterator<Item = &'a [u8]>) -> Bytes {
    let mut buf = BytesMut::new();
    for message in messages {
        varint::encode(message.len() as u64, &mut buf);
        buf.put_slice(message);
    }
    buf.freeze()
}

/// Split a varint-length-prefixed concatenation back into its messages
pub fn decode_length_prefixed(payload: &[u8]) -> Result<Vec<Bytes>, ScribeError> {
    let mut messages = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let (len, consumed) = varint::decode(&payload[pos..])?;
        pos += consumed;
        let len = usize::try_from(len).map_err(|_| {
            ScribeError::MalformedMessage(format!("length {len} overflows this platform"))
        })?;
        if payload.len() - pos < len {
            return Err(ScribeError::MalformedMessage(format!(
                "message of {len} bytes exceeds the {} remaining",
                payload.len() - pos
            )));
        }
        messages.push(Bytes::copy_from_slice(&payload[pos..pos + len]));
        pos += len;
    }
    Ok(messages)
}
