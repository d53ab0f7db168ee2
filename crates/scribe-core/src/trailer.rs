//! Trailer frame parsing.
//!
//! A trailer payload is UTF-8 text of CRLF-separated `key: value` lines.
//! `grpc-status` carries the decimal status code, `grpc-message` an optional
//! percent-encoded description; every other key is surfaced as metadata.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ScribeError;
use crate::status::GrpcStatus;

/// Trailer key for the status code
pub const GRPC_STATUS: &str = "grpc-status";

/// Trailer key for the status message
pub const GRPC_MESSAGE: &str = "grpc-message";

/// Status block that terminates a call
#[derive(Debug, Clone)]
pub struct Trailer {
    pub status_code: u32,
    pub status_message: String,
    pub metadata: HeaderMap,
}

impl Trailer {
    /// Parse a trailer frame payload.
    ///
    /// Keys are matched case-insensitively and a duplicate key keeps the last
    /// value. A payload without a numeric `grpc-status` is malformed; a
    /// `grpc-message` that fails percent-decoding is kept as raw text.
    pub fn parse(payload: &[u8]) -> Result<Self, ScribeError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| ScribeError::MalformedTrailer("payload is not UTF-8".to_string()))?;

        let mut status_code = None;
        let mut status_message = String::new();
        let mut metadata = HeaderMap::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                ScribeError::MalformedTrailer(format!("line without a colon: {line:?}"))
            })?;
            let value = value.strip_prefix(' ').unwrap_or(value);

            if key.eq_ignore_ascii_case(GRPC_STATUS) {
                status_code = Some(value.trim().parse::<u32>().map_err(|_| {
                    ScribeError::MalformedTrailer(format!("non-numeric grpc-status {value:?}"))
                })?);
            } else if key.eq_ignore_ascii_case(GRPC_MESSAGE) {
                status_message = percent_decode(value).unwrap_or_else(|| value.to_string());
            } else if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                metadata.insert(name, value);
            }
        }

        let status_code = status_code
            .ok_or_else(|| ScribeError::MalformedTrailer("missing grpc-status".to_string()))?;

        Ok(Self {
            status_code,
            status_message,
            metadata,
        })
    }

    /// Build a trailer from HTTP headers, for responses that carry the status
    /// outside any trailer frame.
    ///
    /// Returns `Ok(None)` when no `grpc-status` key is present.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ScribeError> {
        let Some(raw_status) = headers.get(GRPC_STATUS) else {
            return Ok(None);
        };
        let status_code = raw_status
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .ok_or_else(|| {
                ScribeError::MalformedTrailer(format!("non-numeric grpc-status {raw_status:?}"))
            })?;

        let status_message = headers
            .get(GRPC_MESSAGE)
            .and_then(|v| v.to_str().ok())
            .map(|raw| percent_decode(raw).unwrap_or_else(|| raw.to_string()))
            .unwrap_or_default();

        let mut metadata = HeaderMap::new();
        for (name, value) in headers {
            if name.as_str() != GRPC_STATUS && name.as_str() != GRPC_MESSAGE {
                metadata.append(name.clone(), value.clone());
            }
        }

        Ok(Some(Self {
            status_code,
            status_message,
            metadata,
        }))
    }

    /// Status code as a canonical gRPC status
    pub fn status(&self) -> GrpcStatus {
        GrpcStatus::from_u32(self.status_code)
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 0
    }
}

/// Decode %XX escapes, returning `None` when an escape is invalid or the
/// result is not UTF-8
fn percent_decode(input: &str) -> Option<String> {
    if !input.contains('%') {
        return Some(input.to_string());
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_value(*bytes.get(i + 1)?)?;
            let lo = hex_value(*bytes.get(i + 2)?)?;
            out.push(hi << 4 | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
