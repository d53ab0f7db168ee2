//! Error types for the Scribe protocol stack.

use crate::status::GrpcStatus;

/// Scribe error type
#[derive(Debug, thiserror::Error)]
pub enum ScribeError {
    #[error("malformed varint: {0}")]
    MalformedVarint(String),

    #[error("payload of {0} bytes exceeds the 32-bit frame length field")]
    PayloadTooLarge(usize),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("malformed trailer: {0}")]
    MalformedTrailer(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("call cancelled")]
    Cancelled,

    #[error("remote call failed with grpc-status {code} ({}): {message}", GrpcStatus::from_u32(*.code))]
    Remote { code: u32, message: String },
}

impl ScribeError {
    /// Status reported by the remote endpoint, when this is a remote failure
    pub fn grpc_status(&self) -> Option<GrpcStatus> {
        match self {
            Self::Remote { code, .. } => Some(GrpcStatus::from_u32(*code)),
            _ => None,
        }
    }

    /// Whether this error came from the adapter rather than the protocol layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Failure reported by a transport adapter
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("error reading response body: {0}")]
    Body(String),

    #[error("server returned HTTP {0}")]
    HttpStatus(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport closed before the call finished")]
    Closed,
}
