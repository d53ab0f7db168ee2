//! Wire format for the Scribe gRPC-Web client.
//!
//! This crate implements the protocol layer by hand, with no protobuf code
//! generation:
//! - Base-128 varints
//! - gRPC-Web message framing and incremental frame assembly
//! - Trailer parsing and canonical status codes
//! - Schema-free protobuf field encoding

pub mod error;
pub mod framing;
pub mod proto;
pub mod status;
pub mod trailer;
pub mod varint;

pub use error::{ScribeError, TransportError};
pub use framing::{decode_frame, Frame, FrameKind, FrameParser, FRAME_HEADER_LEN, TRAILER_FLAG};
pub use proto::{
    decode_length_prefixed, encode_length_prefixed, FieldReader, MessageWriter, WireType,
};
pub use status::GrpcStatus;
pub use trailer::{Trailer, GRPC_MESSAGE, GRPC_STATUS};
