//! Client SDK for Scribe gRPC-Web calls.
//!
//! This crate provides the call layer on top of `scribe-core` and
//! `scribe-transport`:
//! - A sans-IO state machine that turns transport events into call events
//! - A client with async, streaming, and callback call surfaces
//! - Cancellation handles and per-call configuration

pub mod call;
pub mod client;
pub mod observer;
pub mod streaming;

pub use call::{CallDriver, CallEvent, CallState};
pub use client::{CallHandle, ClientBuilder, ClientConfig, RpcReply, ScribeClient};
pub use observer::{CallObserver, FnObserver};
pub use streaming::{encode_request_stream, ReplyStream};
