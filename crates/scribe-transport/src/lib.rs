//! Transport adapters for the Scribe gRPC-Web client.
//!
//! The call layer consumes the [`Transport`] contract and performs no I/O of
//! its own. This crate provides:
//! - The adapter contract: [`Transport`], [`TransportRequest`], [`TransportEvent`]
//! - A hyper-backed HTTP adapter
//! - A scripted in-memory adapter for tests

pub mod hyper;
pub mod mock;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use scribe_core::TransportError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use crate::hyper::{HttpProtocol, HyperTransport, TransportConfig, GRPC_WEB_CONTENT_TYPE};
pub use crate::mock::MockTransport;

/// Boxed future used by the object-safe transport contract
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One request handed to an adapter
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Service path, e.g. "/pkg.v1.Service/Method"
    pub path: String,
    /// Extra headers merged over the adapter's defaults
    pub headers: HeaderMap,
    /// Encoded request frame bytes
    pub body: Bytes,
}

impl TransportRequest {
    pub fn new(path: impl Into<String>, body: Bytes) -> Self {
        Self {
            path: path.into(),
            headers: HeaderMap::new(),
            body,
        }
    }
}

/// One event observed on a response stream.
///
/// An adapter delivers at most one `Headers` event, then zero or more `Data`
/// events in arrival order, then exactly one terminal `End` or `Error`.
#[derive(Debug)]
pub enum TransportEvent {
    /// Response head
    Headers {
        status: StatusCode,
        headers: HeaderMap,
    },
    /// Response body chunk
    Data(Bytes),
    /// Graceful end of the stream, with HTTP trailers when present
    End { trailers: Option<HeaderMap> },
    /// Terminal transport failure
    Error(TransportError),
}

/// Ordered stream of response events for one request
pub struct EventStream {
    rx: mpsc::Receiver<TransportEvent>,
    task: Option<JoinHandle<()>>,
}

impl EventStream {
    /// Build a stream from a receiver, detached from any producer task
    pub fn new(rx: mpsc::Receiver<TransportEvent>) -> Self {
        Self { rx, task: None }
    }

    /// Build a stream whose producer task is aborted on cancel or drop
    pub fn with_task(rx: mpsc::Receiver<TransportEvent>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Create a sender/stream pair, for adapters and tests
    pub fn channel(capacity: usize) -> (mpsc::Sender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the producer is gone and the channel is drained.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Best-effort cancellation: abort the producer and refuse new events.
    ///
    /// Events already queued may still be received; terminal calls drop them
    /// as no-ops.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Contract the call layer requires from an HTTP capability
pub trait Transport: Send + Sync + 'static {
    /// Begin a request.
    ///
    /// The resolved future confirms the request was handed off; response
    /// events follow on the returned stream.
    fn send(&self, request: TransportRequest) -> BoxFuture<Result<EventStream, TransportError>>;
}
