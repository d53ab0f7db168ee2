//! gRPC-Web client implementation.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use scribe_core::{Frame, ScribeError, Trailer, TransportError};
use scribe_transport::{
    HttpProtocol, HyperTransport, Transport, TransportConfig, TransportEvent, TransportRequest,
};
use tokio::sync::{mpsc, Notify};
use tokio_stream::Stream;
use tracing::{debug, instrument};

use crate::call::{CallDriver, CallEvent};
use crate::observer::CallObserver;
use crate::streaming::{encode_request_stream, ReplyStream};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Headers merged into every request
    pub default_metadata: HeaderMap,
    /// Upper bound accepted for one decoded frame
    pub max_frame_len: usize,
    /// Queue depth between the call task and the caller
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_metadata: HeaderMap::new(),
            max_frame_len: u32::MAX as usize,
            event_channel_capacity: 32,
        }
    }
}

/// Complete reply to a call: data payloads in arrival order plus the trailer.
#[derive(Debug, Clone)]
pub struct RpcReply {
    pub messages: Vec<Bytes>,
    pub trailer: Trailer,
}

impl RpcReply {
    /// First data payload, for single-message replies.
    pub fn message(&self) -> Option<&Bytes> {
        self.messages.first()
    }

    pub fn into_messages(self) -> Vec<Bytes> {
        self.messages
    }
}

/// Handle that cancels an in-flight call.
///
/// Dropping the handle leaves the call running; only
/// [`cancel`](CallHandle::cancel) abandons it. Cancelling a call that
/// already finished is a no-op.
#[derive(Clone)]
pub struct CallHandle {
    cancel: Arc<Notify>,
}

impl CallHandle {
    /// Handle for a call that never started.
    fn finished() -> Self {
        Self {
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Request cancellation. The call fails with
    /// [`ScribeError::Cancelled`] unless it already reached a terminal
    /// state.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle").finish_non_exhaustive()
    }
}

/// gRPC-Web client.
///
/// # Examples
///
/// ```no_run
/// use scribe_client::ScribeClient;
/// use bytes::Bytes;
///
/// # async fn run() -> Result<(), scribe_core::ScribeError> {
/// let client = ScribeClient::new("http://localhost:8080")?;
/// let reply = client
///     .call("/api.v1.EchoService/Echo", Bytes::from_static(b"\x0a\x02hi"))
///     .await?;
/// println!("{} message(s)", reply.messages.len());
/// # Ok(())
/// # }
/// ```
pub struct ScribeClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl ScribeClient {
    /// Create a client over the default hyper adapter.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScribeError> {
        Ok(Self {
            transport: Arc::new(HyperTransport::new(base_url)?),
            config: ClientConfig::default(),
        })
    }

    /// Create a client over a caller-provided adapter.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: ClientConfig::default(),
        }
    }

    /// Create a builder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Make a call and collect the full reply.
    ///
    /// # Arguments
    /// * `path` - The service path (e.g. "/api.v1.DiceService/RollDice")
    /// * `request` - The encoded request message bytes
    ///
    /// # Returns
    /// Every data payload plus the trailer, or the first error.
    #[instrument(skip(self, request), fields(rpc.path = path, rpc.system = "grpc-web", otel.kind = "client"))]
    pub async fn call(&self, path: &str, request: Bytes) -> Result<RpcReply, ScribeError> {
        let (_handle, mut events) = self.start_call(path, request)?;
        collect_reply(&mut events).await
    }

    /// Make a call whose request is a stream of messages, concatenated
    /// into one body.
    #[instrument(skip(self, requests), fields(rpc.path = path, rpc.system = "grpc-web", rpc.streaming = "client", otel.kind = "client"))]
    pub async fn call_with_request_stream(
        &self,
        path: &str,
        requests: Pin<Box<dyn Stream<Item = Result<Bytes, ScribeError>> + Send>>,
    ) -> Result<RpcReply, ScribeError> {
        let body = encode_request_stream(requests).await?;
        let (_handle, mut events) = self.start_raw(path, body);
        collect_reply(&mut events).await
    }

    /// Start a call and consume reply payloads as a stream.
    ///
    /// The stream yields each data payload in order and ends after the
    /// trailer arrives; the trailer is then available through
    /// [`ReplyStream::trailer`]. Dropping the stream cancels the call.
    #[instrument(skip(self, request), fields(rpc.path = path, rpc.system = "grpc-web", rpc.streaming = "server", otel.kind = "client"))]
    pub fn call_streaming(&self, path: &str, request: Bytes) -> Result<ReplyStream, ScribeError> {
        let (handle, events) = self.start_call(path, request)?;
        Ok(ReplyStream::new(events, handle))
    }

    /// Start a call and receive events through callbacks.
    ///
    /// The observer sees zero or more payloads in byte-stream order, then
    /// exactly one completion or error.
    ///
    /// # Arguments
    /// * `path` - The service path
    /// * `request` - The encoded request message bytes
    /// * `observer` - Receives payloads and the terminal outcome
    ///
    /// # Returns
    /// A handle that cancels the call.
    #[instrument(skip(self, request, observer), fields(rpc.path = path, rpc.system = "grpc-web", otel.kind = "client"))]
    pub fn invoke<O>(&self, path: &str, request: Bytes, observer: O) -> CallHandle
    where
        O: CallObserver + Send + 'static,
    {
        let mut observer = observer;
        let (handle, mut events) = match self.start_call(path, request) {
            Ok(started) => started,
            Err(error) => {
                observer.on_error(error);
                return CallHandle::finished();
            }
        };

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    CallEvent::Message(payload) => observer.on_message(payload),
                    CallEvent::Completed(trailer) => observer.on_complete(trailer),
                    CallEvent::Failed(error) => observer.on_error(error),
                }
            }
        });

        handle
    }

    /// Frame the request message and start the call task.
    fn start_call(
        &self,
        path: &str,
        request: Bytes,
    ) -> Result<(CallHandle, mpsc::Receiver<CallEvent>), ScribeError> {
        let body = Frame::data(request).encode()?;
        Ok(self.start_raw(path, body))
    }

    /// Start the call task with an already-framed body.
    fn start_raw(&self, path: &str, body: Bytes) -> (CallHandle, mpsc::Receiver<CallEvent>) {
        let request = TransportRequest {
            path: path.to_string(),
            headers: self.config.default_metadata.clone(),
            body,
        };
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        let cancel = Arc::new(Notify::new());
        let driver = CallDriver::with_max_frame_len(self.config.max_frame_len);
        tokio::spawn(run_call(
            Arc::clone(&self.transport),
            request,
            driver,
            tx,
            Arc::clone(&cancel),
        ));
        (CallHandle { cancel }, rx)
    }
}

impl fmt::Debug for ScribeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScribeClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Drive one call: submit the request, relay adapter events through the
/// state machine, deliver call events in order.
async fn run_call(
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    mut driver: CallDriver,
    events: mpsc::Sender<CallEvent>,
    cancel: Arc<Notify>,
) {
    driver.begin();

    let mut stream = tokio::select! {
        _ = cancel.notified() => {
            driver.cancel();
            deliver(&mut driver, &events).await;
            return;
        }
        result = transport.send(request) => match result {
            Ok(stream) => stream,
            Err(error) => {
                driver.handle_event(TransportEvent::Error(error));
                deliver(&mut driver, &events).await;
                return;
            }
        },
    };
    driver.send_complete();

    loop {
        tokio::select! {
            _ = cancel.notified() => {
                debug!("call cancelled");
                driver.cancel();
            }
            event = stream.recv() => match event {
                Some(event) => driver.handle_event(event),
                // The adapter vanished without a terminal event
                None => driver.handle_event(TransportEvent::End { trailers: None }),
            },
        }

        if !deliver(&mut driver, &events).await {
            return; // Caller gone
        }
        if driver.is_terminal() {
            // Dropping the stream tears down the adapter task
            return;
        }
    }
}

/// Forward queued events; false when the receiver is gone.
async fn deliver(driver: &mut CallDriver, events: &mpsc::Sender<CallEvent>) -> bool {
    while let Some(event) = driver.poll_event() {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

async fn collect_reply(events: &mut mpsc::Receiver<CallEvent>) -> Result<RpcReply, ScribeError> {
    let mut messages = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            CallEvent::Message(payload) => messages.push(payload),
            CallEvent::Completed(trailer) => return Ok(RpcReply { messages, trailer }),
            CallEvent::Failed(error) => return Err(error),
        }
    }
    Err(ScribeError::Transport(TransportError::Closed))
}

/// Builder for configuring a Scribe client.
///
/// # Examples
///
/// ```no_run
/// use scribe_client::ScribeClient;
/// use scribe_transport::HttpProtocol;
/// use std::time::Duration;
///
/// # fn run() -> Result<(), scribe_core::ScribeError> {
/// let client = ScribeClient::builder()
///     .base_url("http://localhost:8080")
///     .http_protocol(HttpProtocol::Http2)
///     .request_timeout(Duration::from_secs(10))
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            transport: None,
            transport_config: TransportConfig::default(),
            config: ClientConfig::default(),
        }
    }

    /// Set the base URL for the default hyper adapter.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a caller-provided transport adapter instead of hyper.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the full adapter configuration.
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Set the HTTP protocol version for the default adapter.
    pub fn http_protocol(mut self, protocol: HttpProtocol) -> Self {
        self.transport_config.http_protocol = protocol;
        self
    }

    /// Set the whole-request timeout applied by the default adapter.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.transport_config.request_timeout = Some(timeout);
        self
    }

    /// Add a header sent with every call.
    pub fn metadata(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.default_metadata.append(name, value);
        self
    }

    /// Reject decoded frames whose declared length exceeds `limit`.
    pub fn max_frame_len(mut self, limit: usize) -> Self {
        self.config.max_frame_len = limit;
        self
    }

    /// Set the queue depth between the call task and the caller.
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.event_channel_capacity = capacity;
        self
    }

    /// Build the client.
    ///
    /// Fails when neither a base URL nor a transport was provided, or when
    /// the base URL does not parse.
    pub fn build(self) -> Result<ScribeClient, ScribeError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let base_url = self.base_url.ok_or_else(|| {
                    ScribeError::Transport(TransportError::InvalidUrl(
                        "base_url is required".to_string(),
                    ))
                })?;
                Arc::new(HyperTransport::with_config(base_url, self.transport_config)?)
            }
        };
        Ok(ScribeClient {
            transport,
            config: self.config,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
