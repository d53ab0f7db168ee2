//! HTTP adapter over hyper's pooled legacy client.
//!
//! Issues gRPC-Web POST requests and converts each hyper response into the
//! [`TransportEvent`] stream the call layer consumes.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use scribe_core::TransportError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{BoxFuture, EventStream, Transport, TransportEvent, TransportRequest};

/// Content type for binary-proto gRPC-Web
pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";

/// HTTP protocol version preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpProtocol {
    /// HTTP/1.1 only
    Http1,
    /// HTTP/2 only, for proxies that speak h2c
    Http2,
    /// Automatically negotiate (default)
    Auto,
}

impl Default for HttpProtocol {
    fn default() -> Self {
        Self::Auto
    }
}

/// Adapter configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// HTTP protocol version
    pub http_protocol: HttpProtocol,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Max idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Whole-request deadline; expiry surfaces as a timeout transport error
    pub request_timeout: Option<Duration>,
    /// Value sent in the user-agent header
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            http_protocol: HttpProtocol::Auto,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            request_timeout: None,
            user_agent: concat!("scribe/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Transport adapter backed by hyper
pub struct HyperTransport {
    base_uri: Uri,
    client: Client<HttpConnector, Full<Bytes>>,
    config: TransportConfig,
}

impl HyperTransport {
    /// Create an adapter for the given endpoint
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_config(base_url, TransportConfig::default())
    }

    /// Create an adapter with custom configuration
    pub fn with_config(
        base_url: impl Into<String>,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        let base_uri: Uri = base_url
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_uri.scheme().is_none() || base_uri.authority().is_none() {
            return Err(TransportError::InvalidUrl(format!(
                "{base_url}: scheme and authority are required"
            )));
        }

        let client = Self::build_client(&config);
        Ok(Self {
            base_uri,
            client,
            config,
        })
    }

    /// Build an HTTP client based on configuration
    fn build_client(config: &TransportConfig) -> Client<HttpConnector, Full<Bytes>> {
        let mut builder = Client::builder(TokioExecutor::new());

        builder.pool_idle_timeout(config.pool_idle_timeout.unwrap_or(Duration::from_secs(90)));
        builder.pool_max_idle_per_host(config.pool_max_idle_per_host);

        match config.http_protocol {
            HttpProtocol::Http1 => {
                builder.http2_only(false);
            }
            HttpProtocol::Http2 => {
                builder.http2_only(true);
            }
            HttpProtocol::Auto => {}
        }

        builder.build_http()
    }

    fn request_uri(&self, path: &str) -> Result<Uri, TransportError> {
        let base = self.base_uri.to_string();
        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        joined
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
    }

    fn build_request(
        &self,
        request: &TransportRequest,
    ) -> Result<Request<Full<Bytes>>, TransportError> {
        let uri = self.request_uri(&request.path)?;
        let mut req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, GRPC_WEB_CONTENT_TYPE)
            .header(ACCEPT, GRPC_WEB_CONTENT_TYPE)
            .header("x-grpc-web", "1")
            .header(USER_AGENT, self.config.user_agent.as_str())
            .body(Full::new(request.body.clone()))
            .map_err(|e| TransportError::Request(e.to_string()))?;
        req.headers_mut().extend(request.headers.clone());
        Ok(req)
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<Result<EventStream, TransportError>> {
        let client = self.client.clone();
        let timeout = self.config.request_timeout;
        let built = self.build_request(&request);

        Box::pin(async move {
            let req = built?;
            debug!(path = %request.path, body_len = request.body.len(), "sending grpc-web request");

            let (tx, rx) = mpsc::channel(16);
            let task = tokio::spawn(async move {
                match timeout {
                    Some(limit) => {
                        let run = run_request(client, req, tx.clone());
                        if tokio::time::timeout(limit, run).await.is_err() {
                            warn!("grpc-web request timed out after {limit:?}");
                            let _ = tx.send(TransportEvent::Error(TransportError::Timeout)).await;
                        }
                    }
                    None => run_request(client, req, tx).await,
                }
            });
            Ok(EventStream::with_task(rx, task))
        })
    }
}

/// Drive one HTTP exchange, translating it into transport events
async fn run_request(
    client: Client<HttpConnector, Full<Bytes>>,
    req: Request<Full<Bytes>>,
    tx: mpsc::Sender<TransportEvent>,
) {
    let resp = match client.request(req).await {
        Ok(resp) => resp,
        Err(e) => {
            let _ = tx
                .send(TransportEvent::Error(TransportError::Connect(e.to_string())))
                .await;
            return;
        }
    };

    let (parts, mut body) = resp.into_parts();
    debug!(status = %parts.status, "response head received");
    if tx
        .send(TransportEvent::Headers {
            status: parts.status,
            headers: parts.headers,
        })
        .await
        .is_err()
    {
        return; // Receiver gone
    }

    let mut trailers = None;
    loop {
        match body.frame().await {
            Some(Ok(frame)) => match frame.into_data() {
                Ok(data) => {
                    if tx.send(TransportEvent::Data(data)).await.is_err() {
                        return;
                    }
                }
                Err(frame) => {
                    if let Ok(map) = frame.into_trailers() {
                        trailers = Some(map);
                    }
                }
            },
            Some(Err(e)) => {
                let _ = tx
                    .send(TransportEvent::Error(TransportError::Body(e.to_string())))
                    .await;
                return;
            }
            None => {
                let _ = tx.send(TransportEvent::End { trailers }).await;
                return;
            }
        }
    }
}
