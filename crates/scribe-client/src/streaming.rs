//! Streaming call support.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use scribe_core::{Frame, ScribeError, Trailer};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};

use crate::call::CallEvent;
use crate::client::CallHandle;

/// Encode a stream of request messages into one body of concatenated data
/// frames. The end of the HTTP request body marks the end of the stream;
/// no terminator frame is appended.
pub async fn encode_request_stream(
    mut stream: Pin<Box<dyn Stream<Item = Result<Bytes, ScribeError>> + Send>>,
) -> Result<Bytes, ScribeError> {
    let mut encoded = Vec::new();
    while let Some(result) = stream.next().await {
        let message = result?;
        let frame = Frame::data(message).encode()?;
        encoded.extend_from_slice(&frame);
    }
    Ok(Bytes::from(encoded))
}

/// Streamed reply: data payloads as they arrive, trailer afterwards.
///
/// Yields `Ok(payload)` for each data frame and `Err` once if the call
/// fails; a successful call ends the stream and stores the trailer.
/// Dropping the stream cancels the call.
pub struct ReplyStream {
    events: mpsc::Receiver<CallEvent>,
    handle: CallHandle,
    trailer: Option<Trailer>,
    done: bool,
}

impl ReplyStream {
    pub(crate) fn new(events: mpsc::Receiver<CallEvent>, handle: CallHandle) -> Self {
        Self {
            events,
            handle,
            trailer: None,
            done: false,
        }
    }

    /// Trailer of the completed call, present after the stream ends
    /// successfully.
    pub fn trailer(&self) -> Option<&Trailer> {
        self.trailer.as_ref()
    }

    /// Handle that cancels the underlying call.
    pub fn handle(&self) -> CallHandle {
        self.handle.clone()
    }

    /// Cancel the underlying call.
    pub fn cancel(&self) {
        self.handle.cancel();
    }
}

impl Stream for ReplyStream {
    type Item = Result<Bytes, ScribeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.events.poll_recv(cx) {
            Poll::Ready(Some(CallEvent::Message(payload))) => Poll::Ready(Some(Ok(payload))),
            Poll::Ready(Some(CallEvent::Completed(trailer))) => {
                self.trailer = Some(trailer);
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(CallEvent::Failed(error))) => {
                self.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                // Call task gone without a terminal event
                self.done = true;
                Poll::Ready(Some(Err(ScribeError::Transport(
                    scribe_core::TransportError::Closed,
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ReplyStream {
    fn drop(&mut self) {
        // Nobody can observe further events, so abandon the call
        self.handle.cancel();
    }
}
