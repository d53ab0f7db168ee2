//! Call state machine.
//!
//! [`CallDriver`] is a pure event translator: transport events go in, call
//! events come out, and no I/O happens inside. The async pump in
//! [`crate::client`] is a thin shell around it, so the same type can be
//! driven by any scheduler or by a test feeding byte chunks directly.

use std::collections::VecDeque;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use scribe_core::{Frame, FrameParser, ScribeError, Trailer};
use scribe_transport::TransportEvent;

/// Lifecycle of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Created, request not yet handed to the adapter
    Idle,
    /// Request submitted to the adapter
    Sending,
    /// Request fully sent, no response bytes yet
    AwaitingResponse,
    /// At least one response chunk received
    StreamingData,
    /// Terminal: trailer carried `grpc-status` 0
    Completed,
    /// Terminal: error, non-zero status, or cancellation
    Failed,
}

/// Event surfaced to the caller.
#[derive(Debug)]
pub enum CallEvent {
    /// One data frame payload, in byte-stream order
    Message(Bytes),
    /// Terminal success with the parsed trailer
    Completed(Trailer),
    /// Terminal failure
    Failed(ScribeError),
}

/// State machine for one gRPC-Web call.
///
/// Feed adapter activity through [`begin`](CallDriver::begin),
/// [`send_complete`](CallDriver::send_complete), and
/// [`handle_event`](CallDriver::handle_event), then drain the resulting
/// [`CallEvent`]s with [`poll_event`](CallDriver::poll_event). Exactly one
/// terminal event is ever queued; every input after that is ignored.
#[derive(Debug)]
pub struct CallDriver {
    state: CallState,
    parser: FrameParser,
    response_head: Option<HeaderMap>,
    events: VecDeque<CallEvent>,
}

impl CallDriver {
    pub fn new() -> Self {
        Self::with_max_frame_len(u32::MAX as usize)
    }

    /// Create a driver that rejects frames whose declared length exceeds
    /// `limit`.
    pub fn with_max_frame_len(limit: usize) -> Self {
        Self {
            state: CallState::Idle,
            parser: FrameParser::with_max_frame_len(limit),
            response_head: None,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, CallState::Completed | CallState::Failed)
    }

    /// The request bytes were handed to the adapter.
    pub fn begin(&mut self) {
        if self.state == CallState::Idle {
            self.state = CallState::Sending;
        }
    }

    /// The adapter confirmed the request was fully submitted.
    pub fn send_complete(&mut self) {
        if self.state == CallState::Sending {
            self.state = CallState::AwaitingResponse;
        }
    }

    /// Feed one adapter event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.is_terminal() {
            // Late events from a torn-down transport are dropped
            return;
        }
        match event {
            TransportEvent::Headers { status, headers } => self.on_headers(status, headers),
            TransportEvent::Data(chunk) => self.on_data(&chunk),
            TransportEvent::End { trailers } => self.on_end(trailers),
            TransportEvent::Error(error) => self.fail(ScribeError::Transport(error)),
        }
    }

    /// Abandon the call. No-op once a terminal event is queued.
    pub fn cancel(&mut self) {
        if !self.is_terminal() {
            self.fail(ScribeError::Cancelled);
        }
    }

    /// Next queued caller-facing event.
    pub fn poll_event(&mut self) -> Option<CallEvent> {
        self.events.pop_front()
    }

    fn on_headers(&mut self, status: StatusCode, headers: HeaderMap) {
        if !status.is_success() {
            self.fail(scribe_core::TransportError::HttpStatus(status.as_u16()).into());
            return;
        }
        // Kept around for trailers-only responses, where the status lives
        // in the response head instead of a TRAILER frame.
        self.response_head = Some(headers);
    }

    fn on_data(&mut self, chunk: &[u8]) {
        if self.state == CallState::AwaitingResponse {
            self.state = CallState::StreamingData;
        }
        self.parser.feed(chunk);
        self.drain_frames();
    }

    fn drain_frames(&mut self) {
        while !self.is_terminal() {
            match self.parser.parse_frame() {
                Ok(Some(frame)) => self.on_frame(frame),
                Ok(None) => break, // Need more data
                Err(error) => self.fail(error),
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        if frame.is_trailer() {
            match Trailer::parse(&frame.payload) {
                Ok(trailer) => self.finish(trailer),
                Err(error) => self.fail(error),
            }
        } else {
            self.events.push_back(CallEvent::Message(frame.payload));
        }
    }

    fn on_end(&mut self, trailers: Option<HeaderMap>) {
        if !self.parser.is_empty() {
            self.fail(ScribeError::MalformedFrame(format!(
                "stream ended with {} buffered bytes of an incomplete frame",
                self.parser.buffered_len()
            )));
            return;
        }
        match self.synthesize_trailer(trailers) {
            Ok(Some(trailer)) => self.finish(trailer),
            Ok(None) => self.fail(ScribeError::MalformedTrailer(
                "stream ended without grpc-status".to_string(),
            )),
            Err(error) => self.fail(error),
        }
    }

    /// Trailers-only fallback: HTTP trailers first, then the response head.
    fn synthesize_trailer(
        &self,
        trailers: Option<HeaderMap>,
    ) -> Result<Option<Trailer>, ScribeError> {
        if let Some(headers) = trailers.as_ref() {
            if let Some(trailer) = Trailer::from_headers(headers)? {
                return Ok(Some(trailer));
            }
        }
        match self.response_head.as_ref() {
            Some(headers) => Trailer::from_headers(headers),
            None => Ok(None),
        }
    }

    fn finish(&mut self, trailer: Trailer) {
        if trailer.is_ok() {
            self.state = CallState::Completed;
            self.events.push_back(CallEvent::Completed(trailer));
        } else {
            self.state = CallState::Failed;
            self.events.push_back(CallEvent::Failed(ScribeError::Remote {
                code: trailer.status_code,
                message: trailer.status_message,
            }));
        }
    }

    fn fail(&mut self, error: ScribeError) {
        self.state = CallState::Failed;
        self.events.push_back(CallEvent::Failed(error));
    }
}

impl Default for CallDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue};
    use scribe_core::TransportError;

    fn ok_headers() -> TransportEvent {
        TransportEvent::Headers {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    fn trailer_chunk(text: &str) -> Bytes {
        Frame::trailer(text.as_bytes().to_vec())
            .encode()
            .expect("encode trailer")
    }

    fn drain(driver: &mut CallDriver) -> Vec<CallEvent> {
        let mut events = Vec::new();
        while let Some(event) = driver.poll_event() {
            events.push(event);
        }
        events
    }

    fn started() -> CallDriver {
        let mut driver = CallDriver::new();
        driver.begin();
        driver.send_complete();
        driver.handle_event(ok_headers());
        driver
    }

    #[test]
    fn test_state_progression() {
        let mut driver = CallDriver::new();
        assert_eq!(driver.state(), CallState::Idle);

        driver.begin();
        assert_eq!(driver.state(), CallState::Sending);

        driver.send_complete();
        assert_eq!(driver.state(), CallState::AwaitingResponse);

        driver.handle_event(ok_headers());
        assert_eq!(driver.state(), CallState::AwaitingResponse);

        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[0x00])));
        assert_eq!(driver.state(), CallState::StreamingData);
    }

    #[test]
    fn test_unary_happy_path() {
        let mut driver = started();

        // DATA frame carrying "abc", then a TRAILER frame with status 0
        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x00, 0x03, 0x61, 0x62, 0x63,
        ])));
        let mut trailer_bytes = vec![0x80, 0x00, 0x00, 0x00, 0x10];
        trailer_bytes.extend_from_slice(b"grpc-status: 0\r\n");
        driver.handle_event(TransportEvent::Data(Bytes::from(trailer_bytes)));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], CallEvent::Message(payload) if payload.as_ref() == b"abc"));
        assert!(
            matches!(&events[1], CallEvent::Completed(trailer) if trailer.status_code == 0)
        );
        assert_eq!(driver.state(), CallState::Completed);
    }

    #[test]
    fn test_non_zero_status_fails_the_call() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Data(trailer_chunk(
            "grpc-status: 5\r\ngrpc-message: Not%20Found\r\n",
        )));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CallEvent::Failed(ScribeError::Remote { code, message }) => {
                assert_eq!(*code, 5);
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(driver.state(), CallState::Failed);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x00, 0x00, 0x00,
        ])));
        assert!(drain(&mut driver).is_empty());

        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x00, 0x03, 0x61, 0x62, 0x63,
        ])));
        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CallEvent::Message(payload) if payload.as_ref() == b"abc"));
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut driver = started();
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&Frame::data(Bytes::from_static(b"one")).encode().unwrap());
        chunk.extend_from_slice(&Frame::data(Bytes::from_static(b"two")).encode().unwrap());
        chunk.extend_from_slice(&trailer_chunk("grpc-status: 0\r\n"));
        driver.handle_event(TransportEvent::Data(Bytes::from(chunk)));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], CallEvent::Message(payload) if payload.as_ref() == b"one"));
        assert!(matches!(&events[1], CallEvent::Message(payload) if payload.as_ref() == b"two"));
        assert!(matches!(&events[2], CallEvent::Completed(_)));
    }

    #[test]
    fn test_data_after_trailer_is_dropped() {
        let mut driver = started();
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&trailer_chunk("grpc-status: 0\r\n"));
        chunk.extend_from_slice(&Frame::data(Bytes::from_static(b"late")).encode().unwrap());
        driver.handle_event(TransportEvent::Data(Bytes::from(chunk)));
        driver.handle_event(TransportEvent::Data(Bytes::from_static(b"noise")));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CallEvent::Completed(_)));
    }

    #[test]
    fn test_truncated_frame_at_stream_end() {
        let mut driver = started();
        // Header declares 10 payload bytes but only 3 ever arrive
        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x00, 0x0A, 0x61, 0x62, 0x63,
        ])));
        assert!(drain(&mut driver).is_empty());

        driver.handle_event(TransportEvent::End { trailers: None });
        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::MalformedFrame(_))
        ));
        assert_eq!(driver.state(), CallState::Failed);
    }

    #[test]
    fn test_end_without_status_is_malformed() {
        let mut driver = started();
        driver.handle_event(TransportEvent::End { trailers: None });

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::MalformedTrailer(_))
        ));
    }

    #[test]
    fn test_trailers_only_via_http_trailers() {
        let mut driver = started();
        let mut trailers = HeaderMap::new();
        trailers.insert(
            HeaderName::from_static("grpc-status"),
            HeaderValue::from_static("0"),
        );
        driver.handle_event(TransportEvent::End {
            trailers: Some(trailers),
        });

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CallEvent::Completed(trailer) if trailer.status_code == 0));
    }

    #[test]
    fn test_trailers_only_via_response_head() {
        let mut driver = CallDriver::new();
        driver.begin();
        driver.send_complete();

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("grpc-status"),
            HeaderValue::from_static("12"),
        );
        headers.insert(
            HeaderName::from_static("grpc-message"),
            HeaderValue::from_static("Unimplemented"),
        );
        driver.handle_event(TransportEvent::Headers {
            status: StatusCode::OK,
            headers,
        });
        driver.handle_event(TransportEvent::End { trailers: None });

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        match &events[0] {
            CallEvent::Failed(ScribeError::Remote { code, message }) => {
                assert_eq!(*code, 12);
                assert_eq!(message, "Unimplemented");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_http_error_status_fails_immediately() {
        let mut driver = CallDriver::new();
        driver.begin();
        driver.send_complete();
        driver.handle_event(TransportEvent::Headers {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers: HeaderMap::new(),
        });

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::Transport(TransportError::HttpStatus(503)))
        ));

        // Any body the server streamed alongside the error is ignored
        driver.handle_event(TransportEvent::Data(Bytes::from_static(b"ignored")));
        assert!(drain(&mut driver).is_empty());
    }

    #[test]
    fn test_transport_error_fails_the_call() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Error(TransportError::Timeout));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::Transport(TransportError::Timeout))
        ));
    }

    #[test]
    fn test_cancel_suppresses_later_events() {
        let mut driver = CallDriver::new();
        driver.begin();
        driver.cancel();
        assert_eq!(driver.state(), CallState::Failed);

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CallEvent::Failed(ScribeError::Cancelled)));

        // Chunks that were already in flight produce nothing
        driver.handle_event(ok_headers());
        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x00, 0x03, 0x61, 0x62, 0x63,
        ])));
        driver.handle_event(TransportEvent::End { trailers: None });
        assert!(drain(&mut driver).is_empty());
    }

    #[test]
    fn test_cancel_after_terminal_is_noop() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Data(trailer_chunk("grpc-status: 0\r\n")));
        driver.cancel();

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CallEvent::Completed(_)));
        assert_eq!(driver.state(), CallState::Completed);
    }

    #[test]
    fn test_malformed_trailer_payload() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Data(trailer_chunk("no colon here")));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::MalformedTrailer(_))
        ));
    }

    #[test]
    fn test_reserved_flag_bits_fail_the_call() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x41, 0x00, 0x00, 0x00, 0x00,
        ])));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut driver = CallDriver::with_max_frame_len(8);
        driver.begin();
        driver.send_complete();
        driver.handle_event(ok_headers());
        driver.handle_event(TransportEvent::Data(Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x00, 0x09,
        ])));

        let events = drain(&mut driver);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            CallEvent::Failed(ScribeError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_trailer_metadata_passed_through() {
        let mut driver = started();
        driver.handle_event(TransportEvent::Data(trailer_chunk(
            "grpc-status: 0\r\nx-trace-id: abc123\r\n",
        )));

        let events = drain(&mut driver);
        match &events[0] {
            CallEvent::Completed(trailer) => {
                assert_eq!(
                    trailer.metadata.get("x-trace-id").map(|v| v.as_bytes()),
                    Some(b"abc123".as_ref())
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
