//! Callback surface for event-driven calls.

use bytes::Bytes;
use scribe_core::{ScribeError, Trailer};

/// Receives the events of one call.
///
/// Zero or more [`on_message`](CallObserver::on_message) calls arrive in
/// byte-stream order, followed by exactly one
/// [`on_complete`](CallObserver::on_complete) or
/// [`on_error`](CallObserver::on_error).
pub trait CallObserver {
    /// One data frame payload.
    fn on_message(&mut self, payload: Bytes);

    /// Terminal success with the parsed trailer.
    fn on_complete(&mut self, trailer: Trailer);

    /// Terminal failure.
    fn on_error(&mut self, error: ScribeError);
}

/// Observer assembled from three closures.
pub struct FnObserver<M, C, E> {
    on_message: M,
    on_complete: C,
    on_error: E,
}

impl<M, C, E> FnObserver<M, C, E>
where
    M: FnMut(Bytes),
    C: FnMut(Trailer),
    E: FnMut(ScribeError),
{
    pub fn new(on_message: M, on_complete: C, on_error: E) -> Self {
        Self {
            on_message,
            on_complete,
            on_error,
        }
    }
}

impl<M, C, E> CallObserver for FnObserver<M, C, E>
where
    M: FnMut(Bytes),
    C: FnMut(Trailer),
    E: FnMut(ScribeError),
{
    fn on_message(&mut self, payload: Bytes) {
        (self.on_message)(payload);
    }

    fn on_complete(&mut self, trailer: Trailer) {
        (self.on_complete)(trailer);
    }

    fn on_error(&mut self, error: ScribeError) {
        (self.on_error)(error);
    }
}
