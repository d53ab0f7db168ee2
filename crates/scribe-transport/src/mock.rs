//! Scripted in-memory transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use scribe_core::TransportError;
use tokio::sync::mpsc;

use crate::{BoxFuture, EventStream, Transport, TransportEvent, TransportRequest};

struct Script {
    events: Vec<TransportEvent>,
    hold_open: bool,
}

/// In-memory transport that replays scripted event sequences.
///
/// Each `send` consumes the next script in queue order and records the
/// request for later assertions. A held-open script delivers its events and
/// then stalls until the stream is cancelled or dropped, which models a
/// server that never finishes.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<TransportRequest>>,
    open_senders: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response script
    pub fn script(&self, events: Vec<TransportEvent>) {
        self.scripts.lock().unwrap().push_back(Script {
            events,
            hold_open: false,
        });
    }

    /// Queue a script that stays open after its events instead of ending
    pub fn script_held_open(&self, events: Vec<TransportEvent>) {
        self.scripts.lock().unwrap().push_back(Script {
            events,
            hold_open: true,
        });
    }

    /// Requests observed so far
    pub fn sent(&self) -> Vec<TransportRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Push a late event into the most recent held-open stream.
    ///
    /// Returns false when that stream refuses it (cancelled or dropped).
    pub fn push_late_event(&self, event: TransportEvent) -> bool {
        let senders = self.open_senders.lock().unwrap();
        match senders.last() {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<Result<EventStream, TransportError>> {
        self.sent.lock().unwrap().push(request);

        let script = self.scripts.lock().unwrap().pop_front();
        let result = match script {
            Some(script) => {
                let capacity = script.events.len().max(1) + 1;
                let (tx, stream) = EventStream::channel(capacity);
                for event in script.events {
                    let _ = tx.try_send(event);
                }
                if script.hold_open {
                    self.open_senders.lock().unwrap().push(tx);
                }
                Ok(stream)
            }
            None => Err(TransportError::Connect(
                "no scripted response".to_string(),
            )),
        };

        Box::pin(async move { result })
    }
}
