//! Shared connection interface.
//!
//! A [`Transport`] is the multiplexer's view of one reconnecting, bidirectional
//! text connection: an outbound queue that never blocks, and an inbound event
//! channel that yields raw messages until a terminal [`TransportEvent::Closed`].
//! Reconnection happens behind this interface; the multiplexer only sees the
//! final close.
//!
//! [`pair`] builds an in-memory transport together with the [`Endpoint`] that
//! a socket adapter (or a test) drives from the other side.

use crate::error::{Error, Result};
use tokio::sync::mpsc;

/// Inbound event from the shared connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw inbound message
    Message(String),
    /// Connection gave up; carries the close reason
    Closed(String),
}

/// Multiplexer side of the shared connection
pub struct Transport {
    pub(crate) outgoing: mpsc::UnboundedSender<String>,
    pub(crate) events: mpsc::Receiver<TransportEvent>,
}

impl Transport {
    /// Wrap an outbound queue and an inbound event channel
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self { outgoing, events }
    }
}

/// Socket side of the shared connection
pub struct Endpoint {
    incoming: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<TransportEvent>,
}

impl Endpoint {
    /// Deliver a raw message to the multiplexer
    pub async fn deliver(&self, raw: impl Into<String>) -> Result<()> {
        self.events
            .send(TransportEvent::Message(raw.into()))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Signal the terminal close of the connection
    pub async fn close(&self, reason: impl Into<String>) -> Result<()> {
        self.events
            .send(TransportEvent::Closed(reason.into()))
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Receive the next raw message written by the multiplexer
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Receive a raw message if one is already queued
    pub fn try_recv(&mut self) -> Option<String> {
        self.incoming.try_recv().ok()
    }
}

/// Create an in-memory transport and its socket-side endpoint
///
/// `capacity` bounds the inbound event queue.
pub fn pair(capacity: usize) -> (Transport, Endpoint) {
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::channel(capacity);

    (
        Transport::new(outgoing_tx, events_rx),
        Endpoint {
            incoming: outgoing_rx,
            events: events_tx,
        },
    )
}
