use crate::error::{Error, Result};
use crate::protocol::{ServerMessage, StreamId};
use crate::reply::{err_status, Reply, Status, STATUS_MALFORMED};
use crate::sequence::IdSequence;
use crate::stream::{StreamHandle, StreamInner};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct RegistryState {
    streams: HashMap<StreamId, Arc<StreamInner>>,
    closed: bool,
}

/// Open streams keyed by id
///
/// Opening inserts, completion erases. Once closed, nothing can be inserted.
#[derive(Default)]
pub(crate) struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub(crate) fn remove(&self, id: StreamId) {
        if self.state.lock().streams.remove(&id).is_some() {
            trace!("Removed completed stream id={}", id);
        }
    }

    fn get(&self, id: StreamId) -> Option<Arc<StreamInner>> {
        self.state.lock().streams.get(&id).cloned()
    }
}

/// Connection multiplexes streams over one shared transport
///
/// Routes every inbound message to the stream that owns its id, and fails
/// every open stream when the transport closes.
pub struct Connection {
    /// Active streams (id -> Stream)
    registry: Arc<Registry>,

    /// Identifier source for new streams
    ids: Arc<dyn IdSequence>,

    /// Outbound queue of the shared transport
    outgoing: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Create a connection writing to `outgoing`
    pub fn new(outgoing: mpsc::UnboundedSender<String>, ids: Arc<dyn IdSequence>) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            ids,
            outgoing,
        }
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        !self.registry.state.lock().closed
    }

    /// Open a new stream whose data messages are tagged `method`
    pub fn open(&self, method: impl Into<String>) -> Result<StreamHandle> {
        let method = method.into();
        let mut state = self.registry.state.lock();
        if state.closed {
            return Err(Error::ConnectionClosed);
        }

        let id = self.ids.next();
        let inner = Arc::new(StreamInner::new(
            id,
            method,
            self.outgoing.clone(),
            Arc::downgrade(&self.registry),
        ));
        state.streams.insert(id, inner.clone());
        drop(state);

        let handle = StreamHandle::new(inner);
        debug!("Opened stream id={} method={}", id, handle.method());
        Ok(handle)
    }

    /// Route one raw inbound message
    ///
    /// Messages for ids that are not open are ignored. Decode failures are
    /// returned to the caller; no stream is touched.
    pub fn handle_message(&self, raw: &str) -> Result<()> {
        let message = ServerMessage::decode(raw)?;
        let id = message.request_id;

        let Some(stream) = self.registry.get(id) else {
            trace!("Ignoring message for unknown stream id={}", id);
            return Ok(());
        };

        if message.is_complete() {
            let reply = Reply::from_wire(&message.reply).unwrap_or_else(|e| {
                warn!("Malformed completion reply for stream id={}: {}", id, e);
                Reply::Err(Status::new(
                    STATUS_MALFORMED,
                    format!("malformed completion reply: {}", e),
                ))
            });
            stream.finish(reply);
        } else {
            trace!("Routing data message to stream id={}", id);
            stream.deliver(&message.reply);
        }

        Ok(())
    }

    /// Fail every open stream with `reason`
    ///
    /// Returns the number of streams that were failed. Later calls are no-ops.
    pub fn handle_close(&self, reason: &str) -> usize {
        let streams: Vec<_> = {
            let mut state = self.registry.state.lock();
            if state.closed {
                trace!("Connection already closed, ignoring close: {}", reason);
                return 0;
            }
            state.closed = true;
            state.streams.drain().map(|(_, stream)| stream).collect()
        };

        let mut failed = 0;
        for stream in streams {
            if stream.finish(err_status(reason)) {
                failed += 1;
            }
        }

        debug!(
            "Connection closed ({}), failed {} open stream(s)",
            reason, failed
        );
        failed
    }

    /// Get the number of open streams
    pub fn stream_count(&self) -> usize {
        self.registry.state.lock().streams.len()
    }
}
