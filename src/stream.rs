use crate::connection::Registry;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, StreamId};
use crate::reply::{Reply, Status, STATUS_CANCELLED};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

type DataListener = Box<dyn FnMut(&Value) + Send>;
type CompletionListener = Box<dyn FnOnce(Reply) + Send>;

/// Stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Registered, receiving data
    Open,
    /// Terminal result delivered
    Completed,
}

#[derive(Default)]
struct Listeners {
    data: Vec<DataListener>,
    completion: Vec<CompletionListener>,

    /// A broadcast is running; new payloads queue in `pending`
    dispatching: bool,

    /// Payloads that arrived during a broadcast, in arrival order
    pending: VecDeque<Value>,
}

/// Stream record shared by the registry and every handle
pub(crate) struct StreamInner {
    id: StreamId,
    method: String,

    /// Terminal result. Setting it is the one `Open -> Completed` transition;
    /// only the first writer wins.
    result: OnceLock<Reply>,

    /// Woken once the terminal result is set
    done: Notify,

    listeners: Mutex<Listeners>,

    /// Outbound queue of the shared connection
    outgoing: mpsc::UnboundedSender<String>,

    /// Owning registry, for deregistration on completion
    registry: Weak<Registry>,
}

impl StreamInner {
    pub(crate) fn new(
        id: StreamId,
        method: String,
        outgoing: mpsc::UnboundedSender<String>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id,
            method,
            result: OnceLock::new(),
            done: Notify::new(),
            listeners: Mutex::new(Listeners::default()),
            outgoing,
            registry,
        }
    }

    fn is_completed(&self) -> bool {
        self.result.get().is_some()
    }

    /// Invoke every data listener with `payload`, in registration order
    ///
    /// One broadcast runs at a time per stream. A payload delivered while a
    /// broadcast is running (from a listener, or from another thread) is
    /// queued and broadcast by the running call once it finishes, so arrival
    /// order is kept.
    pub(crate) fn deliver(&self, payload: &Value) {
        if self.is_completed() {
            trace!("Dropping data for completed stream id={}", self.id);
            return;
        }

        {
            let mut listeners = self.listeners.lock();
            if listeners.dispatching {
                trace!(
                    "Queueing data for stream id={} behind running broadcast",
                    self.id
                );
                listeners.pending.push_back(payload.clone());
                return;
            }
            listeners.dispatching = true;
        }

        self.broadcast(payload);

        loop {
            let next = {
                let mut listeners = self.listeners.lock();
                let next = if self.is_completed() {
                    listeners.pending.clear();
                    None
                } else {
                    listeners.pending.pop_front()
                };
                if next.is_none() {
                    listeners.dispatching = false;
                }
                next
            };

            match next {
                Some(payload) => self.broadcast(&payload),
                None => return,
            }
        }
    }

    /// Run the data listeners once
    ///
    /// The listener list is taken out while it runs, so listeners may register
    /// further listeners, send, or cancel the stream.
    fn broadcast(&self, payload: &Value) {
        let mut taken = std::mem::take(&mut self.listeners.lock().data);
        for listener in taken.iter_mut() {
            if self.is_completed() {
                break;
            }
            listener(payload);
        }

        let mut listeners = self.listeners.lock();
        if self.is_completed() {
            listeners.data.clear();
            return;
        }
        // Keep registration order: earlier listeners first, then any added meanwhile
        taken.append(&mut listeners.data);
        listeners.data = taken;
    }

    /// Complete the stream with `reply`
    ///
    /// Returns false if the stream had already completed; the later result is
    /// discarded.
    pub(crate) fn finish(&self, reply: Reply) -> bool {
        if self.result.set(reply).is_err() {
            trace!("Stream id={} already completed, ignoring result", self.id);
            return false;
        }
        let Some(reply) = self.result.get() else {
            return false;
        };
        self.done.notify_waiters();

        let completion = {
            let mut listeners = self.listeners.lock();
            listeners.data.clear();
            listeners.pending.clear();
            std::mem::take(&mut listeners.completion)
        };

        debug!(
            "Stream id={} method={} completed (ok={}), notifying {} listener(s)",
            self.id,
            self.method,
            reply.is_ok(),
            completion.len()
        );

        for listener in completion {
            listener(reply.clone());
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }

        true
    }

    fn write(&self, message: ClientMessage) -> Result<()> {
        let raw = message.encode()?;
        self.outgoing
            .send(raw)
            .map_err(|_| Error::ConnectionClosed)?;
        trace!(
            "Sent message id={} method={}",
            message.request_id,
            message.method
        );
        Ok(())
    }
}

/// Handle to one logical stream on a shared connection
///
/// Cheap to clone; clones share the same stream record.
#[derive(Clone)]
pub struct StreamHandle {
    inner: Arc<StreamInner>,
}

impl StreamHandle {
    pub(crate) fn new(inner: Arc<StreamInner>) -> Self {
        Self { inner }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    /// Get the method tag used for data messages
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Get current stream state
    pub fn state(&self) -> StreamState {
        if self.inner.is_completed() {
            StreamState::Completed
        } else {
            StreamState::Open
        }
    }

    /// Check if the terminal result has been delivered
    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    /// Terminal result, once delivered
    pub fn result(&self) -> Option<Reply> {
        self.inner.result.get().cloned()
    }

    /// Send a data message tagged with this stream's id and method
    ///
    /// Fails with [`Error::StreamCompleted`] once the stream has completed.
    pub fn send(&self, payload: Value) -> Result<()> {
        if self.inner.is_completed() {
            return Err(Error::StreamCompleted(self.inner.id));
        }
        self.inner.write(ClientMessage::new(
            self.inner.id,
            self.inner.method.clone(),
            payload,
        ))
    }

    /// Tell the remote peer this side is done producing
    ///
    /// The local stream stays open until the peer's own completion arrives.
    pub fn complete(&self, end: &Reply) -> Result<()> {
        if self.inner.is_completed() {
            return Err(Error::StreamCompleted(self.inner.id));
        }
        self.inner.write(ClientMessage::complete(self.inner.id, end.to_wire()))
    }

    /// Register a data listener
    ///
    /// Listeners are invoked in registration order. Registering on a
    /// completed stream is a no-op.
    pub fn on_data<F>(&self, listener: F)
    where
        F: FnMut(&Value) + Send + 'static,
    {
        let mut listeners = self.inner.listeners.lock();
        if self.inner.is_completed() {
            trace!("on_data after completion of stream id={}", self.inner.id);
            return;
        }
        listeners.data.push(Box::new(listener));
    }

    /// Register a completion listener
    ///
    /// Invoked exactly once with the terminal result. A listener registered
    /// after the result was delivered never fires.
    pub fn on_completion<F>(&self, listener: F)
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let mut listeners = self.inner.listeners.lock();
        if self.inner.is_completed() {
            trace!(
                "on_completion after completion of stream id={}",
                self.inner.id
            );
            return;
        }
        listeners.completion.push(Box::new(listener));
    }

    /// Wait for the terminal result
    ///
    /// Returns immediately if the stream has already completed. Registers no
    /// listener, so dropping the future leaves nothing behind.
    pub async fn completion(&self) -> Reply {
        loop {
            // Created before the check so a completion in between still wakes us
            let notified = self.inner.done.notified();
            if let Some(reply) = self.result() {
                return reply;
            }
            notified.await;
        }
    }

    /// Tear the stream down locally
    ///
    /// Completion listeners receive a `cancelled` failure and the stream is
    /// deregistered. Nothing is sent to the peer. Returns false if the stream
    /// had already completed.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.inner.finish(Reply::Err(Status::new(STATUS_CANCELLED, reason)))
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("state", &self.state())
            .finish()
    }
}
