use crate::config::Config;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::sequence::{IdSequence, Sequential};
use crate::stream::StreamHandle;
use crate::transport::{Transport, TransportEvent};
use crate::typed::{BidiStream, ServerStream};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// StreamManager drives stream multiplexing over one transport
///
/// Owns the [`Connection`] registry and a background reader task that feeds
/// it transport events. Must be created inside a tokio runtime.
pub struct StreamManager {
    /// Stream registry and dispatch
    connection: Arc<Connection>,

    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl StreamManager {
    /// Create a new stream manager with default settings
    pub fn new(transport: Transport) -> Self {
        Self::with_config(transport, Config::default())
    }

    /// Create a new stream manager with its own identifier sequence
    pub fn with_config(transport: Transport, config: Config) -> Self {
        let ids = Arc::new(Sequential::new(config.first_request_id));
        Self::with_sequence(transport, config, ids)
    }

    /// Create a new stream manager drawing identifiers from `ids`
    ///
    /// Share one sequence between managers to keep ids unique process-wide.
    pub fn with_sequence(transport: Transport, config: Config, ids: Arc<dyn IdSequence>) -> Self {
        let Transport { outgoing, events } = transport;
        let connection = Arc::new(Connection::new(outgoing, ids));
        let cancel = CancellationToken::new();

        // Spawn background reader task
        let conn = connection.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            reader_task(events, conn, token, config).await;
        });

        Self { connection, cancel }
    }

    /// Open a raw stream tagged `method`
    pub fn open(&self, method: impl Into<String>) -> Result<StreamHandle> {
        if self.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.connection.open(method)
    }

    /// Open a typed bidirectional stream
    pub fn open_bidi<C, S>(&self, method: impl Into<String>) -> Result<BidiStream<C, S>>
    where
        C: Serialize,
        S: DeserializeOwned + 'static,
    {
        self.open(method).map(BidiStream::new)
    }

    /// Open a typed server stream by sending its single request
    pub fn open_server_stream<C, S>(
        &self,
        method: impl Into<String>,
        request: &C,
    ) -> Result<ServerStream<S>>
    where
        C: Serialize,
        S: DeserializeOwned + 'static,
    {
        ServerStream::start(self.open(method)?, request)
    }

    /// The underlying registry
    pub fn connection(&self) -> Arc<Connection> {
        self.connection.clone()
    }

    /// Check if the transport is still usable
    pub fn is_alive(&self) -> bool {
        self.connection.is_alive() && !self.cancel.is_cancelled()
    }

    /// Get the number of open streams
    pub fn stream_count(&self) -> usize {
        self.connection.stream_count()
    }

    /// Shut down: stop the reader task and fail every open stream
    pub fn close(&self) {
        self.cancel.cancel();
        debug!("StreamManager closing");
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background reader task
///
/// Feeds every transport event to the connection until the transport closes
/// or the manager is cancelled; either way all open streams are failed.
async fn reader_task(
    mut events: mpsc::Receiver<TransportEvent>,
    connection: Arc<Connection>,
    cancel: CancellationToken,
    config: Config,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(TransportEvent::Message(raw)) => {
                        trace!("Received {} bytes", raw.len());
                        if let Err(e) = connection.handle_message(&raw) {
                            warn!("Failed to decode message: {}", e);
                        }
                    }
                    Some(TransportEvent::Closed(reason)) => {
                        debug!("Transport closed: {}", reason);
                        connection.handle_close(&reason);
                        return;
                    }
                    None => {
                        debug!("Transport event channel ended");
                        connection.handle_close(&config.dropped_reason);
                        return;
                    }
                }
            }
            _ = cancel.cancelled() => {
                debug!("Reader task cancelled");
                connection.handle_close(&config.shutdown_reason);
                return;
            }
        }
    }
}
