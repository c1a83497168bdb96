use crate::protocol::StreamId;
use thiserror::Error;

/// Errors that can occur in stream operations
#[derive(Debug, Error)]
pub enum Error {
    /// Send attempted on a stream that already received its terminal result
    #[error("Can not send messages on a completed stream (request id: {0})")]
    StreamCompleted(StreamId),

    /// Shared connection closed or stream manager shut down
    #[error("Connection closed")]
    ConnectionClosed,

    /// Envelope or payload (de)serialization failed
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
