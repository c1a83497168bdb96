//! Stream multiplexing over one shared connection
//!
//! This crate lets many independent request/response or server-push streams
//! share a single bidirectional text connection. It allows applications to:
//!
//! - Open any number of logical streams, each with a unique id
//! - Route every inbound message to the stream that owns it
//! - Receive exactly one terminal result per stream, success or failure
//! - Have every open stream failed once when the shared connection closes
//!
//! # Architecture
//!
//! ```text
//! Application
//!     ↓
//! typed streams (BidiStream, ServerStream)
//!     ↓
//! rpc_stream (StreamManager -> Connection -> StreamHandle)
//!     ↓
//! Transport (reconnecting socket, outbound queue + inbound events)
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use rpc_stream::{transport, StreamManager};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> rpc_stream::Result<()> {
//!     let (transport, endpoint) = transport::pair(64);
//!     // hand `endpoint` to the socket adapter
//!
//!     let manager = StreamManager::new(transport);
//!     let stream = manager.open("ping")?;
//!     stream.on_data(|payload| println!("data: {payload}"));
//!     stream.send(json!({}))?;
//!
//!     let result = stream.completion().await;
//!     println!("done: {result:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod reply;
pub mod sequence;
pub mod stream;
pub mod transport;
pub mod typed;

// Re-export main types
pub use config::Config;
pub use connection::Connection;
pub use error::{Error, Result};
pub use manager::StreamManager;
pub use protocol::{ClientMessage, ServerMessage, StreamId, COMPLETE_METHOD};
pub use reply::{err_status, Reply, SerializedReply, Status};
pub use sequence::{IdSequence, Sequential};
pub use stream::{StreamHandle, StreamState};
pub use transport::{Endpoint, Transport, TransportEvent};
pub use typed::{BidiStream, ServerStream};
