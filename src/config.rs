/// Default close reason when the transport's event channel ends without a close event
pub const DEFAULT_DROPPED_REASON: &str = "transport dropped";

/// Default close reason when the stream manager itself shuts down
pub const DEFAULT_SHUTDOWN_REASON: &str = "stream manager closed";

/// Stream manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// First identifier handed out by the default sequence
    pub first_request_id: u64,

    /// Failure message delivered to open streams when the transport goes away silently
    pub dropped_reason: String,

    /// Failure message delivered to open streams on [`StreamManager::close`](crate::StreamManager::close)
    pub shutdown_reason: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_request_id: 1,
            dropped_reason: DEFAULT_DROPPED_REASON.to_string(),
            shutdown_reason: DEFAULT_SHUTDOWN_REASON.to_string(),
        }
    }
}
