use basalt_config::ConfigError;
use basalt_events::MessageId;
use basalt_ring::MailboxError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error("multiple consumers for the same endpoint is not allowed: {channel}")]
    MultipleConsumersNotAllowed { channel: String },

    #[error("no reply for exchange {id} on '{channel}' within {timeout:?}")]
    ReplyTimeout {
        channel: String,
        id: MessageId,
        timeout: Duration,
    },

    #[error("exchange processing failed: {reason}")]
    Processing { reason: String },

    #[error("a reply is already pending for exchange {id}")]
    DuplicateCorrelation { id: MessageId },

    #[error("endpoint '{channel}' is closed")]
    Closed { channel: String },

    #[error("failed to spawn consumer thread for '{channel}'")]
    Spawn {
        channel: String,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// True for a reply deadline, as opposed to a processing failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::ReplyTimeout { .. })
    }
}
