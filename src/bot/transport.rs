use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid credentials: {0}")]
    InvalidAuth(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("reaction failed: {0}")]
    Reaction(String),
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::InvalidAuth(_))
    }
}

/// A reply waiting to be written. `id` is what the provider echoes back in
/// its acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub id: i64,
    pub channel: String,
    pub text: String,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Allocates a process-unique outbound id. Nothing is sent yet.
    fn new_outgoing_message(&self, channel: &str, text: &str) -> OutgoingMessage;

    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TransportError>;

    async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        reaction: &str,
    ) -> Result<(), TransportError>;
}
