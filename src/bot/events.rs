/// Everything the event loop can receive from the transport, already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    Connecting {
        attempt: u32,
        connection_count: u32,
    },
    Connected {
        own_identity: String,
        channels: Vec<String>,
    },
    Hello,
    MessageReceived(InboundMessage),
    /// The provider accepted the outbound message sent with `reply_to`.
    Acknowledgement {
        reply_to: i64,
        timestamp: String,
    },
    SendFailed {
        reply_to: i64,
        reason: String,
    },
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    AuthenticationFailure {
        reason: String,
    },
    LatencyReport {
        latency_ms: u64,
    },
    PreferenceChange {
        name: String,
    },
    ChannelJoined {
        name: String,
    },
    ChannelLeft {
        channel: String,
    },
    UserTyping {
        channel: String,
        user: String,
    },
    TransportError {
        code: i64,
        msg: String,
    },
    Ignored {
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub author: String,
    pub channel: String,
    pub timestamp: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    /// Author of the message that was reacted to.
    pub item_user: String,
    /// User who added or removed the reaction.
    pub user: String,
    pub channel: String,
    pub timestamp: String,
    pub reaction: String,
}
