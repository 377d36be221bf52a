//! Decoding of RTM websocket frames.

use serde::Deserialize;
use serde_json::Value;

use crate::bot::{BotEvent, InboundMessage, ReactionEvent};

const IGNORED_MESSAGE_SUBTYPES: [&str; 3] = ["message_changed", "message_deleted", "bot_message"];

/// A decoded frame. Only `Event` reaches the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(BotEvent),
    /// Answer to our own ping; `time` is what we put in it.
    Pong { time: Option<i64> },
    /// The server is about to close the socket.
    Goodbye,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    subtype: Option<String>,
    reply_to: Option<i64>,
    ok: Option<bool>,
    ts: Option<String>,
    user: Option<String>,
    channel: Option<Value>,
    text: Option<String>,
    item_user: Option<String>,
    item: Option<RawItem>,
    reaction: Option<String>,
    name: Option<String>,
    time: Option<i64>,
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    channel: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

pub fn parse_frame(text: &str) -> Result<Frame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(text)?;
    Ok(decode(raw))
}

fn decode(raw: RawFrame) -> Frame {
    let kind = raw.kind.clone().unwrap_or_default();

    // Acknowledgements carry `reply_to` and no type.
    if kind.is_empty() {
        return match raw.reply_to {
            Some(reply_to) => Frame::Event(acknowledgement(reply_to, raw)),
            None => ignored("untyped"),
        };
    }

    let event = match kind.as_str() {
        "hello" => BotEvent::Hello,
        "goodbye" => return Frame::Goodbye,
        "pong" => return Frame::Pong { time: raw.time },
        "message" => message(raw),
        "reaction_added" => reaction(raw).map_or_else(
            || BotEvent::Ignored {
                kind: "reaction_added".to_string(),
            },
            BotEvent::ReactionAdded,
        ),
        "reaction_removed" => reaction(raw).map_or_else(
            || BotEvent::Ignored {
                kind: "reaction_removed".to_string(),
            },
            BotEvent::ReactionRemoved,
        ),
        "pref_change" => BotEvent::PreferenceChange {
            name: raw.name.unwrap_or_default(),
        },
        "channel_joined" => BotEvent::ChannelJoined {
            name: raw
                .channel
                .as_ref()
                .and_then(|channel| channel.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        "channel_left" => BotEvent::ChannelLeft {
            channel: channel_id(raw.channel.as_ref()).unwrap_or_default(),
        },
        "user_typing" => BotEvent::UserTyping {
            channel: channel_id(raw.channel.as_ref()).unwrap_or_default(),
            user: raw.user.unwrap_or_default(),
        },
        "error" => {
            let error = raw.error.unwrap_or(RawError {
                code: 0,
                msg: String::new(),
            });
            BotEvent::TransportError {
                code: error.code,
                msg: error.msg,
            }
        }
        other => BotEvent::Ignored {
            kind: other.to_string(),
        },
    };
    Frame::Event(event)
}

fn acknowledgement(reply_to: i64, raw: RawFrame) -> BotEvent {
    if raw.ok.unwrap_or(false) {
        BotEvent::Acknowledgement {
            reply_to,
            timestamp: raw.ts.unwrap_or_default(),
        }
    } else {
        BotEvent::SendFailed {
            reply_to,
            reason: raw
                .error
                .map(|error| error.msg)
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

fn message(raw: RawFrame) -> BotEvent {
    if let Some(subtype) = raw.subtype.as_deref() {
        if IGNORED_MESSAGE_SUBTYPES.contains(&subtype) {
            return BotEvent::Ignored {
                kind: format!("message/{subtype}"),
            };
        }
    }

    let channel = channel_id(raw.channel.as_ref());
    match (raw.user, channel, raw.ts) {
        (Some(author), Some(channel), Some(timestamp)) => {
            BotEvent::MessageReceived(InboundMessage {
                author,
                channel,
                timestamp,
                text: raw.text.unwrap_or_default(),
            })
        }
        _ => BotEvent::Ignored {
            kind: "message/incomplete".to_string(),
        },
    }
}

fn reaction(raw: RawFrame) -> Option<ReactionEvent> {
    let item = raw.item?;
    Some(ReactionEvent {
        item_user: raw.item_user?,
        user: raw.user?,
        channel: item.channel?,
        timestamp: item.ts?,
        reaction: raw.reaction?,
    })
}

fn channel_id(channel: Option<&Value>) -> Option<String> {
    channel.and_then(Value::as_str).map(str::to_string)
}

fn ignored(kind: &str) -> Frame {
    Frame::Event(BotEvent::Ignored {
        kind: kind.to_string(),
    })
}
