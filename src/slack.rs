//! Slack RTM adapter: a connection manager task that owns the websocket and
//! a cheap handle implementing [`ChatTransport`] for the event loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use crate::bot::{BotEvent, ChatTransport, OutgoingMessage, TransportError};
use crate::config::{ReconnectConfig, SlackConfig};

pub mod api;
pub mod events;

use self::api::SlackApiClient;
use self::events::{Frame, parse_frame};

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Handle used by the event loop. Outbound messages go through the
/// connection manager so they land on whichever socket is current.
pub struct SlackRtmClient {
    api: Arc<SlackApiClient>,
    next_id: Arc<AtomicI64>,
    outbound: mpsc::Sender<String>,
}

impl SlackRtmClient {
    /// Spawns the connection manager. The returned receiver is the event
    /// stream for the loop; it closes when the manager gives up or `stop`
    /// turns true.
    pub fn start(
        config: &SlackConfig,
        token: SecretString,
        stop: watch::Receiver<bool>,
    ) -> Result<(Self, mpsc::Receiver<BotEvent>, JoinHandle<()>), TransportError> {
        let api = Arc::new(SlackApiClient::new(
            &config.api_base,
            token,
            config.request_timeout_ms,
        )?);
        let next_id = Arc::new(AtomicI64::new(0));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));

        let manager = ConnectionManager {
            api: api.clone(),
            policy: ReconnectPolicy::from(&config.reconnect),
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
            connect_timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
            next_id: next_id.clone(),
            events: events_tx,
            outbound: outbound_rx,
            stop,
        };
        let task = tokio::spawn(manager.run());

        Ok((
            Self {
                api,
                next_id,
                outbound: outbound_tx,
            },
            events_rx,
            task,
        ))
    }
}

fn allocate_id(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

#[async_trait]
impl ChatTransport for SlackRtmClient {
    fn new_outgoing_message(&self, channel: &str, text: &str) -> OutgoingMessage {
        OutgoingMessage {
            id: allocate_id(&self.next_id),
            channel: channel.to_string(),
            text: text.to_string(),
        }
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        let frame = json!({
            "id": message.id,
            "type": "message",
            "channel": message.channel,
            "text": message.text,
        })
        .to_string();
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        reaction: &str,
    ) -> Result<(), TransportError> {
        self.api.add_reaction(channel, timestamp, reaction).await
    }
}

enum SessionEnd {
    Stopped,
    Reconnect,
}

struct ConnectionManager {
    api: Arc<SlackApiClient>,
    policy: ReconnectPolicy,
    ping_interval: Duration,
    connect_timeout: Duration,
    next_id: Arc<AtomicI64>,
    events: mpsc::Sender<BotEvent>,
    outbound: mpsc::Receiver<String>,
    stop: watch::Receiver<bool>,
}

impl ConnectionManager {
    async fn run(mut self) {
        let mut connection_count = 0_u32;
        let mut attempt = 0_u32;

        loop {
            if *self.stop.borrow() {
                break;
            }
            attempt += 1;
            if !self
                .emit(BotEvent::Connecting {
                    attempt,
                    connection_count,
                })
                .await
            {
                break;
            }

            match self.session(&mut connection_count).await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Reconnect) => {
                    attempt = 0;
                    let delay = self.policy.backoff(0);
                    debug!(delay_ms = delay.as_millis() as u64, "reconnecting after session end");
                    tokio::select! {
                        _ = wait_for_stop(&mut self.stop) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "slack rejected credentials");
                    self.emit(BotEvent::AuthenticationFailure {
                        reason: e.to_string(),
                    })
                    .await;
                    break;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        error = %e,
                        "slack connection failed"
                    );
                    if attempt > self.policy.max_retries {
                        error!(
                            max_retries = self.policy.max_retries,
                            "slack reconnect retries exhausted"
                        );
                        break;
                    }

                    let delay = self.policy.backoff(attempt - 1);
                    tokio::select! {
                        _ = wait_for_stop(&mut self.stop) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("slack connection manager stopped");
    }

    async fn session(&mut self, connection_count: &mut u32) -> Result<SessionEnd, TransportError> {
        let session = self.api.rtm_connect().await?;
        let channels = match self.api.member_channels().await {
            Ok(channels) => channels,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "could not list member channels");
                Vec::new()
            }
        };

        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(session.url.as_str()))
                .await
                .map_err(|_| {
                    TransportError::Connect(format!(
                        "websocket handshake timed out after {}ms",
                        self.connect_timeout.as_millis()
                    ))
                })?
                .map_err(|e| TransportError::Connect(format!("websocket connect failed: {e}")))?;
        let (mut sink, mut source) = stream.split();

        *connection_count += 1;
        info!(
            user = %session.self_name,
            team = session.team.as_deref().unwrap_or_default(),
            connection_count = *connection_count,
            "slack rtm connected"
        );
        if !self
            .emit(BotEvent::Connected {
                own_identity: session.self_id,
                channels,
            })
            .await
        {
            return Ok(SessionEnd::Stopped);
        }

        let mut ping = tokio::time::interval(self.ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = wait_for_stop(&mut self.stop) => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Stopped);
                }
                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        return Ok(SessionEnd::Stopped);
                    };
                    if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                        warn!(error = %e, "failed to write to slack socket");
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                _ = ping.tick() => {
                    let frame = json!({
                        "id": allocate_id(&self.next_id),
                        "type": "ping",
                        "time": Utc::now().timestamp_millis(),
                    })
                    .to_string();
                    if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                        warn!(error = %e, "failed to ping slack socket");
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                message = source.next() => match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        match parse_frame(text.as_str()) {
                            Ok(Frame::Event(event)) => {
                                if !self.emit(event).await {
                                    return Ok(SessionEnd::Stopped);
                                }
                            }
                            Ok(Frame::Pong { time: Some(sent) }) => {
                                let latency_ms =
                                    u64::try_from(Utc::now().timestamp_millis() - sent).unwrap_or(0);
                                if !self.emit(BotEvent::LatencyReport { latency_ms }).await {
                                    return Ok(SessionEnd::Stopped);
                                }
                            }
                            Ok(Frame::Pong { time: None }) => debug!("pong without time"),
                            Ok(Frame::Goodbye) => {
                                info!("slack sent goodbye, reconnecting");
                                return Ok(SessionEnd::Reconnect);
                            }
                            Err(e) => warn!(error = %e, "undecodable slack frame"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("slack socket closed");
                        return Ok(SessionEnd::Reconnect);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "slack socket read failed");
                        return Ok(SessionEnd::Reconnect);
                    }
                },
            }
        }
    }

    /// False once the event loop has gone away.
    async fn emit(&mut self, event: BotEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|value| *value).await.is_err() {
        std::future::pending::<()>().await;
    }
}
