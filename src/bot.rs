//! The single-consumer event loop.
//!
//! Events are handled strictly in arrival order, so an acknowledgement is
//! never looked at before the props record of the send it confirms has been
//! written.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::db::{
    DatabaseError, Leaderboard, NewProps, PropsStore, ReactionKey, ReactionStore, format_report,
};
use crate::error::BotError;
use crate::parsers::{extract_mentions, is_leaderboard_query, is_recognition_message};
use crate::supervisor::{ManagedRoutine, ShutdownHandle, ShutdownSignal, shutdown_pair};
use crate::themes::ThemeCatalog;

pub mod events;
pub mod transport;

pub use self::events::{BotEvent, InboundMessage, ReactionEvent};
pub use self::transport::{ChatTransport, OutgoingMessage, TransportError};

/// Collaborators and settings the loop is built from.
pub struct BotContext {
    pub transport: Arc<dyn ChatTransport>,
    pub props_store: Arc<dyn PropsStore>,
    pub reaction_store: Arc<dyn ReactionStore>,
    pub catalog: Arc<ThemeCatalog>,
    /// Identifies this process's sends in the props table.
    pub connection_key: String,
    pub leaderboard_size: usize,
}

pub struct PropsBot {
    transport: Arc<dyn ChatTransport>,
    props_store: Arc<dyn PropsStore>,
    reaction_store: Arc<dyn ReactionStore>,
    leaderboard: Leaderboard,
    catalog: Arc<ThemeCatalog>,
    connection_key: String,
    leaderboard_size: usize,
    events: mpsc::Receiver<BotEvent>,
    handle: ShutdownHandle,
    shutdown: ShutdownSignal,
    rng: StdRng,
    self_id: Option<String>,
}

enum Step {
    Stop,
    Closed,
    Event(BotEvent),
}

impl PropsBot {
    pub fn new(context: BotContext, events: mpsc::Receiver<BotEvent>, rng: StdRng) -> Self {
        let (handle, shutdown) = shutdown_pair();
        let leaderboard =
            Leaderboard::new(context.props_store.clone(), context.reaction_store.clone());
        Self {
            transport: context.transport,
            props_store: context.props_store,
            reaction_store: context.reaction_store,
            leaderboard,
            catalog: context.catalog,
            connection_key: context.connection_key,
            leaderboard_size: context.leaderboard_size,
            events,
            handle,
            shutdown,
            rng,
            self_id: None,
        }
    }

    async fn handle_event(&mut self, event: BotEvent) -> Result<(), BotError> {
        match event {
            BotEvent::Connecting {
                attempt,
                connection_count,
            } => {
                debug!(attempt, connection_count, "connecting");
            }
            BotEvent::Connected {
                own_identity,
                channels,
            } => {
                info!(user = %own_identity, channels = channels.len(), "connected");
                for channel in &channels {
                    info!(channel = %channel, "listening to channel");
                }
                self.self_id = Some(own_identity);
            }
            BotEvent::Hello => debug!("hello"),
            BotEvent::MessageReceived(message) => self.handle_message(message).await,
            BotEvent::Acknowledgement {
                reply_to,
                timestamp,
            } => self.handle_acknowledgement(reply_to, &timestamp).await,
            BotEvent::SendFailed { reply_to, reason } => {
                warn!(reply_to, reason = %reason, "provider rejected outbound message");
            }
            BotEvent::ReactionAdded(reaction) => self.handle_reaction(reaction, true).await,
            BotEvent::ReactionRemoved(reaction) => self.handle_reaction(reaction, false).await,
            BotEvent::AuthenticationFailure { reason } => {
                error!(reason = %reason, "invalid credentials, stopping event loop");
                return Err(BotError::TransportFatal(reason));
            }
            BotEvent::LatencyReport { latency_ms } => debug!(latency_ms, "latency report"),
            BotEvent::PreferenceChange { name } => debug!(name = %name, "preference changed"),
            BotEvent::ChannelJoined { name } => info!(channel = %name, "joined channel"),
            BotEvent::ChannelLeft { channel } => info!(channel = %channel, "left channel"),
            BotEvent::UserTyping { channel, user } => {
                debug!(channel = %channel, user = %user, "user typing");
            }
            BotEvent::TransportError { code, msg } => {
                error!(code, error = %msg, "transport reported an error");
            }
            BotEvent::Ignored { kind } => debug!(kind = %kind, "ignoring event"),
        }
        Ok(())
    }

    async fn handle_message(&mut self, message: InboundMessage) {
        debug!(
            channel = %message.channel,
            user = %message.author,
            message = %message.text,
            "message received"
        );

        if self.self_id.as_deref() == Some(message.author.as_str()) {
            debug!("ignoring one of my own messages");
            return;
        }

        if is_recognition_message(&message.text) {
            self.handle_recognition(&message).await;
        } else if is_leaderboard_query(&message.text, self.self_id.as_deref().unwrap_or_default())
        {
            self.handle_leaderboard(&message).await;
        }
    }

    async fn handle_recognition(&mut self, message: &InboundMessage) {
        let catalog = self.catalog.clone();
        let theme = catalog.select(&mut self.rng);
        let recipients = extract_mentions(&message.text);
        let outgoing = self
            .transport
            .new_outgoing_message(&message.channel, &theme.full_message(&recipients));
        let connection_id = outgoing.id;

        if let Err(e) = self.transport.send_message(outgoing).await {
            warn!(
                channel = %message.channel,
                reply_to = connection_id,
                error = %e,
                "failed to send props reply"
            );
        }

        let record = NewProps {
            connection_key: self.connection_key.clone(),
            connection_id,
            source_author: message.author.clone(),
            source_timestamp: message.timestamp.clone(),
            source_message: message.text.clone(),
            source_channel: message.channel.clone(),
            theme: theme.id,
        };
        match self.props_store.create_props(&record).await {
            Ok(props_id) => {
                info!(props_id, reply_to = connection_id, theme = theme.id, "recorded props");
            }
            Err(e) => {
                error!(
                    channel = %message.channel,
                    reply_to = connection_id,
                    error = %e,
                    "error creating props record"
                );
            }
        }
    }

    async fn handle_leaderboard(&mut self, message: &InboundMessage) {
        let givers = match self.leaderboard.top_givers(self.leaderboard_size).await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(error = %e, "error building givers leaderboard");
                return;
            }
        };
        let receivers = match self.leaderboard.top_receivers(self.leaderboard_size).await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(error = %e, "error building receivers leaderboard");
                return;
            }
        };

        let outgoing = self
            .transport
            .new_outgoing_message(&message.channel, &format_report(&givers, &receivers));
        if let Err(e) = self.transport.send_message(outgoing).await {
            warn!(channel = %message.channel, error = %e, "failed to send leaderboard");
        }
    }

    async fn handle_acknowledgement(&mut self, reply_to: i64, timestamp: &str) {
        match self
            .props_store
            .correlate_reply(&self.connection_key, reply_to, timestamp)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(reply_to, "acknowledgement is not for a pending props reply");
                return;
            }
            Err(e) => {
                error!(reply_to, error = %e, "error recording reply");
                return;
            }
        }

        let record = match self
            .props_store
            .get_props_by_connection(&self.connection_key, reply_to)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(reply_to, "correlated props record disappeared");
                return;
            }
            Err(e) => {
                error!(reply_to, error = %e, "error loading props record");
                return;
            }
        };

        let reactions = match self.catalog.celebration_reactions(record.theme, &mut self.rng) {
            Ok(reactions) => reactions,
            Err(e) => {
                warn!(props_id = record.id, error = %e, "no celebration reactions available");
                return;
            }
        };

        for reaction in reactions {
            if let Err(e) = self
                .transport
                .add_reaction(&record.target_channel, timestamp, &reaction)
                .await
            {
                warn!(
                    channel = %record.target_channel,
                    reaction = %reaction,
                    error = %e,
                    "failed to add reaction"
                );
            }
        }
    }

    async fn handle_reaction(&mut self, event: ReactionEvent, added: bool) {
        let Some(me) = self.self_id.as_deref() else {
            debug!("reaction before identity is known");
            return;
        };
        if event.item_user != me {
            debug!("reaction on someone else's message");
            return;
        }
        if event.user == me {
            debug!("this is my own automated reaction");
            return;
        }

        let key = ReactionKey {
            channel: event.channel,
            message_timestamp: event.timestamp,
            reaction_user: event.user,
            reaction: event.reaction,
        };
        let result = if added {
            self.reaction_store.upsert_reaction(&key).await
        } else {
            self.remove_reaction(&key).await
        };
        if let Err(e) = result {
            error!(
                channel = %key.channel,
                user = %key.reaction_user,
                added,
                error = %e,
                "error recording reaction"
            );
        }
    }

    async fn remove_reaction(&mut self, key: &ReactionKey) -> Result<(), DatabaseError> {
        match self.reaction_store.get_reaction(key).await? {
            None => {
                debug!(channel = %key.channel, "removal of an untracked reaction");
                Ok(())
            }
            Some(record) if record.removed => {
                debug!(reaction_id = record.id, "reaction already removed");
                Ok(())
            }
            Some(_) => self.reaction_store.mark_reaction_removed(key).await,
        }
    }
}

#[async_trait]
impl ManagedRoutine for PropsBot {
    async fn run(&mut self) -> Result<(), BotError> {
        info!(connection_key = %self.connection_key, "event loop started");
        loop {
            let step = tokio::select! {
                biased;
                _ = self.shutdown.requested() => Step::Stop,
                event = self.events.recv() => event.map_or(Step::Closed, Step::Event),
            };

            match step {
                Step::Stop => {
                    info!("event loop stopping");
                    return Ok(());
                }
                Step::Closed => {
                    warn!("event stream closed");
                    return Ok(());
                }
                Step::Event(event) => self.handle_event(event).await?,
            }
        }
    }

    fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::NamedTempFile;
    use tokio::sync::mpsc;

    use super::{
        BotContext, BotEvent, ChatTransport, InboundMessage, OutgoingMessage, PropsBot,
        ReactionEvent, TransportError,
    };
    use crate::config::DatabaseConfig;
    use crate::db::models::{PropsRecord, ReactionRecord};
    use crate::db::{
        AuthorMetricPair, DatabaseError, DatabaseManager, MessageReactionCount, NewProps,
        PropsMessage, PropsStore, ReactionKey, ReactionStore,
    };
    use crate::error::BotError;
    use crate::supervisor::ManagedRoutine;
    use crate::themes::{GENERIC_REACTION_COUNT, ThemeCatalog};

    const SESSION: &str = "test-session";
    const BOT: &str = "UBOT";

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct AppliedReaction {
        channel: String,
        timestamp: String,
        reaction: String,
    }

    #[derive(Default)]
    struct RecordingTransport {
        next_id: AtomicI64,
        fail_sends: bool,
        sent: Mutex<Vec<OutgoingMessage>>,
        reactions: Mutex<Vec<AppliedReaction>>,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self {
                fail_sends: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<OutgoingMessage> {
            self.sent.lock().expect("sent lock").clone()
        }

        fn reactions(&self) -> Vec<AppliedReaction> {
            self.reactions.lock().expect("reactions lock").clone()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        fn new_outgoing_message(&self, channel: &str, text: &str) -> OutgoingMessage {
            OutgoingMessage {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                channel: channel.to_string(),
                text: text.to_string(),
            }
        }

        async fn send_message(&self, message: OutgoingMessage) -> Result<(), TransportError> {
            if self.fail_sends {
                return Err(TransportError::Closed);
            }
            self.sent.lock().expect("sent lock").push(message);
            Ok(())
        }

        async fn add_reaction(
            &self,
            channel: &str,
            timestamp: &str,
            reaction: &str,
        ) -> Result<(), TransportError> {
            self.reactions.lock().expect("reactions lock").push(AppliedReaction {
                channel: channel.to_string(),
                timestamp: timestamp.to_string(),
                reaction: reaction.to_string(),
            });
            Ok(())
        }
    }

    struct Harness {
        bot: PropsBot,
        events: mpsc::Sender<BotEvent>,
        transport: Arc<RecordingTransport>,
        catalog: Arc<ThemeCatalog>,
        manager: DatabaseManager,
        _file: NamedTempFile,
    }

    async fn harness(transport: RecordingTransport) -> Harness {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let config = DatabaseConfig {
            url: None,
            filename: Some(file.path().to_string_lossy().to_string()),
            max_connections: Some(1),
            min_connections: Some(1),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");

        let transport = Arc::new(transport);
        let catalog = Arc::new(ThemeCatalog::builtin().expect("builtin catalog"));
        let (bot, events) = build_bot(
            transport.clone(),
            manager.props_store(),
            manager.reaction_store(),
            catalog.clone(),
        );

        Harness {
            bot,
            events,
            transport,
            catalog,
            manager,
            _file: file,
        }
    }

    fn build_bot(
        transport: Arc<RecordingTransport>,
        props_store: Arc<dyn PropsStore>,
        reaction_store: Arc<dyn ReactionStore>,
        catalog: Arc<ThemeCatalog>,
    ) -> (PropsBot, mpsc::Sender<BotEvent>) {
        let (events, rx) = mpsc::channel(64);
        let bot = PropsBot::new(
            BotContext {
                transport,
                props_store,
                reaction_store,
                catalog,
                connection_key: SESSION.to_string(),
                leaderboard_size: 3,
            },
            rx,
            StdRng::seed_from_u64(11),
        );
        (bot, events)
    }

    /// Feeds `events`, closes the stream and runs the loop to completion.
    async fn drive(
        bot: &mut PropsBot,
        sender: mpsc::Sender<BotEvent>,
        events: Vec<BotEvent>,
    ) -> Result<(), BotError> {
        for event in events {
            sender.send(event).await.expect("queue event");
        }
        drop(sender);
        bot.run().await
    }

    impl Harness {
        async fn drive(&mut self, events: Vec<BotEvent>) -> Result<(), BotError> {
            let (closed, _) = mpsc::channel(1);
            let sender = std::mem::replace(&mut self.events, closed);
            drive(&mut self.bot, sender, events).await
        }
    }

    /// Every call fails, as if the database were down.
    struct UnavailableStore;

    fn unavailable() -> DatabaseError {
        DatabaseError::StorageUnavailable("connection refused".to_string())
    }

    #[async_trait]
    impl PropsStore for UnavailableStore {
        async fn create_props(&self, _props: &NewProps) -> Result<i64, DatabaseError> {
            Err(unavailable())
        }

        async fn correlate_reply(
            &self,
            _connection_key: &str,
            _connection_id: i64,
            _target_timestamp: &str,
        ) -> Result<bool, DatabaseError> {
            Err(unavailable())
        }

        async fn get_props_by_connection(
            &self,
            _connection_key: &str,
            _connection_id: i64,
        ) -> Result<Option<PropsRecord>, DatabaseError> {
            Err(unavailable())
        }

        async fn count_props_by_author(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
            Err(unavailable())
        }

        async fn list_props_messages(&self) -> Result<Vec<PropsMessage>, DatabaseError> {
            Err(unavailable())
        }
    }

    #[async_trait]
    impl ReactionStore for UnavailableStore {
        async fn upsert_reaction(&self, _key: &ReactionKey) -> Result<(), DatabaseError> {
            Err(unavailable())
        }

        async fn mark_reaction_removed(&self, _key: &ReactionKey) -> Result<(), DatabaseError> {
            Err(unavailable())
        }

        async fn get_reaction(
            &self,
            _key: &ReactionKey,
        ) -> Result<Option<ReactionRecord>, DatabaseError> {
            Err(unavailable())
        }

        async fn count_reactions_by_user(&self) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
            Err(unavailable())
        }

        async fn count_reactions_by_message(
            &self,
        ) -> Result<Vec<MessageReactionCount>, DatabaseError> {
            Err(unavailable())
        }
    }

    fn connected() -> BotEvent {
        BotEvent::Connected {
            own_identity: BOT.to_string(),
            channels: vec!["general".to_string()],
        }
    }

    fn message(author: &str, timestamp: &str, text: &str) -> BotEvent {
        BotEvent::MessageReceived(InboundMessage {
            author: author.to_string(),
            channel: "C1".to_string(),
            timestamp: timestamp.to_string(),
            text: text.to_string(),
        })
    }

    fn reaction(item_user: &str, user: &str, timestamp: &str, mark: &str) -> ReactionEvent {
        ReactionEvent {
            item_user: item_user.to_string(),
            user: user.to_string(),
            channel: "C1".to_string(),
            timestamp: timestamp.to_string(),
            reaction: mark.to_string(),
        }
    }

    #[tokio::test]
    async fn props_reply_is_recorded_correlated_and_celebrated() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![
            connected(),
            message("U1", "1700000000.000100", "props <@U2> great work"),
            BotEvent::Acknowledgement {
                reply_to: 1,
                timestamp: "1700000001.000200".to_string(),
            },
        ])
        .await
        .expect("loop ends cleanly");

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "C1");
        assert!(sent[0].text.contains("<@U2>"));

        let record = h
            .manager
            .props_store()
            .get_props_by_connection(SESSION, 1)
            .await
            .expect("lookup")
            .expect("props recorded");
        assert_eq!(record.source_author, "U1");
        assert_eq!(record.source_message, "props <@U2> great work");
        assert_eq!(record.target_timestamp.as_deref(), Some("1700000001.000200"));

        let theme = h.catalog.get(record.theme).expect("theme exists");
        assert_eq!(sent[0].text, theme.full_message(&["<@U2>".to_string()]));

        let applied = h.transport.reactions();
        assert!(applied
            .iter()
            .all(|r| r.channel == "C1" && r.timestamp == "1700000001.000200"));
        let marks: Vec<String> = applied.into_iter().map(|r| r.reaction).collect();
        if theme.reactions.is_empty() {
            assert_eq!(marks.len(), GENERIC_REACTION_COUNT);
            assert!(marks.iter().all(|m| h.catalog.reaction_pool().contains(m)));
        } else {
            assert_eq!(marks, theme.reactions);
        }
    }

    #[tokio::test]
    async fn own_messages_are_ignored() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![connected(), message(BOT, "1.0", "props <@U2>")])
            .await
            .expect("loop ends cleanly");

        assert!(h.transport.sent().is_empty());
        assert!(h
            .manager
            .props_store()
            .get_props_by_connection(SESSION, 1)
            .await
            .expect("lookup")
            .is_none());
    }

    #[tokio::test]
    async fn failed_send_still_records_props() {
        let mut h = harness(RecordingTransport::failing()).await;

        h.drive(vec![connected(), message("U1", "1.0", "Kudos <@U3>")])
            .await
            .expect("send failure is not fatal");

        let record = h
            .manager
            .props_store()
            .get_props_by_connection(SESSION, 1)
            .await
            .expect("lookup");
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn leaderboard_query_replies_with_both_sections() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![
            connected(),
            message("U1", "1.0", "props <@U2>"),
            message("U3", "2.0", "<@UBOT> show me the Leaderboard"),
            message("U3", "3.0", "<@USOMEONE> leaderboard"),
        ])
        .await
        .expect("loop ends cleanly");

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].text,
            "Props given:\n1. <@U1> 1\nProps received:\n1. <@U2> 1\n"
        );
    }

    #[tokio::test]
    async fn unmatched_acknowledgement_adds_no_reactions() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![
            connected(),
            BotEvent::Acknowledgement {
                reply_to: 42,
                timestamp: "9.9".to_string(),
            },
        ])
        .await
        .expect("loop ends cleanly");

        assert!(h.transport.reactions().is_empty());
    }

    #[tokio::test]
    async fn reactions_on_bot_messages_are_tracked() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![
            connected(),
            BotEvent::ReactionAdded(reaction(BOT, "U3", "5.0", "fire")),
            BotEvent::ReactionAdded(reaction(BOT, BOT, "5.0", "tada")),
            BotEvent::ReactionAdded(reaction("U9", "U3", "5.0", "clap")),
            BotEvent::ReactionAdded(reaction(BOT, "U4", "5.0", "gem")),
            BotEvent::ReactionRemoved(reaction(BOT, "U4", "5.0", "gem")),
        ])
        .await
        .expect("loop ends cleanly");

        let store = h.manager.reaction_store();
        let key = |user: &str, mark: &str| ReactionKey {
            channel: "C1".to_string(),
            message_timestamp: "5.0".to_string(),
            reaction_user: user.to_string(),
            reaction: mark.to_string(),
        };

        let fire = store.get_reaction(&key("U3", "fire")).await.expect("query");
        assert!(fire.is_some_and(|row| !row.removed));
        assert!(store.get_reaction(&key(BOT, "tada")).await.expect("query").is_none());
        assert!(store.get_reaction(&key("U3", "clap")).await.expect("query").is_none());
        let gem = store.get_reaction(&key("U4", "gem")).await.expect("query");
        assert!(gem.is_some_and(|row| row.removed));
    }

    #[tokio::test]
    async fn storage_outage_only_drops_the_affected_actions() {
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(UnavailableStore);
        let catalog = Arc::new(ThemeCatalog::builtin().expect("builtin catalog"));
        let (mut bot, sender) = build_bot(transport.clone(), store.clone(), store, catalog);

        drive(
            &mut bot,
            sender,
            vec![
                connected(),
                message("U1", "1.0", "props <@U2>"),
                message("U3", "2.0", "<@UBOT> leaderboard"),
                BotEvent::Acknowledgement {
                    reply_to: 1,
                    timestamp: "3.0".to_string(),
                },
                BotEvent::ReactionAdded(reaction(BOT, "U3", "3.0", "fire")),
                BotEvent::ReactionRemoved(reaction(BOT, "U3", "3.0", "fire")),
                message("U3", "4.0", "kudos <@U4>"),
            ],
        )
        .await
        .expect("storage errors are not fatal");

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.contains("<@U2>"));
        assert!(sent[1].text.contains("<@U4>"));
        assert!(transport.reactions().is_empty());
    }

    #[tokio::test]
    async fn duplicate_acknowledgement_celebrates_once() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![
            connected(),
            message("U1", "1.0", "props <@U2>"),
            BotEvent::Acknowledgement {
                reply_to: 1,
                timestamp: "5.0".to_string(),
            },
            BotEvent::Acknowledgement {
                reply_to: 1,
                timestamp: "6.0".to_string(),
            },
        ])
        .await
        .expect("loop ends cleanly");

        let record = h
            .manager
            .props_store()
            .get_props_by_connection(SESSION, 1)
            .await
            .expect("lookup")
            .expect("props recorded");
        assert_eq!(record.target_timestamp.as_deref(), Some("5.0"));

        let theme = h.catalog.get(record.theme).expect("theme exists");
        let expected = if theme.reactions.is_empty() {
            GENERIC_REACTION_COUNT
        } else {
            theme.reactions.len()
        };
        let applied = h.transport.reactions();
        assert_eq!(applied.len(), expected);
        assert!(applied.iter().all(|r| r.timestamp == "5.0"));
    }

    #[tokio::test]
    async fn removing_an_untracked_reaction_is_a_no_op() {
        let mut h = harness(RecordingTransport::default()).await;

        h.drive(vec![
            connected(),
            BotEvent::ReactionRemoved(reaction(BOT, "U3", "5.0", "fire")),
        ])
        .await
        .expect("loop ends cleanly");

        let key = ReactionKey {
            channel: "C1".to_string(),
            message_timestamp: "5.0".to_string(),
            reaction_user: "U3".to_string(),
            reaction: "fire".to_string(),
        };
        assert!(h.manager.reaction_store().get_reaction(&key).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn authentication_failure_is_fatal() {
        let mut h = harness(RecordingTransport::default()).await;

        let err = h
            .drive(vec![
                BotEvent::AuthenticationFailure {
                    reason: "invalid_auth".to_string(),
                },
                message("U1", "1.0", "props <@U2>"),
            ])
            .await
            .expect_err("fatal");

        assert!(err.is_fatal());
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn shutdown_handle_stops_idle_loop() {
        let h = harness(RecordingTransport::default()).await;
        let Harness {
            mut bot,
            events: _events,
            ..
        } = h;
        let handle = bot.shutdown_handle();

        let task = tokio::spawn(async move { bot.run().await });
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("stopped within a second");

        task.await.expect("join").expect("clean exit");
    }
}
