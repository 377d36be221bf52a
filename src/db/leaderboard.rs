use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::parsers::{MessageUtils, ParsedMessage};

use super::{
    AuthorMetricPair, DatabaseError, MessageReactionCount, PropsMessage, PropsStore,
    ReactionStore,
};

/// Read-side aggregation over the props and reaction stores.
#[derive(Clone)]
pub struct Leaderboard {
    props: Arc<dyn PropsStore>,
    reactions: Arc<dyn ReactionStore>,
}

impl Leaderboard {
    pub fn new(props: Arc<dyn PropsStore>, reactions: Arc<dyn ReactionStore>) -> Self {
        Self { props, reactions }
    }

    /// Props sent plus live reactions left, per user.
    pub async fn top_givers(&self, limit: usize) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
        let sent = self.props.count_props_by_author().await?;
        let reacted = self.reactions.count_reactions_by_user().await?;
        Ok(rank(merge_counts([sent, reacted]), limit))
    }

    /// One point per mention in a props message, plus the live reaction count
    /// of the reply that carried it.
    pub async fn top_receivers(
        &self,
        limit: usize,
    ) -> Result<Vec<AuthorMetricPair>, DatabaseError> {
        let messages = self.props.list_props_messages().await?;
        let reactions = self.reactions.count_reactions_by_message().await?;
        Ok(rank(tally_receivers(&messages, &reactions), limit))
    }
}

fn merge_counts<I>(sources: I) -> HashMap<String, i64>
where
    I: IntoIterator<Item = Vec<AuthorMetricPair>>,
{
    let mut totals: HashMap<String, i64> = HashMap::new();
    for pair in sources.into_iter().flatten() {
        *totals.entry(pair.author).or_default() += pair.value;
    }
    totals
}

fn tally_receivers(
    messages: &[PropsMessage],
    reactions: &[MessageReactionCount],
) -> HashMap<String, i64> {
    let live: HashMap<(&str, &str), i64> = reactions
        .iter()
        .map(|r| ((r.channel.as_str(), r.message_timestamp.as_str()), r.count))
        .collect();

    let mut totals: HashMap<String, i64> = HashMap::new();
    for message in messages {
        let bonus = message
            .target_timestamp
            .as_deref()
            .and_then(|ts| live.get(&(message.target_channel.as_str(), ts)))
            .copied()
            .unwrap_or(0);

        for user in ParsedMessage::new(&message.source_message).mentioned_user_ids() {
            *totals.entry(user).or_default() += 1 + bonus;
        }
    }
    totals
}

/// Descending by value, ties by author ascending, cut to `limit`.
fn rank(totals: HashMap<String, i64>, limit: usize) -> Vec<AuthorMetricPair> {
    let mut pairs: Vec<AuthorMetricPair> = totals
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(author, value)| AuthorMetricPair::new(author, value))
        .collect();
    pairs.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.author.cmp(&b.author)));
    pairs.truncate(limit);
    pairs
}

/// Two-section reply used both in chat and by the `leaderboard` command.
pub fn format_report(givers: &[AuthorMetricPair], receivers: &[AuthorMetricPair]) -> String {
    let mut out = String::new();
    write_section(&mut out, "Props given", givers);
    write_section(&mut out, "Props received", receivers);
    out
}

fn write_section(out: &mut String, title: &str, pairs: &[AuthorMetricPair]) {
    let _ = writeln!(out, "{title}:");
    for (rank, pair) in pairs.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} {}",
            rank + 1,
            MessageUtils::mention_for(&pair.author),
            pair.value
        );
    }
}
