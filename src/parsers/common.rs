use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MENTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[^>\s]+>").expect("mention pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub text: String,
    pub mentions: Vec<String>,
}

impl ParsedMessage {
    pub fn new(content: &str) -> Self {
        Self {
            text: content.to_string(),
            mentions: MessageUtils::extract_mentions(content),
        }
    }

    pub fn mentioned_user_ids(&self) -> Vec<String> {
        self.mentions
            .iter()
            .filter_map(|token| MessageUtils::mention_user_id(token))
            .map(str::to_string)
            .collect()
    }
}

pub struct MessageUtils;

impl MessageUtils {
    /// Mention tokens (`<@U123>`) in order of appearance, duplicates kept.
    pub fn extract_mentions(content: &str) -> Vec<String> {
        MENTION_PATTERN
            .find_iter(content)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// `<@U123>` and `<@U123|name>` both yield `U123`.
    pub fn mention_user_id(token: &str) -> Option<&str> {
        let inner = token.strip_prefix("<@")?.strip_suffix('>')?;
        let id = inner.split('|').next().unwrap_or(inner);
        if id.is_empty() { None } else { Some(id) }
    }

    pub fn mention_for(user_id: &str) -> String {
        format!("<@{user_id}>")
    }
}
