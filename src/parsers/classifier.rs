use super::common::MessageUtils;

pub const TRIGGER_WORDS: [&str; 3] = ["props", "kudos", "congrats"];

const LEADERBOARD_KEYWORD: &str = "leaderboard";

/// True when the text starts with a trigger word, ignoring case.
pub fn is_recognition_message(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TRIGGER_WORDS.iter().any(|word| lowered.starts_with(word))
}

/// True when the text opens with a mention of `bot_user_id` and asks for the
/// leaderboard somewhere after it.
pub fn is_leaderboard_query(text: &str, bot_user_id: &str) -> bool {
    if bot_user_id.is_empty() {
        return false;
    }
    let mention = MessageUtils::mention_for(bot_user_id);
    text.strip_prefix(&mention)
        .is_some_and(|rest| rest.to_lowercase().contains(LEADERBOARD_KEYWORD))
}

pub fn extract_mentions(text: &str) -> Vec<String> {
    MessageUtils::extract_mentions(text)
}
