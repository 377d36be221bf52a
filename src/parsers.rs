pub mod classifier;
pub mod common;

pub use classifier::{extract_mentions, is_leaderboard_query, is_recognition_message};
pub use common::{MessageUtils, ParsedMessage};
