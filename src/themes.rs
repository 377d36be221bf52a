//! Congratulatory reply themes.
//!
//! The catalog is built once at startup and shared read-only between the
//! event loop and anything else that renders replies.

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

pub const TARGET_MARKER: &str = "{target}";
pub const GENERIC_REACTION_COUNT: usize = 3;

const NOBODY_IN_PARTICULAR: &str = "everyone";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThemeError {
    #[error("theme catalog must contain at least one theme")]
    EmptyCatalog,
    #[error("theme {id} template is missing the {{target}} marker")]
    MissingMarker { id: i32 },
    #[error("duplicate theme id {0}")]
    DuplicateId(i32),
    #[error("reaction pool has {available} marks, {requested} requested")]
    PoolTooSmall { requested: usize, available: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub id: i32,
    pub template: String,
    /// Fixed celebratory marks. Empty means "pick from the generic pool".
    pub reactions: Vec<String>,
}

impl Theme {
    pub fn new(id: i32, template: &str, reactions: &[&str]) -> Self {
        Self {
            id,
            template: template.to_string(),
            reactions: reactions.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn full_message(&self, recipients: &[String]) -> String {
        self.template
            .replacen(TARGET_MARKER, &join_recipients(recipients), 1)
    }
}

/// "everyone", "A", "A and B", "A, B, and C".
pub fn join_recipients(recipients: &[String]) -> String {
    match recipients {
        [] => NOBODY_IN_PARTICULAR.to_string(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

#[derive(Debug, Clone)]
pub struct ThemeCatalog {
    themes: Vec<Theme>,
    reaction_pool: Vec<String>,
}

impl ThemeCatalog {
    pub fn new(themes: Vec<Theme>, reaction_pool: Vec<String>) -> Result<Self, ThemeError> {
        if themes.is_empty() {
            return Err(ThemeError::EmptyCatalog);
        }
        for (index, theme) in themes.iter().enumerate() {
            if !theme.template.contains(TARGET_MARKER) {
                return Err(ThemeError::MissingMarker { id: theme.id });
            }
            if themes[..index].iter().any(|other| other.id == theme.id) {
                return Err(ThemeError::DuplicateId(theme.id));
            }
        }
        Ok(Self {
            themes,
            reaction_pool,
        })
    }

    /// The shipped themes, checked the same way as any other catalog.
    pub fn builtin() -> Result<Self, ThemeError> {
        Self::new(
            builtin_themes(),
            BUILTIN_REACTIONS.iter().map(|r| r.to_string()).collect(),
        )
    }

    pub fn get(&self, id: i32) -> Option<&Theme> {
        self.themes.iter().find(|theme| theme.id == id)
    }

    /// Uniform pick. The catalog is never empty once constructed.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &Theme {
        &self.themes[rng.gen_range(0..self.themes.len())]
    }

    pub fn pick_generic_reactions<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
    ) -> Result<Vec<String>, ThemeError> {
        if self.reaction_pool.len() < count {
            return Err(ThemeError::PoolTooSmall {
                requested: count,
                available: self.reaction_pool.len(),
            });
        }
        Ok(self
            .reaction_pool
            .choose_multiple(rng, count)
            .cloned()
            .collect())
    }

    /// Fixed marks of the theme, or `GENERIC_REACTION_COUNT` pool marks when
    /// the theme has none or is unknown.
    pub fn celebration_reactions<R: Rng + ?Sized>(
        &self,
        theme_id: i32,
        rng: &mut R,
    ) -> Result<Vec<String>, ThemeError> {
        match self.get(theme_id) {
            Some(theme) if !theme.reactions.is_empty() => Ok(theme.reactions.clone()),
            _ => self.pick_generic_reactions(rng, GENERIC_REACTION_COUNT),
        }
    }
}

#[cfg(test)]
impl ThemeCatalog {
    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn reaction_pool(&self) -> &[String] {
        &self.reaction_pool
    }
}

const BUILTIN_REACTIONS: [&str; 31] = [
    "thumbsup",
    "fire",
    "hot_pepper",
    "handshake",
    "ok_hand",
    "the_horns",
    "muscle",
    "heart",
    "sunglasses",
    "smile",
    "tada",
    "clap",
    "partyparrot",
    "joy",
    "star-struck",
    "bomb",
    "boom",
    "dizzy",
    "love_letter",
    "gem",
    "confetti_ball",
    "gift",
    "medal",
    "trophy",
    "sports_medal",
    "first_place_medal",
    "rocket",
    "rainbow",
    "white_check_mark",
    "bangbang",
    "100",
];

fn builtin_themes() -> Vec<Theme> {
    vec![
        Theme::new(1, "You're the bomb dot com, {target}!", &["fire", "bomb"]),
        Theme::new(2, "Hot stuff, {target}!", &["fire", "hot_pepper"]),
        Theme::new(3, "Keep it going, {target}!", &["fire"]),
        Theme::new(4, "Great job, {target}!", &["fire"]),
        Theme::new(5, "I bet you sweat glitter, {target}. Great work!", &[]),
        Theme::new(6, "You're more fun than bubble wrap, {target}!", &[]),
        Theme::new(7, "I like your style, {target}!", &[]),
        Theme::new(8, "You've inspired us all, {target}!", &[]),
        Theme::new(9, "You're a smart cookie, {target}.", &[]),
        Theme::new(
            10,
            "When you say, \"I meant to do that,\" we totally believe you, {target}.",
            &[],
        ),
        Theme::new(11, "You sure are great at figuring stuff out, {target}.", &[]),
        Theme::new(12, "I bet you do crossword puzzles in ink, {target}.", &[]),
        Theme::new(13, "You are making a difference, {target}!", &[]),
        Theme::new(
            14,
            "Actions speak louder than words, and yours tell an incredible story, {target}.",
            &[],
        ),
        Theme::new(15, "Being around you makes everything better, {target}.", &[]),
        Theme::new(16, "You're a gift to those around you, {target}.", &[]),
        Theme::new(17, "You're doing great, {target}.", &[]),
        Theme::new(
            18,
            "You're all that and a super-size bag of chips, {target}.",
            &[],
        ),
        Theme::new(19, "On a scale from 1 to 10, you're an 11, {target}.", &[]),
        Theme::new(
            20,
            "You're better than a triple-scoop ice cream cone, {target}. With sprinkles.",
            &[],
        ),
        Theme::new(21, "There's ordinary, and then there's you, {target}.", &[]),
        Theme::new(
            22,
            "You're even better than a unicorn because you're real, {target}.",
            &[],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use test_case::test_case;

    use super::{GENERIC_REACTION_COUNT, Theme, ThemeCatalog, ThemeError, join_recipients};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test_case(&[] => "cool everyone"; "nobody")]
    #[test_case(&["A"] => "cool A"; "one")]
    #[test_case(&["A", "B"] => "cool A and B"; "two")]
    #[test_case(&["A", "B", "C"] => "cool A, B, and C"; "three")]
    #[test_case(&["A", "B", "C", "D"] => "cool A, B, C, and D"; "four")]
    fn full_message_joins_recipients(recipients: &[&str]) -> String {
        Theme::new(0, "cool {target}", &[]).full_message(&names(recipients))
    }

    #[test]
    fn full_message_replaces_only_first_marker() {
        let theme = Theme::new(0, "{target} and {target}", &[]);
        assert_eq!(theme.full_message(&names(&["nick"])), "nick and {target}");
    }

    #[test]
    fn join_keeps_mention_tokens_intact() {
        assert_eq!(
            join_recipients(&names(&["<@U1>", "<@U2>", "<@U3>"])),
            "<@U1>, <@U2>, and <@U3>"
        );
    }

    fn builtin() -> ThemeCatalog {
        ThemeCatalog::builtin().expect("builtin themes validate")
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = builtin();
        assert_eq!(catalog.len(), 22);
        assert_eq!(catalog.reaction_pool().len(), 31);
        assert_eq!(
            catalog.get(1).map(|theme| theme.reactions.clone()),
            Some(names(&["fire", "bomb"]))
        );
    }

    #[test]
    fn select_is_reproducible_with_seeded_rng() {
        let catalog = builtin();
        let first: Vec<i32> = {
            let mut rng = StdRng::seed_from_u64(7);
            (0..20).map(|_| catalog.select(&mut rng).id).collect()
        };
        let second: Vec<i32> = {
            let mut rng = StdRng::seed_from_u64(7);
            (0..20).map(|_| catalog.select(&mut rng).id).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn select_reaches_every_theme() {
        let catalog = builtin();
        let mut rng = StdRng::seed_from_u64(42);
        let seen: HashSet<i32> = (0..2_000).map(|_| catalog.select(&mut rng).id).collect();
        assert_eq!(seen.len(), catalog.len());
    }

    #[test]
    fn generic_reactions_are_distinct_pool_members() {
        let catalog = builtin();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let picked = catalog
                .pick_generic_reactions(&mut rng, GENERIC_REACTION_COUNT)
                .expect("pool is large enough");
            let unique: HashSet<&String> = picked.iter().collect();
            assert_eq!(unique.len(), GENERIC_REACTION_COUNT);
            assert!(picked.iter().all(|r| catalog.reaction_pool().contains(r)));
        }
    }

    #[test]
    fn generic_reactions_fail_on_small_pool() {
        let catalog =
            ThemeCatalog::new(vec![Theme::new(1, "hi {target}", &[])], names(&["fire", "tada"]))
                .expect("valid catalog");
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            catalog.pick_generic_reactions(&mut rng, 3),
            Err(ThemeError::PoolTooSmall {
                requested: 3,
                available: 2
            })
        );
    }

    #[test]
    fn celebration_prefers_fixed_theme_reactions() {
        let catalog = builtin();
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(
            catalog.celebration_reactions(2, &mut rng).expect("fixed marks"),
            names(&["fire", "hot_pepper"])
        );
        assert_eq!(
            catalog.celebration_reactions(6, &mut rng).expect("generic marks").len(),
            GENERIC_REACTION_COUNT
        );
        assert_eq!(
            catalog.celebration_reactions(999, &mut rng).expect("unknown theme").len(),
            GENERIC_REACTION_COUNT
        );
    }

    #[test_case(vec![] => Err(ThemeError::EmptyCatalog); "empty")]
    #[test_case(vec![Theme::new(4, "no marker", &[])] => Err(ThemeError::MissingMarker { id: 4 }); "missing marker")]
    #[test_case(
        vec![Theme::new(1, "a {target}", &[]), Theme::new(1, "b {target}", &[])]
        => Err(ThemeError::DuplicateId(1)); "duplicate id")]
    fn catalog_rejects_invalid_themes(themes: Vec<Theme>) -> Result<usize, ThemeError> {
        ThemeCatalog::new(themes, Vec::new()).map(|catalog| catalog.len())
    }
}
