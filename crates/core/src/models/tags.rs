//! Fixed vocabulary of descriptive rating tags.

use std::fmt;

use serde::{Deserialize, Serialize};

const NEGATIVE: [&str; 10] = [
    "Boring",
    "Frustrating",
    "Buggy",
    "Repetitive",
    "Confusing",
    "Grindy",
    "Unbalanced",
    "Broken",
    "Disappointing",
    "Overrated",
];

const NEUTRAL: [&str; 10] = [
    "Challenging",
    "Linear",
    "Open-world",
    "Short",
    "Long",
    "Casual",
    "Hardcore",
    "Nostalgic",
    "Retro",
    "Complex",
];

const POSITIVE: [&str; 20] = [
    "Fun",
    "Amazing",
    "Immersive",
    "Story-rich",
    "Rewarding",
    "Addictive",
    "Beautiful",
    "Creative",
    "Innovative",
    "Polished",
    "Relaxing",
    "Engaging",
    "Epic",
    "Hilarious",
    "Atmospheric",
    "Memorable",
    "Satisfying",
    "Unique",
    "Well-designed",
    "Masterpiece",
];

const VOCABULARY_LEN: usize = NEGATIVE.len() + NEUTRAL.len() + POSITIVE.len();

/// Tone of a tag, used to group tags in pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentiment {
    /// Complaints.
    Negative,
    /// Descriptive, neither good nor bad.
    Neutral,
    /// Praise.
    Positive,
}

/// A tag drawn from the fixed vocabulary.
///
/// Tags order by their position in the vocabulary and serialize as their label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(u8);

impl Tag {
    /// Iterate the whole vocabulary in display order.
    pub fn all() -> impl Iterator<Item = Tag> {
        (0..VOCABULARY_LEN as u8).map(Tag)
    }

    /// Tags belonging to one sentiment group.
    pub fn with_sentiment(sentiment: Sentiment) -> impl Iterator<Item = Tag> {
        Self::all().filter(move |tag| tag.sentiment() == sentiment)
    }

    /// Look a tag up by label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Tag> {
        let needle = label.trim();
        Self::all().find(|tag| tag.label().eq_ignore_ascii_case(needle))
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        let index = self.0 as usize;
        if index < NEGATIVE.len() {
            NEGATIVE[index]
        } else if index < NEGATIVE.len() + NEUTRAL.len() {
            NEUTRAL[index - NEGATIVE.len()]
        } else {
            POSITIVE[index - NEGATIVE.len() - NEUTRAL.len()]
        }
    }

    /// Sentiment group of the tag.
    pub fn sentiment(self) -> Sentiment {
        let index = self.0 as usize;
        if index < NEGATIVE.len() {
            Sentiment::Negative
        } else if index < NEGATIVE.len() + NEUTRAL.len() {
            Sentiment::Neutral
        } else {
            Sentiment::Positive
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Tag::from_label(&value).ok_or_else(|| format!("unknown tag {value:?}"))
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_is_grouped_by_sentiment() {
        assert_eq!(Tag::all().count(), 40);
        assert_eq!(Tag::with_sentiment(Sentiment::Negative).count(), 10);
        assert_eq!(Tag::with_sentiment(Sentiment::Neutral).count(), 10);
        assert_eq!(Tag::with_sentiment(Sentiment::Positive).count(), 20);
    }

    #[test]
    fn labels_resolve_case_insensitively() {
        let tag = Tag::from_label(" story-RICH ").expect("known tag");
        assert_eq!(tag.label(), "Story-rich");
        assert_eq!(tag.sentiment(), Sentiment::Positive);
        assert!(Tag::from_label("Mediocre").is_none());
    }

    #[test]
    fn unknown_labels_fail_to_deserialize() {
        let parsed: Vec<Tag> = serde_json::from_str(r#"["Fun", "Grindy"]"#).unwrap();
        assert_eq!(parsed[0].label(), "Fun");
        assert_eq!(parsed[1].sentiment(), Sentiment::Negative);
        assert!(serde_json::from_str::<Tag>(r#""Mediocre""#).is_err());
    }
}
