//! Shared domain models.

mod tags;

use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use tags::{Sentiment, Tag};

use crate::error::LibraryError;

/// Progress category of a game.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Currently being played.
    InProgress,
    /// Finished.
    Completed,
}

impl GameStatus {
    /// All statuses in display order.
    pub const ALL: [GameStatus; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    /// Status following this one, wrapping around.
    pub fn next(self) -> Self {
        match self {
            Self::Pending => Self::InProgress,
            Self::InProgress => Self::Completed,
            Self::Completed => Self::Pending,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "Pending",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
        })
    }
}

impl FromStr for GameStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "in progress" | "inprogress" | "playing" => Ok(Self::InProgress),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            _ => Err(format!("unknown status {value:?}")),
        }
    }
}

/// A star rating between one and five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stars(u8);

impl Stars {
    /// Validate a raw star count.
    pub fn new(value: u8) -> Result<Self, LibraryError> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(LibraryError::InvalidRating(value))
        }
    }

    /// Raw star count.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Render as filled and empty star glyphs.
    pub fn glyphs(self) -> String {
        let filled = self.0 as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
    }
}

impl TryFrom<u8> for Stars {
    type Error = LibraryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stars> for u8 {
    fn from(value: Stars) -> Self {
        value.0
    }
}

/// Star rating with optional tags and comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Star count.
    pub stars: Stars,
    /// Descriptive tags, sorted and deduplicated.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Free-text comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the rating was given.
    pub rated_at: DateTime<Utc>,
}

impl Rating {
    /// Rating stamped with the current time.
    pub fn new(stars: Stars, tags: Vec<Tag>, comment: Option<String>) -> Self {
        let mut tags = tags;
        tags.sort();
        tags.dedup();
        Self {
            stars,
            tags,
            comment: comment
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            rated_at: Utc::now(),
        }
    }
}

/// Notes and/or rating attached to a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Session rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    /// When the feedback was entered.
    pub recorded_at: DateTime<Utc>,
}

impl Feedback {
    /// True when neither notes nor a rating are present.
    pub fn is_empty(&self) -> bool {
        self.notes.as_deref().map_or(true, str::is_empty) && self.rating.is_none()
    }
}

/// One pause inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pause {
    /// Wall-clock time the pause began.
    pub paused_at: DateTime<Utc>,
    /// Absent when the session was stopped while paused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
    /// Monotonic length of the pause.
    #[serde(default)]
    pub duration_secs: u64,
}

/// A timed (or manually entered) play interval for a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Wall-clock start.
    pub start: DateTime<Utc>,
    /// Wall-clock end; absent while the session is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Running time excluding pauses.
    pub elapsed_secs: u64,
    /// Pauses in order.
    #[serde(default)]
    pub pauses: Vec<Pause>,
    /// Entered by hand rather than timed.
    #[serde(default)]
    pub manual: bool,
    /// Notes and rating added after the session ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Session {
    /// Played time excluding pauses.
    pub fn elapsed(&self) -> Duration {
        Duration::from_secs(self.elapsed_secs)
    }

    /// Total time spent paused.
    pub fn paused(&self) -> Duration {
        Duration::from_secs(self.pauses.iter().map(|pause| pause.duration_secs).sum())
    }

    /// Star rating from the feedback, if any.
    pub fn stars(&self) -> Option<Stars> {
        self.feedback
            .as_ref()
            .and_then(|feedback| feedback.rating.as_ref())
            .map(|rating| rating.stars)
    }

    /// Check the invariants of a finalized session.
    pub fn validate(&self) -> Result<(), String> {
        let end = self.end.ok_or_else(|| "session has no end timestamp".to_string())?;
        if end < self.start {
            return Err(format!("session ends ({end}) before it starts ({})", self.start));
        }
        for pause in &self.pauses {
            if let Some(resumed_at) = pause.resumed_at {
                if resumed_at < pause.paused_at {
                    return Err(format!(
                        "pause resumes ({resumed_at}) before it starts ({})",
                        pause.paused_at
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Record of a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Absent for the entry recorded when the game was added.
    #[serde(default)]
    pub from: Option<GameStatus>,
    /// Status after the change.
    pub to: GameStatus,
    /// When the change happened.
    pub timestamp: DateTime<Utc>,
}

/// A game in the library together with its play history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    /// Unique (case-insensitive) title.
    pub name: String,
    /// Platform label; empty when unknown.
    #[serde(default)]
    pub platform: String,
    /// Absent when the release date is unknown.
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    /// Whether the user owns a copy.
    #[serde(default)]
    pub owned: bool,
    /// Progress category.
    #[serde(default)]
    pub status: GameStatus,
    /// End of the latest session.
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
    /// Playtime recorded outside of tracked sessions, e.g. from an import.
    #[serde(default)]
    pub baseline_secs: u64,
    /// Finished sessions, oldest first.
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Status transitions, oldest first.
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    /// Overall rating of the game.
    #[serde(default)]
    pub rating: Option<Rating>,
}

impl Game {
    /// A pending game with no history.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: String::new(),
            release_date: None,
            owned: false,
            status: GameStatus::Pending,
            last_played: None,
            baseline_secs: 0,
            sessions: Vec::new(),
            status_history: Vec::new(),
            rating: None,
        }
    }

    /// Key under which names are unique: trimmed and lowercased, Unicode aware.
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Returns a user-facing label combining name and platform.
    pub fn display_name(&self) -> String {
        if self.platform.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} · {}", self.name, self.platform)
        }
    }

    /// Sum of tracked session time.
    pub fn session_playtime(&self) -> Duration {
        self.sessions.iter().map(Session::elapsed).sum()
    }

    /// Baseline plus tracked session time.
    pub fn total_playtime(&self) -> Duration {
        Duration::from_secs(self.baseline_secs) + self.session_playtime()
    }

    /// Latest end timestamp among the sessions.
    pub fn latest_session_end(&self) -> Option<DateTime<Utc>> {
        self.sessions.iter().filter_map(|session| session.end).max()
    }
}

/// User preferences persisted inside the store document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Report presence to Discord.
    #[serde(default = "default_true")]
    pub discord_enabled: bool,
    /// Prompt for feedback after each session.
    #[serde(default)]
    pub notes_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            discord_enabled: true,
            notes_enabled: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_parses_loose_spellings() {
        assert_eq!("In progress".parse::<GameStatus>(), Ok(GameStatus::InProgress));
        assert_eq!("in_progress".parse::<GameStatus>(), Ok(GameStatus::InProgress));
        assert_eq!(" COMPLETED ".parse::<GameStatus>(), Ok(GameStatus::Completed));
        assert!("abandoned".parse::<GameStatus>().is_err());
    }

    #[test]
    fn stars_reject_out_of_range_values() {
        assert!(Stars::new(0).is_err());
        assert!(Stars::new(6).is_err());
        assert_eq!(Stars::new(3).unwrap().glyphs(), "★★★☆☆");
        assert!(serde_json::from_str::<Stars>("7").is_err());
    }

    #[test]
    fn session_validation_rejects_reversed_interval() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut session = Session {
            start,
            end: Some(start - chrono::Duration::seconds(5)),
            elapsed_secs: 0,
            pauses: Vec::new(),
            manual: false,
            feedback: None,
        };
        assert!(session.validate().is_err());
        session.end = Some(start + chrono::Duration::seconds(5));
        assert!(session.validate().is_ok());
        session.end = None;
        assert!(session.validate().is_err());
    }

    #[test]
    fn total_playtime_includes_baseline() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut game = Game::new("Celeste");
        game.baseline_secs = 600;
        game.sessions.push(Session {
            start,
            end: Some(start + chrono::Duration::seconds(90)),
            elapsed_secs: 90,
            pauses: Vec::new(),
            manual: false,
            feedback: None,
        });
        assert_eq!(game.total_playtime(), Duration::from_secs(690));
        assert_eq!(game.latest_session_end(), session_end(&game));
    }

    fn session_end(game: &Game) -> Option<DateTime<Utc>> {
        game.sessions.first().and_then(|session| session.end)
    }
}
