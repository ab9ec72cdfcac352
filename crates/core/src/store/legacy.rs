//! Migration of unversioned documents written by the original tracker.
//!
//! Those documents store durations as `HH:MM:SS` strings, timestamps as naive
//! local ISO strings, session notes and ratings either as separate `note` /
//! `rating` fields or inside a `feedback` object, and pauses either as
//! paired records or as a flat list of `paused_at` / `resumed_at` events.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{Store, CURRENT_FORMAT_VERSION};
use crate::{
    models::{
        Feedback, Game, GameStatus, Pause, Preferences, Rating, Session, Stars, StatusChange, Tag,
    },
    timefmt::{parse_date, parse_hms, parse_timestamp},
};

#[derive(Debug, Deserialize)]
struct LegacyDocument {
    games: Vec<LegacyGame>,
    #[serde(default)]
    last_modified: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyGame {
    name: Option<String>,
    release_date: Option<String>,
    platform: Option<String>,
    time_played: Option<String>,
    status: Option<String>,
    owned: Option<bool>,
    last_played: Option<String>,
    sessions: Vec<LegacySession>,
    status_history: Vec<LegacyStatusChange>,
    rating: Option<LegacyRating>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacySession {
    start: Option<String>,
    end: Option<String>,
    duration: Option<String>,
    pauses: Vec<LegacyPause>,
    note: Option<String>,
    rating: Option<LegacyRating>,
    feedback: Option<LegacyFeedback>,
    manual: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyPause {
    paused_at: Option<String>,
    resumed_at: Option<String>,
    pause_duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyFeedback {
    text: Option<String>,
    rating: Option<LegacyRating>,
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyRating {
    stars: Option<f64>,
    tags: Vec<String>,
    comment: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyStatusChange {
    from: Option<String>,
    to: Option<String>,
    timestamp: Option<String>,
}

/// Rating summary lines the original embedded into free-text notes.
static RATING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Rating:\s*[★☆]+").expect("invalid rating line regex"));

/// Convert a legacy document into the current layout.
pub(super) fn migrate(raw: Value) -> Result<Store, String> {
    let document: LegacyDocument =
        serde_json::from_value(raw).map_err(|err| format!("legacy document: {err}"))?;

    let mut games: Vec<Game> = Vec::with_capacity(document.games.len());
    for (index, legacy) in document.games.into_iter().enumerate() {
        let name = legacy.name.clone().unwrap_or_default();
        if name.trim().is_empty() {
            warn!(index, "Skipping legacy game without a name");
            continue;
        }
        let game = migrate_game(name.trim().to_string(), legacy);
        let key = Game::name_key(&game.name);
        match games
            .iter_mut()
            .find(|existing| Game::name_key(&existing.name) == key)
        {
            Some(existing) => {
                warn!(game = %game.name, into = %existing.name, "Merging duplicate legacy game");
                fold_duplicate(existing, game);
            }
            None => games.push(game),
        }
    }

    Ok(Store {
        format_version: CURRENT_FORMAT_VERSION,
        last_modified: document.last_modified.as_deref().and_then(parse_timestamp),
        preferences: Preferences::default(),
        games,
    })
}

/// Keep one entry per name: playtime and sessions of a repeated game move
/// into the first entry.
fn fold_duplicate(existing: &mut Game, duplicate: Game) {
    existing.baseline_secs += duplicate.baseline_secs;
    existing.sessions.extend(duplicate.sessions);
    existing.sessions.sort_by_key(|session| session.start);
    existing.last_played = existing.last_played.max(duplicate.last_played);
    existing.owned |= duplicate.owned;
    if existing.rating.is_none() {
        existing.rating = duplicate.rating;
    }
}

fn migrate_game(name: String, legacy: LegacyGame) -> Game {
    let release_date = legacy
        .release_date
        .as_deref()
        .filter(|value| !matches!(value.trim(), "" | "-"))
        .and_then(|value| {
            let parsed = parse_date(value);
            if parsed.is_none() {
                warn!(game = %name, value, "Dropping unparseable release date");
            }
            parsed
        });

    let status = legacy
        .status
        .as_deref()
        .and_then(|value| value.parse::<GameStatus>().ok())
        .unwrap_or_default();

    let sessions: Vec<Session> = legacy
        .sessions
        .into_iter()
        .filter_map(|session| {
            let migrated = migrate_session(session);
            if migrated.is_none() {
                warn!(game = %name, "Dropping legacy session with unusable timestamps");
            }
            migrated
        })
        .collect();

    let recorded_total = legacy
        .time_played
        .as_deref()
        .and_then(parse_hms)
        .unwrap_or(Duration::ZERO);
    let session_total: Duration = sessions.iter().map(Session::elapsed).sum();
    let baseline_secs = recorded_total.saturating_sub(session_total).as_secs();

    let status_history = legacy
        .status_history
        .into_iter()
        .filter_map(|change| {
            Some(StatusChange {
                from: change.from.as_deref().and_then(|value| value.parse().ok()),
                to: change.to.as_deref()?.parse().ok()?,
                timestamp: change.timestamp.as_deref().and_then(parse_timestamp)?,
            })
        })
        .collect();

    let fallback = Utc::now();
    let mut game = Game::new(name);
    game.platform = legacy.platform.unwrap_or_default().trim().to_string();
    game.release_date = release_date;
    game.owned = legacy.owned.unwrap_or(false);
    game.status = status;
    game.baseline_secs = baseline_secs;
    game.last_played = legacy
        .last_played
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| sessions.iter().filter_map(|session| session.end).max());
    game.sessions = sessions;
    game.status_history = status_history;
    game.rating = legacy
        .rating
        .and_then(|rating| migrate_rating(rating, fallback));
    game
}

fn migrate_session(legacy: LegacySession) -> Option<Session> {
    let start = parse_timestamp(legacy.start.as_deref()?)?;
    let recorded = legacy.duration.as_deref().and_then(parse_hms);
    let pauses = migrate_pauses(legacy.pauses);
    let paused_secs: u64 = pauses.iter().map(|pause| pause.duration_secs).sum();

    let end = match legacy.end.as_deref().and_then(parse_timestamp) {
        Some(end) => end,
        None => {
            let elapsed = recorded?;
            start + chrono::Duration::seconds((elapsed.as_secs() + paused_secs) as i64)
        }
    };
    if end < start {
        return None;
    }

    let elapsed_secs = match recorded {
        Some(duration) => duration.as_secs(),
        None => ((end - start).num_seconds().max(0) as u64).saturating_sub(paused_secs),
    };

    let feedback = migrate_feedback(
        start,
        legacy.feedback,
        legacy.note,
        legacy.rating,
    );

    Some(Session {
        start,
        end: Some(end),
        elapsed_secs,
        pauses,
        manual: legacy.manual.unwrap_or(false),
        feedback,
    })
}

/// Normalize both pause layouts into paired records.
fn migrate_pauses(legacy: Vec<LegacyPause>) -> Vec<Pause> {
    let mut pauses: Vec<Pause> = Vec::new();
    let mut open: Option<DateTime<Utc>> = None;

    for entry in legacy {
        let paused_at = entry.paused_at.as_deref().and_then(parse_timestamp);
        let resumed_at = entry.resumed_at.as_deref().and_then(parse_timestamp);
        match (paused_at, resumed_at) {
            (Some(paused_at), Some(resumed_at)) if resumed_at >= paused_at => {
                let duration_secs = entry
                    .pause_duration
                    .as_deref()
                    .and_then(parse_hms)
                    .map(|duration| duration.as_secs())
                    .unwrap_or_else(|| (resumed_at - paused_at).num_seconds() as u64);
                pauses.push(Pause {
                    paused_at,
                    resumed_at: Some(resumed_at),
                    duration_secs,
                });
            }
            (Some(paused_at), None) => {
                if let Some(previous) = open.replace(paused_at) {
                    pauses.push(unfinished_pause(previous));
                }
            }
            (None, Some(resumed_at)) => {
                if let Some(paused_at) = open.take() {
                    if resumed_at >= paused_at {
                        pauses.push(Pause {
                            paused_at,
                            resumed_at: Some(resumed_at),
                            duration_secs: (resumed_at - paused_at).num_seconds() as u64,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(paused_at) = open {
        pauses.push(unfinished_pause(paused_at));
    }
    pauses
}

fn unfinished_pause(paused_at: DateTime<Utc>) -> Pause {
    Pause {
        paused_at,
        resumed_at: None,
        duration_secs: 0,
    }
}

fn migrate_feedback(
    start: DateTime<Utc>,
    feedback: Option<LegacyFeedback>,
    note: Option<String>,
    rating: Option<LegacyRating>,
) -> Option<Feedback> {
    let migrated = match feedback {
        Some(feedback) => {
            let recorded_at = feedback
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(start);
            Feedback {
                notes: clean_text(feedback.text.as_deref().unwrap_or_default()),
                rating: feedback
                    .rating
                    .and_then(|rating| migrate_rating(rating, recorded_at)),
                recorded_at,
            }
        }
        None => {
            let notes = note.as_deref().map(strip_rating_lines).and_then(|text| clean_text(&text));
            Feedback {
                notes,
                rating: rating.and_then(|rating| migrate_rating(rating, start)),
                recorded_at: start,
            }
        }
    };
    (!migrated.is_empty()).then_some(migrated)
}

fn migrate_rating(legacy: LegacyRating, fallback: DateTime<Utc>) -> Option<Rating> {
    let stars = legacy.stars?.round();
    if !(1.0..=5.0).contains(&stars) {
        return None;
    }
    let stars = Stars::new(stars as u8).ok()?;
    let mut tags: Vec<Tag> = legacy
        .tags
        .iter()
        .filter_map(|label| {
            let tag = Tag::from_label(label);
            if tag.is_none() {
                warn!(label = %label, "Dropping unknown legacy tag");
            }
            tag
        })
        .collect();
    tags.sort();
    tags.dedup();
    Some(Rating {
        stars,
        tags,
        comment: legacy.comment.as_deref().and_then(clean_text),
        rated_at: legacy
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback),
    })
}

fn strip_rating_lines(note: &str) -> String {
    note.lines()
        .filter(|line| !RATING_LINE.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
