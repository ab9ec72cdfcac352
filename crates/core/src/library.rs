//! Mutations of a loaded [`Store`].
//!
//! None of these touch the filesystem; callers persist through
//! [`StoreManager`](crate::store::StoreManager) once a mutation succeeds.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::{
    error::LibraryError,
    models::{Feedback, Game, GameStatus, Rating, Session, StatusChange},
    store::Store,
    tracker::FinishedSession,
};

/// Partial update applied by [`Store::update_game`].
#[derive(Debug, Clone, Default)]
pub struct GameEdit {
    /// New name, checked for clashes.
    pub name: Option<String>,
    /// New platform; empty clears it.
    pub platform: Option<String>,
    /// `Some(None)` clears the release date.
    pub release_date: Option<Option<NaiveDate>>,
    /// New ownership flag.
    pub owned: Option<bool>,
    /// New status, recorded in the history when it differs.
    pub status: Option<GameStatus>,
}

/// Outcome of merging imported games.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Games appended to the library.
    pub added: usize,
    /// Names already present, left untouched.
    pub skipped: Vec<String>,
}

impl Store {
    /// Index of a game by case-insensitive name.
    pub fn position(&self, name: &str) -> Option<usize> {
        let needle = Game::name_key(name);
        self.games
            .iter()
            .position(|game| Game::name_key(&game.name) == needle)
    }

    /// Look a game up by case-insensitive name.
    pub fn game(&self, name: &str) -> Option<&Game> {
        self.position(name).map(|index| &self.games[index])
    }

    /// Mutable variant of [`Store::game`].
    pub fn game_mut(&mut self, name: &str) -> Option<&mut Game> {
        self.position(name).map(move |index| &mut self.games[index])
    }

    fn require_mut(&mut self, name: &str) -> Result<&mut Game, LibraryError> {
        self.game_mut(name)
            .ok_or_else(|| LibraryError::UnknownGame(name.to_string()))
    }

    /// Add a game, recording its initial status in the history.
    pub fn add_game(&mut self, mut game: Game) -> Result<(), LibraryError> {
        game.name = game.name.trim().to_string();
        if game.name.is_empty() {
            return Err(LibraryError::EmptyName);
        }
        if self.position(&game.name).is_some() {
            return Err(LibraryError::DuplicateGame(game.name));
        }
        if game.status_history.is_empty() {
            game.status_history.push(StatusChange {
                from: None,
                to: game.status,
                timestamp: Utc::now(),
            });
        }
        info!(game = %game.name, "Game added");
        self.games.push(game);
        Ok(())
    }

    /// Remove a game with its sessions and return it.
    pub fn remove_game(&mut self, name: &str) -> Result<Game, LibraryError> {
        let index = self
            .position(name)
            .ok_or_else(|| LibraryError::UnknownGame(name.to_string()))?;
        let removed = self.games.remove(index);
        info!(game = %removed.name, sessions = removed.sessions.len(), "Game removed");
        Ok(removed)
    }

    /// Apply an edit. Renames are checked for clashes and status changes are
    /// recorded in the history.
    pub fn update_game(&mut self, name: &str, edit: GameEdit) -> Result<(), LibraryError> {
        let index = self
            .position(name)
            .ok_or_else(|| LibraryError::UnknownGame(name.to_string()))?;

        if let Some(new_name) = edit.name.as_deref().map(str::trim) {
            if new_name.is_empty() {
                return Err(LibraryError::EmptyName);
            }
            if let Some(other) = self.position(new_name) {
                if other != index {
                    return Err(LibraryError::DuplicateGame(new_name.to_string()));
                }
            }
        }

        let game = &mut self.games[index];
        if let Some(new_name) = edit.name {
            game.name = new_name.trim().to_string();
        }
        if let Some(platform) = edit.platform {
            game.platform = platform.trim().to_string();
        }
        if let Some(release_date) = edit.release_date {
            game.release_date = release_date;
        }
        if let Some(owned) = edit.owned {
            game.owned = owned;
        }
        if let Some(status) = edit.status {
            apply_status(game, status);
        }
        Ok(())
    }

    /// Change the status. Returns `true` when it actually changed.
    pub fn set_status(&mut self, name: &str, status: GameStatus) -> Result<bool, LibraryError> {
        let game = self.require_mut(name)?;
        Ok(apply_status(game, status))
    }

    /// Set or replace the overall rating of a game.
    pub fn rate_game(&mut self, name: &str, rating: Rating) -> Result<(), LibraryError> {
        let game = self.require_mut(name)?;
        game.rating = Some(rating);
        Ok(())
    }

    /// Drop the overall rating, returning the previous one.
    pub fn clear_game_rating(&mut self, name: &str) -> Result<Option<Rating>, LibraryError> {
        let game = self.require_mut(name)?;
        Ok(game.rating.take())
    }

    /// Append a finalized session and refresh the last-played timestamp.
    pub fn record_session(&mut self, finished: FinishedSession) -> Result<(), LibraryError> {
        let FinishedSession { game: name, session } = finished;
        session
            .validate()
            .map_err(|reason| LibraryError::InvalidSession {
                game: name.clone(),
                reason,
            })?;
        let game = self.require_mut(&name)?;
        let elapsed_secs = session.elapsed_secs;
        game.sessions.push(session);
        game.last_played = game.latest_session_end();
        info!(game = %game.name, elapsed_secs, "Session recorded");
        Ok(())
    }

    /// Record a session entered by hand rather than timed.
    pub fn add_manual_session(
        &mut self,
        name: &str,
        start: DateTime<Utc>,
        duration: Duration,
    ) -> Result<(), LibraryError> {
        let span = chrono::Duration::from_std(duration).map_err(|err| {
            LibraryError::InvalidSession {
                game: name.to_string(),
                reason: err.to_string(),
            }
        })?;
        let session = Session {
            start,
            end: Some(start + span),
            elapsed_secs: duration.as_secs(),
            pauses: Vec::new(),
            manual: true,
            feedback: None,
        };
        self.record_session(FinishedSession {
            game: name.to_string(),
            session,
        })
    }

    /// Attach or replace the feedback of a session.
    pub fn set_session_feedback(
        &mut self,
        name: &str,
        index: usize,
        feedback: Feedback,
    ) -> Result<(), LibraryError> {
        let game = self.require_mut(name)?;
        let game_name = game.name.clone();
        let session = game
            .sessions
            .get_mut(index)
            .ok_or(LibraryError::UnknownSession {
                game: game_name,
                index,
            })?;
        session.feedback = (!feedback.is_empty()).then_some(feedback);
        Ok(())
    }

    /// Append games whose names are not in the library yet.
    pub fn merge_imported(&mut self, games: Vec<Game>) -> MergeReport {
        let mut report = MergeReport::default();
        for game in games {
            let name = game.name.clone();
            match self.add_game(game) {
                Ok(()) => report.added += 1,
                Err(_) => report.skipped.push(name),
            }
        }
        info!(added = report.added, skipped = report.skipped.len(), "Import merged");
        report
    }
}

fn apply_status(game: &mut Game, status: GameStatus) -> bool {
    if game.status == status {
        return false;
    }
    game.status_history.push(StatusChange {
        from: Some(game.status),
        to: status,
        timestamp: Utc::now(),
    });
    info!(game = %game.name, from = %game.status, to = %status, "Status changed");
    game.status = status;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stars;
    use chrono::TimeZone;

    fn store_with(names: &[&str]) -> Store {
        let mut store = Store::default();
        for name in names {
            store.add_game(Game::new(*name)).unwrap();
        }
        store
    }

    fn finished(game: &str, start_hour: u32, elapsed_secs: u64) -> FinishedSession {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, start_hour, 0, 0).unwrap();
        FinishedSession {
            game: game.to_string(),
            session: Session {
                start,
                end: Some(start + chrono::Duration::seconds(elapsed_secs as i64)),
                elapsed_secs,
                pauses: Vec::new(),
                manual: false,
                feedback: None,
            },
        }
    }

    #[test]
    fn names_are_unique_ignoring_case() {
        let mut store = store_with(&["Celeste"]);
        assert_eq!(
            store.add_game(Game::new("  celeste ")),
            Err(LibraryError::DuplicateGame("celeste".to_string()))
        );
        assert_eq!(store.add_game(Game::new("   ")), Err(LibraryError::EmptyName));
        assert!(store.game("CELESTE").is_some());
        assert_eq!(store.games[0].status_history.len(), 1);
        assert_eq!(store.games[0].status_history[0].from, None);
    }

    #[test]
    fn non_ascii_names_clash_ignoring_case() {
        let mut store = store_with(&["Ōkami"]);
        assert_eq!(
            store.add_game(Game::new("ōkami")),
            Err(LibraryError::DuplicateGame("ōkami".to_string()))
        );
        assert_eq!(store.position("ŌKAMI"), Some(0));
    }

    #[test]
    fn status_history_only_records_changes() {
        let mut store = store_with(&["Hades"]);
        assert!(!store.set_status("Hades", GameStatus::Pending).unwrap());
        assert!(store.set_status("Hades", GameStatus::Completed).unwrap());
        let history = &store.game("Hades").unwrap().status_history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from, Some(GameStatus::Pending));
        assert_eq!(history[1].to, GameStatus::Completed);
        assert_eq!(
            store.set_status("Missing", GameStatus::Completed),
            Err(LibraryError::UnknownGame("Missing".to_string()))
        );
    }

    #[test]
    fn update_game_rejects_clashing_rename() {
        let mut store = store_with(&["Hades", "Celeste"]);
        let clash = GameEdit {
            name: Some("celeste".to_string()),
            ..GameEdit::default()
        };
        assert!(matches!(
            store.update_game("Hades", clash),
            Err(LibraryError::DuplicateGame(_))
        ));

        let edit = GameEdit {
            name: Some("Hades II".to_string()),
            platform: Some(" PC ".to_string()),
            release_date: Some(NaiveDate::from_ymd_opt(2024, 5, 6)),
            owned: Some(true),
            status: Some(GameStatus::InProgress),
        };
        store.update_game("hades", edit).unwrap();
        let game = store.game("Hades II").unwrap();
        assert_eq!(game.platform, "PC");
        assert!(game.owned);
        assert_eq!(game.status_history.len(), 2);
    }

    #[test]
    fn recording_sessions_updates_last_played() {
        let mut store = store_with(&["Hades"]);
        store.record_session(finished("Hades", 20, 600)).unwrap();
        store.record_session(finished("hades", 8, 300)).unwrap();
        let game = store.game("Hades").unwrap();
        assert_eq!(game.sessions.len(), 2);
        assert_eq!(game.last_played, game.sessions[0].end);
        assert_eq!(game.total_playtime(), Duration::from_secs(900));

        let mut bad = finished("Hades", 9, 60);
        bad.session.end = Some(bad.session.start - chrono::Duration::seconds(1));
        assert!(matches!(
            store.record_session(bad),
            Err(LibraryError::InvalidSession { .. })
        ));
        assert!(matches!(
            store.record_session(finished("Nope", 9, 60)),
            Err(LibraryError::UnknownGame(_))
        ));
    }

    #[test]
    fn manual_sessions_are_flagged() {
        let mut store = store_with(&["Tetris"]);
        let start = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        store
            .add_manual_session("Tetris", start, Duration::from_secs(1800))
            .unwrap();
        let session = &store.game("Tetris").unwrap().sessions[0];
        assert!(session.manual);
        assert_eq!(session.end, Some(start + chrono::Duration::minutes(30)));
    }

    #[test]
    fn session_feedback_can_be_added_later() {
        let mut store = store_with(&["Hades"]);
        store.record_session(finished("Hades", 20, 600)).unwrap();
        let feedback = Feedback {
            notes: Some("Great run".to_string()),
            rating: Some(Rating::new(Stars::new(4).unwrap(), Vec::new(), None)),
            recorded_at: Utc::now(),
        };
        store.set_session_feedback("Hades", 0, feedback).unwrap();
        assert_eq!(
            store.game("Hades").unwrap().sessions[0].stars().map(Stars::get),
            Some(4)
        );
        assert!(matches!(
            store.set_session_feedback(
                "Hades",
                3,
                Feedback {
                    notes: None,
                    rating: None,
                    recorded_at: Utc::now()
                }
            ),
            Err(LibraryError::UnknownSession { index: 3, .. })
        ));
    }

    #[test]
    fn merge_skips_existing_names() {
        let mut store = store_with(&["Hades"]);
        let report = store.merge_imported(vec![Game::new("hades"), Game::new("Celeste")]);
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped, vec!["hades".to_string()]);
        assert_eq!(store.games.len(), 2);
    }
}
