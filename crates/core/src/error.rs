//! Domain error types shared across the core crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::timer::TimerStatus;

/// Failures raised while loading or saving the store document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document could not be parsed or failed validation.
    #[error("store {} is corrupt: {reason}", path.display())]
    Corrupt {
        /// Location of the offending document.
        path: PathBuf,
        /// Human readable description of the problem.
        reason: String,
    },
    /// The document was written by a newer release.
    #[error(
        "store {} uses format version {found}, newest supported is {supported}",
        path.display()
    )]
    UnsupportedVersion {
        /// Location of the offending document.
        path: PathBuf,
        /// Version marker found in the document.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },
    /// Filesystem access failed.
    #[error("failed to access store {}", path.display())]
    Io {
        /// Path that was being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Invalid operations on a single session timer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The requested action is not allowed from the current state.
    #[error("cannot {action} a timer that is {from}")]
    InvalidTransition {
        /// State the timer was in.
        from: TimerStatus,
        /// Action that was attempted.
        action: &'static str,
    },
    /// `stop` was called on a timer that has already been finalized.
    #[error("session has already been stopped")]
    AlreadyStopped,
}

/// Failures of the process-wide tracking context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// Another session is running or paused.
    #[error("already tracking a session for {game}")]
    AlreadyTracking {
        /// Game whose session is still active.
        game: String,
    },
    /// No session is active.
    #[error("no session is being tracked")]
    NotTracking,
    /// The active timer rejected the action.
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Validation failures of library mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// No game matches the name.
    #[error("no game named {0}")]
    UnknownGame(String),
    /// Another game already uses the name, ignoring case.
    #[error("a game named {0} already exists")]
    DuplicateGame(String),
    /// The session index is out of range.
    #[error("game {game} has no session #{index}")]
    UnknownSession {
        /// Game that was addressed.
        game: String,
        /// Zero-based index that was requested.
        index: usize,
    },
    /// A session failed its invariants and was not recorded.
    #[error("invalid session for {game}: {reason}")]
    InvalidSession {
        /// Game the session belongs to.
        game: String,
        /// Broken invariant.
        reason: String,
    },
    /// Names must contain something other than whitespace.
    #[error("game name must not be empty")]
    EmptyName,
    /// Star counts are limited to 1..=5.
    #[error("rating must be between 1 and 5 stars, got {0}")]
    InvalidRating(u8),
}

/// Failures while converting spreadsheet rows into games.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file could not be opened or read as a workbook.
    #[error("failed to open workbook {}: {reason}", path.display())]
    Workbook {
        /// File that was opened.
        path: PathBuf,
        /// Reader error.
        reason: String,
    },
    /// There is no worksheet or it holds no cells.
    #[error("workbook contains no worksheet")]
    EmptyWorkbook,
    /// No row carries a Name header.
    #[error("no header row containing a Name column was found")]
    MissingHeader,
    /// A required column is absent from the header row.
    #[error("required column {0} is missing")]
    MissingColumn(&'static str),
    /// A Status cell holds unknown text.
    #[error("row {row}: unknown status {value:?}")]
    InvalidStatus {
        /// One-based sheet row.
        row: usize,
        /// Cell text.
        value: String,
    },
    /// A Time cell is not `HH:MM[:SS]`.
    #[error("row {row}: invalid play time {value:?}")]
    InvalidTime {
        /// One-based sheet row.
        row: usize,
        /// Cell text.
        value: String,
    },
    /// A date cell is neither a date nor an Excel serial.
    #[error("row {row}: invalid date {value:?}")]
    InvalidDate {
        /// One-based sheet row.
        row: usize,
        /// Cell text.
        value: String,
    },
}

/// Failures of the optional presence side channel. Never surfaced to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// The client library or the chat client is not reachable.
    #[error("presence integration unavailable: {0}")]
    IntegrationUnavailable(String),
}
