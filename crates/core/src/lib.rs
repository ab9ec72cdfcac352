#![warn(clippy::all, missing_docs)]

//! Core domain logic for GamesList.
//!
//! This crate hosts the game and session models, the session timer and its
//! tracking context, the JSON store, statistics, spreadsheet import and the
//! optional integrations used by the terminal UI.

pub mod config;
pub mod error;
pub mod import;
pub mod library;
pub mod models;
pub mod presence;
pub mod stats;
pub mod store;
pub mod timefmt;
pub mod timer;
pub mod tracker;
pub mod updates;

pub use config::AppConfig;
pub use error::{ImportError, LibraryError, PresenceError, StoreError, TimerError, TrackError};
pub use library::{GameEdit, MergeReport};
pub use models::{Feedback, Game, GameStatus, Rating, Session, Stars, Tag};
pub use stats::LibraryStats;
pub use store::{Store, StoreManager};
pub use timer::{Clock, SystemClock, TimerStatus};
pub use tracker::{FinishedSession, Tracker};
