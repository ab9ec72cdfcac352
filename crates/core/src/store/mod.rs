//! Store document persistence.
//!
//! The whole library lives in one JSON document. Loading parses and validates
//! the complete document (migrating legacy layouts forward) before anything is
//! handed back, and saving writes a sibling temp file that is atomically
//! renamed over the target.

mod legacy;

use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::{
    error::StoreError,
    models::{Game, Preferences},
};

/// Directory under the user's config dir holding the default store.
pub const DEFAULT_STORE_DIR: &str = "gameslist";
/// File name of the default store.
pub const DEFAULT_STORE_FILE: &str = "games.json";
/// Format version written by this build.
pub const CURRENT_FORMAT_VERSION: u32 = 2;
/// Version assigned to documents without a version marker.
pub const LEGACY_FORMAT_VERSION: u32 = 1;

/// Top-level document holding every game, its sessions, and preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Layout version of the document.
    pub format_version: u32,
    /// Time of the last save.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// User preferences.
    #[serde(default)]
    pub preferences: Preferences,
    /// Games in insertion order, names unique ignoring case.
    pub games: Vec<Game>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            last_modified: None,
            preferences: Preferences::default(),
            games: Vec::new(),
        }
    }
}

impl Store {
    /// Parse and validate a document, migrating older layouts.
    pub fn from_json(content: &str) -> Result<Self, String> {
        let raw: Value = serde_json::from_str(content).map_err(|err| err.to_string())?;
        Self::from_document(raw)
    }

    fn from_document(raw: Value) -> Result<Self, String> {
        let store = match document_version(&raw)? {
            CURRENT_FORMAT_VERSION => {
                serde_json::from_value::<Store>(raw).map_err(|err| err.to_string())?
            }
            LEGACY_FORMAT_VERSION => legacy::migrate(raw)?,
            other => return Err(format!("unrecognized format version {other}")),
        };
        store.validate()?;
        Ok(store)
    }

    /// Check document invariants.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for game in &self.games {
            if game.name.trim().is_empty() {
                return Err("game with empty name".to_string());
            }
            if !names.insert(Game::name_key(&game.name)) {
                return Err(format!("duplicate game name {:?}", game.name));
            }
            for (index, session) in game.sessions.iter().enumerate() {
                session
                    .validate()
                    .map_err(|reason| format!("{} session #{}: {reason}", game.name, index + 1))?;
            }
        }
        Ok(())
    }
}

/// Read the version marker, treating its absence as the legacy layout.
fn document_version(raw: &Value) -> Result<u32, String> {
    let object = raw
        .as_object()
        .ok_or_else(|| "document is not a JSON object".to_string())?;
    match object.get("format_version") {
        None => {
            if object.get("games").map_or(false, Value::is_array) {
                Ok(LEGACY_FORMAT_VERSION)
            } else {
                Err("missing field `games`".to_string())
            }
        }
        Some(value) => value
            .as_u64()
            .and_then(|version| u32::try_from(version).ok())
            .ok_or_else(|| format!("format_version {value} is not a valid version")),
    }
}

/// Manager responsible for loading and writing the store file.
pub struct StoreManager {
    path: PathBuf,
}

impl StoreManager {
    /// Create a new manager for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the user's config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORE_DIR)
            .join(DEFAULT_STORE_FILE)
    }

    /// Path of the managed document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document. A missing file yields an empty store.
    pub fn load(&self) -> Result<Store, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No store found; starting empty");
                return Ok(Store::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let raw: Value = serde_json::from_str(&content).map_err(|err| self.corrupt(err))?;
        let version = document_version(&raw).map_err(|reason| self.corrupt(reason))?;
        if version > CURRENT_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                found: version,
                supported: CURRENT_FORMAT_VERSION,
            });
        }
        if version < CURRENT_FORMAT_VERSION {
            info!(path = %self.path.display(), from = version, to = CURRENT_FORMAT_VERSION, "Migrating store");
        }

        let store = Store::from_document(raw).map_err(|reason| self.corrupt(reason))?;
        info!(path = %self.path.display(), games = store.games.len(), "Store loaded");
        Ok(store)
    }

    /// Persist the document atomically, stamping `last_modified`.
    pub fn save(&self, store: &mut Store) -> Result<(), StoreError> {
        store.format_version = CURRENT_FORMAT_VERSION;
        store.last_modified = Some(Utc::now());
        self.write_atomic(store).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), games = store.games.len(), "Store saved");
        Ok(())
    }

    /// Move an unreadable document aside so a fresh store can be started.
    pub fn backup_corrupt(&self) -> Result<PathBuf, StoreError> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_STORE_FILE.to_string());
        let backup = self.path.with_file_name(format!(
            "{file_name}.backup-{}",
            Local::now().format("%Y%m%d%H%M%S")
        ));
        fs::rename(&self.path, &backup).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        warn!(from = %self.path.display(), to = %backup.display(), "Moved corrupt store aside");
        Ok(backup)
    }

    fn write_atomic(&self, store: &Store) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let serialised = serde_json::to_vec_pretty(store)?;
        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(&serialised)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    fn corrupt(&self, reason: impl ToString) -> StoreError {
        StoreError::Corrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
