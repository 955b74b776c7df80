//! The persisted state document.
//!
//! All durable state lives in one JSON document, `state.json`, whose keys
//! mirror the extension's own storage layout. The document is always
//! replaced as a whole, never patched in place.
//!
//! # Atomic Writes
//!
//! 1. Write to `state.json.tmp`
//! 2. fsync the file
//! 3. Rename to `state.json`
//! 4. fsync the directory
//!
//! Readers therefore see either the old or the new document, never a torn
//! one.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Group, PollInterval, TabGroupId};
use crate::vault::Envelope;

/// Current schema version. Increment when adding a migration step.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the document inside the state directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Errors that can occur reading or writing the document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document was written by a newer build.
    #[error("state schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { supported: u32, found: u32 },
}

pub type Result<T> = std::result::Result<T, DocumentError>;

/// Everything PR Patrol persists.
///
/// The `pat`, `groupId`, `prCount` and `lastError` keys belong to the old
/// single-group schema and only exist until migration removes them.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Zero for documents that predate versioning.
    #[serde(default)]
    pub schema_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pat_encrypted: Option<Envelope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<PollInterval>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_poll: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Group>>,

    // ─── Legacy single-group keys ─────────────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pat: Option<String>,

    #[serde(rename = "groupId", default, skip_serializing_if = "Option::is_none")]
    pub legacy_group_id: Option<TabGroupId>,

    #[serde(rename = "prCount", default, skip_serializing_if = "Option::is_none")]
    pub legacy_pr_count: Option<u32>,

    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub legacy_last_error: Option<String>,
}

impl PersistedState {
    /// Groups in store order; an unmigrated document has none.
    pub fn groups(&self) -> &[Group] {
        self.groups.as_deref().unwrap_or(&[])
    }

    pub fn has_legacy_keys(&self) -> bool {
        self.pat.is_some()
            || self.legacy_group_id.is_some()
            || self.legacy_pr_count.is_some()
            || self.legacy_last_error.is_some()
    }
}

impl fmt::Debug for PersistedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedState")
            .field("schema_version", &self.schema_version)
            .field("pat_encrypted", &self.pat_encrypted)
            .field("interval", &self.interval)
            .field("last_poll", &self.last_poll)
            .field("groups", &self.groups)
            .field("pat", &self.pat.as_ref().map(|_| "<redacted>"))
            .field("legacy_group_id", &self.legacy_group_id)
            .field("legacy_pr_count", &self.legacy_pr_count)
            .field("legacy_last_error", &self.legacy_last_error)
            .finish()
    }
}

/// Handle on the document file that serializes read-modify-write cycles.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateFile {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The document inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<PersistedState> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        load_state(&self.path)
    }

    /// Loads, applies `f`, and writes the whole document back.
    pub fn update<T>(&self, f: impl FnOnce(&mut PersistedState) -> T) -> Result<T> {
        self.try_update(|doc| Ok::<_, DocumentError>(f(doc)))
    }

    /// Like [`update`](Self::update), but nothing is written when `f` fails.
    pub fn try_update<T, E>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<DocumentError>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = load_state(&self.path)?;
        let out = f(&mut doc)?;
        save_state_atomic(&self.path, &doc)?;
        Ok(out)
    }
}

/// Loads the document. A missing file is an empty, unversioned document.
pub fn load_state(path: &Path) -> Result<PersistedState> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PersistedState::default()),
        Err(e) => return Err(e.into()),
    };
    let doc: PersistedState = serde_json::from_slice(&bytes)?;

    if doc.schema_version > SCHEMA_VERSION {
        return Err(DocumentError::SchemaTooNew {
            supported: SCHEMA_VERSION,
            found: doc.schema_version,
        });
    }

    Ok(doc)
}

/// Writes the document with write-to-temp-then-rename.
pub fn save_state_atomic(path: &Path, doc: &PersistedState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(doc)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }

    Ok(())
}

/// Makes the rename durable. Directories cannot be opened as files on
/// Windows, where the rename is already durable.
fn sync_dir(dir: &Path) -> io::Result<()> {
    if cfg!(windows) {
        return Ok(());
    }
    File::open(dir)?.sync_all()
}
