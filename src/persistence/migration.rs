//! Versioned upgrade of the state document, run once at startup.
//!
//! Each step is guarded by the presence of the keys it consumes, so the
//! whole migration is idempotent and safe to run on every start.
//!
//! - Step 1: seal a plaintext token into an envelope (see [`crate::vault`]).
//! - Step 2: fold the single-group flat keys into the `groups` array.

use std::sync::Arc;

use tracing::info;

use super::document::{PersistedState, SCHEMA_VERSION, StateFile};
use crate::types::Group;
use crate::vault::{KeySource, PlaintextMigration, VaultError, migrate_plaintext};

/// What a migration run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// `schemaVersion` before the run; 0 for unversioned documents.
    pub from_version: u32,
    pub token: PlaintextMigration,
    /// The `groups` array was created (from flat keys or as the default).
    pub created_groups: bool,
    /// Obsolete flat keys were removed.
    pub removed_flat_keys: bool,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.from_version != SCHEMA_VERSION
            || self.token != PlaintextMigration::NothingToDo
            || self.created_groups
            || self.removed_flat_keys
    }
}

/// Applies every migration step to `doc` and stamps the current version.
pub fn migrate(doc: &mut PersistedState, keys: &KeySource) -> Result<MigrationReport, VaultError> {
    let from_version = doc.schema_version;
    let token = migrate_plaintext(doc, keys)?;
    let (created_groups, removed_flat_keys) = migrate_flat_groups(doc);
    doc.schema_version = SCHEMA_VERSION;

    Ok(MigrationReport {
        from_version,
        token,
        created_groups,
        removed_flat_keys,
    })
}

/// Converts the implicit single group of the flat schema into an explicit
/// one, carrying its runtime state over. Returns `(created, removed_keys)`.
fn migrate_flat_groups(doc: &mut PersistedState) -> (bool, bool) {
    let had_flat_keys = doc.legacy_group_id.is_some()
        || doc.legacy_pr_count.is_some()
        || doc.legacy_last_error.is_some();

    if doc.groups.is_some() {
        doc.legacy_group_id = None;
        doc.legacy_pr_count = None;
        doc.legacy_last_error = None;
        return (false, had_flat_keys);
    }

    let mut group = Group::default_reviews();
    group.host_group = doc.legacy_group_id.take();
    group.result_count = doc.legacy_pr_count.take().unwrap_or(0);
    group.last_error = doc.legacy_last_error.take();
    doc.groups = Some(vec![group]);

    (true, had_flat_keys)
}

/// Loads the document, migrates it, and writes it back in one locked cycle.
///
/// Runs on the blocking pool because sealing a plaintext token derives a key.
pub async fn run_migrations(
    state: Arc<StateFile>,
    keys: KeySource,
) -> Result<MigrationReport, VaultError> {
    let report =
        tokio::task::spawn_blocking(move || state.try_update(|doc| migrate(doc, &keys))).await??;

    if report.changed() {
        info!(
            from_version = report.from_version,
            to_version = SCHEMA_VERSION,
            token = ?report.token,
            created_groups = report.created_groups,
            "migrated state document"
        );
    }
    Ok(report)
}
