//! Persistence layer for PR Patrol.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   state.json        # the whole persisted state, replaced atomically
//!   state.json.tmp    # transient, only during a write
//! ```
//!
//! # Startup
//!
//! [`run_migrations`] upgrades whatever document it finds (including one
//! written by the single-group version) to [`SCHEMA_VERSION`] before any
//! other component reads it.

pub mod document;
pub mod migration;

pub use document::{
    DocumentError, PersistedState, SCHEMA_VERSION, STATE_FILE_NAME, StateFile, load_state,
    save_state_atomic,
};
pub use migration::{MigrationReport, migrate, run_migrations};
