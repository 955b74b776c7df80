//! PR Patrol - keeps browser tab groups in sync with GitHub searches.
//!
//! Each configured group pairs a GitHub issue search with a browser tab
//! group. A poll pass runs every search and reconciles the group's tabs
//! against the results. The engine runs as a native messaging host; the
//! browser extension is a thin shim that forwards UI messages and performs
//! tab operations on the engine's behalf.

pub mod bridge;
pub mod config;
pub mod github;
pub mod host;
pub mod patrol;
pub mod persistence;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod vault;

#[cfg(test)]
pub mod test_utils;
