//! The browser as seen from PR Patrol.
//!
//! Tabs, tab groups, windows and the toolbar badge belong to the browser.
//! This module defines the operations the reconciler and orchestrator need
//! from it. Implementations:
//!
//! - [`crate::bridge::BridgeHost`]: forwards each operation over the
//!   native-messaging channel to the extension shim.
//! - [`memory::MemoryHost`]: an in-process simulated browser for tests.
//!
//! Every operation can fail because the user closed something while a
//! pass was running. Callers treat those failures as best-effort misses.

#[cfg(test)]
pub mod memory;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{GroupColor, TabGroupId, TabId, WindowId, normalize_url};

/// A browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    /// The browser reports ungrouped tabs with a negative group id.
    #[serde(default, deserialize_with = "group_or_none")]
    pub group_id: Option<TabGroupId>,
    #[serde(default)]
    pub url: Option<String>,
    /// Set while a navigation is still committing.
    #[serde(default)]
    pub pending_url: Option<String>,
}

fn group_or_none<'de, D>(deserializer: D) -> Result<Option<TabGroupId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.filter(|id| *id >= 0).map(TabGroupId))
}

impl TabInfo {
    /// The normalized URL used for matching, empty if the tab has none yet.
    pub fn match_url(&self) -> &str {
        let raw = self
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.pending_url.as_deref())
            .unwrap_or("");
        normalize_url(raw)
    }
}

/// A browser tab group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroupInfo {
    pub id: TabGroupId,
    pub window_id: WindowId,
    #[serde(default)]
    pub title: String,
    pub color: GroupColor,
}

/// Failure of a single browser operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The tab, group or window no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The browser refused the operation.
    #[error("rejected by browser: {0}")]
    Rejected(String),

    /// The connection to the browser is gone.
    #[error("browser disconnected")]
    Disconnected,

    /// The browser did not answer in time.
    #[error("browser did not respond in time")]
    Timeout,
}

pub type HostResult<T> = Result<T, HostError>;

/// Operations PR Patrol performs on the browser.
pub trait TabHost: Send + Sync {
    /// Looks up a group by handle.
    fn tab_group(&self, id: TabGroupId) -> impl Future<Output = HostResult<TabGroupInfo>> + Send;

    /// Finds groups by display metadata (title and color).
    fn find_tab_groups(
        &self,
        title: &str,
        color: GroupColor,
    ) -> impl Future<Output = HostResult<Vec<TabGroupInfo>>> + Send;

    /// Lists tabs, optionally restricted to one window.
    fn query_tabs(
        &self,
        window: Option<WindowId>,
    ) -> impl Future<Output = HostResult<Vec<TabInfo>>> + Send;

    /// Opens a background (inactive) tab.
    fn create_tab(
        &self,
        url: &str,
        window: Option<WindowId>,
    ) -> impl Future<Output = HostResult<TabInfo>> + Send;

    fn remove_tabs(&self, ids: &[TabId]) -> impl Future<Output = HostResult<()>> + Send;

    /// Adds tabs to `into`, or to a new group when `into` is `None`.
    fn group_tabs(
        &self,
        ids: &[TabId],
        into: Option<TabGroupId>,
    ) -> impl Future<Output = HostResult<TabGroupId>> + Send;

    fn update_tab_group(
        &self,
        id: TabGroupId,
        title: &str,
        color: GroupColor,
    ) -> impl Future<Output = HostResult<()>> + Send;

    /// The last focused normal window, falling back to any normal window.
    fn last_focused_window(&self) -> impl Future<Output = HostResult<Option<WindowId>>> + Send;

    fn set_badge_text(&self, text: &str) -> impl Future<Output = HostResult<()>> + Send;
}

/// Closes every tab attributed to `group`. Failures are logged and
/// swallowed; the group may already be gone.
pub async fn close_group_tabs<H: TabHost>(host: &H, group: TabGroupId) -> usize {
    let tabs = match host.query_tabs(None).await {
        Ok(tabs) => tabs,
        Err(e) => {
            tracing::debug!(%group, error = %e, "could not list tabs for teardown");
            return 0;
        }
    };
    let ids: Vec<TabId> = tabs
        .iter()
        .filter(|t| t.group_id == Some(group))
        .map(|t| t.id)
        .collect();
    if ids.is_empty() {
        return 0;
    }
    match host.remove_tabs(&ids).await {
        Ok(()) => ids.len(),
        Err(e) => {
            tracing::debug!(%group, error = %e, "teardown of tab group failed");
            0
        }
    }
}
