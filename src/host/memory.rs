//! In-process simulated browser.
//!
//! Models windows, tabs and tab groups closely enough for the reconciler
//! and orchestrator tests: a group disappears when its last tab is removed,
//! handles are integers that can be reassigned to simulate a browser
//! restart, and every mutating operation is counted.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{HostError, HostResult, TabGroupInfo, TabHost, TabInfo};
use crate::types::{GroupColor, TabGroupId, TabId, WindowId};

/// Mutating operations performed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub created: usize,
    pub removed: usize,
    pub grouped: usize,
    pub updated: usize,
}

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateTab,
    RemoveTabs,
    GroupTabs,
    UpdateGroup,
    QueryTabs,
}

#[derive(Debug, Default)]
struct Browser {
    next_id: i64,
    windows: Vec<WindowId>,
    focused: Option<WindowId>,
    tabs: BTreeMap<TabId, TabInfo>,
    groups: BTreeMap<TabGroupId, TabGroupInfo>,
    badge: String,
    counts: OpCounts,
    faults: HashSet<Fault>,
}

impl Browser {
    fn fresh_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, fault: Fault) -> HostResult<()> {
        if self.faults.contains(&fault) {
            return Err(HostError::Rejected(format!("injected {fault:?} failure")));
        }
        Ok(())
    }

    /// Groups without tabs cease to exist, as in a real browser.
    fn drop_empty_groups(&mut self) {
        let live: HashSet<TabGroupId> = self.tabs.values().filter_map(|t| t.group_id).collect();
        self.groups.retain(|id, _| live.contains(id));
    }
}

/// A simulated browser with one focused window to start with.
#[derive(Debug)]
pub struct MemoryHost {
    inner: Mutex<Browser>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        let host = MemoryHost {
            inner: Mutex::new(Browser::default()),
        };
        host.open_window();
        host
    }

    fn with<T>(&self, f: impl FnOnce(&mut Browser) -> T) -> T {
        let mut browser = self.inner.lock().unwrap();
        f(&mut browser)
    }

    /// Opens a new window and focuses it.
    pub fn open_window(&self) -> WindowId {
        self.with(|b| {
            let id = WindowId(b.fresh_id());
            b.windows.push(id);
            b.focused = Some(id);
            id
        })
    }

    /// Closes a window with all its tabs and groups.
    pub fn close_window(&self, window: WindowId) {
        self.with(|b| {
            b.windows.retain(|w| *w != window);
            b.tabs.retain(|_, t| t.window_id != window);
            b.groups.retain(|_, g| g.window_id != window);
            if b.focused == Some(window) {
                b.focused = b.windows.last().copied();
            }
        })
    }

    /// Opens an ungrouped tab as the user would, without counting it.
    pub fn user_opens(&self, url: &str) -> TabId {
        self.with(|b| {
            let id = TabId(b.fresh_id());
            let window_id = b.focused.or(b.windows.first().copied()).unwrap_or(WindowId(0));
            b.tabs.insert(
                id,
                TabInfo {
                    id,
                    window_id,
                    group_id: None,
                    url: Some(url.to_string()),
                    pending_url: None,
                },
            );
            id
        })
    }

    /// Opens a tab whose navigation has not committed yet.
    pub fn user_opens_loading(&self, url: &str) -> TabId {
        let id = self.user_opens(url);
        self.with(|b| {
            if let Some(t) = b.tabs.get_mut(&id) {
                t.pending_url = t.url.take();
            }
        });
        id
    }

    /// Closes a tab as the user would, without counting it.
    pub fn user_closes(&self, tab: TabId) {
        self.with(|b| {
            b.tabs.remove(&tab);
            b.drop_empty_groups();
        })
    }

    /// Renames or recolors a group as the user would.
    pub fn user_edits_group(&self, id: TabGroupId, title: &str, color: GroupColor) {
        self.with(|b| {
            if let Some(g) = b.groups.get_mut(&id) {
                g.title = title.to_string();
                g.color = color;
            }
        })
    }

    /// Gives every group a new handle, as a browser restart does.
    pub fn reassign_group_handles(&self) {
        self.with(|b| {
            let old: Vec<TabGroupId> = b.groups.keys().copied().collect();
            for old_id in old {
                let new_id = TabGroupId(b.fresh_id());
                if let Some(mut g) = b.groups.remove(&old_id) {
                    g.id = new_id;
                    b.groups.insert(new_id, g);
                }
                for t in b.tabs.values_mut() {
                    if t.group_id == Some(old_id) {
                        t.group_id = Some(new_id);
                    }
                }
            }
        })
    }

    pub fn fail(&self, fault: Fault) {
        self.with(|b| {
            b.faults.insert(fault);
        })
    }

    pub fn heal(&self, fault: Fault) {
        self.with(|b| {
            b.faults.remove(&fault);
        })
    }

    pub fn counts(&self) -> OpCounts {
        self.with(|b| b.counts)
    }

    pub fn reset_counts(&self) {
        self.with(|b| b.counts = OpCounts::default())
    }

    pub fn badge(&self) -> String {
        self.with(|b| b.badge.clone())
    }

    pub fn group(&self, id: TabGroupId) -> Option<TabGroupInfo> {
        self.with(|b| b.groups.get(&id).cloned())
    }

    pub fn groups(&self) -> Vec<TabGroupInfo> {
        self.with(|b| b.groups.values().cloned().collect())
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.with(|b| b.tabs.values().cloned().collect())
    }

    /// Sorted URLs of the tabs attributed to `id`.
    pub fn urls_in(&self, id: TabGroupId) -> Vec<String> {
        let mut urls: Vec<String> = self.with(|b| {
            b.tabs
                .values()
                .filter(|t| t.group_id == Some(id))
                .filter_map(|t| t.url.clone())
                .collect()
        });
        urls.sort();
        urls
    }

    pub fn tab_with_url(&self, url: &str) -> Option<TabInfo> {
        self.with(|b| {
            b.tabs
                .values()
                .find(|t| t.url.as_deref() == Some(url))
                .cloned()
        })
    }
}

impl TabHost for MemoryHost {
    async fn tab_group(&self, id: TabGroupId) -> HostResult<TabGroupInfo> {
        self.with(|b| {
            b.groups
                .get(&id)
                .cloned()
                .ok_or_else(|| HostError::NotFound(id.to_string()))
        })
    }

    async fn find_tab_groups(&self, title: &str, color: GroupColor) -> HostResult<Vec<TabGroupInfo>> {
        Ok(self.with(|b| {
            b.groups
                .values()
                .filter(|g| g.title == title && g.color == color)
                .cloned()
                .collect()
        }))
    }

    async fn query_tabs(&self, window: Option<WindowId>) -> HostResult<Vec<TabInfo>> {
        self.with(|b| {
            b.check(Fault::QueryTabs)?;
            Ok(b.tabs
                .values()
                .filter(|t| window.is_none_or(|w| t.window_id == w))
                .cloned()
                .collect())
        })
    }

    async fn create_tab(&self, url: &str, window: Option<WindowId>) -> HostResult<TabInfo> {
        self.with(|b| {
            b.check(Fault::CreateTab)?;
            let window_id = match window {
                Some(w) if b.windows.contains(&w) => w,
                Some(w) => return Err(HostError::NotFound(w.to_string())),
                None => b
                    .focused
                    .ok_or_else(|| HostError::NotFound("no window".into()))?,
            };
            let id = TabId(b.fresh_id());
            let tab = TabInfo {
                id,
                window_id,
                group_id: None,
                url: Some(url.to_string()),
                pending_url: None,
            };
            b.tabs.insert(id, tab.clone());
            b.counts.created += 1;
            Ok(tab)
        })
    }

    async fn remove_tabs(&self, ids: &[TabId]) -> HostResult<()> {
        self.with(|b| {
            b.check(Fault::RemoveTabs)?;
            for id in ids {
                if b.tabs.remove(id).is_some() {
                    b.counts.removed += 1;
                }
            }
            b.drop_empty_groups();
            Ok(())
        })
    }

    async fn group_tabs(&self, ids: &[TabId], into: Option<TabGroupId>) -> HostResult<TabGroupId> {
        self.with(|b| {
            b.check(Fault::GroupTabs)?;
            let first = ids
                .iter()
                .find_map(|id| b.tabs.get(id))
                .ok_or_else(|| HostError::NotFound("no such tabs".into()))?;
            let window_id = first.window_id;

            let group = match into {
                Some(g) => {
                    let info = b
                        .groups
                        .get(&g)
                        .ok_or_else(|| HostError::NotFound(g.to_string()))?;
                    if info.window_id != window_id {
                        return Err(HostError::Rejected("group is in another window".into()));
                    }
                    g
                }
                None => {
                    let g = TabGroupId(b.fresh_id());
                    b.groups.insert(
                        g,
                        TabGroupInfo {
                            id: g,
                            window_id,
                            title: String::new(),
                            color: GroupColor::Grey,
                        },
                    );
                    g
                }
            };

            for id in ids {
                if let Some(t) = b.tabs.get_mut(id) {
                    t.group_id = Some(group);
                    t.window_id = window_id;
                }
            }
            b.drop_empty_groups();
            b.counts.grouped += 1;
            Ok(group)
        })
    }

    async fn update_tab_group(&self, id: TabGroupId, title: &str, color: GroupColor) -> HostResult<()> {
        self.with(|b| {
            b.check(Fault::UpdateGroup)?;
            let g = b
                .groups
                .get_mut(&id)
                .ok_or_else(|| HostError::NotFound(id.to_string()))?;
            g.title = title.to_string();
            g.color = color;
            b.counts.updated += 1;
            Ok(())
        })
    }

    async fn last_focused_window(&self) -> HostResult<Option<WindowId>> {
        Ok(self.with(|b| b.focused.or(b.windows.first().copied())))
    }

    async fn set_badge_text(&self, text: &str) -> HostResult<()> {
        self.with(|b| b.badge = text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn group_vanishes_with_its_last_tab() {
        let host = MemoryHost::new();
        let tab = host.create_tab("https://a", None).await.unwrap();
        let g = host.group_tabs(&[tab.id], None).await.unwrap();
        assert!(host.group(g).is_some());

        host.remove_tabs(&[tab.id]).await.unwrap();
        assert!(host.group(g).is_none());
        assert!(matches!(host.tab_group(g).await, Err(HostError::NotFound(_))));
    }

    #[tokio::test]
    async fn reassignment_keeps_metadata_and_tabs() {
        let host = MemoryHost::new();
        let tab = host.create_tab("https://a", None).await.unwrap();
        let g = host.group_tabs(&[tab.id], None).await.unwrap();
        host.update_tab_group(g, "Reviews", GroupColor::Blue).await.unwrap();

        host.reassign_group_handles();

        assert!(host.group(g).is_none());
        let found = host.find_tab_groups("Reviews", GroupColor::Blue).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(host.urls_in(found[0].id), vec!["https://a".to_string()]);
    }

    #[tokio::test]
    async fn injected_fault_rejects_operation() {
        let host = MemoryHost::new();
        host.fail(Fault::CreateTab);
        assert!(matches!(
            host.create_tab("https://a", None).await,
            Err(HostError::Rejected(_))
        ));
        host.heal(Fault::CreateTab);
        assert!(host.create_tab("https://a", None).await.is_ok());
        assert_eq!(host.counts().created, 1);
    }

    #[tokio::test]
    async fn closing_window_destroys_its_groups() {
        let host = MemoryHost::new();
        let tab = host.create_tab("https://a", None).await.unwrap();
        let g = host.group_tabs(&[tab.id], None).await.unwrap();

        host.close_window(tab.window_id);

        assert!(host.group(g).is_none());
        assert!(host.tabs().is_empty());
    }
}
