//! Maps a group's search results onto a browser tab group.
//!
//! # Algorithm
//!
//! 1. Resolve the stored handle. A handle the browser no longer knows is
//!    dropped, then a group with the same title and color is adopted.
//! 2. No results: close the group's tabs and forget the handle.
//! 3. Handle resolved: diff tabs against results by normalized URL. Open
//!    the missing ones in the group's window, close the rest, relabel.
//! 4. No handle: reuse open ungrouped tabs that already show a result,
//!    open the remainder, group them all, label the new group.
//!
//! # Churn
//!
//! A URL present both in the group and in the results is never touched.
//! New tabs are attached before stale ones are closed, so a group whose
//! every tab is replaced survives under the same handle.
//!
//! # Failures
//!
//! Every browser operation may fail because the user closed something
//! mid-pass. Failures are logged and the step is skipped; they never fail
//! the group's poll.


use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::host::{TabHost, TabInfo};
use crate::types::{Group, SearchItem, TabGroupId, TabId, WindowId};

/// What one reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The handle to persist for the group.
    pub handle: Option<TabGroupId>,
    /// Tabs created for results that had none.
    pub opened: usize,
    /// Stale and duplicate tabs removed.
    pub closed: usize,
    /// Already open tabs adopted into a new group.
    pub reused: usize,
}

/// Reconciles `group`'s tab group with `desired`.
#[instrument(skip_all, fields(group = %group.id, results = desired.len()))]
pub async fn reconcile<H: TabHost>(host: &H, group: &Group, desired: &[SearchItem]) -> ReconcileReport {
    let desired = dedup_by_url(desired);
    let resolved = resolve_handle(host, group).await;

    let report = match resolved {
        Some((handle, _)) if desired.is_empty() => {
            let closed = close_attributed(host, handle).await;
            ReconcileReport {
                closed,
                ..ReconcileReport::default()
            }
        }
        None if desired.is_empty() => ReconcileReport::default(),
        Some((handle, window)) => sync_existing(host, group, handle, window, &desired).await,
        None => create_group(host, group, &desired).await,
    };

    debug!(
        handle = ?report.handle,
        opened = report.opened,
        closed = report.closed,
        reused = report.reused,
        "reconciled"
    );
    report
}

/// Unique result URLs in result order.
fn dedup_by_url(items: &[SearchItem]) -> Vec<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| item.url.as_str())
        .filter(|url| seen.insert(*url))
        .collect()
}

/// Validates the stored handle, falling back to a title and color lookup.
async fn resolve_handle<H: TabHost>(host: &H, group: &Group) -> Option<(TabGroupId, WindowId)> {
    if let Some(stored) = group.host_group {
        match host.tab_group(stored).await {
            Ok(info) => return Some((info.id, info.window_id)),
            Err(e) => debug!(handle = %stored, error = %e, "stored handle is stale"),
        }
    }

    match host.find_tab_groups(&group.name, group.color).await {
        Ok(found) => found.first().map(|info| {
            debug!(handle = %info.id, "adopted group by title and color");
            (info.id, info.window_id)
        }),
        Err(e) => {
            debug!(error = %e, "group lookup by title failed");
            None
        }
    }
}

async fn close_attributed<H: TabHost>(host: &H, handle: TabGroupId) -> usize {
    crate::host::close_group_tabs(host, handle).await
}

/// Opens background tabs for `urls`, skipping any that fail.
async fn open_tabs<H: TabHost>(host: &H, urls: &[&str], window: Option<WindowId>) -> Vec<TabId> {
    let mut opened = Vec::with_capacity(urls.len());
    for url in urls {
        match host.create_tab(url, window).await {
            Ok(tab) => opened.push(tab.id),
            Err(e) => debug!(url, error = %e, "could not open tab"),
        }
    }
    opened
}

async fn relabel<H: TabHost>(host: &H, group: &Group, handle: TabGroupId) {
    if let Err(e) = host.update_tab_group(handle, &group.name, group.color).await {
        debug!(%handle, error = %e, "could not relabel group");
    }
}

async fn sync_existing<H: TabHost>(
    host: &H,
    group: &Group,
    handle: TabGroupId,
    window: WindowId,
    desired: &[&str],
) -> ReconcileReport {
    let tabs = match host.query_tabs(Some(window)).await {
        Ok(tabs) => tabs,
        Err(e) => {
            debug!(%handle, error = %e, "could not list group tabs");
            return ReconcileReport {
                handle: Some(handle),
                ..ReconcileReport::default()
            };
        }
    };

    let wanted: HashSet<&str> = desired.iter().copied().collect();
    let mut present: HashSet<&str> = HashSet::new();
    let mut to_close = Vec::new();
    for tab in tabs.iter().filter(|t| t.group_id == Some(handle)) {
        let url = tab.match_url();
        if wanted.contains(url) && present.insert(url) {
            continue;
        }
        to_close.push(tab.id);
    }

    let missing: Vec<&str> = desired
        .iter()
        .copied()
        .filter(|url| !present.contains(url))
        .collect();

    let opened = open_tabs(host, &missing, Some(window)).await;
    if !opened.is_empty()
        && let Err(e) = host.group_tabs(&opened, Some(handle)).await
    {
        debug!(%handle, error = %e, "could not attach new tabs");
    }

    let mut closed = 0;
    if !to_close.is_empty() {
        match host.remove_tabs(&to_close).await {
            Ok(()) => closed = to_close.len(),
            Err(e) => debug!(%handle, error = %e, "could not close stale tabs"),
        }
    }

    relabel(host, group, handle).await;

    ReconcileReport {
        handle: Some(handle),
        opened: opened.len(),
        closed,
        reused: 0,
    }
}

/// Ungrouped open tabs keyed by normalized URL. The first tab per URL wins.
fn ungrouped_by_url<'a>(tabs: &'a [TabInfo], wanted: &HashSet<&str>) -> HashMap<&'a str, TabId> {
    let mut by_url = HashMap::new();
    for tab in tabs.iter().filter(|t| t.group_id.is_none()) {
        let url = tab.match_url();
        if wanted.contains(url) {
            by_url.entry(url).or_insert(tab.id);
        }
    }
    by_url
}

async fn create_group<H: TabHost>(host: &H, group: &Group, desired: &[&str]) -> ReconcileReport {
    let window = match host.last_focused_window().await {
        Ok(window) => window,
        Err(e) => {
            debug!(error = %e, "no focused window");
            None
        }
    };

    let tabs = match host.query_tabs(None).await {
        Ok(tabs) => tabs,
        Err(e) => {
            debug!(error = %e, "could not list open tabs");
            Vec::new()
        }
    };
    let wanted: HashSet<&str> = desired.iter().copied().collect();
    let reusable = ungrouped_by_url(&tabs, &wanted);

    let mut members: Vec<TabId> = Vec::with_capacity(desired.len());
    let mut missing = Vec::new();
    for url in desired {
        match reusable.get(url) {
            Some(id) => members.push(*id),
            None => missing.push(*url),
        }
    }
    let reused = members.len();
    let opened = open_tabs(host, &missing, window).await;
    members.extend(&opened);

    if members.is_empty() {
        return ReconcileReport::default();
    }

    let handle = match host.group_tabs(&members, None).await {
        Ok(handle) => handle,
        Err(e) => {
            debug!(error = %e, "could not create tab group");
            return ReconcileReport {
                handle: None,
                opened: opened.len(),
                closed: 0,
                reused,
            };
        }
    };
    relabel(host, group, handle).await;

    ReconcileReport {
        handle: Some(handle),
        opened: opened.len(),
        closed: 0,
        reused,
    }
}
