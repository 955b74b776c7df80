//! The poll orchestrator.
//!
//! # Passes
//!
//! A pass walks the groups in store order, sequentially. For each group it
//! runs the search and reconciles the results. A rate-limited search sets
//! the global backoff and every later group in the pass is marked skipped
//! without issuing a request. Any other failure is recorded on its group
//! and the pass moves on.
//!
//! The groups and the pass timestamp are written once, after the last
//! group. The badge always shows the total over all groups, filtered or not.
//!
//! # Exclusion
//!
//! [`PollState`] sits behind an async mutex that is held for the whole pass
//! and for every editor mutation of the group store, so a save can never
//! interleave with a pass that is creating tabs for the old configuration.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::poll::PollConfig;
use crate::github::{QueryError, SearchClient};
use crate::host::{TabHost, close_group_tabs};
use crate::persistence::{DocumentError, StateFile};
use crate::reconcile::reconcile;
use crate::store::{GroupStore, SaveOutcome, StoreError};
use crate::types::{Group, GroupColor, GroupDraft, GroupId, PollInterval, TabGroupId};
use crate::vault::{Vault, VaultError, mask_secret};

/// Error recorded on groups not attempted after a rate limit.
pub const SKIPPED_RATE_LIMITED: &str = "Skipped — rate limited";

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// In-memory orchestrator state. Reset on restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollState {
    /// No pass runs before this time.
    pub backoff_until: Option<DateTime<Utc>>,
}

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassReport {
    /// The backoff gate was closed; nothing was touched.
    BackedOff { until: DateTime<Utc> },
    /// No usable token; the badge was cleared.
    NoCredential,
    /// The group store could not be read.
    StoreUnavailable,
    /// The pass ran; the summary lists what happened to each group.
    Completed(PassSummary),
}

/// Per-group outcome of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Groups whose query succeeded and whose tabs were reconciled.
    pub polled: Vec<GroupId>,
    /// Groups whose query failed; their `lastError` is set.
    pub failed: Vec<GroupId>,
    /// Groups not queried because the pass hit a rate limit first.
    pub skipped: Vec<GroupId>,
    /// Sum of result counts over all groups.
    pub total: u32,
    /// Whether a query was rate limited, closing the backoff gate.
    pub rate_limited: bool,
}

/// Errors from `save-settings`.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error(transparent)]
    Query(QueryError),

    #[error("could not store token: {0}")]
    Vault(#[from] VaultError),

    #[error("state file error: {0}")]
    Document(#[from] DocumentError),
}

impl From<QueryError> for SettingsError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Auth => SettingsError::InvalidToken,
            other => SettingsError::Query(other),
        }
    }
}

/// Per-group status as the popup shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    pub id: GroupId,
    pub name: String,
    pub color: GroupColor,
    /// Results of the last successful query.
    pub pr_count: u32,
    pub last_error: Option<String>,
}

impl From<&Group> for GroupStatus {
    fn from(g: &Group) -> Self {
        GroupStatus {
            id: g.id.clone(),
            name: g.name.clone(),
            color: g.color,
            pr_count: g.result_count,
            last_error: g.last_error.clone(),
        }
    }
}

/// Everything `get-status` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Whether a token is stored and decrypts.
    pub has_pat: bool,
    /// The token in masked form, never the token itself.
    pub pat_masked: Option<String>,
    /// Poll interval in minutes.
    pub interval: u32,
    /// Epoch milliseconds.
    pub last_poll: Option<i64>,
    pub groups: Vec<GroupStatus>,
}

/// Badge text for a total: empty when zero.
pub fn badge_text(total: u32) -> String {
    if total == 0 {
        String::new()
    } else {
        total.to_string()
    }
}

/// Drives searches and reconciliation across all groups.
pub struct Patrol<S, H> {
    state: Arc<StateFile>,
    store: GroupStore,
    vault: Vault,
    search: S,
    host: H,
    clock: Arc<dyn Clock>,
    schedule: PollConfig,
    poll: Mutex<PollState>,
}

impl<S: SearchClient, H: TabHost> Patrol<S, H> {
    pub fn new(state: Arc<StateFile>, vault: Vault, search: S, host: H, schedule: PollConfig) -> Self {
        Patrol {
            store: GroupStore::new(state.clone()),
            state,
            vault,
            search,
            host,
            clock: Arc::new(SystemClock),
            schedule,
            poll: Mutex::new(PollState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    pub fn schedule(&self) -> &PollConfig {
        &self.schedule
    }

    pub async fn poll_state(&self) -> PollState {
        *self.poll.lock().await
    }

    /// Overrides the backoff gate. Waits for any running pass.
    pub async fn set_backoff_until(&self, until: Option<DateTime<Utc>>) {
        self.poll.lock().await.backoff_until = until;
    }

    /// Holds the pass lock, blocking passes and editor mutations until the
    /// guard is dropped.
    #[cfg(test)]
    pub async fn lock_passes(&self) -> tokio::sync::MutexGuard<'_, PollState> {
        self.poll.lock().await
    }

    /// Runs one pass over all groups, or only those in `only`.
    #[instrument(skip_all, fields(filtered = only.is_some()))]
    pub async fn poll_all(&self, only: Option<&HashSet<GroupId>>) -> PassReport {
        let mut state = self.poll.lock().await;
        self.run_pass(&mut state, only).await
    }

    async fn run_pass(&self, state: &mut PollState, only: Option<&HashSet<GroupId>>) -> PassReport {
        let started = self.clock.now();
        if let Some(until) = state.backoff_until
            && started < until
        {
            debug!(%until, "backing off, pass skipped");
            return PassReport::BackedOff { until };
        }

        let Some(token) = self.vault.load().await else {
            debug!("no token configured");
            self.set_badge(0).await;
            return PassReport::NoCredential;
        };

        let mut groups = match self.store.list() {
            Ok(groups) => groups,
            Err(e) => {
                error!(error = %e, "could not read groups");
                return PassReport::StoreUnavailable;
            }
        };

        let mut summary = PassSummary::default();
        for group in groups.iter_mut() {
            if let Some(only) = only
                && !only.contains(&group.id)
            {
                continue;
            }

            if summary.rate_limited {
                group.record_error(SKIPPED_RATE_LIMITED);
                summary.skipped.push(group.id.clone());
                continue;
            }

            match self.search.search(&token, &group.query).await {
                Ok(items) => {
                    let report = reconcile(&self.host, group, &items).await;
                    group.record_success(items.len(), report.handle);
                    summary.polled.push(group.id.clone());
                }
                Err(e) => {
                    if let Some(resume_at) = e.resume_at() {
                        warn!(group = %group.id, %resume_at, "rate limited, backing off");
                        state.backoff_until = Some(resume_at);
                        summary.rate_limited = true;
                    } else {
                        warn!(group = %group.id, error = %e, "query failed");
                    }
                    group.record_error(e.to_string());
                    summary.failed.push(group.id.clone());
                }
            }
        }

        summary.total = groups
            .iter()
            .fold(0u32, |sum, g| sum.saturating_add(g.result_count));

        if let Err(e) = self.store.record_pass(groups, self.clock.now()) {
            error!(error = %e, "could not persist pass results");
        }
        self.set_badge(summary.total).await;

        info!(
            polled = summary.polled.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            total = summary.total,
            "pass complete"
        );
        PassReport::Completed(summary)
    }

    async fn set_badge(&self, total: u32) {
        if let Err(e) = self.host.set_badge_text(&badge_text(total)).await {
            debug!(error = %e, "could not update badge");
        }
    }

    async fn teardown(&self, handles: &[TabGroupId]) {
        for handle in handles {
            let closed = close_group_tabs(&self.host, *handle).await;
            debug!(%handle, closed, "tore down tab group");
        }
    }

    /// Validates and stores an editor batch.
    ///
    /// Host groups of removed entries are closed before the write, those of
    /// re-queried entries after it. Returns the groups that need a poll.
    #[instrument(skip_all, fields(groups = drafts.len()))]
    pub async fn save_groups(&self, drafts: &[GroupDraft]) -> Result<SaveOutcome, StoreError> {
        let _pass = self.poll.lock().await;

        let plan = self.store.prepare(drafts)?;
        self.teardown(&plan.outcome.removed).await;
        self.store.commit(&plan)?;
        self.teardown(&plan.outcome.requeried).await;

        info!(dirty = plan.outcome.dirty.len(), removed = plan.outcome.removed.len(), "groups saved");
        Ok(plan.outcome)
    }

    /// Deletes one group and closes its tabs.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, id: &GroupId) -> Result<(), StoreError> {
        let _pass = self.poll.lock().await;

        let target = self.store.get(id)?;
        if let Some(handle) = target.host_group {
            self.teardown(&[handle]).await;
        }
        self.store.delete(id)?;
        info!(group = %id, "group deleted");
        Ok(())
    }

    /// Applies `save-settings`. With a token, validates and stores it and
    /// returns the login it belongs to.
    #[instrument(skip_all)]
    pub async fn save_settings(
        &self,
        token: Option<&str>,
        interval: Option<u64>,
    ) -> Result<Option<String>, SettingsError> {
        let interval = PollInterval::sanitize(interval);

        let login = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => {
                let login = self.search.authenticate(token).await?;
                self.vault.store(token).await?;
                info!(%login, "token stored");
                Some(login)
            }
            None => None,
        };

        self.state.update(|doc| doc.interval = Some(interval))?;
        self.schedule.set_interval(interval);
        Ok(login)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, DocumentError> {
        let doc = self.state.load()?;
        let token = self.vault.load().await;
        Ok(StatusSnapshot {
            has_pat: token.is_some(),
            pat_masked: token.as_deref().map(mask_secret),
            interval: doc.interval.unwrap_or(PollInterval::DEFAULT).minutes(),
            last_poll: doc.last_poll.map(|t| t.timestamp_millis()),
            groups: doc.groups().iter().map(GroupStatus::from).collect(),
        })
    }

    pub fn groups(&self) -> Result<Vec<Group>, DocumentError> {
        self.store.list()
    }
}

impl<S, H> Patrol<S, H>
where
    S: SearchClient + 'static,
    H: TabHost + 'static,
{
    /// Polls `dirty` in the background. The pass goes through the same
    /// backoff gate as any other.
    pub fn spawn_repoll(self: &Arc<Self>, dirty: HashSet<GroupId>) -> JoinHandle<PassReport> {
        let patrol = Arc::clone(self);
        tokio::spawn(async move { patrol.poll_all(Some(&dirty)).await })
    }

    /// Runs a full pass in the background.
    pub fn spawn_poll(self: &Arc<Self>) -> JoinHandle<PassReport> {
        let patrol = Arc::clone(self);
        tokio::spawn(async move { patrol.poll_all(None).await })
    }
}

impl<S, H> std::fmt::Debug for Patrol<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patrol")
            .field("state", &self.state.path())
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}
