//! Group store: the persisted `groups` array.
//!
//! The array is always replaced as a whole. Saves are split into a pure
//! [`plan_save`] step and a [`GroupStore::commit`] step so the caller can
//! tear down host-side groups between validation and the write.
//!
//! Callers serialize mutations themselves (the orchestrator holds its pass
//! lock around every call here); the store only guarantees that each write
//! is atomic.

mod groups;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::persistence::{DocumentError, StateFile};
use crate::types::{Group, GroupDraft, GroupId};

pub use groups::{SaveOutcome, SavePlan, ValidationError, plan_save};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Group not found")]
    NotFound(GroupId),

    #[error("state file error: {0}")]
    Document(#[from] DocumentError),
}

#[derive(Debug, Clone)]
pub struct GroupStore {
    state: Arc<StateFile>,
}

impl GroupStore {
    pub fn new(state: Arc<StateFile>) -> Self {
        GroupStore { state }
    }

    pub fn list(&self) -> Result<Vec<Group>, DocumentError> {
        Ok(self.state.load()?.groups().to_vec())
    }

    pub fn get(&self, id: &GroupId) -> Result<Group, StoreError> {
        if id.is_blank() {
            return Err(ValidationError::MissingId.into());
        }
        self.list()?
            .into_iter()
            .find(|g| &g.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Validates `drafts` against the stored groups without writing.
    pub fn prepare(&self, drafts: &[GroupDraft]) -> Result<SavePlan, StoreError> {
        let existing = self.list()?;
        Ok(plan_save(&existing, drafts)?)
    }

    /// Writes a prepared plan.
    pub fn commit(&self, plan: &SavePlan) -> Result<(), DocumentError> {
        let groups = plan.groups.clone();
        self.state.update(move |doc| doc.groups = Some(groups))
    }

    /// Validates and writes in one step.
    #[cfg(test)]
    pub fn save(&self, drafts: &[GroupDraft]) -> Result<SaveOutcome, StoreError> {
        let plan = self.prepare(drafts)?;
        self.commit(&plan)?;
        Ok(plan.outcome)
    }

    /// Removes a group, returning it.
    pub fn delete(&self, id: &GroupId) -> Result<Group, StoreError> {
        if id.is_blank() {
            return Err(ValidationError::MissingId.into());
        }
        self.state.try_update(|doc| {
            let groups = doc.groups.get_or_insert_with(Vec::new);
            let index = groups
                .iter()
                .position(|g| &g.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            Ok(groups.remove(index))
        })
    }

    /// Writes the result of a poll pass: runtime fields of `groups` and
    /// the pass timestamp, in one document replacement.
    pub fn record_pass(&self, groups: Vec<Group>, at: DateTime<Utc>) -> Result<(), DocumentError> {
        self.state.update(move |doc| {
            doc.groups = Some(groups);
            doc.last_poll = Some(at);
        })
    }
}
