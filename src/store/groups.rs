//! Validation and diffing of editor saves.
//!
//! A save is computed as a pure plan over the stored groups before anything
//! is written, so a batch with one bad entry changes nothing.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::types::{Group, GroupColor, GroupDraft, GroupId, TabGroupId};

/// Editor input rejected before any persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("At least one group is required")]
    EmptyBatch,

    #[error("Missing group ID")]
    MissingId,

    #[error("Duplicate group ID: {0}")]
    DuplicateId(GroupId),

    #[error("Group name cannot be empty")]
    EmptyName,

    #[error("Group query cannot be empty")]
    EmptyQuery,

    #[error("Invalid color: {0}")]
    InvalidColor(String),
}

/// What a save changes besides the stored array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// New groups and groups whose query changed, in batch order.
    pub dirty: Vec<GroupId>,
    /// Handles of groups absent from the batch.
    pub removed: Vec<TabGroupId>,
    /// Handles of groups whose query changed; their tabs are stale.
    pub requeried: Vec<TabGroupId>,
}

impl SaveOutcome {
    pub fn dirty_set(&self) -> HashSet<GroupId> {
        self.dirty.iter().cloned().collect()
    }
}

/// A validated save, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlan {
    /// The full array to store, with runtime fields carried over.
    pub groups: Vec<Group>,
    pub outcome: SaveOutcome,
}

/// Validates one draft, returning its trimmed fields.
fn validate_draft(draft: &GroupDraft) -> Result<(String, GroupColor, String), ValidationError> {
    if draft.id.is_blank() {
        return Err(ValidationError::MissingId);
    }
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let query = draft.query.trim();
    if query.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let color: GroupColor = draft
        .color
        .parse()
        .map_err(|_| ValidationError::InvalidColor(draft.color.clone()))?;
    Ok((name.to_string(), color, query.to_string()))
}

/// Computes the stored array and side effects of saving `drafts` over
/// `existing`.
///
/// Runtime fields survive only when the query text is unchanged; a changed
/// query starts from scratch so old tabs are never attributed to it.
pub fn plan_save(existing: &[Group], drafts: &[GroupDraft]) -> Result<SavePlan, ValidationError> {
    if drafts.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let fields = validate_draft(draft)?;
        if !seen.insert(&draft.id) {
            return Err(ValidationError::DuplicateId(draft.id.clone()));
        }
        validated.push((draft.id.clone(), fields));
    }

    let by_id: HashMap<&GroupId, &Group> = existing.iter().map(|g| (&g.id, g)).collect();
    let mut outcome = SaveOutcome::default();

    outcome.removed = existing
        .iter()
        .filter(|g| !seen.contains(&g.id))
        .filter_map(|g| g.host_group)
        .collect();

    let groups = validated
        .into_iter()
        .map(|(id, (name, color, query))| {
            let mut group = Group::new(id, name, color, query);
            match by_id.get(&group.id) {
                Some(prev) if prev.query == group.query => {
                    group.host_group = prev.host_group;
                    group.result_count = prev.result_count;
                    group.last_error = prev.last_error.clone();
                }
                Some(prev) => {
                    outcome.requeried.extend(prev.host_group);
                    outcome.dirty.push(group.id.clone());
                }
                None => outcome.dirty.push(group.id.clone()),
            }
            group
        })
        .collect();

    Ok(SavePlan { groups, outcome })
}
