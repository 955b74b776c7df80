//! Core domain types for PR Patrol.
//!
//! Identifiers, group configuration and search results shared by every
//! other module.

pub mod group;
pub mod ids;
pub mod item;

pub use group::{
    DEFAULT_GROUP_COLOR, DEFAULT_GROUP_NAME, DEFAULT_GROUP_QUERY, Group, GroupColor, GroupDraft,
    PollInterval, UnknownColor,
};
pub use ids::{GroupId, TabGroupId, TabId, WindowId};
pub use item::{SearchItem, normalize_url};
