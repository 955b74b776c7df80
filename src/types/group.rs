//! Group configuration and runtime state.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{GroupId, TabGroupId};

/// The fixed palette of tab-group colors the browser supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
}

impl GroupColor {
    pub const ALL: [GroupColor; 8] = [
        GroupColor::Grey,
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
    ];

    /// Returns the wire name the browser uses for this color.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupColor::Grey => "grey",
            GroupColor::Blue => "blue",
            GroupColor::Red => "red",
            GroupColor::Yellow => "yellow",
            GroupColor::Green => "green",
            GroupColor::Pink => "pink",
            GroupColor::Purple => "purple",
            GroupColor::Cyan => "cyan",
        }
    }
}

impl fmt::Display for GroupColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A color name outside the palette.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid color: {0}")]
pub struct UnknownColor(pub String);

impl FromStr for GroupColor {
    type Err = UnknownColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupColor::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownColor(s.to_string()))
    }
}

/// Display metadata and query of the group created on first run and by the
/// flat-schema migration.
pub const DEFAULT_GROUP_NAME: &str = "Reviews";
pub const DEFAULT_GROUP_COLOR: GroupColor = GroupColor::Blue;
pub const DEFAULT_GROUP_QUERY: &str = "is:pr is:open review-requested:@me";

/// A user-configured search query mapped onto a browser tab group.
///
/// Field names on disk match the extension's storage layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub color: GroupColor,
    pub query: String,

    /// Last known browser handle. May be stale; always revalidated.
    #[serde(rename = "chromeGroupId", default)]
    pub host_group: Option<TabGroupId>,

    /// Number of results the last successful query returned.
    #[serde(rename = "prCount", default)]
    pub result_count: u32,

    /// Error from the last poll of this group, if it failed.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Group {
    pub fn new(
        id: GroupId,
        name: impl Into<String>,
        color: GroupColor,
        query: impl Into<String>,
    ) -> Self {
        Group {
            id,
            name: name.into(),
            color,
            query: query.into(),
            host_group: None,
            result_count: 0,
            last_error: None,
        }
    }

    /// The group every fresh install starts with.
    pub fn default_reviews() -> Self {
        Group::new(
            GroupId::generate(),
            DEFAULT_GROUP_NAME,
            DEFAULT_GROUP_COLOR,
            DEFAULT_GROUP_QUERY,
        )
    }

    pub fn record_success(&mut self, count: usize, host_group: Option<TabGroupId>) {
        self.result_count = u32::try_from(count).unwrap_or(u32::MAX);
        self.last_error = None;
        self.host_group = host_group;
    }

    /// Records a failure. The previous count is kept so the badge does not
    /// flicker to zero on a transient error.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }
}

/// Editor input for one group, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDraft {
    #[serde(default)]
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub query: String,
}

impl GroupDraft {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        color: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        GroupDraft {
            id: GroupId::new(id),
            name: name.into(),
            color: color.into(),
            query: query.into(),
        }
    }
}

/// Poll interval in minutes, restricted to the values the options page offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct PollInterval(u32);

impl PollInterval {
    pub const VALID_MINUTES: [u32; 4] = [1, 5, 10, 30];
    pub const DEFAULT: PollInterval = PollInterval(5);

    /// Accepts any of the valid values; everything else becomes the default.
    pub fn sanitize(minutes: Option<u64>) -> Self {
        minutes
            .and_then(|m| u32::try_from(m).ok())
            .filter(|m| Self::VALID_MINUTES.contains(m))
            .map(PollInterval)
            .unwrap_or(Self::DEFAULT)
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for PollInterval {
    fn from(minutes: u32) -> Self {
        PollInterval::sanitize(Some(u64::from(minutes)))
    }
}

impl From<PollInterval> for u32 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}
