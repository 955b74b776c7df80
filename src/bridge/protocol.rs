//! Frames exchanged with the extension shim.
//!
//! The shim forwards UI messages as `request` frames and answers our `call`
//! frames with `reply` frames. Browser lifecycle notifications arrive as
//! `event` frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::HostError;
use crate::patrol::Response;
use crate::types::{GroupColor, TabGroupId, TabId, WindowId};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Inbound {
    /// A UI message to answer. `id` is echoed back verbatim.
    Request {
        id: Value,
        #[serde(default)]
        message: Value,
    },
    Reply {
        #[serde(rename = "replyTo")]
        reply_to: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<ReplyError>,
    },
    Event {
        event: BrowserEvent,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BrowserEvent {
    WindowCreated {
        #[serde(default, rename = "windowId")]
        window_id: Option<WindowId>,
    },
    Startup,
}

/// Failure reported by the shim for a host call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl From<ReplyError> for HostError {
    fn from(err: ReplyError) -> Self {
        match err.code.as_deref() {
            Some("not-found") => HostError::NotFound(err.message),
            _ => HostError::Rejected(err.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Outbound {
    Response {
        id: Value,
        response: Response,
    },
    Call {
        #[serde(rename = "callId")]
        call_id: u64,
        call: HostCall,
    },
}

/// A browser API invocation the shim performs on our behalf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all_fields = "camelCase")]
pub enum HostCall {
    #[serde(rename = "tabGroups.get")]
    GetTabGroup { group_id: TabGroupId },
    #[serde(rename = "tabGroups.query")]
    QueryTabGroups { title: String, color: GroupColor },
    #[serde(rename = "tabs.query")]
    QueryTabs {
        #[serde(skip_serializing_if = "Option::is_none")]
        window_id: Option<WindowId>,
    },
    #[serde(rename = "tabs.create")]
    CreateTab {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        window_id: Option<WindowId>,
        active: bool,
    },
    #[serde(rename = "tabs.remove")]
    RemoveTabs { tab_ids: Vec<TabId> },
    #[serde(rename = "tabs.group")]
    GroupTabs {
        tab_ids: Vec<TabId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        group_id: Option<TabGroupId>,
    },
    #[serde(rename = "tabGroups.update")]
    UpdateTabGroup {
        group_id: TabGroupId,
        title: String,
        color: GroupColor,
    },
    #[serde(rename = "windows.getLastFocused")]
    LastFocusedWindow,
    #[serde(rename = "action.setBadgeText")]
    SetBadgeText { text: String },
}
