//! The popup/options message contract.
//!
//! | Message        | Fields in                 | Fields out                         |
//! |----------------|---------------------------|------------------------------------|
//! | poll-now       |                           | `{ok}`                             |
//! | save-settings  | `{settings:{pat?,interval}}` | `{ok, username?}` / `{ok:false, error}` |
//! | get-status     |                           | [`StatusSnapshot`]                 |
//! | get-groups     |                           | `{groups}`                         |
//! | save-groups    | `{groups:[{id,name,color,query}]}` | `{ok}` / `{ok:false, error}` |
//! | delete-group   | `{groupId}`               | `{ok}` / `{ok:false, error}`       |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::orchestrator::{Patrol, StatusSnapshot};
use crate::github::SearchClient;
use crate::host::TabHost;
use crate::types::{Group, GroupDraft, GroupId};

/// A UI request, tagged on `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    PollNow,
    SaveSettings {
        #[serde(default)]
        settings: SettingsInput,
    },
    GetStatus,
    GetGroups,
    SaveGroups {
        #[serde(default)]
        groups: Vec<GroupDraft>,
    },
    DeleteGroup {
        #[serde(rename = "groupId", default)]
        group_id: GroupId,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsInput {
    #[serde(default)]
    pub pat: Option<String>,
    /// The options page sends the select's value, which may be a string.
    #[serde(default)]
    pub interval: Option<serde_json::Value>,
}

impl SettingsInput {
    pub fn interval_minutes(&self) -> Option<u64> {
        match self.interval.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Ack {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    Failure {
        ok: bool,
        error: String,
    },
    Status(StatusSnapshot),
    Groups {
        groups: Vec<Group>,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack {
            ok: true,
            username: None,
        }
    }

    pub fn fail(error: impl ToString) -> Self {
        Response::Failure {
            ok: false,
            error: error.to_string(),
        }
    }
}

/// Handles one request.
pub async fn handle_request<S, H>(patrol: &Arc<Patrol<S, H>>, request: Request) -> Response
where
    S: SearchClient + 'static,
    H: TabHost + 'static,
{
    debug!(?request, "handling request");
    match request {
        Request::PollNow => {
            patrol.poll_all(None).await;
            Response::ok()
        }

        Request::SaveSettings { settings } => {
            let interval = settings.interval_minutes();
            match patrol.save_settings(settings.pat.as_deref(), interval).await {
                Ok(username) => Response::Ack { ok: true, username },
                Err(e) => {
                    warn!(error = %e, "settings rejected");
                    Response::fail(e)
                }
            }
        }

        Request::GetStatus => match patrol.status().await {
            Ok(status) => Response::Status(status),
            Err(e) => Response::fail(e),
        },

        Request::GetGroups => match patrol.groups() {
            Ok(groups) => Response::Groups { groups },
            Err(e) => Response::fail(e),
        },

        Request::SaveGroups { groups } => match patrol.save_groups(&groups).await {
            Ok(outcome) => {
                if !outcome.dirty.is_empty() {
                    patrol.spawn_repoll(outcome.dirty_set());
                }
                Response::ok()
            }
            Err(e) => Response::fail(e),
        },

        Request::DeleteGroup { group_id } => match patrol.delete_group(&group_id).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::fail(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_message_type() {
        let cases = [
            (json!({"type": "poll-now"}), Request::PollNow),
            (json!({"type": "get-status"}), Request::GetStatus),
            (json!({"type": "get-groups"}), Request::GetGroups),
            (
                json!({"type": "delete-group", "groupId": "abc"}),
                Request::DeleteGroup {
                    group_id: GroupId::new("abc"),
                },
            ),
            (
                json!({"type": "save-groups", "groups": [
                    {"id": "a", "name": "A", "color": "red", "query": "is:pr"}
                ]}),
                Request::SaveGroups {
                    groups: vec![GroupDraft::new("a", "A", "red", "is:pr")],
                },
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(serde_json::from_value::<Request>(raw).unwrap(), expected);
        }
    }

    #[test]
    fn missing_group_id_parses_as_blank() {
        let req: Request = serde_json::from_value(json!({"type": "delete-group"})).unwrap();
        assert_eq!(
            req,
            Request::DeleteGroup {
                group_id: GroupId::default()
            }
        );
    }

    #[test]
    fn interval_accepts_number_or_string() {
        let parse = |v: serde_json::Value| -> Option<u64> {
            let req: Request =
                serde_json::from_value(json!({"type": "save-settings", "settings": {"interval": v}}))
                    .unwrap();
            match req {
                Request::SaveSettings { settings } => settings.interval_minutes(),
                _ => unreachable!(),
            }
        };
        assert_eq!(parse(json!(10)), Some(10));
        assert_eq!(parse(json!("30")), Some(30));
        assert_eq!(parse(json!(null)), None);
        assert_eq!(parse(json!(-1)), None);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_value::<Request>(json!({"type": "explode"})).is_err());
    }

    #[test]
    fn response_shapes() {
        assert_eq!(serde_json::to_value(Response::ok()).unwrap(), json!({"ok": true}));
        assert_eq!(
            serde_json::to_value(Response::Ack {
                ok: true,
                username: Some("octocat".into())
            })
            .unwrap(),
            json!({"ok": true, "username": "octocat"})
        );
        assert_eq!(
            serde_json::to_value(Response::fail("Group not found")).unwrap(),
            json!({"ok": false, "error": "Group not found"})
        );
    }
}
