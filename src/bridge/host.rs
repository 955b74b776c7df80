//! [`TabHost`] over the native-messaging bridge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::protocol::{HostCall, Outbound};
use crate::host::{HostError, HostResult, TabGroupInfo, TabHost, TabInfo};
use crate::types::{GroupColor, TabGroupId, TabId, WindowId};

/// How long a host call may wait for its reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

type Waiter = oneshot::Sender<HostResult<Value>>;

#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<u64, Waiter>,
    closed: bool,
}

struct Shared {
    outbound: mpsc::Sender<Outbound>,
    pending: Mutex<PendingCalls>,
    next_call: AtomicU64,
    timeout: Duration,
}

/// Performs tab operations by asking the extension shim.
///
/// Cloning shares the pending-call table, so the reader loop can route
/// replies to calls made through any clone.
#[derive(Clone)]
pub struct BridgeHost {
    shared: Arc<Shared>,
}

impl BridgeHost {
    /// Creates a host and the receiving end of its outbound frame queue.
    pub fn new(timeout: Duration) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(64);
        let host = BridgeHost {
            shared: Arc::new(Shared {
                outbound: tx,
                pending: Mutex::new(PendingCalls::default()),
                next_call: AtomicU64::new(1),
                timeout,
            }),
        };
        (host, rx)
    }

    /// Queue for frames that are not host calls, such as UI responses.
    pub fn outbound(&self) -> mpsc::Sender<Outbound> {
        self.shared.outbound.clone()
    }

    /// Delivers a reply to the call waiting on `call_id`.
    ///
    /// Returns false if nothing was waiting, e.g. the call already timed out.
    pub fn resolve(&self, call_id: u64, outcome: HostResult<Value>) -> bool {
        let waiter = match self.shared.pending.lock() {
            Ok(mut pending) => pending.waiters.remove(&call_id),
            Err(_) => None,
        };
        match waiter {
            Some(tx) => tx.send(outcome).is_ok(),
            None => {
                debug!(call_id, "reply for unknown or expired call");
                false
            }
        }
    }

    /// Fails every pending call and refuses new ones.
    pub fn disconnect(&self) {
        let waiters = match self.shared.pending.lock() {
            Ok(mut pending) => {
                pending.closed = true;
                std::mem::take(&mut pending.waiters)
            }
            Err(_) => return,
        };
        for (_, tx) in waiters {
            let _ = tx.send(Err(HostError::Disconnected));
        }
    }

    fn forget(&self, call_id: u64) {
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.waiters.remove(&call_id);
        }
    }

    async fn call<T: DeserializeOwned>(&self, call: HostCall) -> HostResult<T> {
        let call_id = self.shared.next_call.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .map_err(|_| HostError::Disconnected)?;
            if pending.closed {
                return Err(HostError::Disconnected);
            }
            pending.waiters.insert(call_id, tx);
        }

        if self
            .shared
            .outbound
            .send(Outbound::Call { call_id, call })
            .await
            .is_err()
        {
            self.forget(call_id);
            return Err(HostError::Disconnected);
        }

        let value = match tokio::time::timeout(self.shared.timeout, rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(HostError::Disconnected),
            Err(_) => {
                self.forget(call_id);
                warn!(call_id, "host call timed out");
                return Err(HostError::Timeout);
            }
        };
        serde_json::from_value(value)
            .map_err(|e| HostError::Rejected(format!("unexpected reply: {e}")))
    }
}

impl std::fmt::Debug for BridgeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHost")
            .field("timeout", &self.shared.timeout)
            .finish_non_exhaustive()
    }
}

impl TabHost for BridgeHost {
    async fn tab_group(&self, id: TabGroupId) -> HostResult<TabGroupInfo> {
        self.call(HostCall::GetTabGroup { group_id: id }).await
    }

    async fn find_tab_groups(&self, title: &str, color: GroupColor) -> HostResult<Vec<TabGroupInfo>> {
        self.call(HostCall::QueryTabGroups {
            title: title.to_string(),
            color,
        })
        .await
    }

    async fn query_tabs(&self, window: Option<WindowId>) -> HostResult<Vec<TabInfo>> {
        self.call(HostCall::QueryTabs { window_id: window }).await
    }

    async fn create_tab(&self, url: &str, window: Option<WindowId>) -> HostResult<TabInfo> {
        self.call(HostCall::CreateTab {
            url: url.to_string(),
            window_id: window,
            active: false,
        })
        .await
    }

    async fn remove_tabs(&self, tabs: &[TabId]) -> HostResult<()> {
        if tabs.is_empty() {
            return Ok(());
        }
        self.call::<Value>(HostCall::RemoveTabs {
            tab_ids: tabs.to_vec(),
        })
        .await
        .map(drop)
    }

    async fn group_tabs(&self, tabs: &[TabId], into: Option<TabGroupId>) -> HostResult<TabGroupId> {
        self.call(HostCall::GroupTabs {
            tab_ids: tabs.to_vec(),
            group_id: into,
        })
        .await
    }

    async fn update_tab_group(&self, id: TabGroupId, title: &str, color: GroupColor) -> HostResult<()> {
        self.call::<Value>(HostCall::UpdateTabGroup {
            group_id: id,
            title: title.to_string(),
            color,
        })
        .await
        .map(drop)
    }

    async fn last_focused_window(&self) -> HostResult<Option<WindowId>> {
        self.call(HostCall::LastFocusedWindow).await
    }

    async fn set_badge_text(&self, text: &str) -> HostResult<()> {
        self.call::<Value>(HostCall::SetBadgeText {
            text: text.to_string(),
        })
        .await
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn next_call(rx: &mut mpsc::Receiver<Outbound>) -> (u64, HostCall) {
        match rx.recv().await.unwrap() {
            Outbound::Call { call_id, call } => (call_id, call),
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reply_completes_the_matching_call() {
        let (host, mut rx) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);

        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.query_tabs(Some(WindowId(1))).await })
        };

        let (call_id, call) = next_call(&mut rx).await;
        assert_eq!(
            call,
            HostCall::QueryTabs {
                window_id: Some(WindowId(1))
            }
        );
        assert!(host.resolve(
            call_id,
            Ok(json!([{ "id": 5, "windowId": 1, "groupId": -1, "url": "https://x/" }]))
        ));

        let tabs = caller.await.unwrap().unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].id, TabId(5));
        assert_eq!(tabs[0].group_id, None);
    }

    #[tokio::test]
    async fn replies_may_arrive_out_of_order() {
        let (host, mut rx) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);

        let first = {
            let host = host.clone();
            tokio::spawn(async move { host.group_tabs(&[TabId(1)], None).await })
        };
        let (first_id, _) = next_call(&mut rx).await;
        let second = {
            let host = host.clone();
            tokio::spawn(async move { host.last_focused_window().await })
        };
        let (second_id, _) = next_call(&mut rx).await;

        host.resolve(second_id, Ok(json!(7)));
        host.resolve(first_id, Ok(json!(40)));

        assert_eq!(second.await.unwrap().unwrap(), Some(WindowId(7)));
        assert_eq!(first.await.unwrap().unwrap(), TabGroupId(40));
    }

    #[tokio::test]
    async fn shim_errors_surface_as_host_errors() {
        let (host, mut rx) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);
        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.tab_group(TabGroupId(9)).await })
        };
        let (call_id, _) = next_call(&mut rx).await;
        host.resolve(call_id, Err(HostError::NotFound("No group with id: 9".into())));

        assert_eq!(
            caller.await.unwrap(),
            Err(HostError::NotFound("No group with id: 9".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_call_times_out() {
        let (host, mut rx) = BridgeHost::new(Duration::from_secs(30));
        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.set_badge_text("3").await })
        };
        let (call_id, _) = next_call(&mut rx).await;

        assert_eq!(caller.await.unwrap(), Err(HostError::Timeout));
        // A late reply finds nobody waiting.
        assert!(!host.resolve(call_id, Ok(Value::Null)));
    }

    #[tokio::test]
    async fn disconnect_fails_pending_and_future_calls() {
        let (host, mut rx) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);
        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.query_tabs(None).await })
        };
        next_call(&mut rx).await;

        host.disconnect();
        assert_eq!(caller.await.unwrap(), Err(HostError::Disconnected));
        assert_eq!(
            host.remove_tabs(&[TabId(1)]).await,
            Err(HostError::Disconnected)
        );
    }

    #[tokio::test]
    async fn removing_nothing_sends_nothing() {
        let (host, mut rx) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);
        host.remove_tabs(&[]).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_reply_is_rejected() {
        let (host, mut rx) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);
        let caller = {
            let host = host.clone();
            tokio::spawn(async move { host.create_tab("https://x/", None).await })
        };
        let (call_id, _) = next_call(&mut rx).await;
        host.resolve(call_id, Ok(json!("not a tab")));
        assert!(matches!(
            caller.await.unwrap(),
            Err(HostError::Rejected(_))
        ));
    }
}
