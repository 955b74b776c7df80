//! Shared test utilities and arbitrary generators for property-based testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use tempfile::TempDir;

use crate::github::{QueryError, SearchClient};
use crate::host::memory::MemoryHost;
use crate::patrol::{Clock, Patrol, PollConfig};
use crate::persistence::StateFile;
use crate::types::{Group, GroupColor, GroupId, SearchItem};
use crate::vault::{KeySource, Vault};

pub fn arb_group_color() -> impl Strategy<Value = GroupColor> {
    prop::sample::select(GroupColor::ALL.to_vec())
}

pub fn arb_secret() -> impl Strategy<Value = String> {
    "\\PC{1,64}"
}

pub fn arb_group() -> impl Strategy<Value = Group> {
    ("[a-z0-9]{8}", "[A-Z][a-z]{0,19}", arb_group_color(), "is:[a-z]{2,6}( [a-z:@-]{1,20})?")
        .prop_map(|(id, name, color, query)| Group::new(GroupId::new(id), name, color, query))
}

pub fn pr_url(n: u64) -> String {
    format!("https://github.com/acme/widgets/pull/{n}")
}

pub fn pr(n: u64) -> SearchItem {
    SearchItem::new(&pr_url(n), format!("PR {n}"), n)
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(ManualClock {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A search client with canned answers per query. Unknown queries return
/// no results.
#[derive(Debug)]
pub struct ScriptedSearch {
    answers: Mutex<HashMap<String, Result<Vec<SearchItem>, QueryError>>>,
    calls: Mutex<Vec<String>>,
    login: Mutex<Result<String, QueryError>>,
}

impl Default for ScriptedSearch {
    fn default() -> Self {
        ScriptedSearch {
            answers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            login: Mutex::new(Ok("octocat".into())),
        }
    }
}

impl ScriptedSearch {
    pub fn answer(&self, query: &str, items: Vec<SearchItem>) {
        self.answers.lock().unwrap().insert(query.into(), Ok(items));
    }

    pub fn fail(&self, query: &str, err: QueryError) {
        self.answers.lock().unwrap().insert(query.into(), Err(err));
    }

    pub fn set_login(&self, login: Result<String, QueryError>) {
        *self.login.lock().unwrap() = login;
    }

    /// Queries searched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl SearchClient for ScriptedSearch {
    async fn search(&self, _token: &str, query: &str) -> Result<Vec<SearchItem>, QueryError> {
        self.calls.lock().unwrap().push(query.to_string());
        self.answers
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn authenticate(&self, _token: &str) -> Result<String, QueryError> {
        self.login.lock().unwrap().clone()
    }
}

pub type TestPatrol = Patrol<ScriptedSearch, MemoryHost>;

/// An orchestrator over a temporary state directory.
pub struct Fixture {
    pub dir: TempDir,
    pub state: Arc<StateFile>,
    pub vault: Vault,
    pub clock: Arc<ManualClock>,
    pub patrol: Arc<TestPatrol>,
}

impl Fixture {
    /// Builds a fixture with `groups` stored and, if given, a token.
    pub async fn new(groups: Vec<Group>, token: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(StateFile::in_dir(dir.path()));
        state.update(|doc| doc.groups = Some(groups)).unwrap();

        let vault = Vault::new(KeySource::for_tests("chrome-extension://test/"), state.clone());
        if let Some(token) = token {
            vault.store(token).await.unwrap();
        }

        let clock = ManualClock::at(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let patrol = Patrol::new(
            state.clone(),
            vault.clone(),
            ScriptedSearch::default(),
            MemoryHost::new(),
            PollConfig::default(),
        )
        .with_clock(clock.clone());

        Fixture {
            dir,
            state,
            vault,
            clock,
            patrol: Arc::new(patrol),
        }
    }

    pub fn search(&self) -> &ScriptedSearch {
        self.patrol.search()
    }

    pub fn host(&self) -> &MemoryHost {
        self.patrol.host()
    }

    pub fn stored(&self) -> Vec<Group> {
        self.patrol.groups().unwrap()
    }

    pub fn stored_group(&self, id: &str) -> Group {
        self.stored()
            .into_iter()
            .find(|g| g.id.as_str() == id)
            .unwrap()
    }
}
