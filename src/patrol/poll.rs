//! Poll scheduling.
//!
//! A periodic pass runs every [`PollInterval`]. The interval is changed at
//! runtime by `save-settings`; the scheduler picks the change up through a
//! watch channel and restarts its timer from the moment of the change.
//!
//! Other triggers (`poll-now`, a new browser window, startup) call
//! [`Patrol::poll_all`] directly; the pass lock serializes them with the
//! scheduled ones.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::orchestrator::Patrol;
use crate::github::SearchClient;
use crate::host::TabHost;
use crate::types::PollInterval;

/// Scheduling configuration, shared between the scheduler and the
/// settings handler.
#[derive(Debug, Clone)]
pub struct PollConfig {
    interval: Arc<watch::Sender<PollInterval>>,

    /// Delay before the first scheduled pass. `None` waits one interval.
    pub initial_delay: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(PollInterval::DEFAULT)
    }
}

impl PollConfig {
    pub fn new(interval: PollInterval) -> Self {
        let (tx, _rx) = watch::channel(interval);
        PollConfig {
            interval: Arc::new(tx),
            initial_delay: None,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn interval(&self) -> PollInterval {
        *self.interval.borrow()
    }

    /// Changes the interval. A no-op when unchanged, so the running timer
    /// is not reset by a settings save that kept the same value.
    pub fn set_interval(&self, interval: PollInterval) {
        self.interval.send_if_modified(|current| {
            if *current == interval {
                return false;
            }
            *current = interval;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<PollInterval> {
        self.interval.subscribe()
    }

    fn first_delay(&self, period: Duration) -> Duration {
        self.initial_delay.unwrap_or(period)
    }
}

/// Runs scheduled passes until `shutdown` is cancelled.
///
/// Ticks missed while a pass was running are delayed, not bursted.
#[instrument(skip_all)]
pub async fn run_scheduler<S, H>(patrol: Arc<Patrol<S, H>>, shutdown: CancellationToken)
where
    S: SearchClient,
    H: TabHost,
{
    let mut changes = patrol.schedule().subscribe();
    let mut period = changes.borrow_and_update().as_duration();
    let start = Instant::now() + patrol.schedule().first_delay(period);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(minutes = period.as_secs() / 60, "scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("scheduler stopping");
                break;
            }

            changed = changes.changed() => {
                if changed.is_err() {
                    debug!("interval channel closed");
                    break;
                }
                period = changes.borrow_and_update().as_duration();
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(minutes = period.as_secs() / 60, "poll interval changed");
            }

            _ = ticker.tick() => {
                let report = patrol.poll_all(None).await;
                debug!(?report, "scheduled pass finished");
            }
        }
    }
}
