use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pr_patrol::bridge::{self, BridgeHost, DEFAULT_CALL_TIMEOUT};
use pr_patrol::config::Config;
use pr_patrol::github::{OctocrabSearchClient, ResultFilter};
use pr_patrol::patrol::{Patrol, PollConfig, run_scheduler};
use pr_patrol::persistence::{StateFile, run_migrations};
use pr_patrol::types::PollInterval;
use pr_patrol::vault::{KeySource, Vault};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the native-messaging stream.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pr_patrol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::parse();
    let Some(install_id) = config.install_id() else {
        bail!("no extension origin given; pr-patrol must be started by the browser");
    };
    let keys = KeySource::new(install_id);

    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state directory {}", state_dir.display()))?;
    let state = Arc::new(StateFile::in_dir(&state_dir));
    run_migrations(state.clone(), keys.clone())
        .await
        .context("migrating state document")?;

    let interval = state
        .load()
        .context("reading state document")?
        .interval
        .unwrap_or(PollInterval::DEFAULT);
    let mut schedule = PollConfig::new(interval);
    if let Some(delay) = config.initial_delay() {
        schedule = schedule.with_initial_delay(delay);
    }

    let search = OctocrabSearchClient::new(&config.api_base, ResultFilter::new(&config.web_host));
    let (host, outbound) = BridgeHost::new(DEFAULT_CALL_TIMEOUT);
    let vault = Vault::new(keys, state.clone());
    let patrol = Arc::new(Patrol::new(state, vault, search, host, schedule));

    tracing::info!(
        state_dir = %state_dir.display(),
        api_base = %config.api_base,
        interval = interval.minutes(),
        "pr-patrol starting"
    );

    let shutdown = CancellationToken::new();
    let scheduler = tokio::spawn(run_scheduler(patrol.clone(), shutdown.clone()));

    let served = bridge::serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        patrol,
        outbound,
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    scheduler.await.context("scheduler task panicked")?;
    served.context("native messaging channel failed")?;

    tracing::info!("pr-patrol stopped");
    Ok(())
}
