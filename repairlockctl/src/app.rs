use std::{io::IsTerminal, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use dialoguer::Password;
use repairlock_config::{Config, resolve_store_urls};
use repairlock_core::{
    ClusterStatusAggregator, RangeRepairPlanner, RecordStore, SchedulerDriver, SchedulerOutcome,
    ShellExecutor,
    store::{RedisStore, RedisStoreOptions, TimeoutStore},
    topology::resolve_identity,
};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{cli::Mode, dashboard};

/// Name this node is known by: the configured hostname or the system one.
fn local_nodename(config: &Config) -> Result<String> {
    if let Some(name) = config
        .node
        .hostname
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        return Ok(name.to_string());
    }
    let name = hostname::get().context("failed to read the system hostname")?;
    name.into_string()
        .map_err(|raw| anyhow!("system hostname is not valid UTF-8: {raw:?}"))
}

/// Asks for the store password when a username was given without one.
fn prompt_for_password(config: &mut Config) -> Result<()> {
    let store = &mut config.store;
    if store.username.is_none() || store.password.is_some() || store.password_file.is_some() {
        return Ok(());
    }
    if !std::io::stdin().is_terminal() {
        debug!("no terminal attached; connecting without a password");
        return Ok(());
    }
    let password = Password::new()
        .with_prompt("Store password")
        .allow_empty_password(true)
        .interact()
        .context("failed to read the store password")?;
    if !password.is_empty() {
        store.password = Some(password);
    }
    Ok(())
}

async fn connect(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let urls = resolve_store_urls(&config.store)?;
    debug!(?urls, "resolved store endpoints");
    let options = RedisStoreOptions {
        url: urls.primary,
        replica_url: urls.replica,
        namespace: config.coordinator.namespace.clone(),
        quorum_acks: config.store.quorum_acks,
        all_acks: config.store.all_acks,
        wait_timeout: config.store.wait_timeout(),
        scan_count: config.store.scan_count,
    };

    let limit = config.coordinator.store_timeout();
    let store = tokio::time::timeout(limit, RedisStore::connect(options))
        .await
        .map_err(|_| anyhow!("timed out connecting to the store after {limit:?}"))??;
    Ok(Arc::new(TimeoutStore::new(Arc::new(store), limit)))
}

/// Runs one invocation in the requested mode.
pub async fn run(mut config: Config, mode: Mode) -> Result<()> {
    prompt_for_password(&mut config)?;
    let store = connect(&config).await?;

    if mode == Mode::Watch {
        return watch_cluster(&config, store).await;
    }

    let nodename = local_nodename(&config)?;
    let key = resolve_identity(&nodename, config.node.data_center.as_deref())?;
    let planner = RangeRepairPlanner::new(
        config.planner.range_repair_tool.clone(),
        config.planner.local,
    );
    let driver = SchedulerDriver::new(
        key,
        store,
        Arc::new(config.coordinator.clone()),
        Arc::new(planner),
        Arc::new(ShellExecutor),
    )
    .with_peer_data_centers(config.node.peer_data_centers.clone());
    debug!(identity = %driver.key(), "scheduler ready");

    match mode {
        Mode::Reset => {
            driver.reset().await?;
        }
        _ => {
            let invocation = driver.run_once().await?;
            match invocation.outcome {
                SchedulerOutcome::Completed(report) => {
                    let failed = report.failed_steps();
                    if failed > 0 {
                        info!(failed, "repair finished with failing steps");
                    }
                }
                SchedulerOutcome::Skipped(reason) => {
                    debug!(%reason, "nothing to do this time");
                }
                SchedulerOutcome::Reset => {}
            }
        }
    }
    Ok(())
}

async fn watch_cluster(config: &Config, store: Arc<dyn RecordStore>) -> Result<()> {
    if !std::io::stdout().is_terminal() {
        bail!("--watch needs an interactive terminal");
    }
    let aggregator = ClusterStatusAggregator::new(store, config.dashboard.scan_page_size);
    let (interval_tx, interval_rx) = watch::channel(config.dashboard.poll_interval());
    let (snapshots, poller) = aggregator.spawn(interval_rx);
    let thresholds = config.dashboard.thresholds();

    let ui =
        tokio::task::spawn_blocking(move || dashboard::run(snapshots, interval_tx, thresholds));
    let result = ui.await.context("dashboard thread panicked")?;

    // Dropping the last snapshot receiver stops the poller; don't wait on a
    // store call that is still in flight.
    if tokio::time::timeout(Duration::from_secs(1), poller).await.is_err() {
        debug!("cluster poller still busy at exit");
    }
    result
}
