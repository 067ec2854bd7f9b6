//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::balance::BalanceObserver;
use crate::config::Config;
use crate::logging::LogLevelHandle;
use crate::metrics::Metrics;
use crate::mining::{AddressReconciler, MiningSupervisor, ReconcileOutcome, SyncGate, SyncOutcome};
use crate::node::{HttpNodeClient, NodeClient};
use crate::server::{self, ServerState};
use crate::transfer::{describe_interval, TransferEngine, TransferMode, TransferPolicy};
use crate::wallet::{Provisioning, WalletBootstrap};

type TaskResult = (&'static str, crate::Result<()>);

/// Everything the startup sequence hands over to the long-lived tasks
struct Startup {
    reconciler: AddressReconciler,
    sync_gate: SyncGate,
    miner_addresses: Vec<String>,
}

/// Run the companion until a shutdown signal or a fatal task error
pub async fn start(config: &Config, log_level: Option<LogLevelHandle>) -> Result<()> {
    info!("Starting mining companion...");

    let node: Arc<dyn NodeClient> = Arc::new(
        HttpNodeClient::from_config(&config.node).context("Failed to create node client")?,
    );
    info!("Using full node at {}", config.node.endpoint);

    let listener = server::bind(config.server.port)
        .await
        .context("Failed to bind the HTTP server")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown_signal(cancel.clone()));

    run(config, node, log_level, listener, cancel).await
}

/// Serve health and metrics from the start, then provision the wallet,
/// wait for sync and run the background tasks until `cancel` fires or one
/// of them fails
pub async fn run(
    config: &Config,
    node: Arc<dyn NodeClient>,
    log_level: Option<LogLevelHandle>,
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<()> {
    let metrics = Arc::new(Metrics::from_config(&config.metrics));
    let mut tasks: JoinSet<TaskResult> = JoinSet::new();

    let router = server::router(
        ServerState::new(metrics.clone(), log_level),
        &config.metrics.path,
    );
    {
        let cancel = cancel.clone();
        tasks.spawn(async move { ("http server", server::serve(listener, router, cancel).await) });
    }

    let startup = match prepare(config, &node, &cancel).await {
        Ok(Some(startup)) => startup,
        Ok(None) => {
            info!("Shutdown requested during startup");
            cancel.cancel();
            return supervise(tasks, &cancel).await;
        }
        Err(e) => {
            cancel.cancel();
            if let Err(task_error) = supervise(tasks, &cancel).await {
                warn!("{}", task_error);
            }
            return Err(e);
        }
    };

    let supervisor = MiningSupervisor::new(
        node.clone(),
        startup.reconciler,
        startup.sync_gate,
        config.mining.reconcile_interval(),
        config.mining.auto_start,
    );
    {
        let cancel = cancel.clone();
        tasks.spawn(async move { ("mining supervisor", supervisor.run(cancel).await) });
    }

    let mut watched = startup.miner_addresses;
    watched.push(config.transfer.address.clone());
    let observer = BalanceObserver::new(
        node.clone(),
        metrics.clone(),
        watched,
        Duration::from_secs(config.balance.poll_interval_secs),
    );
    info!("Watching the balance of {} addresses", observer.addresses().len());
    {
        let cancel = cancel.clone();
        tasks.spawn(async move { ("balance observer", observer.run(cancel).await) });
    }

    if config.transfer.enabled() {
        let policy = TransferPolicy::from_config(&config.transfer)
            .context("Invalid transfer settings")?;
        match policy.mode() {
            TransferMode::SweepAll => info!(
                "Sweeping to {} every {} once at least {} is available",
                policy.address,
                describe_interval(policy.interval),
                policy.min_amount
            ),
            TransferMode::Capped => info!(
                "Transferring to {} every {}, between {} and {} per address",
                policy.address,
                describe_interval(policy.interval),
                policy.min_amount,
                policy.max_amount.as_ref().map(|m| m.to_string()).unwrap_or_default()
            ),
        }
        let engine = Arc::new(TransferEngine::new(
            node.clone(),
            &config.wallet,
            policy,
            metrics.clone(),
        ));
        let cancel = cancel.clone();
        tasks.spawn(async move { ("transfer engine", engine.run(cancel).await) });
    } else {
        warn!("No transfer address configured, funds will stay in the mining wallet");
    }

    info!("Mining companion running (Ctrl-C to stop)");
    supervise(tasks, &cancel).await
}

/// Startup sequence. Every failure is fatal; `None` means shutdown was
/// requested before it completed.
async fn prepare(
    config: &Config,
    node: &Arc<dyn NodeClient>,
    cancel: &CancellationToken,
) -> Result<Option<Startup>> {
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let (wallet, provisioning) = WalletBootstrap::new(node.clone(), config.wallet.clone())
        .create_and_unlock()
        .await
        .context("Failed to prepare the mining wallet")?;
    match provisioning {
        Provisioning::Existing => info!("Using existing wallet {}", wallet.name),
        Provisioning::Restored => info!("Restored wallet {}", wallet.name),
        Provisioning::Created => info!("Created wallet {}", wallet.name),
    }
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let reconciler = AddressReconciler::new(node.clone(), config.wallet.name.clone());
    if let ReconcileOutcome::Updated { addresses } = reconciler
        .reconcile()
        .await
        .context("Failed to register miner addresses")?
    {
        info!("Registered {} miner addresses", addresses.len());
    }
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let miner_addresses = node
        .miner_addresses()
        .await
        .context("Failed to read miner addresses")?;
    for (group, address) in miner_addresses.iter().enumerate() {
        info!("Miner address for group {}: {}", group, address);
    }

    let sync_gate = SyncGate::new(node.clone(), config.mining.sync_poll_interval());
    info!("Waiting for the node to be synced...");
    if sync_gate
        .wait_until_synced(cancel)
        .await
        .context("Failed while waiting for node sync")?
        == SyncOutcome::Cancelled
    {
        return Ok(None);
    }
    info!("Node is synced");

    Ok(Some(Startup {
        reconciler,
        sync_gate,
        miner_addresses,
    }))
}

/// Wait for every task; the first failure cancels the others and is returned
async fn supervise(mut tasks: JoinSet<TaskResult>, cancel: &CancellationToken) -> Result<()> {
    let mut fatal: Option<anyhow::Error> = None;
    while let Some(joined) = tasks.join_next().await {
        let (task, result) = match joined {
            Ok(finished) => finished,
            Err(e) => ("task", Err(crate::Error::Internal(e.to_string()))),
        };
        match result {
            Ok(()) => debug!("{} stopped", task),
            Err(e) => {
                error!("{} failed: {}", task, e);
                if fatal.is_none() {
                    fatal = Some(anyhow::anyhow!("{} failed: {}", task, e));
                }
                cancel.cancel();
            }
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => {
            info!("Mining companion stopped");
            Ok(())
        }
    }
}

async fn cancel_on_shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                    _ = cancel.cancelled() => return,
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = cancel.cancelled() => return,
        }
    }

    info!("Received shutdown signal");
    cancel.cancel();
}

/// Show configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

fn local_url(config: &Config, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", config.server.port, path)
}

/// Query the health endpoint of a running companion
pub async fn health(config: &Config) -> Result<()> {
    let url = local_url(config, "/health");
    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Companion not reachable at {}", url))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("Health check failed with HTTP {}: {}", status, body);
    }

    println!("OK {}", body);
    Ok(())
}

/// Change the log level of a running companion
pub async fn set_log_level(config: &Config, level: &str) -> Result<()> {
    let url = local_url(config, "/log-level");
    let response = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?
        .put(&url)
        .body(level.to_string())
        .send()
        .await
        .with_context(|| format!("Companion not reachable at {}", url))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("Log level change rejected with HTTP {}: {}", status, body);
    }

    println!("{}", body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mock::MockNode;
    use crate::node::PeerInfo;

    fn companion_config() -> Config {
        let mut config = Config::default();
        config.wallet.name = "miner".to_string();
        config.wallet.password = "pw".to_string();
        config.mining.sync_poll_interval_ms = 5;
        config
    }

    fn mining_node(synced: bool) -> Arc<MockNode> {
        let node = Arc::new(MockNode::with_wallet("miner", true));
        {
            let mut state = node.state.lock().unwrap();
            state.wallet_addresses = vec!["1A".to_string(), "1B".to_string()];
            state.peer_answers.push_back(vec![PeerInfo::synced(synced)]);
        }
        node
    }

    async fn local_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    async fn wait_for_calls(node: &MockNode, op: &str, at_least: usize) {
        for _ in 0..400 {
            if node.count(op) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} called {} times, expected {}", op, node.count(op), at_least);
    }

    fn spawn_run(
        node: &Arc<MockNode>,
        config: Config,
        listener: TcpListener,
        cancel: &CancellationToken,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let node: Arc<dyn NodeClient> = node.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { run(&config, node, None, listener, cancel).await })
    }

    #[tokio::test]
    async fn test_health_answers_while_waiting_for_sync() {
        let node = mining_node(false);
        let (listener, base) = local_listener().await;
        let cancel = CancellationToken::new();
        let handle = spawn_run(&node, companion_config(), listener, &cancel);

        wait_for_calls(&node, "inter_clique_peer_info", 2).await;

        let response = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let metrics = reqwest::get(format!("{}/metrics", base)).await.unwrap();
        assert_eq!(metrics.status(), reqwest::StatusCode::OK);
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(node.count("address_balance"), 0);
    }

    #[tokio::test]
    async fn test_runs_tasks_once_synced() {
        let node = mining_node(true);
        let (listener, _) = local_listener().await;
        let cancel = CancellationToken::new();
        let handle = spawn_run(&node, companion_config(), listener, &cancel);

        // balance observer polls right away
        wait_for_calls(&node, "address_balance", 2).await;
        assert_eq!(node.count("unlock_wallet"), 1);
        assert_eq!(node.count("set_miner_addresses"), 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let node = mining_node(true);
        node.fail("list_wallets");
        let (listener, _) = local_listener().await;

        let err = spawn_run(&node, companion_config(), listener, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to prepare the mining wallet"));
    }

    #[tokio::test]
    async fn test_cancelled_before_startup() {
        let node = mining_node(true);
        let (listener, _) = local_listener().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        spawn_run(&node, companion_config(), listener, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_bootstrap_stops_before_reconcile() {
        let node = mining_node(true);
        let (entered, release) = node.block_wallet_status();
        let (listener, _) = local_listener().await;
        let cancel = CancellationToken::new();
        let handle = spawn_run(&node, companion_config(), listener, &cancel);

        entered.notified().await;
        cancel.cancel();
        release.notify_one();

        handle.await.unwrap().unwrap();
        assert_eq!(node.count("unlock_wallet"), 1);
        assert_eq!(node.count("miner_addresses"), 0);
    }
}
