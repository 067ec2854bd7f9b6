//! Recurring mining housekeeping
//!
//! Every `reconcile_interval` the supervisor re-registers the wallet's
//! addresses if they drifted, waits for the node to be in sync again and,
//! when configured, makes sure the node is actually mining. Any error ends
//! the loop and is returned: running on a stale miner registration is not
//! considered safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::reconciler::{AddressReconciler, ReconcileOutcome};
use super::sync_gate::{SyncGate, SyncOutcome};
use crate::error::Result;
use crate::node::NodeClient;

pub struct MiningSupervisor {
    node: Arc<dyn NodeClient>,
    reconciler: AddressReconciler,
    sync_gate: SyncGate,
    interval: Duration,
    auto_start: bool,
}

impl MiningSupervisor {
    pub fn new(
        node: Arc<dyn NodeClient>,
        reconciler: AddressReconciler,
        sync_gate: SyncGate,
        interval: Duration,
        auto_start: bool,
    ) -> Self {
        Self {
            node,
            reconciler,
            sync_gate,
            interval,
            auto_start,
        }
    }

    /// Start CPU mining on the node if it is idle. Returns true if started.
    pub async fn ensure_mining(&self) -> Result<bool> {
        if self.node.node_is_mining().await? {
            return Ok(false);
        }
        warn!("Node is not mining, starting it");
        self.node.start_mining().await?;
        Ok(true)
    }

    /// One housekeeping pass
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        if let ReconcileOutcome::Updated { addresses } = self.reconciler.reconcile().await? {
            info!("Miner addresses drifted and were re-registered: {:?}", addresses);
        }

        let outcome = self.sync_gate.wait_until_synced(cancel).await?;
        if outcome == SyncOutcome::Synced && self.auto_start {
            self.ensure_mining().await?;
        }
        Ok(outcome)
    }

    /// Run a pass every interval until cancelled or a pass fails
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Mining supervisor shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if self.run_pass(&cancel).await? == SyncOutcome::Cancelled {
                        return Ok(());
                    }
                }
            }
        }
    }
}
