//! Balance gauges for the watched addresses

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::Metrics;
use crate::node::NodeClient;

pub struct BalanceObserver {
    node: Arc<dyn NodeClient>,
    metrics: Arc<Metrics>,
    addresses: Vec<String>,
    poll_interval: Duration,
}

impl BalanceObserver {
    /// Watch `addresses`; duplicates and empty entries are dropped
    pub fn new(
        node: Arc<dyn NodeClient>,
        metrics: Arc<Metrics>,
        addresses: impl IntoIterator<Item = String>,
        poll_interval: Duration,
    ) -> Self {
        let mut watched: Vec<String> = Vec::new();
        for address in addresses {
            if !address.is_empty() && !watched.contains(&address) {
                watched.push(address);
            }
        }

        Self {
            node,
            metrics,
            addresses: watched,
            poll_interval,
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Refresh every gauge once; addresses are queried concurrently
    pub async fn poll(&self) -> Result<()> {
        let balances = try_join_all(
            self.addresses
                .iter()
                .map(|address| self.node.address_balance(address)),
        )
        .await?;

        for (address, balance) in self.addresses.iter().zip(balances) {
            debug!(
                "Balance of {}: {} ({} locked, {} utxos)",
                address, balance.balance, balance.locked_balance, balance.utxo_count
            );
            self.metrics.set_address_balance(address, &balance);
        }
        Ok(())
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Balance observer shutting down");
                    return Ok(());
                }
                // first tick completes immediately
                _ = ticker.tick() => self.poll().await?,
            }
        }
    }
}
