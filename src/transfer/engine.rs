//! Periodic transfer engine
//!
//! On every tick the engine looks at the mining wallet and moves what is
//! above the threshold to the configured address, then waits until each
//! submitted transaction is confirmed.
//!
//! Ticks never queue: each evaluation runs on its own task behind an
//! [`ExecutionGuard`], and a tick that fires while a slow transfer is still
//! confirming is skipped without touching the node.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::guard::ExecutionGuard;
use super::policy::{round_amount, TransferMode, TransferPolicy};
use crate::amount::Amount;
use crate::config::WalletConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::node::{Confirmed, NodeClient, TxResult};

/// What one evaluation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another evaluation held the guard
    Skipped,
    NothingToTransfer { available: Amount },
    Swept { amount: Amount, txs: Vec<TxResult> },
    Transferred { amount: Amount, txs: Vec<TxResult> },
}

pub struct TransferEngine {
    node: Arc<dyn NodeClient>,
    wallet_name: String,
    wallet_password: String,
    mnemonic_passphrase: String,
    policy: TransferPolicy,
    metrics: Arc<Metrics>,
    guard: ExecutionGuard,
}

impl TransferEngine {
    pub fn new(
        node: Arc<dyn NodeClient>,
        wallet: &WalletConfig,
        policy: TransferPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            node,
            wallet_name: wallet.name.clone(),
            wallet_password: wallet.password.clone(),
            mnemonic_passphrase: wallet.mnemonic_passphrase.clone(),
            policy,
            metrics,
            guard: ExecutionGuard::new(),
        }
    }

    fn passphrase(&self) -> Option<&str> {
        Some(self.mnemonic_passphrase.as_str()).filter(|p| !p.is_empty())
    }

    /// Run one evaluation unless another one is in flight
    pub async fn evaluate(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        let _permit = match self.guard.try_acquire() {
            Ok(permit) => permit,
            Err(Error::GuardBusy) => {
                warn!("Another transfer process is still running, skipping this tick");
                return Ok(TickOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        self.metrics.inc_transfer_runs();

        let wallet = self.node.wallet_status(&self.wallet_name).await?;
        if wallet.locked {
            debug!("Wallet {} is locked, unlocking it", self.wallet_name);
            self.node
                .unlock_wallet(&self.wallet_name, &self.wallet_password, self.passphrase())
                .await?;
        }

        match self.policy.mode() {
            TransferMode::SweepAll => self.sweep(cancel).await,
            TransferMode::Capped => self.transfer_capped(cancel).await,
        }
    }

    /// Spendable balance of every wallet address
    async fn available_balances(&self) -> Result<Vec<(String, Amount)>> {
        let balances = self.node.wallet_balances(&self.wallet_name).await?;
        let mut available = Vec::with_capacity(balances.len());
        for entry in balances {
            let details = self.node.address_balance(&entry.address).await?;
            let spendable = details.available();
            debug!(
                "Address {} holds {} ({} locked)",
                entry.address, details.balance, details.locked_balance
            );
            available.push((entry.address, spendable));
        }
        Ok(available)
    }

    async fn sweep(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        let total = self
            .available_balances()
            .await?
            .iter()
            .fold(Amount::zero(), |sum, (_, amount)| sum.add(amount));

        if round_amount(&total, &self.policy.min_amount, None).is_zero() {
            debug!(
                "Available {} is below the minimum transfer of {}",
                total, self.policy.min_amount
            );
            return Ok(TickOutcome::NothingToTransfer { available: total });
        }

        let txs = self
            .node
            .sweep_all(&self.wallet_name, &self.policy.address)
            .await?;
        for tx in &txs {
            info!("New tx {},{}->{} just submitted", tx.tx_id, tx.from_group, tx.to_group);
            self.wait_confirmed(tx, cancel).await?;
        }

        // Sweep results carry no amount: count the available total the sweep
        // started from, network fees included
        self.metrics.add_transferred(&total);
        info!("Swept {} to {}", total, self.policy.address);
        Ok(TickOutcome::Swept { amount: total, txs })
    }

    async fn transfer_capped(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        let max = self.policy.max_amount.as_ref();
        let mut available_total = Amount::zero();
        let mut transferred = Amount::zero();
        let mut txs = Vec::new();

        for (address, available) in self.available_balances().await? {
            available_total = available_total.add(&available);

            let amount = round_amount(&available, &self.policy.min_amount, max);
            if !amount.is_positive() {
                continue;
            }

            self.node
                .change_active_address(&self.wallet_name, &address)
                .await?;
            let tx = self
                .node
                .transfer(&self.wallet_name, &self.policy.address, &amount)
                .await?;
            info!(
                "New tx {},{}->{} moving {} from {} just submitted",
                tx.tx_id, tx.from_group, tx.to_group, amount, address
            );
            self.wait_confirmed(&tx, cancel).await?;

            self.metrics.add_transferred(&amount);
            transferred = transferred.add(&amount);
            txs.push(tx);
        }

        if txs.is_empty() {
            return Ok(TickOutcome::NothingToTransfer {
                available: available_total,
            });
        }
        Ok(TickOutcome::Transferred {
            amount: transferred,
            txs,
        })
    }

    /// Poll the transaction until the node reports it confirmed
    async fn wait_confirmed(&self, tx: &TxResult, cancel: &CancellationToken) -> Result<Confirmed> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let status = self
                .node
                .transaction_status(&tx.tx_id, tx.from_group, tx.to_group)
                .await?;
            if let Some(confirmed) = status.confirmed {
                info!(
                    "Tx {},{}->{} is now included in block {}",
                    tx.tx_id, tx.from_group, tx.to_group, confirmed.block_hash
                );
                return Ok(confirmed);
            }

            if let Some(timeout) = self.policy.confirmation_timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::ConfirmationTimeout {
                        tx_id: tx.tx_id.clone(),
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.policy.confirmation_poll_interval) => {}
            }
        }
    }

    /// Evaluate on every tick (and once up front if `immediate`) until
    /// cancelled. The first failed evaluation ends the loop with its error.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let period = self.policy.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: JoinSet<Result<TickOutcome>> = JoinSet::new();
        if self.policy.immediate {
            self.spawn_evaluation(&mut in_flight, &cancel);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.spawn_evaluation(&mut in_flight, &cancel),
                Some(joined) = in_flight.join_next() => {
                    let outcome = flatten(joined)?;
                    debug!("Transfer evaluation finished: {:?}", outcome);
                }
            }
        }

        info!("Transfer engine shutting down");
        while let Some(joined) = in_flight.join_next().await {
            match flatten(joined) {
                Ok(_) | Err(Error::Cancelled) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn spawn_evaluation(
        self: &Arc<Self>,
        in_flight: &mut JoinSet<Result<TickOutcome>>,
        cancel: &CancellationToken,
    ) {
        let engine = Arc::clone(self);
        let cancel = cancel.clone();
        in_flight.spawn(async move { engine.evaluate(&cancel).await });
    }
}

fn flatten(
    joined: std::result::Result<Result<TickOutcome>, tokio::task::JoinError>,
) -> Result<TickOutcome> {
    joined.map_err(|e| Error::Internal(format!("transfer evaluation task failed: {}", e)))?
}

/// Compact rendering of a tick interval for log lines, e.g. `15m`
pub fn describe_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs == 0 || interval.subsec_nanos() != 0 {
        format!("{:?}", interval)
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
