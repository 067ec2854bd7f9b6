//! Miner address reconciliation
//!
//! The node pays mining rewards to its registered miner addresses. Those
//! must be exactly the mining wallet's addresses, otherwise rewards land
//! somewhere the companion never sweeps.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::node::NodeClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Updated { addresses: Vec<String> },
}

/// Same membership, order independent
///
/// A registration with at most one address never counts as matching; the
/// wallet is a miner wallet with one address per group, so such a set is
/// always re-pushed.
pub fn has_same_addresses(miner_addresses: &[String], wallet_addresses: &[String]) -> bool {
    if miner_addresses.len() <= 1 || miner_addresses.len() != wallet_addresses.len() {
        return false;
    }

    miner_addresses
        .iter()
        .all(|miner| wallet_addresses.iter().any(|wallet| wallet == miner))
}

pub struct AddressReconciler {
    node: Arc<dyn NodeClient>,
    wallet_name: String,
}

impl AddressReconciler {
    pub fn new(node: Arc<dyn NodeClient>, wallet_name: impl Into<String>) -> Self {
        Self {
            node,
            wallet_name: wallet_name.into(),
        }
    }

    /// Push the wallet's addresses to the node when the sets differ
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let current = match self.node.miner_addresses().await {
            Ok(addresses) => addresses,
            Err(e) if e.is_retryable() => {
                debug!("No miner addresses registered on the node yet");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let wallet = self.node.wallet_addresses(&self.wallet_name).await?;

        if has_same_addresses(&current, &wallet.addresses) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        debug!("Current miner addresses {:?}", current);
        debug!("Mining wallet addresses {:?}", wallet.addresses);

        self.node.set_miner_addresses(&wallet.addresses).await?;
        info!(
            "Registered {} addresses of wallet {} as miner addresses",
            wallet.addresses.len(),
            self.wallet_name
        );

        Ok(ReconcileOutcome::Updated {
            addresses: wallet.addresses,
        })
    }
}
