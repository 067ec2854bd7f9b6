//! Peer-sync gate
//!
//! Mining before the node caught up with its peers only produces orphans,
//! so startup (and every reconcile pass) blocks here until at least one
//! inter-clique peer reports synced. A node without peers has nothing to
//! sync with and passes straight through.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::node::{NodeClient, PeerInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    Cancelled,
}

/// True when there is no peer to sync with or any peer is synced
pub fn is_synced(peers: &[PeerInfo]) -> bool {
    peers.is_empty() || peers.iter().any(|peer| peer.is_synced)
}

pub struct SyncGate {
    node: Arc<dyn NodeClient>,
    poll_interval: Duration,
}

impl SyncGate {
    pub fn new(node: Arc<dyn NodeClient>, poll_interval: Duration) -> Self {
        Self { node, poll_interval }
    }

    /// One peer-info query: `Error::NotSynced` while no peer is synced
    pub async fn check(&self) -> Result<()> {
        let peers = self.node.inter_clique_peer_info().await?;
        if is_synced(&peers) {
            Ok(())
        } else {
            Err(Error::NotSynced)
        }
    }

    /// Poll peer info until synced or cancelled
    ///
    /// There is no retry limit. Query errors are returned immediately,
    /// they are not a "not yet synced" answer.
    pub async fn wait_until_synced(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let mut polls: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(SyncOutcome::Cancelled);
            }

            polls += 1;
            match self.check().await {
                Ok(()) => {
                    if polls > 1 {
                        info!("Node is now in sync with its peers");
                    }
                    return Ok(SyncOutcome::Synced);
                }
                Err(e) if e.is_retryable() => debug!(
                    "{} (poll {}), checking again in {:?}",
                    e, polls, self.poll_interval
                ),
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(SyncOutcome::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::mock::MockNode;

    fn gate(node: &Arc<MockNode>) -> SyncGate {
        SyncGate::new(node.clone(), Duration::from_millis(1))
    }

    #[test]
    fn test_is_synced() {
        assert!(is_synced(&[]));
        assert!(is_synced(&[PeerInfo::synced(false), PeerInfo::synced(true)]));
        assert!(!is_synced(&[PeerInfo::synced(false), PeerInfo::synced(false)]));
    }

    #[tokio::test]
    async fn test_check_reports_not_synced() {
        let node = Arc::new(MockNode::new());
        node.state
            .lock()
            .unwrap()
            .peer_answers
            .push_back(vec![PeerInfo::synced(false)]);

        let err = gate(&node).check().await.unwrap_err();
        assert!(matches!(err, Error::NotSynced));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_no_peers_passes_immediately() {
        let node = Arc::new(MockNode::new());
        let outcome = gate(&node)
            .wait_until_synced(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(node.count("inter_clique_peer_info"), 1);
    }

    #[tokio::test]
    async fn test_polls_until_a_peer_is_synced() {
        let node = Arc::new(MockNode::new());
        {
            let mut state = node.state.lock().unwrap();
            state.peer_answers.push_back(vec![PeerInfo::synced(false)]);
            state.peer_answers.push_back(vec![PeerInfo::synced(false)]);
            state.peer_answers.push_back(vec![PeerInfo::synced(false), PeerInfo::synced(true)]);
        }

        let outcome = gate(&node)
            .wait_until_synced(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Synced);
        assert_eq!(node.count("inter_clique_peer_info"), 3);
    }

    #[tokio::test]
    async fn test_cancellation_is_checked_before_querying() {
        let node = Arc::new(MockNode::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = gate(&node).wait_until_synced(&cancel).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Cancelled);
        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_waiting() {
        let node = Arc::new(MockNode::new());
        node.state
            .lock()
            .unwrap()
            .peer_answers
            .push_back(vec![PeerInfo::synced(false)]);

        let gate = SyncGate::new(node.clone(), Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = gate.wait_until_synced(&cancel).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_query_error_is_not_retried() {
        let node = Arc::new(MockNode::new());
        node.fail("inter_clique_peer_info");

        let err = gate(&node)
            .wait_until_synced(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteUnavailable(_)));
        assert_eq!(node.count("inter_clique_peer_info"), 1);
    }
}
