use std::sync::Arc;

use async_trait::async_trait;
use concord_core::{serialize, SingleCommit};
use concord_state::Storage;
use tracing::{debug, warn};

use crate::commit_pool::CommitPool;
use crate::error::ConsensusError;
use crate::network::{EndpointHandler, Network, SingleCommitsPacket};

/// Inbound handler for commit gossip
pub struct CommitEndpoint<S: Storage> {
    pool: Arc<CommitPool<S>>,
    network: Arc<dyn Network>,
    penalty: u32,
}

impl<S: Storage + 'static> CommitEndpoint<S> {
    pub fn new(pool: Arc<CommitPool<S>>, network: Arc<dyn Network>, penalty: u32) -> Self {
        CommitEndpoint {
            pool,
            network,
            penalty,
        }
    }

    /// Validate and insert the commits of one gossip packet. Returns the
    /// number of commits added. Stops at the first commit that earns the
    /// peer a penalty.
    pub async fn handle_commits(&self, data: &[u8], peer_id: &str) -> Result<usize, ConsensusError> {
        let packet: SingleCommitsPacket = match serialize::from_bytes(data) {
            Ok(packet) => packet,
            Err(e) => return Err(self.penalize(peer_id, e.to_string()).await),
        };

        let mut added = 0;
        for bytes in &packet.commits {
            let commit: SingleCommit = match serialize::from_bytes(bytes) {
                Ok(commit) => commit,
                Err(e) => return Err(self.penalize(peer_id, e.to_string()).await),
            };

            match self.pool.validate_commit(&commit).await {
                Ok(true) => {
                    self.pool.add_commit(commit).await;
                    added += 1;
                }
                Ok(false) => {}
                Err(
                    e @ (ConsensusError::InactiveValidator { .. }
                    | ConsensusError::InvalidCommitSignature { .. }),
                ) => {
                    warn!("Invalid commit from {}: {}", peer_id, e);
                    self.network
                        .apply_penalty_on_peer(peer_id, self.penalty)
                        .await;
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Accepted {} of {} commits from {}",
            added,
            packet.commits.len(),
            peer_id
        );
        Ok(added)
    }

    async fn penalize(&self, peer_id: &str, reason: String) -> ConsensusError {
        warn!("Malformed commit gossip from {}: {}", peer_id, reason);
        self.network
            .apply_penalty_on_peer(peer_id, self.penalty)
            .await;
        ConsensusError::ApplyPenalty(reason)
    }
}

#[async_trait]
impl<S: Storage + 'static> EndpointHandler for CommitEndpoint<S> {
    async fn handle(&self, data: Vec<u8>, peer_id: &str) -> Result<Vec<u8>, ConsensusError> {
        self.handle_commits(&data, peer_id).await?;
        Ok(Vec::new())
    }
}
