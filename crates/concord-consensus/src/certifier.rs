use std::sync::Arc;

use async_trait::async_trait;
use concord_core::ValidatorInfo;
use concord_state::{ChainStore, Storage};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::bft::BftMethod;
use crate::commit_pool::{create_single_commit, CommitPool};
use crate::error::ConsensusError;
use crate::events::{ConsensusEvent, ConsensusEventSink};

/// Signs single commits for the local validators whenever the finalized
/// height rises, and hands them to the commit pool.
pub struct Certifier<S: Storage> {
    chain_id: u64,
    validators: Vec<ValidatorInfo>,
    bft: Arc<dyn BftMethod>,
    chain: Arc<RwLock<ChainStore<S>>>,
    pool: Arc<CommitPool<S>>,
}

impl<S: Storage + 'static> Certifier<S> {
    pub fn new(
        chain_id: u64,
        validators: Vec<ValidatorInfo>,
        bft: Arc<dyn BftMethod>,
        chain: Arc<RwLock<ChainStore<S>>>,
        pool: Arc<CommitPool<S>>,
    ) -> Self {
        Certifier {
            chain_id,
            validators,
            bft,
            chain,
            pool,
        }
    }

    /// Commit to every height in `(from, to]` above the removal height.
    /// Returns the number of commits created.
    pub async fn certify(&self, from: u64, to: u64) -> Result<usize, ConsensusError> {
        if from >= to || self.validators.is_empty() {
            return Ok(0);
        }

        let start = from.max(self.pool.removal_height().await?) + 1;
        let mut created = 0;
        for height in start..=to {
            let header = self
                .chain
                .read()
                .await
                .header_by_height(height)?
                .ok_or(ConsensusError::HeaderNotFound(height))?;
            let params = self.bft.get_bft_parameters(height).await?;

            for validator in self.validators.iter().filter(|v| params.is_active(&v.address)) {
                let commit = create_single_commit(&header, validator, self.chain_id)?;
                self.pool.add_commit(commit).await;
                created += 1;
            }
        }

        if created > 0 {
            debug!(
                "Created {} single commits for heights {} to {}",
                created, start, to
            );
        }
        Ok(created)
    }
}

#[async_trait]
impl<S: Storage + 'static> ConsensusEventSink for Certifier<S> {
    async fn on_event(&self, event: &ConsensusEvent) {
        if let ConsensusEvent::FinalizedHeightChanged { from, to } = event {
            if let Err(e) = self.certify(*from, *to).await {
                warn!("Failed to certify heights {} to {}: {}", from + 1, to, e);
            }
        }
    }
}
