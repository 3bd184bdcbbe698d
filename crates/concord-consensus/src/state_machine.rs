use async_trait::async_trait;
use concord_core::Block;
use concord_state::StateStore;

use crate::error::ConsensusError;

/// Applies block contents to state. Writes go through the overlay, which
/// the pipeline persists together with the block.
#[async_trait]
pub trait StateMachine: Send + Sync {
    async fn execute(&self, block: &Block, state: &mut StateStore<'_>) -> Result<(), ConsensusError>;
}
