use async_trait::async_trait;
use concord_core::Block;

use crate::error::SyncError;

/// Catches the local chain up with a peer that is on a different chain.
///
/// `run` is called while the pipeline holds its execution lock.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    async fn run(&self, block: &Block, peer_id: &str) -> Result<(), SyncError>;
}
