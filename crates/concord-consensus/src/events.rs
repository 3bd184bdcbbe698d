use async_trait::async_trait;
use concord_core::{Block, BlockHeader};

#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    BlockNew { block: Block },
    BlockDelete { block: Block },
    ForkDetected { header: BlockHeader, peer_id: Option<String> },
    FinalizedHeightChanged { from: u64, to: u64 },
}

#[async_trait]
pub trait ConsensusEventSink: Send + Sync {
    async fn on_event(&self, event: &ConsensusEvent);
}
