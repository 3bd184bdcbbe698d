use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConsensusError;

pub const NETWORK_EVENT_POST_BLOCK: &str = "postBlock";
pub const NETWORK_EVENT_POST_SINGLE_COMMITS: &str = "postSingleCommits";
pub const NETWORK_RPC_GET_LAST_BLOCK: &str = "getLastBlock";

/// Penalty applied for malformed or invalid peer input
pub const DEFAULT_PENALTY: u32 = 100;

/// Envelope of an announced block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostBlockEvent {
    pub block: Vec<u8>,
}

/// Envelope of a commit gossip message; each entry is an encoded single commit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SingleCommitsPacket {
    pub commits: Vec<Vec<u8>>,
}

/// Handler for an inbound event or RPC procedure
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn handle(&self, data: Vec<u8>, peer_id: &str) -> Result<Vec<u8>, ConsensusError>;
}

/// Peer-to-peer transport
#[async_trait]
pub trait Network: Send + Sync {
    /// Broadcast an event to connected peers
    async fn send(&self, event: &str, data: Vec<u8>) -> Result<(), ConsensusError>;

    async fn request_from_peer(
        &self,
        peer_id: &str,
        procedure: &str,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ConsensusError>;

    async fn apply_penalty_on_peer(&self, peer_id: &str, penalty: u32);

    async fn get_connected_peers(&self) -> Vec<String>;

    fn register_endpoint(&self, name: &str, handler: Arc<dyn EndpointHandler>);
}
