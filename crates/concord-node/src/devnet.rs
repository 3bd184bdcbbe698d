//! Stand-in collaborators for a single-process devnet: no transport, no
//! application state and nothing to synchronize from.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use concord_consensus::{
    ConsensusError, EndpointHandler, Network, StateMachine, SyncError, Synchronizer,
};
use concord_core::Block;
use concord_state::StateStore;
use tracing::{debug, warn};

/// Logs outbound traffic; there are never any peers
#[derive(Default)]
pub struct LogNetwork {
    endpoints: Mutex<HashMap<String, Arc<dyn EndpointHandler>>>,
}

impl LogNetwork {
    pub fn endpoint_names(&self) -> Vec<String> {
        match self.endpoints.lock() {
            Ok(endpoints) => endpoints.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Network for LogNetwork {
    async fn send(&self, event: &str, data: Vec<u8>) -> Result<(), ConsensusError> {
        debug!("Outbound {} ({} bytes)", event, data.len());
        Ok(())
    }

    async fn request_from_peer(
        &self,
        peer_id: &str,
        procedure: &str,
        _data: Vec<u8>,
    ) -> Result<Vec<u8>, ConsensusError> {
        Err(ConsensusError::Network(format!(
            "no transport to call {procedure} on {peer_id}"
        )))
    }

    async fn apply_penalty_on_peer(&self, peer_id: &str, penalty: u32) {
        warn!("Penalty {} for peer {}", penalty, peer_id);
    }

    async fn get_connected_peers(&self) -> Vec<String> {
        Vec::new()
    }

    fn register_endpoint(&self, name: &str, handler: Arc<dyn EndpointHandler>) {
        if let Ok(mut endpoints) = self.endpoints.lock() {
            endpoints.insert(name.to_string(), handler);
        }
    }
}

/// Records the applied height and nothing else
pub struct HeightStateMachine;

#[async_trait]
impl StateMachine for HeightStateMachine {
    async fn execute(&self, block: &Block, state: &mut StateStore<'_>) -> Result<(), ConsensusError> {
        state.set_value(b"height", &block.height())?;
        Ok(())
    }
}

pub struct NoSync;

#[async_trait]
impl Synchronizer for NoSync {
    async fn run(&self, block: &Block, peer_id: &str) -> Result<(), SyncError> {
        Err(SyncError::Abort(format!(
            "cannot sync to block {} from {}",
            block.id(),
            peer_id
        )))
    }
}
