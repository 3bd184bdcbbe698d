use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use concord_core::{serialize, Block, BLOCK_VERSION};
use concord_state::{ChainStore, StateError, Storage};
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::bft::BftMethod;
use crate::commit_pool::CommitPool;
use crate::endpoint::CommitEndpoint;
use crate::error::{ConsensusError, SyncError};
use crate::events::{ConsensusEvent, ConsensusEventSink};
use crate::fork_choice::{ForkChoice, ForkStatus, ReceiveTimes, SlotForkChoice};
use crate::network::{
    EndpointHandler, Network, PostBlockEvent, DEFAULT_PENALTY, NETWORK_EVENT_POST_BLOCK,
    NETWORK_EVENT_POST_SINGLE_COMMITS, NETWORK_RPC_GET_LAST_BLOCK,
};
use crate::state_machine::StateMachine;
use crate::sync::Synchronizer;

/// Configuration for the consensus pipeline
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Network identifier
    pub chain_id: u64,
    /// Block time in seconds
    pub block_time: u64,
    /// Only blocks of this version are accepted
    pub block_version: u32,
    /// Penalty applied to peers sending invalid blocks
    pub penalty: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            chain_id: 1,
            block_time: 10,
            block_version: BLOCK_VERSION,
            penalty: DEFAULT_PENALTY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ExecuteOptions {
    skip_broadcast: bool,
    remove_from_temp_table: bool,
}

/// Guarded by the execution mutex together with the tip itself
#[derive(Debug, Default)]
struct ExecutionState {
    tip_received_at: Option<u64>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Classifies incoming blocks against the tip and applies them one at a time
pub struct Consensus<S: Storage> {
    config: ConsensusConfig,
    chain: Arc<RwLock<ChainStore<S>>>,
    bft: Arc<dyn BftMethod>,
    network: Arc<dyn Network>,
    commit_pool: Arc<CommitPool<S>>,
    state_machine: Arc<dyn StateMachine>,
    synchronizer: Arc<dyn Synchronizer>,
    fork_choice: Arc<dyn ForkChoice>,
    execution: Mutex<ExecutionState>,
    stopped: AtomicBool,
    event_sinks: Vec<Arc<dyn ConsensusEventSink>>,
}

impl<S: Storage + 'static> Consensus<S> {
    pub fn new(
        config: ConsensusConfig,
        chain: Arc<RwLock<ChainStore<S>>>,
        bft: Arc<dyn BftMethod>,
        network: Arc<dyn Network>,
        commit_pool: Arc<CommitPool<S>>,
        state_machine: Arc<dyn StateMachine>,
        synchronizer: Arc<dyn Synchronizer>,
    ) -> Self {
        let fork_choice = Arc::new(SlotForkChoice::new(config.block_time));
        Consensus {
            config,
            chain,
            bft,
            network,
            commit_pool,
            state_machine,
            synchronizer,
            fork_choice,
            execution: Mutex::new(ExecutionState::default()),
            stopped: AtomicBool::new(false),
            event_sinks: Vec::new(),
        }
    }

    pub fn set_fork_choice(&mut self, fork_choice: Arc<dyn ForkChoice>) {
        self.fork_choice = fork_choice;
    }

    pub fn add_event_sink(&mut self, sink: Arc<dyn ConsensusEventSink>) {
        self.event_sinks.push(sink);
    }

    pub fn chain(&self) -> &Arc<RwLock<ChainStore<S>>> {
        &self.chain
    }

    pub fn commit_pool(&self) -> &Arc<CommitPool<S>> {
        &self.commit_pool
    }

    /// Register block announcement, commit gossip and last block handlers
    pub fn register_endpoints(self: &Arc<Self>) {
        self.network.register_endpoint(
            NETWORK_EVENT_POST_BLOCK,
            Arc::new(PostBlockHandler {
                consensus: Arc::downgrade(self),
            }),
        );
        self.network.register_endpoint(
            NETWORK_EVENT_POST_SINGLE_COMMITS,
            Arc::new(CommitEndpoint::new(
                Arc::clone(&self.commit_pool),
                Arc::clone(&self.network),
                self.config.penalty,
            )),
        );
        self.network.register_endpoint(
            NETWORK_RPC_GET_LAST_BLOCK,
            Arc::new(LastBlockHandler {
                chain: Arc::clone(&self.chain),
            }),
        );
    }

    /// Execute a block produced by this node
    pub async fn execute(&self, block: Block) -> Result<(), ConsensusError> {
        self.execute_block(block, None).await
    }

    /// Handle a block announcement from `peer_id`
    pub async fn on_block_receive(&self, data: &[u8], peer_id: &str) -> Result<(), ConsensusError> {
        if data.is_empty() {
            warn!("Received empty block announcement from {}", peer_id);
            self.penalize(peer_id).await;
            return Ok(());
        }

        let event: PostBlockEvent = match serialize::from_bytes(data) {
            Ok(event) => event,
            Err(e) => {
                warn!("Invalid block announcement from {}: {}", peer_id, e);
                self.penalize(peer_id).await;
                return Ok(());
            }
        };
        let block = match Block::from_bytes(&event.block) {
            Ok(block) => block,
            Err(e) => {
                warn!("Undecodable block from {}: {}", peer_id, e);
                self.penalize(peer_id).await;
                return Err(e.into());
            }
        };

        debug!(
            "Received block {} at height {} from {}",
            block.id(),
            block.height(),
            peer_id
        );
        match self.execute_block(block, Some(peer_id)).await {
            Err(ConsensusError::ApplyPenalty(reason)) => {
                warn!("Penalizing {} for invalid block: {}", peer_id, reason);
                self.penalize(peer_id).await;
                Err(ConsensusError::ApplyPenalty(reason))
            }
            result => result,
        }
    }

    async fn execute_block(&self, block: Block, peer_id: Option<&str>) -> Result<(), ConsensusError> {
        let mut execution = self.execution.lock().await;
        if self.stopped.load(Ordering::Acquire) {
            debug!("Consensus stopped, ignoring block {}", block.id());
            return Ok(());
        }

        let tip = self.chain.read().await.last_block()?.clone();
        let received = ReceiveTimes {
            candidate: now_secs(),
            tip: execution.tip_received_at,
        };
        let status = self
            .fork_choice
            .fork_status(&block.header, &tip.header, received);
        debug!(
            "Block {} at height {} classified as {:?} against tip {}",
            block.id(),
            block.height(),
            status,
            tip.id()
        );

        match status {
            ForkStatus::IdenticalBlock => {
                debug!("Block {} already applied", block.id());
                Ok(())
            }
            ForkStatus::Discard => {
                info!("Discarding block {} at height {}", block.id(), block.height());
                self.emit_fork(&block, peer_id).await;
                Ok(())
            }
            ForkStatus::DoubleForging => {
                warn!(
                    "Double forging by {} at height {}",
                    block.header.generator_address,
                    block.height()
                );
                self.emit_fork(&block, peer_id).await;
                Ok(())
            }
            ForkStatus::DifferentChain => {
                info!(
                    "Block {} at height {} is on a different chain",
                    block.id(),
                    block.height()
                );
                self.emit_fork(&block, peer_id).await;
                match peer_id {
                    Some(peer_id) => self.sync(&block, peer_id).await,
                    None => {
                        warn!("Local block {} is on a different chain", block.id());
                        Ok(())
                    }
                }
            }
            ForkStatus::ValidBlock => {
                self.validate(&block)?;
                self.execute_validated(&mut execution, block, ExecuteOptions::default())
                    .await?;
                Ok(())
            }
            ForkStatus::TieBreak => {
                info!(
                    "Tie break: replacing tip {} with block {}",
                    tip.id(),
                    block.id()
                );
                self.validate(&block)?;
                self.delete_block(&mut execution, &tip, true).await?;

                if let Err(e) = self
                    .execute_validated(&mut execution, block, ExecuteOptions::default())
                    .await
                {
                    error!(
                        "Failed to apply tie breaking block, restoring {}: {}",
                        tip.id(),
                        e
                    );
                    let restore = ExecuteOptions {
                        skip_broadcast: true,
                        remove_from_temp_table: true,
                    };
                    let restored = self.execute_validated(&mut execution, tip, restore).await?;
                    debug!("Restored block {}", restored.id());
                }
                Ok(())
            }
        }
    }

    /// Verify the block against the chain and BFT state, broadcast it,
    /// execute it and persist it with its state diff
    async fn execute_validated(
        &self,
        execution: &mut ExecutionState,
        block: Block,
        options: ExecuteOptions,
    ) -> Result<Block, ConsensusError> {
        self.verify_block_header(&block).await?;

        if !options.skip_broadcast {
            self.broadcast(&block).await?;
        }

        let max_height_precommitted = self.bft.get_bft_heights().await?.max_height_precommitted;
        let (from, to) = {
            let mut chain = self.chain.write().await;
            let diff = {
                let mut store = chain.state_store();
                self.state_machine.execute(&block, &mut store).await?;
                store.into_diff()
            };
            let from = chain.finalized_height();
            let to = from.max(max_height_precommitted.min(block.height()));
            chain.save_block(block.clone(), diff, to, options.remove_from_temp_table)?;
            (from, to)
        };
        execution.tip_received_at = Some(now_secs());

        info!(
            "Executed block {} at height {} with {} transactions",
            block.id(),
            block.height(),
            block.transactions.len()
        );
        self.emit(ConsensusEvent::BlockNew {
            block: block.clone(),
        })
        .await;
        if to > from {
            info!("Finalized height changed from {} to {}", from, to);
            self.emit(ConsensusEvent::FinalizedHeightChanged { from, to })
                .await;
        }

        Ok(block)
    }

    async fn verify_block_header(&self, block: &Block) -> Result<(), ConsensusError> {
        let header = &block.header;
        let tip = self.chain.read().await.last_block()?.header.clone();

        if header.height != tip.height + 1 || header.previous_block_id != tip.id {
            return Err(ConsensusError::InvalidBlock(format!(
                "block {} at height {} does not extend tip {}",
                header.id, header.height, tip.id
            )));
        }
        if header.timestamp <= tip.timestamp {
            return Err(ConsensusError::InvalidBlock(format!(
                "timestamp {} is not after tip timestamp {}",
                header.timestamp, tip.timestamp
            )));
        }
        if header.timestamp > now_secs() + self.config.block_time {
            return Err(ConsensusError::InvalidBlock(format!(
                "timestamp {} is in the future",
                header.timestamp
            )));
        }

        let params = self.bft.get_bft_parameters(header.height).await?;
        let generator = params.validator(&header.generator_address).ok_or_else(|| {
            ConsensusError::InvalidBlock(format!(
                "generator {} is not active at height {}",
                header.generator_address, header.height
            ))
        })?;
        if generator.generator_key != header.generator_public_key {
            return Err(ConsensusError::InvalidBlock(
                "generator key does not match the validator".to_string(),
            ));
        }
        header
            .verify_signature(&generator.generator_key)
            .map_err(|e| ConsensusError::InvalidBlock(e.to_string()))?;

        let heights = self.bft.get_bft_heights().await?;
        if header.max_height_prevoted != heights.max_height_prevoted {
            return Err(ConsensusError::InvalidBlock(format!(
                "max height prevoted {} does not match {}",
                header.max_height_prevoted, heights.max_height_prevoted
            )));
        }
        if !self
            .commit_pool
            .verify_aggregate_commit(&header.aggregate_commit)
            .await?
        {
            return Err(ConsensusError::InvalidBlock(format!(
                "invalid aggregate commit at height {}",
                header.aggregate_commit.height
            )));
        }

        Ok(())
    }

    /// Structural checks; every failure penalizes the origin peer
    fn validate(&self, block: &Block) -> Result<(), ConsensusError> {
        if block.header.version != self.config.block_version {
            return Err(ConsensusError::ApplyPenalty(format!(
                "block version {} is not supported",
                block.header.version
            )));
        }
        block
            .validate()
            .map_err(|e| ConsensusError::ApplyPenalty(e.to_string()))
    }

    async fn delete_block(
        &self,
        execution: &mut ExecutionState,
        block: &Block,
        save_temp: bool,
    ) -> Result<(), ConsensusError> {
        {
            let mut chain = self.chain.write().await;
            let finalized = chain.finalized_height();
            if block.height() <= finalized {
                return Err(StateError::FinalizedBlock {
                    height: block.height(),
                    finalized,
                }
                .into());
            }
            chain.remove_block(block, save_temp)?;
        }
        execution.tip_received_at = None;

        debug!("Deleted block {} at height {}", block.id(), block.height());
        self.emit(ConsensusEvent::BlockDelete {
            block: block.clone(),
        })
        .await;
        Ok(())
    }

    /// Remove the tip, keeping it in the temporary table if `save_temp`
    pub async fn delete_last_block(&self, save_temp: bool) -> Result<Block, ConsensusError> {
        let mut execution = self.execution.lock().await;
        let tip = self.chain.read().await.last_block()?.clone();
        self.delete_block(&mut execution, &tip, save_temp).await?;
        Ok(tip)
    }

    async fn sync(&self, block: &Block, peer_id: &str) -> Result<(), ConsensusError> {
        loop {
            match self.synchronizer.run(block, peer_id).await {
                Ok(()) => return Ok(()),
                Err(SyncError::ApplyPenaltyAndRestart {
                    peer_id: offender,
                    reason,
                }) => {
                    warn!("Restarting sync after penalizing {}: {}", offender, reason);
                    self.penalize(&offender).await;
                }
                Err(SyncError::Restart(reason)) => {
                    info!("Restarting sync: {}", reason);
                }
                Err(SyncError::Abort(reason)) => {
                    info!("Sync aborted: {}", reason);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Ask a uniformly chosen connected peer for its last block
    pub async fn fetch_last_block_from_random_peer(
        &self,
    ) -> Result<Option<(String, Block)>, ConsensusError> {
        let peers = self.network.get_connected_peers().await;
        if peers.is_empty() {
            return Ok(None);
        }
        let peer = peers[rand::thread_rng().gen_range(0..peers.len())].clone();

        let data = self
            .network
            .request_from_peer(&peer, NETWORK_RPC_GET_LAST_BLOCK, Vec::new())
            .await?;
        match Block::from_bytes(&data) {
            Ok(block) => Ok(Some((peer, block))),
            Err(e) => {
                self.penalize(&peer).await;
                Err(e.into())
            }
        }
    }

    /// Refuse further blocks and wait for any execution in flight
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _barrier = self.execution.lock().await;
        info!("Consensus stopped");
    }

    async fn broadcast(&self, block: &Block) -> Result<(), ConsensusError> {
        let event = PostBlockEvent {
            block: block.to_bytes()?,
        };
        if let Err(e) = self
            .network
            .send(NETWORK_EVENT_POST_BLOCK, serialize::to_bytes(&event)?)
            .await
        {
            warn!("Failed to broadcast block {}: {}", block.id(), e);
        }
        Ok(())
    }

    async fn penalize(&self, peer_id: &str) {
        self.network
            .apply_penalty_on_peer(peer_id, self.config.penalty)
            .await;
    }

    async fn emit_fork(&self, block: &Block, peer_id: Option<&str>) {
        self.emit(ConsensusEvent::ForkDetected {
            header: block.header.clone(),
            peer_id: peer_id.map(str::to_string),
        })
        .await;
    }

    async fn emit(&self, event: ConsensusEvent) {
        for sink in &self.event_sinks {
            sink.on_event(&event).await;
        }
    }
}

struct PostBlockHandler<S: Storage> {
    consensus: Weak<Consensus<S>>,
}

#[async_trait]
impl<S: Storage + 'static> EndpointHandler for PostBlockHandler<S> {
    async fn handle(&self, data: Vec<u8>, peer_id: &str) -> Result<Vec<u8>, ConsensusError> {
        if let Some(consensus) = self.consensus.upgrade() {
            consensus.on_block_receive(&data, peer_id).await?;
        }
        Ok(Vec::new())
    }
}

struct LastBlockHandler<S: Storage> {
    chain: Arc<RwLock<ChainStore<S>>>,
}

#[async_trait]
impl<S: Storage + 'static> EndpointHandler for LastBlockHandler<S> {
    async fn handle(&self, _data: Vec<u8>, _peer_id: &str) -> Result<Vec<u8>, ConsensusError> {
        Ok(self.chain.read().await.last_block()?.to_bytes()?)
    }
}
