//! Shared fixtures: a small validator set on a memory-backed chain, and
//! plain-struct fakes for the consensus ports.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use concord_consensus::{
    create_single_commit, BftHeights, BftMethod, CommitPool, CommitPoolConfig, Consensus,
    ConsensusConfig, ConsensusError, ConsensusEvent, ConsensusEventSink, EndpointHandler,
    ForkChoice, ForkStatus, Network, ReceiveTimes, StateMachine, StaticBft, SyncError,
    Synchronizer,
};
use concord_core::{
    merkle_root, AggregateCommit, BftValidator, Block, BlockHeader, BlsKeyPair, GenesisConfig,
    Hash, KeyPair, Sig, SingleCommit, ValidatorInfo, BLOCK_VERSION,
};
use concord_state::{ChainStore, MemoryStorage, StateDiff, StateStore};
use tokio::sync::RwLock;

pub const CHAIN_ID: u64 = 7;
pub const BLOCK_TIME: u64 = 10;

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub struct TestValidator {
    pub generator: KeyPair,
    pub info: ValidatorInfo,
    pub bft: BftValidator,
}

impl TestValidator {
    fn generate(weight: u64) -> Self {
        let generator = KeyPair::generate();
        let bls = BlsKeyPair::generate();
        let info = ValidatorInfo::from_keypair(generator.address(), bls);
        let bft = BftValidator {
            address: generator.address(),
            bft_weight: weight,
            bls_key: info.bls_public_key,
            generator_key: generator.public,
        };
        TestValidator {
            generator,
            info,
            bft,
        }
    }
}

/// Validators, BFT provider, chain and commit pool wired together
pub struct TestNet {
    pub validators: Vec<TestValidator>,
    pub threshold: u64,
    pub bft: Arc<StaticBft>,
    pub chain: Arc<RwLock<ChainStore<MemoryStorage>>>,
    pub network: Arc<RecordingNetwork>,
    pub pool: Arc<CommitPool<MemoryStorage>>,
}

impl TestNet {
    /// `count` validators of weight 1 and the given certificate threshold
    pub fn new(count: usize, threshold: u64) -> Self {
        Self::with_pool_config(count, threshold, CommitPoolConfig::default())
    }

    pub fn with_pool_config(count: usize, threshold: u64, pool_config: CommitPoolConfig) -> Self {
        let validators = (0..count).map(|_| TestValidator::generate(1)).collect();
        Self::build(validators, threshold, pool_config)
    }

    /// The first `local` validators are run by this node
    pub fn with_local_validators(count: usize, threshold: u64, local: usize) -> Self {
        let validators: Vec<TestValidator> =
            (0..count).map(|_| TestValidator::generate(1)).collect();
        let pool_config = CommitPoolConfig {
            local_validators: validators[..local].iter().map(|v| v.info.address).collect(),
            ..CommitPoolConfig::default()
        };
        Self::build(validators, threshold, pool_config)
    }

    fn build(validators: Vec<TestValidator>, threshold: u64, pool_config: CommitPoolConfig) -> Self {
        let bft_validators: Vec<BftValidator> =
            validators.iter().map(|v| v.bft.clone()).collect();

        let genesis = GenesisConfig {
            chain_id: CHAIN_ID,
            timestamp: now_secs() - 100_000,
            validators: bft_validators.clone(),
            certificate_threshold: threshold,
        }
        .create_genesis_block()
        .unwrap();
        let mut store = ChainStore::new(MemoryStorage::new());
        store.init_genesis(genesis).unwrap();

        let bft = Arc::new(StaticBft::new(bft_validators, threshold));
        let chain = Arc::new(RwLock::new(store));
        let network = Arc::new(RecordingNetwork::default());
        let pool = Arc::new(CommitPool::new(
            CommitPoolConfig {
                chain_id: CHAIN_ID,
                block_time: BLOCK_TIME,
                ..pool_config
            },
            bft.clone(),
            chain.clone(),
            network.clone(),
        ));

        TestNet {
            validators,
            threshold,
            bft,
            chain,
            network,
            pool,
        }
    }

    pub async fn tip(&self) -> Block {
        self.chain.read().await.last_block().unwrap().clone()
    }

    pub async fn header_at(&self, height: u64) -> BlockHeader {
        self.chain
            .read()
            .await
            .header_by_height(height)
            .unwrap()
            .unwrap()
    }

    pub async fn set_heights(&self, prevoted: u64, precommitted: u64, certified: u64) {
        self.bft
            .set_heights(BftHeights {
                max_height_prevoted: prevoted,
                max_height_precommitted: precommitted,
                max_height_certified: certified,
            })
            .await;
    }

    /// Signed child of `parent`, generated by validator `generator`
    pub async fn next_block(&self, parent: &Block, generator: usize) -> Block {
        let heights = self.bft.get_bft_heights().await.unwrap();
        self.build_block(
            parent,
            generator,
            parent.header.timestamp + BLOCK_TIME,
            heights.max_height_prevoted,
            AggregateCommit::empty(heights.max_height_certified),
        )
    }

    pub fn build_block(
        &self,
        parent: &Block,
        generator: usize,
        timestamp: u64,
        max_height_prevoted: u64,
        aggregate_commit: AggregateCommit,
    ) -> Block {
        let mut header = BlockHeader {
            version: BLOCK_VERSION,
            height: parent.height() + 1,
            timestamp,
            previous_block_id: parent.id(),
            generator_address: self.validators[generator].generator.address(),
            generator_public_key: self.validators[generator].generator.public,
            reward: 0,
            transaction_root: merkle_root(&[]),
            state_root: Hash::ZERO,
            validators_hash: parent.header.validators_hash,
            max_height_prevoted,
            max_height_generated: 0,
            aggregate_commit,
            signature: Sig::default(),
            id: Hash::ZERO,
        };
        header
            .sign(&self.validators[generator].generator.secret)
            .unwrap();
        Block::new(header, vec![])
    }

    /// Append `count` blocks directly to the chain store
    pub async fn append_blocks(&self, count: usize) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            blocks.push(self.append_block(AggregateCommit::empty(0), 0).await);
        }
        blocks
    }

    /// Append one block carrying `aggregate_commit`, recording `finalized`
    pub async fn append_block(&self, aggregate_commit: AggregateCommit, finalized: u64) -> Block {
        let parent = self.tip().await;
        let generator = (parent.height() as usize) % self.validators.len();
        let block = self.build_block(
            &parent,
            generator,
            parent.header.timestamp + BLOCK_TIME,
            0,
            aggregate_commit,
        );
        self.chain
            .write()
            .await
            .save_block(block.clone(), StateDiff::default(), finalized, false)
            .unwrap();
        block
    }

    pub async fn commit_at(&self, height: u64, validator: usize) -> SingleCommit {
        let header = self.header_at(height).await;
        create_single_commit(&header, &self.validators[validator].info, CHAIN_ID).unwrap()
    }

    pub fn consensus(
        &self,
        state_machine: Arc<dyn StateMachine>,
        synchronizer: Arc<dyn Synchronizer>,
    ) -> Consensus<MemoryStorage> {
        Consensus::new(
            ConsensusConfig {
                chain_id: CHAIN_ID,
                block_time: BLOCK_TIME,
                ..ConsensusConfig::default()
            },
            self.chain.clone(),
            self.bft.clone(),
            self.network.clone(),
            self.pool.clone(),
            state_machine,
            synchronizer,
        )
    }
}

/// Records everything sent through it
#[derive(Default)]
pub struct RecordingNetwork {
    pub sent: Mutex<Vec<(String, Vec<u8>)>>,
    pub penalties: Mutex<Vec<(String, u32)>>,
    pub endpoints: Mutex<HashMap<String, Arc<dyn EndpointHandler>>>,
    pub peers: Mutex<Vec<String>>,
    pub responses: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingNetwork {
    pub fn sent_events(&self, event: &str) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn penalties(&self) -> Vec<(String, u32)> {
        self.penalties.lock().unwrap().clone()
    }

    pub fn endpoint(&self, name: &str) -> Option<Arc<dyn EndpointHandler>> {
        self.endpoints.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl Network for RecordingNetwork {
    async fn send(&self, event: &str, data: Vec<u8>) -> Result<(), ConsensusError> {
        self.sent.lock().unwrap().push((event.to_string(), data));
        Ok(())
    }

    async fn request_from_peer(
        &self,
        peer_id: &str,
        procedure: &str,
        _data: Vec<u8>,
    ) -> Result<Vec<u8>, ConsensusError> {
        self.responses
            .lock()
            .unwrap()
            .get(peer_id)
            .cloned()
            .ok_or_else(|| ConsensusError::Network(format!("{peer_id} cannot serve {procedure}")))
    }

    async fn apply_penalty_on_peer(&self, peer_id: &str, penalty: u32) {
        self.penalties
            .lock()
            .unwrap()
            .push((peer_id.to_string(), penalty));
    }

    async fn get_connected_peers(&self) -> Vec<String> {
        self.peers.lock().unwrap().clone()
    }

    fn register_endpoint(&self, name: &str, handler: Arc<dyn EndpointHandler>) {
        self.endpoints
            .lock()
            .unwrap()
            .insert(name.to_string(), handler);
    }
}

/// Writes the block height under `height` and nothing else
pub struct NoopStateMachine;

#[async_trait]
impl StateMachine for NoopStateMachine {
    async fn execute(&self, block: &Block, state: &mut StateStore<'_>) -> Result<(), ConsensusError> {
        state.set_value(b"height", &block.height())?;
        Ok(())
    }
}

/// Fails on the listed block ids
pub struct FailingStateMachine {
    pub fail_on: Vec<Hash>,
}

#[async_trait]
impl StateMachine for FailingStateMachine {
    async fn execute(&self, block: &Block, state: &mut StateStore<'_>) -> Result<(), ConsensusError> {
        if self.fail_on.contains(&block.id()) {
            return Err(ConsensusError::StateMachine("execution failed".to_string()));
        }
        state.set_value(b"height", &block.height())?;
        Ok(())
    }
}

/// Replays scripted outcomes, then succeeds
#[derive(Default)]
pub struct ScriptedSynchronizer {
    pub outcomes: Mutex<VecDeque<SyncError>>,
    pub runs: Mutex<Vec<(u64, String)>>,
}

impl ScriptedSynchronizer {
    pub fn new(outcomes: Vec<SyncError>) -> Self {
        ScriptedSynchronizer {
            outcomes: Mutex::new(outcomes.into()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl Synchronizer for ScriptedSynchronizer {
    async fn run(&self, block: &Block, peer_id: &str) -> Result<(), SyncError> {
        self.runs
            .lock()
            .unwrap()
            .push((block.height(), peer_id.to_string()));
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => Err(outcome),
            None => Ok(()),
        }
    }
}

/// Always answers with the same status
pub struct ScriptedForkChoice(pub ForkStatus);

impl ForkChoice for ScriptedForkChoice {
    fn fork_status(&self, _: &BlockHeader, _: &BlockHeader, _: ReceiveTimes) -> ForkStatus {
        self.0
    }
}

/// Keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ConsensusEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ConsensusEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsensusEventSink for RecordingSink {
    async fn on_event(&self, event: &ConsensusEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
