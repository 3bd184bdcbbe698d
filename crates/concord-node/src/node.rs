use std::sync::Arc;

use anyhow::Result;
use concord_consensus::{
    Certifier, CommitPool, CommitPoolConfig, Consensus, ConsensusConfig, StaticBft,
};
use concord_core::ValidatorInfo;
use concord_state::{ChainStore, FileStorage};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::NodeConfig;
use crate::devnet::{HeightStateMachine, LogNetwork, NoSync};

/// The Concord node
pub struct Node {
    config: NodeConfig,
    chain: Arc<RwLock<ChainStore<FileStorage>>>,
    local_validators: Vec<ValidatorInfo>,
}

impl Node {
    /// Create a new node from configuration
    pub fn new(config: NodeConfig) -> Result<Self> {
        let local_validators = config.local_validator_infos()?;

        let storage = FileStorage::new(config.data_dir.join("chain.bin"))?;
        let chain = Arc::new(RwLock::new(ChainStore::new(storage)));

        Ok(Node {
            config,
            chain,
            local_validators,
        })
    }

    /// Load the chain from storage, writing genesis if there is none
    pub async fn init_chain(&self) -> Result<()> {
        let mut chain = self.chain.write().await;
        if chain.load()? {
            return Ok(());
        }

        let genesis = self.config.to_genesis_config()?.create_genesis_block()?;
        info!("Initializing genesis block {}", genesis.id());
        chain.init_genesis(genesis)?;
        Ok(())
    }

    /// Wire pool and pipeline, then run until Ctrl-C
    pub async fn run(self) -> Result<()> {
        info!("Starting Concord node");
        self.init_chain().await?;

        let genesis = self.config.to_genesis_config()?;
        let bft = Arc::new(StaticBft::new(
            genesis.validators,
            genesis.certificate_threshold,
        ));
        let network = Arc::new(LogNetwork::default());

        let pool = Arc::new(CommitPool::new(
            CommitPoolConfig {
                chain_id: self.config.chain_id,
                block_time: self.config.block_time,
                commit_range_stored: self.config.commit_range_stored,
                local_validators: self.local_validators.iter().map(|v| v.address).collect(),
            },
            bft.clone(),
            self.chain.clone(),
            network.clone(),
        ));

        let mut consensus = Consensus::new(
            ConsensusConfig {
                chain_id: self.config.chain_id,
                block_time: self.config.block_time,
                penalty: self.config.penalty,
                ..ConsensusConfig::default()
            },
            self.chain.clone(),
            bft.clone(),
            network.clone(),
            pool.clone(),
            Arc::new(HeightStateMachine),
            Arc::new(NoSync),
        );
        if !self.local_validators.is_empty() {
            info!("Certifying for {} local validators", self.local_validators.len());
            consensus.add_event_sink(Arc::new(Certifier::new(
                self.config.chain_id,
                self.local_validators.clone(),
                bft,
                self.chain.clone(),
                pool.clone(),
            )));
        }
        let consensus = Arc::new(consensus);
        consensus.register_endpoints();
        info!("Registered endpoints: {:?}", network.endpoint_names());

        pool.start().await;
        {
            let chain = self.chain.read().await;
            let tip = chain.last_block()?;
            info!(
                "Chain tip {} at height {}, finalized height {}",
                tip.id(),
                tip.height(),
                chain.finalized_height()
            );
        }

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        pool.stop().await;
        consensus.stop().await;

        Ok(())
    }
}
