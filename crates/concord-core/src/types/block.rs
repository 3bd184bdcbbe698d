use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, merkle_root, sign, verify, Address, Hash, PublicKey, SecretKey, Sig};
use crate::error::CoreError;
use crate::serialize;
use crate::types::commit::AggregateCommit;
use crate::types::transaction::Transaction;
use crate::types::validator::{compute_validators_hash, BftValidator};

/// Block format version accepted by the consensus pipeline
pub const BLOCK_VERSION: u32 = 2;

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Block height (0 for genesis)
    pub height: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Id of the previous block (zeros for genesis)
    pub previous_block_id: Hash,
    pub generator_address: Address,
    pub generator_public_key: PublicKey,
    pub reward: u64,
    /// Merkle root of transaction ids
    pub transaction_root: Hash,
    /// State root after applying transactions
    pub state_root: Hash,
    /// Commitment to the validator set of the next height
    pub validators_hash: Hash,
    pub max_height_prevoted: u64,
    pub max_height_generated: u64,
    /// Finalization proof for a past height
    pub aggregate_commit: AggregateCommit,
    /// Generator signature over the signing bytes
    pub signature: Sig,
    /// Content hash, derived from the encoded header; never encoded itself
    #[serde(skip)]
    pub id: Hash,
}

impl BlockHeader {
    /// Bytes covered by the generator signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut unsigned = self.clone();
        unsigned.signature = Sig::default();
        serialize::to_bytes(&unsigned)
    }

    /// Recompute the id from the encoded header
    pub fn compute_id(&self) -> Result<Hash, CoreError> {
        Ok(hash_blake3(&serialize::to_bytes(self)?))
    }

    /// Sign as the generator and fix the id
    pub fn sign(&mut self, secret_key: &SecretKey) -> Result<(), CoreError> {
        self.generator_public_key = secret_key.public_key();
        self.generator_address = self.generator_public_key.address();
        self.signature = sign(secret_key, &self.signing_bytes()?);
        self.id = self.compute_id()?;
        Ok(())
    }

    pub fn verify_signature(&self, generator_key: &PublicKey) -> Result<(), CoreError> {
        verify(generator_key, &self.signing_bytes()?, &self.signature)
    }

    /// Static header checks that need no chain state
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id != self.compute_id()? {
            return Err(CoreError::InvalidBlock("header id mismatch".to_string()));
        }
        if self.height > 0 && self.previous_block_id.is_zero() {
            return Err(CoreError::InvalidBlock(
                "missing previous block id".to_string(),
            ));
        }
        if self.signature.is_empty() {
            return Err(CoreError::InvalidBlock("missing signature".to_string()));
        }
        if self.generator_public_key.address() != self.generator_address {
            return Err(CoreError::InvalidBlock(
                "generator address does not match public key".to_string(),
            ));
        }
        if self.aggregate_commit.is_malformed() {
            return Err(CoreError::InvalidBlock(
                "aggregate commit has only one proof field".to_string(),
            ));
        }
        Ok(())
    }
}

/// A complete block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
        }
    }

    pub fn id(&self) -> Hash {
        self.header.id
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serialize::to_bytes(self)
    }

    /// Decode a block and derive its header id
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut block: Block = serialize::from_bytes(bytes)?;
        block.header.id = block.header.compute_id()?;
        Ok(block)
    }

    pub fn compute_transaction_root(&self) -> Result<Hash, CoreError> {
        let ids = self
            .transactions
            .iter()
            .map(|tx| tx.id())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(merkle_root(&ids))
    }

    /// Header checks, transaction root, and every transaction envelope
    pub fn validate(&self) -> Result<(), CoreError> {
        self.header.validate()?;
        if self.compute_transaction_root()? != self.header.transaction_root {
            return Err(CoreError::InvalidBlock(
                "transaction root mismatch".to_string(),
            ));
        }
        for tx in &self.transactions {
            tx.validate()?;
        }
        Ok(())
    }
}

/// Genesis block configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: u64,
    pub timestamp: u64,
    pub validators: Vec<BftValidator>,
    pub certificate_threshold: u64,
}

impl GenesisConfig {
    /// Create the unsigned genesis block; its id is still derived from content
    pub fn create_genesis_block(&self) -> Result<Block, CoreError> {
        let mut header = BlockHeader {
            version: BLOCK_VERSION,
            height: 0,
            timestamp: self.timestamp,
            previous_block_id: Hash::ZERO,
            generator_address: Address::default(),
            generator_public_key: PublicKey::default(),
            reward: 0,
            transaction_root: merkle_root(&[]),
            state_root: Hash::ZERO,
            validators_hash: compute_validators_hash(&self.validators, self.certificate_threshold)?,
            max_height_prevoted: 0,
            max_height_generated: 0,
            aggregate_commit: AggregateCommit::empty(0),
            signature: Sig::default(),
            id: Hash::ZERO,
        };
        header.id = header.compute_id()?;
        Ok(Block::new(header, Vec::new()))
    }
}
