use concord_core::{serialize, Block, BlockHeader, Hash};
use tracing::{debug, info};

use crate::error::StateError;
use crate::state_store::{apply_diff, revert_diff, StateDiff, StateStore};
use crate::storage::Storage;

/// Key prefixes for storage
mod keys {
    pub const BLOCK: &[u8] = b"blk:";
    pub const HEIGHT: &[u8] = b"hgt:";
    pub const DIFF: &[u8] = b"dif:";
    pub const TEMP: &[u8] = b"tmp:";
    pub const FINALIZED: &[u8] = b"chain:final";
    pub const TIP: &[u8] = b"chain:tip";

    pub fn block(id: &concord_core::Hash) -> Vec<u8> {
        [BLOCK, id.as_bytes()].concat()
    }

    pub fn height(height: u64) -> Vec<u8> {
        [HEIGHT, &height.to_be_bytes()].concat()
    }

    pub fn diff(height: u64) -> Vec<u8> {
        [DIFF, &height.to_be_bytes()].concat()
    }

    pub fn temp(height: u64, id: &concord_core::Hash) -> Vec<u8> {
        [TEMP, &height.to_be_bytes(), id.as_bytes()].concat()
    }
}

/// Canonical chain: blocks by id and height, the tip, the finalized height,
/// per-block state diffs, and the temporary table of blocks removed during
/// a reorganization.
pub struct ChainStore<S: Storage> {
    storage: S,
    last_block: Option<Block>,
    finalized_height: u64,
}

impl<S: Storage> ChainStore<S> {
    pub fn new(storage: S) -> Self {
        ChainStore {
            storage,
            last_block: None,
            finalized_height: 0,
        }
    }

    /// Store the genesis block as tip and finalized
    pub fn init_genesis(&mut self, genesis: Block) -> Result<(), StateError> {
        info!("Initializing chain with genesis block {}", genesis.id());
        self.write_block(&genesis, &StateDiff::default())?;
        self.storage.put(keys::FINALIZED, &genesis.height().to_be_bytes());
        self.storage.commit()?;

        self.finalized_height = genesis.height();
        self.last_block = Some(genesis);
        Ok(())
    }

    /// Recover tip and finalized height from storage.
    /// Returns false when the storage holds no chain yet.
    pub fn load(&mut self) -> Result<bool, StateError> {
        let Some(tip_id) = self.storage.get(keys::TIP) else {
            return Ok(false);
        };
        let tip_id = Hash::from_slice(&tip_id)
            .ok_or_else(|| StateError::Storage("corrupt tip id".to_string()))?;
        let tip = self
            .block_by_id(&tip_id)?
            .ok_or_else(|| StateError::BlockNotFound(tip_id.to_hex()))?;

        self.finalized_height = self
            .storage
            .get(keys::FINALIZED)
            .and_then(|bytes| bytes.as_slice().try_into().ok())
            .map(u64::from_be_bytes)
            .unwrap_or(0);

        info!(
            "Loaded chain tip {} at height {}, finalized height {}",
            tip.id(),
            tip.height(),
            self.finalized_height
        );
        self.last_block = Some(tip);
        Ok(true)
    }

    pub fn last_block(&self) -> Result<&Block, StateError> {
        self.last_block.as_ref().ok_or(StateError::NotInitialized)
    }

    pub fn finalized_height(&self) -> u64 {
        self.finalized_height
    }

    pub fn block_by_id(&self, id: &Hash) -> Result<Option<Block>, StateError> {
        self.storage
            .get(&keys::block(id))
            .map(|bytes| Block::from_bytes(&bytes).map_err(StateError::from))
            .transpose()
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, StateError> {
        match self.storage.get(&keys::height(height)) {
            Some(id) => {
                let id = Hash::from_slice(&id)
                    .ok_or_else(|| StateError::Storage(format!("corrupt id at {height}")))?;
                self.block_by_id(&id)
            }
            None => Ok(None),
        }
    }

    pub fn header_by_height(&self, height: u64) -> Result<Option<BlockHeader>, StateError> {
        Ok(self.block_by_height(height)?.map(|b| b.header))
    }

    pub fn header_by_id(&self, id: &Hash) -> Result<Option<BlockHeader>, StateError> {
        Ok(self.block_by_id(id)?.map(|b| b.header))
    }

    /// Fresh overlay over the state as of the current tip
    pub fn state_store(&self) -> StateStore<'_> {
        StateStore::new(&self.storage)
    }

    fn write_block(&mut self, block: &Block, diff: &StateDiff) -> Result<(), StateError> {
        let id = block.id();
        self.storage.put(&keys::block(&id), &block.to_bytes()?);
        self.storage.put(&keys::height(block.height()), id.as_bytes());
        self.storage
            .put(&keys::diff(block.height()), &serialize::to_bytes(diff)?);
        self.storage.put(keys::TIP, id.as_bytes());
        Ok(())
    }

    /// Persist `block` on top of the tip together with its state diff.
    /// The finalized height never moves backwards.
    pub fn save_block(
        &mut self,
        block: Block,
        diff: StateDiff,
        finalized_height: u64,
        remove_from_temp: bool,
    ) -> Result<(), StateError> {
        let tip = self.last_block()?;
        if block.height() != tip.height() + 1 || block.header.previous_block_id != tip.id() {
            return Err(StateError::NotNextBlock {
                expected: tip.height() + 1,
                got: block.height(),
            });
        }

        let finalized_height = finalized_height.max(self.finalized_height);
        let written = self.write_block(&block, &diff).map(|_| {
            apply_diff(&mut self.storage, &diff);
            self.storage
                .put(keys::FINALIZED, &finalized_height.to_be_bytes());
            if remove_from_temp {
                self.storage.delete(&keys::temp(block.height(), &block.id()));
            }
        });
        if let Err(e) = written.and_then(|_| self.storage.commit()) {
            self.storage.rollback();
            return Err(e);
        }

        debug!(
            "Saved block {} at height {} ({} state changes)",
            block.id(),
            block.height(),
            diff.entries.len()
        );
        self.finalized_height = finalized_height;
        self.last_block = Some(block);
        Ok(())
    }

    /// Remove the tip, reverting its state diff. Finalized blocks are
    /// immutable. With `save_temp` the block is kept in the temporary table
    /// so it can be re-applied later.
    pub fn remove_block(&mut self, block: &Block, save_temp: bool) -> Result<(), StateError> {
        let tip = self.last_block()?;
        if tip.id() != block.id() {
            return Err(StateError::NotTip(block.id().to_hex()));
        }
        if block.height() <= self.finalized_height {
            return Err(StateError::FinalizedBlock {
                height: block.height(),
                finalized: self.finalized_height,
            });
        }

        let previous = self
            .block_by_id(&block.header.previous_block_id)?
            .ok_or_else(|| StateError::BlockNotFound(block.header.previous_block_id.to_hex()))?;
        let diff: StateDiff = match self.storage.get(&keys::diff(block.height())) {
            Some(bytes) => serialize::from_bytes(&bytes)?,
            None => return Err(StateError::MissingDiff(block.height())),
        };

        revert_diff(&mut self.storage, &diff);
        self.storage.delete(&keys::block(&block.id()));
        self.storage.delete(&keys::height(block.height()));
        self.storage.delete(&keys::diff(block.height()));
        self.storage.put(keys::TIP, previous.id().as_bytes());
        if save_temp {
            let bytes = match block.to_bytes() {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.storage.rollback();
                    return Err(e.into());
                }
            };
            self.storage
                .put(&keys::temp(block.height(), &block.id()), &bytes);
        }
        if let Err(e) = self.storage.commit() {
            self.storage.rollback();
            return Err(e);
        }

        debug!("Removed block {} at height {}", block.id(), block.height());
        self.last_block = Some(previous);
        Ok(())
    }

    /// Blocks kept aside by `remove_block(.., true)`, ascending by height
    pub fn temp_blocks(&self) -> Result<Vec<Block>, StateError> {
        self.storage
            .keys_with_prefix(keys::TEMP)
            .iter()
            .filter_map(|key| self.storage.get(key))
            .map(|bytes| Block::from_bytes(&bytes).map_err(StateError::from))
            .collect()
    }

    /// Drop every block kept aside by `remove_block`
    pub fn clear_temp_blocks(&mut self) -> Result<(), StateError> {
        for key in self.storage.keys_with_prefix(keys::TEMP) {
            self.storage.delete(&key);
        }
        self.storage.commit()
    }
}
