use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Chain store has no tip, genesis not initialized")]
    NotInitialized,

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Block is not the next block: expected height {expected}, got {got}")]
    NotNextBlock { expected: u64, got: u64 },

    #[error("Block {0} is not the current tip")]
    NotTip(String),

    #[error("Cannot delete block at height {height}, finalized height is {finalized}")]
    FinalizedBlock { height: u64, finalized: u64 },

    #[error("Missing state diff for height {0}")]
    MissingDiff(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Core error: {0}")]
    Core(#[from] concord_core::CoreError),
}
