use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The origin peer of the offending input must be penalized
    #[error("Apply penalty: {0}")]
    ApplyPenalty(String),

    #[error("Commit validator {address} was not active at height {height}")]
    InactiveValidator { address: String, height: u64 },

    #[error("Invalid certificate signature from {address} at height {height}")]
    InvalidCommitSignature { address: String, height: u64 },

    #[error("No single commits to aggregate")]
    EmptyCommits,

    #[error("No BLS key for validator {0}")]
    MissingBlsKey(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Block header not found at height {0}")]
    HeaderNotFound(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("State machine error: {0}")]
    StateMachine(String),

    #[error("BFT error: {0}")]
    Bft(#[from] BftError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("State error: {0}")]
    State(#[from] concord_state::StateError),

    #[error("Core error: {0}")]
    Core(#[from] concord_core::CoreError),
}

/// Failures of the BFT parameter provider
#[derive(Debug, Error)]
pub enum BftError {
    /// Expected when probing ahead of the next validator set change
    #[error("BFT parameters not found at height {0}")]
    ParametersNotFound(u64),

    #[error("Validator account not found: {0}")]
    AccountNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Outcome of a failed synchronizer run, each driving a distinct retry policy
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Penalizing peer {peer_id} and restarting sync: {reason}")]
    ApplyPenaltyAndRestart { peer_id: String, reason: String },

    #[error("Restarting sync: {0}")]
    Restart(String),

    #[error("Sync aborted: {0}")]
    Abort(String),

    #[error("{0}")]
    Other(String),
}
