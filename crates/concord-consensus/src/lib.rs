//! Concord Consensus - Block consensus pipeline and commit pool
//!
//! This crate classifies incoming blocks by fork choice and applies them
//! under a single execution lock, and collects validator single commits
//! into BFT aggregate commits. Storage, execution, networking, BFT voting
//! and synchronization are reached through the ports in `bft`, `network`,
//! `state_machine` and `sync`.

pub mod bft;
pub mod certifier;
pub mod commit_pool;
pub mod consensus;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod fork_choice;
pub mod network;
pub mod state_machine;
pub mod sync;

pub use bft::{BftHeights, BftMethod, BftParameters, StaticBft, ValidatorAccount};
pub use certifier::Certifier;
pub use commit_pool::{
    create_single_commit, CommitCounts, CommitPool, CommitPoolConfig, COMMIT_RANGE_STORED,
};
pub use consensus::{Consensus, ConsensusConfig};
pub use endpoint::CommitEndpoint;
pub use error::{BftError, ConsensusError, SyncError};
pub use events::{ConsensusEvent, ConsensusEventSink};
pub use fork_choice::{ForkChoice, ForkStatus, ReceiveTimes, SlotForkChoice};
pub use network::{
    EndpointHandler, Network, PostBlockEvent, SingleCommitsPacket, DEFAULT_PENALTY,
    NETWORK_EVENT_POST_BLOCK, NETWORK_EVENT_POST_SINGLE_COMMITS, NETWORK_RPC_GET_LAST_BLOCK,
};
pub use state_machine::StateMachine;
pub use sync::Synchronizer;
