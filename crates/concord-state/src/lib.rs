//! Concord State - Chain storage
//!
//! This crate provides the key-value storage abstraction, the state store
//! overlay that records revertible per-block diffs, and the chain store that
//! owns the canonical tip and finalized height.

pub mod chain;
pub mod error;
pub mod state_store;
pub mod storage;

pub use chain::ChainStore;
pub use error::StateError;
pub use state_store::{DiffEntry, StateDiff, StateStore};
pub use storage::{FileStorage, MemoryStorage, Storage};
