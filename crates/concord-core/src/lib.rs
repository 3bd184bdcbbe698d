//! Concord Core - Core types, cryptography, and serialization
//!
//! This crate provides the block, commit and certificate types shared by the
//! consensus core, together with hashing, ed25519 generator keys and BLS
//! certificate signatures.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod types;

pub use crypto::{
    hash_blake3, merkle_root, sign, verify, Address, BlsKeyPair, BlsPublicKey, BlsSecretKey,
    BlsSignature, Hash, KeyPair, PublicKey, SecretKey, Sig,
};
pub use error::CoreError;
pub use types::*;
