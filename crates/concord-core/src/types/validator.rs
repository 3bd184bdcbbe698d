use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, Address, BlsKeyPair, BlsPublicKey, BlsSecretKey, Hash, PublicKey};
use crate::error::CoreError;
use crate::serialize;

/// An active validator as known to the BFT parameters at some height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BftValidator {
    pub address: Address,
    pub bft_weight: u64,
    pub bls_key: BlsPublicKey,
    pub generator_key: PublicKey,
}

/// Key material of a validator run by this node
#[derive(Debug, Clone)]
pub struct ValidatorInfo {
    pub address: Address,
    pub bls_public_key: BlsPublicKey,
    pub bls_secret_key: BlsSecretKey,
}

impl ValidatorInfo {
    pub fn new(address: Address, bls_secret_key: BlsSecretKey) -> Result<Self, CoreError> {
        let bls_public_key = bls_secret_key.public_key()?;
        Ok(ValidatorInfo {
            address,
            bls_public_key,
            bls_secret_key,
        })
    }

    pub fn from_keypair(address: Address, keypair: BlsKeyPair) -> Self {
        ValidatorInfo {
            address,
            bls_public_key: keypair.public,
            bls_secret_key: keypair.secret,
        }
    }
}

/// Commitment to a validator set: BLS keys in ascending order with their
/// weights, followed by the certificate threshold.
pub fn compute_validators_hash(
    validators: &[BftValidator],
    certificate_threshold: u64,
) -> Result<Hash, CoreError> {
    let mut entries: Vec<(BlsPublicKey, u64)> = validators
        .iter()
        .map(|v| (v.bls_key, v.bft_weight))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let bytes = serialize::to_bytes(&(entries, certificate_threshold))?;
    Ok(hash_blake3(&bytes))
}
