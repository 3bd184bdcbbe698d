//! BLS12-381 certificate signatures
//!
//! Single commits are plain BLS signatures over a tagged certificate
//! message; aggregate commits carry one aggregate signature plus a bitmap
//! naming the contributing keys in ascending byte order.
//!
//! Uses blst's `min_pk` variant: 48-byte public keys, 96-byte signatures.

use blst::min_pk::{AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;

use crate::error::CoreError;

/// Ciphersuite domain separation tag (proof-of-possession scheme)
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Compressed BLS public key (48 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlsPublicKey(#[serde(with = "BigArray")] pub [u8; 48]);

impl BlsPublicKey {
    pub fn as_bytes(&self) -> &[u8; 48] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 48] = slice.try_into().ok()?;
        Some(BlsPublicKey(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(CoreError::InvalidBlsPublicKey)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_point(self) -> Result<PublicKey, CoreError> {
        PublicKey::key_validate(&self.0).map_err(|_| CoreError::InvalidBlsPublicKey)
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey({})", self.to_hex())
    }
}

/// Compressed BLS signature (96 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsSignature(#[serde(with = "BigArray")] pub [u8; 96]);

impl BlsSignature {
    pub fn as_bytes(&self) -> &[u8; 96] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; 96] = slice.try_into().ok()?;
        Some(BlsSignature(bytes))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_point(self) -> Result<Signature, CoreError> {
        Signature::from_bytes(&self.0).map_err(|_| CoreError::InvalidBlsSignature)
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature({}...)", &self.to_hex()[..16])
    }
}

/// BLS secret key.
/// Not serializable to prevent accidental exposure
#[derive(Clone)]
pub struct BlsSecretKey([u8; 32]);

impl BlsSecretKey {
    pub fn generate() -> Self {
        let mut ikm = [0u8; 32];
        loop {
            rand::thread_rng().fill_bytes(&mut ikm);
            if let Ok(sk) = SecretKey::key_gen(&ikm, &[]) {
                return BlsSecretKey(sk.to_bytes());
            }
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CoreError> {
        SecretKey::from_bytes(bytes).map_err(|_| CoreError::InvalidBlsSecretKey)?;
        Ok(BlsSecretKey(*bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidBlsSecretKey)?;
        Self::from_bytes(&arr)
    }

    /// Export as hex string (use with caution)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_scalar(&self) -> Result<SecretKey, CoreError> {
        SecretKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidBlsSecretKey)
    }

    pub fn public_key(&self) -> Result<BlsPublicKey, CoreError> {
        Ok(BlsPublicKey(self.to_scalar()?.sk_to_pk().to_bytes()))
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSecretKey([REDACTED])")
    }
}

/// BLS keypair held by a local validator
#[derive(Clone, Debug)]
pub struct BlsKeyPair {
    pub secret: BlsSecretKey,
    pub public: BlsPublicKey,
}

impl BlsKeyPair {
    pub fn generate() -> Self {
        let secret = BlsSecretKey::generate();
        // key_gen output is always a valid scalar
        let public = secret
            .public_key()
            .unwrap_or(BlsPublicKey([0u8; 48]));
        BlsKeyPair { secret, public }
    }

    pub fn from_secret(secret: BlsSecretKey) -> Result<Self, CoreError> {
        let public = secret.public_key()?;
        Ok(BlsKeyPair { secret, public })
    }
}

/// `tag || chain_id (big endian) || message`
pub fn tagged_message(tag: &[u8], chain_id: u64, message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tag.len() + 8 + message.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&chain_id.to_be_bytes());
    out.extend_from_slice(message);
    out
}

/// Sign `message` under a domain tag and chain id
pub fn sign_tagged(
    tag: &[u8],
    chain_id: u64,
    message: &[u8],
    secret_key: &BlsSecretKey,
) -> Result<BlsSignature, CoreError> {
    let sk = secret_key.to_scalar()?;
    let signature = sk.sign(&tagged_message(tag, chain_id, message), DST, &[]);
    Ok(BlsSignature(signature.to_bytes()))
}

/// Verify a single tagged signature
pub fn verify_tagged(
    tag: &[u8],
    chain_id: u64,
    message: &[u8],
    signature: &BlsSignature,
    public_key: &BlsPublicKey,
) -> bool {
    let (Ok(sig), Ok(pk)) = (signature.to_point(), public_key.to_point()) else {
        return false;
    };
    let msg = tagged_message(tag, chain_id, message);
    sig.verify(true, &msg, DST, &[], &pk, false) == BLST_ERROR::BLST_SUCCESS
}

/// Length in bytes of an aggregation bitmap over `key_count` keys
pub fn aggregation_bits_len(key_count: usize) -> usize {
    key_count.div_ceil(8)
}

fn bit_is_set(bits: &[u8], index: usize) -> bool {
    bits.get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

/// Aggregate `pairs` of (key, signature) into a bitmap over `keys_list` and
/// one aggregate signature. `keys_list` must already be in canonical order.
pub fn create_aggregate(
    keys_list: &[BlsPublicKey],
    pairs: &[(BlsPublicKey, BlsSignature)],
) -> Result<(Vec<u8>, BlsSignature), CoreError> {
    if pairs.is_empty() {
        return Err(CoreError::EmptyAggregation);
    }

    let mut bits = vec![0u8; aggregation_bits_len(keys_list.len())];
    let mut signatures = Vec::with_capacity(pairs.len());
    for (key, signature) in pairs {
        let index = keys_list
            .iter()
            .position(|k| k == key)
            .ok_or(CoreError::UnknownAggregationKey)?;
        bits[index / 8] |= 1 << (index % 8);
        signatures.push(signature.to_point()?);
    }

    let refs: Vec<&Signature> = signatures.iter().collect();
    let aggregate =
        AggregateSignature::aggregate(&refs, true).map_err(|_| CoreError::InvalidBlsSignature)?;

    Ok((bits, BlsSignature(aggregate.to_signature().to_bytes())))
}

/// Verify an aggregate signature whose participants, selected by `bits` out
/// of `keys_list`, must carry at least `threshold` combined weight.
#[allow(clippy::too_many_arguments)]
pub fn verify_weighted_aggregate(
    keys_list: &[BlsPublicKey],
    bits: &[u8],
    signature: &[u8],
    tag: &[u8],
    chain_id: u64,
    weights: &[u64],
    threshold: u64,
    message: &[u8],
) -> bool {
    if keys_list.len() != weights.len() || bits.len() != aggregation_bits_len(keys_list.len()) {
        return false;
    }
    // no bits may point past the end of the key list
    if (keys_list.len()..bits.len() * 8).any(|i| bit_is_set(bits, i)) {
        return false;
    }

    let mut participants = Vec::new();
    let mut weight: u64 = 0;
    for (index, key) in keys_list.iter().enumerate() {
        if bit_is_set(bits, index) {
            participants.push(*key);
            weight = weight.saturating_add(weights[index]);
        }
    }
    if participants.is_empty() || weight < threshold {
        return false;
    }

    let Some(signature) = BlsSignature::from_slice(signature) else {
        return false;
    };
    let Ok(sig) = signature.to_point() else {
        return false;
    };
    let Ok(points) = participants
        .iter()
        .map(|k| k.to_point())
        .collect::<Result<Vec<_>, _>>()
    else {
        return false;
    };
    let refs: Vec<&PublicKey> = points.iter().collect();
    let msg = tagged_message(tag, chain_id, message);
    sig.fast_aggregate_verify(true, &msg, DST, &refs) == BLST_ERROR::BLST_SUCCESS
}
