use serde::{Deserialize, Serialize};

use crate::crypto::bls::{self, BlsPublicKey, BlsSecretKey, BlsSignature};
use crate::crypto::Hash;
use crate::error::CoreError;
use crate::serialize;
use crate::types::block::BlockHeader;

/// Domain tag prefixed to every certificate signing message
pub const MESSAGE_TAG_CERTIFICATE: &[u8] = b"CNC_CE_";

/// The signed payload of a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedCertificate {
    pub block_id: Hash,
    pub height: u64,
    pub timestamp: u64,
    pub state_root: Hash,
    pub validators_hash: Hash,
}

/// Minimal summary of a block used for finality proofs.
/// Derived from a header on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub block_id: Hash,
    pub height: u64,
    pub timestamp: u64,
    pub state_root: Hash,
    pub validators_hash: Hash,
    pub aggregation_bits: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

impl Certificate {
    pub fn from_header(header: &BlockHeader) -> Self {
        Certificate {
            block_id: header.id,
            height: header.height,
            timestamp: header.timestamp,
            state_root: header.state_root,
            validators_hash: header.validators_hash,
            aggregation_bits: None,
            signature: None,
        }
    }

    /// Attach aggregate proof fields
    pub fn with_proof(mut self, aggregation_bits: Vec<u8>, signature: Vec<u8>) -> Self {
        self.aggregation_bits = Some(aggregation_bits);
        self.signature = Some(signature);
        self
    }

    pub fn unsigned(&self) -> UnsignedCertificate {
        UnsignedCertificate {
            block_id: self.block_id,
            height: self.height,
            timestamp: self.timestamp,
            state_root: self.state_root,
            validators_hash: self.validators_hash,
        }
    }

    /// Encoding of the unsigned fields; proof fields never enter it
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serialize::to_bytes(&self.unsigned())
    }

    pub fn sign(&self, secret_key: &BlsSecretKey, chain_id: u64) -> Result<BlsSignature, CoreError> {
        bls::sign_tagged(
            MESSAGE_TAG_CERTIFICATE,
            chain_id,
            &self.signing_bytes()?,
            secret_key,
        )
    }

    pub fn verify_single(
        &self,
        public_key: &BlsPublicKey,
        signature: &BlsSignature,
        chain_id: u64,
    ) -> bool {
        let Ok(message) = self.signing_bytes() else {
            return false;
        };
        bls::verify_tagged(MESSAGE_TAG_CERTIFICATE, chain_id, &message, signature, public_key)
    }

    /// Verify the attached aggregate proof against `(key, weight)` pairs in
    /// any order; keys are put in canonical ascending order first.
    pub fn verify_aggregate(
        &self,
        keys_and_weights: &[(BlsPublicKey, u64)],
        threshold: u64,
        chain_id: u64,
    ) -> bool {
        let (Some(bits), Some(signature)) = (&self.aggregation_bits, &self.signature) else {
            return false;
        };
        let Ok(message) = self.signing_bytes() else {
            return false;
        };

        let mut sorted = keys_and_weights.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let keys: Vec<BlsPublicKey> = sorted.iter().map(|(k, _)| *k).collect();
        let weights: Vec<u64> = sorted.iter().map(|(_, w)| *w).collect();

        bls::verify_weighted_aggregate(
            &keys,
            bits,
            signature,
            MESSAGE_TAG_CERTIFICATE,
            chain_id,
            &weights,
            threshold,
            &message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::BlsKeyPair;
    use crate::types::block::GenesisConfig;

    fn header() -> BlockHeader {
        GenesisConfig {
            chain_id: 1,
            timestamp: 77,
            validators: vec![],
            certificate_threshold: 0,
        }
        .create_genesis_block()
        .unwrap()
        .header
    }

    #[test]
    fn test_certificate_fields_follow_header() {
        let header = header();
        let cert = Certificate::from_header(&header);
        assert_eq!(cert.block_id, header.id);
        assert_eq!(cert.timestamp, 77);
        assert!(cert.aggregation_bits.is_none());
    }

    #[test]
    fn test_proof_fields_excluded_from_signing_bytes() {
        let cert = Certificate::from_header(&header());
        let with_proof = cert.clone().with_proof(vec![1], vec![2; 96]);
        assert_eq!(
            cert.signing_bytes().unwrap(),
            with_proof.signing_bytes().unwrap()
        );
    }

    #[test]
    fn test_single_signature_bound_to_chain() {
        let kp = BlsKeyPair::generate();
        let cert = Certificate::from_header(&header());
        let sig = cert.sign(&kp.secret, 5).unwrap();

        assert!(cert.verify_single(&kp.public, &sig, 5));
        assert!(!cert.verify_single(&kp.public, &sig, 6));
    }

    #[test]
    fn test_verify_aggregate_requires_proof() {
        let kp = BlsKeyPair::generate();
        let cert = Certificate::from_header(&header());
        assert!(!cert.verify_aggregate(&[(kp.public, 1)], 1, 1));
    }
}
