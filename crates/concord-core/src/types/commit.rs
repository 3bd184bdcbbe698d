use serde::{Deserialize, Serialize};

use crate::crypto::{Address, BlsSignature, Hash};

/// One validator's signature over the certificate of the block at `height`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleCommit {
    pub block_id: Hash,
    pub height: u64,
    pub validator_address: Address,
    pub certificate_signature: BlsSignature,
}

/// Threshold aggregation of single commits for one height.
///
/// Both byte fields are empty for the "no new finalization" shape, which
/// repeats the last certified height.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateCommit {
    pub height: u64,
    pub aggregation_bits: Vec<u8>,
    pub certificate_signature: Vec<u8>,
}

impl AggregateCommit {
    /// The no-op aggregate for an already certified height
    pub fn empty(height: u64) -> Self {
        AggregateCommit {
            height,
            aggregation_bits: Vec::new(),
            certificate_signature: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aggregation_bits.is_empty() && self.certificate_signature.is_empty()
    }

    /// Exactly one of the two proof fields is present
    pub fn is_malformed(&self) -> bool {
        self.aggregation_bits.is_empty() != self.certificate_signature.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_shapes() {
        let empty = AggregateCommit::empty(12);
        assert!(empty.is_empty());
        assert!(!empty.is_malformed());

        let half = AggregateCommit {
            height: 12,
            aggregation_bits: vec![1],
            certificate_signature: Vec::new(),
        };
        assert!(!half.is_empty());
        assert!(half.is_malformed());

        let full = AggregateCommit {
            height: 12,
            aggregation_bits: vec![1],
            certificate_signature: vec![0u8; 96],
        };
        assert!(!full.is_empty());
        assert!(!full.is_malformed());
    }
}
