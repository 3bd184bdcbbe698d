use std::collections::BTreeMap;

use async_trait::async_trait;
use concord_core::{Address, BftValidator, BlsPublicKey, PublicKey};
use tokio::sync::RwLock;

use crate::error::BftError;

/// Finalization heights tracked by the BFT protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BftHeights {
    pub max_height_prevoted: u64,
    pub max_height_precommitted: u64,
    pub max_height_certified: u64,
}

/// Validator set and threshold in force from some height on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BftParameters {
    pub validators: Vec<BftValidator>,
    pub certificate_threshold: u64,
}

impl BftParameters {
    pub fn validator(&self, address: &Address) -> Option<&BftValidator> {
        self.validators.iter().find(|v| &v.address == address)
    }

    pub fn is_active(&self, address: &Address) -> bool {
        self.validator(address).is_some()
    }
}

/// Keys registered for a validator account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorAccount {
    pub bls_key: BlsPublicKey,
    pub generator_key: PublicKey,
}

/// Read access to BFT heights, parameters and validator accounts
#[async_trait]
pub trait BftMethod: Send + Sync {
    async fn get_bft_heights(&self) -> Result<BftHeights, BftError>;

    /// Parameters in force at `height`
    async fn get_bft_parameters(&self, height: u64) -> Result<BftParameters, BftError>;

    /// Whether a parameter change takes effect exactly at `height`
    async fn exist_bft_parameters(&self, height: u64) -> Result<bool, BftError>;

    /// Lowest height `>= height` at which parameters change
    async fn get_next_height_bft_parameters(&self, height: u64) -> Result<u64, BftError>;

    async fn get_validator_account(&self, address: &Address) -> Result<ValidatorAccount, BftError>;
}

/// BFT provider backed by a fixed schedule of validator sets.
///
/// Heights are set from the outside, which makes it suitable for devnets
/// where no BFT voting module is running. Keys live in the schedule, so a
/// key registered at a later height never changes an earlier validator set.
#[derive(Default)]
pub struct StaticBft {
    parameters: RwLock<BTreeMap<u64, BftParameters>>,
    heights: RwLock<BftHeights>,
}

impl StaticBft {
    pub fn new(validators: Vec<BftValidator>, certificate_threshold: u64) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            0,
            BftParameters {
                validators,
                certificate_threshold,
            },
        );

        StaticBft {
            parameters: RwLock::new(parameters),
            heights: RwLock::new(BftHeights::default()),
        }
    }

    /// Schedule a validator set change taking effect at `height`
    pub async fn set_parameters(&self, height: u64, parameters: BftParameters) {
        self.parameters.write().await.insert(height, parameters);
    }

    pub async fn set_heights(&self, heights: BftHeights) {
        *self.heights.write().await = heights;
    }
}

fn account_of(validator: &BftValidator) -> ValidatorAccount {
    ValidatorAccount {
        bls_key: validator.bls_key,
        generator_key: validator.generator_key,
    }
}

#[async_trait]
impl BftMethod for StaticBft {
    async fn get_bft_heights(&self) -> Result<BftHeights, BftError> {
        Ok(*self.heights.read().await)
    }

    async fn get_bft_parameters(&self, height: u64) -> Result<BftParameters, BftError> {
        self.parameters
            .read()
            .await
            .range(..=height)
            .next_back()
            .map(|(_, params)| params.clone())
            .ok_or(BftError::ParametersNotFound(height))
    }

    async fn exist_bft_parameters(&self, height: u64) -> Result<bool, BftError> {
        Ok(self.parameters.read().await.contains_key(&height))
    }

    async fn get_next_height_bft_parameters(&self, height: u64) -> Result<u64, BftError> {
        self.parameters
            .read()
            .await
            .range(height..)
            .next()
            .map(|(h, _)| *h)
            .ok_or(BftError::ParametersNotFound(height))
    }

    /// Keys from the latest schedule entry naming `address`
    async fn get_validator_account(&self, address: &Address) -> Result<ValidatorAccount, BftError> {
        self.parameters
            .read()
            .await
            .values()
            .rev()
            .find_map(|params| params.validator(address).map(account_of))
            .ok_or_else(|| BftError::AccountNotFound(address.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{BlsKeyPair, KeyPair};

    fn validator() -> BftValidator {
        let generator = KeyPair::generate();
        BftValidator {
            address: generator.address(),
            bft_weight: 1,
            bls_key: BlsKeyPair::generate().public,
            generator_key: generator.public,
        }
    }

    #[tokio::test]
    async fn test_parameters_lookup_by_height() {
        let first = validator();
        let second = validator();
        let bft = StaticBft::new(vec![first.clone()], 1);
        bft.set_parameters(
            50,
            BftParameters {
                validators: vec![first.clone(), second.clone()],
                certificate_threshold: 2,
            },
        )
        .await;

        assert_eq!(bft.get_bft_parameters(49).await.unwrap().certificate_threshold, 1);
        assert_eq!(bft.get_bft_parameters(50).await.unwrap().validators.len(), 2);
        assert!(bft.exist_bft_parameters(50).await.unwrap());
        assert!(!bft.exist_bft_parameters(51).await.unwrap());
        assert_eq!(bft.get_next_height_bft_parameters(1).await.unwrap(), 50);
        assert!(matches!(
            bft.get_next_height_bft_parameters(51).await,
            Err(BftError::ParametersNotFound(51))
        ));
        assert_eq!(
            bft.get_validator_account(&second.address).await.unwrap().bls_key,
            second.bls_key
        );
    }

    #[tokio::test]
    async fn test_key_rotation_keeps_earlier_parameters() {
        let original = validator();
        let bft = StaticBft::new(vec![original.clone()], 1);
        let rotated = BftValidator {
            bls_key: BlsKeyPair::generate().public,
            ..original.clone()
        };
        bft.set_parameters(
            10,
            BftParameters {
                validators: vec![rotated.clone()],
                certificate_threshold: 1,
            },
        )
        .await;

        assert_eq!(
            bft.get_bft_parameters(9).await.unwrap().validators[0].bls_key,
            original.bls_key
        );
        assert_eq!(
            bft.get_bft_parameters(10).await.unwrap().validators[0].bls_key,
            rotated.bls_key
        );
        assert_eq!(
            bft.get_validator_account(&original.address).await.unwrap().bls_key,
            rotated.bls_key
        );
        assert!(matches!(
            bft.get_validator_account(&validator().address).await,
            Err(BftError::AccountNotFound(_))
        ));
    }
}
