use std::path::PathBuf;

use anyhow::Result;
use concord_consensus::{COMMIT_RANGE_STORED, DEFAULT_PENALTY};
use concord_core::{
    BftValidator, BlsKeyPair, BlsPublicKey, BlsSecretKey, GenesisConfig, KeyPair, PublicKey,
    SecretKey, ValidatorInfo,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    InvalidKey { field: &'static str, reason: String },

    #[error("Certificate threshold {threshold} exceeds total bft weight {total}")]
    UnreachableThreshold { threshold: u64, total: u64 },

    #[error("Block time must be positive")]
    ZeroBlockTime,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Chain ID, also the network identifier for certificate signatures
    pub chain_id: u64,

    /// Node data directory
    pub data_dir: PathBuf,

    /// Block time in seconds
    pub block_time: u64,

    /// Heights below max height precommitted for which commits are kept
    pub commit_range_stored: u64,

    /// Penalty applied to misbehaving peers
    pub penalty: u32,

    /// Genesis configuration
    pub genesis: GenesisConfigFile,

    /// Validators run by this node
    pub local_validators: Vec<LocalValidatorConfig>,
}

/// Genesis configuration for file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenesisConfigFile {
    pub timestamp: u64,
    pub certificate_threshold: u64,
    pub validators: Vec<GenesisValidatorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisValidatorEntry {
    /// Ed25519 generator public key (hex); the address is derived from it
    pub generator_key: String,
    /// BLS public key (hex)
    pub bls_key: String,
    pub bft_weight: u64,
}

/// Secret keys of a validator run by this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalValidatorConfig {
    pub generator_secret: String,
    pub bls_secret: String,
}

impl LocalValidatorConfig {
    pub fn generate() -> Self {
        LocalValidatorConfig {
            generator_secret: KeyPair::generate().secret.to_hex(),
            bls_secret: BlsKeyPair::generate().secret.to_hex(),
        }
    }

    pub fn to_validator_info(&self) -> Result<ValidatorInfo, ConfigError> {
        let generator = SecretKey::from_hex(&self.generator_secret).map_err(|e| {
            ConfigError::InvalidKey {
                field: "generator_secret",
                reason: e.to_string(),
            }
        })?;
        let bls = BlsSecretKey::from_hex(&self.bls_secret).map_err(|e| ConfigError::InvalidKey {
            field: "bls_secret",
            reason: e.to_string(),
        })?;
        ValidatorInfo::new(generator.public_key().address(), bls).map_err(|e| {
            ConfigError::InvalidKey {
                field: "bls_secret",
                reason: e.to_string(),
            }
        })
    }

    /// Genesis entry announcing this validator with the given weight
    pub fn to_genesis_entry(&self, bft_weight: u64) -> Result<GenesisValidatorEntry, ConfigError> {
        let generator = SecretKey::from_hex(&self.generator_secret).map_err(|e| {
            ConfigError::InvalidKey {
                field: "generator_secret",
                reason: e.to_string(),
            }
        })?;
        let info = self.to_validator_info()?;
        Ok(GenesisValidatorEntry {
            generator_key: generator.public_key().to_hex(),
            bls_key: info.bls_public_key.to_hex(),
            bft_weight,
        })
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            chain_id: 1,
            data_dir: PathBuf::from("./concord-data"),
            block_time: 10,
            commit_range_stored: COMMIT_RANGE_STORED,
            penalty: DEFAULT_PENALTY,
            genesis: GenesisConfigFile::default(),
            local_validators: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load config from file
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_time == 0 {
            return Err(ConfigError::ZeroBlockTime);
        }
        let total: u64 = self.genesis.validators.iter().map(|v| v.bft_weight).sum();
        if self.genesis.certificate_threshold > total {
            return Err(ConfigError::UnreachableThreshold {
                threshold: self.genesis.certificate_threshold,
                total,
            });
        }
        Ok(())
    }

    /// Convert genesis config to core type
    pub fn to_genesis_config(&self) -> Result<GenesisConfig, ConfigError> {
        let validators = self
            .genesis
            .validators
            .iter()
            .map(|entry| {
                let generator_key =
                    PublicKey::from_hex(&entry.generator_key).map_err(|e| {
                        ConfigError::InvalidKey {
                            field: "generator_key",
                            reason: e.to_string(),
                        }
                    })?;
                let bls_key =
                    BlsPublicKey::from_hex(&entry.bls_key).map_err(|e| ConfigError::InvalidKey {
                        field: "bls_key",
                        reason: e.to_string(),
                    })?;
                Ok(BftValidator {
                    address: generator_key.address(),
                    bft_weight: entry.bft_weight,
                    bls_key,
                    generator_key,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(GenesisConfig {
            chain_id: self.chain_id,
            timestamp: self.genesis.timestamp,
            validators,
            certificate_threshold: self.genesis.certificate_threshold,
        })
    }

    pub fn local_validator_infos(&self) -> Result<Vec<ValidatorInfo>, ConfigError> {
        self.local_validators
            .iter()
            .map(LocalValidatorConfig::to_validator_info)
            .collect()
    }
}

/// Generate a devnet configuration where this node runs every validator
pub fn generate_sample_config(validator_count: usize) -> Result<NodeConfig, ConfigError> {
    let local_validators: Vec<LocalValidatorConfig> = (0..validator_count)
        .map(|_| LocalValidatorConfig::generate())
        .collect();
    let validators = local_validators
        .iter()
        .map(|v| v.to_genesis_entry(1))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NodeConfig {
        genesis: GenesisConfigFile {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            certificate_threshold: (validator_count as u64 * 2) / 3 + 1,
            validators,
        },
        local_validators,
        ..NodeConfig::default()
    })
}
