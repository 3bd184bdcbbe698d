use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, sign, Hash, PublicKey, SecretKey, Sig};
use crate::error::CoreError;
use crate::serialize;

/// Upper bound on encoded command parameters
pub const MAX_PARAMS_SIZE: usize = 14 * 1024;

const MAX_NAME_LENGTH: usize = 32;

/// A transaction as carried by a block.
///
/// The consensus core never interprets `params`; execution belongs to the
/// state machine. Only the envelope is checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub module: String,
    pub command: String,
    pub nonce: u64,
    pub fee: u64,
    pub sender_public_key: PublicKey,
    pub params: Vec<u8>,
    pub signatures: Vec<Sig>,
}

impl Transaction {
    /// Create and sign a transaction with the sender's key
    pub fn new_signed(
        module: &str,
        command: &str,
        nonce: u64,
        fee: u64,
        params: Vec<u8>,
        secret_key: &SecretKey,
    ) -> Result<Self, CoreError> {
        let mut tx = Transaction {
            module: module.to_string(),
            command: command.to_string(),
            nonce,
            fee,
            sender_public_key: secret_key.public_key(),
            params,
            signatures: Vec::new(),
        };
        let signature = sign(secret_key, &tx.signing_bytes()?);
        tx.signatures.push(signature);
        Ok(tx)
    }

    /// Bytes covered by the sender signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut unsigned = self.clone();
        unsigned.signatures.clear();
        serialize::to_bytes(&unsigned)
    }

    pub fn id(&self) -> Result<Hash, CoreError> {
        Ok(hash_blake3(&serialize::to_bytes(self)?))
    }

    /// Static checks that need no chain state
    pub fn validate(&self) -> Result<(), CoreError> {
        let name_ok = |name: &str| {
            !name.is_empty()
                && name.len() <= MAX_NAME_LENGTH
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        };

        if !name_ok(&self.module) {
            return Err(CoreError::InvalidTransaction(format!(
                "invalid module name {:?}",
                self.module
            )));
        }
        if !name_ok(&self.command) {
            return Err(CoreError::InvalidTransaction(format!(
                "invalid command name {:?}",
                self.command
            )));
        }
        if self.params.len() > MAX_PARAMS_SIZE {
            return Err(CoreError::InvalidTransaction(format!(
                "params size {} exceeds {}",
                self.params.len(),
                MAX_PARAMS_SIZE
            )));
        }
        if self.signatures.is_empty() {
            return Err(CoreError::InvalidTransaction("missing signatures".to_string()));
        }
        Ok(())
    }
}
