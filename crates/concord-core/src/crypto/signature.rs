use ed25519_dalek::{Signature as DalekSignature, Signer, Verifier};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use std::fmt;

use crate::crypto::keys::{PublicKey, SecretKey};
use crate::error::CoreError;

/// Ed25519 signature (64 bytes) over a block header
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sig(#[serde(with = "BigArray")] pub [u8; 64]);

impl Sig {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 64]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for Sig {
    fn default() -> Self {
        Sig([0u8; 64])
    }
}

impl fmt::Debug for Sig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({}...)", &self.to_hex()[..16])
    }
}

/// Sign a message with a generator secret key
pub fn sign(secret_key: &SecretKey, message: &[u8]) -> Sig {
    Sig(secret_key.signing_key().sign(message).to_bytes())
}

/// Verify a generator signature
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Sig) -> Result<(), CoreError> {
    let verifying_key = public_key.to_verifying_key()?;
    verifying_key
        .verify(message, &DalekSignature::from_bytes(&signature.0))
        .map_err(|_| CoreError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let sig = sign(&kp.secret, b"header bytes");
        assert!(verify(&kp.public, b"header bytes", &sig).is_ok());
        assert!(!sig.is_empty());
    }

    #[test]
    fn test_verify_rejects_other_signer() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let sig = sign(&kp1.secret, b"header bytes");
        assert!(matches!(
            verify(&kp2.public, b"header bytes", &sig),
            Err(CoreError::InvalidSignature)
        ));
    }

    #[test]
    fn test_empty_signature_never_verifies() {
        let kp = KeyPair::generate();
        assert!(verify(&kp.public, b"header bytes", &Sig::default()).is_err());
    }
}
