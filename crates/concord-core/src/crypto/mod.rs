pub mod bls;
pub mod hash;
pub mod keys;
pub mod signature;

pub use bls::{BlsKeyPair, BlsPublicKey, BlsSecretKey, BlsSignature};
pub use hash::{hash_blake3, merkle_root, Address, Hash};
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use signature::{sign, verify, Sig};
