use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid BLS secret key")]
    InvalidBlsSecretKey,

    #[error("Invalid BLS public key")]
    InvalidBlsPublicKey,

    #[error("Invalid BLS signature")]
    InvalidBlsSignature,

    #[error("Cannot aggregate an empty signature set")]
    EmptyAggregation,

    #[error("Public key not part of the aggregation key list")]
    UnknownAggregationKey,

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid hash length")]
    InvalidHashLength,

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
