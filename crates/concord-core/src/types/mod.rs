pub mod block;
pub mod certificate;
pub mod commit;
pub mod transaction;
pub mod validator;

pub use block::{Block, BlockHeader, GenesisConfig, BLOCK_VERSION};
pub use certificate::{Certificate, UnsignedCertificate, MESSAGE_TAG_CERTIFICATE};
pub use commit::{AggregateCommit, SingleCommit};
pub use transaction::{Transaction, MAX_PARAMS_SIZE};
pub use validator::{compute_validators_hash, BftValidator, ValidatorInfo};
