use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Serialize to deterministic bincode bytes.
///
/// This is the byte contract for everything that goes on the wire, into
/// storage, or under a signature.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from bincode bytes
pub fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CoreError> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Envelope {
        height: u64,
        payload: Vec<u8>,
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let bytes = to_bytes(&Envelope {
            height: 7,
            payload: vec![1, 2, 3, 4],
        })
        .unwrap();

        let result: Result<Envelope, _> = from_bytes(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(CoreError::Deserialization(_))));
    }

    #[test]
    fn test_deterministic_serialization() {
        let value = Envelope {
            height: 100,
            payload: b"certificate".to_vec(),
        };

        assert_eq!(to_bytes(&value).unwrap(), to_bytes(&value).unwrap());
    }
}
