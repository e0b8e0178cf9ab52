//! Value encoding for the persistent tier
//!
//! Any type that is `Serialize + DeserializeOwned` is `Codable` through
//! bincode, so the capability is checked at compile time.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can be turned into bytes and back
pub trait Codable: Sized {
    /// Encode the value into a byte buffer
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Decode a value previously produced by [`Codable::encode`]
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl<T> Codable for T
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        age: u32,
        tags: Vec<String>,
        scores: BTreeMap<String, f64>,
    }

    #[derive(Debug, Deserialize)]
    struct Opaque;

    impl Serialize for Opaque {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque values cannot be encoded"))
        }
    }

    #[test]
    fn test_struct_encodes_and_decodes() {
        let mut scores = BTreeMap::new();
        scores.insert("math".to_string(), 91.5);

        let profile = Profile {
            name: "John".to_string(),
            age: 30,
            tags: vec!["admin".to_string()],
            scores,
        };

        let bytes = profile.encode().unwrap();
        assert_eq!(Profile::decode(&bytes).unwrap(), profile);
    }

    #[test]
    fn test_serialize_failure_is_reported() {
        let err = Opaque.encode().unwrap_err();
        assert!(matches!(err, CodecError::Serialize(msg) if msg.contains("opaque")));
    }

    #[test]
    fn test_truncated_bytes_fail_to_decode() {
        let bytes = 7u8.encode().unwrap();
        assert!(matches!(u64::decode(&bytes), Err(CodecError::Deserialize(_))));
    }
}
