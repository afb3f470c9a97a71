//! Payload codecs.
//!
//! The worker never looks inside request or reply bodies. A [`Codec`] turns
//! delivered bytes into a typed request and typed results back into bytes.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message serialization error")]
    Serialization(#[source] serde_json::Error),

    #[error("Message deserialization error")]
    Deserialization(#[source] serde_json::Error),
}

pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Value for the `content-type` property of encoded messages.
    fn content_type(&self) -> Option<&str> {
        None
    }
}

/// JSON over `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Serialization)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Deserialization)
    }

    fn content_type(&self) -> Option<&str> {
        Some("application/json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_json_codec_decodes_what_it_encodes() {
        let codec = JsonCodec;
        let bytes = codec.encode(&Ping { seq: 3 }).unwrap();
        assert_eq!(bytes, br#"{"seq":3}"#);

        let decoded: Ping = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, Ping { seq: 3 });
        assert_eq!(Codec::<Ping>::content_type(&codec), Some("application/json"));
    }

    #[test]
    fn test_json_codec_rejects_malformed_payload() {
        let result: Result<Ping, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(CodecError::Deserialization(_))));
    }
}
