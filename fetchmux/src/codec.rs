//! JSON serialization boundary.
//!
//! Request bodies and typed responses pass through these two functions. Errors
//! are mapped to [`NetworkError::Encode`] and [`NetworkError::Decode`] so that
//! callers can tell a malformed payload apart from a transport failure.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{NetworkError, NetworkResult};

/// Serializes a value to JSON bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> NetworkResult<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| NetworkError::Encode(e.to_string()))
}

/// Deserializes JSON bytes into `T`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> NetworkResult<T> {
    serde_json::from_slice(data).map_err(|e| NetworkError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wallpaper {
        id: u32,
        title: String,
    }

    #[test]
    fn test_encode_struct() {
        let body = encode(&Wallpaper {
            id: 7,
            title: "dunes".to_string(),
        })
        .unwrap();
        assert_eq!(&body[..], br#"{"id":7,"title":"dunes"}"#);
    }

    #[test]
    fn test_decode_malformed_is_decode_error() {
        let result: NetworkResult<Wallpaper> = decode(b"{not json");
        assert!(matches!(result, Err(NetworkError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_shape_is_decode_error() {
        let result: NetworkResult<Wallpaper> = decode(br#"{"id":"seven"}"#);
        assert!(matches!(result, Err(NetworkError::Decode(_))));
    }

    #[test]
    fn test_encode_non_string_map_keys_fails() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple key");
        let result = encode(&map);
        assert!(matches!(result, Err(NetworkError::Encode(_))));
    }
}
