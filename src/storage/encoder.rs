//! Reversible encoding of storage paths into opaque, URL-safe blob keys.

use super::BlobStoreError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

pub trait DataEncoder: Send + Sync {
    fn encode(&self, path: &str) -> String;

    fn decode(&self, key: &str) -> Result<String, BlobStoreError>;
}

/// URL-safe base64 without padding
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64DataEncoder;

impl DataEncoder for Base64DataEncoder {
    fn encode(&self, path: &str) -> String {
        URL_SAFE_NO_PAD.encode(path.as_bytes())
    }

    fn decode(&self, key: &str) -> Result<String, BlobStoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(key)
            .map_err(|e| BlobStoreError::invalid_key(key, e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| BlobStoreError::invalid_key(key, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_url_safe() {
        let key = Base64DataEncoder.encode("7/2019-03/99/1001-screen shot?.png");
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(
            Base64DataEncoder.decode(&key).unwrap(),
            "7/2019-03/99/1001-screen shot?.png"
        );
    }

    #[test]
    fn test_garbage_key_rejected() {
        let err = Base64DataEncoder.decode("not base64!").unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidKey { .. }));
    }
}
