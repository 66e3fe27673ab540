// Copyright (C) Microsoft Corporation. All rights reserved.

//! PEM container decoding for public key files.

use std::path::Path;

use zeroize::Zeroizing;

use crate::error::EngineError;
use crate::error::EngineResult;

pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// One decoded PEM block.
#[derive(Debug)]
pub struct Container {
    pub label: String,
    pub headers: Vec<(String, String)>,
    pub der: Zeroizing<Vec<u8>>,
}

impl Container {
    pub fn is_public_key(&self) -> bool {
        self.label == PUBLIC_KEY_LABEL
    }
}

/// Decode the first PEM block in `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Container, pem::PemError> {
    let block = pem::parse(bytes)?;

    let headers = block
        .headers()
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    Ok(Container {
        label: block.tag().to_string(),
        headers,
        der: Zeroizing::new(block.into_contents()),
    })
}

/// Read and decode a PEM file.
pub fn decode_file(path: &Path) -> EngineResult<Container> {
    let bytes = Zeroizing::new(std::fs::read(path).map_err(|source| {
        tracing::error!(?path, ?source, "Failed to open public key file");
        EngineError::PublicKeyUnavailable {
            path: path.to_path_buf(),
            source,
        }
    })?);

    decode(&bytes).map_err(|source| {
        tracing::error!(?path, ?source, "Failed to decode PEM container");
        EngineError::PublicKeyDecode {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "-----BEGIN PUBLIC KEY-----\nAQIDBA==\n-----END PUBLIC KEY-----\n";

    #[test]
    fn test_decode_public_key() {
        let container = decode(SAMPLE.as_bytes()).unwrap();
        assert!(container.is_public_key());
        assert!(container.headers.is_empty());
        assert_eq!(container.der.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_other_label() {
        let text = "-----BEGIN CERTIFICATE-----\nAQIDBA==\n-----END CERTIFICATE-----\n";
        let container = decode(text.as_bytes()).unwrap();
        assert_eq!(container.label, "CERTIFICATE");
        assert!(!container.is_public_key());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode(b"not a pem file").is_err());
    }

    #[test]
    fn test_decode_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = decode_file(&dir.path().join("absent.pem"));
        assert!(matches!(
            result,
            Err(EngineError::PublicKeyUnavailable { .. })
        ));
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, SAMPLE).unwrap();

        let container = decode_file(&path).unwrap();
        assert_eq!(container.der.as_slice(), &[1, 2, 3, 4]);
    }
}
