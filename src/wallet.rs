//! Wallet loading
//!
//! The signing keypair is read once at startup and then passed by
//! reference into every builder call; nothing holds it globally.

use crate::tx_builder::{BundleError, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::path::Path;
use std::sync::Arc;

/// Expected secret key length: 32 byte seed followed by 32 byte public key
const KEYPAIR_LEN: usize = 64;

/// Read a keypair stored as a JSON array of 64 byte values
///
/// # Errors
///
/// [`BundleError::Configuration`] when the file is missing, is not a JSON
/// byte array, has the wrong length, is all zeros, or does not describe a
/// valid ed25519 keypair.
pub fn load_keypair(path: impl AsRef<Path>) -> Result<Keypair> {
    let path = path.as_ref();
    let content = std::fs::read(path).map_err(|e| {
        BundleError::config(format!("failed to read keypair file {}: {}", path.display(), e))
    })?;

    let bytes: Vec<u8> = serde_json::from_slice(&content).map_err(|e| {
        BundleError::config(format!("failed to parse keypair JSON {}: {}", path.display(), e))
    })?;
    if bytes.len() != KEYPAIR_LEN {
        return Err(BundleError::config(format!(
            "invalid keypair length: expected {} bytes, got {}",
            KEYPAIR_LEN,
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(BundleError::config("invalid keypair: all-zero key rejected"));
    }

    Keypair::try_from(bytes.as_slice())
        .map_err(|e| BundleError::config(format!("invalid keypair bytes: {}", e)))
}

/// The submitter's identity for the lifetime of the process
#[derive(Clone)]
pub struct Wallet {
    keypair: Arc<Keypair>,
}

impl Wallet {
    /// Load the wallet from a keypair file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_keypair(path).map(Self::from_keypair)
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_keypair_file;
    use std::io::Write;

    #[test]
    fn test_load_valid_keypair() {
        let keypair = Keypair::new();
        let file = write_keypair_file(&keypair);

        let wallet = Wallet::from_file(file.path()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = load_keypair("/nonexistent/keypair.json").unwrap_err();
        assert!(matches!(err, BundleError::Configuration(_)));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[1,2,3]").unwrap();

        let err = load_keypair(file.path()).unwrap_err();
        assert!(err.to_string().contains("expected 64 bytes, got 3"));
    }

    #[test]
    fn test_all_zero_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let zeros = serde_json::to_string(&vec![0u8; 64]).unwrap();
        file.write_all(zeros.as_bytes()).unwrap();

        let err = load_keypair(file.path()).unwrap_err();
        assert!(err.to_string().contains("all-zero"));
    }

    #[test]
    fn test_non_json_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();

        assert!(matches!(
            load_keypair(file.path()),
            Err(BundleError::Configuration(_))
        ));
    }
}
