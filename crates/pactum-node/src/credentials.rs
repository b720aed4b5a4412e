// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CREDENTIAL PROVIDER
//
// The real credential store is an external collaborator (spec.md §1).
// `VaultFileProvider` is a minimal stand-in sufficient to run the node
// without one, backed by `pactum_crypto::vault`'s age/scrypt envelope.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::NodeError;
use pactum_crypto::PrivateKey;
use std::path::Path;

pub trait CredentialProvider: Send + Sync {
    fn load(&self, vault_path: &Path) -> Result<PrivateKey, NodeError>;
}

/// Loads a node's signing key from an age/scrypt-encrypted file.
/// The passphrase is supplied out-of-band (an environment variable in
/// this stand-in; a real deployment would source it from a secrets
/// manager or an interactive prompt).
pub struct VaultFileProvider {
    passphrase: String,
}

impl VaultFileProvider {
    pub fn new(passphrase: String) -> Self {
        VaultFileProvider { passphrase }
    }
}

impl CredentialProvider for VaultFileProvider {
    fn load(&self, vault_path: &Path) -> Result<PrivateKey, NodeError> {
        if !vault_path.exists() {
            return Err(NodeError::MissingVaultPath(vault_path.to_path_buf()));
        }
        pactum_crypto::vault::load_vault(vault_path, &self.passphrase)
            .map_err(|e| NodeError::VaultDecryptionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactum_crypto::vault::write_vault;

    #[test]
    fn round_trips_through_an_encrypted_vault_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.age");
        let key = PrivateKey::generate();
        write_vault(&path, &key, "correct horse battery staple").unwrap();

        let provider = VaultFileProvider::new("correct horse battery staple".to_string());
        let loaded = provider.load(&path).unwrap();
        assert_eq!(loaded.public_key(), key.public_key());
    }

    #[test]
    fn missing_vault_file_reports_missing_vault_path() {
        let provider = VaultFileProvider::new("irrelevant".to_string());
        let err = provider.load(Path::new("/nonexistent/vault.age")).unwrap_err();
        assert!(matches!(err, NodeError::MissingVaultPath(_)));
    }

    #[test]
    fn wrong_passphrase_reports_vault_decryption_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.age");
        let key = PrivateKey::generate();
        write_vault(&path, &key, "correct passphrase").unwrap();

        let provider = VaultFileProvider::new("wrong passphrase".to_string());
        let err = provider.load(&path).unwrap_err();
        assert!(matches!(err, NodeError::VaultDecryptionFailed(_)));
    }
}
