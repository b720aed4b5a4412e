// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CREDENTIAL VAULT — age/scrypt envelope around a node's signing seed.
//
// The real credential store (spec.md §1) is an external collaborator; this
// is the minimal stand-in named in §6's `secureVaultPath` config field so
// the node binary can run without a separate vault product.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::{CryptoError, PrivateKey};
use secrecy::SecretString;
use std::io::{Read, Write};

pub fn encrypt_seed(key: &PrivateKey, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let recipient = age::scrypt::Recipient::new(SecretString::from(passphrase.to_owned()));
    let encryptor = age::Encryptor::with_recipients(vec![Box::new(recipient)])
        .ok_or_else(|| CryptoError::EncryptionFailed("no recipients".into()))?;
    let mut ciphertext = Vec::new();
    let mut writer = encryptor
        .wrap_output(&mut ciphertext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    writer
        .write_all(&key.seed_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    writer
        .finish()
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(ciphertext)
}

pub fn decrypt_seed(ciphertext: &[u8], passphrase: &str) -> Result<PrivateKey, CryptoError> {
    let identity = age::scrypt::Identity::new(SecretString::from(passphrase.to_owned()));
    let decryptor = age::Decryptor::new(ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    let mut seed = Vec::new();
    reader
        .read_to_end(&mut seed)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed("unexpected seed length".into()))?;
    Ok(PrivateKey::from_bytes(&seed))
}

/// Loads the signing key at `path`, decrypting it with `passphrase`.
pub fn load_vault(path: &std::path::Path, passphrase: &str) -> Result<PrivateKey, CryptoError> {
    let ciphertext = std::fs::read(path).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    decrypt_seed(&ciphertext, passphrase)
}

/// Writes a new vault file at `path`, creating parent directories as needed.
pub fn write_vault(
    path: &std::path::Path,
    key: &PrivateKey,
    passphrase: &str,
) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    }
    let ciphertext = encrypt_seed(key, passphrase)?;
    std::fs::write(path, ciphertext).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.age");
        let key = PrivateKey::generate();
        let token = key.public_key();
        write_vault(&path, &key, "hunter2").unwrap();
        let loaded = load_vault(&path, "hunter2").unwrap();
        assert_eq!(loaded.public_key(), token);
        assert!(load_vault(&path, "wrong").is_err());
    }
}
