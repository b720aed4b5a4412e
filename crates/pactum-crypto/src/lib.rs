// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PACTUM - CRYPTOGRAPHY MODULE
//
// Ed25519 signing keys, BLAKE3 hashing, and the 32/64-byte Token/Hash/
// Signature types shared across the chain, wire protocol, and ledger.
// Private keys are zeroized on drop and can round-trip through an
// age-encrypted credential file (see `vault`).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

pub mod vault;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key bytes")]
    InvalidKey,
    #[error("invalid signature bytes")]
    InvalidSignature,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

macro_rules! fixed_bytes_type {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
                let arr: [u8; $len] = data.try_into().map_err(|_| CryptoError::InvalidKey)?;
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = CryptoError;
            fn from_str(s: &str) -> Result<Self, CryptoError> {
                let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidHex)?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes_type!(Token, 32);
fixed_bytes_type!(Hash, 32);
fixed_bytes_type!(Signature, 64);

pub const ZERO_HASH: Hash = Hash([0u8; 32]);

impl Token {
    /// Verifies `sig` over `msg` against this token as an Ed25519 public key.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> bool {
        let Ok(vk) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&sig.0);
        vk.verify(msg, &signature).is_ok()
    }
}

/// BLAKE3 digest of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

/// The account-index hash derived from a token, used as the ledger key.
pub fn hash_token(token: &Token) -> Hash {
    hash_bytes(&token.0)
}

/// An Ed25519 signing key. Zeroized on drop.
pub struct PrivateKey(SigningKey);

impl Drop for PrivateKey {
    fn drop(&mut self) {
        let mut bytes = self.0.to_bytes();
        bytes.zeroize();
    }
}

impl PrivateKey {
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        PrivateKey(SigningKey::generate(&mut rng))
    }

    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        PrivateKey(SigningKey::from_bytes(seed))
    }

    pub fn public_key(&self) -> Token {
        Token(self.0.verifying_key().to_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg).to_bytes())
    }

    pub fn seed_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let key = PrivateKey::generate();
        let token = key.public_key();
        let sig = key.sign(b"hello pactum");
        assert!(token.verify(b"hello pactum", &sig));
        assert!(!token.verify(b"hello pactum!", &sig));
    }

    #[test]
    fn mutating_any_byte_invalidates_signature() {
        let key = PrivateKey::generate();
        let token = key.public_key();
        let msg = b"payload-to-sign".to_vec();
        let sig = key.sign(&msg);
        for i in 0..msg.len() {
            let mut mutated = msg.clone();
            mutated[i] ^= 0xFF;
            assert!(!token.verify(&mutated, &sig));
        }
    }

    #[test]
    fn hash_token_is_deterministic() {
        let key = PrivateKey::generate();
        let token = key.public_key();
        assert_eq!(hash_token(&token), hash_token(&token));
    }

    #[test]
    fn hex_round_trip() {
        let key = PrivateKey::generate();
        let token = key.public_key();
        let s = token.to_string();
        let parsed: Token = s.parse().unwrap();
        assert_eq!(parsed, token);
    }
}
