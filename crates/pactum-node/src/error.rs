use std::path::PathBuf;
use thiserror::Error;

/// The only error type in the workspace that carries process exit-code
/// semantics (spec.md §6). Every other crate's errors are handled or
/// logged before reaching `main`.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config file not found at {0}")]
    MissingConfigPath(PathBuf),
    #[error("config file is unreadable or invalid: {0}")]
    InvalidConfig(String),
    #[error("vault file not found at {0}")]
    MissingVaultPath(PathBuf),
    #[error("vault decryption failed: {0}")]
    VaultDecryptionFailed(String),
    #[error("failed to bind port {0}")]
    PortBindFailure(u16),
    #[error("configured nodeToken does not match the key loaded from the vault")]
    NodeTokenMismatch,
    #[error("archive sink error: {0}")]
    Archive(String),
}

impl NodeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            NodeError::MissingConfigPath(_) => 1,
            NodeError::InvalidConfig(_) => 2,
            NodeError::MissingVaultPath(_) => 3,
            NodeError::VaultDecryptionFailed(_) => 4,
            NodeError::PortBindFailure(_) => 5,
            NodeError::NodeTokenMismatch => 6,
            NodeError::Archive(_) => 7,
        }
    }
}
