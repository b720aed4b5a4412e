// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NODE CONFIGURATION
//
// A single JSON file, loaded once at startup. `walletDataPath=""` selects
// the in-memory ledger backend; a non-empty path selects the file-backed
// one.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::NodeError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "gatewayPort")]
    pub gateway_port: u16,
    #[serde(rename = "blockBroadcastPort")]
    pub block_broadcast_port: u16,
    #[serde(rename = "walletDataPath")]
    pub wallet_data_path: String,
    #[serde(rename = "secureVaultPath")]
    pub secure_vault_path: PathBuf,
    #[serde(rename = "nodeToken", default)]
    pub node_token: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, NodeError> {
        let raw = std::fs::read_to_string(path).map_err(|_| NodeError::MissingConfigPath(path.to_path_buf()))?;
        serde_json::from_str(&raw).map_err(|e| NodeError::InvalidConfig(e.to_string()))
    }

    pub fn uses_in_memory_ledger(&self) -> bool {
        self.wallet_data_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expected_json_shape() {
        let json = r#"{
            "gatewayPort": 7801,
            "blockBroadcastPort": 7802,
            "walletDataPath": "/var/lib/pactum/",
            "secureVaultPath": "/etc/pactum/vault.age",
            "nodeToken": "ab12"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.gateway_port, 7801);
        assert_eq!(config.block_broadcast_port, 7802);
        assert!(!config.uses_in_memory_ledger());
    }

    #[test]
    fn empty_wallet_data_path_selects_in_memory_ledger() {
        let json = r#"{
            "gatewayPort": 1,
            "blockBroadcastPort": 2,
            "walletDataPath": "",
            "secureVaultPath": "/etc/pactum/vault.age"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.uses_in_memory_ledger());
        assert_eq!(config.node_token, "");
    }

    #[test]
    fn load_returns_missing_config_path_for_nonexistent_file() {
        let err = Config::load(Path::new("/nonexistent/pactum-config.json")).unwrap_err();
        assert!(matches!(err, NodeError::MissingConfigPath(_)));
    }
}
