// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PACTUM GENESIS GENERATOR
//
// Produces a fresh proposer keypair, an encrypted vault file for it, and
// a genesis manifest recording the chain's starting point: epoch 0,
// `last_committed_hash = hash(proposer_token)`, and an initial credit to
// the proposer's wallet and deposit balances — the same genesis shape
// as the original `Genesis()`/`NewGenesisStateWithToken()` pair this
// protocol was distilled from.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bip39::Mnemonic;
use clap::Parser;
use pactum_core::{FileLedger, WalletLedger};
use pactum_crypto::{hash_token, vault, PrivateKey};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Matches the original protocol's genesis credit of 1e9 base units to
/// the bootstrap proposer's wallet and deposit ledgers.
const GENESIS_CREDIT: u64 = 1_000_000_000;

#[derive(Debug, Error)]
enum GenesisError {
    #[error("mnemonic generation failed: {0}")]
    Mnemonic(String),
    #[error(transparent)]
    Crypto(#[from] pactum_crypto::CryptoError),
    #[error(transparent)]
    Ledger(#[from] pactum_core::LedgerError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "pactum-genesis", about = "Generate a genesis proposer identity and bootstrap ledger")]
struct Cli {
    /// Directory to write the vault file, genesis manifest, and (if
    /// requested) the bootstrap wallet/deposit ledger files into.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Passphrase used to encrypt the generated vault file.
    #[arg(long)]
    passphrase: String,

    /// Also materialize file-backed wallet.dat/deposit.dat ledgers
    /// pre-credited with the genesis allocation. Without this flag only
    /// the vault and manifest are written, matching an in-memory-ledger
    /// deployment.
    #[arg(long, default_value_t = false)]
    with_file_ledger: bool,
}

#[derive(Serialize)]
struct GenesisManifest {
    proposer_token: String,
    last_committed_epoch: u64,
    last_committed_hash: String,
    genesis_credit: u64,
}

fn generate_mnemonic() -> Result<(Mnemonic, [u8; 32]), GenesisError> {
    let mut entropy = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|e| GenesisError::Mnemonic(e.to_string()))?;
    let seed = mnemonic.to_seed("");
    let mut signing_seed = [0u8; 32];
    signing_seed.copy_from_slice(&seed[..32]);
    Ok((mnemonic, signing_seed))
}

fn run(cli: Cli) -> Result<(), GenesisError> {
    std::fs::create_dir_all(&cli.out_dir)?;

    let (mnemonic, seed) = generate_mnemonic()?;
    let key = PrivateKey::from_bytes(&seed);
    let proposer = key.public_key();
    let genesis_hash = hash_token(&proposer);

    let vault_path = cli.out_dir.join("vault.age");
    vault::write_vault(&vault_path, &key, &cli.passphrase)?;

    let mnemonic_path = cli.out_dir.join("mnemonic.txt");
    std::fs::write(&mnemonic_path, mnemonic.to_string())?;

    if cli.with_file_ledger {
        let wallet = FileLedger::open(&cli.out_dir.join("wallet.dat"), 20)?;
        let deposits = FileLedger::open(&cli.out_dir.join("deposit.dat"), 20)?;
        wallet.credit(proposer, GENESIS_CREDIT)?;
        deposits.credit(proposer, GENESIS_CREDIT)?;
    }

    let manifest = GenesisManifest {
        proposer_token: hex::encode(proposer.as_bytes()),
        last_committed_epoch: 0,
        last_committed_hash: hex::encode(genesis_hash.as_bytes()),
        genesis_credit: GENESIS_CREDIT,
    };
    let manifest_path = cli.out_dir.join("genesis.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest).unwrap())?;

    tracing::info!(
        proposer = %manifest.proposer_token,
        vault = %vault_path.display(),
        manifest = %manifest_path.display(),
        "genesis identity written"
    );
    println!("Wrote genesis manifest to {}", manifest_path.display());
    println!("Vault: {}", vault_path.display());
    println!("Mnemonic (back this up, then delete the file): {}", mnemonic_path.display());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "genesis generation failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_mnemonic_round_trips_to_a_valid_seed() {
        let (mnemonic, seed) = generate_mnemonic().unwrap();
        assert_eq!(mnemonic.word_count(), 24);
        let key = PrivateKey::from_bytes(&seed);
        assert_eq!(key.public_key().as_bytes().len(), 32);
    }

    #[test]
    fn run_writes_vault_manifest_and_mnemonic() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            out_dir: dir.path().to_path_buf(),
            passphrase: "test-passphrase".to_string(),
            with_file_ledger: true,
        };
        run(cli).unwrap();

        assert!(dir.path().join("vault.age").exists());
        assert!(dir.path().join("genesis.json").exists());
        assert!(dir.path().join("mnemonic.txt").exists());
        assert!(dir.path().join("wallet.dat").exists());
        assert!(dir.path().join("deposit.dat").exists());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("genesis.json")).unwrap()).unwrap();
        assert_eq!(manifest["genesis_credit"], GENESIS_CREDIT);
        assert_eq!(manifest["last_committed_epoch"], 0);
    }
}
