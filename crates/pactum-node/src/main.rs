// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PACTUM NODE — process entry point.
//
// Wires the Chain Engine (the sole owner of consensus state) to a
// Broadcast Pool and a Gateway, each driven as its own task and talking
// to the engine only through its command queue. A periodic tick drives
// the block lifecycle: seal the live block, commit it, open the next
// one live, and fan the committed block out through the broadcast pool
// and archive sink (spec.md §2 "Data flow").
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod archive;
mod config;
mod credentials;
mod error;
mod metrics;
mod transport;

use crate::archive::{BlockArchiveSink, NewIndexJob, NullArchive};
use crate::config::Config;
use crate::credentials::{CredentialProvider, VaultFileProvider};
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::transport::TcpActionTransport;
use clap::Parser;
use pactum_chain::{ChainCommand, ChainEngine};
use pactum_core::{FileLedger, MemoryLedger, WalletLedger};
use pactum_crypto::{Token, ZERO_HASH};
use pactum_net::{ActionMetricsSink, BroadcastCommand, BroadcastMetricsSink, BroadcastPool, Gateway};
use pactum_wire::LifecycleMessage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

/// One tick per wall-clock second, matching the epoch granularity the
/// broadcast pool's ring cache assumes (`pactum_net::MAX_CACHE_SIZE` is
/// defined as "15 minutes of one-second epochs").
const BLOCK_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SUBSCRIBER_FRAME_LEN: u32 = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "pactum-node", about = "Proof-of-authority block lifecycle node")]
struct Cli {
    /// Path to the node's JSON configuration file.
    #[arg(long, default_value = "pactum.config.json")]
    config: PathBuf,

    /// Log verbosity filter, passed through to `tracing_subscriber::EnvFilter`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_ledgers(config: &Config) -> Result<(Arc<dyn WalletLedger>, Arc<dyn WalletLedger>), NodeError> {
    if config.uses_in_memory_ledger() {
        return Ok((Arc::new(MemoryLedger::new()), Arc::new(MemoryLedger::new())));
    }
    let bits = 20;
    let wallet_path = format!("{}wallet.dat", config.wallet_data_path);
    let deposit_path = format!("{}deposit.dat", config.wallet_data_path);
    let wallet = FileLedger::open(std::path::Path::new(&wallet_path), bits)
        .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
    let deposits = FileLedger::open(std::path::Path::new(&deposit_path), bits)
        .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;
    Ok((Arc::new(wallet), Arc::new(deposits)))
}

/// Accepts gateway connections forever, handing each one a fresh
/// `TcpActionTransport` and serving it on its own task.
async fn accept_gateway_connections(listener: TcpListener, gateway: Arc<Gateway>, metrics: Arc<NodeMetrics>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "gateway accept failed");
                continue;
            }
        };
        let gateway = gateway.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let transport = match TcpActionTransport::accept(stream).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(error = %e, ?peer_addr, "gateway connection handshake failed");
                    return;
                }
            };
            metrics.gateway_connections.inc();
            if let Err(e) = gateway.serve(transport).await {
                tracing::warn!(error = %e, ?peer_addr, "gateway connection ended with an error");
            }
            metrics.gateway_connections.dec();
        });
    }
}

/// Reads one length-prefixed `LifecycleMessage` off `stream`, matching
/// the length-prefix framing spec.md §4.8/§6 assigns to the transport.
async fn read_subscriber_frame(stream: &mut TcpStream) -> Option<LifecycleMessage> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.ok()?;
    let len = u32::from_le_bytes(len_bytes);
    if len == 0 || len > MAX_SUBSCRIBER_FRAME_LEN {
        return None;
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.ok()?;
    LifecycleMessage::parse(&payload).ok()
}

/// Handles one broadcast-port connection: the peer announces its token,
/// then sends either a `Subscribe` (stream future blocks) or a
/// `ReceiveTokens` (one-shot archive replay request per spec.md §6).
async fn handle_broadcast_subscriber(
    mut stream: TcpStream,
    broadcast_tx: mpsc::Sender<BroadcastCommand>,
    archive: Arc<dyn BlockArchiveSink>,
    metrics: Arc<NodeMetrics>,
) {
    let mut token_bytes = [0u8; 32];
    if stream.read_exact(&mut token_bytes).await.is_err() {
        return;
    }
    let Ok(token) = Token::from_slice(&token_bytes) else { return };

    let Some(msg) = read_subscriber_frame(&mut stream).await else { return };
    match msg {
        LifecycleMessage::Subscribe { protocol_code, from_epoch } => {
            let (tx, mut rx) = mpsc::channel(256);
            if broadcast_tx
                .send(BroadcastCommand::Subscribe { token, protocol_code, from_epoch, tx })
                .await
                .is_err()
            {
                return;
            }
            metrics.broadcast_listeners.inc();

            let (mut read_half, mut write_half) = stream.into_split();
            let writer = tokio::spawn(async move {
                while let Some(out_msg) = rx.recv().await {
                    let bytes = out_msg.serialize();
                    let len = (bytes.len() as u32).to_le_bytes();
                    if write_half.write_all(&len).await.is_err() {
                        break;
                    }
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            });

            // Any read (including EOF or an error) ends the subscription;
            // subscribers never send anything after their initial frame.
            let mut discard = [0u8; 1];
            let _ = read_half.read(&mut discard).await;

            writer.abort();
            let _ = broadcast_tx.send(BroadcastCommand::Disconnect(token)).await;
            metrics.broadcast_listeners.dec();
        }
        LifecycleMessage::ReceiveTokens { tokens, from_epoch, keep_alive } => {
            let job = NewIndexJob { conn: token, tokens, from_epoch, keep_alive };
            if let Err(e) = archive.append_job(job) {
                tracing::warn!(error = %e, ?token, "archive index job rejected");
            }
        }
        _ => {
            tracing::debug!(?token, "broadcast port received an unexpected message kind");
        }
    }
}

async fn accept_broadcast_subscribers(
    listener: TcpListener,
    broadcast_tx: mpsc::Sender<BroadcastCommand>,
    archive: Arc<dyn BlockArchiveSink>,
    metrics: Arc<NodeMetrics>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "broadcast accept failed");
                continue;
            }
        };
        tokio::spawn(handle_broadcast_subscriber(stream, broadcast_tx.clone(), archive.clone(), metrics.clone()));
        tracing::debug!(?peer_addr, "broadcast subscriber connected");
    }
}

/// Drives the block lifecycle on a fixed interval: seal the live block,
/// open the next one live immediately so the gateway never stalls
/// incoming actions, commit the sealed block, then fan it out to the
/// broadcast pool and archive sink.
async fn run_block_production(
    engine_tx: mpsc::Sender<ChainCommand>,
    broadcast_tx: mpsc::Sender<BroadcastCommand>,
    archive: Arc<dyn BlockArchiveSink>,
    metrics: Arc<NodeMetrics>,
    proposer: Token,
    start_epoch: u64,
) {
    let mut next_epoch = start_epoch + 1;
    if !open_next_block(&engine_tx, next_epoch, start_epoch, proposer).await {
        return;
    }

    let mut ticker = tokio::time::interval(BLOCK_INTERVAL);
    loop {
        ticker.tick().await;

        let (reply_tx, reply_rx) = oneshot::channel();
        if engine_tx.send(ChainCommand::SealOwnBlock { reply: reply_tx }).await.is_err() {
            return;
        }
        match reply_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, epoch = next_epoch, "nothing to seal this tick");
                continue;
            }
            Err(_) => return,
        }

        if !open_next_block(&engine_tx, next_epoch + 1, next_epoch, proposer).await {
            return;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if engine_tx.send(ChainCommand::CommitOwnBlock { reply: reply_tx }).await.is_err() {
            return;
        }
        match reply_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, epoch = next_epoch, "commit_own_block failed");
                next_epoch += 1;
                continue;
            }
            Err(_) => return,
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if engine_tx.send(ChainCommand::SealedBlock { epoch: next_epoch, reply: reply_tx }).await.is_err() {
            return;
        }
        if let Ok(Some(block)) = reply_rx.await {
            metrics.blocks_committed_total.inc();
            archive.append_block(&block);
            let block = Arc::new(block);
            let _ = broadcast_tx.send(BroadcastCommand::AppendBlock(block)).await;
        }

        next_epoch += 1;
    }
}

async fn open_next_block(engine_tx: &mpsc::Sender<ChainCommand>, epoch: u64, checkpoint: u64, proposer: Token) -> bool {
    let (reply_tx, reply_rx) = oneshot::channel();
    if engine_tx.send(ChainCommand::NextBlock { epoch, checkpoint, proposer, reply: reply_tx }).await.is_err() {
        return false;
    }
    match reply_rx.await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(error = %e, epoch, checkpoint, "failed to open next block");
            false
        }
        Err(_) => false,
    }
}

async fn run(cli: Cli) -> Result<(), NodeError> {
    let config = Config::load(&cli.config)?;

    let passphrase = std::env::var("PACTUM_VAULT_PASSPHRASE").unwrap_or_default();
    let credential_provider = VaultFileProvider::new(passphrase);
    let signing_key = credential_provider.load(&config.secure_vault_path)?;

    if !config.node_token.is_empty() {
        let expected = hex::encode(signing_key.public_key().as_bytes());
        if expected != config.node_token.to_lowercase() {
            return Err(NodeError::NodeTokenMismatch);
        }
    }

    let (ledger, deposits) = open_ledgers(&config)?;
    let archive: Arc<dyn BlockArchiveSink> = Arc::new(NullArchive);
    let metrics = Arc::new(NodeMetrics::new());

    let proposer_token = signing_key.public_key();
    let engine = ChainEngine::new(0, Some(signing_key), proposer_token, ledger, deposits, 0, ZERO_HASH);
    let start_epoch = engine.last_committed_epoch();

    let (engine_tx, engine_rx) = mpsc::channel::<ChainCommand>(1024);
    let engine_task = tokio::spawn(engine.run(engine_rx));

    let gateway_listener = TcpListener::bind(("0.0.0.0", config.gateway_port))
        .await
        .map_err(|_| NodeError::PortBindFailure(config.gateway_port))?;
    let broadcast_listener = TcpListener::bind(("0.0.0.0", config.block_broadcast_port))
        .await
        .map_err(|_| NodeError::PortBindFailure(config.block_broadcast_port))?;

    let action_sink: Arc<dyn ActionMetricsSink> = metrics.clone();
    let broadcast_sink: Arc<dyn BroadcastMetricsSink> = metrics.clone();
    let gateway = Arc::new(Gateway::new(engine_tx.clone()).with_metrics(action_sink));
    let broadcast_pool = BroadcastPool::new().with_metrics(broadcast_sink);
    let (broadcast_tx, broadcast_rx) = mpsc::channel::<BroadcastCommand>(1024);
    let broadcast_task = tokio::spawn(broadcast_pool.run(broadcast_rx));

    let gateway_accept_task = tokio::spawn(accept_gateway_connections(gateway_listener, gateway, metrics.clone()));
    let broadcast_accept_task = tokio::spawn(accept_broadcast_subscribers(
        broadcast_listener,
        broadcast_tx.clone(),
        archive.clone(),
        metrics.clone(),
    ));
    let production_task = tokio::spawn(run_block_production(
        engine_tx.clone(),
        broadcast_tx,
        archive.clone(),
        metrics,
        proposer_token,
        start_epoch,
    ));

    tracing::info!(
        gateway_port = config.gateway_port,
        broadcast_port = config.block_broadcast_port,
        "pactum node started"
    );

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutdown signal received, draining chain engine");
    gateway_accept_task.abort();
    broadcast_accept_task.abort();
    production_task.abort();
    archive.close();
    drop(engine_tx);
    let _ = engine_task.await;
    let _ = broadcast_task.await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, exit_code = err.exit_code(), "node exiting with error");
        std::process::exit(err.exit_code());
    }
}
