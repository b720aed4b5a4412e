// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GATEWAY (C9)
//
// The only component that terminates client connections. It never
// touches ledger or chain state directly — every parsed action is
// stamped with the connection's token and handed to the Chain Engine's
// command queue, which remains the sole owner of consensus state.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_chain::ChainCommand;
use pactum_crypto::Token;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// A transport that has already authenticated its peer and hands the
/// gateway a framed byte stream keyed by that peer's token. Left
/// abstract: the concrete framing (TLS, QUIC, a Noise handshake, ...) is
/// outside this crate's scope.
#[async_trait::async_trait]
pub trait AuthenticatedTransport: Send + Sync {
    /// The authenticated peer's token, established during the
    /// transport's own handshake.
    fn peer_token(&self) -> Token;

    /// Reads the next framed action, or `None` on clean disconnect.
    async fn recv_action(&mut self) -> Option<Vec<u8>>;
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("chain engine command channel closed")]
    EngineUnavailable,
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub token: Token,
    pub established_at: u64,
    pub action_count: u64,
}

/// Observes per-action accept/reject decisions as the gateway forwards
/// them to the Chain Engine. Kept as a trait so this crate never takes a
/// dependency on a specific metrics backend.
pub trait ActionMetricsSink: Send + Sync {
    fn record(&self, accepted: bool);
}

/// Tracks live connections and forwards their actions into the Chain
/// Engine. Does not own the engine itself — only a sender into its
/// command queue, so many gateways (e.g. one per listen address) can
/// share a single chain authority. Connection bookkeeping lives behind a
/// lock that is never held across an `await`, so many connections can be
/// served concurrently from a single shared `Gateway`.
pub struct Gateway {
    engine_tx: mpsc::Sender<ChainCommand>,
    connections: Mutex<HashMap<Token, ConnectionStats>>,
    metrics: Option<Arc<dyn ActionMetricsSink>>,
}

impl Gateway {
    pub fn new(engine_tx: mpsc::Sender<ChainCommand>) -> Self {
        Gateway { engine_tx, connections: Mutex::new(HashMap::new()), metrics: None }
    }

    pub fn with_metrics(mut self, sink: Arc<dyn ActionMetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn connection_stats(&self, token: &Token) -> Option<ConnectionStats> {
        self.connections.lock().get(token).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn now_secs(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    /// Drives a single authenticated connection until it disconnects,
    /// forwarding every action it sends to the Chain Engine's validate
    /// entry point. The connection's own token is recorded for
    /// bookkeeping, but the action bytes themselves already carry the
    /// signer identity the validator checks.
    pub async fn serve(&self, mut transport: impl AuthenticatedTransport) -> Result<(), NetError> {
        let token = transport.peer_token();
        self.connections.lock().insert(
            token,
            ConnectionStats { token, established_at: self.now_secs(), action_count: 0 },
        );

        while let Some(action) = transport.recv_action().await {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.engine_tx
                .send(ChainCommand::Validate { action, reply: reply_tx })
                .await
                .map_err(|_| NetError::EngineUnavailable)?;
            let accepted = reply_rx.await.unwrap_or(false);
            if let Some(stats) = self.connections.lock().get_mut(&token) {
                stats.action_count += 1;
            }
            if let Some(sink) = &self.metrics {
                sink.record(accepted);
            }
            if !accepted {
                tracing::debug!(?token, "gateway forwarded action rejected by validator");
            }
        }

        self.connections.lock().remove(&token);
        Ok(())
    }

    pub fn disconnect(&self, token: &Token) {
        self.connections.lock().remove(token);
    }
}
