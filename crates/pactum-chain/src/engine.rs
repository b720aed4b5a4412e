// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CHAIN ENGINE (C6)
//
// Single-owner state machine: exactly one task holds `ChainEngine` and
// drains a merged command queue of incoming actions, lifecycle ticks,
// and seal/commit/rollover requests. Every other component talks to it
// through `ChainCommand` messages — the actor pattern the node binary
// uses throughout (see `pactum-node`'s service tasks).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::block::Block;
use pactum_core::{parse_action, LedgerError, MutatingState, WalletLedger};
use pactum_crypto::{hash_bytes, hash_token, Hash, PrivateKey, Signature, Token};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};

/// Replay-guard and action-epoch window, in epochs.
pub const MAX_PROTOCOL_EPOCH: u64 = 100;
/// How many committed blocks are kept in `sealed_blocks` for descendant
/// revalidation before being dropped.
pub const KEEP_LAST_N: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("no live block is open")]
    NoLiveBlock,
    #[error("checkpoint {0} is neither the commit point nor a sealed block")]
    UnknownCheckpoint(u64),
    #[error("commit epoch must be exactly last_committed_epoch + 1")]
    EpochNotMonotonic,
    #[error("hash mismatch on commit")]
    HashMismatch,
    #[error("no sealed block at the requested epoch")]
    BlockMissing,
    #[error("rollover target is behind the last committed epoch")]
    RolloverBehindCommit,
    #[error("seal signature did not verify against the known proposer")]
    InvalidSeal,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fixed-size ring of per-epoch action-hash sets, indexed by `epoch %
/// MAX_PROTOCOL_EPOCH`. Each slot remembers which epoch it holds so a
/// stale wraparound entry is never mistaken for a live one.
struct IncorporatedRing {
    slots: Vec<Option<(u64, HashSet<Hash>)>>,
}

impl IncorporatedRing {
    fn new() -> Self {
        IncorporatedRing { slots: (0..MAX_PROTOCOL_EPOCH).map(|_| None).collect() }
    }

    fn record(&mut self, epoch: u64, action_hash: Hash) {
        let idx = (epoch % MAX_PROTOCOL_EPOCH) as usize;
        match &mut self.slots[idx] {
            Some((e, set)) if *e == epoch => {
                set.insert(action_hash);
            }
            _ => {
                let mut set = HashSet::new();
                set.insert(action_hash);
                self.slots[idx] = Some((epoch, set));
            }
        }
    }

    fn contains_up_to(&self, action_hash: &Hash, max_epoch: u64) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|(e, set)| *e <= max_epoch && set.contains(action_hash))
    }
}

pub struct ChainEngine {
    protocol_code: u32,
    credentials: Option<PrivateKey>,
    proposer: Token,
    ledger: Arc<dyn WalletLedger>,
    deposits: Arc<dyn WalletLedger>,
    last_committed_epoch: u64,
    last_committed_hash: Hash,
    sealed_blocks: HashMap<u64, Block>,
    live_block: Option<Block>,
    incorporated: IncorporatedRing,
}

impl ChainEngine {
    pub fn new(
        protocol_code: u32,
        credentials: Option<PrivateKey>,
        proposer: Token,
        ledger: Arc<dyn WalletLedger>,
        deposits: Arc<dyn WalletLedger>,
        last_committed_epoch: u64,
        last_committed_hash: Hash,
    ) -> Self {
        ChainEngine {
            protocol_code,
            credentials,
            proposer,
            ledger,
            deposits,
            last_committed_epoch,
            last_committed_hash,
            sealed_blocks: HashMap::new(),
            live_block: None,
            incorporated: IncorporatedRing::new(),
        }
    }

    pub fn last_committed_epoch(&self) -> u64 {
        self.last_committed_epoch
    }

    pub fn last_committed_hash(&self) -> Hash {
        self.last_committed_hash
    }

    /// A wire-safe copy of a sealed block at `epoch`, for handing a
    /// just-committed block to the broadcast pool without exposing
    /// `sealed_blocks` itself outside the engine.
    pub fn sealed_block(&self, epoch: u64) -> Option<Block> {
        self.sealed_blocks.get(&epoch).map(|b| b.clone_without_validator())
    }

    fn checkpoint_hash(&self, checkpoint: u64) -> Option<Hash> {
        if checkpoint == self.last_committed_epoch {
            Some(self.last_committed_hash)
        } else {
            self.sealed_blocks.get(&checkpoint).map(|b| b.seal_hash)
        }
    }

    /// Requires `epoch > last_committed_epoch` and `checkpoint` to be
    /// either the commit point or a sealed ancestor. Composes the
    /// mutation layers of every sealed ancestor between the commit
    /// point and `checkpoint`, builds a validator view over them, and
    /// makes the new block `live`.
    pub fn next_block(&mut self, epoch: u64, checkpoint: u64, proposer: Token) -> Result<(), ChainError> {
        if epoch <= self.last_committed_epoch {
            return Err(ChainError::EpochNotMonotonic);
        }
        let checkpoint_hash = self.checkpoint_hash(checkpoint).ok_or(ChainError::UnknownCheckpoint(checkpoint))?;

        let mut layers = Vec::new();
        for e in (self.last_committed_epoch + 1)..=checkpoint {
            if let Some(block) = self.sealed_blocks.get(&e) {
                if let Some(v) = &block.validator {
                    layers.push(&v.mutations);
                }
            }
        }
        let validator =
            MutatingState::with_layers(self.ledger.clone(), self.deposits.clone(), epoch, &layers);

        let publisher = if self.protocol_code != 0 { Some(proposer) } else { None };
        let mut block = Block::new(self.protocol_code, epoch, checkpoint, checkpoint_hash, proposer, publisher, self.last_committed_hash);
        block.validator = Some(validator);
        self.live_block = Some(block);
        Ok(())
    }

    /// Rejects if there is no live block, the action's epoch is outside
    /// `[live.epoch - MAX_PROTOCOL_EPOCH, live.epoch]`, or the action has
    /// already been incorporated at or before the live checkpoint
    /// (replay guard). Otherwise delegates to the live validator; on
    /// success, appends the action and records its hash.
    pub fn validate(&mut self, action_bytes: &[u8]) -> bool {
        let Some(live) = self.live_block.as_mut() else {
            return false;
        };
        let Some(action) = parse_action(action_bytes) else {
            return false;
        };
        let action_epoch = action.epoch();
        if action_epoch > live.epoch || live.epoch - action_epoch > MAX_PROTOCOL_EPOCH {
            return false;
        }
        let action_hash = hash_bytes(action_bytes);
        if self.incorporated.contains_up_to(&action_hash, live.checkpoint_epoch) {
            return false;
        }
        let Some(validator) = live.validator.as_mut() else {
            return false;
        };
        if !validator.validate(action_bytes) {
            return false;
        }
        live.push_action(action_bytes.to_vec());
        self.incorporated.record(action_epoch, action_hash);
        true
    }

    /// Signs the live block with the node's own credentials and moves it
    /// into `sealed_blocks`.
    pub fn seal_own_block(&mut self) -> Result<(), ChainError> {
        let credentials = self.credentials.as_ref().ok_or(ChainError::NoLiveBlock)?;
        let mut block = self.live_block.take().ok_or(ChainError::NoLiveBlock)?;
        let now_nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64;
        block.seal(credentials, now_nanos);
        if block.protocol_code != 0 {
            let _ = block.publish(credentials);
        }
        let epoch = block.epoch;
        self.sealed_blocks.insert(epoch, block);
        Ok(())
    }

    /// Listener-node path: accept a seal produced by the proposer
    /// elsewhere, verifying `sig` against `hash` before installing it.
    pub fn seal_block(&mut self, epoch: u64, timestamp: u64, hash: Hash, sig: Signature) -> Result<(), ChainError> {
        let mut block = self.live_block.take().ok_or(ChainError::NoLiveBlock)?;
        if block.epoch != epoch {
            self.live_block = Some(block);
            return Err(ChainError::NoLiveBlock);
        }
        if !block.proposer.verify(hash.as_bytes(), &sig) {
            self.live_block = Some(block);
            return Err(ChainError::InvalidSeal);
        }
        block.proposed_at = timestamp;
        block.seal_hash = hash;
        block.seal_signature = sig;
        self.sealed_blocks.insert(epoch, block);
        Ok(())
    }

    /// Commits the next block this node itself proposed. If its
    /// checkpoint is not the immediately preceding committed epoch, a
    /// fresh validator is built at `last_committed_epoch` and the block
    /// is revalidated against it first.
    pub fn commit_own_block(&mut self) -> Result<(), ChainError> {
        let e = self.last_committed_epoch + 1;
        let needs_revalidate = {
            let block = self.sealed_blocks.get(&e).ok_or(ChainError::BlockMissing)?;
            block.checkpoint_epoch != self.last_committed_epoch
        };
        if needs_revalidate {
            let fresh = MutatingState::new(self.ledger.clone(), self.deposits.clone(), self.last_committed_epoch);
            let block = self.sealed_blocks.get_mut(&e).ok_or(ChainError::BlockMissing)?;
            block.revalidate(fresh);
        }
        let block = self.sealed_blocks.get_mut(&e).ok_or(ChainError::BlockMissing)?;
        let validator = block.validator.take().ok_or(ChainError::NoLiveBlock)?;
        let proposer_hash = hash_token(&block.proposer);
        let seal_hash = block.seal_hash;
        validator.incorporate(proposer_hash)?;

        self.last_committed_hash = seal_hash;
        self.last_committed_epoch = e;
        self.sealed_blocks.remove(&e.saturating_sub(KEEP_LAST_N));
        Ok(())
    }

    /// Mirror of `commit_own_block` for commits announced by the
    /// proposer. Requires strict epoch monotonicity, a matching
    /// `prev_hash`, a matching `block_hash`, and the block already
    /// present in `sealed_blocks`. Replays actions through a fresh
    /// validator, skipping `invalidated`.
    pub fn commit_block(&mut self, epoch: u64, block_hash: Hash, prev_hash: Hash, invalidated: &[Hash]) -> Result<(), ChainError> {
        if epoch != self.last_committed_epoch + 1 {
            return Err(ChainError::EpochNotMonotonic);
        }
        if prev_hash != self.last_committed_hash {
            return Err(ChainError::HashMismatch);
        }
        let block = self.sealed_blocks.get(&epoch).ok_or(ChainError::BlockMissing)?;
        if block.seal_hash != block_hash {
            return Err(ChainError::HashMismatch);
        }
        let proposer = block.proposer;
        let actions = block.actions.clone();

        let mut validator = MutatingState::new(self.ledger.clone(), self.deposits.clone(), self.last_committed_epoch);
        for action_bytes in &actions {
            let action_hash = hash_bytes(action_bytes);
            if invalidated.contains(&action_hash) {
                continue;
            }
            validator.validate(action_bytes);
        }
        validator.incorporate(hash_token(&proposer))?;

        self.last_committed_hash = block_hash;
        self.last_committed_epoch = epoch;
        self.sealed_blocks.remove(&epoch.saturating_sub(KEEP_LAST_N));
        Ok(())
    }

    /// Deletes every sealed block after `epoch` and discards the live
    /// block if its epoch lies beyond it.
    pub fn rollover_block(&mut self, epoch: u64) -> Result<(), ChainError> {
        if epoch < self.last_committed_epoch {
            return Err(ChainError::RolloverBehindCommit);
        }
        if !self.sealed_blocks.contains_key(&epoch) {
            return Err(ChainError::BlockMissing);
        }
        self.sealed_blocks.retain(|&e, _| e <= epoch);
        if matches!(&self.live_block, Some(b) if b.epoch > epoch) {
            self.live_block = None;
        }
        Ok(())
    }
}

/// Messages accepted by `ChainEngine::run`. Every request carries a
/// `oneshot` reply channel; a dropped receiver (caller went away) is not
/// treated as an error.
pub enum ChainCommand {
    NextBlock { epoch: u64, checkpoint: u64, proposer: Token, reply: oneshot::Sender<Result<(), ChainError>> },
    Validate { action: Vec<u8>, reply: oneshot::Sender<bool> },
    SealOwnBlock { reply: oneshot::Sender<Result<(), ChainError>> },
    SealBlock { epoch: u64, timestamp: u64, hash: Hash, signature: Signature, reply: oneshot::Sender<Result<(), ChainError>> },
    CommitOwnBlock { reply: oneshot::Sender<Result<(), ChainError>> },
    CommitBlock { epoch: u64, block_hash: Hash, prev_hash: Hash, invalidated: Vec<Hash>, reply: oneshot::Sender<Result<(), ChainError>> },
    RolloverBlock { epoch: u64, reply: oneshot::Sender<Result<(), ChainError>> },
    SealedBlock { epoch: u64, reply: oneshot::Sender<Option<Block>> },
}

impl ChainEngine {
    /// Drains `rx` until the sender side closes. The sole owner of
    /// `self` for the engine's lifetime — nothing else touches chain
    /// state except through this queue.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ChainCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                ChainCommand::NextBlock { epoch, checkpoint, proposer, reply } => {
                    let _ = reply.send(self.next_block(epoch, checkpoint, proposer));
                }
                ChainCommand::Validate { action, reply } => {
                    let _ = reply.send(self.validate(&action));
                }
                ChainCommand::SealOwnBlock { reply } => {
                    let _ = reply.send(self.seal_own_block());
                }
                ChainCommand::SealBlock { epoch, timestamp, hash, signature, reply } => {
                    let _ = reply.send(self.seal_block(epoch, timestamp, hash, signature));
                }
                ChainCommand::CommitOwnBlock { reply } => {
                    let _ = reply.send(self.commit_own_block());
                }
                ChainCommand::CommitBlock { epoch, block_hash, prev_hash, invalidated, reply } => {
                    let _ = reply.send(self.commit_block(epoch, block_hash, prev_hash, &invalidated));
                }
                ChainCommand::RolloverBlock { epoch, reply } => {
                    let _ = reply.send(self.rollover_block(epoch));
                }
                ChainCommand::SealedBlock { epoch, reply } => {
                    let _ = reply.send(self.sealed_block(epoch));
                }
            }
        }
        tracing::info!("chain engine command channel closed, run loop exiting");
    }
}
