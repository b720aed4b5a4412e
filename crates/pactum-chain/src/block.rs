// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BLOCK (C5)
//
// Canonical, byte-exact block serialization with dual-format branching on
// `protocol_code`: zero-protocol blocks carry only a proposer seal;
// non-zero protocols additionally carry a publisher's co-signature over
// the sealed block. Hash-then-sign throughout, matching the action codec.
//
// The per-action length prefix is encoded as `u32`, not the `u16` a
// literal reading of the distilled wire layout might suggest — a Void
// action's payload alone can reach 64 KiB, which together with its fixed
// overhead does not fit a `u16` length. `u32` is the consistent choice
// and is used uniformly here; see DESIGN.md.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_core::codec::{put_bytes_u32, put_hash, put_hash_array, put_signature, put_token, put_u32, put_u64, Cursor};
use pactum_core::MutatingState;
use pactum_crypto::{hash_bytes, Hash, PrivateKey, Signature, Token};

#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("publish is only valid for non-zero protocol codes")]
    PublishNotApplicable,
    #[error("publisher key does not match the block's declared publisher")]
    PublisherMismatch,
}

fn zero_signature() -> Signature {
    Signature::from_slice(&[0u8; 64]).unwrap()
}

pub struct Block {
    pub protocol_code: u32,
    pub epoch: u64,
    pub checkpoint_epoch: u64,
    pub checkpoint_hash: Hash,
    pub proposer: Token,
    pub publisher: Option<Token>,
    pub proposed_at: u64,
    pub actions: Vec<Vec<u8>>,
    pub seal_hash: Hash,
    pub seal_signature: Signature,
    pub publish_hash: Option<Hash>,
    pub publish_signature: Option<Signature>,
    pub previous_committed_hash: Hash,
    pub invalidate: Vec<Hash>,
    /// The validator this block was built or revalidated against. Not
    /// part of the wire format — carried so the Chain Engine can
    /// incorporate the block's mutations at commit time without
    /// re-deriving them.
    pub validator: Option<MutatingState>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("protocol_code", &self.protocol_code)
            .field("epoch", &self.epoch)
            .field("checkpoint_epoch", &self.checkpoint_epoch)
            .field("proposer", &self.proposer)
            .field("action_count", &self.actions.len())
            .field("seal_hash", &self.seal_hash)
            .finish()
    }
}

impl Block {
    pub fn new(
        protocol_code: u32,
        epoch: u64,
        checkpoint_epoch: u64,
        checkpoint_hash: Hash,
        proposer: Token,
        publisher: Option<Token>,
        previous_committed_hash: Hash,
    ) -> Self {
        Block {
            protocol_code,
            epoch,
            checkpoint_epoch,
            checkpoint_hash,
            proposer,
            publisher: if protocol_code != 0 { publisher } else { None },
            proposed_at: 0,
            actions: Vec::new(),
            seal_hash: Hash::from_slice(&[0u8; 32]).unwrap(),
            seal_signature: zero_signature(),
            publish_hash: None,
            publish_signature: None,
            previous_committed_hash,
            invalidate: Vec::new(),
            validator: None,
        }
    }

    /// Convenience constructor bumping epoch and checkpoint by one
    /// against the immediate parent — used only by the Chain Engine's
    /// own single-authority fast path, not a public wire operation.
    pub fn next_from_parent(parent: &Block, proposer: Token, publisher: Option<Token>) -> Self {
        Block::new(
            parent.protocol_code,
            parent.epoch + 1,
            parent.epoch,
            parent.seal_hash,
            proposer,
            publisher,
            parent.seal_hash,
        )
    }

    pub fn push_action(&mut self, action_bytes: Vec<u8>) {
        self.actions.push(action_bytes);
    }

    fn encode_common_prefix(&self, out: &mut Vec<u8>) {
        put_u32(self.protocol_code, out);
        put_u64(self.epoch, out);
        put_u64(self.checkpoint_epoch, out);
        put_hash(&self.checkpoint_hash, out);
        put_token(&self.proposer, out);
        if self.protocol_code != 0 {
            if let Some(publisher) = &self.publisher {
                put_token(publisher, out);
            }
        }
        put_u64(self.proposed_at, out);
        put_u32(self.actions.len() as u32, out);
        for action in &self.actions {
            put_bytes_u32(action, out);
        }
    }

    /// Sets `proposed_at = now_nanos`, computes `seal_hash` over the
    /// prefix through the action list, and signs it.
    pub fn seal(&mut self, key: &PrivateKey, now_nanos: u64) {
        self.proposed_at = now_nanos;
        let mut prefix = Vec::new();
        self.encode_common_prefix(&mut prefix);
        self.seal_hash = hash_bytes(&prefix);
        self.seal_signature = key.sign(self.seal_hash.as_bytes());
    }

    /// Computes `publish_hash` over the prefix through the seal fields
    /// and signs it. Only valid for non-zero protocol codes.
    pub fn publish(&mut self, key: &PrivateKey) -> Result<(), BlockError> {
        if self.protocol_code == 0 {
            return Err(BlockError::PublishNotApplicable);
        }
        if self.publisher != Some(key.public_key()) {
            return Err(BlockError::PublisherMismatch);
        }
        let mut prefix = Vec::new();
        self.encode_common_prefix(&mut prefix);
        put_hash(&self.seal_hash, &mut prefix);
        put_signature(&self.seal_signature, &mut prefix);
        let hash = hash_bytes(&prefix);
        self.publish_hash = Some(hash);
        self.publish_signature = Some(key.sign(hash.as_bytes()));
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_common_prefix(&mut out);
        put_hash(&self.seal_hash, &mut out);
        put_signature(&self.seal_signature, &mut out);
        if self.protocol_code != 0 {
            if let (Some(h), Some(s)) = (&self.publish_hash, &self.publish_signature) {
                put_hash(h, &mut out);
                put_signature(s, &mut out);
            }
        }
        put_hash(&self.previous_committed_hash, &mut out);
        put_hash_array(&self.invalidate, &mut out);
        out
    }

    /// Parses, then verifies both hashes and both signature chains.
    /// Returns `None` on any mismatch — a malformed or forged block is
    /// indistinguishable from a parse failure to the caller.
    pub fn parse(bytes: &[u8]) -> Option<Block> {
        let mut c = Cursor::new(bytes);
        let protocol_code = c.u32()?;
        let epoch = c.u64()?;
        let checkpoint_epoch = c.u64()?;
        let checkpoint_hash = c.hash()?;
        let proposer = c.token()?;
        let publisher = if protocol_code != 0 { Some(c.token()?) } else { None };
        let proposed_at = c.u64()?;
        let action_count = c.u32()?;
        let mut actions = Vec::with_capacity(action_count as usize);
        for _ in 0..action_count {
            actions.push(c.bytes_u32()?.to_vec());
        }
        let seal_hash = c.hash()?;
        let seal_signature = c.signature()?;
        let (publish_hash, publish_signature) = if protocol_code != 0 {
            (Some(c.hash()?), Some(c.signature()?))
        } else {
            (None, None)
        };
        let previous_committed_hash = c.hash()?;
        let invalidate = c.hash_array()?;
        if !c.is_exhausted() {
            return None;
        }

        let block = Block {
            protocol_code,
            epoch,
            checkpoint_epoch,
            checkpoint_hash,
            proposer,
            publisher,
            proposed_at,
            actions,
            seal_hash,
            seal_signature,
            publish_hash,
            publish_signature,
            previous_committed_hash,
            invalidate,
            validator: None,
        };

        let mut prefix = Vec::new();
        block.encode_common_prefix(&mut prefix);
        if hash_bytes(&prefix) != block.seal_hash {
            return None;
        }
        if !block.proposer.verify(block.seal_hash.as_bytes(), &block.seal_signature) {
            return None;
        }
        if block.protocol_code != 0 {
            let publisher = block.publisher?;
            let publish_hash = block.publish_hash?;
            let publish_signature = block.publish_signature?;
            prefix.extend_from_slice(block.seal_hash.as_bytes());
            prefix.extend_from_slice(block.seal_signature.as_bytes());
            if hash_bytes(&prefix) != publish_hash {
                return None;
            }
            if !publisher.verify(publish_hash.as_bytes(), &publish_signature) {
                return None;
            }
        }
        Some(block)
    }

    /// A copy of every wire-visible field, dropping the (non-serialized,
    /// non-`Clone`) validator. Used by the broadcast pool to build a
    /// per-subscriber filtered copy without disturbing the original.
    pub fn clone_without_validator(&self) -> Block {
        Block {
            protocol_code: self.protocol_code,
            epoch: self.epoch,
            checkpoint_epoch: self.checkpoint_epoch,
            checkpoint_hash: self.checkpoint_hash,
            proposer: self.proposer,
            publisher: self.publisher,
            proposed_at: self.proposed_at,
            actions: self.actions.clone(),
            seal_hash: self.seal_hash,
            seal_signature: self.seal_signature,
            publish_hash: self.publish_hash,
            publish_signature: self.publish_signature,
            previous_committed_hash: self.previous_committed_hash,
            invalidate: self.invalidate.clone(),
            validator: None,
        }
    }

    /// Replays this block's actions against a fresh validator `v`.
    /// Actions `v.validate` rejects are recorded in `invalidate`; the
    /// block's validator is replaced with `v`. Runs whenever a block is
    /// committed against a checkpoint other than the immediately
    /// preceding committed epoch (spec.md §4.5).
    pub fn revalidate(&mut self, mut v: MutatingState) {
        let mut invalid = Vec::new();
        for action_bytes in &self.actions {
            if !v.validate(action_bytes) {
                invalid.push(hash_bytes(action_bytes));
            }
        }
        self.invalidate = invalid;
        self.validator = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactum_crypto::ZERO_HASH;

    fn sample_block(protocol_code: u32) -> (Block, PrivateKey, Option<PrivateKey>) {
        let proposer = PrivateKey::generate();
        let publisher_key = if protocol_code != 0 { Some(PrivateKey::generate()) } else { None };
        let publisher_token = publisher_key.as_ref().map(|k| k.public_key());
        let mut block = Block::new(protocol_code, 1, 0, ZERO_HASH, proposer.public_key(), publisher_token, ZERO_HASH);
        block.push_action(vec![1, 2, 3]);
        (block, proposer, publisher_key)
    }

    #[test]
    fn zero_protocol_seal_and_parse_round_trip() {
        let (mut block, proposer, _) = sample_block(0);
        block.seal(&proposer, 1234);
        let bytes = block.serialize();
        let parsed = Block::parse(&bytes).expect("parses");
        assert_eq!(parsed.epoch, 1);
        assert_eq!(parsed.actions.len(), 1);
        assert!(parsed.publisher.is_none());
    }

    #[test]
    fn nonzero_protocol_requires_publish_signature() {
        let (mut block, proposer, publisher) = sample_block(7);
        block.seal(&proposer, 1234);
        block.publish(publisher.as_ref().unwrap()).unwrap();
        let bytes = block.serialize();
        let parsed = Block::parse(&bytes).expect("parses");
        assert!(parsed.publish_hash.is_some());
    }

    #[test]
    fn tampering_with_an_action_breaks_the_seal_hash() {
        let (mut block, proposer, _) = sample_block(0);
        block.seal(&proposer, 1234);
        let mut bytes = block.serialize();
        // flip a byte inside the action-count/actions region
        bytes[60] ^= 0xFF;
        assert!(Block::parse(&bytes).is_none());
    }

    #[test]
    fn publish_rejects_zero_protocol() {
        let (mut block, proposer, _) = sample_block(0);
        block.seal(&proposer, 1234);
        assert!(matches!(block.publish(&proposer), Err(BlockError::PublishNotApplicable)));
    }

    #[test]
    fn publish_rejects_mismatched_key() {
        let (mut block, proposer, _) = sample_block(3);
        block.seal(&proposer, 1234);
        let impostor = PrivateKey::generate();
        assert!(matches!(block.publish(&impostor), Err(BlockError::PublisherMismatch)));
    }
}
