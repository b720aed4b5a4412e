// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LIFECYCLE WIRE PROTOCOL (C7)
//
// Payload encoding for the eight node-to-node message kinds. Framing
// itself (4-byte length + payload + trailing 64-byte signature) is the
// transport's job, provided in `pactum-net`; this crate only encodes and
// decodes what goes inside that frame.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_core::codec::{put_bytes_u32, put_hash, put_hash_array, put_signature, put_token, put_u32, put_u64, Cursor};
use pactum_crypto::{Hash, Signature, Token};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed lifecycle message bytes")]
    Malformed,
    #[error("unknown message discriminant {0}")]
    UnknownKind(u8),
}

pub const KIND_ACTION: u8 = 0;
pub const KIND_NEXT_BLOCK: u8 = 1;
pub const KIND_SEAL_BLOCK: u8 = 2;
pub const KIND_COMMIT_BLOCK: u8 = 3;
pub const KIND_ROLLOVER_BLOCK: u8 = 4;
pub const KIND_SUBSCRIBE: u8 = 5;
pub const KIND_RECEIVE_TOKENS: u8 = 6;
pub const KIND_BLOCK_CACHE: u8 = 7;

/// Subscribing with this code matches every protocol tag.
pub const SUBSCRIBE_ALL: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleMessage {
    Action(Vec<u8>),
    NextBlock { epoch: u64, checkpoint: u64, checkpoint_hash: Hash, publisher: Option<Token> },
    SealBlock { proposed_at: u64, seal_hash: Hash, seal_signature: Signature },
    CommitBlock { epoch: u64, block_hash: Hash, parent_hash: Hash, invalidated: Vec<Hash> },
    RolloverBlock { epoch: u64 },
    Subscribe { protocol_code: [u8; 4], from_epoch: u64 },
    ReceiveTokens { tokens: Vec<Token>, from_epoch: u64, keep_alive: bool },
    BlockCache(Vec<u8>),
}

impl LifecycleMessage {
    pub fn kind(&self) -> u8 {
        match self {
            LifecycleMessage::Action(_) => KIND_ACTION,
            LifecycleMessage::NextBlock { .. } => KIND_NEXT_BLOCK,
            LifecycleMessage::SealBlock { .. } => KIND_SEAL_BLOCK,
            LifecycleMessage::CommitBlock { .. } => KIND_COMMIT_BLOCK,
            LifecycleMessage::RolloverBlock { .. } => KIND_ROLLOVER_BLOCK,
            LifecycleMessage::Subscribe { .. } => KIND_SUBSCRIBE,
            LifecycleMessage::ReceiveTokens { .. } => KIND_RECEIVE_TOKENS,
            LifecycleMessage::BlockCache(_) => KIND_BLOCK_CACHE,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![self.kind()];
        match self {
            LifecycleMessage::Action(bytes) => out.extend_from_slice(bytes),
            LifecycleMessage::NextBlock { epoch, checkpoint, checkpoint_hash, publisher } => {
                put_u64(*epoch, &mut out);
                put_u64(*checkpoint, &mut out);
                put_hash(checkpoint_hash, &mut out);
                match publisher {
                    Some(t) => {
                        out.push(1);
                        put_token(t, &mut out);
                    }
                    None => out.push(0),
                }
            }
            LifecycleMessage::SealBlock { proposed_at, seal_hash, seal_signature } => {
                put_u64(*proposed_at, &mut out);
                put_hash(seal_hash, &mut out);
                put_signature(seal_signature, &mut out);
            }
            LifecycleMessage::CommitBlock { epoch, block_hash, parent_hash, invalidated } => {
                put_u64(*epoch, &mut out);
                put_hash(block_hash, &mut out);
                put_hash(parent_hash, &mut out);
                put_hash_array(invalidated, &mut out);
            }
            LifecycleMessage::RolloverBlock { epoch } => put_u64(*epoch, &mut out),
            LifecycleMessage::Subscribe { protocol_code, from_epoch } => {
                out.extend_from_slice(protocol_code);
                put_u64(*from_epoch, &mut out);
            }
            LifecycleMessage::ReceiveTokens { tokens, from_epoch, keep_alive } => {
                put_u32(tokens.len() as u32, &mut out);
                for t in tokens {
                    put_token(t, &mut out);
                }
                put_u64(*from_epoch, &mut out);
                out.push(*keep_alive as u8);
            }
            LifecycleMessage::BlockCache(bytes) => put_bytes_u32(bytes, &mut out),
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<LifecycleMessage, WireError> {
        let (&kind, rest) = bytes.split_first().ok_or(WireError::Malformed)?;
        let mut c = Cursor::new(rest);
        let msg = match kind {
            KIND_ACTION => LifecycleMessage::Action(rest.to_vec()),
            KIND_NEXT_BLOCK => {
                let epoch = c.u64().ok_or(WireError::Malformed)?;
                let checkpoint = c.u64().ok_or(WireError::Malformed)?;
                let checkpoint_hash = c.hash().ok_or(WireError::Malformed)?;
                let has_publisher = c.take(1).ok_or(WireError::Malformed)?[0];
                let publisher = match has_publisher {
                    0 => None,
                    1 => Some(c.token().ok_or(WireError::Malformed)?),
                    _ => return Err(WireError::Malformed),
                };
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::NextBlock { epoch, checkpoint, checkpoint_hash, publisher }
            }
            KIND_SEAL_BLOCK => {
                let proposed_at = c.u64().ok_or(WireError::Malformed)?;
                let seal_hash = c.hash().ok_or(WireError::Malformed)?;
                let seal_signature = c.signature().ok_or(WireError::Malformed)?;
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::SealBlock { proposed_at, seal_hash, seal_signature }
            }
            KIND_COMMIT_BLOCK => {
                let epoch = c.u64().ok_or(WireError::Malformed)?;
                let block_hash = c.hash().ok_or(WireError::Malformed)?;
                let parent_hash = c.hash().ok_or(WireError::Malformed)?;
                let invalidated = c.hash_array().ok_or(WireError::Malformed)?;
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::CommitBlock { epoch, block_hash, parent_hash, invalidated }
            }
            KIND_ROLLOVER_BLOCK => {
                let epoch = c.u64().ok_or(WireError::Malformed)?;
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::RolloverBlock { epoch }
            }
            KIND_SUBSCRIBE => {
                let code_bytes = c.take(4).ok_or(WireError::Malformed)?;
                let protocol_code: [u8; 4] = code_bytes.try_into().map_err(|_| WireError::Malformed)?;
                let from_epoch = c.u64().ok_or(WireError::Malformed)?;
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::Subscribe { protocol_code, from_epoch }
            }
            KIND_RECEIVE_TOKENS => {
                let count = c.u32().ok_or(WireError::Malformed)?;
                let mut tokens = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    tokens.push(c.token().ok_or(WireError::Malformed)?);
                }
                let from_epoch = c.u64().ok_or(WireError::Malformed)?;
                let keep_alive_byte = c.take(1).ok_or(WireError::Malformed)?[0];
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::ReceiveTokens { tokens, from_epoch, keep_alive: keep_alive_byte != 0 }
            }
            KIND_BLOCK_CACHE => {
                let payload = c.bytes_u32().ok_or(WireError::Malformed)?.to_vec();
                if !c.is_exhausted() {
                    return Err(WireError::Malformed);
                }
                LifecycleMessage::BlockCache(payload)
            }
            other => return Err(WireError::UnknownKind(other)),
        };
        Ok(msg)
    }
}

/// Reads the four-byte protocol tag at a fixed offset inside a serialized
/// action — the envelope and timestamp prefix guarantee these bytes
/// exist once an action is at least 13 bytes long.
pub fn protocol_tag(action_bytes: &[u8]) -> Option<[u8; 4]> {
    action_bytes.get(9..13)?.try_into().ok()
}

/// A subscribe code matches a tag if, for each of its four bytes, the
/// byte is `255` (wildcard) or equals the tag's byte at that position.
pub fn subscribe_matches(code: [u8; 4], tag: [u8; 4]) -> bool {
    (0..4).all(|i| code[i] == 255 || code[i] == tag[i])
}
