// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ACTION CODEC (C3)
//
// Four signed action kinds, all sharing the `[0, kind]` envelope. Byte
// layout is canonical and stable: it feeds both the seal-hash of a block
// and the wire protocol's fixed-offset protocol-tag filter, so it must
// never be replaced by a derived serde format.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::codec::{put_bytes_u32, put_token, put_u32, put_u64, Cursor};
use pactum_crypto::{hash_token, CryptoError, Hash, PrivateKey, Signature, Token};

/// Void payloads are capped to keep an adversarial action from ballooning
/// a block; see the Open Questions resolution in SPEC_FULL.md §4.4.
pub const VOID_MAX_PAYLOAD: usize = 65_536;

pub const KIND_TRANSFER: u8 = 0;
pub const KIND_DEPOSIT: u8 = 1;
pub const KIND_WITHDRAW: u8 = 2;
pub const KIND_VOID: u8 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("malformed action bytes")]
    Malformed,
    #[error("void payload of {0} bytes exceeds the {VOID_MAX_PAYLOAD} byte cap")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Normalized effect of an action on the ledger: a set of debits and a
/// set of credits, each `(account_hash, value)`. Repeated accounts are
/// not pre-summed here — callers fold them into a `MutationSet`, which
/// sums naturally.
#[derive(Debug, Clone, Default)]
pub struct Payment {
    pub debit: Vec<(Hash, u64)>,
    pub credit: Vec<(Hash, u64)>,
    pub deposit_debit: Vec<(Hash, u64)>,
    pub deposit_credit: Vec<(Hash, u64)>,
}

pub trait Action: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> u8;
    fn epoch(&self) -> u64;
    fn fee_paid(&self) -> u64;
    fn payments(&self) -> Payment;
    fn tokens(&self) -> Vec<Token>;
    fn serialize(&self) -> Vec<u8>;
}

/// Parses a signed action, verifying its embedded signature and
/// rejecting any trailing bytes. Returns `None` on any failure — action
/// rejection at this layer is silent by design (spec.md §4.6 Failure
/// semantics: parse/verify failures are dropped, not surfaced).
pub fn parse_action(bytes: &[u8]) -> Option<Box<dyn Action>> {
    if bytes.len() < 2 || bytes[0] != 0 {
        return None;
    }
    match bytes[1] {
        KIND_TRANSFER => Transfer::parse(bytes).map(|a| Box::new(a) as Box<dyn Action>),
        KIND_DEPOSIT => Deposit::parse(bytes).map(|a| Box::new(a) as Box<dyn Action>),
        KIND_WITHDRAW => Withdraw::parse(bytes).map(|a| Box::new(a) as Box<dyn Action>),
        KIND_VOID => Void::parse(bytes).map(|a| Box::new(a) as Box<dyn Action>),
        _ => None,
    }
}

/// Signs `body` (everything before the trailing signature) and appends
/// the signature, producing the final wire bytes for an action.
fn sign_and_append(mut body: Vec<u8>, key: &PrivateKey) -> Vec<u8> {
    let sig = key.sign(&body);
    body.extend_from_slice(sig.as_bytes());
    body
}

// ───────────────────────────── Transfer ─────────────────────────────

#[derive(Debug, Clone)]
pub struct Transfer {
    pub timestamp: u64,
    pub from: Token,
    pub to: Vec<(Token, u64)>,
    pub reason: Vec<u8>,
    pub fee: u64,
    pub signature: Signature,
}

impl Transfer {
    pub fn new(timestamp: u64, from: Token, to: Vec<(Token, u64)>, reason: Vec<u8>, fee: u64) -> Self {
        Transfer {
            timestamp,
            from,
            to,
            reason,
            fee,
            signature: Signature::from_slice(&[0u8; 64]).unwrap(),
        }
    }

    fn body_without_signature(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0);
        out.push(KIND_TRANSFER);
        put_u64(self.timestamp, &mut out);
        put_token(&self.from, &mut out);
        put_u32(self.to.len() as u32, &mut out);
        for (to, value) in &self.to {
            put_token(to, &mut out);
            put_u64(*value, &mut out);
        }
        put_bytes_u32(&self.reason, &mut out);
        put_u64(self.fee, &mut out);
        out
    }

    pub fn sign(&mut self, key: &PrivateKey) {
        let body = self.body_without_signature();
        let bytes = sign_and_append(body, key);
        self.signature = Signature::from_slice(&bytes[bytes.len() - 64..]).unwrap();
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let mut c = Cursor::new(bytes);
        let envelope = c.take(2)?;
        if envelope[0] != 0 || envelope[1] != KIND_TRANSFER {
            return None;
        }
        let timestamp = c.u64()?;
        let from = c.token()?;
        let count = c.u32()?;
        let mut to = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let token = c.token()?;
            let value = c.u64()?;
            to.push((token, value));
        }
        let reason = c.bytes_u32()?.to_vec();
        let fee = c.u64()?;
        let signature = c.signature()?;
        if !c.is_exhausted() {
            return None;
        }
        let signed_len = bytes.len() - 64;
        if !from.verify(&bytes[..signed_len], &signature) {
            return None;
        }
        Some(Transfer { timestamp, from, to, reason, fee, signature })
    }
}

impl Action for Transfer {
    fn kind(&self) -> u8 {
        KIND_TRANSFER
    }

    fn epoch(&self) -> u64 {
        self.timestamp
    }

    fn fee_paid(&self) -> u64 {
        self.fee
    }

    fn payments(&self) -> Payment {
        let total: u64 = self.to.iter().map(|(_, v)| v).sum::<u64>() + self.fee;
        let mut payment = Payment::default();
        payment.debit.push((hash_token(&self.from), total));
        for (to, value) in &self.to {
            payment.credit.push((hash_token(to), *value));
        }
        payment
    }

    fn tokens(&self) -> Vec<Token> {
        let mut out = vec![self.from];
        out.extend(self.to.iter().map(|(t, _)| *t));
        out
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = self.body_without_signature();
        out.extend_from_slice(self.signature.as_bytes());
        out
    }
}

// ───────────────────────────── Deposit ─────────────────────────────

#[derive(Debug, Clone)]
pub struct Deposit {
    pub timestamp: u64,
    pub token: Token,
    pub value: u64,
    pub signature: Signature,
}

impl Deposit {
    pub fn new(timestamp: u64, token: Token, value: u64) -> Self {
        Deposit { timestamp, token, value, signature: Signature::from_slice(&[0u8; 64]).unwrap() }
    }

    fn body_without_signature(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0);
        out.push(KIND_DEPOSIT);
        put_u64(self.timestamp, &mut out);
        put_token(&self.token, &mut out);
        put_u64(self.value, &mut out);
        out
    }

    pub fn sign(&mut self, key: &PrivateKey) {
        let body = self.body_without_signature();
        let bytes = sign_and_append(body, key);
        self.signature = Signature::from_slice(&bytes[bytes.len() - 64..]).unwrap();
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let mut c = Cursor::new(bytes);
        let envelope = c.take(2)?;
        if envelope[0] != 0 || envelope[1] != KIND_DEPOSIT {
            return None;
        }
        let timestamp = c.u64()?;
        let token = c.token()?;
        let value = c.u64()?;
        let signature = c.signature()?;
        if !c.is_exhausted() {
            return None;
        }
        let signed_len = bytes.len() - 64;
        if !token.verify(&bytes[..signed_len], &signature) {
            return None;
        }
        Some(Deposit { timestamp, token, value, signature })
    }
}

impl Action for Deposit {
    fn kind(&self) -> u8 {
        KIND_DEPOSIT
    }

    fn epoch(&self) -> u64 {
        self.timestamp
    }

    fn fee_paid(&self) -> u64 {
        0
    }

    fn payments(&self) -> Payment {
        let h = hash_token(&self.token);
        Payment {
            debit: vec![(h, self.value)],
            credit: vec![],
            deposit_debit: vec![],
            deposit_credit: vec![(h, self.value)],
        }
    }

    fn tokens(&self) -> Vec<Token> {
        vec![self.token]
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = self.body_without_signature();
        out.extend_from_slice(self.signature.as_bytes());
        out
    }
}

// ───────────────────────────── Withdraw ─────────────────────────────

#[derive(Debug, Clone)]
pub struct Withdraw {
    pub timestamp: u64,
    pub token: Token,
    pub value: u64,
    pub signature: Signature,
}

impl Withdraw {
    pub fn new(timestamp: u64, token: Token, value: u64) -> Self {
        Withdraw { timestamp, token, value, signature: Signature::from_slice(&[0u8; 64]).unwrap() }
    }

    fn body_without_signature(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0);
        out.push(KIND_WITHDRAW);
        put_u64(self.timestamp, &mut out);
        put_token(&self.token, &mut out);
        put_u64(self.value, &mut out);
        out
    }

    pub fn sign(&mut self, key: &PrivateKey) {
        let body = self.body_without_signature();
        let bytes = sign_and_append(body, key);
        self.signature = Signature::from_slice(&bytes[bytes.len() - 64..]).unwrap();
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let mut c = Cursor::new(bytes);
        let envelope = c.take(2)?;
        if envelope[0] != 0 || envelope[1] != KIND_WITHDRAW {
            return None;
        }
        let timestamp = c.u64()?;
        let token = c.token()?;
        let value = c.u64()?;
        let signature = c.signature()?;
        if !c.is_exhausted() {
            return None;
        }
        let signed_len = bytes.len() - 64;
        if !token.verify(&bytes[..signed_len], &signature) {
            return None;
        }
        Some(Withdraw { timestamp, token, value, signature })
    }
}

impl Action for Withdraw {
    fn kind(&self) -> u8 {
        KIND_WITHDRAW
    }

    fn epoch(&self) -> u64 {
        self.timestamp
    }

    fn fee_paid(&self) -> u64 {
        0
    }

    fn payments(&self) -> Payment {
        let h = hash_token(&self.token);
        Payment {
            debit: vec![],
            credit: vec![(h, self.value)],
            deposit_debit: vec![(h, self.value)],
            deposit_credit: vec![],
        }
    }

    fn tokens(&self) -> Vec<Token> {
        vec![self.token]
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = self.body_without_signature();
        out.extend_from_slice(self.signature.as_bytes());
        out
    }
}

// ───────────────────────────── Void ─────────────────────────────

#[derive(Debug, Clone)]
pub struct Void {
    pub timestamp: u64,
    pub payload: Vec<u8>,
    pub wallet: Token,
    pub fee: u64,
    pub signature: Signature,
}

impl Void {
    /// Release-safe constructor: rejects an oversized payload instead of
    /// silently truncating it.
    pub fn new(timestamp: u64, payload: Vec<u8>, wallet: Token, fee: u64) -> Result<Self, ActionError> {
        if payload.len() > VOID_MAX_PAYLOAD {
            return Err(ActionError::PayloadTooLarge(payload.len()));
        }
        Ok(Void { timestamp, payload, wallet, fee, signature: Signature::from_slice(&[0u8; 64]).unwrap() })
    }

    fn body_without_signature(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0);
        out.push(KIND_VOID);
        put_u64(self.timestamp, &mut out);
        put_bytes_u32(&self.payload, &mut out);
        put_token(&self.wallet, &mut out);
        put_u64(self.fee, &mut out);
        out
    }

    pub fn sign(&mut self, key: &PrivateKey) {
        let body = self.body_without_signature();
        let bytes = sign_and_append(body, key);
        self.signature = Signature::from_slice(&bytes[bytes.len() - 64..]).unwrap();
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let mut c = Cursor::new(bytes);
        let envelope = c.take(2)?;
        if envelope[0] != 0 || envelope[1] != KIND_VOID {
            return None;
        }
        let timestamp = c.u64()?;
        let payload = c.bytes_u32()?;
        if payload.len() > VOID_MAX_PAYLOAD {
            return None;
        }
        let payload = payload.to_vec();
        let wallet = c.token()?;
        let fee = c.u64()?;
        let signature = c.signature()?;
        if !c.is_exhausted() {
            return None;
        }
        let signed_len = bytes.len() - 64;
        if !wallet.verify(&bytes[..signed_len], &signature) {
            return None;
        }
        Some(Void { timestamp, payload, wallet, fee, signature })
    }
}

impl Action for Void {
    fn kind(&self) -> u8 {
        KIND_VOID
    }

    fn epoch(&self) -> u64 {
        self.timestamp
    }

    fn fee_paid(&self) -> u64 {
        self.fee
    }

    fn payments(&self) -> Payment {
        Payment {
            debit: vec![(hash_token(&self.wallet), self.fee)],
            credit: vec![],
            deposit_debit: vec![],
            deposit_credit: vec![],
        }
    }

    fn tokens(&self) -> Vec<Token> {
        vec![self.wallet]
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = self.body_without_signature();
        out.extend_from_slice(self.signature.as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pactum_crypto::PrivateKey;

    fn key() -> PrivateKey {
        PrivateKey::generate()
    }

    #[test]
    fn transfer_round_trips_through_serialize_and_parse() {
        let k = key();
        let to_key = key();
        let mut t = Transfer::new(1, k.public_key(), vec![(to_key.public_key(), 100)], b"note".to_vec(), 5);
        t.sign(&k);
        let bytes = t.serialize();
        let parsed = parse_action(&bytes).expect("parses");
        assert_eq!(parsed.kind(), KIND_TRANSFER);
        assert_eq!(parsed.fee_paid(), 5);
        assert_eq!(parsed.epoch(), 1);
    }

    #[test]
    fn transfer_payments_debit_sums_value_and_fee() {
        let k = key();
        let to_key = key();
        let mut t = Transfer::new(1, k.public_key(), vec![(to_key.public_key(), 100)], vec![], 5);
        t.sign(&k);
        let payment = t.payments();
        assert_eq!(payment.debit, vec![(hash_token(&k.public_key()), 105)]);
        assert_eq!(payment.credit, vec![(hash_token(&to_key.public_key()), 100)]);
    }

    #[test]
    fn tampering_invalidates_signature() {
        let k = key();
        let to_key = key();
        let mut t = Transfer::new(1, k.public_key(), vec![(to_key.public_key(), 100)], vec![], 5);
        t.sign(&k);
        let mut bytes = t.serialize();
        let last = bytes.len() - 65;
        bytes[last] ^= 0xFF;
        assert!(parse_action(&bytes).is_none());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let k = key();
        let mut d = Deposit::new(1, k.public_key(), 10);
        d.sign(&k);
        let mut bytes = d.serialize();
        bytes.push(0);
        assert!(parse_action(&bytes).is_none());
    }

    #[test]
    fn deposit_credits_deposit_ledger_and_debits_wallet() {
        let k = key();
        let mut d = Deposit::new(1, k.public_key(), 50);
        d.sign(&k);
        let payment = d.payments();
        let h = hash_token(&k.public_key());
        assert_eq!(payment.debit, vec![(h, 50)]);
        assert_eq!(payment.deposit_credit, vec![(h, 50)]);
    }

    #[test]
    fn withdraw_is_inverse_of_deposit() {
        let k = key();
        let mut w = Withdraw::new(1, k.public_key(), 50);
        w.sign(&k);
        let payment = w.payments();
        let h = hash_token(&k.public_key());
        assert_eq!(payment.credit, vec![(h, 50)]);
        assert_eq!(payment.deposit_debit, vec![(h, 50)]);
    }

    #[test]
    fn void_rejects_oversized_payload_at_construction() {
        let k = key();
        let big = vec![0u8; VOID_MAX_PAYLOAD + 1];
        assert!(Void::new(1, big, k.public_key(), 1).is_err());
    }

    #[test]
    fn void_debits_fee_only() {
        let k = key();
        let mut v = Void::new(1, b"payload".to_vec(), k.public_key(), 3).unwrap();
        v.sign(&k);
        let payment = v.payments();
        assert_eq!(payment.debit, vec![(hash_token(&k.public_key()), 3)]);
        assert!(payment.credit.is_empty());
    }

    #[test]
    fn protocol_tag_offset_overlaps_the_token_prefix() {
        let k = key();
        let mut d = Deposit::new(1, k.public_key(), 10);
        d.sign(&k);
        let bytes = d.serialize();
        // envelope(2) + timestamp(8) places the token at byte 10, so the
        // fixed [9..13) tag window is the last timestamp byte followed by
        // the token's first three bytes.
        assert!(bytes.len() > 13);
        assert_eq!(bytes[10..13], k.public_key().as_bytes()[0..3]);
    }
}
