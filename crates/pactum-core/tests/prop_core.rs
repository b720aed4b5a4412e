// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — pactum-core
//
// Verifies ledger and validator invariants hold for arbitrary transfer
// amounts and balances: credit/debit conservation, insufficient-balance
// rejection, mutation-layer composition, and action serialize/parse
// round trips.
//
// ZERO production code changes — integration test file only.
// Run: cargo test --release -p pactum-core --test prop_core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_core::{parse_action, Action, MemoryLedger, MutationSet, Transfer, WalletLedger};
use pactum_crypto::{hash_token, PrivateKey};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────
// LEDGER PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: crediting then debiting the same value returns the ledger to its prior balance
    #[test]
    fn prop_credit_then_debit_is_identity(initial in 0u64..1_000_000, delta in 0u64..1_000_000) {
        let ledger = MemoryLedger::new();
        let h = pactum_crypto::hash_bytes(b"account");
        ledger.credit(h, initial).unwrap();
        ledger.credit(h, delta).unwrap();
        ledger.debit(h, delta).unwrap();
        prop_assert_eq!(ledger.balance(h), initial);
    }

    /// PROPERTY: debiting more than the balance always fails and never changes it
    #[test]
    fn prop_debit_above_balance_fails_and_is_noop(balance in 0u64..10_000, overdraw in 1u64..1_000) {
        let ledger = MemoryLedger::new();
        let h = pactum_crypto::hash_bytes(b"account");
        ledger.credit(h, balance).unwrap();
        let attempt = balance.checked_add(overdraw).unwrap();
        prop_assert!(ledger.debit(h, attempt).is_err());
        prop_assert_eq!(ledger.balance(h), balance);
    }

    /// PROPERTY: balance after a sequence of credits equals their sum
    #[test]
    fn prop_credits_sum(values in proptest::collection::vec(0u64..10_000, 0..20)) {
        let ledger = MemoryLedger::new();
        let h = pactum_crypto::hash_bytes(b"account");
        let mut expected: u64 = 0;
        for v in &values {
            ledger.credit(h, *v).unwrap();
            expected += v;
        }
        prop_assert_eq!(ledger.balance(h), expected);
    }
}

// ─────────────────────────────────────────────────────────────────
// MUTATION SET PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: composing layers is commutative over a shared account
    #[test]
    fn prop_compose_is_commutative(deltas in proptest::collection::vec(-10_000i64..10_000, 1..10)) {
        let h = pactum_crypto::hash_bytes(b"shared");
        let forward: Vec<MutationSet> = deltas.iter().map(|d| {
            let mut m = MutationSet::new();
            m.add_wallet_delta(h, *d);
            m
        }).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let forward_refs: Vec<&MutationSet> = forward.iter().collect();
        let reversed_refs: Vec<&MutationSet> = reversed.iter().collect();

        let sum_forward = MutationSet::compose(&forward_refs).delta_balance(&h);
        let sum_reversed = MutationSet::compose(&reversed_refs).delta_balance(&h);
        prop_assert_eq!(sum_forward, sum_reversed);
        prop_assert_eq!(sum_forward, deltas.iter().sum::<i64>());
    }

    /// PROPERTY: an account untouched by any layer has a zero delta
    #[test]
    fn prop_untouched_account_has_zero_delta(delta in -1_000i64..1_000) {
        let h_touched = pactum_crypto::hash_bytes(b"touched");
        let h_untouched = pactum_crypto::hash_bytes(b"untouched");
        let mut layer = MutationSet::new();
        layer.add_wallet_delta(h_touched, delta);
        let merged = MutationSet::compose(&[&layer]);
        prop_assert_eq!(merged.delta_balance(&h_untouched), 0);
    }
}

// ─────────────────────────────────────────────────────────────────
// ACTION ROUND-TRIP PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: a signed transfer always serializes and parses back to an equivalent action
    #[test]
    fn prop_transfer_roundtrip(value in 1u64..1_000_000, fee in 0u64..1_000, reason in proptest::collection::vec(any::<u8>(), 0..64)) {
        let from = PrivateKey::generate();
        let to = PrivateKey::generate();
        let mut t = Transfer::new(1, from.public_key(), vec![(to.public_key(), value)], reason, fee);
        t.sign(&from);
        let bytes = t.serialize();
        let parsed = parse_action(&bytes).expect("well-formed transfer parses");
        prop_assert_eq!(parsed.kind(), t.kind());
        prop_assert_eq!(parsed.fee_paid(), fee);
        let payment = parsed.payments();
        prop_assert_eq!(payment.debit, vec![(hash_token(&from.public_key()), value + fee)]);
    }

    /// PROPERTY: flipping any byte of a serialized transfer is rejected by parse_action
    #[test]
    fn prop_transfer_bitflip_rejected(value in 1u64..1_000, flip_idx in 0usize..512) {
        let from = PrivateKey::generate();
        let to = PrivateKey::generate();
        let mut t = Transfer::new(1, from.public_key(), vec![(to.public_key(), value)], vec![], 0);
        t.sign(&from);
        let mut bytes = t.serialize();
        let idx = flip_idx % bytes.len();
        bytes[idx] ^= 0x01;
        // A flipped byte either breaks the envelope/lengths (rejected while
        // parsing) or survives parsing but fails signature verification —
        // either way parse_action must return None.
        prop_assert!(parse_action(&bytes).is_none());
    }
}
