// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VALIDATOR (C4)
//
// Speculative, layered validation against a base ledger. Accepted actions
// accumulate as deltas in `mutations` rather than touching the ledger —
// the ledger is only ever mutated by `incorporate`, once a block commits.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::action::parse_action;
use crate::ledger::{LedgerError, WalletLedger};
use crate::mutation::MutationSet;
use pactum_crypto::Hash;
use std::sync::Arc;

/// Window, in epochs, an action may lag behind the validator's current
/// epoch before being rejected as stale.
pub const MAX_EPOCH_DIFFERENCE: u64 = 100;

pub struct MutatingState {
    base: Arc<dyn WalletLedger>,
    deposits: Arc<dyn WalletLedger>,
    pub mutations: MutationSet,
    pub epoch: u64,
}

impl MutatingState {
    pub fn new(base: Arc<dyn WalletLedger>, deposits: Arc<dyn WalletLedger>, epoch: u64) -> Self {
        MutatingState { base, deposits, mutations: MutationSet::new(), epoch }
    }

    /// Builds a validator view seeded with the composition of ancestor
    /// layers (sealed-but-uncommitted blocks between the commit point and
    /// the checkpoint this validator speculates from).
    pub fn with_layers(base: Arc<dyn WalletLedger>, deposits: Arc<dyn WalletLedger>, epoch: u64, layers: &[&MutationSet]) -> Self {
        MutatingState { base, deposits, mutations: MutationSet::compose(layers), epoch }
    }

    fn wallet_balance(&self, h: &Hash) -> i64 {
        self.base.balance(*h) as i64 + self.mutations.delta_balance(h)
    }

    fn deposit_balance(&self, h: &Hash) -> i64 {
        self.deposits.balance(*h) as i64 + self.mutations.delta_deposit(h)
    }

    /// Implements spec.md §4.4 steps 1-5. Returns `false` without mutating
    /// state on any failure — the caller silently drops the action.
    pub fn validate(&mut self, bytes: &[u8]) -> bool {
        let action = match parse_action(bytes) {
            Some(a) => a,
            None => return false,
        };

        if action.epoch() > self.epoch {
            return false;
        }
        if self.epoch - action.epoch() > MAX_EPOCH_DIFFERENCE {
            return false;
        }

        let payment = action.payments();
        for (h, value) in &payment.debit {
            if self.wallet_balance(h) < *value as i64 {
                return false;
            }
        }
        for (h, value) in &payment.deposit_debit {
            if self.deposit_balance(h) < *value as i64 {
                return false;
            }
        }

        for (h, value) in &payment.debit {
            self.mutations.debit_wallet(*h, *value);
        }
        for (h, value) in &payment.credit {
            self.mutations.credit_wallet(*h, *value);
        }
        for (h, value) in &payment.deposit_debit {
            self.mutations.debit_deposit(*h, *value);
        }
        for (h, value) in &payment.deposit_credit {
            self.mutations.credit_deposit(*h, *value);
        }
        self.mutations.fees_collected += action.fee_paid();
        true
    }

    /// Folds `fees_collected` into the proposer's wallet delta, then
    /// applies `delta_wallets`/`delta_deposits` as credits/debits on the
    /// base ledgers. Consumes `self` — a committed validator is spent.
    pub fn incorporate(mut self, proposer: Hash) -> Result<(), LedgerError> {
        if self.mutations.fees_collected > 0 {
            self.mutations.credit_wallet(proposer, self.mutations.fees_collected);
        }

        for (h, delta) in self.mutations.delta_wallets.clone() {
            apply_delta(self.base.as_ref(), h, delta)?;
        }
        for (h, delta) in self.mutations.delta_deposits.clone() {
            apply_delta(self.deposits.as_ref(), h, delta)?;
        }
        Ok(())
    }
}

fn apply_delta(ledger: &dyn WalletLedger, h: Hash, delta: i64) -> Result<(), LedgerError> {
    if delta > 0 {
        ledger.credit(h, delta as u64)
    } else if delta < 0 {
        ledger.debit(h, (-delta) as u64)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Deposit, Transfer};
    use crate::ledger::MemoryLedger;
    use pactum_crypto::{hash_token, PrivateKey};

    fn setup(balance: u64) -> (Arc<dyn WalletLedger>, Arc<dyn WalletLedger>, PrivateKey) {
        let base: Arc<dyn WalletLedger> = Arc::new(MemoryLedger::new());
        let deposits: Arc<dyn WalletLedger> = Arc::new(MemoryLedger::new());
        let key = PrivateKey::generate();
        base.credit(hash_token(&key.public_key()), balance).unwrap();
        (base, deposits, key)
    }

    #[test]
    fn accepts_a_valid_transfer_within_balance() {
        let (base, deposits, key) = setup(1000);
        let to = PrivateKey::generate();
        let mut state = MutatingState::new(base.clone(), deposits, 1);
        let mut t = Transfer::new(1, key.public_key(), vec![(to.public_key(), 100)], vec![], 0);
        t.sign(&key);
        assert!(state.validate(&t.serialize()));
        assert_eq!(state.mutations.delta_balance(&hash_token(&key.public_key())), -100);
        assert_eq!(state.mutations.delta_balance(&hash_token(&to.public_key())), 100);
    }

    #[test]
    fn rejects_insufficient_balance() {
        let (base, deposits, key) = setup(10);
        let to = PrivateKey::generate();
        let mut state = MutatingState::new(base, deposits, 1);
        let mut t = Transfer::new(1, key.public_key(), vec![(to.public_key(), 100)], vec![], 0);
        t.sign(&key);
        assert!(!state.validate(&t.serialize()));
    }

    #[test]
    fn rejects_epoch_too_far_in_future() {
        let (base, deposits, key) = setup(1000);
        let to = PrivateKey::generate();
        let mut state = MutatingState::new(base, deposits, 1);
        let mut t = Transfer::new(5, key.public_key(), vec![(to.public_key(), 1)], vec![], 0);
        t.sign(&key);
        assert!(!state.validate(&t.serialize()));
    }

    #[test]
    fn rejects_epoch_too_far_in_past() {
        let (base, deposits, key) = setup(1000);
        let to = PrivateKey::generate();
        let mut state = MutatingState::new(base, deposits, 200);
        let mut t = Transfer::new(1, key.public_key(), vec![(to.public_key(), 1)], vec![], 0);
        t.sign(&key);
        assert!(!state.validate(&t.serialize()));
    }

    #[test]
    fn incorporate_applies_deltas_and_folds_fees_into_proposer() {
        let (base, deposits, key) = setup(1000);
        let to = PrivateKey::generate();
        let proposer = PrivateKey::generate();
        let mut state = MutatingState::new(base.clone(), deposits, 1);
        let mut t = Transfer::new(1, key.public_key(), vec![(to.public_key(), 100)], vec![], 5);
        t.sign(&key);
        assert!(state.validate(&t.serialize()));

        let proposer_hash = hash_token(&proposer.public_key());
        state.incorporate(proposer_hash).unwrap();

        assert_eq!(base.balance(hash_token(&key.public_key())), 895);
        assert_eq!(base.balance(hash_token(&to.public_key())), 100);
        assert_eq!(base.balance(proposer_hash), 5);
    }

    #[test]
    fn deposit_moves_value_between_wallet_and_deposit_ledgers() {
        let (base, deposits, key) = setup(1000);
        let proposer = PrivateKey::generate();
        let mut state = MutatingState::new(base.clone(), deposits.clone(), 1);
        let mut d = Deposit::new(1, key.public_key(), 200);
        d.sign(&key);
        assert!(state.validate(&d.serialize()));
        state.incorporate(hash_token(&proposer.public_key())).unwrap();

        assert_eq!(base.balance(hash_token(&key.public_key())), 800);
        assert_eq!(deposits.balance(hash_token(&key.public_key())), 200);
    }
}
