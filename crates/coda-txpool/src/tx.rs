//! Pool-internal transaction wrapper and the local account set.

use std::collections::HashSet;

use coda_crypto::keccak256;
use coda_primitives::{Address, H256, U256};
use coda_types::{encode_tx, SignedTransaction};

/// A transaction as tracked by the pool: the signed transaction together
/// with its recovered sender, its identity hash, and the price the pool
/// orders it by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PooledTransaction {
    /// The signed transaction
    pub tx: SignedTransaction,
    /// Recovered sender address
    pub sender: Address,
    /// Transaction hash over the canonical encoding
    pub hash: H256,
    /// Ordering price: the full gas price for fixed-price transactions,
    /// the maximum tip for dynamic fee ones
    gas_price: u128,
}

impl PooledTransaction {
    /// Wrap a signed transaction for pool tracking.
    ///
    /// The hash is derived from the canonical encoding, so a journaled
    /// transaction decodes back to the same identity.
    pub fn new(tx: SignedTransaction, sender: Address) -> Self {
        let hash = keccak256(&encode_tx(&tx));
        let gas_price = tx.effective_gas_price(0).unwrap_or_default();
        Self {
            tx,
            sender,
            hash,
            gas_price,
        }
    }

    /// Transaction nonce
    pub fn nonce(&self) -> u64 {
        self.tx.nonce()
    }

    /// Gas limit
    pub fn gas_limit(&self) -> u64 {
        self.tx.gas_limit()
    }

    /// Price used for pool ordering and replacement
    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    /// Transfer value in wei
    pub fn value(&self) -> u128 {
        self.tx.value()
    }

    /// Full debit required to admit the transaction:
    /// `gas_limit * fee_cap + value`.
    pub fn cost(&self) -> U256 {
        U256::from(self.gas_limit()) * U256::from(self.tx.fee_cap()) + U256::from(self.value())
    }
}

/// The set of accounts whose transactions are considered local and are
/// therefore exempt from price-based eviction.
#[derive(Clone, Debug, Default)]
pub struct LocalAccounts {
    accounts: HashSet<Address>,
}

impl LocalAccounts {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an address as local
    pub fn add(&mut self, addr: Address) {
        self.accounts.insert(addr);
    }

    /// Whether the address is tracked as local
    pub fn contains(&self, addr: &Address) -> bool {
        self.accounts.contains(addr)
    }

    /// Whether the transaction's sender is tracked as local
    pub fn contains_tx(&self, tx: &PooledTransaction) -> bool {
        self.contains(&tx.sender)
    }

    /// Number of tracked addresses
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no address is tracked
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coda_types::{DynamicFeeTx, LegacyTx, TxSignature};

    fn test_sig() -> TxSignature {
        TxSignature::new(27, H256::from_bytes([1u8; 32]), H256::from_bytes([2u8; 32]))
    }

    fn legacy_tx(nonce: u64, gas_price: u128) -> PooledTransaction {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                nonce,
                gas_price,
                gas_limit: 21_000,
                to: Some(Address::from_bytes([0x42; 20])),
                value: 100,
                data: Bytes::new(),
            },
            test_sig(),
        );
        PooledTransaction::new(tx, Address::from_bytes([0x11; 20]))
    }

    #[test]
    fn test_pooled_accessors() {
        let tx = legacy_tx(5, 1_000_000_000);
        assert_eq!(tx.nonce(), 5);
        assert_eq!(tx.gas_limit(), 21_000);
        assert_eq!(tx.gas_price(), 1_000_000_000);
        assert_eq!(tx.value(), 100);
    }

    #[test]
    fn test_cost_is_gas_times_price_plus_value() {
        let tx = legacy_tx(0, 10);
        assert_eq!(tx.cost(), U256::from(21_000u64 * 10 + 100));
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = legacy_tx(0, 10);
        let b = legacy_tx(0, 10);
        let c = legacy_tx(1, 10);
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_dynamic_fee_ordering_price_is_tip() {
        let tx = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 0,
                max_priority_fee_per_gas: 3,
                max_fee_per_gas: 100,
                gas_limit: 21_000,
                to: None,
                value: 0,
                data: Bytes::new(),
                access_list: vec![],
            },
            test_sig(),
        );
        let pooled = PooledTransaction::new(tx, Address::ZERO);
        assert_eq!(pooled.gas_price(), 3);
        // Cost is bounded by the fee cap, not the tip.
        assert_eq!(pooled.cost(), U256::from(21_000u64) * U256::from(100u64));
    }

    #[test]
    fn test_local_accounts() {
        let mut locals = LocalAccounts::new();
        assert!(locals.is_empty());

        let addr = Address::from_bytes([0x11; 20]);
        locals.add(addr);
        assert_eq!(locals.len(), 1);
        assert!(locals.contains(&addr));
        assert!(!locals.contains(&Address::from_bytes([0x22; 20])));

        let tx = legacy_tx(0, 10);
        assert!(locals.contains_tx(&tx));
    }
}
