//! Per-account transaction queues.
//!
//! [`TxSortedMap`] is a nonce → transaction map with a heap index so the
//! contents can be walked in nonce order without keeping them sorted.
//! [`AccountList`] wraps one map per account and layers on the fee-bump
//! replacement rule, strict-mode invalidation, and the cost/gas caps that
//! let balance sweeps skip accounts that cannot be affected.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use coda_primitives::U256;

use crate::tx::PooledTransaction;

/// A nonce-indexed map of one account's transactions with a heap based
/// index for cheap ascending iteration and prefix removal.
#[derive(Debug, Default)]
pub struct TxSortedMap {
    /// Transaction per nonce
    items: HashMap<u64, Arc<PooledTransaction>>,
    /// Min-heap over the nonces present in `items`
    index: BinaryHeap<Reverse<u64>>,
    /// Ascending-by-nonce view of `items`, kept until a structural change
    /// other than pure prefix or suffix removal
    cache: Option<Vec<Arc<PooledTransaction>>>,
}

impl TxSortedMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve the transaction stored under the given nonce
    pub fn get(&self, nonce: u64) -> Option<&Arc<PooledTransaction>> {
        self.items.get(&nonce)
    }

    /// Insert a transaction, overwriting any previous one with the same
    /// nonce. The nonce index is only touched when the nonce is new.
    pub fn put(&mut self, tx: Arc<PooledTransaction>) {
        let nonce = tx.nonce();
        if !self.items.contains_key(&nonce) {
            self.index.push(Reverse(nonce));
        }
        self.items.insert(nonce, tx);
        self.cache = None;
    }

    /// Remove every transaction with a nonce below `threshold` and return
    /// them in ascending nonce order.
    pub fn forward(&mut self, threshold: u64) -> Vec<Arc<PooledTransaction>> {
        let mut removed = Vec::new();

        while let Some(&Reverse(nonce)) = self.index.peek() {
            if nonce >= threshold {
                break;
            }
            self.index.pop();
            if let Some(tx) = self.items.remove(&nonce) {
                removed.push(tx);
            }
        }
        // The removed run is exactly the front of the cached ordering.
        if let Some(cache) = &mut self.cache {
            cache.drain(..removed.len());
        }
        removed
    }

    /// Remove and return every transaction the predicate selects.
    ///
    /// Iteration order is arbitrary; when anything was removed the heap is
    /// rebuilt from the surviving nonces and the cache is dropped.
    pub fn filter<F>(&mut self, predicate: F) -> Vec<Arc<PooledTransaction>>
    where
        F: Fn(&PooledTransaction) -> bool,
    {
        let mut removed = Vec::new();
        self.items.retain(|_, tx| {
            if predicate(tx) {
                removed.push(Arc::clone(tx));
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.index = self.items.keys().map(|&nonce| Reverse(nonce)).collect();
            self.cache = None;
        }
        removed
    }

    /// Bound the number of stored transactions, dropping the highest
    /// nonces first. Dropped transactions are returned in ascending nonce
    /// order so callers see deterministic output.
    pub fn cap(&mut self, limit: usize) -> Vec<Arc<PooledTransaction>> {
        if self.items.len() <= limit {
            return Vec::new();
        }
        let mut nonces: Vec<u64> = self.items.keys().copied().collect();
        nonces.sort_unstable();

        let mut dropped = Vec::with_capacity(nonces.len() - limit);
        for nonce in nonces.split_off(limit) {
            if let Some(tx) = self.items.remove(&nonce) {
                dropped.push(tx);
            }
        }
        self.index = nonces.into_iter().map(Reverse).collect();
        // The dropped run is exactly the back of the cached ordering.
        if let Some(cache) = &mut self.cache {
            cache.truncate(cache.len() - dropped.len());
        }
        dropped
    }

    /// Delete the transaction stored under `nonce`, reporting whether one
    /// was present.
    pub fn remove(&mut self, nonce: u64) -> bool {
        if self.items.remove(&nonce).is_none() {
            return false;
        }
        self.index.retain(|&Reverse(n)| n != nonce);
        self.cache = None;
        true
    }

    /// Pop the contiguous run of transactions starting at `start` and
    /// return it in nonce order. Stops at the first gap.
    ///
    /// When the smallest stored nonce is below `start` the run begins
    /// there instead, so a list that somehow fell behind drains itself
    /// rather than wedging.
    pub fn ready(&mut self, start: u64) -> Vec<Arc<PooledTransaction>> {
        let mut next = match self.index.peek() {
            Some(&Reverse(min)) if min <= start => min,
            _ => return Vec::new(),
        };
        let mut ready = Vec::new();
        while let Some(&Reverse(nonce)) = self.index.peek() {
            if nonce != next {
                break;
            }
            self.index.pop();
            if let Some(tx) = self.items.remove(&nonce) {
                ready.push(tx);
            }
            next += 1;
        }
        self.cache = None;
        ready
    }

    /// Number of stored transactions
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the map holds no transactions
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ascending-by-nonce copy of the contents. The ordering is cached
    /// until the next structural change.
    pub fn flatten(&mut self) -> Vec<Arc<PooledTransaction>> {
        let items = &self.items;
        self.cache
            .get_or_insert_with(|| {
                let mut txs: Vec<_> = items.values().cloned().collect();
                txs.sort_unstable_by_key(|tx| tx.nonce());
                txs
            })
            .clone()
    }
}

#[cfg(test)]
impl TxSortedMap {
    /// The heap must mirror the key set exactly, and the cache, when
    /// present, must equal the contents sorted by ascending nonce.
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.items.len(), self.index.len());
        let mut heap_nonces: Vec<u64> = self.index.iter().map(|&Reverse(n)| n).collect();
        heap_nonces.sort_unstable();
        let mut item_nonces: Vec<u64> = self.items.keys().copied().collect();
        item_nonces.sort_unstable();
        assert_eq!(heap_nonces, item_nonces);

        if let Some(cache) = &self.cache {
            let cached: Vec<u64> = cache.iter().map(|tx| tx.nonce()).collect();
            assert_eq!(cached, item_nonces);
        }
    }
}

/// One account's transactions, nonce sorted.
///
/// The same type backs both queues of the pool: with `strict` set it
/// holds the executable queue, where nonces are contiguous and removing
/// one invalidates everything after it; without it holds the future
/// queue, where gaps are expected.
#[derive(Debug)]
pub struct AccountList {
    /// Whether nonces must stay contiguous
    strict: bool,
    /// The queued transactions
    txs: TxSortedMap,

    /// Upper bound on the cost of any stored transaction. Raised on
    /// insert, lowered only by a filter with a smaller threshold.
    costcap: U256,
    /// Upper bound on the gas limit of any stored transaction
    gascap: u64,
}

impl AccountList {
    /// Create an empty list; `strict` selects executable-queue semantics
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            txs: TxSortedMap::new(),
            costcap: U256::zero(),
            gascap: 0,
        }
    }

    /// Whether a transaction with the same nonce is already stored
    pub fn overlaps(&self, tx: &PooledTransaction) -> bool {
        self.txs.get(tx.nonce()).is_some()
    }

    /// Try to insert a transaction, returning whether it was accepted and
    /// the transaction it replaced, if any.
    ///
    /// An occupied nonce is only surrendered when the newcomer beats the
    /// incumbent's price by at least `price_bump` percent.
    pub fn add(
        &mut self,
        tx: Arc<PooledTransaction>,
        price_bump: u64,
    ) -> (bool, Option<Arc<PooledTransaction>>) {
        let old = self.txs.get(tx.nonce()).cloned();
        if let Some(old) = &old {
            let threshold =
                U256::from(old.gas_price()) * U256::from(100 + price_bump) / U256::from(100u64);
            // Both checks are needed: the strict price comparison covers a
            // zero bump and wei-level prices where truncation would let an
            // equal price through the percentage test.
            if old.gas_price() >= tx.gas_price() || U256::from(tx.gas_price()) < threshold {
                return (false, None);
            }
        }
        let cost = tx.cost();
        let gas = tx.gas_limit();
        self.txs.put(tx);
        if cost > self.costcap {
            self.costcap = cost;
        }
        if gas > self.gascap {
            self.gascap = gas;
        }
        (true, old)
    }

    /// Remove every transaction with a nonce below `threshold`
    pub fn forward(&mut self, threshold: u64) -> Vec<Arc<PooledTransaction>> {
        self.txs.forward(threshold)
    }

    /// Remove every transaction whose cost exceeds `cost_limit` or whose
    /// gas limit exceeds `gas_limit`.
    ///
    /// Returns the removed transactions and, in strict mode, the
    /// transactions invalidated by coming after a removed nonce. The
    /// cached caps make the common no-op case a pair of comparisons.
    pub fn filter(
        &mut self,
        cost_limit: U256,
        gas_limit: u64,
    ) -> (Vec<Arc<PooledTransaction>>, Vec<Arc<PooledTransaction>>) {
        if self.costcap <= cost_limit && self.gascap <= gas_limit {
            return (Vec::new(), Vec::new());
        }
        // Lower the caps to the thresholds; inserts will raise them again.
        self.costcap = cost_limit;
        self.gascap = gas_limit;

        let removed = self
            .txs
            .filter(|tx| tx.cost() > cost_limit || tx.gas_limit() > gas_limit);

        let mut invalidated = Vec::new();
        if self.strict && !removed.is_empty() {
            let lowest = removed
                .iter()
                .map(|tx| tx.nonce())
                .min()
                .unwrap_or(u64::MAX);
            invalidated = self.txs.filter(|tx| tx.nonce() > lowest);
        }
        (removed, invalidated)
    }

    /// Bound the number of stored transactions, dropping highest nonces
    pub fn cap(&mut self, limit: usize) -> Vec<Arc<PooledTransaction>> {
        self.txs.cap(limit)
    }

    /// Delete the given transaction from the list, reporting whether it
    /// was found. In strict mode every transaction after the removed
    /// nonce is returned as invalidated.
    pub fn remove(
        &mut self,
        tx: &PooledTransaction,
    ) -> (bool, Vec<Arc<PooledTransaction>>) {
        let nonce = tx.nonce();
        if !self.txs.remove(nonce) {
            return (false, Vec::new());
        }
        if self.strict {
            return (true, self.txs.filter(|tx| tx.nonce() > nonce));
        }
        (true, Vec::new())
    }

    /// Pop the contiguous run of transactions starting at `start`
    pub fn ready(&mut self, start: u64) -> Vec<Arc<PooledTransaction>> {
        self.txs.ready(start)
    }

    /// Number of stored transactions
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the list holds no transactions
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Ascending-by-nonce copy of the contents
    pub fn flatten(&mut self) -> Vec<Arc<PooledTransaction>> {
        self.txs.flatten()
    }
}
