//! Price-sorted view over the whole pool.
//!
//! [`PricedList`] keeps every pooled transaction in a min-price heap so
//! the cheapest can be found when the pool overflows. Entries are never
//! removed eagerly: the pool reports departures through [`PricedList::removed`]
//! and the heap drops stale entries lazily when they surface, rebuilding
//! itself once a quarter of it has gone stale.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use coda_primitives::H256;
use dashmap::DashMap;

use crate::tx::{LocalAccounts, PooledTransaction};

/// Shared read view of the pool's hash → transaction index. The pool
/// mutates it; the priced list only reads it to detect stale entries.
pub type TxLookup = Arc<DashMap<H256, Arc<PooledTransaction>>>;

/// Rebuild once more than `1 / STALE_RATIO` of the heap is stale.
const STALE_RATIO: usize = 4;

/// Heap entry ordered so the worst transaction pops first: lowest price,
/// and among equal prices the highest nonce.
struct PricedEntry(Arc<PooledTransaction>);

impl Ord for PricedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops its greatest entry, so cheaper must compare
        // greater, and on a price tie the higher nonce must.
        other
            .0
            .gas_price()
            .cmp(&self.0.gas_price())
            .then_with(|| self.0.nonce().cmp(&other.0.nonce()))
    }
}

impl PartialOrd for PricedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PricedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PricedEntry {}

/// Min-price heap over all pooled transactions with lazy deletion.
pub struct PricedList {
    /// The pool's authoritative hash → transaction index
    all: TxLookup,
    /// Price-ordered heap; may contain entries no longer in `all`
    items: BinaryHeap<PricedEntry>,
    /// Number of heap entries known to have left the pool
    stales: usize,
}

impl PricedList {
    /// Create an empty list reading liveness from `all`
    pub fn new(all: TxLookup) -> Self {
        Self {
            all,
            items: BinaryHeap::new(),
            stales: 0,
        }
    }

    /// Insert a new transaction into the heap. Callers add each
    /// transaction once; duplicates are not detected.
    pub fn put(&mut self, tx: Arc<PooledTransaction>) {
        self.items.push(PricedEntry(tx));
    }

    /// Note that a transaction left the pool. Once more than a quarter of
    /// the heap is stale the whole heap is rebuilt from the live set.
    pub fn removed(&mut self) {
        self.stales += 1;
        if self.stales <= self.items.len() / STALE_RATIO {
            return;
        }
        let mut rebuilt = BinaryHeap::with_capacity(self.all.len());
        for entry in self.all.iter() {
            rebuilt.push(PricedEntry(Arc::clone(entry.value())));
        }
        self.stales = 0;
        self.items = rebuilt;
    }

    /// Pop every remote transaction priced below `threshold` and return
    /// them for removal from the pool. Local transactions below the
    /// threshold stay in the heap; stale entries are dropped on the way.
    pub fn cap(&mut self, threshold: u128, locals: &LocalAccounts) -> Vec<Arc<PooledTransaction>> {
        let mut drop = Vec::new();
        let mut save = Vec::new();

        while let Some(PricedEntry(tx)) = self.items.pop() {
            if !self.all.contains_key(&tx.hash) {
                self.stales = self.stales.saturating_sub(1);
                continue;
            }
            // Reached the price floor, keep everything from here up.
            if tx.gas_price() >= threshold {
                save.push(tx);
                break;
            }
            if locals.contains_tx(&tx) {
                save.push(tx);
            } else {
                drop.push(tx);
            }
        }
        for tx in save {
            self.items.push(PricedEntry(tx));
        }
        drop
    }

    /// Whether the transaction is priced at or below the cheapest pooled
    /// transaction. Local transactions are never underpriced.
    pub fn underpriced(&mut self, tx: &PooledTransaction, locals: &LocalAccounts) -> bool {
        if locals.contains_tx(tx) {
            return false;
        }
        // Skim stale entries off the top before consulting the minimum.
        loop {
            let stale = match self.items.peek() {
                Some(PricedEntry(head)) => !self.all.contains_key(&head.hash),
                None => break,
            };
            if !stale {
                break;
            }
            self.items.pop();
            self.stales = self.stales.saturating_sub(1);
        }
        let Some(PricedEntry(cheapest)) = self.items.peek() else {
            // A well-behaved pool never price-checks against nothing.
            tracing::error!("pricing query for empty pool");
            return false;
        };
        cheapest.gas_price() >= tx.gas_price()
    }

    /// Pop the `count` cheapest remote transactions and return them for
    /// removal from the pool. Local transactions surfacing on the way are
    /// put back; stale entries are dropped.
    pub fn discard(&mut self, count: usize, locals: &LocalAccounts) -> Vec<Arc<PooledTransaction>> {
        let mut remaining = count;
        let mut drop = Vec::with_capacity(count);
        let mut save = Vec::new();

        while remaining > 0 {
            let Some(PricedEntry(tx)) = self.items.pop() else {
                break;
            };
            if !self.all.contains_key(&tx.hash) {
                self.stales = self.stales.saturating_sub(1);
                continue;
            }
            if locals.contains_tx(&tx) {
                save.push(tx);
            } else {
                drop.push(tx);
                remaining -= 1;
            }
        }
        for tx in save {
            self.items.push(PricedEntry(tx));
        }
        drop
    }

    /// Number of heap entries, stale ones included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
