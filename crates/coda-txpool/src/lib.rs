//! # coda-txpool
//!
//! Core data structures of the Coda pending-transaction pool.
//!
//! This crate provides:
//! - Per-account nonce-sorted transaction queues
//! - Fee-bump transaction replacement
//! - Executable vs. future queue semantics
//! - A pool-wide price index for cheapest-first eviction
//! - A rotating on-disk journal for local transactions
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------+
//! |  AccountList (per sender)|  <- nonce ordering, replacement,
//! |    +- TxSortedMap        |     strict-mode invalidation
//! +--------------------------+
//! +--------------------------+
//! |  PricedList (pool-wide)  |  <- cheapest-first eviction,
//! |    reads hash -> tx map  |     lazy stale deletion
//! +--------------------------+
//! +--------------------------+
//! |  TxJournal (on disk)     |  <- replay on startup, rotation
//! +--------------------------+
//! ```
//!
//! The enclosing pool owns one [`AccountList`] per sender plus the
//! singleton [`PricedList`] and [`TxJournal`], and serializes all access
//! under its own lock; nothing in this crate synchronizes internally.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod journal;
mod list;
mod priced;
mod tx;

use std::path::PathBuf;

pub use error::{TxPoolError, TxPoolResult};
pub use journal::TxJournal;
pub use list::{AccountList, TxSortedMap};
pub use priced::{PricedList, TxLookup};
pub use tx::{LocalAccounts, PooledTransaction};

/// Pool configuration knobs consumed by the queue and journal layers.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum price increase, in percent, for a transaction to replace
    /// one already queued under the same nonce
    pub price_bump: u64,
    /// Path of the local transaction journal; `None` disables journaling
    pub journal_path: Option<PathBuf>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            price_bump: 10,
            journal_path: None,
        }
    }
}
