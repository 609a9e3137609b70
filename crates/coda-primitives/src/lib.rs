//! # coda-primitives
//!
//! Fundamental data types shared across the Coda ledger: fixed-size
//! addresses and hashes, plus the wide integer used for balance math.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod hash;

pub use address::{Address, AddressError};
pub use hash::{HashError, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

/// Transaction nonce type
pub type Nonce = u64;

/// Gas type
pub type Gas = u64;
