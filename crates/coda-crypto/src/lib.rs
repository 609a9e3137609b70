//! # coda-crypto
//!
//! Hashing for the Coda ledger. Transaction and block identities are
//! Keccak-256 digests of their canonical encodings.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::keccak256;
