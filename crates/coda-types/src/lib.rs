//! # coda-types
//!
//! Transaction types for the Coda ledger and their canonical binary
//! encoding. The codec output is deterministic; a transaction's identity
//! is the Keccak-256 digest of its encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod transaction;

pub use codec::{decode_tx, encode_tx, CodecError};
pub use transaction::{
    AccessListItem, DynamicFeeTx, LegacyTx, SignedTransaction, TransactionBody, TxSignature,
    TxType,
};
