//! Transaction types for the Coda ledger

use bytes::Bytes;
use coda_primitives::{Address, H256};

/// Transaction type identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TxType {
    /// Fixed gas price transaction
    #[default]
    Legacy = 0,
    /// Dynamic fee transaction (base fee + priority tip)
    DynamicFee = 2,
}

/// Fixed-price transaction (Type 0)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyTx {
    /// Transaction nonce
    pub nonce: u64,
    /// Gas price in wei
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Value to transfer in wei
    pub value: u128,
    /// Input data
    pub data: Bytes,
}

/// Dynamic fee transaction (Type 2)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicFeeTx {
    /// Chain ID
    pub chain_id: u64,
    /// Transaction nonce
    pub nonce: u64,
    /// Max priority fee per gas (tip)
    pub max_priority_fee_per_gas: u128,
    /// Max fee per gas
    pub max_fee_per_gas: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Value to transfer in wei
    pub value: u128,
    /// Input data
    pub data: Bytes,
    /// Access list
    pub access_list: Vec<AccessListItem>,
}

/// Access list item (address + storage keys)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessListItem {
    /// Account address
    pub address: Address,
    /// Storage keys
    pub storage_keys: Vec<H256>,
}

/// Signature components
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxSignature {
    /// Recovery ID (v value)
    pub v: u64,
    /// R component
    pub r: H256,
    /// S component
    pub s: H256,
}

impl TxSignature {
    /// Create a new signature
    pub fn new(v: u64, r: H256, s: H256) -> Self {
        Self { v, r, s }
    }

    /// Check that the signature components are non-zero
    pub fn is_valid(&self) -> bool {
        !self.r.is_zero() && !self.s.is_zero()
    }
}

/// Transaction body (unsigned)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionBody {
    /// Fixed-price transaction
    Legacy(LegacyTx),
    /// Dynamic fee transaction
    DynamicFee(DynamicFeeTx),
}

/// A signed transaction. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Transaction type
    pub tx_type: TxType,
    /// Transaction body
    pub tx: TransactionBody,
    /// Signature
    pub signature: TxSignature,
}

impl SignedTransaction {
    /// Create a new signed fixed-price transaction
    pub fn new_legacy(tx: LegacyTx, signature: TxSignature) -> Self {
        Self {
            tx_type: TxType::Legacy,
            tx: TransactionBody::Legacy(tx),
            signature,
        }
    }

    /// Create a new signed dynamic fee transaction
    pub fn new_dynamic_fee(tx: DynamicFeeTx, signature: TxSignature) -> Self {
        Self {
            tx_type: TxType::DynamicFee,
            tx: TransactionBody::DynamicFee(tx),
            signature,
        }
    }

    /// Get transaction nonce
    pub fn nonce(&self) -> u64 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.nonce,
            TransactionBody::DynamicFee(tx) => tx.nonce,
        }
    }

    /// Get gas limit
    pub fn gas_limit(&self) -> u64 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.gas_limit,
            TransactionBody::DynamicFee(tx) => tx.gas_limit,
        }
    }

    /// Get recipient address
    pub fn to(&self) -> Option<&Address> {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.to.as_ref(),
            TransactionBody::DynamicFee(tx) => tx.to.as_ref(),
        }
    }

    /// Get transfer value
    pub fn value(&self) -> u128 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.value,
            TransactionBody::DynamicFee(tx) => tx.value,
        }
    }

    /// Get input data
    pub fn data(&self) -> &Bytes {
        match &self.tx {
            TransactionBody::Legacy(tx) => &tx.data,
            TransactionBody::DynamicFee(tx) => &tx.data,
        }
    }

    /// Whether this transaction creates a contract
    pub fn is_contract_creation(&self) -> bool {
        self.to().is_none()
    }

    /// Maximum gas price this transaction can be charged
    pub fn fee_cap(&self) -> u128 {
        match &self.tx {
            TransactionBody::Legacy(tx) => tx.gas_price,
            TransactionBody::DynamicFee(tx) => tx.max_fee_per_gas,
        }
    }

    /// Effective gas price for the given base fee.
    ///
    /// Returns `None` when `base_fee > max_fee_per_gas` for a dynamic fee
    /// transaction, since it cannot be included at that base fee.
    pub fn effective_gas_price(&self, base_fee: u128) -> Option<u128> {
        match &self.tx {
            TransactionBody::Legacy(tx) => Some(tx.gas_price),
            TransactionBody::DynamicFee(tx) => {
                if base_fee > tx.max_fee_per_gas {
                    return None;
                }
                let tip = tx.max_priority_fee_per_gas.min(tx.max_fee_per_gas - base_fee);
                Some(base_fee + tip)
            }
        }
    }
}

impl Default for LegacyTx {
    fn default() -> Self {
        Self {
            nonce: 0,
            gas_price: 0,
            gas_limit: 21000,
            to: None,
            value: 0,
            data: Bytes::new(),
        }
    }
}
