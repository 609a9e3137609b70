//! Canonical binary encoding for transactions.
//!
//! The encoding is deterministic: the same transaction always encodes to
//! the same bytes, so the Keccak-256 digest of the encoding can serve as
//! the transaction identity. Integers are little-endian; variable-length
//! parts carry a u32 length prefix; optional fields carry a flag byte.

use crate::transaction::{
    AccessListItem, DynamicFeeTx, LegacyTx, SignedTransaction, TransactionBody, TxSignature,
};
use bytes::Bytes;
use coda_primitives::{Address, H256};
use thiserror::Error;

/// Transaction decoding error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the record was complete
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// Unknown transaction type tag
    #[error("unknown transaction type: {0}")]
    UnknownTxType(u8),
    /// Invalid optional-field flag byte
    #[error("invalid flag byte: {0}")]
    InvalidFlag(u8),
}

/// Encode a signed transaction to its canonical byte form.
pub fn encode_tx(tx: &SignedTransaction) -> Vec<u8> {
    let mut buf = Vec::new();
    match &tx.tx {
        TransactionBody::Legacy(body) => {
            buf.push(0);
            buf.extend_from_slice(&body.nonce.to_le_bytes());
            buf.extend_from_slice(&body.gas_price.to_le_bytes());
            buf.extend_from_slice(&body.gas_limit.to_le_bytes());
            encode_to(&mut buf, body.to.as_ref());
            buf.extend_from_slice(&body.value.to_le_bytes());
            encode_bytes(&mut buf, &body.data);
        }
        TransactionBody::DynamicFee(body) => {
            buf.push(2);
            buf.extend_from_slice(&body.chain_id.to_le_bytes());
            buf.extend_from_slice(&body.nonce.to_le_bytes());
            buf.extend_from_slice(&body.max_priority_fee_per_gas.to_le_bytes());
            buf.extend_from_slice(&body.max_fee_per_gas.to_le_bytes());
            buf.extend_from_slice(&body.gas_limit.to_le_bytes());
            encode_to(&mut buf, body.to.as_ref());
            buf.extend_from_slice(&body.value.to_le_bytes());
            encode_bytes(&mut buf, &body.data);
            buf.extend_from_slice(&(body.access_list.len() as u32).to_le_bytes());
            for item in &body.access_list {
                buf.extend_from_slice(item.address.as_bytes());
                buf.extend_from_slice(&(item.storage_keys.len() as u32).to_le_bytes());
                for key in &item.storage_keys {
                    buf.extend_from_slice(key.as_bytes());
                }
            }
        }
    }
    buf.extend_from_slice(&tx.signature.v.to_le_bytes());
    buf.extend_from_slice(tx.signature.r.as_bytes());
    buf.extend_from_slice(tx.signature.s.as_bytes());
    buf
}

/// Decode a signed transaction from the front of `bytes`.
///
/// Returns the transaction and the number of bytes consumed.
pub fn decode_tx(bytes: &[u8]) -> Result<(SignedTransaction, usize), CodecError> {
    let mut r = Reader::new(bytes);

    let tag = r.u8()?;
    let tx = match tag {
        0 => {
            let nonce = r.u64()?;
            let gas_price = r.u128()?;
            let gas_limit = r.u64()?;
            let to = decode_to(&mut r)?;
            let value = r.u128()?;
            let data = decode_bytes(&mut r)?;
            let signature = decode_signature(&mut r)?;
            SignedTransaction::new_legacy(
                LegacyTx {
                    nonce,
                    gas_price,
                    gas_limit,
                    to,
                    value,
                    data,
                },
                signature,
            )
        }
        2 => {
            let chain_id = r.u64()?;
            let nonce = r.u64()?;
            let max_priority_fee_per_gas = r.u128()?;
            let max_fee_per_gas = r.u128()?;
            let gas_limit = r.u64()?;
            let to = decode_to(&mut r)?;
            let value = r.u128()?;
            let data = decode_bytes(&mut r)?;
            let item_count = r.u32()? as usize;
            let mut access_list = Vec::with_capacity(item_count.min(1024));
            for _ in 0..item_count {
                let address = Address::from_bytes(r.array()?);
                let key_count = r.u32()? as usize;
                let mut storage_keys = Vec::with_capacity(key_count.min(1024));
                for _ in 0..key_count {
                    storage_keys.push(H256::from_bytes(r.array()?));
                }
                access_list.push(AccessListItem {
                    address,
                    storage_keys,
                });
            }
            let signature = decode_signature(&mut r)?;
            SignedTransaction::new_dynamic_fee(
                DynamicFeeTx {
                    chain_id,
                    nonce,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    gas_limit,
                    to,
                    value,
                    data,
                    access_list,
                },
                signature,
            )
        }
        other => return Err(CodecError::UnknownTxType(other)),
    };
    Ok((tx, r.pos))
}

fn encode_to(buf: &mut Vec<u8>, to: Option<&Address>) {
    if let Some(addr) = to {
        buf.push(1);
        buf.extend_from_slice(addr.as_bytes());
    } else {
        buf.push(0);
    }
}

fn encode_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

fn decode_to(r: &mut Reader<'_>) -> Result<Option<Address>, CodecError> {
    match r.u8()? {
        0 => Ok(None),
        1 => Ok(Some(Address::from_bytes(r.array()?))),
        flag => Err(CodecError::InvalidFlag(flag)),
    }
}

fn decode_bytes(r: &mut Reader<'_>) -> Result<Bytes, CodecError> {
    let len = r.u32()? as usize;
    Ok(Bytes::copy_from_slice(r.take(len)?))
}

fn decode_signature(r: &mut Reader<'_>) -> Result<TxSignature, CodecError> {
    let v = r.u64()?;
    let sig_r = H256::from_bytes(r.array()?);
    let sig_s = H256::from_bytes(r.array()?);
    Ok(TxSignature::new(v, sig_r, sig_s))
}

/// Bounds-checked cursor over an input slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::UnexpectedEnd);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn u128(&mut self) -> Result<u128, CodecError> {
        Ok(u128::from_le_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sig() -> TxSignature {
        TxSignature::new(27, H256::from_bytes([1u8; 32]), H256::from_bytes([2u8; 32]))
    }

    #[test]
    fn test_legacy_roundtrip() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                nonce: 42,
                gas_price: 20_000_000_000,
                gas_limit: 100_000,
                to: Some(Address::from_bytes([0x42; 20])),
                value: 1_000_000_000_000_000_000,
                data: Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]),
            },
            test_sig(),
        );
        let encoded = encode_tx(&tx);
        let (decoded, consumed) = decode_tx(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_contract_creation_roundtrip() {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                to: None,
                ..Default::default()
            },
            test_sig(),
        );
        let encoded = encode_tx(&tx);
        let (decoded, _) = decode_tx(&encoded).unwrap();
        assert!(decoded.is_contract_creation());
    }

    #[test]
    fn test_dynamic_fee_roundtrip() {
        let tx = SignedTransaction::new_dynamic_fee(
            DynamicFeeTx {
                chain_id: 1,
                nonce: 7,
                max_priority_fee_per_gas: 2_000_000_000,
                max_fee_per_gas: 100_000_000_000,
                gas_limit: 21_000,
                to: Some(Address::from_bytes([0x11; 20])),
                value: 500,
                data: Bytes::new(),
                access_list: vec![AccessListItem {
                    address: Address::from_bytes([0x22; 20]),
                    storage_keys: vec![H256::from_bytes([0x33; 32])],
                }],
            },
            test_sig(),
        );
        let encoded = encode_tx(&tx);
        let (decoded, consumed) = decode_tx(&encoded).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let tx = SignedTransaction::new_legacy(LegacyTx::default(), test_sig());
        assert_eq!(encode_tx(&tx), encode_tx(&tx));
    }

    #[test]
    fn test_decode_truncated() {
        let tx = SignedTransaction::new_legacy(LegacyTx::default(), test_sig());
        let encoded = encode_tx(&tx);
        let result = decode_tx(&encoded[..encoded.len() - 1]);
        assert_eq!(result, Err(CodecError::UnexpectedEnd));
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode_tx(&[9, 0, 0, 0]);
        assert_eq!(result, Err(CodecError::UnknownTxType(9)));
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode_tx(&[]), Err(CodecError::UnexpectedEnd));
    }

    #[test]
    fn test_decode_invalid_to_flag() {
        let tx = SignedTransaction::new_legacy(LegacyTx::default(), test_sig());
        let mut encoded = encode_tx(&tx);
        // The `to` flag byte sits after tag + nonce + gas_price + gas_limit.
        encoded[1 + 8 + 16 + 8] = 7;
        assert_eq!(decode_tx(&encoded), Err(CodecError::InvalidFlag(7)));
    }

    #[test]
    fn test_decode_consumes_exact_length() {
        let tx = SignedTransaction::new_legacy(LegacyTx::default(), test_sig());
        let mut encoded = encode_tx(&tx);
        let record_len = encoded.len();
        // Trailing bytes belong to the next record and must be left alone.
        encoded.extend_from_slice(&[0xde, 0xad]);
        let (_, consumed) = decode_tx(&encoded).unwrap();
        assert_eq!(consumed, record_len);
    }
}
