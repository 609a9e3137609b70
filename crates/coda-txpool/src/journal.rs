//! Rotating on-disk journal of local transactions.
//!
//! Locally submitted transactions must survive a node restart, so every
//! one of them is appended to a journal file as it enters the pool. On
//! startup the journal is replayed back into the pool, then rewritten
//! from the live set to shed everything that was included or dropped in
//! the meantime.
//!
//! A record is a u32 length prefix followed by the sender address and
//! the transaction's canonical encoding. Rotation writes the replacement
//! to `<path>.new` and renames it over the live file, so a crash at any
//! point leaves either the old or the new journal intact.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coda_primitives::Address;
use coda_types::{decode_tx, encode_tx, CodecError};

use crate::error::{TxPoolError, TxPoolResult};
use crate::tx::PooledTransaction;

/// Number of replayed transactions handed to the pool per batch.
const LOAD_BATCH: usize = 1024;

/// Where journal appends currently go.
enum JournalSink {
    /// The live journal file
    File(File),
    /// Discards everything written to it. Installed while the journal is
    /// being replayed, so the inserts the pool issues on re-admission do
    /// not append back to the file being read.
    Null,
}

/// A rotating log of local transactions.
pub struct TxJournal {
    /// Filesystem path of the live journal
    path: PathBuf,
    /// Active output sink; `None` until the first rotation
    writer: Option<JournalSink>,
}

impl TxJournal {
    /// Create a journal for the given path. No file is touched until
    /// [`TxJournal::load`] or [`TxJournal::rotate`] is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    /// Replay the journal into the pool through `add`.
    ///
    /// Transactions are decoded one record at a time and handed over in
    /// batches. `add` receives the journal itself so re-entrant
    /// [`TxJournal::insert`] calls are possible; they are swallowed while
    /// the replay runs. A decode failure is reported only after every
    /// cleanly decoded transaction before it has been handed to `add`.
    pub fn load<F>(&mut self, mut add: F) -> TxPoolResult<()>
    where
        F: FnMut(&mut TxJournal, Vec<PooledTransaction>) -> Vec<TxPoolResult<()>>,
    {
        // Nothing journaled yet is not an error.
        if !self.path.exists() {
            return Ok(());
        }
        let input = File::open(&self.path)?;
        let mut reader = BufReader::new(input);

        self.writer = Some(JournalSink::Null);

        let mut total = 0usize;
        let mut dropped = 0usize;
        let mut batch: Vec<PooledTransaction> = Vec::new();
        let mut failure = None;

        loop {
            match read_record(&mut reader) {
                Ok(Some(tx)) => {
                    total += 1;
                    batch.push(tx);
                    if batch.len() > LOAD_BATCH {
                        count_drops(add(self, std::mem::take(&mut batch)), &mut dropped);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if !batch.is_empty() {
            count_drops(add(self, batch), &mut dropped);
        }
        self.writer = None;

        tracing::info!(transactions = total, dropped, "loaded local transaction journal");

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Append a transaction to the journal.
    pub fn insert(&mut self, tx: &PooledTransaction) -> TxPoolResult<()> {
        match &mut self.writer {
            None => Err(TxPoolError::NoActiveJournal),
            Some(JournalSink::Null) => Ok(()),
            Some(JournalSink::File(file)) => {
                file.write_all(&encode_record(tx))?;
                Ok(())
            }
        }
    }

    /// Rewrite the journal from the pool's current local transactions and
    /// reopen it for appending.
    pub fn rotate(
        &mut self,
        all: &HashMap<Address, Vec<Arc<PooledTransaction>>>,
    ) -> TxPoolResult<()> {
        // Close the current journal if any is open.
        self.close()?;

        let staging = staging_path(&self.path);
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o755);
        }
        let mut replacement = opts.open(&staging)?;

        let mut journaled = 0usize;
        for txs in all.values() {
            for tx in txs {
                replacement.write_all(&encode_record(tx))?;
            }
            journaled += txs.len();
        }
        drop(replacement);

        // The replacement is complete; swap it in atomically and reopen
        // it as the append target.
        fs::rename(&staging, &self.path)?;
        let sink = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = Some(JournalSink::File(sink));

        tracing::info!(
            transactions = journaled,
            accounts = all.len(),
            "regenerated local transaction journal"
        );
        Ok(())
    }

    /// Stop journaling and close the file.
    pub fn close(&mut self) -> TxPoolResult<()> {
        self.writer = None;
        Ok(())
    }
}

/// Serialize one journal record: length prefix, sender, transaction.
fn encode_record(tx: &PooledTransaction) -> Vec<u8> {
    let encoded = encode_tx(&tx.tx);
    let len = Address::LEN + encoded.len();
    let mut record = Vec::with_capacity(4 + len);
    record.extend_from_slice(&(len as u32).to_le_bytes());
    record.extend_from_slice(tx.sender.as_bytes());
    record.extend_from_slice(&encoded);
    record
}

/// Read one record, `Ok(None)` on a clean end of stream.
fn read_record(reader: &mut impl Read) -> TxPoolResult<Option<PooledTransaction>> {
    let len = match read_length_prefix(reader)? {
        Some(len) => len as usize,
        None => return Ok(None),
    };
    if len < Address::LEN {
        return Err(TxPoolError::Decode(CodecError::UnexpectedEnd));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let mut sender = [0u8; Address::LEN];
    sender.copy_from_slice(&payload[..Address::LEN]);
    let (tx, consumed) = decode_tx(&payload[Address::LEN..])?;
    if consumed != len - Address::LEN {
        return Err(TxPoolError::RecordMismatch {
            expected: len - Address::LEN,
            got: consumed,
        });
    }
    Ok(Some(PooledTransaction::new(tx, Address::from_bytes(sender))))
}

/// Read the 4 byte length prefix. End of stream before the first byte is
/// the normal termination; after it the record is truncated.
fn read_length_prefix(reader: &mut impl Read) -> TxPoolResult<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TxPoolError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "journal record header truncated",
            )));
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(buf)))
}

fn count_drops(results: Vec<TxPoolResult<()>>, dropped: &mut usize) {
    for result in results {
        if let Err(err) = result {
            tracing::debug!(error = %err, "failed to add journaled transaction");
            *dropped += 1;
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".new");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use coda_primitives::H256;
    use coda_types::{LegacyTx, SignedTransaction, TxSignature};

    fn create_test_tx(sender: u8, nonce: u64, gas_price: u128) -> Arc<PooledTransaction> {
        let tx = SignedTransaction::new_legacy(
            LegacyTx {
                nonce,
                gas_price,
                gas_limit: 21_000,
                to: Some(Address::from_bytes([0x42; 20])),
                value: 7,
                data: Bytes::from(vec![0x01, 0x02, 0x03]),
            },
            TxSignature::new(27, H256::from_bytes([1u8; 32]), H256::from_bytes([2u8; 32])),
        );
        Arc::new(PooledTransaction::new(tx, Address::from_bytes([sender; 20])))
    }

    fn journal_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("transactions.cdj")
    }

    /// Load everything in the journal into a flat list.
    fn load_all(journal: &mut TxJournal) -> (TxPoolResult<()>, Vec<PooledTransaction>) {
        let mut loaded = Vec::new();
        let result = journal.load(|_, batch| {
            let oks = batch.iter().map(|_| Ok(())).collect();
            loaded.extend(batch);
            oks
        });
        (result, loaded)
    }

    #[test]
    fn test_load_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TxJournal::new(journal_path(&dir));

        let mut called = false;
        let result = journal.load(|_, _| {
            called = true;
            Vec::new()
        });
        assert!(result.is_ok());
        assert!(!called);
    }

    #[test]
    fn test_insert_without_writer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = TxJournal::new(journal_path(&dir));

        let result = journal.insert(&create_test_tx(0x11, 0, 100));
        assert!(matches!(result, Err(TxPoolError::NoActiveJournal)));
    }

    #[test]
    fn test_rotate_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let sender_a = Address::from_bytes([0x11; 20]);
        let sender_b = Address::from_bytes([0x22; 20]);
        let mut all = HashMap::new();
        all.insert(
            sender_a,
            vec![create_test_tx(0x11, 0, 100), create_test_tx(0x11, 1, 200)],
        );
        all.insert(sender_b, vec![create_test_tx(0x22, 5, 300)]);

        let mut journal = TxJournal::new(&path);
        journal.rotate(&all).unwrap();

        // The journal is open for appending after rotation.
        let extra = create_test_tx(0x33, 9, 400);
        journal.insert(&extra).unwrap();
        journal.close().unwrap();

        let mut reloaded = TxJournal::new(&path);
        let (result, loaded) = load_all(&mut reloaded);
        assert!(result.is_ok());
        assert_eq!(loaded.len(), 4);

        let mut expected: Vec<H256> = all
            .values()
            .flatten()
            .map(|tx| tx.hash)
            .chain(std::iter::once(extra.hash))
            .collect();
        let mut got: Vec<H256> = loaded.iter().map(|tx| tx.hash).collect();
        expected.sort_unstable_by_key(|h| *h.as_bytes());
        got.sort_unstable_by_key(|h| *h.as_bytes());
        assert_eq!(got, expected);

        // Senders and contents round-trip, not just identities.
        let replayed = loaded.iter().find(|tx| tx.nonce() == 9).unwrap();
        assert_eq!(replayed.sender, Address::from_bytes([0x33; 20]));
        assert_eq!(replayed.gas_price(), 400);
    }

    #[test]
    fn test_rotate_drops_replaced_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let sender = Address::from_bytes([0x11; 20]);
        let mut journal = TxJournal::new(&path);
        let mut all = HashMap::new();
        all.insert(sender, vec![create_test_tx(0x11, 0, 100)]);
        journal.rotate(&all).unwrap();

        // A second rotation with a different live set replaces the file.
        let mut all = HashMap::new();
        all.insert(sender, vec![create_test_tx(0x11, 7, 700)]);
        journal.rotate(&all).unwrap();
        journal.close().unwrap();

        let (result, loaded) = load_all(&mut TxJournal::new(&path));
        assert!(result.is_ok());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].nonce(), 7);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_insert_during_load_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let sender = Address::from_bytes([0x11; 20]);
        let mut all = HashMap::new();
        all.insert(sender, vec![create_test_tx(0x11, 0, 100)]);

        let mut journal = TxJournal::new(&path);
        journal.rotate(&all).unwrap();
        journal.close().unwrap();

        let mut journal = TxJournal::new(&path);
        let result = journal.load(|journal, batch| {
            // Re-inserting while replaying must succeed without growing
            // the file being read.
            batch.iter().map(|tx| journal.insert(tx)).collect()
        });
        assert!(result.is_ok());

        let (result, loaded) = load_all(&mut TxJournal::new(&path));
        assert!(result.is_ok());
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_load_truncated_record_flushes_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let good = create_test_tx(0x11, 0, 100);
        let mut bytes = encode_record(&good);
        // A record header announcing more payload than the file holds.
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[0xab; 10]);
        fs::write(&path, bytes).unwrap();

        let (result, loaded) = load_all(&mut TxJournal::new(&path));
        assert!(matches!(result, Err(TxPoolError::Io(_))));
        // The cleanly decoded prefix was still handed over.
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, good.hash);
    }

    #[test]
    fn test_load_corrupt_record_flushes_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let good = create_test_tx(0x11, 0, 100);
        let mut bytes = encode_record(&good);
        // Well-formed framing around an undecodable payload.
        let garbage = [0xffu8; 30];
        bytes.extend_from_slice(&(garbage.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&garbage);
        fs::write(&path, bytes).unwrap();

        let (result, loaded) = load_all(&mut TxJournal::new(&path));
        assert!(matches!(result, Err(TxPoolError::Decode(_))));
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_load_batches_large_journals() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let sender = Address::from_bytes([0x11; 20]);
        let txs: Vec<_> = (0u64..1030)
            .map(|nonce| create_test_tx(0x11, nonce, 100))
            .collect();
        let mut all = HashMap::new();
        all.insert(sender, txs);

        let mut journal = TxJournal::new(&path);
        journal.rotate(&all).unwrap();
        journal.close().unwrap();

        let mut batches = Vec::new();
        let result = TxJournal::new(&path).load(|_, batch| {
            let oks = batch.iter().map(|_| Ok(())).collect();
            batches.push(batch.len());
            oks
        });
        assert!(result.is_ok());
        assert_eq!(batches.iter().sum::<usize>(), 1030);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], LOAD_BATCH + 1);
    }

    #[test]
    fn test_load_counts_rejected_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let sender = Address::from_bytes([0x11; 20]);
        let mut all = HashMap::new();
        all.insert(
            sender,
            vec![create_test_tx(0x11, 0, 100), create_test_tx(0x11, 1, 200)],
        );
        let mut journal = TxJournal::new(&path);
        journal.rotate(&all).unwrap();
        journal.close().unwrap();

        // A rejecting pool does not fail the load itself.
        let result = TxJournal::new(&path).load(|_, batch| {
            batch
                .iter()
                .map(|_| Err(TxPoolError::NoActiveJournal))
                .collect()
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_close_stops_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = journal_path(&dir);

        let mut journal = TxJournal::new(&path);
        journal.rotate(&HashMap::new()).unwrap();
        journal.insert(&create_test_tx(0x11, 0, 100)).unwrap();
        journal.close().unwrap();

        let result = journal.insert(&create_test_tx(0x11, 1, 100));
        assert!(matches!(result, Err(TxPoolError::NoActiveJournal)));
    }
}
