use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use provdag_block::Tier;
use provdag_types::Digest;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SyncMode;
use crate::error::{StoreError, StoreResult};

/// One atomic write.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [4 bytes: CRC32 of the previous 8 header bytes (little-endian u32)]
/// [N bytes: payload (bincode-serialized WalRecord)]
/// ```
/// Record bodies are kept in their encoded form so the tables can hand them
/// back without re-encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalRecord {
    /// A data block plus its index keys and carried transactions.
    Block {
        hash: Digest,
        height: u64,
        weight: u64,
        prev_hashes: Vec<Digest>,
        supply_chain_type: String,
        timestamp: i64,
        block: Vec<u8>,
        transactions: Vec<(Digest, Vec<u8>)>,
    },
    /// A standalone transaction.
    Transaction { hash: Digest, txn: Vec<u8> },
    /// An aggregation or checkpoint block; `references` are folded by it.
    Summary {
        hash: Digest,
        tier: Tier,
        timestamp: i64,
        references: Vec<Digest>,
        summary: Vec<u8>,
    },
}

impl WalRecord {
    pub fn hash(&self) -> Digest {
        match self {
            Self::Block { hash, .. } | Self::Transaction { hash, .. } | Self::Summary { hash, .. } => {
                *hash
            }
        }
    }
}

/// Header size: 4 bytes length + 4 bytes payload CRC + 4 bytes header CRC.
const HEADER_SIZE: usize = 12;

fn encode_header(length: u32, payload_crc: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&length.to_le_bytes());
    header[4..8].copy_from_slice(&payload_crc.to_le_bytes());
    let check = crc32fast::hash(&header[..8]);
    header[8..].copy_from_slice(&check.to_le_bytes());
    header
}

/// Parse `(payload length, payload CRC)` from a header, or `None` if the
/// header fails its own checksum.
fn decode_header(header: &[u8]) -> Option<(usize, u32)> {
    if header.len() < HEADER_SIZE {
        return None;
    }
    let word = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
    if crc32fast::hash(&header[..8]) != word(8) || word(0) == 0 {
        return None;
    }
    Some((word(0) as usize, word(4)))
}

/// Result of replaying a log file.
#[derive(Debug, Default)]
pub struct Recovery {
    pub records: Vec<WalRecord>,
    /// Entries dropped for a CRC mismatch or an undecodable payload, plus
    /// one per damaged region that had to be scanned past.
    pub skipped: usize,
    /// Where the next entry goes. Anything after it is either a torn final
    /// frame or the damaged suffix named by `damaged_from`.
    pub valid_len: u64,
    /// Start of a trailing region in which no valid frame could be found.
    pub damaged_from: Option<u64>,
}

/// Append-only, crash-recoverable log of [`WalRecord`]s.
///
/// Not internally synchronized; the store serializes access through its
/// writer lock.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    sync_mode: SyncMode,
}

impl WriteAheadLog {
    /// Open (or create) the log at `path`, replay it, and cut off any torn
    /// tail so new entries follow the last valid one.
    ///
    /// A damaged suffix is copied to a side file (see
    /// [`WriteAheadLog::damaged_path`]) before it is cut; only an incomplete
    /// final frame is dropped outright.
    pub fn open(path: &Path, sync_mode: SyncMode) -> StoreResult<(Self, Recovery)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let recovery = Self::replay(path)?;
        let file_len = file.metadata()?.len();
        if let Some(start) = recovery.damaged_from {
            let aside = Self::damaged_path(path, start);
            let bytes = fs::read(path)?;
            let suffix = usize::try_from(start)
                .ok()
                .and_then(|at| bytes.get(at..))
                .unwrap_or(&[]);
            fs::write(&aside, suffix)?;
            warn!(
                path = %path.display(),
                aside = %aside.display(),
                offset = start,
                bytes = suffix.len(),
                "moved damaged WAL suffix aside"
            );
        }
        if recovery.valid_len < file_len {
            warn!(
                path = %path.display(),
                valid = recovery.valid_len,
                file_len,
                "truncating WAL tail"
            );
            file.set_len(recovery.valid_len)?;
        }

        debug!(
            records = recovery.records.len(),
            skipped = recovery.skipped,
            "WAL replay complete"
        );
        let wal = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset: recovery.valid_len,
            sync_mode,
        };
        Ok((wal, recovery))
    }

    /// Append one record. Returns the byte offset of the entry.
    ///
    /// On failure the file is cut back to its previous length, so a failed
    /// append leaves no partial entry behind.
    pub fn append(&mut self, record: &WalRecord) -> StoreResult<u64> {
        let payload = bincode::serialize(record).map_err(|e| StoreError::Serialization {
            id: record.hash(),
            reason: e.to_string(),
        })?;
        let length = u32::try_from(payload.len()).map_err(|_| StoreError::TransactionAborted {
            reason: format!("record of {} bytes exceeds the frame limit", payload.len()),
        })?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&encode_header(length, crc32fast::hash(&payload)));
        frame.extend_from_slice(&payload);

        let entry_offset = self.offset;
        if let Err(e) = self.write_frame(&frame) {
            warn!(offset = entry_offset, error = %e, "WAL append failed; rolling back");
            self.rollback()?;
            return Err(StoreError::TransactionAborted {
                reason: e.to_string(),
            });
        }
        self.offset += frame.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "WAL append");
        Ok(entry_offset)
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()?;
        if matches!(self.sync_mode, SyncMode::EveryWrite) {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        // Swap first: dropping the old writer may still flush buffered bytes.
        self.writer = BufWriter::new(file);
        self.writer.get_ref().set_len(self.offset)?;
        Ok(())
    }

    /// Read every valid record from the log at `path`.
    ///
    /// Entries failing the payload CRC or decode are skipped and counted. A
    /// header failing its own CRC starts a damaged region: replay scans
    /// forward byte by byte to the next valid header and carries on from
    /// there. An intact header whose payload runs past the end of the file is
    /// a torn final frame and ends the replay.
    pub fn replay(path: &Path) -> StoreResult<Recovery> {
        let data = fs::read(path)?;
        let mut recovery = Recovery::default();
        let mut offset = 0usize;
        let mut damaged: Option<usize> = None;

        while offset + HEADER_SIZE <= data.len() {
            let Some((length, expected_crc)) = decode_header(&data[offset..offset + HEADER_SIZE])
            else {
                if damaged.is_none() {
                    warn!(offset, "damaged WAL frame header; scanning for the next frame");
                    damaged = Some(offset);
                }
                offset += 1;
                continue;
            };

            let end = offset + HEADER_SIZE + length;
            if end > data.len() {
                break;
            }
            if let Some(start) = damaged.take() {
                warn!(start, resumed = offset, bytes = offset - start, "skipped damaged WAL region");
                recovery.skipped += 1;
            }

            let entry = offset;
            let payload = &data[offset + HEADER_SIZE..end];
            offset = end;

            let actual_crc = crc32fast::hash(payload);
            if actual_crc != expected_crc {
                warn!(
                    offset = entry,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping WAL entry"
                );
                recovery.skipped += 1;
                continue;
            }
            match bincode::deserialize::<WalRecord>(payload) {
                Ok(record) => recovery.records.push(record),
                Err(e) => {
                    warn!(offset = entry, error = %e, "undecodable WAL entry; skipping");
                    recovery.skipped += 1;
                }
            }
        }

        match damaged {
            Some(start) => {
                recovery.skipped += 1;
                recovery.damaged_from = Some(start as u64);
                recovery.valid_len = start as u64;
            }
            None => recovery.valid_len = offset as u64,
        }
        Ok(recovery)
    }

    /// Side file that keeps a damaged suffix cut from `path` at `offset`.
    pub fn damaged_path(path: &Path, offset: u64) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".damaged-{offset}"));
        PathBuf::from(name)
    }

    /// Drop every entry.
    pub fn truncate(&mut self) -> StoreResult<()> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.writer.get_ref().set_len(0)?;
        self.offset = 0;
        debug!("WAL truncated");
        Ok(())
    }

    /// Current write offset, i.e. the log size in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    fn record(seed: u8) -> WalRecord {
        WalRecord::Transaction {
            hash: Digest::of(&[seed]),
            txn: vec![seed; 16],
        }
    }

    fn flip_byte(path: &Path, at: u64) {
        let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
        let mut buf = [0u8; 1];
        file.seek(SeekFrom::Start(at)).unwrap();
        file.read_exact(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        file.seek(SeekFrom::Start(at)).unwrap();
        file.write_all(&buf).unwrap();
        file.sync_all().unwrap();
    }

    #[test]
    fn append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wal");
        let (mut wal, recovery) = WriteAheadLog::open(&path, SyncMode::EveryWrite).unwrap();
        assert!(recovery.records.is_empty());

        let first = wal.append(&record(1)).unwrap();
        let second = wal.append(&record(2)).unwrap();
        assert_eq!(first, 0);
        assert!(second > first);
        drop(wal);

        let (_, recovery) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(recovery.records, vec![record(1), record(2)]);
        assert_eq!(recovery.skipped, 0);
    }

    #[test]
    fn crc_mismatch_is_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wal");
        let (mut wal, _) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        wal.append(&record(1)).unwrap();
        wal.append(&record(2)).unwrap();
        drop(wal);

        flip_byte(&path, HEADER_SIZE as u64 + 2);

        let (_, recovery) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(recovery.records, vec![record(2)]);
        assert_eq!(recovery.skipped, 1);
    }

    #[test]
    fn torn_tail_is_cut_and_appends_continue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wal");
        let (mut wal, _) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        wal.append(&record(1)).unwrap();
        wal.append(&record(2)).unwrap();
        let full = wal.offset();
        drop(wal);

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let (mut wal, recovery) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(recovery.records, vec![record(1)]);
        assert_eq!(wal.offset(), recovery.valid_len);
        wal.append(&record(3)).unwrap();
        drop(wal);

        let recovery = WriteAheadLog::replay(&path).unwrap();
        assert_eq!(recovery.records, vec![record(1), record(3)]);
    }

    #[test]
    fn damaged_length_header_does_not_hide_later_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wal");
        let (mut wal, _) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        for seed in 1..=3 {
            wal.append(&record(seed)).unwrap();
        }
        let full = wal.offset();
        drop(wal);

        flip_byte(&path, 3);

        let (mut wal, recovery) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(recovery.records, vec![record(2), record(3)]);
        assert_eq!(recovery.skipped, 1);
        assert_eq!(recovery.damaged_from, None);
        assert_eq!(fs::metadata(&path).unwrap().len(), full);
        assert_eq!(wal.offset(), full);

        wal.append(&record(4)).unwrap();
        drop(wal);
        let recovery = WriteAheadLog::replay(&path).unwrap();
        assert_eq!(recovery.records, vec![record(2), record(3), record(4)]);
    }

    #[test]
    fn damaged_final_header_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wal");
        let (mut wal, _) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        wal.append(&record(1)).unwrap();
        let last = wal.append(&record(2)).unwrap();
        let full = wal.offset();
        drop(wal);

        flip_byte(&path, last + 1);

        let (wal, recovery) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        assert_eq!(recovery.records, vec![record(1)]);
        assert_eq!(recovery.skipped, 1);
        assert_eq!(recovery.damaged_from, Some(last));
        assert_eq!(wal.offset(), last);

        let aside = fs::read(WriteAheadLog::damaged_path(&path, last)).unwrap();
        assert_eq!(aside.len() as u64, full - last);
    }

    #[test]
    fn header_checksum_rejects_any_single_flip() {
        let header = encode_header(42, 0xDEAD_BEEF);
        assert_eq!(decode_header(&header), Some((42, 0xDEAD_BEEF)));
        for at in 0..HEADER_SIZE {
            let mut damaged = header;
            damaged[at] ^= 0x01;
            assert_eq!(decode_header(&damaged), None, "flip at byte {at}");
        }
    }

    #[test]
    fn truncate_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.wal");
        let (mut wal, _) = WriteAheadLog::open(&path, SyncMode::OsDefault).unwrap();
        wal.append(&record(1)).unwrap();
        wal.truncate().unwrap();
        assert_eq!(wal.offset(), 0);
        assert!(WriteAheadLog::replay(&path).unwrap().records.is_empty());
    }
}
