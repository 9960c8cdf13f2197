use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use divel_types::{EvidenceId, FingerprintRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SyncMode;
use crate::error::{LedgerError, LedgerResult};

/// A single entry of the local ledger log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// A newly ledgered fingerprint record.
    Record(FingerprintRecord),
    /// The external anchor confirmed a previously written record.
    Anchored {
        evidence_id: EvidenceId,
        tx_id: String,
    },
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Frames larger than this are never written, so a header claiming one
/// is damage rather than data.
const MAX_ENTRY_LEN: u32 = 1024 * 1024;

/// An entry recovered from the log, with the offset its frame starts at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredEntry {
    pub offset: u64,
    pub entry: LogEntry,
}

struct LogWriter {
    file: File,
    /// End of the last acknowledged frame.
    offset: u64,
    /// Set when a failed write could not be rolled back.
    wedged: bool,
}

/// Crash-consistent append-only record log.
///
/// On-disk format, one frame per entry:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogEntry)]
/// ```
///
/// A frame is acknowledged only after it is written in full and synced.
/// On open, an incomplete or unverifiable *final* frame is an
/// unacknowledged write from a crash and is truncated away. A header with
/// an impossible length, or one that overruns the file while a valid
/// frame still follows it, is damage rather than a torn write. That and
/// any damage before the final frame fail the open with
/// [`LedgerError::CorruptLog`], leaving the file untouched.
///
/// All methods do blocking file I/O.
pub struct RecordLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_mode: SyncMode,
}

impl RecordLog {
    /// Open (or create) the log at `path` and replay its entries.
    pub fn open(path: &Path, sync_mode: SyncMode) -> LedgerResult<(Self, Vec<RecoveredEntry>)> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let (entries, valid_len) = replay(&file, file_len)?;

        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn tail of ledger log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), recovered = entries.len(), "ledger log replayed");

        let log = Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                file,
                offset: valid_len,
                wedged: false,
            }),
            sync_mode,
        };
        Ok((log, entries))
    }

    /// Append one entry. Returns the byte offset of its frame once the
    /// entry is durable per the sync mode.
    ///
    /// A failed write is rolled back to the previous frame boundary so the
    /// log never carries a partial frame in front of later ones.
    pub fn append(&self, entry: &LogEntry) -> LedgerResult<u64> {
        let payload =
            bincode::serialize(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_ENTRY_LEN)
            .ok_or_else(|| {
                LedgerError::Serialization(format!("entry of {} bytes is too large", payload.len()))
            })?;
        let crc = crc32fast::hash(&payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let mut w = self
            .writer
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("ledger log"))?;
        if w.wedged {
            return Err(LedgerError::BackendUnavailable(
                "ledger log is wedged after a failed write; reopen to recover".into(),
            ));
        }

        let entry_offset = w.offset;
        if let Err(e) = write_frame(&mut w.file, &frame, self.sync_mode) {
            if let Err(rollback) = w.file.set_len(entry_offset) {
                warn!(offset = entry_offset, error = %rollback, "ledger log rollback failed");
                w.wedged = true;
            }
            return Err(e.into());
        }
        w.offset += frame.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "ledger log append");
        Ok(entry_offset)
    }

    /// End of the last acknowledged frame.
    pub fn offset(&self) -> u64 {
        self.writer.lock().map(|w| w.offset).unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refuse further appends, as after a rollback that failed.
    #[cfg(test)]
    pub(crate) fn wedge(&self) {
        if let Ok(mut w) = self.writer.lock() {
            w.wedged = true;
        }
    }
}

fn write_frame(file: &mut File, frame: &[u8], sync_mode: SyncMode) -> io::Result<()> {
    file.write_all(frame)?;
    file.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        file.sync_data()?;
    }
    Ok(())
}

/// Read every frame front-to-back. Returns the entries and the length of
/// the valid prefix.
fn replay(file: &File, file_len: u64) -> LedgerResult<(Vec<RecoveredEntry>, u64)> {
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut offset: u64 = 0;

    while offset < file_len {
        if file_len - offset < HEADER_SIZE as u64 {
            warn!(offset, "partial frame header at end of ledger log");
            break;
        }

        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let frame_end = offset + HEADER_SIZE as u64 + u64::from(length);

        // The writer never emits such a header, so no torn write can
        // produce one either.
        if length == 0 || length > MAX_ENTRY_LEN {
            return Err(LedgerError::CorruptLog {
                offset,
                reason: format!("invalid frame length {length}"),
            });
        }

        if frame_end > file_len {
            // A torn write leaves a prefix of one frame. Any complete frame
            // after this header means the length field itself is damaged.
            let mut tail = header.to_vec();
            reader.read_to_end(&mut tail)?;
            if let Some(next) = next_valid_frame(&tail) {
                return Err(LedgerError::CorruptLog {
                    offset,
                    reason: format!(
                        "frame length {length} overruns the log, but a valid frame follows at offset {}",
                        offset + next as u64
                    ),
                });
            }
            warn!(offset, length, file_len, "frame extends past end of ledger log");
            break;
        }
        let is_final = frame_end == file_len;

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            if is_final {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch on final frame of ledger log"
                );
                break;
            }
            return Err(LedgerError::CorruptLog {
                offset,
                reason: format!(
                    "CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
                ),
            });
        }

        match bincode::deserialize::<LogEntry>(&payload) {
            Ok(entry) => entries.push(RecoveredEntry { offset, entry }),
            Err(e) if is_final => {
                warn!(offset, error = %e, "undecodable final frame in ledger log");
                break;
            }
            Err(e) => {
                return Err(LedgerError::CorruptLog {
                    offset,
                    reason: format!("undecodable entry: {e}"),
                })
            }
        }

        offset = frame_end;
    }

    Ok((entries, offset))
}

/// Offset of the first complete, checksummed, decodable frame in `bytes`
/// after position 0.
fn next_valid_frame(bytes: &[u8]) -> Option<usize> {
    (1..bytes.len()).find(|&start| {
        let Some(header) = bytes.get(start..start + HEADER_SIZE) else {
            return false;
        };
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if length == 0 || length > MAX_ENTRY_LEN {
            return false;
        }
        let payload_start = start + HEADER_SIZE;
        bytes
            .get(payload_start..payload_start + length as usize)
            .is_some_and(|payload| {
                crc32fast::hash(payload) == crc
                    && bincode::deserialize::<LogEntry>(payload).is_ok()
            })
    })
}
