//! Persisted threshold snapshot: a fixed-size file, memory-mapped shared
//! read/write by this daemon and read-only by external diagnostic tools.
//!
//! The hot-path acquisition/monitor rings use the teacher's raw
//! `libc::mmap` slab (see [`crate::ring`]) because they're touched every
//! tick from a real-time thread; this side channel is touched at most
//! once per `monitor_interval` and is better served by the higher-level
//! `memmap2` crate, which the rest of this example pack also reaches for
//! when a crate doesn't need raw control over the mapping.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{AcqError, Result};
use crate::model::StatusRecord;

pub struct StatusStore {
    mmap: MmapMut,
}

impl StatusStore {
    /// Open-or-create the backing file at exactly `sizeof(StatusRecord)`
    /// bytes and map it. If the file pre-exists with a different size it
    /// is truncated/extended to match; callers that want to preserve an
    /// existing valid snapshot should call [`StatusStore::read`] first.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| AcqError::status_mmap(format!("open {} failed: {e}", path.display())))?;

        file.set_len(StatusRecord::ENCODED_SIZE as u64)
            .map_err(|e| AcqError::status_mmap(format!("resize {} failed: {e}", path.display())))?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(StatusRecord::ENCODED_SIZE)
                .map_mut(&file)
                .map_err(|e| AcqError::status_mmap(format!("mmap {} failed: {e}", path.display())))?
        };

        Ok(Self { mmap })
    }

    /// Read the currently mapped record. Returns a record with
    /// `format_version: 0` if the bytes don't decode, which callers treat
    /// as "no valid persisted thresholds yet" rather than an error — this
    /// must stay distinct from [`StatusRecord::default`], whose
    /// `format_version` is the current on-disk format (1), so a genuine
    /// decode failure is never mistaken for a valid all-zero snapshot.
    pub fn read(&self) -> StatusRecord {
        bincode::deserialize(&self.mmap[..]).unwrap_or(StatusRecord { format_version: 0, ..StatusRecord::default() })
    }

    /// Overwrite the mapped record and flush to the backing file.
    pub fn write(&mut self, record: &StatusRecord) -> Result<()> {
        let encoded = bincode::serialize(record)
            .map_err(|e| AcqError::serialization(format!("status record encode failed: {e}")))?;
        let len = encoded.len().min(self.mmap.len());
        self.mmap[..len].copy_from_slice(&encoded[..len]);
        Ok(())
    }

    /// Schedule an asynchronous flush of pending writes to disk (mirrors
    /// `msync(..., MS_ASYNC)`), called by the writer after every status
    /// record write.
    pub fn sync_async(&self) -> Result<()> {
        self.mmap
            .flush_async()
            .map_err(|e| AcqError::status_mmap(format!("msync failed: {e}")))
    }

    /// Synchronous flush, used on teardown before the mapping is dropped.
    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().map_err(|e| AcqError::status_mmap(format!("msync failed: {e}")))
    }
}
