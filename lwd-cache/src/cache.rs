//! The append-only, checksummed block cache (spec: §3 `CacheEntry`, §4.2).

use std::fs::{self, File, OpenOptions};
use std::hash::Hasher;
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use fnv::FnvHasher;
use parking_lot::RwLock;
use prost::Message;
use tracing::{info, warn};

use lwd_proto::types::{CompactBlock, ZERO_HASH};

use crate::error::{Error, Result};

/// A block whose serialized length falls outside this range is treated as
/// corruption rather than an oversized-but-valid block.
const MIN_BLOCK_LEN: u32 = 74;
const MAX_BLOCK_LEN: u32 = 4_000_000;

/// Entries dropped from the tail of a corrupt cache beyond the last verified one.
const RECOVERY_SAFETY_MARGIN: u64 = 10_000;

struct Inner {
    first_block: u64,
    next_block: u64,
    /// `starts[i]` is the byte offset in `blocks` of entry `i` (height
    /// `first_block + i`); length is `next_block - first_block`.
    starts: Vec<u64>,
    /// Byte length of `blocks`, i.e. the offset just past the last entry.
    end: u64,
    latest_hash: [u8; 32],
    lengths_file: File,
    blocks_file: File,
}

/// Reorg-safe, checksummed, append-only on-disk store of compact blocks.
///
/// Cloning shares the same underlying state (`Arc`-backed); that is the
/// intended way to hand the cache to the Ingestor and the Range Streamer
/// concurrently.
#[derive(Clone)]
pub struct BlockCache {
    inner: std::sync::Arc<RwLock<Inner>>,
    dir: PathBuf,
}

fn fnv1a64(parts: &[&[u8]]) -> u64 {
    let mut h = FnvHasher::default();
    for p in parts {
        h.write(p);
    }
    h.finish()
}

fn checksum(height: u64, serialized: &[u8]) -> u64 {
    fnv1a64(&[&height.to_le_bytes(), serialized])
}

fn entry_size(len: u32) -> u64 {
    8 + len as u64
}

impl BlockCache {
    /// Opens (creating if absent) the cache for `chain` under `base_dir`.
    ///
    /// Scans `lengths`, verifying every entry by re-reading and re-parsing
    /// the corresponding block. The first bad entry (or a partial trailing
    /// one) triggers recovery: both files are truncated to the last
    /// verified index minus [`RECOVERY_SAFETY_MARGIN`], clamped to
    /// `first_block`, and the pre-truncation files are preserved as
    /// `*-corrupted`.
    ///
    /// `rewind_to`, if given, truncates further after the scan (an operator
    /// asking to replay from an earlier height).
    pub fn open(
        base_dir: &Path,
        chain: &str,
        first_block: u64,
        rewind_to: Option<u64>,
    ) -> Result<Self> {
        let dir = base_dir.join("db").join(chain);
        fs::create_dir_all(&dir).map_err(Error::Unwritable)?;

        let lengths_path = dir.join("lengths");
        let blocks_path = dir.join("blocks");

        let lengths_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lengths_path)?;
        let blocks_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&blocks_path)?;

        let mut raw_lengths = Vec::new();
        {
            let mut f = &lengths_file;
            f.read_to_end(&mut raw_lengths)?;
        }
        // A partial trailing entry (not a multiple of 4 bytes) is itself
        // evidence of a torn write; drop it from consideration, recovery
        // will truncate the file to a verified boundary regardless.
        let full_entries = raw_lengths.len() / 4;
        let lengths: Vec<u32> = (0..full_entries)
            .map(|i| u32::from_le_bytes(raw_lengths[i * 4..i * 4 + 4].try_into().unwrap()))
            .collect();
        let had_partial_tail = raw_lengths.len() % 4 != 0;

        let mut starts = Vec::with_capacity(lengths.len());
        let mut offset = 0u64;
        let mut verified = 0usize;
        let mut latest_hash = ZERO_HASH;
        let mut corrupt = had_partial_tail;

        for (i, &len) in lengths.iter().enumerate() {
            if len < MIN_BLOCK_LEN || len > MAX_BLOCK_LEN {
                corrupt = true;
                break;
            }
            let size = entry_size(len);
            let mut buf = vec![0u8; size as usize];
            if blocks_file.read_exact_at(&mut buf, offset).is_err() {
                corrupt = true;
                break;
            }
            let want_checksum = u64::from_le_bytes(buf[..8].try_into().unwrap());
            let payload = &buf[8..];
            let height = first_block + i as u64;
            if checksum(height, payload) != want_checksum {
                corrupt = true;
                break;
            }
            let block = match CompactBlock::decode(payload) {
                Ok(b) => b,
                Err(_) => {
                    corrupt = true;
                    break;
                }
            };
            if block.height != height {
                corrupt = true;
                break;
            }
            latest_hash = block.hash_array();
            starts.push(offset);
            offset += size;
            verified += 1;
        }

        let mut next_block = first_block + verified as u64;

        if corrupt {
            warn!(event = "cache_recovery", chain, verified_entries = verified, "block cache scan found corruption");
            Self::snapshot_corrupted(&dir)?;
            let keep = (verified as u64).saturating_sub(RECOVERY_SAFETY_MARGIN) as usize;
            // Recompute offsets/latest_hash for the retained prefix rather than
            // trusting the scan state, which stopped at the bad entry.
            let (new_starts, new_end, new_hash) =
                Self::rebuild_prefix(&lengths_file, &blocks_file, keep)?;
            starts = new_starts;
            offset = new_end;
            latest_hash = new_hash;
            next_block = first_block + keep as u64;

            lengths_file.set_len((keep * 4) as u64)?;
            blocks_file.set_len(offset)?;
            info!(event = "cache_recovery", chain, kept_entries = keep, "block cache truncated after recovery");
        }

        let mut inner = Inner {
            first_block,
            next_block,
            starts,
            end: offset,
            latest_hash,
            lengths_file,
            blocks_file,
        };

        if let Some(h) = rewind_to {
            Self::truncate_to(&mut inner, h.max(first_block))?;
        }

        Ok(Self {
            inner: std::sync::Arc::new(RwLock::new(inner)),
            dir,
        })
    }

    fn rebuild_prefix(
        lengths_file: &File,
        blocks_file: &File,
        keep: usize,
    ) -> Result<(Vec<u64>, u64, [u8; 32])> {
        let mut raw = vec![0u8; keep * 4];
        lengths_file.read_exact_at(&mut raw, 0)?;
        let mut starts = Vec::with_capacity(keep);
        let mut offset = 0u64;
        let mut latest_hash = ZERO_HASH;
        for i in 0..keep {
            let len = u32::from_le_bytes(raw[i * 4..i * 4 + 4].try_into().unwrap());
            starts.push(offset);
            let size = entry_size(len);
            if i == keep - 1 {
                let mut buf = vec![0u8; size as usize];
                blocks_file.read_exact_at(&mut buf, offset)?;
                let block = CompactBlock::decode(&buf[8..])?;
                latest_hash = block.hash_array();
            }
            offset += size;
        }
        Ok((starts, offset, latest_hash))
    }

    fn snapshot_corrupted(dir: &Path) -> Result<()> {
        for name in ["lengths", "blocks"] {
            let src = dir.join(name);
            let dst = dir.join(format!("{name}-corrupted"));
            if src.exists() {
                fs::copy(&src, &dst)?;
            }
        }
        Ok(())
    }

    /// Appends the block at height `h`. `h` must equal `next_block`.
    pub fn append(&self, h: u64, cb: &CompactBlock) -> Result<()> {
        let mut inner = self.inner.write();
        if h != inner.next_block {
            return Err(Error::OutOfSequence {
                expected: inner.next_block,
                got: h,
            });
        }
        let serialized = cb.encode_to_vec();
        let len = serialized.len() as u32;
        let sum = checksum(h, &serialized);

        inner.lengths_file.write_all_at(&len.to_le_bytes(), (inner.starts.len() as u64) * 4)?;
        let mut record = Vec::with_capacity(8 + serialized.len());
        record.extend_from_slice(&sum.to_le_bytes());
        record.extend_from_slice(&serialized);
        let at = inner.end;
        inner.blocks_file.write_all_at(&record, at)?;

        inner.starts.push(at);
        inner.end += record.len() as u64;
        inner.next_block += 1;
        inner.latest_hash = cb.hash_array();
        Ok(())
    }

    /// Fetches the block at `h`, or `None` if out of range or if reading it
    /// fails integrity verification (in which case recovery is scheduled on
    /// a background thread and this call still returns `None`).
    pub fn get(&self, h: u64) -> Option<CompactBlock> {
        let (offset, len, blocks_file) = {
            let inner = self.inner.read();
            if h < inner.first_block || h >= inner.next_block {
                return None;
            }
            let idx = (h - inner.first_block) as usize;
            let start = inner.starts[idx];
            let end = inner
                .starts
                .get(idx + 1)
                .copied()
                .unwrap_or(inner.end);
            (start, (end - start) as usize, inner.blocks_file.try_clone().ok()?)
        };

        let mut buf = vec![0u8; len];
        if blocks_file.read_exact_at(&mut buf, offset).is_err() {
            self.schedule_recovery();
            return None;
        }
        let want = u64::from_le_bytes(buf[..8].try_into().ok()?);
        let payload = &buf[8..];
        if checksum(h, payload) != want {
            self.schedule_recovery();
            return None;
        }
        match CompactBlock::decode(payload) {
            Ok(block) if block.height == h => Some(block),
            _ => {
                self.schedule_recovery();
                None
            }
        }
    }

    fn schedule_recovery(&self) {
        let cache = self.clone();
        std::thread::spawn(move || cache.recover());
    }

    /// Re-runs the same validation `open` does against the current files and
    /// truncates on the first failure found. Safe to call concurrently with
    /// itself; only the first caller to acquire the writer lock does work.
    fn recover(&self) {
        let mut inner = self.inner.write();
        let first_block = inner.first_block;
        let mut verified = 0usize;
        let mut offset = 0u64;
        for idx in 0..inner.starts.len() {
            let start = inner.starts[idx];
            let end = inner
                .starts
                .get(idx + 1)
                .copied()
                .unwrap_or(inner.end);
            let len = (end - start) as usize;
            let mut buf = vec![0u8; len];
            if inner.blocks_file.read_exact_at(&mut buf, start).is_err() {
                break;
            }
            let want = u64::from_le_bytes(match buf.get(..8) {
                Some(b) => b.try_into().unwrap(),
                None => break,
            });
            let payload = &buf[8..];
            let height = first_block + idx as u64;
            if checksum(height, payload) != want {
                break;
            }
            match CompactBlock::decode(payload) {
                Ok(b) if b.height == height => {}
                _ => break,
            }
            offset = end;
            verified += 1;
        }
        if verified == inner.starts.len() {
            // Nothing was actually wrong any more (e.g. a transient read
            // error); leave the cache as-is.
            return;
        }
        warn!(event = "cache_recovery", verified_entries = verified, "background recovery triggered by a read failure");
        if Self::snapshot_corrupted(&self.dir).is_err() {
            warn!(event = "cache_recovery", "failed to snapshot corrupted cache files");
        }
        let keep = (verified as u64).saturating_sub(RECOVERY_SAFETY_MARGIN) as usize;
        if let Ok((starts, end, latest_hash)) =
            Self::rebuild_prefix(&inner.lengths_file, &inner.blocks_file, keep)
        {
            let _ = inner.lengths_file.set_len((keep * 4) as u64);
            let _ = inner.blocks_file.set_len(end);
            inner.starts = starts;
            inner.end = end;
            inner.next_block = first_block + keep as u64;
            inner.latest_hash = if keep == 0 { ZERO_HASH } else { latest_hash };
        }
    }

    /// Truncates so that `next_block = max(h, first_block)`. Idempotent if
    /// `h >= next_block`.
    pub fn reorg(&self, h: u64) -> Result<()> {
        let mut inner = self.inner.write();
        let target = h.max(inner.first_block);
        if target >= inner.next_block {
            return Ok(());
        }
        Self::truncate_to(&mut inner, target)
    }

    fn truncate_to(inner: &mut Inner, target: u64) -> Result<()> {
        let keep = (target - inner.first_block) as usize;
        inner.starts.truncate(keep);

        // The new end-of-file offset is just past the last kept entry:
        // its start plus its on-disk size, read back from `lengths`.
        let new_end = if keep == 0 {
            0
        } else {
            let last_start = inner.starts[keep - 1];
            let mut len_buf = [0u8; 4];
            inner
                .lengths_file
                .read_exact_at(&mut len_buf, ((keep - 1) as u64) * 4)?;
            last_start + entry_size(u32::from_le_bytes(len_buf))
        };

        inner.lengths_file.set_len((keep * 4) as u64)?;
        inner.blocks_file.set_len(new_end)?;
        inner.end = new_end;
        inner.next_block = inner.first_block + keep as u64;
        inner.latest_hash = if keep == 0 {
            ZERO_HASH
        } else {
            let start = inner.starts[keep - 1];
            let len = (new_end - start) as usize;
            let mut buf = vec![0u8; len];
            inner.blocks_file.read_exact_at(&mut buf, start)?;
            CompactBlock::decode(&buf[8..])?.hash_array()
        };
        Ok(())
    }

    /// `nextBlock - 1`, or `-1` if the cache is empty.
    pub fn latest_height(&self) -> i64 {
        let inner = self.inner.read();
        if inner.next_block == inner.first_block {
            -1
        } else {
            (inner.next_block - 1) as i64
        }
    }

    /// The lowest height this cache instance can ever serve.
    pub fn first_block(&self) -> u64 {
        self.inner.read().first_block
    }

    /// The next height `append` expects.
    pub fn next_block(&self) -> u64 {
        self.inner.read().next_block
    }

    pub fn latest_hash(&self) -> [u8; 32] {
        self.inner.read().latest_hash
    }

    /// True if the cache is empty or `prev` matches the current tip hash.
    pub fn hash_matches(&self, prev: &[u8; 32]) -> bool {
        let inner = self.inner.read();
        inner.next_block == inner.first_block || &inner.latest_hash == prev
    }

    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.read();
        inner.lengths_file.sync_all()?;
        inner.blocks_file.sync_all()?;
        Ok(())
    }

    /// Releases file handles. The cache cannot be used after this; it is
    /// only meaningful when this is the last clone.
    pub fn close(self) {
        if let Err(e) = self.flush() {
            warn!(event = "cache_close", error = %e, "failed to flush cache on close");
        }
    }
}
