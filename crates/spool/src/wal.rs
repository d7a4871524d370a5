//! Segmented write-ahead log implementation.
//!
//! On-disk layout under the base directory:
//!
//! ```text
//! partition_<P>/segment_<BASE_OFFSET>.log   length-prefixed records
//! partition_<P>/segment_<BASE_OFFSET>.idx   (offset, position) pairs, LE i64
//! offsets/<group>_p<P>.offset               committed offset, LE i64
//! ```
//!
//! All mutating operations and reads are serialized under one mutex; reads
//! are issued from a single processing thread in the current design.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use sha2::{Digest, Sha256};

use s1scope_core::{now_ns, SignalMessage, SpoolRecord};

use crate::SpoolError;

const INDEX_ENTRY_SIZE: u64 = 16;
const SEGMENT_BUFFER_SIZE: usize = 64 * 1024;
const SEGMENT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Spool configuration. Defaults match a single-host deployment.
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    pub base_dir: PathBuf,
    pub num_partitions: i32,
    pub max_segment_size: i64,
    pub max_retention_bytes: u64,
    pub max_retention_seconds: u64,
    pub fsync_on_append: bool,
    pub use_buffering: bool,
    pub fsync_interval: Duration,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        SpoolConfig {
            base_dir: PathBuf::from("spool_data"),
            num_partitions: 1,
            max_segment_size: 100 * 1024 * 1024,
            max_retention_bytes: 1024 * 1024 * 1024,
            max_retention_seconds: 7 * 24 * 3600,
            fsync_on_append: true,
            use_buffering: true,
            fsync_interval: Duration::from_millis(100),
        }
    }
}

struct Segment {
    base_offset: i64,
    log_path: PathBuf,
    idx_path: PathBuf,
    /// Next offset to assign.
    current_offset: i64,
    file_size: i64,
    log_file: File,
    idx_file: File,
    log_buffer: Vec<u8>,
    idx_buffer: Vec<u8>,
    last_fsync: Instant,
}

impl Segment {
    fn flush(&mut self, fsync: bool) -> Result<(), SpoolError> {
        if !self.log_buffer.is_empty() {
            self.log_file
                .write_all(&self.log_buffer)
                .map_err(|e| SpoolError::io(&self.log_path, e))?;
            self.log_buffer.clear();
        }
        if !self.idx_buffer.is_empty() {
            self.idx_file
                .write_all(&self.idx_buffer)
                .map_err(|e| SpoolError::io(&self.idx_path, e))?;
            self.idx_buffer.clear();
        }
        if fsync {
            self.log_file
                .sync_all()
                .map_err(|e| SpoolError::io(&self.log_path, e))?;
            self.idx_file
                .sync_all()
                .map_err(|e| SpoolError::io(&self.idx_path, e))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    active: HashMap<i32, Segment>,
    consumer_offsets: HashMap<String, HashMap<i32, i64>>,
    segment_cache: HashMap<i32, Vec<(i64, PathBuf)>>,
    cache_stamp: Option<Instant>,
}

/// Partitioned append-only log with per-consumer-group committed offsets.
pub struct Spool {
    config: SpoolConfig,
    inner: Mutex<Inner>,
}

impl Spool {
    pub fn new(config: SpoolConfig) -> Result<Self, SpoolError> {
        let mut config = config;
        if config.num_partitions < 1 {
            config.num_partitions = 1;
        }
        fs::create_dir_all(&config.base_dir)
            .map_err(|e| SpoolError::io(&config.base_dir, e))?;
        for p in 0..config.num_partitions {
            let dir = partition_dir(&config.base_dir, p);
            fs::create_dir_all(&dir).map_err(|e| SpoolError::io(&dir, e))?;
        }

        let mut inner = Inner::default();
        load_consumer_offsets(&config.base_dir, &mut inner.consumer_offsets);

        Ok(Spool {
            config,
            inner: Mutex::new(inner),
        })
    }

    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    /// Route a message to its partition: stable hash of
    /// `source_id ":" source_sequence`.
    pub fn partition_for(&self, message: &SignalMessage) -> i32 {
        let key = format!("{}:{}", message.source_id, message.source_sequence);
        let digest = Sha256::digest(key.as_bytes());
        let hash = u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
            digest[7],
        ]);
        (hash % self.config.num_partitions as u64) as i32
    }

    /// Append a message; returns the assigned (partition, offset).
    ///
    /// The offset is only advanced once the record bytes are accepted, so a
    /// failed append never burns an offset.
    pub fn append(&self, message: &SignalMessage) -> Result<(i32, i64), SpoolError> {
        let mut inner = self.inner.lock().unwrap();
        let partition = self.partition_for(message);
        let seg = self.segment_for_append(&mut inner, partition)?;

        let offset = seg.current_offset;
        let record = SpoolRecord {
            partition,
            offset,
            ts_append_ns: now_ns(),
            message: message.clone(),
        };
        let body = serde_json::to_vec(&record)?;
        let position = seg.file_size;

        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);

        if self.config.use_buffering {
            seg.log_buffer.extend_from_slice(&framed);
            if seg.log_buffer.len() >= SEGMENT_BUFFER_SIZE {
                let buffer = std::mem::take(&mut seg.log_buffer);
                seg.log_file
                    .write_all(&buffer)
                    .map_err(|e| SpoolError::io(&seg.log_path, e))?;
            }
        } else {
            seg.log_file
                .write_all(&framed)
                .map_err(|e| SpoolError::io(&seg.log_path, e))?;
        }

        let mut idx_entry = [0u8; INDEX_ENTRY_SIZE as usize];
        idx_entry[..8].copy_from_slice(&offset.to_le_bytes());
        idx_entry[8..].copy_from_slice(&position.to_le_bytes());
        if self.config.use_buffering {
            seg.idx_buffer.extend_from_slice(&idx_entry);
            if seg.idx_buffer.len() >= SEGMENT_BUFFER_SIZE {
                let buffer = std::mem::take(&mut seg.idx_buffer);
                seg.idx_file
                    .write_all(&buffer)
                    .map_err(|e| SpoolError::io(&seg.idx_path, e))?;
            }
        } else {
            seg.idx_file
                .write_all(&idx_entry)
                .map_err(|e| SpoolError::io(&seg.idx_path, e))?;
        }

        seg.file_size += framed.len() as i64;
        seg.current_offset += 1;

        if self.config.fsync_on_append && seg.last_fsync.elapsed() >= self.config.fsync_interval
        {
            seg.flush(true)?;
            seg.last_fsync = Instant::now();
        }

        Ok((partition, offset))
    }

    /// Read up to `max_records` records with offsets >= `offset` from one
    /// partition, in append order. A corrupt or partial tail terminates the
    /// read cleanly.
    pub fn read(
        &self,
        partition: i32,
        offset: i64,
        max_records: i64,
    ) -> Result<Vec<SpoolRecord>, SpoolError> {
        let mut inner = self.inner.lock().unwrap();

        // Buffered appends must be visible to the reader.
        if let Some(seg) = inner.active.get_mut(&partition) {
            seg.flush(false)?;
        }

        let segments = self.segments_for_partition(&mut inner, partition);
        let mut records = Vec::new();

        for (_base, log_path) in &segments {
            if records.len() as i64 >= max_records {
                break;
            }
            let idx_path = log_path.with_extension("idx");
            let Some(position) = index_lookup(&idx_path, offset) else {
                continue;
            };

            let mut log_file = match File::open(log_path) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if log_file.seek(SeekFrom::Start(position as u64)).is_err() {
                continue;
            }

            loop {
                if records.len() as i64 >= max_records {
                    break;
                }
                let mut len_bytes = [0u8; 4];
                if log_file.read_exact(&mut len_bytes).is_err() {
                    break;
                }
                let len = u32::from_le_bytes(len_bytes) as usize;
                if len == 0 {
                    break;
                }
                let mut body = vec![0u8; len];
                if log_file.read_exact(&mut body).is_err() {
                    break; // partial record at the tail
                }
                match serde_json::from_slice::<SpoolRecord>(&body) {
                    Ok(record) => {
                        if record.offset >= offset {
                            records.push(record);
                        }
                    }
                    Err(_) => break, // corrupt tail; stop at the valid prefix
                }
            }
        }

        Ok(records)
    }

    /// Persist the committed offset for (group, partition).
    pub fn commit_offset(
        &self,
        group: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), SpoolError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .consumer_offsets
            .entry(group.to_string())
            .or_default()
            .insert(partition, offset);

        let offsets_dir = self.config.base_dir.join("offsets");
        fs::create_dir_all(&offsets_dir).map_err(|e| SpoolError::io(&offsets_dir, e))?;
        let path = offsets_dir.join(format!("{}_p{}.offset", group, partition));
        let mut file = File::create(&path).map_err(|e| SpoolError::io(&path, e))?;
        file.write_all(&offset.to_le_bytes())
            .map_err(|e| SpoolError::io(&path, e))?;
        Ok(())
    }

    /// Last committed offset for (group, partition); 0 when none exists.
    pub fn load_offset(&self, group: &str, partition: i32) -> i64 {
        let inner = self.inner.lock().unwrap();
        inner
            .consumer_offsets
            .get(group)
            .and_then(|m| m.get(&partition))
            .copied()
            .unwrap_or(0)
    }

    /// Largest offset assigned for a partition, -1 when nothing was ever
    /// appended.
    pub fn high_water_mark(&self, partition: i32) -> i64 {
        let inner = self.inner.lock().unwrap();
        if let Some(seg) = inner.active.get(&partition) {
            return seg.current_offset - 1;
        }

        let dir = partition_dir(&self.config.base_dir, partition);
        let mut max_offset = -1;
        for (_base, log_path) in list_segments(&dir) {
            let idx_path = log_path.with_extension("idx");
            if let Some(last) = last_index_offset(&idx_path) {
                max_offset = max_offset.max(last);
            }
        }
        max_offset
    }

    /// Force all buffered appends to disk.
    pub fn flush(&self) -> Result<(), SpoolError> {
        let mut inner = self.inner.lock().unwrap();
        for seg in inner.active.values_mut() {
            seg.flush(true)?;
            seg.last_fsync = Instant::now();
        }
        Ok(())
    }

    /// Enforce retention: delete whole segments oldest-first while the
    /// partition exceeds the byte budget, and any segment past the age
    /// limit. The active segment is never pruned.
    pub fn prune_old_segments(&self) -> Result<(), SpoolError> {
        let mut inner = self.inner.lock().unwrap();

        for partition in 0..self.config.num_partitions {
            let active_base = inner.active.get(&partition).map(|s| s.base_offset);
            let dir = partition_dir(&self.config.base_dir, partition);
            let segments = list_segments(&dir);

            let mut sized: Vec<(i64, PathBuf, u64, Option<SystemTime>)> = segments
                .into_iter()
                .map(|(base, path)| {
                    let meta = fs::metadata(&path).ok();
                    let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
                    let modified = meta.and_then(|m| m.modified().ok());
                    (base, path, size, modified)
                })
                .collect();
            let mut total_bytes: u64 = sized.iter().map(|(_, _, size, _)| size).sum();

            let mut pruned_any = false;
            let mut i = 0;
            while i < sized.len() {
                let (base, size) = (sized[i].0, sized[i].2);
                if Some(base) == active_base {
                    i += 1;
                    continue;
                }

                let too_big = total_bytes > self.config.max_retention_bytes;
                let too_old = sized[i]
                    .3
                    .and_then(|m| m.elapsed().ok())
                    .map(|age| age.as_secs() > self.config.max_retention_seconds)
                    .unwrap_or(false);

                if too_big || too_old {
                    let (_, path, _, _) = sized.remove(i);
                    log::debug!("pruning segment {}", path.display());
                    let _ = fs::remove_file(path.with_extension("idx"));
                    fs::remove_file(&path).map_err(|e| SpoolError::io(&path, e))?;
                    total_bytes = total_bytes.saturating_sub(size);
                    pruned_any = true;
                } else {
                    i += 1;
                }
            }

            if pruned_any {
                inner.segment_cache.remove(&partition);
            }
        }

        Ok(())
    }

    /// Active segment for appends, rotating when the current one is full.
    fn segment_for_append<'a>(
        &self,
        inner: &'a mut Inner,
        partition: i32,
    ) -> Result<&'a mut Segment, SpoolError> {
        let needs_rotation = inner
            .active
            .get(&partition)
            .map(|seg| seg.file_size >= self.config.max_segment_size)
            .unwrap_or(false);

        if needs_rotation {
            let mut seg = inner.active.remove(&partition).unwrap();
            seg.flush(true)?;
            let next_base = seg.current_offset;
            inner.segment_cache.remove(&partition);
            let new_seg = self.open_segment(partition, next_base)?;
            inner.active.insert(partition, new_seg);
        } else if !inner.active.contains_key(&partition) {
            // Resume the highest existing segment, or start at offset 0.
            let dir = partition_dir(&self.config.base_dir, partition);
            let base = list_segments(&dir)
                .last()
                .map(|(base, _)| *base)
                .unwrap_or(0);
            let seg = self.open_segment(partition, base)?;
            inner.active.insert(partition, seg);
        }

        Ok(inner.active.get_mut(&partition).unwrap())
    }

    fn open_segment(&self, partition: i32, base_offset: i64) -> Result<Segment, SpoolError> {
        let dir = partition_dir(&self.config.base_dir, partition);
        fs::create_dir_all(&dir).map_err(|e| SpoolError::io(&dir, e))?;
        let log_path = dir.join(format!("segment_{}.log", base_offset));
        let idx_path = dir.join(format!("segment_{}.idx", base_offset));

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| SpoolError::io(&log_path, e))?;
        let idx_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&idx_path)
            .map_err(|e| SpoolError::io(&idx_path, e))?;

        let file_size = fs::metadata(&log_path)
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let idx_entries = fs::metadata(&idx_path)
            .map(|m| (m.len() / INDEX_ENTRY_SIZE) as i64)
            .unwrap_or(0);

        Ok(Segment {
            base_offset,
            log_path,
            idx_path,
            current_offset: base_offset + idx_entries,
            file_size,
            log_file,
            idx_file,
            log_buffer: Vec::new(),
            idx_buffer: Vec::new(),
            last_fsync: Instant::now(),
        })
    }

    /// Sorted (base_offset, log_path) list for a partition, cached for a
    /// few seconds to keep read loops off the directory.
    fn segments_for_partition(
        &self,
        inner: &mut Inner,
        partition: i32,
    ) -> Vec<(i64, PathBuf)> {
        let cache_fresh = inner
            .cache_stamp
            .map(|stamp| stamp.elapsed() < SEGMENT_CACHE_TTL)
            .unwrap_or(false);
        if cache_fresh {
            if let Some(cached) = inner.segment_cache.get(&partition) {
                return cached.clone();
            }
        }

        let dir = partition_dir(&self.config.base_dir, partition);
        let segments = list_segments(&dir);
        inner.segment_cache.insert(partition, segments.clone());
        inner.cache_stamp = Some(Instant::now());
        segments
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            for seg in inner.active.values_mut() {
                let _ = seg.flush(true);
            }
        }
    }
}

fn partition_dir(base_dir: &Path, partition: i32) -> PathBuf {
    base_dir.join(format!("partition_{}", partition))
}

/// Sorted list of (base_offset, log_path) for one partition directory.
fn list_segments(dir: &Path) -> Vec<(i64, PathBuf)> {
    let mut segments = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return segments;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "log").unwrap_or(false) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some(base) = stem.strip_prefix("segment_") {
                    if let Ok(base) = base.parse::<i64>() {
                        segments.push((base, path));
                    }
                }
            }
        }
    }
    segments.sort();
    segments
}

/// Binary search the index for the smallest entry with offset >= `offset`;
/// returns its file position.
fn index_lookup(idx_path: &Path, offset: i64) -> Option<i64> {
    let mut idx_file = File::open(idx_path).ok()?;
    let idx_len = idx_file.metadata().ok()?.len();
    let num_entries = (idx_len / INDEX_ENTRY_SIZE) as i64;
    if num_entries == 0 {
        return None;
    }

    let mut position = None;
    let (mut left, mut right) = (0i64, num_entries - 1);
    while left <= right {
        let mid = left + (right - left) / 2;
        let entry = read_index_entry(&mut idx_file, mid)?;
        if entry.0 < offset {
            left = mid + 1;
        } else {
            position = Some(entry.1);
            right = mid - 1;
        }
    }
    position
}

fn read_index_entry(idx_file: &mut File, entry: i64) -> Option<(i64, i64)> {
    idx_file
        .seek(SeekFrom::Start(entry as u64 * INDEX_ENTRY_SIZE))
        .ok()?;
    let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
    idx_file.read_exact(&mut buf).ok()?;
    let offset = i64::from_le_bytes(buf[..8].try_into().unwrap());
    let position = i64::from_le_bytes(buf[8..].try_into().unwrap());
    Some((offset, position))
}

/// Offset of the last index entry, i.e. the highest offset in the segment.
fn last_index_offset(idx_path: &Path) -> Option<i64> {
    let mut idx_file = File::open(idx_path).ok()?;
    let idx_len = idx_file.metadata().ok()?.len();
    let num_entries = (idx_len / INDEX_ENTRY_SIZE) as i64;
    if num_entries == 0 {
        return None;
    }
    read_index_entry(&mut idx_file, num_entries - 1).map(|(offset, _)| offset)
}

/// Preload every persisted consumer offset at startup.
fn load_consumer_offsets(
    base_dir: &Path,
    offsets: &mut HashMap<String, HashMap<i32, i64>>,
) {
    let offsets_dir = base_dir.join("offsets");
    let Ok(entries) = fs::read_dir(&offsets_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "offset").unwrap_or(false) {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(split) = stem.rfind("_p") else {
                continue;
            };
            let group = &stem[..split];
            let Ok(partition) = stem[split + 2..].parse::<i32>() else {
                continue;
            };
            let Ok(mut file) = File::open(&path) else {
                continue;
            };
            let mut buf = [0u8; 8];
            if file.read_exact(&mut buf).is_ok() {
                offsets
                    .entry(group.to_string())
                    .or_default()
                    .insert(partition, i64::from_le_bytes(buf));
            }
        }
    }
}
