//! Whisper file operations: create, info, fetch, update.
//!
//! Every operation is a short synchronous critical section: it opens the
//! file, performs bounded seeks and I/O, and closes it. The engine spawns
//! no background work and holds no file handles between calls. Concurrent
//! readers may run alongside one writer; the format offers no atomicity
//! beyond a single 16-byte slot write, so a reader can observe a torn
//! point. That is a documented property of the format.
//!
//! # Write path
//!
//! ```text
//! update → finest covering archive → write slot → propagate downward
//!           (stop at the first coarser archive left unwritten)
//! ```

use crate::error::{Result, WhisperError};
use crate::wsp::archive::{read_base, read_ring, slot_offset, unpack_points, write_point_at};
use crate::wsp::header::{
    AggregationMethod, ArchiveInfo, Header, Metadata, Point, ARCHIVE_INFO_SIZE, METADATA_SIZE,
    POINT_SIZE,
};
use crate::wsp::schema::{validate_archives, ArchiveSpec};
use crate::wsp::{ArchiveFetch, TimeInfo, Timestamp};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Chunk size used to zero-fill the data region at creation time.
const ZERO_FILL_CHUNK: usize = 16 * 1024;

static AUTO_FLUSH: AtomicBool = AtomicBool::new(false);
static CACHE_HEADERS: AtomicBool = AtomicBool::new(false);
static HEADER_CACHE: OnceLock<RwLock<HashMap<PathBuf, Header>>> = OnceLock::new();

/// Enables or disables fsync-before-close in `create` and `update`.
///
/// Disabled by default; the OS page cache then decides when bytes reach
/// the disk.
pub fn set_auto_flush(enabled: bool) {
    AUTO_FLUSH.store(enabled, Ordering::Relaxed);
}

/// Returns whether fsync-before-close is enabled.
pub fn auto_flush() -> bool {
    AUTO_FLUSH.load(Ordering::Relaxed)
}

/// Enables or disables the process-wide header cache.
///
/// Headers are immutable once a file is created, so cached entries are
/// never invalidated automatically. If a file is deleted and recreated
/// with a different schema while cached, subsequent reads return the stale
/// header until [`evict_header`] or [`clear_header_cache`] is called.
pub fn set_cache_headers(enabled: bool) {
    CACHE_HEADERS.store(enabled, Ordering::Relaxed);
}

/// Returns whether the header cache is enabled.
pub fn cache_headers() -> bool {
    CACHE_HEADERS.load(Ordering::Relaxed)
}

fn header_cache() -> &'static RwLock<HashMap<PathBuf, Header>> {
    HEADER_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Removes one path from the header cache.
pub fn evict_header(path: impl AsRef<Path>) {
    let mut cache = header_cache()
        .write()
        .unwrap_or_else(|err| err.into_inner());
    cache.remove(path.as_ref());
}

/// Removes every entry from the header cache.
pub fn clear_header_cache() {
    let mut cache = header_cache()
        .write()
        .unwrap_or_else(|err| err.into_inner());
    cache.clear();
}

/// Reads the header of `path`, consulting the cache when enabled.
fn read_header(path: &Path, file: &mut File) -> Result<Header> {
    if cache_headers() {
        let cache = header_cache().read().unwrap_or_else(|err| err.into_inner());
        if let Some(header) = cache.get(path) {
            return Ok(header.clone());
        }
    }

    let header = Header::read_from(file, path)?;

    if cache_headers() {
        let mut cache = header_cache()
            .write()
            .unwrap_or_else(|err| err.into_inner());
        cache.insert(path.to_path_buf(), header.clone());
    }

    Ok(header)
}

fn current_unix_seconds() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Options for [`create`].
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    /// Minimum fraction of known finer slots required to write a coarser
    /// point during propagation, in `[0, 1]`.
    pub x_files_factor: f64,
    /// Consolidation method used during propagation.
    pub aggregation: AggregationMethod,
    /// When set, the data region is allocated by writing a single zero
    /// byte at the end of the file instead of zero-filling it. Platforms
    /// that honor sparse allocation leave holes.
    pub sparse: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            x_files_factor: 0.5,
            aggregation: AggregationMethod::Average,
            sparse: false,
        }
    }
}

/// Creates a new whisper file at `path`.
///
/// The archive list is validated and laid out finest-first; the data
/// region is zero-filled (or sparsely allocated, see
/// [`CreateOptions::sparse`]).
///
/// # Errors
///
/// Returns `WhisperError::InvalidConfiguration` if the archive list
/// violates a well-formedness rule, if `x_files_factor` is outside
/// `[0, 1]`, or if a file already exists at `path`.
pub fn create(
    path: impl AsRef<Path>,
    archives: &[ArchiveSpec],
    options: &CreateOptions,
) -> Result<()> {
    let path = path.as_ref();

    let mut archives = archives.to_vec();
    validate_archives(&mut archives)?;

    if !(0.0..=1.0).contains(&options.x_files_factor) {
        return Err(WhisperError::InvalidConfiguration(format!(
            "x-files factor {} is outside [0, 1]",
            options.x_files_factor
        )));
    }

    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(WhisperError::InvalidConfiguration(format!(
                "file already exists: {}",
                path.display()
            )));
        }
        Err(err) => return Err(err.into()),
    };
    let mut writer = BufWriter::new(file);

    let max_retention = archives
        .iter()
        .map(ArchiveSpec::retention)
        .max()
        .unwrap_or_default();

    let mut offset = METADATA_SIZE + ARCHIVE_INFO_SIZE * archives.len() as u64;
    let mut index = Vec::with_capacity(archives.len());
    for spec in &archives {
        let archive = ArchiveInfo::new(offset, spec.seconds_per_point, spec.points);
        offset += archive.size();
        index.push(archive);
    }

    let header = Header {
        metadata: Metadata {
            aggregation: options.aggregation,
            max_retention,
            x_files_factor: options.x_files_factor,
            archive_count: index.len() as u64,
        },
        archives: index,
    };
    header.write_to(&mut writer)?;

    let data_bytes: u64 = header.archives.iter().map(ArchiveInfo::size).sum();
    if options.sparse {
        writer.seek(SeekFrom::Start(header.size() + data_bytes - 1))?;
        writer.write_all(&[0u8])?;
    } else {
        let chunk = [0u8; ZERO_FILL_CHUNK];
        let mut remaining = data_bytes;
        while remaining > 0 {
            let step = remaining.min(chunk.len() as u64) as usize;
            writer.write_all(&chunk[..step])?;
            remaining -= step as u64;
        }
    }

    writer.flush()?;
    if auto_flush() {
        writer.get_ref().sync_all()?;
    }

    debug!(
        path = %path.display(),
        archives = header.archives.len(),
        max_retention,
        "created whisper file"
    );
    Ok(())
}

/// Reads and returns the header of the file at `path`.
///
/// # Errors
///
/// Returns `WhisperError::CorruptWhisperFile` if the header cannot be
/// decoded.
pub fn info(path: impl AsRef<Path>) -> Result<Header> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    read_header(path, &mut file)
}

/// Fetches a dense time window from the file at `path`.
///
/// `until` defaults to `now`, and `now` defaults to the current UTC unix
/// time. The finest archive whose retention covers the (clamped) window
/// start is selected; interval labels in the result denote the *end* of
/// each bucket. Returns `None` when the window lies entirely in the
/// future or entirely before the oldest retained data.
///
/// # Errors
///
/// Returns `WhisperError::InvalidTimeInterval` if `from` is after
/// `until`, or `WhisperError::CorruptWhisperFile` if the header cannot be
/// decoded.
pub fn fetch(
    path: impl AsRef<Path>,
    from: Timestamp,
    until: Option<Timestamp>,
    now: Option<Timestamp>,
) -> Result<Option<ArchiveFetch>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let header = read_header(path, &mut file)?;

    let now = now.unwrap_or_else(current_unix_seconds);
    let until = until.unwrap_or(now);
    if from > until {
        return Err(WhisperError::InvalidTimeInterval { from, until });
    }

    let oldest = now.saturating_sub(header.metadata.max_retention);
    if from > now {
        return Ok(None);
    }
    if until < oldest {
        return Ok(None);
    }
    let from = from.max(oldest);
    let until = until.min(now);

    let Some(archive) = header
        .archives
        .iter()
        .find(|archive| archive.retention() >= now - from)
    else {
        return Ok(None);
    };

    let step = archive.seconds_per_point;
    let time_info = TimeInfo {
        from_interval: archive.interval(from) + step,
        until_interval: archive.interval(until) + step,
        step,
    };

    let base = read_base(&mut file, archive)?;
    let points = if base.timestamp == 0 {
        vec![Point::default(); time_info.count() as usize]
    } else {
        let from_offset = slot_offset(archive, base.timestamp, time_info.from_interval);
        let until_offset = slot_offset(archive, base.timestamp, time_info.until_interval);
        let buf = read_ring(&mut file, archive, from_offset, until_offset)?;
        unpack_points(&buf)?
    };

    let values = points
        .into_iter()
        .filter(|point| point.timestamp != 0)
        .collect();

    Ok(Some(ArchiveFetch { time_info, values }))
}

/// Writes one point into the file at `path`.
///
/// `timestamp` defaults to `now`, and `now` defaults to the current UTC
/// unix time. The point lands in the finest archive whose retention
/// covers its age, aligned to that archive's grid, and is then propagated
/// into each coarser archive in turn until a propagation declines to
/// write.
///
/// A timestamp of zero is indistinguishable from the unwritten-slot
/// sentinel and is rejected by the retention check for any realistic
/// `now`.
///
/// # Errors
///
/// Returns `WhisperError::TimestampNotCovered` if the point is in the
/// future or older than the longest retention, or
/// `WhisperError::CorruptWhisperFile` if the header cannot be decoded.
pub fn update(
    path: impl AsRef<Path>,
    value: f64,
    timestamp: Option<Timestamp>,
    now: Option<Timestamp>,
) -> Result<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let header = read_header(path, &mut file)?;

    let now = now.unwrap_or_else(current_unix_seconds);
    let timestamp = timestamp.unwrap_or(now);

    let diff = now as i64 - timestamp as i64;
    let max_retention = header.metadata.max_retention;
    if diff < 0 || diff >= max_retention as i64 {
        return Err(WhisperError::TimestampNotCovered {
            diff,
            max_retention,
        });
    }

    let Some(higher_index) = header
        .archives
        .iter()
        .position(|archive| archive.retention() as i64 >= diff)
    else {
        // Unreachable while max_retention equals the longest retention.
        return Err(WhisperError::TimestampNotCovered {
            diff,
            max_retention,
        });
    };

    let higher = &header.archives[higher_index];
    let my_interval = higher.interval(timestamp);
    let point = Point::new(my_interval, value);

    let base = read_base(&mut file, higher)?;
    if base.timestamp == 0 {
        write_point_at(&mut file, higher.offset, &point)?;
    } else {
        let offset = slot_offset(higher, base.timestamp, my_interval);
        write_point_at(&mut file, offset, &point)?;
    }

    for pair in header.archives[higher_index..].windows(2) {
        if !propagate(&mut file, &header.metadata, &pair[0], &pair[1], my_interval)? {
            break;
        }
    }

    if auto_flush() {
        file.sync_all()?;
    }
    Ok(())
}

/// Consolidates the finer slots covering one coarser bucket and writes the
/// result into the coarser archive.
///
/// Returns `false` without writing when the bucket has no known finer
/// slots, or when the known fraction falls below the x-files factor.
/// Any slot with a nonzero timestamp counts as known, whether or not it
/// still lies on the expected grid; stale slots are overwritten by later
/// updates as the ring comes back around.
fn propagate(
    file: &mut File,
    metadata: &Metadata,
    higher: &ArchiveInfo,
    lower: &ArchiveInfo,
    timestamp: Timestamp,
) -> Result<bool> {
    let lower_interval_start = lower.interval(timestamp);

    let higher_base = read_base(file, higher)?;
    let higher_first_offset = if higher_base.timestamp == 0 {
        higher.offset
    } else {
        slot_offset(higher, higher_base.timestamp, lower_interval_start)
    };

    let higher_points = lower.seconds_per_point / higher.seconds_per_point;
    let relative_first = higher_first_offset - higher.offset;
    let higher_last_offset =
        higher.offset + (relative_first + higher_points * POINT_SIZE) % higher.size();

    let buf = read_ring(file, higher, higher_first_offset, higher_last_offset)?;
    let candidates = unpack_points(&buf)?;

    let known: Vec<f64> = candidates
        .iter()
        .filter(|point| point.timestamp != 0)
        .map(|point| point.value)
        .collect();
    if known.is_empty() {
        return Ok(false);
    }

    let known_fraction = known.len() as f64 / higher_points as f64;
    if known_fraction < metadata.x_files_factor {
        debug!(
            known = known.len(),
            window = higher_points,
            x_files_factor = metadata.x_files_factor,
            "propagation below x-files factor"
        );
        return Ok(false);
    }

    let aggregate = metadata.aggregation.aggregate(&known);
    let point = Point::new(lower_interval_start, aggregate);

    let lower_base = read_base(file, lower)?;
    if lower_base.timestamp == 0 {
        write_point_at(file, lower.offset, &point)?;
    } else {
        let offset = slot_offset(lower, lower_base.timestamp, lower_interval_start);
        write_point_at(file, offset, &point)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_options_defaults() {
        let options = CreateOptions::default();
        assert_eq!(options.x_files_factor, 0.5);
        assert_eq!(options.aggregation, AggregationMethod::Average);
        assert!(!options.sparse);
    }

    #[test]
    fn test_flush_and_cache_toggles() {
        assert!(!auto_flush());
        set_auto_flush(true);
        assert!(auto_flush());
        set_auto_flush(false);

        assert!(!cache_headers());
        set_cache_headers(true);
        assert!(cache_headers());
        set_cache_headers(false);
    }

    #[test]
    fn test_current_unix_seconds_is_sane() {
        // 2020-01-01 onwards; guards against accidental unit changes.
        assert!(current_unix_seconds() > 1_577_836_800);
    }
}
