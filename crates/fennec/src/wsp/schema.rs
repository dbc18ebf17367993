//! Archive list well-formedness validation.
//!
//! A file's archive list must describe a strict coarsening chain: each
//! archive is strictly coarser than the previous one, evenly divisible by
//! it, covers strictly more time, and the finer archive holds enough points
//! to consolidate at least one coarser bucket.

use crate::error::{Result, WhisperError};

/// Resolution and capacity of one archive, before layout.
///
/// Offsets are assigned at creation time; see
/// [`crate::wsp::header::ArchiveInfo`] for the on-disk entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSpec {
    /// Bucket width of the archive, in seconds.
    pub seconds_per_point: u64,
    /// Number of slots in the ring.
    pub points: u64,
}

impl ArchiveSpec {
    /// Creates an archive spec.
    pub fn new(seconds_per_point: u64, points: u64) -> Self {
        Self {
            seconds_per_point,
            points,
        }
    }

    /// Total wall-clock span the archive covers, in seconds.
    pub fn retention(&self) -> u64 {
        self.seconds_per_point * self.points
    }
}

/// Validates an archive list, sorting it ascending by resolution in place.
///
/// Rules, checked for each adjacent (finer, coarser) pair after sorting:
///
/// 1. The list is non-empty and every archive has a positive resolution
///    and point count.
/// 2. The coarser archive has a strictly larger bucket width (no
///    duplicate resolutions).
/// 3. The coarser bucket width is evenly divisible by the finer one.
/// 4. The coarser archive covers strictly more time.
/// 5. The finer archive holds at least enough points to consolidate one
///    coarser bucket.
///
/// # Errors
///
/// Returns `WhisperError::InvalidConfiguration` naming the offending
/// archive indices and the rule violated.
pub fn validate_archives(archives: &mut [ArchiveSpec]) -> Result<()> {
    if archives.is_empty() {
        return Err(WhisperError::InvalidConfiguration(
            "archive list is empty".to_string(),
        ));
    }

    for (index, archive) in archives.iter().enumerate() {
        if archive.seconds_per_point == 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {index} has a zero-second resolution"
            )));
        }
        if archive.points == 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {index} has zero points"
            )));
        }
    }

    archives.sort_by_key(|archive| archive.seconds_per_point);

    for (index, pair) in archives.windows(2).enumerate() {
        let (finer, coarser) = (&pair[0], &pair[1]);

        if coarser.seconds_per_point == finer.seconds_per_point {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archives {index} and {} share the resolution {}s",
                index + 1,
                finer.seconds_per_point
            )));
        }

        if coarser.seconds_per_point % finer.seconds_per_point != 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {} resolution {}s is not evenly divisible by archive {index} resolution {}s",
                index + 1,
                coarser.seconds_per_point,
                finer.seconds_per_point
            )));
        }

        if coarser.retention() <= finer.retention() {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {} retention {}s must exceed archive {index} retention {}s",
                index + 1,
                coarser.retention(),
                finer.retention()
            )));
        }

        let buckets_per_coarse_point = coarser.seconds_per_point / finer.seconds_per_point;
        if finer.points < buckets_per_coarse_point {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {index} holds {} points but needs at least {} to consolidate one point of archive {}",
                finer.points,
                buckets_per_coarse_point,
                index + 1
            )));
        }
    }

    Ok(())
}
