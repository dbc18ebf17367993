//! Whisper round-robin database file format.
//!
//! A whisper file holds one metric as a header followed by a fixed number of
//! ring-buffer archives, concatenated in index order:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Metadata (32 bytes)                                         │
//! │  - Aggregation method: u64                                   │
//! │  - Max retention: u64 (seconds)                              │
//! │  - X-files factor: f64                                       │
//! │  - Archive count: u64                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Archive index (24 bytes × archive count)                    │
//! │  - Offset: u64, seconds per point: u64, points: u64          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Archive data (16-byte points × points, per archive)         │
//! │  - Ring buffer anchored at the timestamp in slot 0           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers and doubles are big-endian. A point whose timestamp is zero
//! denotes an unwritten slot. Headers are immutable once a file is created;
//! only ring slots mutate afterwards.

pub mod archive;
pub mod codec;
pub mod file;
pub mod header;
pub mod schema;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// The time window covered by a fetch, on the selected archive's grid.
///
/// Interval labels denote the *end* of each bucket: the first returned slot
/// covers `(from_interval - step, from_interval]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    /// End label of the first bucket in the window.
    pub from_interval: Timestamp,
    /// End label one past the last bucket in the window.
    pub until_interval: Timestamp,
    /// Bucket width of the selected archive, in seconds.
    pub step: Timestamp,
}

impl TimeInfo {
    /// Number of buckets in the window.
    pub fn count(&self) -> u64 {
        (self.until_interval - self.from_interval) / self.step
    }
}

/// The result of a fetch: the window grid plus the occupied slots within it.
///
/// `values` is sparse. Slots that were never written are omitted; callers
/// reconstruct gaps from [`TimeInfo`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveFetch {
    /// The window grid the values lie on.
    pub time_info: TimeInfo,
    /// Occupied slots inside the window, in grid order.
    pub values: Vec<header::Point>,
}
