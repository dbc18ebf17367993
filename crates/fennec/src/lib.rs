//! Fennec - Whisper-compatible round-robin time series storage.
//!
//! This crate reads and writes fixed-size round-robin database files in the
//! format used by the Graphite Whisper storage engine. A single file stores
//! one metric as a series of concentric archives at progressively coarser
//! resolutions; writes into the highest-resolution archive are downsampled
//! into the coarser archives automatically.
//!
//! # Components
//!
//! - [`create`] / [`info`]: file layout and header round-trips
//! - [`update`]: single-point writes with downsampling propagation
//! - [`fetch`]: dense time-window reads that may wrap the ring
//! - [`validate_archives`]: archive list well-formedness checks
//!
//! # Example
//!
//! ```rust,ignore
//! use fennec::{create, fetch, update, ArchiveSpec, CreateOptions};
//!
//! // One archive at 1s resolution for an hour, one at 1m for a day.
//! let archives = [ArchiveSpec::new(1, 3600), ArchiveSpec::new(60, 1440)];
//! create("cpu.wsp", &archives, &CreateOptions::default())?;
//!
//! // Write a point and read it back.
//! update("cpu.wsp", 0.75, None, None)?;
//! let series = fetch("cpu.wsp", now - 300, None, None)?;
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod wsp;

pub use error::{Result, WhisperError};
pub use wsp::file::{
    auto_flush, cache_headers, clear_header_cache, create, evict_header, fetch, info,
    set_auto_flush, set_cache_headers, update, CreateOptions,
};
pub use wsp::header::{AggregationMethod, ArchiveInfo, Header, Metadata, Point};
pub use wsp::schema::{validate_archives, ArchiveSpec};
pub use wsp::{ArchiveFetch, TimeInfo, Timestamp};
