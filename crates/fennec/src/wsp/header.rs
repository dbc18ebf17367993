//! Header block: metadata, archive index, and point codecs.
//!
//! The header occupies the first `32 + 24 × archive_count` bytes of a file
//! and is written exactly once, at creation time. Everything after it is
//! ring-buffer point data addressed by [`crate::wsp::archive`].

use crate::error::{Result, WhisperError};
use crate::wsp::codec::{read_f64, read_u64, write_f64, write_u64};
use crate::wsp::Timestamp;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Size of the metadata block in bytes.
pub const METADATA_SIZE: u64 = 32;

/// Size of one archive index entry in bytes.
pub const ARCHIVE_INFO_SIZE: u64 = 24;

/// Size of one (timestamp, value) point in bytes.
pub const POINT_SIZE: u64 = 16;

/// How finer-archive values are consolidated into coarser archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u64)]
pub enum AggregationMethod {
    /// Arithmetic mean of the known values.
    #[default]
    Average = 1,
    /// Sum of the known values.
    Sum = 2,
    /// Last known value in ring order.
    Last = 3,
    /// Largest known value.
    Max = 4,
    /// Smallest known value.
    Min = 5,
}

impl AggregationMethod {
    /// Decodes an aggregation method from its wire value.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidAggregationMethod` for an unknown
    /// discriminant.
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            1 => Ok(Self::Average),
            2 => Ok(Self::Sum),
            3 => Ok(Self::Last),
            4 => Ok(Self::Max),
            5 => Ok(Self::Min),
            other => Err(WhisperError::InvalidAggregationMethod(other)),
        }
    }

    /// Returns the wire value of this method.
    pub fn as_u64(self) -> u64 {
        self as u64
    }

    /// Consolidates a sequence of known values into one.
    ///
    /// `values` must be non-empty; the propagation path never aggregates an
    /// empty window. `Average` over an empty slice yields NaN, `Max`/`Min`
    /// yield infinities, and `Last` yields NaN.
    pub fn aggregate(self, values: &[f64]) -> f64 {
        match self {
            Self::Average => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Last => values.last().copied().unwrap_or(f64::NAN),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

/// Fixed-size metadata block at the start of every file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    /// Consolidation method used during propagation.
    pub aggregation: AggregationMethod,
    /// Longest retention across all archives, in seconds.
    pub max_retention: u64,
    /// Minimum fraction of known finer slots required to write a coarser
    /// point, in `[0, 1]`.
    pub x_files_factor: f64,
    /// Number of archive index entries following the metadata.
    pub archive_count: u64,
}

impl Metadata {
    /// Writes the metadata block in big-endian wire order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.aggregation.as_u64())?;
        write_u64(writer, self.max_retention)?;
        write_f64(writer, self.x_files_factor)?;
        write_u64(writer, self.archive_count)?;
        Ok(())
    }

    /// Reads a metadata block.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidAggregationMethod` for an unknown
    /// aggregation discriminant, or an I/O error on a short read.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let aggregation = AggregationMethod::from_u64(read_u64(reader)?)?;
        let max_retention = read_u64(reader)?;
        let x_files_factor = read_f64(reader)?;
        let archive_count = read_u64(reader)?;
        Ok(Self {
            aggregation,
            max_retention,
            x_files_factor,
            archive_count,
        })
    }
}

/// One archive index entry: where a ring lives and at what resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Byte offset of the ring's first slot from the start of the file.
    pub offset: u64,
    /// Bucket width of the archive, in seconds.
    pub seconds_per_point: u64,
    /// Number of slots in the ring.
    pub points: u64,
}

impl ArchiveInfo {
    /// Creates an index entry for a ring at `offset`.
    pub fn new(offset: u64, seconds_per_point: u64, points: u64) -> Self {
        Self {
            offset,
            seconds_per_point,
            points,
        }
    }

    /// Total wall-clock span the archive covers, in seconds.
    pub fn retention(&self) -> u64 {
        self.seconds_per_point * self.points
    }

    /// Size of the ring in bytes.
    pub fn size(&self) -> u64 {
        POINT_SIZE * self.points
    }

    /// Byte offset one past the last slot of the ring.
    pub fn end(&self) -> u64 {
        self.offset + self.size()
    }

    /// Aligns a timestamp down to this archive's bucket grid.
    pub fn interval(&self, timestamp: Timestamp) -> Timestamp {
        timestamp - timestamp % self.seconds_per_point
    }

    /// Writes the index entry in big-endian wire order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.offset)?;
        write_u64(writer, self.seconds_per_point)?;
        write_u64(writer, self.points)?;
        Ok(())
    }

    /// Reads an index entry.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let offset = read_u64(reader)?;
        let seconds_per_point = read_u64(reader)?;
        let points = read_u64(reader)?;
        Ok(Self {
            offset,
            seconds_per_point,
            points,
        })
    }
}

/// One 16-byte ring slot: a timestamp and a value.
///
/// The default point (timestamp zero) is the on-disk sentinel for an
/// unwritten slot; a legitimate unix time of zero is unrepresentable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    /// Unix seconds, aligned to the owning archive's bucket grid. Zero
    /// means the slot has never been written.
    pub timestamp: Timestamp,
    /// The stored sample.
    pub value: f64,
}

impl Point {
    /// Creates a point.
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Writes the point in big-endian wire order.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.timestamp)?;
        write_f64(writer, self.value)?;
        Ok(())
    }

    /// Reads a point.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let timestamp = read_u64(reader)?;
        let value = read_f64(reader)?;
        Ok(Self { timestamp, value })
    }
}

/// Parsed file header: metadata plus the archive index.
///
/// Archives are ordered ascending by `seconds_per_point` (finest first),
/// with strictly increasing, contiguous offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The metadata block.
    pub metadata: Metadata,
    /// Archive index entries, finest resolution first.
    pub archives: Vec<ArchiveInfo>,
}

impl Header {
    /// Reads and decodes the header at the start of `reader`.
    ///
    /// `path` is used for error context only.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::CorruptWhisperFile` naming the field or
    /// region that failed to decode.
    pub fn read_from<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;

        let metadata = Metadata::read_from(reader)
            .map_err(|err| WhisperError::corrupt(path, format!("metadata: {err}")))?;

        if metadata.archive_count == 0 {
            return Err(WhisperError::corrupt(path, "metadata: archive count is zero"));
        }

        let mut archives = Vec::new();
        for index in 0..metadata.archive_count {
            let archive = ArchiveInfo::read_from(reader)
                .map_err(|err| WhisperError::corrupt(path, format!("archive {index}: {err}")))?;
            archives.push(archive);
        }

        Ok(Self { metadata, archives })
    }

    /// Writes the metadata block followed by the archive index.
    ///
    /// Used only at file creation time; headers never change afterwards.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.metadata.write_to(writer)?;
        for archive in &self.archives {
            archive.write_to(writer)?;
        }
        Ok(())
    }

    /// Total size of the header region in bytes.
    pub fn size(&self) -> u64 {
        METADATA_SIZE + ARCHIVE_INFO_SIZE * self.archives.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn test_metadata_size() {
        let metadata = Metadata {
            aggregation: AggregationMethod::Average,
            max_retention: 3600,
            x_files_factor: 0.5,
            archive_count: 2,
        };
        let mut buf = Vec::new();
        metadata.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, METADATA_SIZE);
    }

    #[test]
    fn test_metadata_roundtrip() {
        let metadata = Metadata {
            aggregation: AggregationMethod::Max,
            max_retention: 86400,
            x_files_factor: 0.25,
            archive_count: 3,
        };
        let mut buf = Vec::new();
        metadata.write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let read_back = Metadata::read_from(&mut cursor).unwrap();
        assert_eq!(metadata, read_back);
    }

    #[test]
    fn test_metadata_invalid_aggregation() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 9).unwrap();
        write_u64(&mut buf, 3600).unwrap();
        write_f64(&mut buf, 0.5).unwrap();
        write_u64(&mut buf, 1).unwrap();

        let mut cursor = Cursor::new(buf);
        let result = Metadata::read_from(&mut cursor);
        assert!(matches!(
            result,
            Err(WhisperError::InvalidAggregationMethod(9))
        ));
    }

    #[test]
    fn test_archive_info_roundtrip() {
        let archive = ArchiveInfo::new(80, 60, 1440);
        let mut buf = Vec::new();
        archive.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, ARCHIVE_INFO_SIZE);

        let mut cursor = Cursor::new(buf);
        assert_eq!(ArchiveInfo::read_from(&mut cursor).unwrap(), archive);
    }

    #[test]
    fn test_archive_info_derived_quantities() {
        let archive = ArchiveInfo::new(80, 60, 1440);
        assert_eq!(archive.retention(), 86400);
        assert_eq!(archive.size(), 16 * 1440);
        assert_eq!(archive.end(), 80 + 16 * 1440);
        assert_eq!(archive.interval(119), 60);
        assert_eq!(archive.interval(120), 120);
    }

    #[test]
    fn test_point_roundtrip() {
        let point = Point::new(1_234_567_890, 42.5);
        let mut buf = Vec::new();
        point.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, POINT_SIZE);

        let mut cursor = Cursor::new(buf);
        assert_eq!(Point::read_from(&mut cursor).unwrap(), point);
    }

    #[test]
    fn test_default_point_is_empty_sentinel() {
        let point = Point::default();
        assert_eq!(point.timestamp, 0);

        let mut buf = Vec::new();
        point.write_to(&mut buf).unwrap();
        assert_eq!(buf, vec![0u8; POINT_SIZE as usize]);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            metadata: Metadata {
                aggregation: AggregationMethod::Sum,
                max_retention: 3600,
                x_files_factor: 0.5,
                archive_count: 2,
            },
            archives: vec![ArchiveInfo::new(80, 1, 60), ArchiveInfo::new(1040, 60, 60)],
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, header.size());

        let mut cursor = Cursor::new(buf);
        let read_back = Header::read_from(&mut cursor, &PathBuf::from("test.wsp")).unwrap();
        assert_eq!(header, read_back);
    }

    #[test]
    fn test_header_short_read() {
        let mut cursor = Cursor::new(vec![0u8; 10]);
        let result = Header::read_from(&mut cursor, &PathBuf::from("short.wsp"));
        assert!(matches!(
            result,
            Err(WhisperError::CorruptWhisperFile { .. })
        ));
    }

    #[test]
    fn test_header_truncated_archive_index() {
        let metadata = Metadata {
            aggregation: AggregationMethod::Average,
            max_retention: 60,
            x_files_factor: 0.5,
            archive_count: 2,
        };
        let mut buf = Vec::new();
        metadata.write_to(&mut buf).unwrap();
        ArchiveInfo::new(80, 1, 60).write_to(&mut buf).unwrap();
        // Second entry missing.

        let mut cursor = Cursor::new(buf);
        let result = Header::read_from(&mut cursor, &PathBuf::from("truncated.wsp"));
        match result {
            Err(WhisperError::CorruptWhisperFile { detail, .. }) => {
                assert!(detail.contains("archive 1"), "detail: {detail}");
            }
            other => panic!("expected corrupt file error, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregation_method_wire_values() {
        for (value, method) in [
            (1, AggregationMethod::Average),
            (2, AggregationMethod::Sum),
            (3, AggregationMethod::Last),
            (4, AggregationMethod::Max),
            (5, AggregationMethod::Min),
        ] {
            assert_eq!(AggregationMethod::from_u64(value).unwrap(), method);
            assert_eq!(method.as_u64(), value);
        }
        assert!(AggregationMethod::from_u64(0).is_err());
        assert!(AggregationMethod::from_u64(6).is_err());
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(AggregationMethod::Min.aggregate(&[1.0, 2.0, 3.0, 4.0]), 1.0);
        assert_eq!(AggregationMethod::Max.aggregate(&[1.0, 2.0, 3.0, 4.0]), 4.0);
        assert_eq!(AggregationMethod::Last.aggregate(&[3.0, 2.0, 5.0, 4.0]), 4.0);
        assert_eq!(AggregationMethod::Sum.aggregate(&[10.0, 2.0, 3.0, 4.0]), 19.0);
        assert_eq!(
            AggregationMethod::Average.aggregate(&[1.0, 2.0, 3.0, 4.0]),
            2.5
        );
    }
}
