//! Ring-buffer archive addressing.
//!
//! An archive is a flat run of 16-byte slots used as a circular buffer.
//! The timestamp stored in slot 0 (the base interval) anchors the ring:
//! the slot for any aligned timestamp is found by measuring its distance
//! from the base interval in points and wrapping the byte distance into
//! the ring with a Euclidean remainder. The remainder must be Euclidean
//! because a write earlier than the base interval yields a negative byte
//! distance.

use crate::error::Result;
use crate::wsp::header::{ArchiveInfo, Point, POINT_SIZE};
use crate::wsp::Timestamp;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Reads the base point (slot 0) of an archive.
///
/// A zero base timestamp means the archive has never been written.
pub fn read_base<R: Read + Seek>(reader: &mut R, archive: &ArchiveInfo) -> Result<Point> {
    reader.seek(SeekFrom::Start(archive.offset))?;
    Point::read_from(reader)
}

/// Byte offset of the slot covering `interval`, anchored at `base_interval`.
///
/// `interval` must be aligned to the archive's grid. An interval earlier
/// than the base yields a negative point distance; the Euclidean remainder
/// wraps it back into `[archive.offset, archive.end())`.
pub fn slot_offset(archive: &ArchiveInfo, base_interval: Timestamp, interval: Timestamp) -> u64 {
    let time_distance = interval as i64 - base_interval as i64;
    let point_distance = time_distance / archive.seconds_per_point as i64;
    let byte_distance = point_distance * POINT_SIZE as i64;
    archive.offset + byte_distance.rem_euclid(archive.size() as i64) as u64
}

/// Reads the ring slice `[from_offset, until_offset)` into one buffer.
///
/// When `until_offset <= from_offset` the read wraps: the tail of the ring
/// is followed by its head, so index 0 of the returned buffer is always
/// the slot at `from_offset`. Equal offsets read the entire ring.
pub fn read_ring<R: Read + Seek>(
    reader: &mut R,
    archive: &ArchiveInfo,
    from_offset: u64,
    until_offset: u64,
) -> Result<Vec<u8>> {
    if from_offset < until_offset {
        let mut buf = vec![0u8; (until_offset - from_offset) as usize];
        reader.seek(SeekFrom::Start(from_offset))?;
        reader.read_exact(&mut buf)?;
        Ok(buf)
    } else {
        let tail = (archive.end() - from_offset) as usize;
        let head = (until_offset - archive.offset) as usize;
        let mut buf = vec![0u8; tail + head];
        reader.seek(SeekFrom::Start(from_offset))?;
        reader.read_exact(&mut buf[..tail])?;
        reader.seek(SeekFrom::Start(archive.offset))?;
        reader.read_exact(&mut buf[tail..])?;
        Ok(buf)
    }
}

/// Decodes a packed run of slots, as returned by [`read_ring`].
pub fn unpack_points(buf: &[u8]) -> Result<Vec<Point>> {
    let count = buf.len() / POINT_SIZE as usize;
    let mut cursor = Cursor::new(buf);
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push(Point::read_from(&mut cursor)?);
    }
    Ok(points)
}

/// Writes one point at an absolute byte offset.
pub fn write_point_at<W: Write + Seek>(writer: &mut W, offset: u64, point: &Point) -> Result<()> {
    writer.seek(SeekFrom::Start(offset))?;
    point.write_to(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 4-slot ring at offset 32 with 10-second buckets, stored in memory.
    fn ring_fixture() -> (ArchiveInfo, Cursor<Vec<u8>>) {
        let archive = ArchiveInfo::new(32, 10, 4);
        let file = Cursor::new(vec![0u8; archive.end() as usize]);
        (archive, file)
    }

    #[test]
    fn test_slot_offset_forward() {
        let (archive, _) = ring_fixture();
        let base = 1000;
        assert_eq!(slot_offset(&archive, base, 1000), 32);
        assert_eq!(slot_offset(&archive, base, 1010), 48);
        assert_eq!(slot_offset(&archive, base, 1030), 80);
        // One full lap lands back on the base slot.
        assert_eq!(slot_offset(&archive, base, 1040), 32);
        assert_eq!(slot_offset(&archive, base, 1050), 48);
    }

    #[test]
    fn test_slot_offset_before_base_wraps() {
        let (archive, _) = ring_fixture();
        let base = 1000;
        // One bucket earlier than the base is the last slot of the ring.
        assert_eq!(slot_offset(&archive, base, 990), 80);
        assert_eq!(slot_offset(&archive, base, 980), 64);
        assert_eq!(slot_offset(&archive, base, 960), 32);
    }

    #[test]
    fn test_read_base_empty() {
        let (archive, mut file) = ring_fixture();
        let base = read_base(&mut file, &archive).unwrap();
        assert_eq!(base.timestamp, 0);
    }

    #[test]
    fn test_write_then_read_base() {
        let (archive, mut file) = ring_fixture();
        write_point_at(&mut file, archive.offset, &Point::new(1000, 1.5)).unwrap();
        let base = read_base(&mut file, &archive).unwrap();
        assert_eq!(base, Point::new(1000, 1.5));
    }

    #[test]
    fn test_read_ring_contiguous() {
        let (archive, mut file) = ring_fixture();
        for slot in 0..4u64 {
            let offset = archive.offset + slot * POINT_SIZE;
            write_point_at(&mut file, offset, &Point::new(1000 + slot * 10, slot as f64)).unwrap();
        }

        let buf = read_ring(&mut file, &archive, 48, 80).unwrap();
        let points = unpack_points(&buf).unwrap();
        assert_eq!(points, vec![Point::new(1010, 1.0), Point::new(1020, 2.0)]);
    }

    #[test]
    fn test_read_ring_wraps() {
        let (archive, mut file) = ring_fixture();
        for slot in 0..4u64 {
            let offset = archive.offset + slot * POINT_SIZE;
            write_point_at(&mut file, offset, &Point::new(1000 + slot * 10, slot as f64)).unwrap();
        }

        // From the third slot through the first: tail then head.
        let buf = read_ring(&mut file, &archive, 64, 48).unwrap();
        let points = unpack_points(&buf).unwrap();
        assert_eq!(
            points,
            vec![
                Point::new(1020, 2.0),
                Point::new(1030, 3.0),
                Point::new(1000, 0.0),
            ]
        );
    }

    #[test]
    fn test_read_ring_equal_offsets_reads_whole_ring() {
        let (archive, mut file) = ring_fixture();
        let buf = read_ring(&mut file, &archive, 48, 48).unwrap();
        assert_eq!(buf.len() as u64, archive.size());
    }

    #[test]
    fn test_unpack_points_empty() {
        assert!(unpack_points(&[]).unwrap().is_empty());
    }
}
