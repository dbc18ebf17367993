//! Big-endian primitives for the on-disk format.
//!
//! Everything in a whisper file is either a `u64` or an IEEE-754 `f64`,
//! both stored big-endian with no padding.

use std::io::{self, Read, Write};

/// Reads a big-endian `u64`.
pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads a big-endian IEEE-754 `f64`.
pub fn read_f64<R: Read>(reader: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

/// Writes a big-endian `u64`.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

/// Writes a big-endian IEEE-754 `f64`.
pub fn write_f64<W: Write>(writer: &mut W, value: f64) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_u64_roundtrip() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u64(&mut cursor).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_f64_roundtrip() {
        for value in [0.0, 1.337, -273.15, f64::MAX, f64::MIN_POSITIVE] {
            let mut buf = Vec::new();
            write_f64(&mut buf, value).unwrap();
            assert_eq!(buf.len(), 8);

            let mut cursor = Cursor::new(buf);
            assert_eq!(read_f64(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_f64_is_big_endian() {
        let mut buf = Vec::new();
        write_f64(&mut buf, 1.0).unwrap();
        // IEEE-754 for 1.0 is 0x3FF0000000000000, sign/exponent byte first.
        assert_eq!(buf, [0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_short_read() {
        let mut cursor = Cursor::new(vec![0u8; 4]);
        assert!(read_u64(&mut cursor).is_err());
    }
}
