//! dbheader reads and writes the 100-byte header at the start of the database file.
//!
//! The header begins with the literal string "SQLite format 3\0" followed by
//! a number of fixed fields.  Only the page size varies between files; every
//! other field this engine recognizes must hold its expected constant, and a
//! file that disagrees is rejected as corrupt.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read, Seek, SeekFrom};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("The magic bytes for this file are wrong.")]
    WrongMagic,
    #[error("The pagesize is not supported by this code.")]
    UnsupportedPagesize,
    #[error("A fixed header field does not hold its expected constant.")]
    BadConstant,
    #[error("Error reading file header.")]
    ReadFailed,
}

pub const DB_HEADER_BYTES: usize = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 1024;

const MAGIC_STRING: &[u8] = &[
    0x53, 0x51, 0x4c, 0x69, 0x74, 0x65, 0x20, 0x66, 0x6f, 0x72, 0x6d, 0x61, 0x74, 0x20, 0x33, 0x00,
];
// Bytes 18..24: format versions, reserved space, payload fractions.
const CONSTANT_BLOCK_18_23: &[u8] = &[0x01, 0x01, 0x00, 0x40, 0x20, 0x20];
const PAGE_CACHE_SIZE: u32 = 20000;

// The file header.
#[derive(Debug, Clone, PartialEq)]
pub struct DbFileHeader {
    pub pagesize: u32,
}

/// Build the header image written into a freshly created file.
pub fn default_header(pagesize: u32) -> [u8; DB_HEADER_BYTES] {
    let mut h = [0u8; DB_HEADER_BYTES];
    h[0..16].copy_from_slice(MAGIC_STRING);
    h[16] = (pagesize >> 8) as u8;
    h[17] = pagesize as u8;
    h[18..24].copy_from_slice(CONSTANT_BLOCK_18_23);
    // Bytes 44..48 and 56..60 hold the constant 1.
    h[47] = 0x01;
    h[48] = (PAGE_CACHE_SIZE >> 24) as u8;
    h[49] = (PAGE_CACHE_SIZE >> 16) as u8;
    h[50] = (PAGE_CACHE_SIZE >> 8) as u8;
    h[51] = PAGE_CACHE_SIZE as u8;
    h[59] = 0x01;
    h
}

/// Parse and validate a header image, returning the fields that vary.
/// Every recognized fixed field is checked; a mismatch fails the open.
pub fn parse_header(bytes: &[u8]) -> Result<DbFileHeader, Error> {
    if bytes.len() < DB_HEADER_BYTES {
        return Err(Error::ReadFailed);
    }
    let mut c = Cursor::new(bytes);

    // Offset 0, size 16: the header string.
    let mut magic = [0u8; 16];
    c.read_exact(&mut magic).map_err(|_| Error::ReadFailed)?;
    if magic != MAGIC_STRING {
        return Err(Error::WrongMagic);
    }

    // Offset 16, size 2: the page size, big-endian.
    let pagesize: u32 = match c.read_u16::<BigEndian>().map_err(|_| Error::ReadFailed)? {
        ps @ (512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768) => ps as u32,
        _ => return Err(Error::UnsupportedPagesize),
    };

    // Offset 18, size 6: fixed constant block.
    let mut block = [0u8; 6];
    c.read_exact(&mut block).map_err(|_| Error::ReadFailed)?;
    if block != CONSTANT_BLOCK_18_23 {
        return Err(Error::BadConstant);
    }

    // Offset 24, size 4: file change counter, always zero here.
    if c.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)? != 0 {
        return Err(Error::BadConstant);
    }
    // Offset 28, size 4: in-header page count; not validated.
    c.seek(SeekFrom::Start(32)).map_err(|_| Error::ReadFailed)?;

    // Offset 32, size 8: freelist fields, zero.
    if c.read_u64::<BigEndian>().map_err(|_| Error::ReadFailed)? != 0 {
        return Err(Error::BadConstant);
    }
    // Offset 40, size 4: schema version, zero.
    if c.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)? != 0 {
        return Err(Error::BadConstant);
    }
    // Offset 44, size 4: constant 1.
    if c.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)? != 1 {
        return Err(Error::BadConstant);
    }
    // Offset 48, size 4: page cache size constant.
    if c.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)? != PAGE_CACHE_SIZE {
        return Err(Error::BadConstant);
    }
    // Offset 52, size 8: read as one big-endian integer, must equal 1
    // (bytes 52..56 zero, bytes 56..60 holding 1).
    if c.read_u64::<BigEndian>().map_err(|_| Error::ReadFailed)? != 1 {
        return Err(Error::BadConstant);
    }
    // Offset 60, size 4: user cookie, zero.
    if c.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)? != 0 {
        return Err(Error::BadConstant);
    }
    // Offset 64, size 4: incremental-vacuum flag, zero.
    if c.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)? != 0 {
        return Err(Error::BadConstant);
    }

    Ok(DbFileHeader { pagesize })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header_parses() {
        let h = default_header(DEFAULT_PAGE_SIZE);
        let parsed = parse_header(&h).expect("default header should validate");
        assert_eq!(parsed.pagesize, 1024);
    }

    #[test]
    fn test_default_header_fixed_bytes() {
        let h = default_header(DEFAULT_PAGE_SIZE);
        assert_eq!(&h[0..16], MAGIC_STRING);
        assert_eq!(h[16], 0x04);
        assert_eq!(h[17], 0x00);
        assert_eq!(&h[18..24], CONSTANT_BLOCK_18_23);
        assert_eq!(&h[44..48], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&h[48..52], &[0x00, 0x00, 0x4E, 0x20]);
        assert_eq!(&h[56..60], &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let mut h = default_header(DEFAULT_PAGE_SIZE);
        h[0] = b'X';
        assert_eq!(parse_header(&h), Err(Error::WrongMagic));
    }

    #[test]
    fn test_corrupt_constant_rejected() {
        // Byte 44 flipped to 0x02 must fail validation.
        let mut h = default_header(DEFAULT_PAGE_SIZE);
        h[44] = 0x02;
        assert_eq!(parse_header(&h), Err(Error::BadConstant));

        let mut h = default_header(DEFAULT_PAGE_SIZE);
        h[24] = 0x01; // file change counter
        assert_eq!(parse_header(&h), Err(Error::BadConstant));

        let mut h = default_header(DEFAULT_PAGE_SIZE);
        h[50] = 0x00; // page cache size
        assert_eq!(parse_header(&h), Err(Error::BadConstant));
    }

    #[test]
    fn test_bad_pagesize_rejected() {
        let mut h = default_header(DEFAULT_PAGE_SIZE);
        h[16] = 0x03;
        assert_eq!(parse_header(&h), Err(Error::UnsupportedPagesize));
    }
}
