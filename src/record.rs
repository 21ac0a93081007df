//! record encodes and decodes the typed column tuples stored in table-leaf cells.
//!
//! A record is a header followed by the column payloads in declaration order.
//! The header starts with its own length as a single byte, then one type code
//! per column: 0 for NULL, 1/2/4 for big-endian integers of that many bytes,
//! and `2*len + 13` (always odd, always >= 13) for a text string of `len`
//! bytes.  Integer type codes occupy one header byte; text codes are written
//! as a varint32 and occupy four.

use byteorder::{BigEndian, ByteOrder};

use crate::varint::{get_varint32, put_varint32};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("The requested column is not contained in the record header.")]
    ColumnOutOfRange,
    #[error("The record header or payload is malformed.")]
    Malformed,
    #[error("Bytes were not a valid string encoding.")]
    InvalidStringEncoding,
}

/// A single column value as stored in a record.
#[derive(Debug, Clone, PartialEq)]
pub enum ColValue {
    Null,
    Int(i32),
    Text(String),
}

impl std::fmt::Display for ColValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColValue::Null => write!(f, "NULL"),
            ColValue::Int(x) => write!(f, "{}", x),
            ColValue::Text(x) => write!(f, "{}", x),
        }
    }
}

/// Encode a tuple of column values into record bytes.
pub fn encode(values: &[ColValue]) -> Vec<u8> {
    let mut header_size: usize = 1;
    let mut payload_size: usize = 0;
    for v in values {
        match v {
            ColValue::Null => header_size += 1,
            ColValue::Int(_) => {
                header_size += 1;
                payload_size += 4;
            }
            ColValue::Text(s) => {
                header_size += 4;
                payload_size += s.len();
            }
        }
    }
    let mut data = vec![0u8; header_size + payload_size];
    data[0] = header_size as u8;
    let mut hdr = 1;
    let mut body = header_size;
    for v in values {
        match v {
            ColValue::Null => {
                data[hdr] = 0;
                hdr += 1;
            }
            ColValue::Int(i) => {
                data[hdr] = 4;
                hdr += 1;
                BigEndian::write_u32(&mut data[body..body + 4], *i as u32);
                body += 4;
            }
            ColValue::Text(s) => {
                put_varint32(&mut data[hdr..hdr + 4], (2 * s.len() + 13) as u32);
                hdr += 4;
                data[body..body + s.len()].copy_from_slice(s.as_bytes());
                body += s.len();
            }
        }
    }
    data
}

// Payload size in bytes for one type code.
fn col_size(type_code: u32) -> usize {
    match type_code {
        0 => 0,
        1 => 1,
        2 => 2,
        4 => 4,
        t => ((t - 13) / 2) as usize,
    }
}

/// Locate column `ncol` (0-based): returns its type code and the byte offset
/// of its payload within `data`.
pub fn col_type_and_offset(data: &[u8], ncol: usize) -> Result<(u32, usize), Error> {
    if data.is_empty() {
        return Err(Error::Malformed);
    }
    let header_size = data[0] as usize;
    if header_size > data.len() {
        return Err(Error::Malformed);
    }
    let mut hdr = 1;
    let mut offset = header_size;
    for _ in 0..ncol {
        if hdr >= header_size {
            return Err(Error::ColumnOutOfRange);
        }
        let t = read_type_code(data, &mut hdr)?;
        offset += col_size(t);
    }
    if hdr >= header_size {
        return Err(Error::ColumnOutOfRange);
    }
    let t = read_type_code(data, &mut hdr)?;
    Ok((t, offset))
}

// Text type codes are varint32-encoded and always carry the continuation bit
// in their first byte; integer codes are a bare single byte below 128.
fn read_type_code(data: &[u8], hdr: &mut usize) -> Result<u32, Error> {
    let first = *data.get(*hdr).ok_or(Error::Malformed)?;
    if first >= 0x80 {
        if *hdr + 4 > data.len() {
            return Err(Error::Malformed);
        }
        let t = get_varint32(&data[*hdr..]);
        *hdr += 4;
        Ok(t)
    } else {
        *hdr += 1;
        Ok(first as u32)
    }
}

/// Decode column `ncol` of a record into a typed value.
pub fn decode_col(data: &[u8], ncol: usize) -> Result<ColValue, Error> {
    let (t, offset) = col_type_and_offset(data, ncol)?;
    let size = col_size(t);
    if offset + size > data.len() {
        return Err(Error::Malformed);
    }
    let bytes = &data[offset..offset + size];
    match t {
        0 => Ok(ColValue::Null),
        1 => Ok(ColValue::Int(bytes[0] as i32)),
        2 => Ok(ColValue::Int(BigEndian::read_u16(bytes) as i32)),
        4 => Ok(ColValue::Int(BigEndian::read_u32(bytes) as i32)),
        t if t >= 13 && t % 2 == 1 => {
            let s = String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidStringEncoding)?;
            Ok(ColValue::Text(s))
        }
        _ => Err(Error::Malformed),
    }
}

/// Number of columns declared in a record's header.
pub fn n_cols(data: &[u8]) -> Result<usize, Error> {
    if data.is_empty() {
        return Err(Error::Malformed);
    }
    let header_size = data[0] as usize;
    if header_size > data.len() {
        return Err(Error::Malformed);
    }
    let mut hdr = 1;
    let mut n = 0;
    while hdr < header_size {
        read_type_code(data, &mut hdr)?;
        n += 1;
    }
    Ok(n)
}
