//! cell parses and serializes the keyed entries stored inside btree nodes.
//!
//! Each of the four node types has its own cell layout.  Table cells encode
//! their key as a varint32; index cells are fixed-size and begin (after the
//! child pointer, for internals) with the constant marker 0x0B030404.

use byteorder::{BigEndian, ByteOrder};

use super::{Error, Key, PageType};
use crate::varint::{get_varint32, put_varint32};

// Leading constant of every index cell.
pub const INDEX_CELL_MARKER: u32 = 0x0B030404;

pub const TABLE_INTERNAL_CELL_SIZE: usize = 8;
pub const TABLE_LEAF_CELL_OVERHEAD: usize = 8;
pub const INDEX_INTERNAL_CELL_SIZE: usize = 16;
pub const INDEX_LEAF_CELL_SIZE: usize = 12;

/// One cell, owned.  Table-leaf payloads are copied out of the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    TableInternal {
        child_page: u32,
        key: Key,
    },
    TableLeaf {
        key: Key,
        payload: Vec<u8>,
    },
    IndexInternal {
        child_page: u32,
        key: Key,
        pkey: Key,
    },
    IndexLeaf {
        key: Key,
        pkey: Key,
    },
}

impl Cell {
    pub fn key(&self) -> Key {
        match self {
            Cell::TableInternal { key, .. }
            | Cell::TableLeaf { key, .. }
            | Cell::IndexInternal { key, .. }
            | Cell::IndexLeaf { key, .. } => *key,
        }
    }

    /// Child page pointer, for internal cells.
    pub fn child_page(&self) -> Option<u32> {
        match self {
            Cell::TableInternal { child_page, .. } | Cell::IndexInternal { child_page, .. } => {
                Some(*child_page)
            }
            _ => None,
        }
    }

    /// Index primary key, for index cells.
    pub fn pkey(&self) -> Option<Key> {
        match self {
            Cell::IndexInternal { pkey, .. } | Cell::IndexLeaf { pkey, .. } => Some(*pkey),
            _ => None,
        }
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Cell::TableInternal { .. } => TABLE_INTERNAL_CELL_SIZE,
            Cell::TableLeaf { payload, .. } => TABLE_LEAF_CELL_OVERHEAD + payload.len(),
            Cell::IndexInternal { .. } => INDEX_INTERNAL_CELL_SIZE,
            Cell::IndexLeaf { .. } => INDEX_LEAF_CELL_SIZE,
        }
    }

    /// The node type this cell belongs in.
    pub fn page_type(&self) -> PageType {
        match self {
            Cell::TableInternal { .. } => PageType::TableInternal,
            Cell::TableLeaf { .. } => PageType::TableLeaf,
            Cell::IndexInternal { .. } => PageType::IndexInternal,
            Cell::IndexLeaf { .. } => PageType::IndexLeaf,
        }
    }

    /// Parse a cell of the given node type from `buf`, a slice beginning at
    /// the cell's page offset.
    pub fn parse(page_type: PageType, buf: &[u8]) -> Result<Cell, Error> {
        match page_type {
            PageType::TableInternal => {
                if buf.len() < TABLE_INTERNAL_CELL_SIZE {
                    return Err(Error::Corrupt);
                }
                Ok(Cell::TableInternal {
                    child_page: BigEndian::read_u32(&buf[0..4]),
                    key: get_varint32(&buf[4..8]),
                })
            }
            PageType::TableLeaf => {
                if buf.len() < TABLE_LEAF_CELL_OVERHEAD {
                    return Err(Error::Corrupt);
                }
                let data_size = get_varint32(&buf[0..4]) as usize;
                let key = get_varint32(&buf[4..8]);
                if buf.len() < TABLE_LEAF_CELL_OVERHEAD + data_size {
                    return Err(Error::Corrupt);
                }
                Ok(Cell::TableLeaf {
                    key,
                    payload: buf[8..8 + data_size].to_vec(),
                })
            }
            PageType::IndexInternal => {
                if buf.len() < INDEX_INTERNAL_CELL_SIZE {
                    return Err(Error::Corrupt);
                }
                Ok(Cell::IndexInternal {
                    child_page: BigEndian::read_u32(&buf[0..4]),
                    key: BigEndian::read_u32(&buf[8..12]),
                    pkey: BigEndian::read_u32(&buf[12..16]),
                })
            }
            PageType::IndexLeaf => {
                if buf.len() < INDEX_LEAF_CELL_SIZE {
                    return Err(Error::Corrupt);
                }
                Ok(Cell::IndexLeaf {
                    key: BigEndian::read_u32(&buf[4..8]),
                    pkey: BigEndian::read_u32(&buf[8..12]),
                })
            }
        }
    }

    /// Serialize into `buf`, which must hold exactly [`Cell::size`] bytes.
    pub fn write_to(&self, buf: &mut [u8]) {
        match self {
            Cell::TableInternal { child_page, key } => {
                BigEndian::write_u32(&mut buf[0..4], *child_page);
                put_varint32(&mut buf[4..8], *key);
            }
            Cell::TableLeaf { key, payload } => {
                put_varint32(&mut buf[0..4], payload.len() as u32);
                put_varint32(&mut buf[4..8], *key);
                buf[8..8 + payload.len()].copy_from_slice(payload);
            }
            Cell::IndexInternal {
                child_page,
                key,
                pkey,
            } => {
                BigEndian::write_u32(&mut buf[0..4], *child_page);
                BigEndian::write_u32(&mut buf[4..8], INDEX_CELL_MARKER);
                BigEndian::write_u32(&mut buf[8..12], *key);
                BigEndian::write_u32(&mut buf[12..16], *pkey);
            }
            Cell::IndexLeaf { key, pkey } => {
                BigEndian::write_u32(&mut buf[0..4], INDEX_CELL_MARKER);
                BigEndian::write_u32(&mut buf[4..8], *key);
                BigEndian::write_u32(&mut buf[8..12], *pkey);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_internal_roundtrip() {
        let cell = Cell::TableInternal {
            child_page: 7,
            key: 300,
        };
        let mut buf = vec![0u8; cell.size()];
        cell.write_to(&mut buf);
        assert_eq!(Cell::parse(PageType::TableInternal, &buf).unwrap(), cell);
    }

    #[test]
    fn test_table_leaf_roundtrip() {
        let cell = Cell::TableLeaf {
            key: 1,
            payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let mut buf = vec![0u8; cell.size()];
        cell.write_to(&mut buf);
        assert_eq!(cell.size(), 12);
        assert_eq!(Cell::parse(PageType::TableLeaf, &buf).unwrap(), cell);
    }

    #[test]
    fn test_index_cells_carry_marker() {
        let cell = Cell::IndexInternal {
            child_page: 3,
            key: 10,
            pkey: 20,
        };
        let mut buf = vec![0u8; cell.size()];
        cell.write_to(&mut buf);
        assert_eq!(&buf[4..8], &[0x0B, 0x03, 0x04, 0x04]);
        assert_eq!(Cell::parse(PageType::IndexInternal, &buf).unwrap(), cell);

        let leaf = Cell::IndexLeaf { key: 10, pkey: 20 };
        let mut buf = vec![0u8; leaf.size()];
        leaf.write_to(&mut buf);
        assert_eq!(&buf[0..4], &[0x0B, 0x03, 0x04, 0x04]);
        assert_eq!(Cell::parse(PageType::IndexLeaf, &buf).unwrap(), leaf);
    }

    #[test]
    fn test_table_leaf_key_is_varint_encoded() {
        let cell = Cell::TableLeaf {
            key: 2,
            payload: vec![],
        };
        let mut buf = vec![0u8; cell.size()];
        cell.write_to(&mut buf);
        assert_eq!(buf, hex::decode("8080800080808002").unwrap());
    }
}
