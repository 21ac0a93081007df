//! node is a typed view over one owned page image.
//!
//! A btree page is laid out as: the node header (at byte 100 on page 1, byte
//! 0 elsewhere), the cell-offset array growing rightward, free space, and the
//! cell content area growing leftward from the page end.  Mutations edit the
//! owned image; nothing reaches the file until the node is written back
//! through the btree.

use byteorder::{BigEndian, ByteOrder};

use super::cell::Cell;
use super::{Error, PageType};
use crate::dbheader::DB_HEADER_BYTES;
use crate::pager::MemPage;

/// In-memory form of one btree node.  Header fields are kept unpacked;
/// cells and the offset array live in the page image itself.
#[derive(Debug, Clone)]
pub struct Node {
    pub page: MemPage,
    pub page_type: PageType,
    pub free_offset: u16,
    pub n_cells: u16,
    pub cells_offset: u16,
    pub right_page: Option<u32>,
}

// Page 1 carries the database file header before the node header.
fn hdr_start(npage: usize) -> usize {
    if npage == 1 {
        DB_HEADER_BYTES
    } else {
        0
    }
}

impl Node {
    /// Parse the node stored in `page`.
    pub fn parse(page: MemPage) -> Result<Node, Error> {
        let start = hdr_start(page.npage);
        if page.data.len() < start + 12 {
            return Err(Error::Corrupt);
        }
        let buf = &page.data[start..];
        let page_type = PageType::from_byte(buf[0])?;
        let free_offset = BigEndian::read_u16(&buf[1..3]);
        let n_cells = BigEndian::read_u16(&buf[3..5]);
        let cells_offset = BigEndian::read_u16(&buf[5..7]);
        // buf[7] is the fragmented-free-bytes count, always zero here.
        let right_page = if page_type.is_internal() {
            Some(BigEndian::read_u32(&buf[8..12]))
        } else {
            None
        };
        Ok(Node {
            page,
            page_type,
            free_offset,
            n_cells,
            cells_offset,
            right_page,
        })
    }

    /// Initialize `page` as an empty node of the given type and return the
    /// parsed view.  Only the node header region of the image is touched.
    pub fn init_empty(page: MemPage, page_type: PageType) -> Node {
        let start = hdr_start(page.npage);
        let free_offset = (start + page_type.header_size()) as u16;
        let cells_offset = page.data.len() as u16;
        let right_page = if page_type.is_internal() {
            Some(page.npage as u32)
        } else {
            None
        };
        let mut node = Node {
            page,
            page_type,
            free_offset,
            n_cells: 0,
            cells_offset,
            right_page,
        };
        node.write_header();
        node
    }

    /// Serialize the header fields back into the page image.  Cell data and
    /// the offset array are edited in place, so this is all a write-back
    /// needs before the page goes to the pager.
    pub fn write_header(&mut self) {
        let start = hdr_start(self.page.npage);
        let buf = &mut self.page.data[start..];
        buf[0] = self.page_type.to_byte();
        BigEndian::write_u16(&mut buf[1..3], self.free_offset);
        BigEndian::write_u16(&mut buf[3..5], self.n_cells);
        BigEndian::write_u16(&mut buf[5..7], self.cells_offset);
        buf[7] = 0;
        if let Some(rp) = self.right_page {
            BigEndian::write_u32(&mut buf[8..12], rp);
        }
    }

    // Byte position of entry `i` of the cell-offset array.
    fn offset_array_pos(&self, i: usize) -> usize {
        hdr_start(self.page.npage) + self.page_type.header_size() + 2 * i
    }

    /// Read cell `ncell` (0-based).
    pub fn get_cell(&self, ncell: usize) -> Result<Cell, Error> {
        if ncell >= self.n_cells as usize {
            return Err(Error::CellNumber);
        }
        let pos = self.offset_array_pos(ncell);
        let cell_offset = BigEndian::read_u16(&self.page.data[pos..pos + 2]) as usize;
        if cell_offset >= self.page.data.len() {
            return Err(Error::Corrupt);
        }
        Cell::parse(self.page_type, &self.page.data[cell_offset..])
    }

    /// True if a cell of this size still fits, counting its offset-array slot.
    pub fn has_room(&self, cell: &Cell) -> bool {
        self.cells_offset as i32 - self.free_offset as i32 - 2 >= cell.size() as i32
    }

    /// Insert `cell` at position `ncell`, shifting later offset-array entries
    /// right.  The caller must have checked [`Node::has_room`].
    pub fn insert_cell(&mut self, ncell: usize, cell: &Cell) -> Result<(), Error> {
        let n_cells = self.n_cells as usize;
        if ncell > n_cells {
            return Err(Error::CellNumber);
        }
        let size = cell.size();
        let new_cell_offset = self.cells_offset as usize - size;
        cell.write_to(&mut self.page.data[new_cell_offset..new_cell_offset + size]);

        // Shift offset-array entries at and after ncell one slot right.
        for i in (ncell..n_cells).rev() {
            let from = self.offset_array_pos(i);
            let v = BigEndian::read_u16(&self.page.data[from..from + 2]);
            let to = self.offset_array_pos(i + 1);
            BigEndian::write_u16(&mut self.page.data[to..to + 2], v);
        }
        let pos = self.offset_array_pos(ncell);
        BigEndian::write_u16(&mut self.page.data[pos..pos + 2], new_cell_offset as u16);

        self.free_offset += 2;
        self.n_cells += 1;
        self.cells_offset = new_cell_offset as u16;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_page(npage: usize) -> MemPage {
        MemPage {
            npage,
            data: vec![0u8; 1024],
        }
    }

    #[test]
    fn test_init_empty_table_leaf_layout() {
        let node = Node::init_empty(blank_page(2), PageType::TableLeaf);
        assert_eq!(node.page.data[0], 0x0D);
        assert_eq!(node.free_offset, 8);
        assert_eq!(node.n_cells, 0);
        assert_eq!(node.cells_offset, 1024);
        assert!(node.right_page.is_none());
    }

    #[test]
    fn test_init_empty_on_page_one_offsets_header() {
        let node = Node::init_empty(blank_page(1), PageType::TableLeaf);
        assert_eq!(node.page.data[100], 0x0D);
        assert_eq!(node.free_offset, 108);
        assert_eq!(node.cells_offset, 1024);
    }

    #[test]
    fn test_insert_and_get_cells_in_key_positions() {
        let mut node = Node::init_empty(blank_page(2), PageType::TableLeaf);
        let c1 = Cell::TableLeaf {
            key: 1,
            payload: vec![0x11],
        };
        let c3 = Cell::TableLeaf {
            key: 3,
            payload: vec![0x33],
        };
        let c2 = Cell::TableLeaf {
            key: 2,
            payload: vec![0x22],
        };
        node.insert_cell(0, &c1).unwrap();
        node.insert_cell(1, &c3).unwrap();
        // Inserting in the middle shifts the offset array, not the cells.
        node.insert_cell(1, &c2).unwrap();
        assert_eq!(node.n_cells, 3);
        assert_eq!(node.get_cell(0).unwrap(), c1);
        assert_eq!(node.get_cell(1).unwrap(), c2);
        assert_eq!(node.get_cell(2).unwrap(), c3);
        assert!(node.get_cell(3).is_err());
        // Three 9-byte cells grow the cell area leftward from the page end.
        assert_eq!(node.cells_offset, 1024 - 27);
        assert_eq!(node.free_offset, 8 + 6);
    }

    #[test]
    fn test_has_room_accounts_for_offset_slot() {
        let mut node = Node::init_empty(blank_page(2), PageType::TableLeaf);
        // Leave exactly 10 bytes between the offset array and the cell area.
        let filler = Cell::TableLeaf {
            key: 1,
            payload: vec![0u8; 1024 - 8 - 2 - 10 - 8],
        };
        node.insert_cell(0, &filler).unwrap();
        let eight = Cell::TableLeaf {
            key: 2,
            payload: vec![],
        };
        assert!(node.has_room(&eight)); // 8 + 2 == 10
        let nine = Cell::TableLeaf {
            key: 2,
            payload: vec![0],
        };
        assert!(!node.has_room(&nine)); // 9 + 2 > 10
    }

    #[test]
    fn test_header_roundtrip_through_write() {
        let mut node = Node::init_empty(blank_page(2), PageType::IndexInternal);
        node.right_page = Some(9);
        node.write_header();
        let reparsed = Node::parse(node.page.clone()).unwrap();
        assert_eq!(reparsed.page_type, PageType::IndexInternal);
        assert_eq!(reparsed.right_page, Some(9));
        assert_eq!(reparsed.free_offset, 12);
    }
}
