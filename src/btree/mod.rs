//! btree manipulates the file of B-trees that makes up a database.
//!
//! "File of B-trees" because a single file holds many independent trees, each
//! identified by its root page: the schema tree rooted at page 1, and one
//! tree per table or index rooted wherever the dictionary says.  Table trees
//! map a key to a record payload; index trees map a key to a primary key.
//! All page access goes through the pager; a node is an owned view that only
//! becomes durable when written back.
//!
//! Organization of btree submodules and types:
//! *  `Cell` (module `cell`) is the per-node-type cell codec.
//! *  `Node` (module `node`) is the typed view over one page image.
//! *  `BTree` (this module) implements open/close, find, and insert with
//!    proactive splitting.

use log::{debug, info};

use crate::dbheader;
use crate::pager::{PageNum, Pager};

pub mod cell;
pub mod node;

use cell::Cell;
use node::Node;

/// Keys are 28-bit-safe unsigned integers (varint32-encodable).
pub type Key = u32;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pager: {0}")]
    Pager(#[from] crate::pager::Error),
    #[error("Corrupt file header: {0}")]
    Header(#[from] dbheader::Error),
    #[error("The provided cell number is invalid.")]
    CellNumber,
    #[error("A btree page is malformed.")]
    Corrupt,
    #[error("No entry with the given key was found.")]
    KeyNotFound,
    #[error("An entry with that key already exists.")]
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    TableInternal,
    TableLeaf,
    IndexInternal,
    IndexLeaf,
}

impl PageType {
    pub fn from_byte(b: u8) -> Result<PageType, Error> {
        match b {
            0x05 => Ok(PageType::TableInternal),
            0x0D => Ok(PageType::TableLeaf),
            0x02 => Ok(PageType::IndexInternal),
            0x0A => Ok(PageType::IndexLeaf),
            _ => Err(Error::Corrupt),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            PageType::TableInternal => 0x05,
            PageType::TableLeaf => 0x0D,
            PageType::IndexInternal => 0x02,
            PageType::IndexLeaf => 0x0A,
        }
    }

    pub fn is_internal(self) -> bool {
        matches!(self, PageType::TableInternal | PageType::IndexInternal)
    }

    pub fn is_leaf(self) -> bool {
        !self.is_internal()
    }

    pub fn is_index(self) -> bool {
        matches!(self, PageType::IndexInternal | PageType::IndexLeaf)
    }

    /// Node header size: 8 bytes for leaves, 12 for internals (right page).
    pub fn header_size(self) -> usize {
        if self.is_internal() {
            12
        } else {
            8
        }
    }
}

/// A btree file.  Owns the pager for the underlying database file.
#[derive(Debug)]
pub struct BTree {
    pub pager: Pager,
}

impl BTree {
    /// Open a btree file.  An empty file is initialized with the default
    /// header and an empty table-leaf node on page 1; an existing file has
    /// its header validated and its page size installed in the pager.
    pub fn open(filename: &str) -> Result<BTree, Error> {
        let mut pager = Pager::open(filename)?;
        if pager.is_empty()? {
            let mut bt = BTree { pager };
            let npage = bt.pager.allocate_page()?;
            let mut page = bt.pager.read_page(npage)?;
            page.data[0..dbheader::DB_HEADER_BYTES]
                .copy_from_slice(&dbheader::default_header(dbheader::DEFAULT_PAGE_SIZE));
            bt.pager.write_page(&page)?;
            bt.init_empty_node(npage, PageType::TableLeaf)?;
            info!("initialized fresh database file {}", filename);
            return Ok(bt);
        }
        let raw = pager.read_header().map_err(|e| match e {
            crate::pager::Error::NoHeader => Error::Header(dbheader::Error::ReadFailed),
            e => Error::Pager(e),
        })?;
        let hdr = dbheader::parse_header(&raw)?;
        pager.set_page_size(hdr.pagesize)?;
        Ok(BTree { pager })
    }

    /// Load the node stored on page `npage`.
    pub fn get_node(&mut self, npage: PageNum) -> Result<Node, Error> {
        let page = self.pager.read_page(npage)?;
        Node::parse(page)
    }

    /// Write a node's header into its page image and flush the page.
    pub fn write_node(&mut self, node: &mut Node) -> Result<(), Error> {
        node.write_header();
        self.pager.write_page(&node.page)?;
        Ok(())
    }

    /// Allocate a fresh page and initialize it as an empty node.
    pub fn new_node(&mut self, page_type: PageType) -> Result<PageNum, Error> {
        let npage = self.pager.allocate_page()?;
        self.init_empty_node(npage, page_type)?;
        Ok(npage)
    }

    /// (Re)initialize page `npage` as an empty node of `page_type`.  Existing
    /// bytes outside the node header are left alone, which is what preserves
    /// the file header when page 1 is reinitialized.
    pub fn init_empty_node(&mut self, npage: PageNum, page_type: PageType) -> Result<(), Error> {
        let page = self.pager.read_page(npage)?;
        let mut node = Node::init_empty(page, page_type);
        self.write_node(&mut node)?;
        Ok(())
    }

    /// Find `key` in the tree rooted at `nroot`.  Returns a copy of the
    /// record payload for table trees, or an empty marker for index trees.
    pub fn find(&mut self, nroot: PageNum, key: Key) -> Result<Vec<u8>, Error> {
        let mut npage = nroot;
        loop {
            let node = self.get_node(npage)?;
            debug!(
                "find: page {} type {:?} n_cells {} looking for {}",
                npage, node.page_type, node.n_cells, key
            );
            if node.page_type.is_internal() {
                let mut next = node.right_page.ok_or(Error::Corrupt)?;
                for i in 0..node.n_cells as usize {
                    let cell = node.get_cell(i)?;
                    if key <= cell.key() {
                        if node.page_type == PageType::IndexInternal && key == cell.key() {
                            // Index separators are entries themselves; no
                            // row payload lives at this layer.
                            return Ok(Vec::new());
                        }
                        next = cell.child_page().ok_or(Error::Corrupt)?;
                        break;
                    }
                }
                npage = next as PageNum;
            } else {
                for i in 0..node.n_cells as usize {
                    let cell = node.get_cell(i)?;
                    if key == cell.key() {
                        return match cell {
                            Cell::TableLeaf { payload, .. } => Ok(payload),
                            Cell::IndexLeaf { .. } => Ok(Vec::new()),
                            _ => Err(Error::Corrupt),
                        };
                    }
                }
                return Err(Error::KeyNotFound);
            }
        }
    }

    /// Insert a record into a table tree.
    pub fn insert_in_table(
        &mut self,
        nroot: PageNum,
        key: Key,
        data: Vec<u8>,
    ) -> Result<(), Error> {
        self.insert(nroot, &Cell::TableLeaf { key, payload: data })
    }

    /// Insert a (key, primary key) pair into an index tree.
    pub fn insert_in_index(
        &mut self,
        nroot: PageNum,
        key_idx: Key,
        key_pk: Key,
    ) -> Result<(), Error> {
        debug!("index insert: key {} pkey {} root {}", key_idx, key_pk, nroot);
        self.insert(
            nroot,
            &Cell::IndexLeaf {
                key: key_idx,
                pkey: key_pk,
            },
        )
    }

    /// Insert a cell into the tree rooted at `nroot`.  Duplicate keys are
    /// rejected.  A full root is split here, with a page-number swap so that
    /// the tree keeps its externally referenced root page.
    pub fn insert(&mut self, nroot: PageNum, cell: &Cell) -> Result<(), Error> {
        match self.find(nroot, cell.key()) {
            Ok(_) => return Err(Error::Duplicate),
            Err(Error::KeyNotFound) => {}
            Err(e) => return Err(e),
        }
        let root = self.get_node(nroot)?;
        if !root.has_room(cell) {
            info!("root page {} out of space, splitting", nroot);
            let new_root_type = if cell.page_type().is_index() {
                PageType::IndexInternal
            } else {
                PageType::TableInternal
            };
            let new_root_n = self.new_node(new_root_type)?;
            self.split(new_root_n, nroot, 0)?;

            // Swap page numbers so the root keeps its original page number:
            // the new internal root moves onto `nroot`, and the right half of
            // the old root moves onto the freshly allocated page.
            let mut new_root = self.get_node(new_root_n)?;
            let mut right = self.get_node(nroot)?;
            new_root.right_page = Some(new_root_n as u32);
            new_root.page.npage = nroot;
            right.page.npage = new_root_n;

            if nroot == 1 {
                // The file header must stay at the top of page 1: shift the
                // incoming root's node region down past it, and the outgoing
                // node's region up to the top of its new page.  Cell data at
                // the page end and the absolute offsets in the cell-offset
                // array do not move.
                let h = dbheader::DB_HEADER_BYTES;
                let fo = new_root.free_offset as usize;
                let hold = new_root.page.data[0..fo].to_vec();
                let file_header = right.page.data[0..h].to_vec();
                new_root.page.data[0..h].copy_from_slice(&file_header);
                new_root.page.data[h..h + fo].copy_from_slice(&hold);
                new_root.free_offset += h as u16;

                let rfo = right.free_offset as usize;
                let hold = right.page.data[h..rfo].to_vec();
                right.page.data[0..rfo - h].copy_from_slice(&hold);
                right.free_offset -= h as u16;
            }
            self.write_node(&mut right)?;
            self.write_node(&mut new_root)?;
        }
        self.insert_nonfull(nroot, cell)
    }

    /// Insert into a subtree whose root is known to have room.  Walking down,
    /// any full child on the path is split before descending, so the
    /// leaf-level insert never runs out of space.
    fn insert_nonfull(&mut self, npage: PageNum, cell: &Cell) -> Result<(), Error> {
        let mut npage = npage;
        loop {
            let mut node = self.get_node(npage)?;
            let mut pos = node.n_cells as usize;
            let mut pos_cell = None;
            for i in 0..node.n_cells as usize {
                let c = node.get_cell(i)?;
                if cell.key() < c.key() {
                    pos = i;
                    pos_cell = Some(c);
                    break;
                } else if cell.key() == c.key() {
                    return Err(Error::Duplicate);
                }
            }
            if node.page_type.is_leaf() {
                debug!(
                    "inserting key {} into page {} at cell {}",
                    cell.key(),
                    npage,
                    pos
                );
                node.insert_cell(pos, cell)?;
                return self.write_node(&mut node);
            }

            let mut child = match pos_cell {
                Some(c) => c.child_page().ok_or(Error::Corrupt)? as PageNum,
                None => node.right_page.ok_or(Error::Corrupt)? as PageNum,
            };
            let child_node = self.get_node(child)?;
            if !child_node.has_room(cell) {
                self.split(npage, child, pos)?;
                // Redescend through the promoted separator: its left sibling
                // if the key sorts at or below it, the old child otherwise.
                let parent = self.get_node(npage)?;
                let sep = parent.get_cell(pos)?;
                if cell.key() <= sep.key() {
                    child = sep.child_page().ok_or(Error::Corrupt)? as PageNum;
                }
            }
            npage = child;
        }
    }

    /// Split the child node around its median.  Cells below the median move
    /// to a freshly allocated left sibling (a table-leaf median stays in the
    /// left sibling; an internal median's child pointer becomes the left
    /// sibling's right page).  The median key is promoted into the parent at
    /// `parent_ncell`.  Returns the new sibling's page number.
    pub fn split(
        &mut self,
        npage_parent: PageNum,
        npage_child: PageNum,
        parent_ncell: usize,
    ) -> Result<PageNum, Error> {
        let child = self.get_node(npage_child)?;
        let child_type = child.page_type;
        let n_cells = child.n_cells as usize;
        let new_page_n = self.new_node(child_type)?;
        info!(
            "split page {} ({} cells) with parent {}, new sibling {}",
            npage_child, n_cells, npage_parent, new_page_n
        );

        let median_ncell = (n_cells - 1) / 2;
        let median = child.get_cell(median_ncell)?;

        let mut left = self.get_node(new_page_n)?;
        for i in 0..median_ncell {
            left.insert_cell(i, &child.get_cell(i)?)?;
        }
        match child_type {
            PageType::TableLeaf => {
                // The median record itself stays in the left sibling; only
                // its key is duplicated into the parent.
                left.insert_cell(median_ncell, &median)?;
            }
            PageType::TableInternal | PageType::IndexInternal => {
                left.right_page = Some(median.child_page().ok_or(Error::Corrupt)?);
            }
            PageType::IndexLeaf => {
                // The median entry moves up into the parent separator.
            }
        }

        // Rebuild the child page with the upper half of the cells.  Only the
        // node header is reset, so page 1's file header survives.
        let upper: Vec<Cell> = (median_ncell + 1..n_cells)
            .map(|i| child.get_cell(i))
            .collect::<Result<_, _>>()?;
        let old_right_page = child.right_page;
        let page = self.pager.read_page(npage_child)?;
        let mut right = Node::init_empty(page, child_type);
        for (i, c) in upper.iter().enumerate() {
            right.insert_cell(i, c)?;
        }
        right.right_page = old_right_page;

        let mut parent = self.get_node(npage_parent)?;
        let separator = match parent.page_type {
            PageType::TableInternal => Cell::TableInternal {
                child_page: new_page_n as u32,
                key: median.key(),
            },
            PageType::IndexInternal => Cell::IndexInternal {
                child_page: new_page_n as u32,
                key: median.key(),
                pkey: median.pkey().ok_or(Error::Corrupt)?,
            },
            _ => return Err(Error::Corrupt),
        };
        parent.insert_cell(parent_ncell, &separator)?;

        // Children first; if the parent write fails the old separator set is
        // still self-consistent.
        self.write_node(&mut right)?;
        self.write_node(&mut left)?;
        self.write_node(&mut parent)?;
        Ok(new_page_n)
    }

    /// Render the tree rooted at `nroot` as indented text, one line per
    /// node or entry.  Debugging aid for the shell's `.btree` command.
    pub fn dump(&mut self, nroot: PageNum) -> Result<String, Error> {
        let mut out = String::new();
        self.dump_node(nroot, 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&mut self, npage: PageNum, level: usize, out: &mut String) -> Result<(), Error> {
        use std::fmt::Write;
        let node = self.get_node(npage)?;
        let pad = "  ".repeat(level);
        let _ = writeln!(
            out,
            "{}page {} {:?} ({} cells)",
            pad, npage, node.page_type, node.n_cells
        );
        for i in 0..node.n_cells as usize {
            match node.get_cell(i)? {
                Cell::TableLeaf { key, payload } => {
                    let _ = writeln!(out, "{}  {} -> {} bytes", pad, key, payload.len());
                }
                Cell::IndexLeaf { key, pkey } => {
                    let _ = writeln!(out, "{}  {} -> pk {}", pad, key, pkey);
                }
                Cell::TableInternal { child_page, key } => {
                    self.dump_node(child_page as PageNum, level + 1, out)?;
                    let _ = writeln!(out, "{}  keys <= {}", pad, key);
                }
                Cell::IndexInternal {
                    child_page,
                    key,
                    pkey,
                } => {
                    self.dump_node(child_page as PageNum, level + 1, out)?;
                    let _ = writeln!(out, "{}  {} -> pk {}", pad, key, pkey);
                }
            }
        }
        if let Some(right) = node.right_page {
            if node.page_type.is_internal() {
                self.dump_node(right as PageNum, level + 1, out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("minidb_btree_test_{}_{}.db", name, std::process::id()));
        let s = p.to_str().unwrap().to_string();
        let _ = std::fs::remove_file(&s);
        s
    }

    #[test]
    fn test_open_initializes_fresh_file() {
        let path = temp_db_path("fresh");
        let mut bt = BTree::open(&path).unwrap();
        assert_eq!(bt.pager.n_pages(), 1);
        let node = bt.get_node(1).unwrap();
        assert_eq!(node.page_type, PageType::TableLeaf);
        assert_eq!(node.n_cells, 0);
        assert_eq!(node.free_offset, 108);
        assert_eq!(node.cells_offset, 1024);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_open_rejects_corrupt_header() {
        let path = temp_db_path("corrupt");
        drop(BTree::open(&path).unwrap());
        // Flip byte 44 of the header.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[44] = 0x02;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(BTree::open(&path), Err(Error::Header(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_find_after_insert() {
        let path = temp_db_path("raw");
        let mut bt = BTree::open(&path).unwrap();
        bt.insert_in_table(1, 5, vec![0xAA, 0xBB]).unwrap();
        bt.insert_in_table(1, 2, vec![0xCC]).unwrap();
        assert_eq!(bt.find(1, 5).unwrap(), vec![0xAA, 0xBB]);
        assert_eq!(bt.find(1, 2).unwrap(), vec![0xCC]);
        assert!(matches!(bt.find(1, 9), Err(Error::KeyNotFound)));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let path = temp_db_path("dup");
        let mut bt = BTree::open(&path).unwrap();
        bt.insert_in_table(1, 7, vec![1]).unwrap();
        assert!(matches!(
            bt.insert_in_table(1, 7, vec![2]),
            Err(Error::Duplicate)
        ));
        // The original payload is untouched.
        assert_eq!(bt.find(1, 7).unwrap(), vec![1]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_page_one_root_split_preserves_file_header() {
        let path = temp_db_path("rootsplit");
        let mut bt = BTree::open(&path).unwrap();
        let header_before = {
            let page = bt.pager.read_page(1).unwrap();
            page.data[0..100].to_vec()
        };
        // Payloads big enough that page 1 splits after a handful of inserts.
        for key in 1..=64u32 {
            bt.insert_in_table(1, key, vec![key as u8; 64]).unwrap();
        }
        assert!(bt.pager.n_pages() > 1);
        let page = bt.pager.read_page(1).unwrap();
        assert_eq!(&page.data[0..100], &header_before[..]);
        // Page 1 is now an internal node and every key is still reachable.
        let root = bt.get_node(1).unwrap();
        assert_eq!(root.page_type, PageType::TableInternal);
        for key in 1..=64u32 {
            assert_eq!(bt.find(1, key).unwrap(), vec![key as u8; 64]);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_many_inserts_stay_findable_after_reopen() {
        let path = temp_db_path("many");
        {
            let mut bt = BTree::open(&path).unwrap();
            for key in (1..=500u32).rev() {
                bt.insert_in_table(1, key, key.to_be_bytes().to_vec()).unwrap();
            }
        }
        let mut bt = BTree::open(&path).unwrap();
        for key in 1..=500u32 {
            assert_eq!(bt.find(1, key).unwrap(), key.to_be_bytes().to_vec());
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_index_tree_split() {
        let path = temp_db_path("idxsplit");
        let mut bt = BTree::open(&path).unwrap();
        let root = bt.new_node(PageType::IndexLeaf).unwrap();
        for key in 1..=300u32 {
            bt.insert_in_index(root, key, key + 1000).unwrap();
        }
        for key in [1u32, 150, 300] {
            assert_eq!(bt.find(root, key).unwrap(), Vec::<u8>::new());
        }
        assert!(matches!(bt.find(root, 999), Err(Error::KeyNotFound)));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_dump_renders_every_key() {
        let path = temp_db_path("dump");
        let mut bt = BTree::open(&path).unwrap();
        for key in 1..=50u32 {
            bt.insert_in_table(1, key, vec![0u8; 30]).unwrap();
        }
        let dump = bt.dump(1).unwrap();
        assert!(dump.starts_with("page 1"));
        for key in 1..=50u32 {
            assert!(dump.contains(&format!("{} -> 30 bytes", key)), "{}", dump);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_node_offset_invariant_across_inserts() {
        // cells_offset >= free_offset + 2 * n_cells is implied by free_offset
        // tracking header + array growth; check it on a well-used page.
        let path = temp_db_path("invariant");
        let mut bt = BTree::open(&path).unwrap();
        for key in 1..=40u32 {
            bt.insert_in_table(1, key, vec![0u8; 10]).unwrap();
        }
        let node = bt.get_node(1).unwrap();
        assert!(node.cells_offset >= node.free_offset + 2);
        std::fs::remove_file(&path).unwrap();
    }
}
