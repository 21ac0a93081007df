//! cursor walks one btree through a stack of path frames.
//!
//! A frame records the node, the cell position within it, and the key at
//! that position.  The stack always runs root to current node; traversal is
//! "pop until something is left to visit, then rewind into the next child",
//! so the stack depth is bounded by the tree height.
//!
//! Index-internal nodes need care: their separator cells are entries in
//! their own right (each carries a key and a primary key), so `next` and
//! `prev` alternate between visiting a separator and descending into the
//! child beside it.  The frame's key field is what distinguishes the two
//! states: it holds the separator key of the child the path runs through,
//! and equals the current key exactly when the separator itself is the
//! current position.

use log::debug;

use crate::btree::cell::Cell;
use crate::btree::{BTree, Error, Key, PageType};
use crate::pager::PageNum;

/// Read-only or read-write cursor.  Writes go through the btree, so the
/// distinction is bookkeeping carried for the opcode that opened the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Table,
    Index,
}

/// Traversal outcomes that are control flow, not failures.  The DBM maps
/// these onto program-counter jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    Ok,
    EmptyTree,
    AtEnd,
    AtStart,
    NotFound,
}

struct Frame {
    node: crate::btree::node::Node,
    ncell: usize,
    // Key at this position; meaningful while ncell < n_cells.
    key: Key,
}

pub struct Cursor {
    #[allow(dead_code)]
    kind: CursorKind,
    pub tree_kind: TreeKind,
    pub root_page: PageNum,
    path: Vec<Frame>,
    pub current_key: Key,
    /// Expected column count of the underlying table, for Column-op checks.
    pub col_count: usize,
}

impl Cursor {
    /// Open a cursor on the tree rooted at `root_page` and rewind it.
    pub fn open(
        bt: &mut BTree,
        kind: CursorKind,
        root_page: PageNum,
        col_count: usize,
    ) -> Result<Cursor, Error> {
        let root = bt.get_node(root_page)?;
        let tree_kind = if root.page_type.is_index() {
            TreeKind::Index
        } else {
            TreeKind::Table
        };
        let mut cursor = Cursor {
            kind,
            tree_kind,
            root_page,
            path: Vec::new(),
            current_key: 0,
            col_count,
        };
        cursor.rewind(bt)?;
        Ok(cursor)
    }

    /// Position at the smallest key in the tree.
    pub fn rewind(&mut self, bt: &mut BTree) -> Result<CursorStatus, Error> {
        self.rewind_into(bt, self.root_page, 0)
    }

    /// Position at the largest key in the tree.
    pub fn rewind_to_end(&mut self, bt: &mut BTree) -> Result<CursorStatus, Error> {
        self.rewind_end_into(bt, self.root_page, 0)
    }

    // Descend to the leftmost leaf entry of the subtree rooted at `npage`,
    // stacking frames from `depth`.
    fn rewind_into(
        &mut self,
        bt: &mut BTree,
        npage: PageNum,
        depth: usize,
    ) -> Result<CursorStatus, Error> {
        self.path.truncate(depth);
        let mut npage = npage;
        loop {
            let node = bt.get_node(npage)?;
            if node.n_cells == 0 {
                debug!("cursor: empty btree at page {}", npage);
                self.path.push(Frame {
                    node,
                    ncell: 0,
                    key: 0,
                });
                return Ok(CursorStatus::EmptyTree);
            }
            let cell = node.get_cell(0)?;
            let key = cell.key();
            let child = cell.child_page();
            let is_leaf = node.page_type.is_leaf();
            self.path.push(Frame {
                node,
                ncell: 0,
                key,
            });
            if is_leaf {
                self.current_key = key;
                return Ok(CursorStatus::Ok);
            }
            npage = child.ok_or(Error::Corrupt)? as PageNum;
        }
    }

    // Descend to the rightmost leaf entry of the subtree rooted at `npage`.
    fn rewind_end_into(
        &mut self,
        bt: &mut BTree,
        npage: PageNum,
        depth: usize,
    ) -> Result<CursorStatus, Error> {
        self.path.truncate(depth);
        let mut npage = npage;
        loop {
            let node = bt.get_node(npage)?;
            if node.page_type.is_leaf() {
                if node.n_cells == 0 {
                    self.path.push(Frame {
                        node,
                        ncell: 0,
                        key: 0,
                    });
                    return Ok(CursorStatus::EmptyTree);
                }
                let ncell = node.n_cells as usize - 1;
                let key = node.get_cell(ncell)?.key();
                self.path.push(Frame { node, ncell, key });
                self.current_key = key;
                return Ok(CursorStatus::Ok);
            }
            let right = node.right_page.ok_or(Error::Corrupt)? as PageNum;
            let ncell = node.n_cells as usize;
            self.path.push(Frame {
                node,
                ncell,
                key: 0,
            });
            npage = right;
        }
    }

    /// The cell at the cursor's current position.
    pub fn get(&self) -> Result<Cell, Error> {
        let frame = self.path.last().ok_or(Error::Corrupt)?;
        for i in 0..frame.node.n_cells as usize {
            let cell = frame.node.get_cell(i)?;
            if cell.key() == self.current_key {
                return Ok(cell);
            }
        }
        Err(Error::Corrupt)
    }

    /// The cell at the top frame's recorded position, without a key scan.
    /// Used to pull the primary key out of index entries.
    pub fn get_at_position(&self) -> Result<Cell, Error> {
        let frame = self.path.last().ok_or(Error::Corrupt)?;
        frame.node.get_cell(frame.ncell)
    }

    /// Advance to the next key in ascending order.
    pub fn next(&mut self, bt: &mut BTree) -> Result<CursorStatus, Error> {
        loop {
            let depth = self.path.len() - 1;
            let frame = &mut self.path[depth];
            let n_cells = frame.node.n_cells as usize;
            match frame.node.page_type {
                PageType::TableLeaf | PageType::IndexLeaf => {
                    if n_cells == 0 || frame.ncell == n_cells - 1 {
                        if depth == 0 {
                            return Ok(CursorStatus::AtEnd);
                        }
                        self.path.truncate(depth);
                        continue;
                    }
                    frame.ncell += 1;
                    let key = frame.node.get_cell(frame.ncell)?.key();
                    frame.key = key;
                    self.current_key = key;
                    return Ok(CursorStatus::Ok);
                }
                PageType::TableInternal => {
                    if frame.ncell == n_cells {
                        if depth == 0 {
                            return Ok(CursorStatus::AtEnd);
                        }
                        self.path.truncate(depth);
                        continue;
                    }
                    if frame.ncell == n_cells - 1 {
                        frame.ncell = n_cells;
                        let right = frame.node.right_page.ok_or(Error::Corrupt)? as PageNum;
                        return self.rewind_into(bt, right, depth + 1);
                    }
                    frame.ncell += 1;
                    let cell = frame.node.get_cell(frame.ncell)?;
                    frame.key = cell.key();
                    let child = cell.child_page().ok_or(Error::Corrupt)? as PageNum;
                    return self.rewind_into(bt, child, depth + 1);
                }
                PageType::IndexInternal => {
                    if frame.ncell == n_cells {
                        if depth == 0 {
                            return Ok(CursorStatus::AtEnd);
                        }
                        self.path.truncate(depth);
                        continue;
                    }
                    if frame.key > self.current_key {
                        // Ascending out of a separator's left child: the
                        // separator itself is the next entry.
                        self.current_key = frame.key;
                        self.path.truncate(depth + 1);
                        return Ok(CursorStatus::Ok);
                    }
                    // The separator was just visited; move to the child on
                    // its right.
                    frame.ncell += 1;
                    if frame.ncell == n_cells {
                        let right = frame.node.right_page.ok_or(Error::Corrupt)? as PageNum;
                        return self.rewind_into(bt, right, depth + 1);
                    }
                    let cell = frame.node.get_cell(frame.ncell)?;
                    frame.key = cell.key();
                    let child = cell.child_page().ok_or(Error::Corrupt)? as PageNum;
                    return self.rewind_into(bt, child, depth + 1);
                }
            }
        }
    }

    /// Step back to the previous key.  Mirror image of [`Cursor::next`].
    pub fn prev(&mut self, bt: &mut BTree) -> Result<CursorStatus, Error> {
        loop {
            let depth = self.path.len() - 1;
            let frame = &mut self.path[depth];
            let n_cells = frame.node.n_cells as usize;
            match frame.node.page_type {
                PageType::TableLeaf | PageType::IndexLeaf => {
                    if frame.ncell == 0 {
                        if depth == 0 {
                            return Ok(CursorStatus::AtStart);
                        }
                        self.path.truncate(depth);
                        continue;
                    }
                    frame.ncell -= 1;
                    let key = frame.node.get_cell(frame.ncell)?.key();
                    frame.key = key;
                    self.current_key = key;
                    return Ok(CursorStatus::Ok);
                }
                PageType::TableInternal => {
                    if frame.ncell == 0 {
                        if depth == 0 {
                            return Ok(CursorStatus::AtStart);
                        }
                        self.path.truncate(depth);
                        continue;
                    }
                    frame.ncell -= 1;
                    let cell = frame.node.get_cell(frame.ncell)?;
                    frame.key = cell.key();
                    let child = cell.child_page().ok_or(Error::Corrupt)? as PageNum;
                    return self.rewind_end_into(bt, child, depth + 1);
                }
                PageType::IndexInternal => {
                    if frame.ncell == n_cells {
                        // Ascending out of the right page: the last
                        // separator is the previous entry.
                        frame.ncell = n_cells - 1;
                        let cell = frame.node.get_cell(frame.ncell)?;
                        frame.key = cell.key();
                        self.current_key = cell.key();
                        self.path.truncate(depth + 1);
                        return Ok(CursorStatus::Ok);
                    }
                    if frame.key == self.current_key {
                        // Leaving the separator: everything in its left
                        // child precedes it.  This holds at ncell 0 too, so
                        // it must be tested before the pop below.
                        let cell = frame.node.get_cell(frame.ncell)?;
                        let child = cell.child_page().ok_or(Error::Corrupt)? as PageNum;
                        return self.rewind_end_into(bt, child, depth + 1);
                    }
                    if frame.ncell == 0 {
                        if depth == 0 {
                            return Ok(CursorStatus::AtStart);
                        }
                        self.path.truncate(depth);
                        continue;
                    }
                    // Ascending out of a separator's left-side child: the
                    // separator one slot left is the previous entry.
                    frame.ncell -= 1;
                    let cell = frame.node.get_cell(frame.ncell)?;
                    frame.key = cell.key();
                    self.current_key = cell.key();
                    self.path.truncate(depth + 1);
                    return Ok(CursorStatus::Ok);
                }
            }
        }
    }

    /// Walk to where `key` would live, never failing: on return the cursor is
    /// at the key itself, at the first larger key in the reached leaf, or at
    /// the leaf's last cell when `key` exceeds everything.
    pub fn go_to_position(&mut self, bt: &mut BTree, key: Key) -> Result<CursorStatus, Error> {
        self.path.truncate(0);
        let mut npage = self.root_page;
        loop {
            let node = bt.get_node(npage)?;
            if node.page_type.is_internal() {
                let mut taken = None;
                for i in 0..node.n_cells as usize {
                    let cell = node.get_cell(i)?;
                    if key <= cell.key() {
                        taken = Some((i, cell));
                        break;
                    }
                }
                match taken {
                    Some((i, cell)) => {
                        let is_index = node.page_type == PageType::IndexInternal;
                        let cell_key = cell.key();
                        let child = cell.child_page().ok_or(Error::Corrupt)? as PageNum;
                        self.path.push(Frame {
                            node,
                            ncell: i,
                            key: cell_key,
                        });
                        if is_index && key == cell_key {
                            self.current_key = key;
                            return Ok(CursorStatus::Ok);
                        }
                        npage = child;
                    }
                    None => {
                        let right = node.right_page.ok_or(Error::Corrupt)? as PageNum;
                        let ncell = node.n_cells as usize;
                        self.path.push(Frame {
                            node,
                            ncell,
                            key: 0,
                        });
                        npage = right;
                    }
                }
            } else {
                if node.n_cells == 0 {
                    self.path.push(Frame {
                        node,
                        ncell: 0,
                        key: 0,
                    });
                    return Ok(CursorStatus::EmptyTree);
                }
                let n_cells = node.n_cells as usize;
                for i in 0..n_cells {
                    let cell = node.get_cell(i)?;
                    if key <= cell.key() || i == n_cells - 1 {
                        let cell_key = cell.key();
                        self.path.push(Frame {
                            node,
                            ncell: i,
                            key: cell_key,
                        });
                        self.current_key = cell_key;
                        return Ok(CursorStatus::Ok);
                    }
                }
                unreachable!("leaf scan always takes the last cell");
            }
        }
    }

    /// Position exactly at `key`, or report NotFound.
    pub fn seek(&mut self, bt: &mut BTree, key: Key) -> Result<CursorStatus, Error> {
        match self.go_to_position(bt, key)? {
            CursorStatus::EmptyTree => Ok(CursorStatus::NotFound),
            _ => {
                if self.current_key == key {
                    Ok(CursorStatus::Ok)
                } else {
                    Ok(CursorStatus::NotFound)
                }
            }
        }
    }

    /// Position at the smallest key strictly greater than `key`.
    pub fn seek_gt(&mut self, bt: &mut BTree, key: Key) -> Result<CursorStatus, Error> {
        if self.go_to_position(bt, key)? == CursorStatus::EmptyTree {
            return Ok(CursorStatus::AtEnd);
        }
        if key >= self.current_key {
            self.next(bt)
        } else {
            Ok(CursorStatus::Ok)
        }
    }

    /// Position at the smallest key greater than or equal to `key`.
    pub fn seek_ge(&mut self, bt: &mut BTree, key: Key) -> Result<CursorStatus, Error> {
        if self.go_to_position(bt, key)? == CursorStatus::EmptyTree {
            return Ok(CursorStatus::AtEnd);
        }
        if key > self.current_key {
            self.next(bt)
        } else {
            Ok(CursorStatus::Ok)
        }
    }

    /// Position at the largest key strictly smaller than `key`.
    pub fn seek_lt(&mut self, bt: &mut BTree, key: Key) -> Result<CursorStatus, Error> {
        if self.go_to_position(bt, key)? == CursorStatus::EmptyTree {
            return Ok(CursorStatus::AtStart);
        }
        if key <= self.current_key {
            self.prev(bt)
        } else {
            Ok(CursorStatus::Ok)
        }
    }

    /// Position at the largest key smaller than or equal to `key`.
    pub fn seek_le(&mut self, bt: &mut BTree, key: Key) -> Result<CursorStatus, Error> {
        if self.go_to_position(bt, key)? == CursorStatus::EmptyTree {
            return Ok(CursorStatus::AtStart);
        }
        if key < self.current_key {
            self.prev(bt)
        } else {
            Ok(CursorStatus::Ok)
        }
    }
}
