//! dbm is the database machine: a register/cursor virtual machine that runs
//! compiled statement programs.
//!
//! A statement owns its instruction vector, register file, cursor table and
//! column names.  `step` dispatches instructions until one of them emits a
//! result row or the program counter runs off the end.  The fetch loop
//! post-increments the program counter before dispatch, so a handler that
//! jumps simply overwrites it.  Traversal statuses coming up from the cursor
//! layer are turned into jumps here; real errors propagate to the caller.

use enum_as_inner::EnumAsInner;
use log::debug;

use crate::btree::BTree;
use crate::cursor::{Cursor, CursorKind, CursorStatus};
use crate::record::{self, ColValue};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Btree: {0}")]
    Btree(#[from] crate::btree::Error),
    #[error("Record: {0}")]
    Record(#[from] record::Error),
    #[error("The cursor cannot supply the requested column.")]
    CannotOpen,
    #[error("The program referenced an invalid register, cursor or operand.")]
    InvalidProgram,
}

/// Register contents.  Registers come into existence unspecified and are
/// grown on demand when a handler writes past the end of the file.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum Register {
    Unspecified,
    Null,
    Int(i32),
    Str(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    OpenRead,
    OpenWrite,
    Close,
    Rewind,
    Next,
    Prev,
    Seek,
    SeekGt,
    SeekGe,
    SeekLt,
    SeekLe,
    Column,
    Key,
    Integer,
    String,
    Null,
    ResultRow,
    MakeRecord,
    Insert,
    IdxInsert,
    IdxPKey,
    IdxGt,
    IdxGe,
    IdxLt,
    IdxLe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    CreateTable,
    CreateIndex,
    Halt,
    Noop,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::OpenRead => "OpenRead",
            Opcode::OpenWrite => "OpenWrite",
            Opcode::Close => "Close",
            Opcode::Rewind => "Rewind",
            Opcode::Next => "Next",
            Opcode::Prev => "Prev",
            Opcode::Seek => "Seek",
            Opcode::SeekGt => "SeekGt",
            Opcode::SeekGe => "SeekGe",
            Opcode::SeekLt => "SeekLt",
            Opcode::SeekLe => "SeekLe",
            Opcode::Column => "Column",
            Opcode::Key => "Key",
            Opcode::Integer => "Integer",
            Opcode::String => "String",
            Opcode::Null => "Null",
            Opcode::ResultRow => "ResultRow",
            Opcode::MakeRecord => "MakeRecord",
            Opcode::Insert => "Insert",
            Opcode::IdxInsert => "IdxInsert",
            Opcode::IdxPKey => "IdxPKey",
            Opcode::IdxGt => "IdxGt",
            Opcode::IdxGe => "IdxGe",
            Opcode::IdxLt => "IdxLt",
            Opcode::IdxLe => "IdxLe",
            Opcode::Eq => "Eq",
            Opcode::Ne => "Ne",
            Opcode::Lt => "Lt",
            Opcode::Le => "Le",
            Opcode::Gt => "Gt",
            Opcode::Ge => "Ge",
            Opcode::CreateTable => "CreateTable",
            Opcode::CreateIndex => "CreateIndex",
            Opcode::Halt => "Halt",
            Opcode::Noop => "Noop",
        }
    }
}

/// One instruction.  Operand meaning is per-opcode; p4 carries text.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub opcode: Opcode,
    pub p1: i32,
    pub p2: i32,
    pub p3: i32,
    pub p4: Option<std::string::String>,
}

impl Op {
    pub fn new(opcode: Opcode, p1: i32, p2: i32, p3: i32) -> Op {
        Op {
            opcode,
            p1,
            p2,
            p3,
            p4: None,
        }
    }

    pub fn with_text(opcode: Opcode, p1: i32, p2: i32, p3: i32, p4: &str) -> Op {
        Op {
            opcode,
            p1,
            p2,
            p3,
            p4: Some(std::string::String::from(p4)),
        }
    }
}

/// What one `step` produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

// Runtime column type codes surfaced by the column accessors.  Text embeds
// its length the same way the on-disk type code does.
pub const SQL_NULL: i32 = 0;
pub const SQL_INTEGER_4BYTE: i32 = 4;
pub const SQL_TEXT: i32 = 13;
pub const SQL_NOTVALID: i32 = -1;

/// A prepared statement: the compiled program plus all of its run state.
pub struct Statement {
    pub ops: Vec<Op>,
    pub pc: usize,
    registers: Vec<Register>,
    cursors: Vec<Option<Cursor>>,
    result_start: usize,
    result_width: usize,
    pub col_names: Vec<std::string::String>,
    pub explain: bool,
    /// True for statements whose completion invalidates the dictionary.
    pub refreshes_schema: bool,
}

impl Statement {
    pub fn new(
        ops: Vec<Op>,
        col_names: Vec<std::string::String>,
        explain: bool,
        refreshes_schema: bool,
    ) -> Statement {
        Statement {
            ops,
            pc: 0,
            registers: vec![],
            cursors: vec![],
            result_start: 0,
            result_width: 0,
            col_names,
            explain,
            refreshes_schema,
        }
    }

    /// Release every cursor (and with them the page references on their
    /// paths).  Dropping the statement does the same; this exists so the
    /// finalize entry point has something explicit to call.
    pub fn release(&mut self) {
        self.cursors.clear();
        self.registers.clear();
    }

    fn reg_index(n: i32) -> Result<usize, Error> {
        usize::try_from(n).map_err(|_| Error::InvalidProgram)
    }

    fn reg(&self, n: i32) -> Result<&Register, Error> {
        let i = Self::reg_index(n)?;
        Ok(self.registers.get(i).unwrap_or(&Register::Unspecified))
    }

    fn reg_int(&self, n: i32) -> Result<i32, Error> {
        match self.reg(n)? {
            Register::Int(v) => Ok(*v),
            _ => Err(Error::InvalidProgram),
        }
    }

    fn set_reg(&mut self, n: i32, v: Register) -> Result<(), Error> {
        let i = Self::reg_index(n)?;
        if i >= self.registers.len() {
            self.registers.resize(i + 1, Register::Unspecified);
        }
        self.registers[i] = v;
        Ok(())
    }

    fn cursor_mut(&mut self, n: i32) -> Result<&mut Cursor, Error> {
        let i = Self::reg_index(n)?;
        self.cursors
            .get_mut(i)
            .and_then(|c| c.as_mut())
            .ok_or(Error::InvalidProgram)
    }

    fn put_cursor(&mut self, n: i32, cursor: Cursor) -> Result<(), Error> {
        let i = Self::reg_index(n)?;
        if i >= self.cursors.len() {
            self.cursors.resize_with(i + 1, || None);
        }
        self.cursors[i] = Some(cursor);
        Ok(())
    }

    /// Run instructions until a row is emitted or the program ends.  In
    /// explain mode each step instead surfaces one compiled instruction.
    pub fn step(&mut self, bt: &mut BTree) -> Result<StepResult, Error> {
        if self.explain {
            if self.pc >= self.ops.len() {
                return Ok(StepResult::Done);
            }
            self.pc += 1;
            return Ok(StepResult::Row);
        }
        loop {
            if self.pc >= self.ops.len() {
                return Ok(StepResult::Done);
            }
            let op = self.ops[self.pc].clone();
            self.pc += 1;
            debug!(
                "pc {} op {} p1 {} p2 {} p3 {}",
                self.pc - 1,
                op.opcode.name(),
                op.p1,
                op.p2,
                op.p3
            );
            if let Some(result) = self.exec_op(bt, &op)? {
                return Ok(result);
            }
        }
    }

    fn jump(&mut self, addr: i32) -> Result<(), Error> {
        self.pc = usize::try_from(addr).map_err(|_| Error::InvalidProgram)?;
        Ok(())
    }

    fn exec_op(&mut self, bt: &mut BTree, op: &Op) -> Result<Option<StepResult>, Error> {
        match op.opcode {
            Opcode::Noop => {}
            Opcode::OpenRead | Opcode::OpenWrite => {
                let kind = if op.opcode == Opcode::OpenRead {
                    CursorKind::Read
                } else {
                    CursorKind::Write
                };
                let root = self.reg_int(op.p2)?;
                let root = usize::try_from(root).map_err(|_| Error::InvalidProgram)?;
                let col_count = usize::try_from(op.p3).map_err(|_| Error::InvalidProgram)?;
                let cursor = Cursor::open(bt, kind, root, col_count)?;
                self.put_cursor(op.p1, cursor)?;
            }
            Opcode::Close => {
                let i = Self::reg_index(op.p1)?;
                if i < self.cursors.len() {
                    self.cursors[i] = None;
                }
            }
            Opcode::Rewind => {
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.rewind(bt)? == CursorStatus::EmptyTree {
                    self.jump(op.p2)?;
                }
            }
            Opcode::Next => {
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.next(bt)? != CursorStatus::AtEnd {
                    self.jump(op.p2)?;
                }
            }
            Opcode::Prev => {
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.prev(bt)? != CursorStatus::AtStart {
                    self.jump(op.p2)?;
                }
            }
            Opcode::Seek => {
                let key = self.reg_int(op.p3)? as u32;
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.seek(bt, key)? == CursorStatus::NotFound {
                    self.jump(op.p2)?;
                }
            }
            Opcode::SeekGt => {
                let key = self.reg_int(op.p3)? as u32;
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.seek_gt(bt, key)? == CursorStatus::AtEnd {
                    self.jump(op.p2)?;
                }
            }
            Opcode::SeekGe => {
                let key = self.reg_int(op.p3)? as u32;
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.seek_ge(bt, key)? == CursorStatus::AtEnd {
                    self.jump(op.p2)?;
                }
            }
            Opcode::SeekLt => {
                let key = self.reg_int(op.p3)? as u32;
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.seek_lt(bt, key)? == CursorStatus::AtStart {
                    self.jump(op.p2)?;
                }
            }
            Opcode::SeekLe => {
                let key = self.reg_int(op.p3)? as u32;
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.seek_le(bt, key)? == CursorStatus::AtStart {
                    self.jump(op.p2)?;
                }
            }
            Opcode::Column => {
                let col = usize::try_from(op.p2).map_err(|_| Error::InvalidProgram)?;
                let cursor = self.cursor_mut(op.p1)?;
                if cursor.col_count <= col {
                    return Err(Error::CannotOpen);
                }
                let payload = match cursor.get()? {
                    crate::btree::cell::Cell::TableLeaf { payload, .. } => payload,
                    _ => return Err(Error::Btree(crate::btree::Error::Corrupt)),
                };
                let value = match record::decode_col(&payload, col)? {
                    ColValue::Null => Register::Null,
                    ColValue::Int(v) => Register::Int(v),
                    ColValue::Text(s) => Register::Str(s),
                };
                self.set_reg(op.p3, value)?;
            }
            Opcode::Key => {
                let key = self.cursor_mut(op.p1)?.current_key;
                self.set_reg(op.p2, Register::Int(key as i32))?;
            }
            Opcode::Integer => {
                self.set_reg(op.p2, Register::Int(op.p1))?;
            }
            Opcode::String => {
                let text = op.p4.clone().ok_or(Error::InvalidProgram)?;
                self.set_reg(op.p2, Register::Str(text))?;
            }
            Opcode::Null => {
                self.set_reg(op.p2, Register::Null)?;
            }
            Opcode::ResultRow => {
                self.result_start = Self::reg_index(op.p1)?;
                self.result_width = usize::try_from(op.p2).map_err(|_| Error::InvalidProgram)?;
                return Ok(Some(StepResult::Row));
            }
            Opcode::MakeRecord => {
                let base = Self::reg_index(op.p1)?;
                let width = usize::try_from(op.p2).map_err(|_| Error::InvalidProgram)?;
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(match self.reg((base + i) as i32)? {
                        Register::Null => ColValue::Null,
                        Register::Int(v) => ColValue::Int(*v),
                        Register::Str(s) => ColValue::Text(s.clone()),
                        _ => return Err(Error::InvalidProgram),
                    });
                }
                self.set_reg(op.p3, Register::Binary(record::encode(&values)))?;
            }
            Opcode::Insert => {
                let key = self.reg_int(op.p3)? as u32;
                let data = match self.reg(op.p2)? {
                    Register::Binary(b) => b.clone(),
                    _ => return Err(Error::InvalidProgram),
                };
                let root = self.cursor_mut(op.p1)?.root_page;
                bt.insert_in_table(root, key, data)?;
                // The insert may have split pages on the cursor's path;
                // rebuild the path at the inserted key.
                let cursor = self.cursor_mut(op.p1)?;
                cursor.rewind(bt)?;
                cursor.go_to_position(bt, key)?;
            }
            Opcode::IdxInsert => {
                let idx_key = self.reg_int(op.p2)? as u32;
                let pkey = self.reg_int(op.p3)? as u32;
                let root = self.cursor_mut(op.p1)?.root_page;
                bt.insert_in_index(root, idx_key, pkey)?;
                let cursor = self.cursor_mut(op.p1)?;
                cursor.rewind(bt)?;
                cursor.go_to_position(bt, idx_key)?;
            }
            Opcode::IdxPKey => {
                let cell = self.cursor_mut(op.p1)?.get_at_position()?;
                let pkey = cell.pkey().ok_or(Error::Btree(crate::btree::Error::Corrupt))?;
                self.set_reg(op.p2, Register::Int(pkey as i32))?;
            }
            Opcode::IdxGt | Opcode::IdxGe | Opcode::IdxLt | Opcode::IdxLe => {
                let k = self.reg_int(op.p3)? as u32;
                let key = self.cursor_mut(op.p1)?.current_key;
                let hit = match op.opcode {
                    Opcode::IdxGt => key > k,
                    Opcode::IdxGe => key >= k,
                    Opcode::IdxLt => key < k,
                    _ => key <= k,
                };
                if hit {
                    self.jump(op.p2)?;
                }
            }
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                if self.compare_hits(op)? {
                    self.jump(op.p2)?;
                }
            }
            Opcode::CreateTable => {
                let npage = bt.new_node(crate::btree::PageType::TableLeaf)?;
                self.set_reg(op.p1, Register::Int(npage as i32))?;
            }
            Opcode::CreateIndex => {
                let npage = bt.new_node(crate::btree::PageType::IndexLeaf)?;
                self.set_reg(op.p1, Register::Int(npage as i32))?;
            }
            Opcode::Halt => {
                self.pc = self.ops.len();
            }
        }
        Ok(None)
    }

    // Comparison ops test `reg[P3] OP reg[P1]` and jump when true.  Strings
    // compare lexicographically; binaries by length, then bytes.  Registers
    // of different types compare as "not equal": only Ne jumps.
    fn compare_hits(&self, op: &Op) -> Result<bool, Error> {
        use std::cmp::Ordering;
        let r1 = self.reg(op.p1)?;
        let r3 = self.reg(op.p3)?;
        let ord: Option<Ordering> = match (r3, r1) {
            (Register::Int(a), Register::Int(b)) => Some(a.cmp(b)),
            (Register::Str(a), Register::Str(b)) => Some(a.cmp(b)),
            (Register::Binary(a), Register::Binary(b)) => {
                Some(a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            }
            _ => None,
        };
        let types_differ = std::mem::discriminant(r1) != std::mem::discriminant(r3);
        Ok(match op.opcode {
            Opcode::Eq => ord == Some(Ordering::Equal),
            Opcode::Ne => types_differ || matches!(ord, Some(o) if o != Ordering::Equal),
            Opcode::Lt => ord == Some(Ordering::Less),
            Opcode::Le => matches!(ord, Some(Ordering::Less) | Some(Ordering::Equal)),
            Opcode::Gt => ord == Some(Ordering::Greater),
            Opcode::Ge => matches!(ord, Some(Ordering::Greater) | Some(Ordering::Equal)),
            _ => unreachable!(),
        })
    }

    // Registers of the current result row, for the column accessors.
    fn result_reg(&self, col: usize) -> Option<&Register> {
        if col >= self.result_width {
            return None;
        }
        self.registers.get(self.result_start + col)
    }

    pub fn column_count(&self) -> usize {
        if self.explain {
            6
        } else {
            self.col_names.len()
        }
    }

    pub fn column_type(&self, col: usize) -> i32 {
        if self.explain {
            let op = &self.ops[self.pc - 1];
            return match col {
                0 | 2 | 3 | 4 => SQL_INTEGER_4BYTE,
                1 => 2 * op.opcode.name().len() as i32 + SQL_TEXT,
                5 => match &op.p4 {
                    None => SQL_NULL,
                    Some(s) => 2 * s.len() as i32 + SQL_TEXT,
                },
                _ => SQL_NOTVALID,
            };
        }
        match self.result_reg(col) {
            Some(Register::Null) => SQL_NULL,
            Some(Register::Int(_)) => SQL_INTEGER_4BYTE,
            Some(Register::Str(s)) => 2 * s.len() as i32 + SQL_TEXT,
            _ => SQL_NOTVALID,
        }
    }

    pub fn column_name(&self, col: usize) -> Option<&str> {
        if self.explain {
            return match col {
                0 => Some("addr"),
                1 => Some("opcode"),
                2 => Some("p1"),
                3 => Some("p2"),
                4 => Some("p3"),
                5 => Some("p4"),
                _ => None,
            };
        }
        self.col_names.get(col).map(|s| s.as_str())
    }

    /// Undefined when the column's runtime type is not an integer; this
    /// implementation returns 0 in that case.
    pub fn column_int(&self, col: usize) -> i32 {
        if self.explain {
            let op = &self.ops[self.pc - 1];
            return match col {
                0 => (self.pc - 1) as i32,
                2 => op.p1,
                3 => op.p2,
                4 => op.p3,
                _ => 0,
            };
        }
        match self.result_reg(col) {
            Some(Register::Int(v)) => *v,
            _ => 0,
        }
    }

    /// Undefined when the column's runtime type is not text; this
    /// implementation returns None in that case.
    pub fn column_text(&self, col: usize) -> Option<&str> {
        if self.explain {
            let op = &self.ops[self.pc - 1];
            return match col {
                1 => Some(op.opcode.name()),
                5 => op.p4.as_deref(),
                _ => None,
            };
        }
        match self.result_reg(col) {
            Some(Register::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}
