//! schema is the in-memory data dictionary.
//!
//! Every table and index is described by one row of the schema B-tree rooted
//! at page 1: `(type, name, tbl_name, rootpage, sql)`.  On load the stored
//! SQL is parsed back into its CREATE AST, which is what answers column
//! questions.  The dictionary is rebuilt wholesale after any statement that
//! changes the schema; entry i is addressable by 1-based ordinal, which is
//! also the entry's key in the schema B-tree.

use log::{debug, warn};

use crate::ast;
use crate::btree::cell::Cell;
use crate::btree::BTree;
use crate::cursor::{Cursor, CursorKind, CursorStatus};
use crate::pager::PageNum;
use crate::pt_to_ast;
use crate::record::{self, ColValue};

/// Page 1 is always the root of the schema B-tree.
pub const SCHEMA_BTREE_ROOT_PAGENUM: PageNum = 1;
pub const SCHEMA_TABLE_NCOLS: usize = 5;

pub const SCHEMA_TYPE_TABLE: &str = "table";
pub const SCHEMA_TYPE_INDEX: &str = "index";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Btree: {0}")]
    Btree(#[from] crate::btree::Error),
    #[error("Record: {0}")]
    Record(#[from] record::Error),
    #[error("Schema row holds unparseable SQL: {0}")]
    BadStoredSql(#[from] crate::parser::Error),
    #[error("Schema row is malformed.")]
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Table,
    Index,
}

#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub kind: SchemaKind,
    pub name: String,
    pub assoc_table: String,
    pub root_page: PageNum,
    pub sql: String,
    pub create_table: Option<ast::CreateTableStatement>,
    pub create_index: Option<ast::CreateIndexStatement>,
}

/// The loaded dictionary.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<SchemaEntry>,
}

fn text_col(payload: &[u8], ncol: usize) -> Result<String, Error> {
    match record::decode_col(payload, ncol)? {
        ColValue::Text(s) => Ok(s),
        _ => Err(Error::Malformed),
    }
}

impl Schema {
    /// Scan the schema B-tree and build the dictionary.
    pub fn load(bt: &mut BTree) -> Result<Schema, Error> {
        let mut entries = vec![];
        let mut cursor = Cursor::open(
            bt,
            CursorKind::Read,
            SCHEMA_BTREE_ROOT_PAGENUM,
            SCHEMA_TABLE_NCOLS,
        )?;
        let mut status = cursor.rewind(bt)?;
        while status == CursorStatus::Ok {
            let payload = match cursor.get()? {
                Cell::TableLeaf { payload, .. } => payload,
                _ => return Err(Error::Malformed),
            };
            entries.push(Self::entry_from_row(&payload)?);
            status = cursor.next(bt)?;
        }
        debug!("schema loaded: {} entries", entries.len());
        Ok(Schema { entries })
    }

    fn entry_from_row(payload: &[u8]) -> Result<SchemaEntry, Error> {
        let root_page = match record::decode_col(payload, 3)? {
            ColValue::Int(n) if n > 0 => n as PageNum,
            _ => return Err(Error::Malformed),
        };
        let sql = text_col(payload, 4)?;
        let parsed = pt_to_ast::parse_statement(&sql)?;
        match parsed.stmt {
            ast::SqlStatement::CreateTable(ct) => Ok(SchemaEntry {
                kind: SchemaKind::Table,
                name: ct.tablename.clone(),
                assoc_table: ct.tablename.clone(),
                root_page,
                sql,
                create_table: Some(ct),
                create_index: None,
            }),
            ast::SqlStatement::CreateIndex(ci) => Ok(SchemaEntry {
                kind: SchemaKind::Index,
                name: ci.indexname.clone(),
                assoc_table: ci.tablename.clone(),
                root_page,
                sql,
                create_table: None,
                create_index: Some(ci),
            }),
            _ => {
                warn!("schema row holds a non-CREATE statement: {}", sql);
                Err(Error::Malformed)
            }
        }
    }

    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    pub fn n_entries(&self) -> usize {
        self.entries.len()
    }

    /// 1-based ordinal of the named schema object, or None.
    pub fn exists(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name).map(|i| i + 1)
    }

    pub fn entry(&self, name: &str) -> Option<&SchemaEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn root_page(&self, name: &str) -> Option<PageNum> {
        self.entry(name).map(|e| e.root_page)
    }

    fn table(&self, table_name: &str) -> Option<&ast::CreateTableStatement> {
        self.entry(table_name)
            .filter(|e| e.kind == SchemaKind::Table)
            .and_then(|e| e.create_table.as_ref())
    }

    pub fn table_ncols(&self, table_name: &str) -> Option<usize> {
        self.table(table_name).map(|t| t.coldefs.len())
    }

    /// 1-based position of `col_name` within the table, or None.
    pub fn table_col_position(&self, table_name: &str, col_name: &str) -> Option<usize> {
        self.table(table_name)?
            .coldefs
            .iter()
            .position(|c| c.name == col_name)
            .map(|i| i + 1)
    }

    pub fn table_col_type(&self, table_name: &str, col_name: &str) -> Option<ast::ColType> {
        self.table(table_name)?
            .coldefs
            .iter()
            .find(|c| c.name == col_name)
            .map(|c| c.coltype)
    }

    pub fn is_pkey(&self, table_name: &str, col_name: &str) -> bool {
        self.table(table_name)
            .and_then(|t| t.coldefs.iter().find(|c| c.name == col_name))
            .map(|c| c.is_pkey)
            .unwrap_or(false)
    }

    /// The index over `(table_name, col_name)`, if one exists.
    pub fn index_on(&self, table_name: &str, col_name: &str) -> Option<&SchemaEntry> {
        self.entries.iter().find(|e| {
            e.kind == SchemaKind::Index
                && e.assoc_table == table_name
                && e.create_index
                    .as_ref()
                    .map(|ci| ci.colname == col_name)
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db_path(name: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "minidb_schema_test_{}_{}.db",
            name,
            std::process::id()
        ));
        let s = p.to_str().unwrap().to_string();
        let _ = std::fs::remove_file(&s);
        s
    }

    fn schema_row(kind: &str, name: &str, assoc: &str, root: i32, sql: &str) -> Vec<u8> {
        record::encode(&[
            ColValue::Text(String::from(kind)),
            ColValue::Text(String::from(name)),
            ColValue::Text(String::from(assoc)),
            ColValue::Int(root),
            ColValue::Text(String::from(sql)),
        ])
    }

    #[test]
    fn test_load_empty_schema() {
        let path = temp_db_path("empty");
        let mut bt = BTree::open(&path).unwrap();
        let schema = Schema::load(&mut bt).unwrap();
        assert_eq!(schema.n_entries(), 0);
        assert_eq!(schema.exists("t"), None);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_and_query_entries() {
        let path = temp_db_path("roundtrip");
        let mut bt = BTree::open(&path).unwrap();
        bt.insert_in_table(
            1,
            1,
            schema_row(
                "table",
                "t",
                "t",
                2,
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
            ),
        )
        .unwrap();
        bt.insert_in_table(
            1,
            2,
            schema_row("index", "ix", "t", 3, "CREATE INDEX ix ON t (age)"),
        )
        .unwrap();

        let schema = Schema::load(&mut bt).unwrap();
        assert_eq!(schema.n_entries(), 2);
        assert_eq!(schema.exists("t"), Some(1));
        assert_eq!(schema.exists("ix"), Some(2));
        assert_eq!(schema.root_page("t"), Some(2));
        assert_eq!(schema.root_page("ix"), Some(3));
        assert_eq!(schema.table_ncols("t"), Some(3));
        assert_eq!(schema.table_col_position("t", "id"), Some(1));
        assert_eq!(schema.table_col_position("t", "age"), Some(3));
        assert_eq!(schema.table_col_position("t", "missing"), None);
        assert_eq!(
            schema.table_col_type("t", "name"),
            Some(ast::ColType::Text)
        );
        assert!(schema.is_pkey("t", "id"));
        assert!(!schema.is_pkey("t", "name"));
        assert!(schema.index_on("t", "age").is_some());
        assert!(schema.index_on("t", "name").is_none());
        // Index names do not answer table queries.
        assert_eq!(schema.table_ncols("ix"), None);
        std::fs::remove_file(&path).unwrap();
    }
}
