//! A didactic relational database engine over a single-file,
//! SQLite-compatible page format.
//!
//! SQL text is parsed, (trivially) optimized, and compiled to a program for
//! a register/cursor virtual machine (the DBM), which runs against B-trees
//! stored in fixed-size pages.  See the module docs for the layering:
//! `pager` owns page I/O, `btree` owns node layout and splits, `cursor`
//! walks one tree, `dbm` executes programs, `codegen` produces them, and
//! `schema` is the dictionary that binds names to root pages.

pub mod ast;
pub mod btree;
pub mod codegen;
pub mod cursor;
pub mod dbheader;
pub mod dbm;
pub mod formatting;
pub mod optimize_ast;
pub mod pager;
pub mod parser;
pub mod pt_to_ast;
pub mod record;
pub mod schema;
pub mod varint;

extern crate pest;
#[macro_use]
extern crate pest_derive;

pub use dbm::{Statement, StepResult, SQL_INTEGER_4BYTE, SQL_NOTVALID, SQL_NULL, SQL_TEXT};
pub use record::ColValue;
pub use schema::SCHEMA_BTREE_ROOT_PAGENUM;

use btree::BTree;
use schema::Schema;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] parser::Error),
    #[error("{0}")]
    Codegen(#[from] codegen::Error),
    #[error("Btree: {0}")]
    Btree(#[from] btree::Error),
    #[error("{0}")]
    Dbm(#[from] dbm::Error),
    #[error("Schema: {0}")]
    Schema(#[from] schema::Error),
}

/// One open database: the btree file plus the loaded dictionary.
#[derive(Debug)]
pub struct Database {
    bt: BTree,
    schema: Schema,
}

impl Database {
    /// Open `path`, creating and initializing the file if it is empty, and
    /// load the data dictionary from page 1.
    pub fn open(path: &str) -> Result<Database, Error> {
        let mut bt = BTree::open(path)?;
        let schema = Schema::load(&mut bt)?;
        Ok(Database { bt, schema })
    }

    /// Release the handle.  The pager flushes on every page write, so there
    /// is nothing left to do beyond dropping.
    pub fn close(self) {}

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Compile one SQL statement: parse, optimize (identity), generate code.
    pub fn prepare(&self, sql: &str) -> Result<Statement, Error> {
        let parsed = pt_to_ast::parse_statement(sql)?;
        let explain = parsed.explain;
        let parsed = optimize_ast::optimize_statement(parsed);
        let out = codegen::codegen(&parsed, &self.schema)?;
        Ok(Statement::new(
            out.ops,
            out.col_names,
            explain,
            out.refreshes_schema,
        ))
    }

    /// Run the statement until it emits a row or completes.  Completion of a
    /// schema-changing statement reloads the dictionary.
    pub fn step(&mut self, stmt: &mut Statement) -> Result<StepResult, Error> {
        let result = stmt.step(&mut self.bt)?;
        if result == StepResult::Done && stmt.refreshes_schema {
            self.schema = Schema::load(&mut self.bt)?;
            stmt.refreshes_schema = false;
        }
        Ok(result)
    }

    /// Release a statement's cursors and registers.  Dropping the statement
    /// has the same effect; this is the explicit form.
    pub fn finalize(&mut self, mut stmt: Statement) {
        stmt.release();
    }

    /// Render the B-tree rooted at `root` as indented text, for inspection
    /// from the shell.
    pub fn dump_tree(&mut self, root: pager::PageNum) -> Result<String, Error> {
        Ok(self.bt.dump(root)?)
    }

    /// Convenience: prepare, step to completion, and collect all rows.
    pub fn run(&mut self, sql: &str) -> Result<(Vec<String>, Vec<Vec<ColValue>>), Error> {
        let mut stmt = self.prepare(sql)?;
        let mut rows = vec![];
        loop {
            match self.step(&mut stmt)? {
                StepResult::Done => break,
                StepResult::Row => {
                    let mut row = Vec::with_capacity(stmt.column_count());
                    for i in 0..stmt.column_count() {
                        let t = stmt.column_type(i);
                        row.push(if t == SQL_NULL {
                            ColValue::Null
                        } else if t == SQL_INTEGER_4BYTE {
                            ColValue::Int(stmt.column_int(i))
                        } else if t >= SQL_TEXT && (t - SQL_TEXT) % 2 == 0 {
                            ColValue::Text(String::from(stmt.column_text(i).unwrap_or("")))
                        } else {
                            ColValue::Null
                        });
                    }
                    rows.push(row);
                }
            }
        }
        let names = (0..stmt.column_count())
            .map(|i| String::from(stmt.column_name(i).unwrap_or("")))
            .collect();
        self.finalize(stmt);
        Ok((names, rows))
    }
}
