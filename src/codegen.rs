//! codegen translates statement ASTs into DBM programs.
//!
//! Every name in the statement is resolved against the data dictionary
//! before any instruction is emitted; an unresolved or type-mismatched
//! reference fails the whole statement.  The generated programs follow a
//! small set of templates: full-scan SELECT, filtered SELECT (with an
//! index-seek variant for indexed equality), multi-row INSERT, and the two
//! CREATE forms, which append their own schema rows through the schema
//! B-tree like any other insert.

use log::{debug, info};

use crate::ast::{
    self, CompareOp, Constant, CreateIndexStatement, CreateTableStatement, InsertStatement,
    ParsedStatement, SelItem, SelectStatement,
};
use crate::dbm::{Op, Opcode};
use crate::schema::{Schema, SCHEMA_BTREE_ROOT_PAGENUM, SCHEMA_TABLE_NCOLS, SCHEMA_TYPE_INDEX, SCHEMA_TYPE_TABLE};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid SQL: {0}")]
    InvalidSql(String),
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidSql(msg.into())
}

/// A compiled program and its statement-level properties.
pub struct CodegenOutput {
    pub ops: Vec<Op>,
    pub col_names: Vec<String>,
    pub refreshes_schema: bool,
}

pub fn codegen(parsed: &ParsedStatement, schema: &Schema) -> Result<CodegenOutput, Error> {
    match &parsed.stmt {
        ast::SqlStatement::Select(s) => codegen_select(s, schema),
        ast::SqlStatement::Insert(i) => codegen_insert(i, schema),
        ast::SqlStatement::CreateTable(c) => codegen_create_table(c, &parsed.text, schema),
        ast::SqlStatement::CreateIndex(c) => codegen_create_index(c, &parsed.text, schema),
    }
}

// One projected output column.
struct ProjCol {
    col_index: usize,
    name: String,
    is_pkey: bool,
}

fn table_root_and_ncols(schema: &Schema, table: &str) -> Result<(i32, i32), Error> {
    let ncols = schema
        .table_ncols(table)
        .ok_or_else(|| invalid(format!("no such table: {}", table)))?;
    let root = schema
        .root_page(table)
        .ok_or_else(|| invalid(format!("no such table: {}", table)))?;
    Ok((root as i32, ncols as i32))
}

fn resolve_projection(
    select: &SelectStatement,
    schema: &Schema,
) -> Result<Vec<ProjCol>, Error> {
    let table = select.tablename.as_str();
    let mut cols = vec![];
    for item in &select.items {
        match item {
            SelItem::Star => {
                if select.items.len() != 1 {
                    return Err(invalid("'*' cannot be combined with column names"));
                }
                let entry = schema
                    .entry(table)
                    .and_then(|e| e.create_table.as_ref())
                    .ok_or_else(|| invalid(format!("no such table: {}", table)))?;
                for (i, coldef) in entry.coldefs.iter().enumerate() {
                    cols.push(ProjCol {
                        col_index: i,
                        name: coldef.name.clone(),
                        is_pkey: coldef.is_pkey,
                    });
                }
            }
            SelItem::ColName(name) => {
                let pos = schema.table_col_position(table, name).ok_or_else(|| {
                    invalid(format!("no such column: {}.{}", table, name))
                })?;
                cols.push(ProjCol {
                    col_index: pos - 1,
                    name: name.clone(),
                    is_pkey: schema.is_pkey(table, name),
                });
            }
        }
    }
    Ok(cols)
}

// Emit the per-column loads followed by ResultRow, starting at the current
// end of the program.  The primary-key column reads the cell key; everything
// else decodes out of the record.
fn emit_projection(ops: &mut Vec<Op>, cursor: i32, cols: &[ProjCol], base_reg: i32) {
    for (i, col) in cols.iter().enumerate() {
        if col.is_pkey {
            ops.push(Op::new(Opcode::Key, cursor, base_reg + i as i32, 0));
        } else {
            ops.push(Op::new(
                Opcode::Column,
                cursor,
                col.col_index as i32,
                base_reg + i as i32,
            ));
        }
    }
    ops.push(Op::new(
        Opcode::ResultRow,
        base_reg,
        cols.len() as i32,
        0,
    ));
}

// A WHERE literal after type checking against the column.
enum WhereLiteral {
    Int(i32),
    Str(String),
}

fn resolve_where_literal(
    value: &Constant,
    col_type: ast::ColType,
) -> Result<WhereLiteral, Error> {
    match (value, col_type) {
        (Constant::Int(v), ast::ColType::Integer) => Ok(WhereLiteral::Int(*v)),
        (Constant::Text(s), ast::ColType::Text) => Ok(WhereLiteral::Str(s.clone())),
        // A one-character literal promotes to a single-character string
        // against a text column.
        (Constant::Char(c), ast::ColType::Text) => Ok(WhereLiteral::Str(c.to_string())),
        _ => Err(invalid(format!(
            "literal {} does not match the column's {} type",
            value, col_type
        ))),
    }
}

fn compare_opcode(op: CompareOp) -> Opcode {
    match op {
        CompareOp::Eq => Opcode::Eq,
        CompareOp::Ge => Opcode::Ge,
        CompareOp::Gt => Opcode::Gt,
        CompareOp::Le => Opcode::Le,
        CompareOp::Lt => Opcode::Lt,
    }
}

fn codegen_select(select: &SelectStatement, schema: &Schema) -> Result<CodegenOutput, Error> {
    let table = select.tablename.as_str();
    let (root, ncols) = table_root_and_ncols(schema, table)?;
    let cols = resolve_projection(select, schema)?;
    let col_names: Vec<String> = cols.iter().map(|c| c.name.clone()).collect();
    let n = cols.len() as i32;

    let ops = match &select.where_clause {
        None => {
            // 0 Integer, 1 OpenRead, 2 Rewind, 3..3+n-1 loads, ResultRow,
            // Next (loop to 3), Close, Halt.
            let mut ops = vec![
                Op::new(Opcode::Integer, root, 0, 0),
                Op::new(Opcode::OpenRead, 0, 0, ncols),
                Op::new(Opcode::Rewind, 0, 3 + n + 2, 0),
            ];
            emit_projection(&mut ops, 0, &cols, 1);
            ops.push(Op::new(Opcode::Next, 0, 3, 0));
            ops.push(Op::new(Opcode::Close, 0, 0, 0));
            ops.push(Op::new(Opcode::Halt, 0, 0, 0));
            ops
        }
        Some(wc) => {
            let col_type = schema
                .table_col_type(table, &wc.colname)
                .ok_or_else(|| invalid(format!("no such column: {}.{}", table, wc.colname)))?;
            let literal = resolve_where_literal(&wc.value, col_type)?;

            let indexed = wc.op == CompareOp::Eq
                && matches!(literal, WhereLiteral::Int(_))
                && schema.index_on(table, &wc.colname).is_some();
            if indexed {
                let idx = schema.index_on(table, &wc.colname).unwrap();
                info!("using index {} for {}.{}", idx.name, table, wc.colname);
                let key = match literal {
                    WhereLiteral::Int(v) => v,
                    _ => unreachable!(),
                };
                // Seek the index by key, map to the primary key, then seek
                // the table once.  Addresses: projection starts at 8; both
                // misses jump to the close block at 8+n+1.
                let close = 8 + n + 1;
                let mut ops = vec![
                    Op::new(Opcode::Integer, root, 0, 0),
                    Op::new(Opcode::OpenRead, 0, 0, ncols),
                    Op::new(Opcode::Integer, idx.root_page as i32, 1, 0),
                    Op::new(Opcode::OpenRead, 1, 1, 2),
                    Op::new(Opcode::Integer, key, 2, 0),
                    Op::new(Opcode::Seek, 1, close, 2),
                    Op::new(Opcode::IdxPKey, 1, 3, 0),
                    Op::new(Opcode::Seek, 0, close, 3),
                ];
                emit_projection(&mut ops, 0, &cols, 4);
                ops.push(Op::new(Opcode::Close, 0, 0, 0));
                ops.push(Op::new(Opcode::Close, 1, 0, 0));
                ops.push(Op::new(Opcode::Halt, 0, 0, 0));
                return Ok(CodegenOutput {
                    ops,
                    col_names,
                    refreshes_schema: false,
                });
            }

            // Scan layout: the literal loads once at 3; the loop re-enters at
            // 4 where the column value is refreshed.  The comparison jumps to
            // the projection block at 7 on a match; the following Eq of the
            // literal with itself always jumps to the Next op.
            let mut ops = vec![
                Op::new(Opcode::Integer, root, 0, 0),
                Op::new(Opcode::OpenRead, 0, 0, ncols),
                Op::new(Opcode::Rewind, 0, 7 + n + 2, 0),
            ];
            ops.push(match &literal {
                WhereLiteral::Int(v) => Op::new(Opcode::Integer, *v, 1, 0),
                WhereLiteral::Str(s) => {
                    Op::with_text(Opcode::String, s.len() as i32, 1, 0, s)
                }
            });
            if schema.is_pkey(table, &wc.colname) {
                ops.push(Op::new(Opcode::Key, 0, 2, 0));
            } else {
                let pos = schema.table_col_position(table, &wc.colname).unwrap();
                ops.push(Op::new(Opcode::Column, 0, (pos - 1) as i32, 2));
            }
            ops.push(Op::new(compare_opcode(wc.op), 1, 7, 2));
            ops.push(Op::new(Opcode::Eq, 1, 7 + n + 1, 1));
            emit_projection(&mut ops, 0, &cols, 3);
            ops.push(Op::new(Opcode::Next, 0, 4, 0));
            ops.push(Op::new(Opcode::Close, 0, 0, 0));
            ops.push(Op::new(Opcode::Halt, 0, 0, 0));
            ops
        }
    };
    Ok(CodegenOutput {
        ops,
        col_names,
        refreshes_schema: false,
    })
}

fn codegen_insert(insert: &InsertStatement, schema: &Schema) -> Result<CodegenOutput, Error> {
    let table = insert.tablename.as_str();
    let (root, ncols_i32) = table_root_and_ncols(schema, table)?;
    let ncols = ncols_i32 as usize;
    let coldefs = &schema
        .entry(table)
        .and_then(|e| e.create_table.as_ref())
        .ok_or_else(|| invalid(format!("no such table: {}", table)))?
        .coldefs;

    // An explicit column list must name every column in declaration order:
    // records store columns in that order, and the key column must be among
    // them.
    if let Some(names) = &insert.colnames {
        if names.len() != ncols
            || names
                .iter()
                .zip(coldefs.iter())
                .any(|(n, d)| *n != d.name)
        {
            return Err(invalid(
                "column list must name every table column in declaration order",
            ));
        }
    }
    let pkey_n = coldefs
        .iter()
        .position(|c| c.is_pkey)
        .ok_or_else(|| invalid(format!("table {} has no primary key", table)))?;

    // Values are validated column-wise; the flattened count must be a
    // multiple of the column count.
    let values: Vec<&Constant> = insert.rows.iter().flatten().collect();
    if values.is_empty() || values.len() % ncols != 0 {
        return Err(invalid("row values do not match the table's column count"));
    }
    #[derive(Clone)]
    enum Checked {
        Key(i32),
        Int(i32),
        Str(String),
    }
    let mut checked: Vec<Checked> = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let coldef = &coldefs[i % ncols];
        let c = match (value, coldef.coltype) {
            (Constant::Int(v), ast::ColType::Integer) => {
                if coldef.is_pkey {
                    Checked::Key(*v)
                } else {
                    Checked::Int(*v)
                }
            }
            (Constant::Text(s), ast::ColType::Text) => Checked::Str(s.clone()),
            (Constant::Char(ch), ast::ColType::Text) => Checked::Str(ch.to_string()),
            _ => {
                return Err(invalid(format!(
                    "value {} does not match column {}'s {} type",
                    value, coldef.name, coldef.coltype
                )))
            }
        };
        checked.push(c);
    }

    // 0 Integer root, 1 OpenWrite, 2 Rewind (straight into the record loop
    // either way; a fresh table is empty), then one block per record.
    let base_reg = 1i32;
    let key_reg = base_reg + ncols as i32;
    let record_reg = key_reg + 1;
    let mut ops = vec![
        Op::new(Opcode::Integer, root, 0, 0),
        Op::new(Opcode::OpenWrite, 0, 0, ncols as i32),
        Op::new(Opcode::Rewind, 0, 3, 0),
    ];
    for row in checked.chunks(ncols) {
        for (i, value) in row.iter().enumerate() {
            match value {
                Checked::Key(v) => {
                    ops.push(Op::new(Opcode::Integer, *v, key_reg, 0));
                    // The key column's record slot stays NULL; the value
                    // lives in the cell key.
                    ops.push(Op::new(Opcode::Null, 0, base_reg + i as i32, 0));
                }
                Checked::Int(v) => {
                    ops.push(Op::new(Opcode::Integer, *v, base_reg + i as i32, 0));
                }
                Checked::Str(s) => {
                    ops.push(Op::with_text(
                        Opcode::String,
                        s.len() as i32,
                        base_reg + i as i32,
                        0,
                        s,
                    ));
                }
            }
        }
        ops.push(Op::new(Opcode::MakeRecord, base_reg, ncols as i32, record_reg));
        ops.push(Op::new(Opcode::Insert, 0, record_reg, key_reg));
    }
    ops.push(Op::new(Opcode::Close, 0, 0, 0));
    ops.push(Op::new(Opcode::Halt, 0, 0, 0));
    debug!(
        "insert program: {} records, {} ops, pkey column {}",
        values.len() / ncols,
        ops.len(),
        pkey_n
    );
    Ok(CodegenOutput {
        ops,
        col_names: vec![],
        refreshes_schema: false,
    })
}

fn codegen_create_table(
    create: &CreateTableStatement,
    sql_text: &str,
    schema: &Schema,
) -> Result<CodegenOutput, Error> {
    if schema.exists(&create.tablename).is_some() {
        return Err(invalid(format!("{} already exists", create.tablename)));
    }
    match create.coldefs.first() {
        Some(first) if first.is_pkey && first.coltype == ast::ColType::Integer => {}
        _ => {
            return Err(invalid(
                "the first column must be an INTEGER PRIMARY KEY",
            ))
        }
    }
    if create.coldefs.iter().skip(1).any(|c| c.is_pkey) {
        return Err(invalid("only the first column may be the primary key"));
    }

    // Allocate the new root, then append this statement's schema row to the
    // page-1 B-tree keyed by the next schema ordinal.  Record registers run
    // 1..=5 (type, name, tbl_name, rootpage, sql); CreateTable writes the
    // rootpage slot directly.
    let ordinal = schema.n_entries() as i32 + 1;
    let name = create.tablename.as_str();
    let ops = vec![
        Op::new(Opcode::Integer, SCHEMA_BTREE_ROOT_PAGENUM as i32, 0, 0),
        Op::new(Opcode::OpenWrite, 0, 0, SCHEMA_TABLE_NCOLS as i32),
        Op::with_text(Opcode::String, SCHEMA_TYPE_TABLE.len() as i32, 1, 0, SCHEMA_TYPE_TABLE),
        Op::with_text(Opcode::String, name.len() as i32, 2, 0, name),
        Op::with_text(Opcode::String, name.len() as i32, 3, 0, name),
        Op::new(Opcode::CreateTable, 4, 0, 0),
        Op::with_text(Opcode::String, sql_text.len() as i32, 5, 0, sql_text),
        Op::new(Opcode::Integer, ordinal, 6, 0),
        Op::new(Opcode::MakeRecord, 1, 5, 7),
        Op::new(Opcode::Insert, 0, 7, 6),
        Op::new(Opcode::Close, 0, 0, 0),
        Op::new(Opcode::Halt, 0, 0, 0),
    ];
    Ok(CodegenOutput {
        ops,
        col_names: vec![],
        refreshes_schema: true,
    })
}

fn codegen_create_index(
    create: &CreateIndexStatement,
    sql_text: &str,
    schema: &Schema,
) -> Result<CodegenOutput, Error> {
    if schema.exists(&create.indexname).is_some() {
        return Err(invalid(format!("{} already exists", create.indexname)));
    }
    let table = create.tablename.as_str();
    let (table_root, ncols) = table_root_and_ncols(schema, table)?;
    let col_type = schema
        .table_col_type(table, &create.colname)
        .ok_or_else(|| invalid(format!("no such column: {}.{}", table, create.colname)))?;
    if col_type != ast::ColType::Integer {
        return Err(invalid("only INTEGER columns can be indexed"));
    }
    let col_pos = schema
        .table_col_position(table, &create.colname)
        .unwrap() as i32;
    let is_pkey = schema.is_pkey(table, &create.colname);
    let ordinal = schema.n_entries() as i32 + 1;
    let name = create.indexname.as_str();

    // Cursor 0 scans the table, cursor 1 writes the new index, cursor 2
    // appends the index's schema row to page 1.  CreateIndex lands in
    // register 4, which doubles as the schema record's rootpage slot.
    let mut ops = vec![
        Op::new(Opcode::Integer, table_root, 0, 0),
        Op::new(Opcode::OpenRead, 0, 0, ncols),
        Op::new(Opcode::CreateIndex, 4, 0, 0),
        Op::new(Opcode::OpenWrite, 1, 4, 2),
        Op::new(Opcode::Integer, SCHEMA_BTREE_ROOT_PAGENUM as i32, 9, 0),
        Op::new(Opcode::OpenWrite, 2, 9, SCHEMA_TABLE_NCOLS as i32),
        Op::with_text(Opcode::String, SCHEMA_TYPE_INDEX.len() as i32, 1, 0, SCHEMA_TYPE_INDEX),
        Op::with_text(Opcode::String, name.len() as i32, 2, 0, name),
        Op::with_text(Opcode::String, table.len() as i32, 3, 0, table),
        Op::with_text(Opcode::String, sql_text.len() as i32, 5, 0, sql_text),
        Op::new(Opcode::Integer, ordinal, 6, 0),
        Op::new(Opcode::MakeRecord, 1, 5, 7),
        Op::new(Opcode::Insert, 2, 7, 6),
    ];
    // Bulk-load loop: Key -> column value -> IdxInsert -> Next.  An index on
    // the key column itself reads the key twice, since the record stores
    // NULL in that slot.
    let loop_start = ops.len() as i32;
    let close = loop_start + 5;
    ops.push(Op::new(Opcode::Rewind, 0, close, 0));
    ops.push(Op::new(Opcode::Key, 0, 10, 0));
    if is_pkey {
        ops.push(Op::new(Opcode::Key, 0, 11, 0));
    } else {
        ops.push(Op::new(Opcode::Column, 0, col_pos - 1, 11));
    }
    ops.push(Op::new(Opcode::IdxInsert, 1, 11, 10));
    ops.push(Op::new(Opcode::Next, 0, loop_start + 1, 0));
    ops.push(Op::new(Opcode::Close, 0, 0, 0));
    ops.push(Op::new(Opcode::Close, 1, 0, 0));
    ops.push(Op::new(Opcode::Close, 2, 0, 0));
    ops.push(Op::new(Opcode::Halt, 0, 0, 0));
    Ok(CodegenOutput {
        ops,
        col_names: vec![],
        refreshes_schema: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pt_to_ast::parse_statement;
    use crate::record::ColValue;

    // A dictionary with one two-column table, built from an on-disk image.
    fn test_schema() -> Schema {
        let mut p = std::env::temp_dir();
        p.push(format!("minidb_codegen_schema_{}.db", std::process::id()));
        let path = p.to_str().unwrap().to_string();
        let _ = std::fs::remove_file(&path);
        let mut bt = crate::btree::BTree::open(&path).unwrap();
        bt.insert_in_table(
            1,
            1,
            crate::record::encode(&[
                ColValue::Text(String::from("table")),
                ColValue::Text(String::from("t")),
                ColValue::Text(String::from("t")),
                ColValue::Int(2),
                ColValue::Text(String::from(
                    "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)",
                )),
            ]),
        )
        .unwrap();
        let schema = Schema::load(&mut bt).unwrap();
        std::fs::remove_file(&path).unwrap();
        schema
    }

    fn gen(sql: &str, schema: &Schema) -> Result<CodegenOutput, Error> {
        codegen(&parse_statement(sql).unwrap(), schema)
    }

    #[test]
    fn test_select_star_program_shape() {
        let schema = test_schema();
        let out = gen("SELECT * FROM t", &schema).unwrap();
        assert_eq!(out.col_names, vec!["id", "name"]);
        let expected = vec![
            Op::new(Opcode::Integer, 2, 0, 0),
            Op::new(Opcode::OpenRead, 0, 0, 2),
            Op::new(Opcode::Rewind, 0, 7, 0),
            Op::new(Opcode::Key, 0, 1, 0),
            Op::new(Opcode::Column, 0, 1, 2),
            Op::new(Opcode::ResultRow, 1, 2, 0),
            Op::new(Opcode::Next, 0, 3, 0),
            Op::new(Opcode::Close, 0, 0, 0),
            Op::new(Opcode::Halt, 0, 0, 0),
        ];
        assert_eq!(out.ops, expected);
        assert!(!out.refreshes_schema);
    }

    #[test]
    fn test_select_where_program_shape() {
        let schema = test_schema();
        let out = gen("SELECT name FROM t WHERE id > 1", &schema).unwrap();
        let n = 1;
        let expected = vec![
            Op::new(Opcode::Integer, 2, 0, 0),
            Op::new(Opcode::OpenRead, 0, 0, 2),
            Op::new(Opcode::Rewind, 0, 7 + n + 2, 0),
            Op::new(Opcode::Integer, 1, 1, 0),
            Op::new(Opcode::Key, 0, 2, 0),
            Op::new(Opcode::Gt, 1, 7, 2),
            Op::new(Opcode::Eq, 1, 7 + n + 1, 1),
            Op::new(Opcode::Column, 0, 1, 3),
            Op::new(Opcode::ResultRow, 3, 1, 0),
            Op::new(Opcode::Next, 0, 4, 0),
            Op::new(Opcode::Close, 0, 0, 0),
            Op::new(Opcode::Halt, 0, 0, 0),
        ];
        assert_eq!(out.ops, expected);
    }

    #[test]
    fn test_select_validation_failures() {
        let schema = test_schema();
        assert!(gen("SELECT * FROM nosuch", &schema).is_err());
        assert!(gen("SELECT nosuch FROM t", &schema).is_err());
        assert!(gen("SELECT * FROM t WHERE nosuch = 1", &schema).is_err());
        // Type mismatches both ways.
        assert!(gen("SELECT * FROM t WHERE id = 'abc'", &schema).is_err());
        assert!(gen("SELECT * FROM t WHERE name = 1", &schema).is_err());
        // One-character literals promote against TEXT but not INTEGER.
        assert!(gen("SELECT * FROM t WHERE name = 'a'", &schema).is_ok());
        assert!(gen("SELECT * FROM t WHERE id = 'a'", &schema).is_err());
    }

    #[test]
    fn test_insert_program_shape() {
        let schema = test_schema();
        let out = gen("INSERT INTO t VALUES (1,'a'),(2,'bb')", &schema).unwrap();
        let expected = vec![
            Op::new(Opcode::Integer, 2, 0, 0),
            Op::new(Opcode::OpenWrite, 0, 0, 2),
            Op::new(Opcode::Rewind, 0, 3, 0),
            // record 1: key 1, NULL placeholder, 'a'
            Op::new(Opcode::Integer, 1, 3, 0),
            Op::new(Opcode::Null, 0, 1, 0),
            Op::with_text(Opcode::String, 1, 2, 0, "a"),
            Op::new(Opcode::MakeRecord, 1, 2, 4),
            Op::new(Opcode::Insert, 0, 4, 3),
            // record 2
            Op::new(Opcode::Integer, 2, 3, 0),
            Op::new(Opcode::Null, 0, 1, 0),
            Op::with_text(Opcode::String, 2, 2, 0, "bb"),
            Op::new(Opcode::MakeRecord, 1, 2, 4),
            Op::new(Opcode::Insert, 0, 4, 3),
            Op::new(Opcode::Close, 0, 0, 0),
            Op::new(Opcode::Halt, 0, 0, 0),
        ];
        assert_eq!(out.ops, expected);
    }

    #[test]
    fn test_insert_validation_failures() {
        let schema = test_schema();
        assert!(gen("INSERT INTO nosuch VALUES (1,'a')", &schema).is_err());
        // Wrong arity.
        assert!(gen("INSERT INTO t VALUES (1)", &schema).is_err());
        // Type mismatches.
        assert!(gen("INSERT INTO t VALUES ('a', 'b')", &schema).is_err());
        assert!(gen("INSERT INTO t VALUES (1, 2)", &schema).is_err());
        // NULL has no declared type to match.
        assert!(gen("INSERT INTO t VALUES (1, NULL)", &schema).is_err());
        // Column list must cover the table in order.
        assert!(gen("INSERT INTO t (name, id) VALUES ('a', 1)", &schema).is_err());
        assert!(gen("INSERT INTO t (id) VALUES (1)", &schema).is_err());
        assert!(gen("INSERT INTO t (id, name) VALUES (1, 'a')", &schema).is_ok());
    }

    #[test]
    fn test_create_table_program_appends_schema_row() {
        let schema = test_schema();
        let sql = "CREATE TABLE u (id INTEGER PRIMARY KEY, v INTEGER)";
        let out = gen(sql, &schema).unwrap();
        assert!(out.refreshes_schema);
        // Opens the schema tree for writing, allocates the new root into the
        // record's rootpage register, and inserts with the next ordinal key.
        assert_eq!(out.ops[0], Op::new(Opcode::Integer, 1, 0, 0));
        assert_eq!(out.ops[1], Op::new(Opcode::OpenWrite, 0, 0, 5));
        assert_eq!(out.ops[5], Op::new(Opcode::CreateTable, 4, 0, 0));
        assert_eq!(out.ops[7], Op::new(Opcode::Integer, 2, 6, 0));
        assert_eq!(out.ops[8], Op::new(Opcode::MakeRecord, 1, 5, 7));
        assert_eq!(out.ops[9], Op::new(Opcode::Insert, 0, 7, 6));
        assert_eq!(out.ops.last().unwrap().opcode, Opcode::Halt);
    }

    #[test]
    fn test_create_table_validation() {
        let schema = test_schema();
        assert!(gen("CREATE TABLE t (id INTEGER PRIMARY KEY)", &schema).is_err());
        assert!(gen("CREATE TABLE u (id INTEGER)", &schema).is_err());
        assert!(gen("CREATE TABLE u (id TEXT PRIMARY KEY)", &schema).is_err());
        assert!(gen(
            "CREATE TABLE u (id INTEGER PRIMARY KEY, v INTEGER PRIMARY KEY)",
            &schema
        )
        .is_err());
        assert!(gen("CREATE TABLE u (id INTEGER PRIMARY KEY, v TEXT)", &schema).is_ok());
    }

    #[test]
    fn test_create_index_validation() {
        let schema = test_schema();
        assert!(gen("CREATE INDEX t ON t (id)", &schema).is_err());
        assert!(gen("CREATE INDEX ix ON nosuch (id)", &schema).is_err());
        assert!(gen("CREATE INDEX ix ON t (nosuch)", &schema).is_err());
        assert!(gen("CREATE INDEX ix ON t (name)", &schema).is_err());
        let out = gen("CREATE INDEX ix ON t (id)", &schema).unwrap();
        assert!(out.refreshes_schema);
        assert_eq!(out.ops[2], Op::new(Opcode::CreateIndex, 4, 0, 0));
        // The bulk-load loop ends with IdxInsert feeding key and column regs.
        assert!(out
            .ops
            .iter()
            .any(|op| op.opcode == Opcode::IdxInsert && op.p1 == 1));
    }
}
