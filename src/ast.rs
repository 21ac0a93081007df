//! This module defines abstract syntax tree (AST) types for SQL.

use enum_as_inner::EnumAsInner;

/// Declared column types.  `CHAR` in the source text unifies with TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColType {
    Integer,
    Text,
}

impl std::fmt::Display for ColType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColType::Integer => write!(f, "INTEGER"),
            ColType::Text => write!(f, "TEXT"),
        }
    }
}

/// Literal constants.  A one-character quoted literal is kept as `Char` so
/// validation can promote it to a single-character string against a TEXT
/// column, and reject it against an INTEGER one.
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum Constant {
    Int(i32),
    Text(String),
    Char(char),
    Null,
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(x) => x.fmt(f),
            Constant::Text(x) => x.fmt(f),
            Constant::Char(x) => x.fmt(f),
            Constant::Null => "NULL".fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColDef {
    pub name: String,
    pub coltype: ColType,
    pub is_pkey: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableStatement {
    pub tablename: String,
    pub coldefs: Vec<ColDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndexStatement {
    pub indexname: String,
    pub tablename: String,
    pub colname: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub tablename: String,
    /// None means "all columns in declaration order".
    pub colnames: Option<Vec<String>>,
    pub rows: Vec<Vec<Constant>>,
}

#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum SelItem {
    Star,
    ColName(String),
}

impl std::fmt::Display for SelItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelItem::Star => "*".fmt(f),
            SelItem::ColName(name) => name.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => "=".fmt(f),
            CompareOp::Gt => ">".fmt(f),
            CompareOp::Ge => ">=".fmt(f),
            CompareOp::Lt => "<".fmt(f),
            CompareOp::Le => "<=".fmt(f),
        }
    }
}

/// `WHERE col OP literal`, the only predicate form supported.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub colname: String,
    pub op: CompareOp,
    pub value: Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub items: Vec<SelItem>,
    pub tablename: String,
    pub where_clause: Option<WhereClause>,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum SqlStatement {
    Select(SelectStatement),
    Insert(InsertStatement),
    CreateTable(CreateTableStatement),
    CreateIndex(CreateIndexStatement),
}

/// A parsed statement plus the properties the rest of the pipeline needs:
/// the original text (stored in schema rows) and the EXPLAIN flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub explain: bool,
    pub stmt: SqlStatement,
    pub text: String,
}
