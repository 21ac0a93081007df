//! parser wraps the pest-generated SQL parser.
//!
//! The grammar lives in `sql.pest`; `pt_to_ast` turns the parse tree this
//! module produces into the AST consumed by the code generator.

use pest::Parser;

#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SQLParser;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("SQL syntax error: {0}")]
    Syntax(String),
}

/// Parse one statement, returning the top-level `statement` pair.
pub fn parse_statement_tree(sql: &str) -> Result<pest::iterators::Pair<'_, Rule>, Error> {
    let mut pairs =
        SQLParser::parse(Rule::statement, sql).map_err(|e| Error::Syntax(e.to_string()))?;
    pairs.next().ok_or_else(|| {
        Error::Syntax(String::from("empty parse result"))
    })
}
