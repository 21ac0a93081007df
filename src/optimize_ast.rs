//! optimize_ast rewrites a parsed statement before code generation.
//!
//! The pipeline is parse, optimize, generate; this pass is currently the
//! identity rewrite, kept as its own step so the prepare path has the seam
//! where rewrites (predicate normalization, index selection hints) would go.

use crate::ast::ParsedStatement;

pub fn optimize_statement(stmt: ParsedStatement) -> ParsedStatement {
    stmt
}
