//! `pt_to_ast` has routines for converting parse trees to ASTs for SQL.
//! A pest parse tree has one enum for all possible terminals and
//! non-terminals.  Our AST has one type per statement, and discards lexical
//! detail like case and position in the input.

use itertools::Itertools;

use crate::ast;
use crate::parser::{parse_statement_tree, Error, Rule};

/// Parse one SQL statement into the AST, keeping the original text.
pub fn parse_statement(sql: &str) -> Result<ast::ParsedStatement, Error> {
    let statement = parse_statement_tree(sql)?;
    let mut explain = false;
    let mut stmt = None;
    for p in statement.into_inner() {
        match p.as_rule() {
            Rule::explain => explain = true,
            Rule::create_table_stmt => {
                stmt = Some(ast::SqlStatement::CreateTable(pt_create_table_to_ast(p)?));
            }
            Rule::create_index_stmt => {
                stmt = Some(ast::SqlStatement::CreateIndex(pt_create_index_to_ast(p)?));
            }
            Rule::insert_stmt => {
                stmt = Some(ast::SqlStatement::Insert(pt_insert_to_ast(p)?));
            }
            Rule::select_stmt => {
                stmt = Some(ast::SqlStatement::Select(pt_select_to_ast(p)?));
            }
            Rule::EOI => (),
            _ => unreachable!(),
        }
    }
    let stmt = stmt.ok_or_else(|| Error::Syntax(String::from("no statement found")))?;
    Ok(ast::ParsedStatement {
        explain,
        stmt,
        text: String::from(sql.trim().trim_end_matches(';')),
    })
}

fn pt_create_table_to_ast(
    pair: pest::iterators::Pair<'_, Rule>,
) -> Result<ast::CreateTableStatement, Error> {
    let mut tablename = String::new();
    let mut coldefs: Vec<ast::ColDef> = vec![];
    for c in pair.into_inner() {
        match c.as_rule() {
            Rule::table_identifier => tablename = String::from(c.as_str()),
            Rule::column_defs => {
                for column_def in c.into_inner() {
                    match column_def.as_rule() {
                        Rule::column_def => {
                            let parts = column_def.into_inner().collect_vec();
                            let (name, coltype) = (parts[0].as_str(), parts[1].as_str());
                            coldefs.push(ast::ColDef {
                                name: String::from(name),
                                coltype: parse_col_type(coltype)?,
                                is_pkey: parts.len() > 2,
                            });
                        }
                        _ => unreachable!(),
                    }
                }
            }
            _ => unreachable!(),
        }
    }
    Ok(ast::CreateTableStatement { tablename, coldefs })
}

fn pt_create_index_to_ast(
    pair: pest::iterators::Pair<'_, Rule>,
) -> Result<ast::CreateIndexStatement, Error> {
    let (indexname, tablename, colname) = pair
        .into_inner()
        .take(3)
        .map(|p| String::from(p.as_str()))
        .collect_tuple()
        .ok_or_else(|| Error::Syntax(String::from("malformed CREATE INDEX")))?;
    Ok(ast::CreateIndexStatement {
        indexname,
        tablename,
        colname,
    })
}

fn pt_insert_to_ast(pair: pest::iterators::Pair<'_, Rule>) -> Result<ast::InsertStatement, Error> {
    let mut tablename = String::new();
    let mut colnames: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<ast::Constant>> = vec![];
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::table_identifier => tablename = String::from(p.as_str()),
            Rule::column_names => {
                colnames = Some(p.into_inner().map(|n| String::from(n.as_str())).collect());
            }
            Rule::value_tuple => {
                let row = p
                    .into_inner()
                    .map(parse_literal_from_rule)
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push(row);
            }
            _ => unreachable!(),
        }
    }
    Ok(ast::InsertStatement {
        tablename,
        colnames,
        rows,
    })
}

fn pt_select_to_ast(pair: pest::iterators::Pair<'_, Rule>) -> Result<ast::SelectStatement, Error> {
    let mut items: Vec<ast::SelItem> = vec![];
    let mut tablename = String::new();
    let mut where_clause = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::select_items => {
                for item in p.into_inner() {
                    match item.as_rule() {
                        Rule::star => items.push(ast::SelItem::Star),
                        Rule::select_item => {
                            items.push(ast::SelItem::ColName(String::from(item.as_str())));
                        }
                        _ => unreachable!(),
                    }
                }
            }
            Rule::table_identifier => tablename = String::from(p.as_str()),
            Rule::where_clause => {
                let parts = p.into_inner().collect_vec();
                where_clause = Some(ast::WhereClause {
                    colname: String::from(parts[0].as_str()),
                    op: parse_compare_op(parts[1].as_str())?,
                    value: parse_literal_from_rule(parts[2].clone())?,
                });
            }
            _ => unreachable!(),
        }
    }
    Ok(ast::SelectStatement {
        items,
        tablename,
        where_clause,
    })
}

fn parse_col_type(s: &str) -> Result<ast::ColType, Error> {
    match s.to_lowercase().as_str() {
        "int" | "integer" => Ok(ast::ColType::Integer),
        "text" | "char" => Ok(ast::ColType::Text),
        other => Err(Error::Syntax(format!("unknown column type: {}", other))),
    }
}

fn parse_compare_op(s: &str) -> Result<ast::CompareOp, Error> {
    match s {
        "=" => Ok(ast::CompareOp::Eq),
        ">" => Ok(ast::CompareOp::Gt),
        ">=" => Ok(ast::CompareOp::Ge),
        "<" => Ok(ast::CompareOp::Lt),
        "<=" => Ok(ast::CompareOp::Le),
        other => Err(Error::Syntax(format!("unknown comparison: {}", other))),
    }
}

fn remove_single_quoting(s: &str) -> String {
    s[1..s.len() - 1].replace("''", "'")
}

pub fn parse_literal_from_rule(
    pair: pest::iterators::Pair<'_, Rule>,
) -> Result<ast::Constant, Error> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| Error::Syntax(String::from("empty literal")))?;
    match inner.as_rule() {
        Rule::null_literal => Ok(ast::Constant::Null),
        Rule::integer_literal => inner
            .as_str()
            .parse::<i32>()
            .map(ast::Constant::Int)
            .map_err(|_| Error::Syntax(format!("integer out of range: {}", inner.as_str()))),
        Rule::single_quoted_string => {
            let s = remove_single_quoting(inner.as_str());
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(ast::Constant::Char(c)),
                _ => Ok(ast::Constant::Text(s)),
            }
        }
        _ => Err(Error::Syntax(format!(
            "unexpected literal rule: {:?}",
            inner.as_rule()
        ))),
    }
}
