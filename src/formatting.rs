//! formatting prints result rows nicely for the command-line shell.

use crate::dbm::{Statement, SQL_INTEGER_4BYTE, SQL_NULL};

/// Print the column-name header for a statement's result set.
pub fn print_header(stmt: &Statement) {
    println!(
        "| {} |",
        (0..stmt.column_count())
            .map(|i| format!("{:15}", stmt.column_name(i).unwrap_or("")))
            .collect::<Vec<String>>()
            .join(" | ")
    );
}

/// Print the current result row.  Call after `step` returns a row.
pub fn print_row(stmt: &Statement) {
    let mut fields = Vec::with_capacity(stmt.column_count());
    for i in 0..stmt.column_count() {
        let t = stmt.column_type(i);
        if t == SQL_NULL {
            fields.push(format!("{:15}", "NULL"));
        } else if t == SQL_INTEGER_4BYTE {
            fields.push(format!("{:15}", stmt.column_int(i)));
        } else {
            fields.push(format!("{:15}", stmt.column_text(i).unwrap_or("")));
        }
    }
    println!("| {} |", fields.join(" | "));
}
