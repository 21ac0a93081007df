// A small REPL over the library: open a database file, read statements from
// stdin, print result rows.  Dot commands: .schema lists the dictionary,
// .quit leaves.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use env_logger::Env;

use minidb::formatting;
use minidb::{Database, StepResult};

fn run_statement(db: &mut Database, sql: &str) -> Result<()> {
    let mut stmt = db.prepare(sql).context("prepare failed")?;
    let mut printed_header = false;
    loop {
        match db.step(&mut stmt)? {
            StepResult::Done => break,
            StepResult::Row => {
                if !printed_header {
                    formatting::print_header(&stmt);
                    printed_header = true;
                }
                formatting::print_row(&stmt);
            }
        }
    }
    db.finalize(stmt);
    Ok(())
}

fn print_schema(db: &Database) {
    for entry in db.schema().entries() {
        println!("{};", entry.sql);
    }
}

fn print_tables(db: &Database) {
    let names = db
        .schema()
        .entries()
        .iter()
        .filter(|e| e.kind == minidb::schema::SchemaKind::Table)
        .map(|e| e.name.clone())
        .collect::<Vec<_>>()
        .join(", ");
    println!("{names}");
}

fn print_btree(db: &mut Database, name: &str) {
    match db.schema().root_page(name) {
        None => eprintln!("error: no table or index named {name}"),
        Some(root) => match db.dump_tree(root) {
            Ok(dump) => print!("{dump}"),
            Err(e) => eprintln!("error: {e}"),
        },
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let args = std::env::args().collect::<Vec<_>>();
    if args.len() != 2 {
        bail!("usage: {} <database file>", args[0]);
    }
    let mut db = Database::open(&args[1])
        .with_context(|| format!("could not open database {}", args[1]))?;

    let stdin = std::io::stdin();
    loop {
        print!("minidb> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            ".quit" | ".exit" => break,
            ".schema" => print_schema(&db),
            ".tables" => print_tables(&db),
            cmd if cmd.starts_with(".btree ") => {
                print_btree(&mut db, cmd.trim_start_matches(".btree ").trim());
            }
            sql => {
                if let Err(e) = run_statement(&mut db, sql) {
                    eprintln!("error: {:#}", e);
                }
            }
        }
    }
    Ok(())
}
