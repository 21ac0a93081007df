use pretty_assertions::assert_eq;

use minidb::{ColValue, Database, StepResult};

fn temp_db_path(name: &str) -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("minidb_it_{}_{}.db", name, std::process::id()));
    let s = p.to_str().unwrap().to_string();
    let _ = std::fs::remove_file(&s);
    s
}

fn text(s: &str) -> ColValue {
    ColValue::Text(String::from(s))
}

#[test]
fn test_fresh_open_writes_default_file_image() {
    let path = temp_db_path("fresh_open");
    let db = Database::open(&path).unwrap();
    db.close();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 1024);
    // 100-byte header with the magic and the default page size.
    assert_eq!(&bytes[0..16], b"SQLite format 3\0");
    assert_eq!(&bytes[16..18], &[0x04, 0x00]);
    // Empty table-leaf node at offset 100: type, free offset 108, no cells,
    // cell area starting at the page end.
    assert_eq!(bytes[100], 0x0D);
    assert_eq!(&bytes[101..103], &[0x00, 108]);
    assert_eq!(&bytes[103..105], &[0x00, 0x00]);
    assert_eq!(&bytes[105..107], &[0x04, 0x00]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_create_insert_select_roundtrip() {
    let path = temp_db_path("roundtrip");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    db.run("INSERT INTO t VALUES (1,'a'),(2,'bb'),(3,'ccc');")
        .unwrap();

    let (names, rows) = db.run("SELECT * FROM t;").unwrap();
    assert_eq!(names, vec!["id", "name"]);
    assert_eq!(
        rows,
        vec![
            vec![ColValue::Int(1), text("a")],
            vec![ColValue::Int(2), text("bb")],
            vec![ColValue::Int(3), text("ccc")],
        ]
    );
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_select_with_where() {
    let path = temp_db_path("where");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    db.run("INSERT INTO t VALUES (1,'a'),(2,'bb'),(3,'ccc');")
        .unwrap();

    let (names, rows) = db.run("SELECT name FROM t WHERE id > 1;").unwrap();
    assert_eq!(names, vec!["name"]);
    assert_eq!(rows, vec![vec![text("bb")], vec![text("ccc")]]);

    // The other comparison forms.
    let (_, rows) = db.run("SELECT id FROM t WHERE id <= 2").unwrap();
    assert_eq!(rows, vec![vec![ColValue::Int(1)], vec![ColValue::Int(2)]]);
    let (_, rows) = db.run("SELECT id FROM t WHERE name = 'bb'").unwrap();
    assert_eq!(rows, vec![vec![ColValue::Int(2)]]);
    let (_, rows) = db.run("SELECT id FROM t WHERE id >= 4").unwrap();
    assert_eq!(rows, Vec::<Vec<ColValue>>::new());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_duplicate_key_insert_fails() {
    let path = temp_db_path("duplicate");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    db.run("INSERT INTO t VALUES (1,'a'),(2,'bb'),(3,'ccc');")
        .unwrap();

    let err = db.run("INSERT INTO t VALUES (2,'x');").unwrap_err();
    assert!(format!("{}", err).contains("already exists"));

    // The table is unchanged for key 2.
    let (_, rows) = db.run("SELECT name FROM t WHERE id = 2").unwrap();
    assert_eq!(rows, vec![vec![text("bb")]]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_ten_thousand_keys_split_and_reopen() {
    let path = temp_db_path("split");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();

    // Insert in batches, keys shuffled across batches by striding.
    const N: i32 = 10_000;
    const BATCH: i32 = 100;
    for batch in 0..(N / BATCH) {
        let mut sql = String::from("INSERT INTO t VALUES ");
        for i in 0..BATCH {
            let key = 1 + (batch + (N / BATCH) * i) % N;
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("({},'v{}')", key, key));
        }
        db.run(&sql).unwrap();
    }

    let (_, rows) = db.run("SELECT id FROM t;").unwrap();
    assert_eq!(rows.len(), N as usize);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], ColValue::Int(i as i32 + 1));
    }
    db.close();

    // A re-opened file serves the same ascending sequence.
    let mut db = Database::open(&path).unwrap();
    let (_, rows) = db.run("SELECT id FROM t;").unwrap();
    assert_eq!(rows.len(), N as usize);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row[0], ColValue::Int(i as i32 + 1));
    }
    let (_, rows) = db.run("SELECT name FROM t WHERE id = 9999").unwrap();
    assert_eq!(rows, vec![vec![text("v9999")]]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_index_lookup() {
    let path = temp_db_path("index");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    db.run("INSERT INTO t VALUES (1,'a'),(2,'bb'),(3,'ccc');")
        .unwrap();
    db.run("CREATE INDEX ix ON t (id);").unwrap();

    // The dictionary now resolves the index, and equality lookups use it.
    assert!(db.schema().index_on("t", "id").is_some());
    let mut stmt = db.prepare("SELECT name FROM t WHERE id = 2;").unwrap();
    let uses_index = stmt
        .ops
        .iter()
        .any(|op| op.opcode == minidb::dbm::Opcode::IdxPKey);
    assert!(uses_index, "equality on an indexed column should seek the index");
    let mut rows = vec![];
    while db.step(&mut stmt).unwrap() == StepResult::Row {
        rows.push(stmt.column_text(0).map(String::from));
    }
    assert_eq!(rows, vec![Some(String::from("bb"))]);
    db.finalize(stmt);

    // A key the index does not hold produces no rows.
    let (_, rows) = db.run("SELECT name FROM t WHERE id = 9").unwrap();
    assert_eq!(rows, Vec::<Vec<ColValue>>::new());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_corrupt_header_rejected_on_open() {
    let path = temp_db_path("corrupt");
    Database::open(&path).unwrap().close();

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[44] = 0x02;
    std::fs::write(&path, &bytes).unwrap();

    let err = Database::open(&path).unwrap_err();
    assert!(matches!(
        err,
        minidb::Error::Btree(minidb::btree::Error::Header(_))
    ));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_schema_survives_reopen() {
    let path = temp_db_path("schema_reopen");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();
    db.run("CREATE TABLE u (id INTEGER PRIMARY KEY, v INTEGER);")
        .unwrap();
    db.close();

    let mut db = Database::open(&path).unwrap();
    assert_eq!(db.schema().exists("t"), Some(1));
    assert_eq!(db.schema().exists("u"), Some(2));
    db.run("INSERT INTO u VALUES (5, 50);").unwrap();
    let (_, rows) = db.run("SELECT v FROM u WHERE id = 5").unwrap();
    assert_eq!(rows, vec![vec![ColValue::Int(50)]]);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_explain_lists_program() {
    let path = temp_db_path("explain");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
        .unwrap();

    let mut stmt = db.prepare("EXPLAIN SELECT * FROM t;").unwrap();
    assert_eq!(stmt.column_count(), 6);
    assert_eq!(stmt.column_name(1), Some("opcode"));
    let mut opcodes = vec![];
    let mut addrs = vec![];
    while db.step(&mut stmt).unwrap() == StepResult::Row {
        addrs.push(stmt.column_int(0));
        opcodes.push(String::from(stmt.column_text(1).unwrap()));
    }
    assert_eq!(addrs, (0..opcodes.len() as i32).collect::<Vec<i32>>());
    assert_eq!(opcodes[0], "Integer");
    assert_eq!(opcodes[1], "OpenRead");
    assert_eq!(opcodes.last().unwrap(), "Halt");
    db.finalize(stmt);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_char_column_roundtrip() {
    // CHAR unifies with TEXT; one-character literals land in text columns.
    let path = temp_db_path("char");
    let mut db = Database::open(&path).unwrap();
    db.run("CREATE TABLE grades (id INTEGER PRIMARY KEY, grade CHAR);")
        .unwrap();
    db.run("INSERT INTO grades VALUES (1,'A'),(2,'B');").unwrap();
    let (_, rows) = db.run("SELECT id FROM grades WHERE grade = 'B'").unwrap();
    assert_eq!(rows, vec![vec![ColValue::Int(2)]]);
    std::fs::remove_file(&path).unwrap();
}
