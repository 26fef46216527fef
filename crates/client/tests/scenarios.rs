//! End-to-end scenarios across source formats.

use fsq_client::{Engine, Value};
use tempfile::TempDir;

#[path = "support/mod.rs"]
mod support;

use support::{column, write_file, write_parquet_i64};

#[test]
fn csv_filter_project_order() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "e.csv", "id,name,age\n1,Alice,30\n2,Bob,20\n3,Cara,25\n");
    let sql = format!(
        "SELECT name FROM '{}' WHERE age >= 25 ORDER BY name",
        path.display()
    );
    let mut result = Engine::default().execute(&sql, None).unwrap();
    assert_eq!(result.schema().names(), vec!["name"]);
    let rows = result.to_list().unwrap();
    assert_eq!(
        column(&rows, "name"),
        vec![Value::Str("Alice".into()), Value::Str("Cara".into())]
    );
}

#[test]
fn group_by_average() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "s.csv", "k,v\nA,10\nA,30\nB,20\n");
    let sql = format!(
        "SELECT k, AVG(v) FROM '{}' GROUP BY k ORDER BY k",
        path.display()
    );
    let rows = Engine::default()
        .execute(&sql, None)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(
        column(&rows, "k"),
        vec![Value::Str("A".into()), Value::Str("B".into())]
    );
    assert_eq!(
        column(&rows, "AVG(v)"),
        vec![Value::Float(20.0), Value::Float(20.0)]
    );
}

#[test]
fn left_join_orders_and_pads() {
    let dir = TempDir::new().unwrap();
    let users = write_file(&dir, "u.csv", "id,name\n1,Alice\n2,Bob\n");
    let orders = write_file(&dir, "o.csv", "uid,amt\n1,100\n1,50\n3,999\n");
    let sql = format!(
        "SELECT u.name, o.amt FROM '{}' u LEFT JOIN '{}' o ON u.id = o.uid ORDER BY u.name, o.amt",
        users.display(),
        orders.display()
    );
    let rows = Engine::default()
        .execute(&sql, None)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(
        column(&rows, "name"),
        vec![
            Value::Str("Alice".into()),
            Value::Str("Alice".into()),
            Value::Str("Bob".into()),
        ]
    );
    assert_eq!(
        column(&rows, "amt"),
        vec![Value::Integer(50), Value::Integer(100), Value::Null]
    );
}

#[test]
fn partition_pruning_opens_only_matching_files() {
    let dir = TempDir::new().unwrap();
    let ds = dir.path().join("ds");
    write_parquet_i64(
        &ds.join("year=2023/part.parquet"),
        &[("v", (0..100).collect())],
        1024,
    );
    write_parquet_i64(
        &ds.join("year=2024/part.parquet"),
        &[("v", (0..50).collect())],
        1024,
    );
    let sql = format!("SELECT COUNT(*) FROM '{}' WHERE year = 2024", ds.display());
    let mut result = Engine::default().execute(&sql, None).unwrap();
    let rows = result.to_list().unwrap();
    assert_eq!(column(&rows, "COUNT(*)"), vec![Value::Integer(50)]);
    // The 2023 file is skipped before it is ever opened.
    assert_eq!(result.scan_metrics().files_pruned(), 1);
    assert_eq!(result.scan_metrics().files_opened(), 1);
}

#[test]
fn limit_pushdown_caps_reader_rows() {
    let dir = TempDir::new().unwrap();
    let mut big = String::from("v\n");
    for i in 0..10_000 {
        big.push_str(&format!("{i}\n"));
    }
    let path = write_file(&dir, "big.csv", &big);
    let sql = format!("SELECT * FROM '{}' LIMIT 3", path.display());
    let mut result = Engine::default().execute(&sql, None).unwrap();
    let rows = result.to_list().unwrap();
    assert_eq!(rows.len(), 3);
    // The reader itself stopped after three rows.
    assert_eq!(result.scan_metrics().rows_read(), 3);
}

#[test]
fn json_nested_path_via_default_source() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "api.json", r#"{"data":{"users":[{"n":"A"},{"n":"B"}]}}"#);
    let locator = format!("{}#json:data.users", path.display());
    let rows = Engine::default()
        .execute("SELECT n FROM t", Some(&locator))
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(
        column(&rows, "n"),
        vec![Value::Str("A".into()), Value::Str("B".into())]
    );
}

#[test]
fn row_group_pruning_skips_cold_groups() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stats.parquet");
    // Four row groups of 25 rows each: v spans [0,24], [25,49], ...
    write_parquet_i64(&path, &[("v", (0..100).collect())], 25);
    let sql = format!("SELECT v FROM '{}' WHERE v >= 75", path.display());
    let mut result = Engine::default().execute(&sql, None).unwrap();
    let rows = result.to_list().unwrap();
    assert_eq!(rows.len(), 25);
    assert_eq!(result.scan_metrics().row_groups_pruned(), 3);
}

#[test]
fn inline_cross_join_comma_form() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a.csv", "x\n1\n2\n");
    let b = write_file(&dir, "b.csv", "y\n10\n20\n30\n");
    let sql = format!("SELECT x, y FROM '{}', '{}'", a.display(), b.display());
    let rows = Engine::default()
        .execute(&sql, None)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(rows.len(), 6);
}

#[test]
fn aggregate_expression_over_computed_column() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "m.csv", "v\n1\n2\n3\n");
    let sql = format!(
        "SELECT SUM(v) + COUNT(*) AS total FROM '{}'",
        path.display()
    );
    let rows = Engine::default()
        .execute(&sql, None)
        .unwrap()
        .to_list()
        .unwrap();
    assert_eq!(column(&rows, "total"), vec![Value::Integer(9)]);
}
