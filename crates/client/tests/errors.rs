//! Error taxonomy surfaced through the public API.

use fsq_client::{Engine, FsqError};
use tempfile::TempDir;

#[path = "support/mod.rs"]
mod support;

use support::write_file;

#[test]
fn syntax_errors_are_parse_errors_with_position() {
    let err = Engine::default()
        .execute("SELECT FROM WHERE", None)
        .unwrap_err();
    match err {
        FsqError::Parse { offset, snippet, .. } => {
            assert!(offset > 0);
            assert!(!snippet.is_empty());
        }
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn unknown_column_is_a_schema_error_before_any_row() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "t.csv", "a\n1\n");
    let sql = format!("SELECT missing FROM '{}'", path.display());
    let err = Engine::default().execute(&sql, None).unwrap_err();
    assert!(matches!(err, FsqError::Schema(_)), "{err}");
    assert!(err.to_string().contains("missing"));
}

#[test]
fn incomparable_predicate_is_a_schema_error_at_plan_time() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "t.csv", "name\nAlice\n");
    let sql = format!("SELECT name FROM '{}' WHERE name > 3", path.display());
    let err = Engine::default().execute(&sql, None).unwrap_err();
    assert!(matches!(err, FsqError::Schema(_)), "{err}");
}

#[test]
fn non_equi_join_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let a = write_file(&dir, "a.csv", "x\n1\n");
    let b = write_file(&dir, "b.csv", "y\n1\n");
    let sql = format!(
        "SELECT * FROM '{}' a JOIN '{}' b ON a.x > b.y",
        a.display(),
        b.display()
    );
    let err = Engine::default().execute(&sql, None).unwrap_err();
    assert!(matches!(err, FsqError::UnsupportedJoinCondition(_)), "{err}");
}

#[test]
fn unknown_fragment_format_fails_resolution() {
    let err = Engine::default()
        .execute("SELECT * FROM 'data.bin#avro'", None)
        .unwrap_err();
    assert!(matches!(err, FsqError::UnknownFormat(_)), "{err}");
}

#[test]
fn missing_file_is_an_io_error() {
    let err = Engine::default()
        .execute("SELECT * FROM '/no/such/file.csv'", None)
        .unwrap_err();
    assert!(matches!(err, FsqError::Io { .. }), "{err}");
}

#[test]
fn bare_source_without_default_fails_cleanly() {
    let err = Engine::default().execute("SELECT * FROM ghost", None).unwrap_err();
    // `ghost` resolves as a path with no extension; sniffing then fails
    // on the missing file.
    assert!(matches!(err, FsqError::Io { .. }), "{err}");
}
