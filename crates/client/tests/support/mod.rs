//! Shared fixtures for the integration suites.
#![allow(dead_code)] // each test binary uses a subset

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType as ArrowType, Field as ArrowField, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use fsq_common::{Row, Value};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tempfile::TempDir;

pub fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Writes an all-int64 parquet file with a bounded row-group size.
pub fn write_parquet_i64(path: &Path, columns: &[(&str, Vec<i64>)], row_group_size: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let fields: Vec<ArrowField> = columns
        .iter()
        .map(|(n, _)| ArrowField::new(*n, ArrowType::Int64, false))
        .collect();
    let schema = Arc::new(ArrowSchema::new(fields));
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, v)| Arc::new(Int64Array::from(v.clone())) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
    let props = WriterProperties::builder()
        .set_max_row_group_size(row_group_size)
        .build();
    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// One column's values across a result set.
pub fn column(rows: &[Row], name: &str) -> Vec<Value> {
    rows.iter()
        .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Order-insensitive comparison key for a row.
pub fn row_key(row: &Row) -> String {
    row.iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("\u{1}")
}

pub fn sorted_keys(rows: &[Row]) -> Vec<String> {
    let mut keys: Vec<String> = rows.iter().map(row_key).collect();
    keys.sort();
    keys
}
