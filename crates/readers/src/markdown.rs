//! Markdown pipe-table reader. Tables are a header row, a `|---|`
//! separator (alignment colons allowed), and data rows; `\|` escapes a
//! literal pipe inside a cell.

use fsq_common::{FsqError, Result};

use crate::fetch::ByteSource;
use crate::reader::ReaderContext;
use crate::table::{select_index, StringTableReader};

pub fn open(
    bytes: ByteSource,
    table_index: i64,
    ctx: ReaderContext,
) -> Result<StringTableReader> {
    let source = bytes.display();
    let text = String::from_utf8_lossy(&bytes.fetch_all()?).into_owned();
    let tables = extract_tables(&text);
    if tables.is_empty() {
        return Err(FsqError::Data(format!("{source}: no markdown table found")));
    }
    let table = &tables[select_index(&source, tables.len(), table_index)?];
    let columns: Vec<String> = table[0].clone();
    let records = table[1..]
        .iter()
        .map(|row| row.iter().map(|c| Some(c.clone())).collect())
        .collect();
    Ok(StringTableReader::new(source, columns, records, ctx))
}

fn extract_tables(text: &str) -> Vec<Vec<Vec<String>>> {
    let lines: Vec<&str> = text.lines().collect();
    let mut tables = Vec::new();
    let mut i = 0;
    while i + 1 < lines.len() {
        if is_table_row(lines[i]) && is_separator_row(lines[i + 1]) {
            let header = split_cells(lines[i]);
            let mut rows = vec![header];
            let mut j = i + 2;
            while j < lines.len() && is_table_row(lines[j]) && !is_separator_row(lines[j]) {
                rows.push(split_cells(lines[j]));
                j += 1;
            }
            tables.push(rows);
            i = j;
        } else {
            i += 1;
        }
    }
    tables
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.len() > 1
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Splits on unescaped pipes; `\|` stays a literal pipe in the cell.
fn split_cells(line: &str) -> Vec<String> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = t.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                cell.push('|');
            }
            '|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
            other => cell.push(other),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use fsq_common::{DataType, Row, Value};
    use tempfile::TempDir;

    const DOC: &str = "\
# Report

| name | score |
|------|------:|
| Alice | 9.5 |
| Bob \\| Jr | - |

Some prose.

| k |
|---|
| 1 |
";

    fn md_source(dir: &TempDir) -> ByteSource {
        let path = dir.path().join("doc.md");
        std::fs::write(&path, DOC).unwrap();
        ByteSource::Local(path)
    }

    #[test]
    fn parses_first_table_with_types_and_null_tokens() {
        let dir = TempDir::new().unwrap();
        let mut r = open(md_source(&dir), 0, ReaderContext::default()).unwrap();
        let s = r.schema().unwrap();
        assert_eq!(s.names(), vec!["name", "score"]);
        assert_eq!(s.data_type("score"), Some(DataType::Float));
        let rows: Vec<Row> = Box::new(r)
            .rows()
            .unwrap()
            .collect::<fsq_common::Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("name"), Some(&Value::Str("Bob | Jr".into())));
        assert_eq!(rows[1].get("score"), Some(&Value::Null));
    }

    #[test]
    fn second_table_by_index_and_from_the_end() {
        let dir = TempDir::new().unwrap();
        let mut r = open(md_source(&dir), 1, ReaderContext::default()).unwrap();
        assert_eq!(r.schema().unwrap().names(), vec!["k"]);
        let mut r = open(md_source(&dir), -2, ReaderContext::default()).unwrap();
        assert_eq!(r.schema().unwrap().names(), vec!["name", "score"]);
    }
}
