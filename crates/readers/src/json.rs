//! JSON and JSONL readers.
//!
//! JSON loads the whole document and navigates an optional path selector
//! (dotted keys, `[i]` index, one `[]` flatten) to an array of objects.
//! JSONL parses line-delimited records lazily; malformed lines warn and
//! are skipped.

use std::io::{BufRead, BufReader, Cursor};

use fsq_common::{
    infer_common_type, Field, FsqError, Result, Row, Schema, SimplePredicate, Value,
};
use serde_json::Value as Json;

use crate::fetch::ByteSource;
use crate::reader::{conform_value, Reader, ReaderContext, RowPipeline, RowsIter};

/// Converts one JSON scalar/nested value into a typed [`Value`].
/// Nested objects and arrays stay as `json`-typed values.
fn json_to_value(v: &Json) -> Value {
    match v {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::Str(s.clone()),
        nested => Value::Json(nested.clone()),
    }
}

fn object_to_row(obj: &serde_json::Map<String, Json>, schema: &Schema) -> Row {
    schema
        .fields()
        .iter()
        .map(|f| {
            let v = obj.get(&f.name).map(json_to_value).unwrap_or(Value::Null);
            (f.name.clone(), conform_value(v, f.data_type))
        })
        .collect()
}

fn infer_object_schema(sample: &[&serde_json::Map<String, Json>]) -> Schema {
    let mut columns: Vec<String> = Vec::new();
    for obj in sample {
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    let fields = columns
        .into_iter()
        .map(|name| {
            let ty = infer_common_type(
                sample
                    .iter()
                    .filter_map(|o| o.get(&name))
                    .map(|v| json_to_value(v).data_type()),
            );
            Field::new(name, ty)
        })
        .collect();
    Schema::new(fields)
}

// -----------------------------
// JSON document reader
// -----------------------------

pub struct JsonReader {
    source: String,
    records: Vec<Json>,
    schema: Option<Schema>,
    ctx: ReaderContext,
    filters: Vec<SimplePredicate>,
    required_columns: Option<Vec<String>>,
    row_cap: Option<usize>,
}

impl JsonReader {
    pub fn open(bytes: ByteSource, selector: Option<&str>, ctx: ReaderContext) -> Result<Self> {
        let source = bytes.display();
        ctx.metrics.record_file_opened();
        let doc: Json = serde_json::from_slice(&bytes.fetch_all()?)
            .map_err(|e| FsqError::Data(format!("{source}: invalid JSON: {e}")))?;
        let records = match selector {
            Some(path) => navigate_path(&doc, path)
                .map_err(|e| FsqError::Data(format!("{source}: {e}")))?,
            None => auto_detect_records(&doc)
                .ok_or_else(|| {
                    FsqError::Data(format!(
                        "{source}: could not locate an array of objects; use a #json:path selector"
                    ))
                })?,
        };
        if let Some(bad) = records.iter().find(|r| !r.is_object()) {
            return Err(FsqError::Data(format!(
                "{source}: selected records must be objects, found {bad}"
            )));
        }
        Ok(Self {
            source,
            records,
            schema: None,
            ctx,
            filters: Vec::new(),
            required_columns: None,
            row_cap: None,
        })
    }

    fn ensure_schema(&mut self) -> Result<Schema> {
        if let Some(s) = &self.schema {
            return Ok(s.clone());
        }
        let sample: Vec<&serde_json::Map<String, Json>> = self
            .records
            .iter()
            .take(self.ctx.sample_rows)
            .filter_map(|r| r.as_object())
            .collect();
        let schema = infer_object_schema(&sample);
        self.schema = Some(schema.clone());
        Ok(schema)
    }
}

impl Reader for JsonReader {
    fn schema(&mut self) -> Result<Schema> {
        self.ensure_schema()
    }

    fn set_required_columns(&mut self, columns: &[String]) {
        self.required_columns = Some(columns.to_vec());
    }

    fn set_pushdown_filters(&mut self, filters: Vec<SimplePredicate>) -> Vec<SimplePredicate> {
        self.filters = filters.clone();
        filters
    }

    fn set_row_cap(&mut self, cap: usize) {
        self.row_cap = Some(cap);
    }

    fn rows(mut self: Box<Self>) -> Result<RowsIter> {
        let schema = self.ensure_schema()?;
        let rows = self
            .records
            .into_iter()
            .filter_map(move |r| r.as_object().map(|o| Ok(object_to_row(o, &schema))));
        let pipeline = RowPipeline {
            filters: self.filters,
            required_columns: self.required_columns,
            row_cap: self.row_cap,
            metrics: self.ctx.metrics,
        };
        Ok(pipeline.apply(rows))
    }
}

/// Walks a dotted path with optional `[i]` indices and at most one `[]`
/// flatten, landing on an array (of objects) or a single object.
fn navigate_path(doc: &Json, path: &str) -> std::result::Result<Vec<Json>, String> {
    if path.matches("[]").count() > 1 {
        return Err(format!("path '{path}' may contain at most one []"));
    }
    let mut current: Vec<&Json> = vec![doc];
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(format!("path '{path}' has an empty segment"));
        }
        let (key, brackets) = match segment.find('[') {
            Some(i) => (&segment[..i], &segment[i..]),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current
                .into_iter()
                .map(|v| {
                    v.get(key)
                        .ok_or_else(|| format!("key '{key}' not found in path '{path}'"))
                })
                .collect::<std::result::Result<_, _>>()?;
        }
        let mut rest = brackets;
        while let Some(close) = rest.find(']') {
            let inner = &rest[1..close];
            if inner.is_empty() {
                // Flatten: each element continues down the path.
                current = current
                    .into_iter()
                    .map(|v| {
                        v.as_array()
                            .map(|a| a.iter().collect::<Vec<_>>())
                            .ok_or_else(|| format!("'[]' applied to non-array in path '{path}'"))
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?
                    .into_iter()
                    .flatten()
                    .collect();
            } else {
                let idx: i64 = inner
                    .parse()
                    .map_err(|_| format!("bad array index '{inner}' in path '{path}'"))?;
                current = current
                    .into_iter()
                    .map(|v| {
                        let arr = v
                            .as_array()
                            .ok_or_else(|| format!("index applied to non-array in path '{path}'"))?;
                        let i = if idx < 0 { arr.len() as i64 + idx } else { idx };
                        arr.get(i as usize)
                            .ok_or_else(|| format!("index {idx} out of bounds in path '{path}'"))
                    })
                    .collect::<std::result::Result<_, _>>()?;
            }
            rest = &rest[close + 1..];
        }
    }
    // The target must be an array of objects (or a lone object).
    if current.len() == 1 {
        match current[0] {
            Json::Array(items) => return Ok(items.clone()),
            obj @ Json::Object(_) => return Ok(vec![obj.clone()]),
            other => return Err(format!("path '{path}' resolved to {other}, not an array")),
        }
    }
    Ok(current.into_iter().cloned().collect())
}

/// Root array of objects, else a single object with exactly one
/// array-of-objects member.
fn auto_detect_records(doc: &Json) -> Option<Vec<Json>> {
    match doc {
        Json::Array(items) if items.iter().all(|i| i.is_object()) => Some(items.clone()),
        Json::Object(map) => {
            let mut arrays = map.values().filter(|v| {
                v.as_array()
                    .map(|a| !a.is_empty() && a.iter().all(|i| i.is_object()))
                    .unwrap_or(false)
            });
            let first = arrays.next()?;
            if arrays.next().is_some() {
                return None;
            }
            first.as_array().map(|a| a.to_vec())
        }
        _ => None,
    }
}

// -----------------------------
// JSONL reader
// -----------------------------

pub struct JsonlReader {
    source: String,
    lines: Box<dyn BufRead>,
    /// Parsed records buffered during sampling.
    buffered: Vec<Json>,
    schema: Option<Schema>,
    ctx: ReaderContext,
    filters: Vec<SimplePredicate>,
    required_columns: Option<Vec<String>>,
    row_cap: Option<usize>,
}

impl JsonlReader {
    pub fn open(bytes: ByteSource, ctx: ReaderContext) -> Result<Self> {
        let source = bytes.display();
        let lines: Box<dyn BufRead> = match &bytes {
            ByteSource::Local(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|e| FsqError::io(path.display().to_string(), e))?;
                Box::new(BufReader::new(file))
            }
            ByteSource::Remote(_) => Box::new(Cursor::new(bytes.fetch_all()?)),
        };
        ctx.metrics.record_file_opened();
        Ok(Self {
            source,
            lines,
            buffered: Vec::new(),
            schema: None,
            ctx,
            filters: Vec::new(),
            required_columns: None,
            row_cap: None,
        })
    }

    fn next_json(&mut self) -> Result<Option<Json>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .lines
                .read_line(&mut line)
                .map_err(|e| FsqError::io(&self.source, e))?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Json>(trimmed) {
                Ok(Json::Object(o)) => return Ok(Some(Json::Object(o))),
                Ok(other) => {
                    self.ctx.warnings.push(
                        &self.source,
                        format!("skipped non-object line: {other}"),
                    );
                }
                Err(e) => {
                    self.ctx
                        .warnings
                        .push(&self.source, format!("skipped malformed line: {e}"));
                }
            }
        }
    }

    fn ensure_schema(&mut self) -> Result<Schema> {
        if let Some(s) = &self.schema {
            return Ok(s.clone());
        }
        while self.buffered.len() < self.ctx.sample_rows {
            match self.next_json()? {
                Some(j) => self.buffered.push(j),
                None => break,
            }
        }
        let sample: Vec<&serde_json::Map<String, Json>> =
            self.buffered.iter().filter_map(|j| j.as_object()).collect();
        let schema = infer_object_schema(&sample);
        self.schema = Some(schema.clone());
        Ok(schema)
    }
}

impl Reader for JsonlReader {
    fn schema(&mut self) -> Result<Schema> {
        self.ensure_schema()
    }

    fn set_required_columns(&mut self, columns: &[String]) {
        self.required_columns = Some(columns.to_vec());
    }

    fn set_pushdown_filters(&mut self, filters: Vec<SimplePredicate>) -> Vec<SimplePredicate> {
        self.filters = filters.clone();
        filters
    }

    fn set_row_cap(&mut self, cap: usize) {
        self.row_cap = Some(cap);
    }

    fn rows(mut self: Box<Self>) -> Result<RowsIter> {
        let schema = self.ensure_schema()?;
        let rows = JsonlRows {
            reader: *self,
            schema,
            replay: 0,
        };
        let pipeline = RowPipeline {
            filters: rows.reader.filters.clone(),
            required_columns: rows.reader.required_columns.clone(),
            row_cap: rows.reader.row_cap,
            metrics: rows.reader.ctx.metrics.clone(),
        };
        Ok(pipeline.apply(rows))
    }
}

struct JsonlRows {
    reader: JsonlReader,
    schema: Schema,
    replay: usize,
}

impl Iterator for JsonlRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.replay < self.reader.buffered.len() {
            let json = &self.reader.buffered[self.replay];
            self.replay += 1;
            let obj = json.as_object()?;
            return Some(Ok(object_to_row(obj, &self.schema)));
        }
        match self.reader.next_json() {
            Ok(Some(json)) => {
                let obj = json.as_object()?;
                Some(Ok(object_to_row(obj, &self.schema)))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsq_common::DataType;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn nested_path_selects_records() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "api.json",
            r#"{"data":{"users":[{"n":"A"},{"n":"B"}]}}"#,
        );
        let mut r = JsonReader::open(
            ByteSource::Local(path),
            Some("data.users"),
            ReaderContext::default(),
        )
        .unwrap();
        assert_eq!(r.schema().unwrap().names(), vec!["n"]);
        let rows: Vec<Row> = Box::new(r).rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("n"), Some(&Value::Str("A".into())));
    }

    #[test]
    fn index_selector_and_single_flatten_rule() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "batches.json",
            r#"{"batches":[{"items":[{"v":1}]},{"items":[{"v":2},{"v":3}]}]}"#,
        );
        // Only one [] is allowed.
        let r = JsonReader::open(
            ByteSource::Local(path.clone()),
            Some("batches[].items[]"),
            ReaderContext::default(),
        );
        assert!(r.is_err());

        let mut r = JsonReader::open(
            ByteSource::Local(path),
            Some("batches[1].items"),
            ReaderContext::default(),
        )
        .unwrap();
        r.schema().unwrap();
        let rows: Vec<Row> = Box::new(r).rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("v"), Some(&Value::Integer(2)));
    }

    #[test]
    fn flatten_merges_all_elements() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "b.json",
            r#"{"batches":[{"items":[{"v":1}]},{"items":[{"v":2},{"v":3}]}]}"#,
        );
        let mut r = JsonReader::open(
            ByteSource::Local(path),
            Some("batches[].items[0]"),
            ReaderContext::default(),
        )
        .unwrap();
        r.schema().unwrap();
        let rows: Vec<Row> = Box::new(r).rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("v"), Some(&Value::Integer(1)));
        assert_eq!(rows[1].get("v"), Some(&Value::Integer(2)));
    }

    #[test]
    fn auto_detection_prefers_single_array_member() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "wrapped.json",
            r#"{"meta":{"count":2},"records":[{"a":1},{"a":2}]}"#,
        );
        let mut r =
            JsonReader::open(ByteSource::Local(path), None, ReaderContext::default()).unwrap();
        assert_eq!(r.schema().unwrap().names(), vec!["a"]);
    }

    #[test]
    fn nested_objects_become_json_typed() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "n.json",
            r#"[{"id":1,"address":{"city":"X"}},{"id":2,"address":{"city":"Y"}}]"#,
        );
        let mut r =
            JsonReader::open(ByteSource::Local(path), None, ReaderContext::default()).unwrap();
        let schema = r.schema().unwrap();
        assert_eq!(schema.data_type("address"), Some(DataType::Json));
    }

    #[test]
    fn jsonl_skips_malformed_lines_with_warning() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "data.jsonl",
            "{\"a\":1}\nnot json\n{\"a\":2}\n",
        );
        let ctx = ReaderContext::default();
        let warnings = ctx.warnings.clone();
        let mut r = JsonlReader::open(ByteSource::Local(path), ctx).unwrap();
        r.schema().unwrap();
        let rows: Vec<Row> = Box::new(r).rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(warnings.len(), 1);
    }
}
