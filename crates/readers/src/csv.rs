//! Lazy CSV reader: mandatory header, comma delimiter, RFC-4180 quoting,
//! sampling-based type inference, and full pushdown support. Malformed
//! rows degrade to null cells with a warning; they never abort a query.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Cursor};

use fsq_common::{FsqError, Result, Row, Schema, SimplePredicate, Value};
use tracing::warn;

use crate::fetch::ByteSource;
use crate::reader::{
    coerce_cell, infer_schema_from_string_samples, Reader, ReaderContext, RowPipeline, RowsIter,
};

pub struct CsvReader {
    source: String,
    records: RecordReader,
    schema: Option<Schema>,
    /// Raw records buffered during sampling, replayed before the stream.
    buffered: VecDeque<Vec<String>>,
    ctx: ReaderContext,
    filters: Vec<SimplePredicate>,
    required_columns: Option<Vec<String>>,
    row_cap: Option<usize>,
}

impl CsvReader {
    pub fn open(bytes: ByteSource, ctx: ReaderContext) -> Result<Self> {
        let source = bytes.display();
        let input: Box<dyn BufRead> = match &bytes {
            ByteSource::Local(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|e| FsqError::io(path.display().to_string(), e))?;
                Box::new(BufReader::new(file))
            }
            ByteSource::Remote(_) => Box::new(Cursor::new(bytes.fetch_all()?)),
        };
        ctx.metrics.record_file_opened();
        Ok(Self {
            source: source.clone(),
            records: RecordReader::new(input, source),
            schema: None,
            buffered: VecDeque::new(),
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
        let header = loop {
            match self.records.next_record()? {
                Some(rec) if rec.iter().all(|c| c.trim().is_empty()) => continue,
                Some(rec) => break rec,
                None => {
                    return Err(FsqError::Data(format!(
                        "{}: empty CSV source, header row is mandatory",
                        self.source
                    )))
                }
            }
        };
        let columns: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();

        let mut samples: Vec<Vec<Option<String>>> = Vec::new();
        while self.buffered.len() < self.ctx.sample_rows {
            match self.records.next_record()? {
                Some(rec) => {
                    samples.push(rec.iter().map(|c| Some(c.clone())).collect());
                    self.buffered.push_back(rec);
                }
                None => break,
            }
        }
        let schema = infer_schema_from_string_samples(&columns, &samples);
        self.schema = Some(schema.clone());
        Ok(schema)
    }
}

impl Reader for CsvReader {
    fn schema(&mut self) -> Result<Schema> {
        self.ensure_schema()
    }

    fn set_required_columns(&mut self, columns: &[String]) {
        self.required_columns = Some(columns.to_vec());
    }

    fn set_pushdown_filters(&mut self, filters: Vec<SimplePredicate>) -> Vec<SimplePredicate> {
        // Filters run post-parse, pre-emit; every simple predicate works.
        self.filters = filters.clone();
        filters
    }

    fn set_row_cap(&mut self, cap: usize) {
        self.row_cap = Some(cap);
    }

    fn rows(mut self: Box<Self>) -> Result<RowsIter> {
        let schema = self.ensure_schema()?;
        let decoded = CsvRows {
            source: self.source,
            records: self.records,
            buffered: self.buffered,
            schema,
            ctx: self.ctx.clone(),
            line: 1,
        };
        let pipeline = RowPipeline {
            filters: self.filters,
            required_columns: self.required_columns,
            row_cap: self.row_cap,
            metrics: self.ctx.metrics,
        };
        Ok(pipeline.apply(decoded))
    }
}

struct CsvRows {
    source: String,
    records: RecordReader,
    buffered: VecDeque<Vec<String>>,
    schema: Schema,
    ctx: ReaderContext,
    /// 1-based physical line of the last record's start (header = 1).
    line: usize,
}

impl CsvRows {
    fn decode(&mut self, record: Vec<String>) -> Row {
        self.line += 1;
        if record.len() != self.schema.len() {
            self.ctx.warnings.push(
                &self.source,
                format!(
                    "row {}: expected {} fields, got {}; missing cells set to null",
                    self.line,
                    self.schema.len(),
                    record.len()
                ),
            );
        }
        let mut row = Row::new();
        for (i, field) in self.schema.fields().iter().enumerate() {
            let cell = record.get(i).map(|s| s.as_str());
            let value = match coerce_cell(cell, field.data_type) {
                Ok(v) => v,
                Err(()) => {
                    let cell = cell.unwrap_or_default();
                    warn!(source = %self.source, line = self.line, column = %field.name, "cell not coercible, degraded to null");
                    self.ctx.warnings.push(
                        &self.source,
                        format!(
                            "row {}: '{}' is not a valid {} for column '{}'; set to null",
                            self.line, cell, field.data_type, field.name
                        ),
                    );
                    Value::Null
                }
            };
            row.push(field.name.clone(), value);
        }
        row
    }
}

impl Iterator for CsvRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(rec) = self.buffered.pop_front() {
            return Some(Ok(self.decode(rec)));
        }
        match self.records.next_record() {
            Ok(Some(rec)) => {
                if rec.iter().all(|c| c.trim().is_empty()) {
                    return self.next();
                }
                Some(Ok(self.decode(rec)))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Streaming RFC-4180 record reader: comma-delimited, double-quote
/// fields, doubled quotes escape, newlines allowed inside quotes.
struct RecordReader {
    input: Box<dyn BufRead>,
    source: String,
    done: bool,
}

impl RecordReader {
    fn new(input: Box<dyn BufRead>, source: String) -> Self {
        Self {
            input,
            source,
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let mut raw = String::new();
        loop {
            let n = self
                .input
                .read_line(&mut raw)
                .map_err(|e| FsqError::io(&self.source, e))?;
            if n == 0 {
                self.done = true;
                if raw.is_empty() {
                    return Ok(None);
                }
                break;
            }
            if !has_open_quote(&raw) {
                break;
            }
            // Unbalanced quote: the record continues on the next line.
        }
        while raw.ends_with('\n') || raw.ends_with('\r') {
            raw.pop();
        }
        Ok(Some(split_record(&raw)))
    }
}

fn has_open_quote(s: &str) -> bool {
    let mut open = false;
    for c in s.chars() {
        if c == '"' {
            open = !open;
        }
    }
    open
}

fn split_record(raw: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = raw.chars().peekable();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            '"' => field.push('"'),
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            // Carriage returns inside quoted fields are preserved.
            '\r' if !in_quotes && chars.peek().is_none() => {}
            other => field.push(other),
        }
    }
    fields.push(field);
    fields
}
