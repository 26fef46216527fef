//! Shared in-memory table reader for the document formats (HTML,
//! Markdown, XML): raw string cells in, sampled inference, typed rows
//! out.

use fsq_common::{FsqError, Result, Row, Schema, SimplePredicate, Value};

use crate::reader::{
    coerce_cell, infer_schema_from_string_samples, Reader, ReaderContext, RowPipeline, RowsIter,
};

pub struct StringTableReader {
    source: String,
    columns: Vec<String>,
    records: Vec<Vec<Option<String>>>,
    schema: Option<Schema>,
    ctx: ReaderContext,
    filters: Vec<SimplePredicate>,
    required_columns: Option<Vec<String>>,
    row_cap: Option<usize>,
}

impl StringTableReader {
    pub fn new(
        source: String,
        columns: Vec<String>,
        records: Vec<Vec<Option<String>>>,
        ctx: ReaderContext,
    ) -> Self {
        ctx.metrics.record_file_opened();
        Self {
            source,
            columns,
            records,
            schema: None,
            ctx,
            filters: Vec::new(),
            required_columns: None,
            row_cap: None,
        }
    }

    fn ensure_schema(&mut self) -> Result<Schema> {
        if let Some(s) = &self.schema {
            return Ok(s.clone());
        }
        let sample = &self.records[..self.records.len().min(self.ctx.sample_rows)];
        let schema = infer_schema_from_string_samples(&self.columns, sample);
        self.schema = Some(schema.clone());
        Ok(schema)
    }
}

impl Reader for StringTableReader {
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
        let source = self.source.clone();
        let warnings = self.ctx.warnings.clone();
        let rows = self.records.into_iter().enumerate().map(move |(i, rec)| {
            let mut row = Row::new();
            for (c, field) in schema.fields().iter().enumerate() {
                let cell = rec.get(c).and_then(|v| v.as_deref());
                let value = match coerce_cell(cell, field.data_type) {
                    Ok(v) => v,
                    Err(()) => {
                        warnings.push(
                            &source,
                            format!(
                                "row {}: '{}' is not a valid {} for column '{}'; set to null",
                                i + 1,
                                cell.unwrap_or_default(),
                                field.data_type,
                                field.name
                            ),
                        );
                        Value::Null
                    }
                };
                row.push(field.name.clone(), value);
            }
            Ok(row)
        });
        let pipeline = RowPipeline {
            filters: self.filters,
            required_columns: self.required_columns,
            row_cap: self.row_cap,
            metrics: self.ctx.metrics,
        };
        Ok(pipeline.apply(rows))
    }
}

/// Resolves a possibly-negative table/element index against `len`.
pub fn select_index(source: &str, len: usize, idx: i64) -> Result<usize> {
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    if resolved < 0 || resolved as usize >= len {
        return Err(FsqError::Data(format!(
            "{source}: table index {idx} out of range ({len} available)"
        )));
    }
    Ok(resolved as usize)
}
