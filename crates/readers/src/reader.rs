//! The common reader contract and the shared row post-processing
//! pipeline every format reader funnels through.

use fsq_common::{
    all_match, coerce_string, infer_common_type, DataType, Field, Result, Row, ScanMetrics,
    Schema, SimplePredicate, Value, Warnings,
};

/// Lazy, finite, non-restartable row stream.
pub type RowsIter = Box<dyn Iterator<Item = Result<Row>>>;

/// Contract every format reader implements.
///
/// Pushdown setters are declarative: the reader honors what it can.
/// `set_pushdown_filters` returns the subset the reader accepted and
/// will enforce on every emitted row; the scan operator re-applies the
/// rest. `rows` consumes the reader; readers tolerate being dropped
/// before their stream is exhausted.
pub trait Reader {
    /// Inferred or declared schema; sampled on first call, cached after.
    fn schema(&mut self) -> Result<Schema>;

    /// Columns the reader should emit. Readers may include extras; the
    /// scan tolerates them.
    fn set_required_columns(&mut self, columns: &[String]);

    /// Offers filters for reader-side enforcement; returns those accepted.
    fn set_pushdown_filters(&mut self, filters: Vec<SimplePredicate>) -> Vec<SimplePredicate>;

    /// Caps emitted rows.
    fn set_row_cap(&mut self, cap: usize);

    /// Filters over partition columns, evaluated before opening files.
    fn set_partition_filters(&mut self, _filters: Vec<SimplePredicate>) {}

    /// Virtual partition columns, if the source is partitioned.
    fn partition_columns(&self) -> Vec<String> {
        Vec::new()
    }

    /// Consumes the reader into its row stream.
    fn rows(self: Box<Self>) -> Result<RowsIter>;
}

/// Shared context handed to readers at open time.
#[derive(Debug, Clone)]
pub struct ReaderContext {
    /// Rows sampled for schema inference in string-based readers.
    pub sample_rows: usize,
    /// Recoverable-warning sink.
    pub warnings: Warnings,
    /// Reader-side counters.
    pub metrics: ScanMetrics,
}

impl Default for ReaderContext {
    fn default() -> Self {
        Self {
            sample_rows: 100,
            warnings: Warnings::new(),
            metrics: ScanMetrics::new(),
        }
    }
}

/// Infers a schema from raw string cells: per column, fold the inferred
/// types of non-null samples through the promotion lattice.
pub fn infer_schema_from_string_samples(
    columns: &[String],
    samples: &[Vec<Option<String>>],
) -> Schema {
    let fields = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let ty = infer_common_type(samples.iter().filter_map(|row| {
                row.get(i)
                    .and_then(|c| c.as_deref())
                    .map(fsq_common::infer_type_from_string)
            }));
            Field::new(name.clone(), ty)
        })
        .collect();
    Schema::new(fields)
}

/// Coerces one raw string cell against its declared type; `None` cells
/// and coercion failures become NULL (the caller warns on failures).
pub fn coerce_cell(cell: Option<&str>, declared: DataType) -> std::result::Result<Value, ()> {
    match cell {
        None => Ok(Value::Null),
        Some(s) => coerce_string(s, declared).ok_or(()),
    }
}

/// Widens an already-typed value to its column's declared type.
///
/// Used by readers whose decoder produces typed values (JSON, Parquet)
/// when sampling promoted the column past the value's own type.
pub fn conform_value(v: Value, declared: DataType) -> Value {
    if v.is_null() || v.data_type() == declared {
        return v;
    }
    match (declared, &v) {
        (DataType::Float, Value::Integer(i)) => Value::Float(*i as f64),
        (DataType::Decimal, Value::Integer(i)) => Value::Decimal((*i).into()),
        (DataType::Decimal, Value::Float(f)) => {
            match rust_decimal::Decimal::try_from(*f) {
                Ok(d) => Value::Decimal(d),
                Err(_) => Value::Str(v.canonical()),
            }
        }
        (DataType::DateTime, Value::Date(d)) => Value::DateTime(d.and_time(chrono::NaiveTime::MIN)),
        (DataType::String, _) => Value::Str(v.canonical()),
        (DataType::Json, _) => v,
        _ => v,
    }
}

/// The post-decode stages shared by every reader: enforce accepted
/// filters, prune to required columns, cap emitted rows, count metrics.
pub struct RowPipeline {
    pub filters: Vec<SimplePredicate>,
    pub required_columns: Option<Vec<String>>,
    pub row_cap: Option<usize>,
    pub metrics: ScanMetrics,
}

impl RowPipeline {
    /// Wraps a decoded-row iterator with the pushdown stages.
    pub fn apply(self, rows: impl Iterator<Item = Result<Row>> + 'static) -> RowsIter {
        let RowPipeline {
            filters,
            required_columns,
            row_cap,
            metrics,
        } = self;
        let mut emitted = 0usize;
        let iter = rows
            .filter_map(move |row| match row {
                Err(e) => Some(Err(e)),
                Ok(row) => match all_match(&filters, &row) {
                    // Reader-accepted filters never surface eval errors:
                    // comparability was checked at plan time.
                    Ok(true) => Some(Ok(row)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                },
            })
            .map(move |row| {
                row.map(|r| match &required_columns {
                    None => r,
                    Some(cols) => cols
                        .iter()
                        .map(|c| {
                            let v = r.get(c).cloned().unwrap_or(Value::Null);
                            (c.clone(), v)
                        })
                        .collect(),
                })
            })
            .take_while(move |row| {
                if row.is_err() {
                    return true;
                }
                match row_cap {
                    Some(cap) => {
                        let within = emitted < cap;
                        emitted += 1;
                        within
                    }
                    None => true,
                }
            })
            .inspect(move |row| {
                if row.is_ok() {
                    metrics.record_row();
                }
            });
        Box::new(iter)
    }
}
