//! Parquet reader: schema from footer metadata, Hive-style partition
//! discovery and pruning, row-group skipping from min/max statistics,
//! column-projected decoding, and ranged remote reads through the byte
//! source.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use chrono::{NaiveDate, NaiveTime};
use fsq_common::{
    infer_value_from_string, DataType, Field, FsqError, Result, Row, Schema, SimplePredicate,
    Value,
};
use parquet::basic::{ConvertedType, LogicalType, Type as PhysicalType};
use parquet::file::reader::{ChunkReader, FileReader, Length, SerializedFileReader};
use parquet::file::statistics::Statistics;
use parquet::record::Field as ParquetField;
use parquet::schema::types::{Type as SchemaType, TypePtr};
use tracing::debug;

use crate::fetch::ByteSource;
use crate::locator::Scheme;
use crate::reader::{conform_value, Reader, ReaderContext, RowPipeline, RowsIter};

/// One data file of the dataset plus its partition descriptor.
struct PartFile {
    chunk: ByteSourceChunk,
    display: String,
    partition: Vec<(String, Value)>,
}

pub struct ParquetReader {
    source: String,
    parts: Vec<PartFile>,
    partition_fields: Vec<Field>,
    file_schema: Option<Schema>,
    ctx: ReaderContext,
    filters: Vec<SimplePredicate>,
    partition_filters: Vec<SimplePredicate>,
    required_columns: Option<Vec<String>>,
    row_cap: Option<usize>,
}

impl ParquetReader {
    /// Opens a single file/object, or a local directory holding a
    /// Hive-partitioned dataset (`.../key=value/.../file.parquet`).
    pub fn open(scheme: Scheme, path: &str, bytes: ByteSource, ctx: ReaderContext) -> Result<Self> {
        let mut parts = Vec::new();
        let mut partition_fields: Vec<Field> = Vec::new();

        let local_dir = matches!(scheme, Scheme::File) && Path::new(path).is_dir();
        if local_dir {
            let mut files = Vec::new();
            collect_parquet_files(Path::new(path), &mut files)?;
            if files.is_empty() {
                return Err(FsqError::Data(format!(
                    "{path}: no parquet files under dataset directory"
                )));
            }
            files.sort();
            for file in files {
                let raw = partition_pairs(Path::new(path), &file);
                let mut partition = Vec::with_capacity(raw.len());
                for (key, text) in raw {
                    let value = infer_value_from_string(&text);
                    if !partition_fields.iter().any(|f| f.name == key) {
                        partition_fields.push(Field::new(key.clone(), value.data_type()));
                    }
                    partition.push((key, value));
                }
                parts.push(PartFile {
                    display: file.display().to_string(),
                    chunk: ByteSourceChunk::open(ByteSource::Local(file))?,
                    partition,
                });
            }
        } else {
            parts.push(PartFile {
                display: bytes.display(),
                chunk: ByteSourceChunk::open(bytes)?,
                partition: Vec::new(),
            });
        }

        Ok(Self {
            source: path.to_string(),
            parts,
            partition_fields,
            file_schema: None,
            ctx,
            filters: Vec::new(),
            partition_filters: Vec::new(),
            required_columns: None,
            row_cap: None,
        })
    }

    fn ensure_file_schema(&mut self) -> Result<Schema> {
        if let Some(s) = &self.file_schema {
            return Ok(s.clone());
        }
        let part = self.parts.first().ok_or_else(|| {
            FsqError::Data(format!("{}: dataset has no files", self.source))
        })?;
        let reader = SerializedFileReader::new(part.chunk.clone())
            .map_err(|e| FsqError::io(&part.display, e))?;
        let descr = reader.metadata().file_metadata().schema_descr_ptr();
        let mut fields = Vec::with_capacity(descr.num_columns());
        for col in descr.columns() {
            fields.push(Field::new(
                col.name().to_string(),
                map_parquet_type(
                    col.physical_type(),
                    col.logical_type(),
                    col.converted_type(),
                ),
            ));
        }
        let schema = Schema::new(fields);
        self.file_schema = Some(schema.clone());
        Ok(schema)
    }
}

impl Reader for ParquetReader {
    fn schema(&mut self) -> Result<Schema> {
        let mut schema = self.ensure_file_schema()?;
        for f in &self.partition_fields {
            schema.push(f.clone());
        }
        Ok(schema)
    }

    fn set_required_columns(&mut self, columns: &[String]) {
        self.required_columns = Some(columns.to_vec());
    }

    fn set_pushdown_filters(&mut self, filters: Vec<SimplePredicate>) -> Vec<SimplePredicate> {
        // Enforced row-level after decode; also drives row-group pruning.
        self.filters = filters.clone();
        filters
    }

    fn set_row_cap(&mut self, cap: usize) {
        self.row_cap = Some(cap);
    }

    fn set_partition_filters(&mut self, filters: Vec<SimplePredicate>) {
        self.partition_filters = filters;
    }

    fn partition_columns(&self) -> Vec<String> {
        self.partition_fields.iter().map(|f| f.name.clone()).collect()
    }

    fn rows(mut self: Box<Self>) -> Result<RowsIter> {
        let file_schema = self.ensure_file_schema()?;

        // Partition pruning happens before any data file is opened.
        let before = self.parts.len();
        let partition_filters = std::mem::take(&mut self.partition_filters);
        self.parts.retain(|part| {
            partition_filters.iter().all(|p| {
                part.partition
                    .iter()
                    .find(|(k, _)| *k == p.column)
                    .map(|(_, v)| p.eval(v).unwrap_or(true))
                    .unwrap_or(true)
            })
        });
        let pruned = (before - self.parts.len()) as u64;
        if pruned > 0 {
            debug!(source = %self.source, pruned, "partition pruning skipped files");
            self.ctx.metrics.record_files_pruned(pruned);
        }

        // Projection: required file columns, scan-schema order. Partition
        // columns are virtual and never decoded.
        let projected: Vec<String> = match &self.required_columns {
            Some(cols) => cols
                .iter()
                .filter(|c| file_schema.contains(c))
                .cloned()
                .collect(),
            None => file_schema.names().iter().map(|s| s.to_string()).collect(),
        };
        // Always decode at least one column to keep row counts observable.
        let projected = if projected.is_empty() {
            file_schema.names().first().map(|s| s.to_string()).into_iter().collect()
        } else {
            projected
        };

        let decoded = ParquetRows {
            parts: self.parts.into_iter().collect(),
            current: None,
            buffer: VecDeque::new(),
            projected,
            file_schema,
            filters: self.filters.clone(),
            ctx: self.ctx.clone(),
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

struct OpenPart {
    reader: SerializedFileReader<ByteSourceChunk>,
    display: String,
    partition: Vec<(String, Value)>,
    next_row_group: usize,
}

struct ParquetRows {
    parts: VecDeque<PartFile>,
    current: Option<OpenPart>,
    buffer: VecDeque<Row>,
    projected: Vec<String>,
    file_schema: Schema,
    filters: Vec<SimplePredicate>,
    ctx: ReaderContext,
}

impl ParquetRows {
    fn projection_type(&self, root: &SchemaType) -> Option<SchemaType> {
        let fields: Vec<TypePtr> = root
            .get_fields()
            .iter()
            .filter(|f| self.projected.iter().any(|p| p == f.name()))
            .cloned()
            .collect();
        if fields.len() == root.get_fields().len() {
            return None;
        }
        SchemaType::group_type_builder("schema")
            .with_fields(fields)
            .build()
            .ok()
    }

    /// Coarse skip: a row group whose statistics cannot contain a
    /// matching row, or whose matched column is entirely null, is never
    /// decoded.
    fn row_group_may_match(&self, part: &OpenPart, rg: usize) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let meta = part.reader.metadata().row_group(rg);
        for filter in &self.filters {
            let Some(idx) = self.file_schema.index_of(&filter.column) else {
                continue;
            };
            let col = meta.column(idx);
            let Some(stats) = col.statistics() else {
                continue;
            };
            if stats.null_count_opt() == Some(meta.num_rows() as u64) {
                // Compare predicates never match null.
                return false;
            }
            let declared = self
                .file_schema
                .data_type(&filter.column)
                .unwrap_or(DataType::Null);
            if let Some((min, max)) = stats_min_max(stats, declared) {
                if !filter.may_match_range(&min, &max) {
                    return false;
                }
            }
        }
        true
    }

    fn decode_next_row_group(&mut self) -> Result<bool> {
        loop {
            if self.current.is_none() {
                let Some(file) = self.parts.pop_front() else {
                    return Ok(false);
                };
                self.ctx.metrics.record_file_opened();
                let reader = SerializedFileReader::new(file.chunk.clone())
                    .map_err(|e| FsqError::io(&file.display, e))?;
                self.current = Some(OpenPart {
                    reader,
                    display: file.display,
                    partition: file.partition,
                    next_row_group: 0,
                });
            }

            let rg = {
                let part = self.current.as_mut().expect("part opened above");
                let total = part.reader.metadata().num_row_groups();
                if part.next_row_group >= total {
                    self.current = None;
                    continue;
                }
                let rg = part.next_row_group;
                part.next_row_group += 1;
                rg
            };

            let current = self.current.as_ref().expect("current part");
            if !self.row_group_may_match(current, rg) {
                debug!(file = %current.display, row_group = rg, "row group pruned by statistics");
                self.ctx.metrics.record_row_groups_pruned(1);
                continue;
            }

            let root = current
                .reader
                .metadata()
                .file_metadata()
                .schema_descr()
                .root_schema_ptr();
            let projection = self.projection_type(&root);
            let rg_reader = current
                .reader
                .get_row_group(rg)
                .map_err(|e| FsqError::io(&current.display, e))?;
            let iter = rg_reader
                .get_row_iter(projection)
                .map_err(|e| FsqError::io(&current.display, e))?;
            for record in iter {
                let record = record.map_err(|e| FsqError::io(&current.display, e))?;
                let mut row = Row::new();
                for (name, field) in record.get_column_iter() {
                    let declared = self
                        .file_schema
                        .data_type(name)
                        .unwrap_or(DataType::String);
                    row.push(name.clone(), field_to_value(field, declared));
                }
                for (k, v) in &current.partition {
                    row.push(k.clone(), v.clone());
                }
                self.buffer.push_back(row);
            }
            return Ok(true);
        }
    }
}

impl Iterator for ParquetRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Some(Ok(row));
            }
            match self.decode_next_row_group() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// -----------------------------
// Byte-source chunk reader
// -----------------------------

/// `ChunkReader` over a [`ByteSource`], giving the parquet decoder
/// footer-then-row-group ranged access for both local and remote
/// objects.
#[derive(Clone)]
pub struct ByteSourceChunk {
    src: Arc<ByteSource>,
    len: u64,
}

impl ByteSourceChunk {
    pub fn open(src: ByteSource) -> Result<Self> {
        let len = src.len()?;
        Ok(Self {
            src: Arc::new(src),
            len,
        })
    }
}

impl Length for ByteSourceChunk {
    fn len(&self) -> u64 {
        self.len
    }
}

impl ChunkReader for ByteSourceChunk {
    type T = bytes::buf::Reader<Bytes>;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        let bytes = self
            .src
            .fetch_range(start..self.len)
            .map_err(|e| parquet::errors::ParquetError::External(Box::new(e)))?;
        Ok(bytes.reader())
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        self.src
            .fetch_range(start..start + length as u64)
            .map_err(|e| parquet::errors::ParquetError::External(Box::new(e)))
    }
}

// -----------------------------
// Type and value mapping
// -----------------------------

fn map_parquet_type(
    physical: PhysicalType,
    logical: Option<LogicalType>,
    converted: ConvertedType,
) -> DataType {
    if let Some(lt) = logical {
        match lt {
            LogicalType::String | LogicalType::Enum | LogicalType::Uuid => {
                return DataType::String
            }
            LogicalType::Decimal { .. } => return DataType::Decimal,
            LogicalType::Date => return DataType::Date,
            LogicalType::Time { .. } => return DataType::Time,
            LogicalType::Timestamp { .. } => return DataType::DateTime,
            LogicalType::Json => return DataType::Json,
            LogicalType::Integer { .. } => return DataType::Integer,
            _ => {}
        }
    }
    match converted {
        ConvertedType::UTF8 => return DataType::String,
        ConvertedType::JSON => return DataType::Json,
        ConvertedType::DECIMAL => return DataType::Decimal,
        ConvertedType::DATE => return DataType::Date,
        ConvertedType::TIME_MILLIS | ConvertedType::TIME_MICROS => return DataType::Time,
        ConvertedType::TIMESTAMP_MILLIS | ConvertedType::TIMESTAMP_MICROS => {
            return DataType::DateTime
        }
        _ => {}
    }
    match physical {
        PhysicalType::BOOLEAN => DataType::Boolean,
        PhysicalType::INT32 | PhysicalType::INT64 => DataType::Integer,
        PhysicalType::FLOAT | PhysicalType::DOUBLE => DataType::Float,
        PhysicalType::INT96 => DataType::DateTime,
        PhysicalType::BYTE_ARRAY | PhysicalType::FIXED_LEN_BYTE_ARRAY => DataType::String,
    }
}

fn field_to_value(field: &ParquetField, declared: DataType) -> Value {
    let value = match field {
        ParquetField::Null => Value::Null,
        ParquetField::Bool(b) => Value::Bool(*b),
        ParquetField::Byte(v) => Value::Integer(*v as i64),
        ParquetField::Short(v) => Value::Integer(*v as i64),
        ParquetField::Int(v) => Value::Integer(*v as i64),
        ParquetField::Long(v) => Value::Integer(*v),
        ParquetField::UByte(v) => Value::Integer(*v as i64),
        ParquetField::UShort(v) => Value::Integer(*v as i64),
        ParquetField::UInt(v) => Value::Integer(*v as i64),
        ParquetField::ULong(v) => Value::Integer(i64::try_from(*v).unwrap_or(i64::MAX)),
        ParquetField::Float(v) => Value::Float(*v as f64),
        ParquetField::Double(v) => Value::Float(*v),
        ParquetField::Decimal(d) => decimal_to_value(d),
        ParquetField::Str(s) => match declared {
            DataType::Json => serde_json::from_str(s)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::Str(s.clone())),
            _ => Value::Str(s.clone()),
        },
        ParquetField::Bytes(b) => Value::Str(String::from_utf8_lossy(b.data()).into_owned()),
        ParquetField::Date(days) => Value::Date(date_from_epoch_days(*days)),
        ParquetField::TimestampMillis(ms) => chrono::DateTime::from_timestamp_millis(*ms)
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .unwrap_or(Value::Null),
        ParquetField::TimestampMicros(us) => chrono::DateTime::from_timestamp_micros(*us)
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .unwrap_or(Value::Null),
        ParquetField::TimeMillis(ms) => time_from_micros(*ms as i64 * 1000),
        ParquetField::TimeMicros(us) => time_from_micros(*us),
        other => Value::Str(format!("{other:?}")),
    };
    conform_value(value, declared)
}

fn decimal_to_value(d: &parquet::data_type::Decimal) -> Value {
    let bytes = d.data();
    if bytes.is_empty() || bytes.len() > 16 {
        return Value::Null;
    }
    // Sign-extend big-endian two's complement into i128.
    let mut buf = if bytes[0] & 0x80 != 0 { [0xffu8; 16] } else { [0u8; 16] };
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let unscaled = i128::from_be_bytes(buf);
    rust_decimal::Decimal::try_from_i128_with_scale(unscaled, d.scale() as u32)
        .map(Value::Decimal)
        .unwrap_or(Value::Null)
}

fn date_from_epoch_days(days: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .map(|epoch| epoch + chrono::Duration::days(days as i64))
        .unwrap_or(NaiveDate::MIN)
}

fn time_from_micros(us: i64) -> Value {
    let secs = (us / 1_000_000) as u32;
    let nanos = ((us % 1_000_000) * 1000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(Value::Time)
        .unwrap_or(Value::Null)
}

fn stats_min_max(stats: &Statistics, declared: DataType) -> Option<(Value, Value)> {
    match stats {
        Statistics::Boolean(s) => Some((
            Value::Bool(*s.min_opt()?),
            Value::Bool(*s.max_opt()?),
        )),
        Statistics::Int32(s) => {
            let (min, max) = (*s.min_opt()?, *s.max_opt()?);
            match declared {
                DataType::Date => Some((
                    Value::Date(date_from_epoch_days(min)),
                    Value::Date(date_from_epoch_days(max)),
                )),
                DataType::Integer => {
                    Some((Value::Integer(min as i64), Value::Integer(max as i64)))
                }
                _ => None,
            }
        }
        Statistics::Int64(s) => {
            let (min, max) = (*s.min_opt()?, *s.max_opt()?);
            match declared {
                DataType::Integer => Some((Value::Integer(min), Value::Integer(max))),
                DataType::DateTime => Some((
                    chrono::DateTime::from_timestamp_micros(min)
                        .map(|dt| Value::DateTime(dt.naive_utc()))?,
                    chrono::DateTime::from_timestamp_micros(max)
                        .map(|dt| Value::DateTime(dt.naive_utc()))?,
                )),
                _ => None,
            }
        }
        Statistics::Float(s) => Some((
            Value::Float(*s.min_opt()? as f64),
            Value::Float(*s.max_opt()? as f64),
        )),
        Statistics::Double(s) => Some((
            Value::Float(*s.min_opt()?),
            Value::Float(*s.max_opt()?),
        )),
        Statistics::ByteArray(s) => {
            if declared != DataType::String {
                return None;
            }
            let min = s.min_opt()?.as_utf8().ok()?.to_string();
            let max = s.max_opt()?.as_utf8().ok()?.to_string();
            Some((Value::Str(min), Value::Str(max)))
        }
        _ => None,
    }
}

// -----------------------------
// Partition discovery
// -----------------------------

fn collect_parquet_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| FsqError::io(dir.display().to_string(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FsqError::io(dir.display().to_string(), e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_parquet_files(&path, out)?;
        } else if path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("parquet"))
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// `key=value` components between the dataset root and the file.
fn partition_pairs(root: &Path, file: &Path) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Ok(rel) = file.strip_prefix(root) {
        for comp in rel.components() {
            let text = comp.as_os_str().to_string_lossy();
            if let Some((k, v)) = text.split_once('=') {
                if !k.is_empty() {
                    pairs.push((k.to_string(), v.to_string()));
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_pairs_parse_hive_components() {
        let root = Path::new("/data/ds");
        let file = Path::new("/data/ds/year=2024/month=02/part.parquet");
        assert_eq!(
            partition_pairs(root, file),
            vec![
                ("year".to_string(), "2024".to_string()),
                ("month".to_string(), "02".to_string()),
            ]
        );
    }

    #[test]
    fn decimal_bytes_sign_extend() {
        let d = parquet::data_type::Decimal::from_bytes(
            parquet::data_type::ByteArray::from(vec![0xFFu8, 0x85]),
            9,
            2,
        );
        assert_eq!(
            decimal_to_value(&d),
            Value::Decimal("-1.23".parse().unwrap())
        );
    }

    #[test]
    fn epoch_day_conversion() {
        assert_eq!(
            date_from_epoch_days(0),
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
        );
        assert_eq!(
            date_from_epoch_days(19_723),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn physical_fallback_mapping() {
        assert_eq!(
            map_parquet_type(PhysicalType::INT64, None, ConvertedType::NONE),
            DataType::Integer
        );
        assert_eq!(
            map_parquet_type(PhysicalType::BYTE_ARRAY, None, ConvertedType::UTF8),
            DataType::String
        );
        assert_eq!(
            map_parquet_type(
                PhysicalType::BYTE_ARRAY,
                Some(LogicalType::Json),
                ConvertedType::NONE
            ),
            DataType::Json
        );
    }
}
