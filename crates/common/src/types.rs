use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Strings treated as SQL NULL by string-based readers (case-insensitive).
pub const NULL_TOKENS: &[&str] = &["", "null", "none", "n/a", "-"];

/// SQL data types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Arbitrary-precision decimal.
    Decimal,
    /// UTF-8 string.
    String,
    /// Nested JSON value.
    Json,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time of day.
    DateTime,
    /// The null type; unifies with every other type.
    Null,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Decimal => "decimal",
            DataType::String => "string",
            DataType::Json => "json",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::DateTime => "datetime",
            DataType::Null => "null",
        };
        f.write_str(s)
    }
}

impl DataType {
    /// True for integer, float, and decimal.
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Float | DataType::Decimal)
    }

    /// True for date, time, and datetime.
    pub fn is_temporal(self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::DateTime)
    }

    /// Whether values of the two types can be compared.
    ///
    /// Identical types compare; numerics compare via promotion; null
    /// compares with anything (yielding null). Everything else is a
    /// type error at plan or run time.
    pub fn is_comparable(self, other: DataType) -> bool {
        if self == DataType::Null || other == DataType::Null {
            return true;
        }
        if self == other {
            return true;
        }
        self.is_numeric() && other.is_numeric()
    }

    /// Resolves the common type of two types through the promotion lattice.
    ///
    /// `integer ≺ float ≺ decimal`; `date ≺ datetime`, `time ≺ datetime`;
    /// null unifies with anything; json only unifies with json; any other
    /// mix falls back to string.
    pub fn promote(self, other: DataType) -> DataType {
        use DataType::*;
        if self == Null {
            return other;
        }
        if other == Null {
            return self;
        }
        if self == other {
            return self;
        }
        match (self, other) {
            (Integer, Float) | (Float, Integer) => Float,
            (Integer, Decimal) | (Decimal, Integer) => Decimal,
            (Float, Decimal) | (Decimal, Float) => Decimal,
            (Date, DateTime) | (DateTime, Date) => DateTime,
            (Time, DateTime) | (DateTime, Time) => DateTime,
            _ => String,
        }
    }
}

/// Folds sample types through the promotion lattice, ignoring nulls.
pub fn infer_common_type<I: IntoIterator<Item = DataType>>(samples: I) -> DataType {
    let mut common = DataType::Null;
    for t in samples {
        if t == DataType::Null {
            continue;
        }
        common = common.promote(t);
    }
    common
}

/// Infers the most specific [`DataType`] a string form represents.
///
/// Attempt order: null token, boolean, integer, float/decimal, date, time,
/// datetime, JSON, string fallback.
pub fn infer_type_from_string(s: &str) -> DataType {
    infer_value_from_string(s).data_type()
}

/// Parses a string into the most specific typed [`Value`].
pub fn infer_value_from_string(s: &str) -> Value {
    let t = s.trim();
    if is_null_token(t) {
        return Value::Null;
    }
    if t.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if t.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = t.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Some(v) = parse_fractional(t) {
        return v;
    }
    if let Some(d) = parse_date(t) {
        return Value::Date(d);
    }
    if let Some(tm) = parse_time(t) {
        return Value::Time(tm);
    }
    if let Some(dt) = parse_datetime(t) {
        return Value::DateTime(dt);
    }
    if t.starts_with('{') || t.starts_with('[') {
        if let Ok(j) = serde_json::from_str::<serde_json::Value>(t) {
            return Value::Json(j);
        }
    }
    Value::Str(t.to_string())
}

/// True if `s` is one of the recognized null spellings.
pub fn is_null_token(s: &str) -> bool {
    NULL_TOKENS.iter().any(|t| s.eq_ignore_ascii_case(t))
}

/// Coerces a raw string cell to a column's declared type.
///
/// Returns `None` when the cell cannot represent the type; callers degrade
/// the cell to null and emit a warning rather than failing the query.
pub fn coerce_string(s: &str, ty: DataType) -> Option<Value> {
    let t = s.trim();
    if is_null_token(t) {
        return Some(Value::Null);
    }
    match ty {
        DataType::Integer => t.parse::<i64>().ok().map(Value::Integer),
        DataType::Float => strip_decimal_marker(t).parse::<f64>().ok().map(Value::Float),
        DataType::Decimal => strip_decimal_marker(t)
            .parse::<Decimal>()
            .ok()
            .map(Value::Decimal),
        DataType::Boolean => {
            if t.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if t.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        DataType::Date => parse_date(t).map(Value::Date),
        DataType::Time => parse_time(t).map(Value::Time),
        DataType::DateTime => parse_datetime(t)
            .map(Value::DateTime)
            .or_else(|| parse_date(t).map(|d| Value::DateTime(d.and_time(chrono::NaiveTime::MIN)))),
        DataType::Json => serde_json::from_str::<serde_json::Value>(t).ok().map(Value::Json),
        DataType::String => Some(Value::Str(t.to_string())),
        DataType::Null => Some(Value::Null),
    }
}

/// Float-or-decimal classification for a fractional literal.
///
/// Decimal wins when the string has a decimal point and at least five
/// significant digits, or carries a trailing `m` marker; float otherwise.
fn parse_fractional(s: &str) -> Option<Value> {
    let (body, marked) = match s.strip_suffix(['m', 'M']) {
        Some(b) => (b, true),
        None => (s, false),
    };
    if marked {
        return body.parse::<Decimal>().ok().map(Value::Decimal);
    }
    if !body.contains('.') && !body.contains(['e', 'E']) {
        return None;
    }
    let f = body.parse::<f64>().ok()?;
    if body.contains('.') && significant_digits(body) >= 5 {
        if let Ok(d) = body.parse::<Decimal>() {
            return Some(Value::Decimal(d));
        }
    }
    Some(Value::Float(f))
}

fn strip_decimal_marker(s: &str) -> &str {
    match s.strip_suffix(['m', 'M']) {
        Some(b) if b.parse::<f64>().is_ok() => b,
        _ => s,
    }
}

fn significant_digits(s: &str) -> usize {
    s.chars()
        .filter(|c| c.is_ascii_digit())
        .skip_while(|c| *c == '0')
        .count()
}

/// Parses ISO `YYYY-MM-DD` or `MM/DD/YYYY` dates.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

/// Parses `HH:MM[:SS]` times.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parses `YYYY-MM-DD[ T]HH:MM[:SS][.fff][Z|±HH:MM]` datetimes.
///
/// Offset forms are normalized to their UTC wall-clock instant.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%d %H:%M%:z",
    ] {
        if let Ok(dt) = chrono::DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_utc());
        }
    }
    let naive = s.strip_suffix(['Z', 'z']).unwrap_or(s);
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_commutative_and_associative_on_defined_subset() {
        use DataType::*;
        let types = [Integer, Float, Decimal, Date, Time, DateTime, Boolean, String, Json, Null];
        for &a in &types {
            for &b in &types {
                assert_eq!(a.promote(b), b.promote(a), "{a} vs {b}");
                for &c in &types {
                    assert_eq!(
                        a.promote(b).promote(c),
                        a.promote(b.promote(c)),
                        "{a},{b},{c}"
                    );
                }
            }
        }
    }

    #[test]
    fn null_unifies_with_anything() {
        assert_eq!(DataType::Null.promote(DataType::Date), DataType::Date);
        assert_eq!(DataType::Json.promote(DataType::Null), DataType::Json);
    }

    #[test]
    fn json_only_unifies_with_json() {
        assert_eq!(DataType::Json.promote(DataType::Json), DataType::Json);
        assert_eq!(DataType::Json.promote(DataType::Integer), DataType::String);
    }

    #[test]
    fn string_inference_attempt_order() {
        assert_eq!(infer_type_from_string("n/a"), DataType::Null);
        assert_eq!(infer_type_from_string("TRUE"), DataType::Boolean);
        assert_eq!(infer_type_from_string("42"), DataType::Integer);
        assert_eq!(infer_type_from_string("2.5"), DataType::Float);
        assert_eq!(infer_type_from_string("3.14159"), DataType::Decimal);
        assert_eq!(infer_type_from_string("19.99m"), DataType::Decimal);
        assert_eq!(infer_type_from_string("2024-03-01"), DataType::Date);
        assert_eq!(infer_type_from_string("03/01/2024"), DataType::Date);
        assert_eq!(infer_type_from_string("10:30"), DataType::Time);
        assert_eq!(infer_type_from_string("2024-03-01 10:30:00"), DataType::DateTime);
        assert_eq!(infer_type_from_string("2024-03-01T10:30:00Z"), DataType::DateTime);
        assert_eq!(infer_type_from_string(r#"{"a":1}"#), DataType::Json);
        assert_eq!(infer_type_from_string("{not json"), DataType::String);
        assert_eq!(infer_type_from_string("hello"), DataType::String);
    }

    #[test]
    fn decimal_needs_five_significant_digits() {
        assert_eq!(infer_type_from_string("0.0001"), DataType::Float);
        assert_eq!(infer_type_from_string("0.00012345"), DataType::Decimal);
        assert_eq!(infer_type_from_string("99.9999999"), DataType::Decimal);
    }

    #[test]
    fn common_type_ignores_nulls() {
        let t = infer_common_type([DataType::Null, DataType::Integer, DataType::Float]);
        assert_eq!(t, DataType::Float);
        assert_eq!(infer_common_type([DataType::Null, DataType::Null]), DataType::Null);
    }

    #[test]
    fn coerce_degrades_to_none_on_mismatch() {
        assert!(coerce_string("abc", DataType::Integer).is_none());
        assert_eq!(coerce_string("", DataType::Integer), Some(crate::value::Value::Null));
        assert_eq!(
            coerce_string("7", DataType::Float),
            Some(crate::value::Value::Float(7.0))
        );
    }

    #[test]
    fn offset_datetimes_normalize_to_utc() {
        let dt = parse_datetime("2024-03-01T10:30:00+02:00").unwrap();
        assert_eq!(dt, parse_datetime("2024-03-01 08:30:00").unwrap());
    }
}
