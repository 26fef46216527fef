use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FsqError, Result};
use crate::types::DataType;

/// A typed SQL value. `Null` is a first-class variant, not a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Arbitrary-precision decimal.
    Decimal(Decimal),
    /// UTF-8 string.
    Str(String),
    /// Nested JSON value.
    Json(serde_json::Value),
    /// Boolean.
    Bool(bool),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time of day.
    DateTime(NaiveDateTime),
}

impl Value {
    /// The precise [`DataType`] of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Decimal(_) => DataType::Decimal,
            Value::Str(_) => DataType::String,
            Value::Json(_) => DataType::Json,
            Value::Bool(_) => DataType::Boolean,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::DateTime(_) => DataType::DateTime,
        }
    }

    /// True if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Three-valued comparison: `Ok(None)` when either side is NULL,
    /// [`FsqError::Type`] when the types are not comparable.
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>> {
        use Value::*;
        let ord = match (self, other) {
            (Null, _) | (_, Null) => return Ok(None),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Json(a), Json(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.to_string().cmp(&b.to_string())
                }
            }
            _ => {
                let (lt, rt) = (self.data_type(), other.data_type());
                if !(lt.is_numeric() && rt.is_numeric()) {
                    return Err(FsqError::type_mismatch("compare", lt, rt));
                }
                return Ok(Some(compare_numeric(self, other)?));
            }
        };
        Ok(Some(ord))
    }

    /// Total ordering used by Sort and MIN/MAX: NULLs order last,
    /// incomparable values fall back to canonical-string order so the
    /// sort stays total.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match self.compare(other) {
            Ok(Some(ord)) => ord,
            _ => self.canonical().cmp(&other.canonical()),
        }
    }

    /// Canonical string form; re-inferring this form recovers the type
    /// (floats may widen to decimal when canonicalization adds precision).
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(d) => d.to_string(),
            Value::Str(s) => s.clone(),
            Value::Json(j) => j.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    /// Hashable proxy for grouping and join keys.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Integer(i) => ValueKey::Integer(*i),
            Value::Float(f) => ValueKey::Float(f.to_bits()),
            Value::Decimal(d) => ValueKey::Decimal(d.normalize()),
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Json(j) => ValueKey::Json(j.to_string()),
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Date(d) => ValueKey::Date(*d),
            Value::Time(t) => ValueKey::Time(*t),
            Value::DateTime(dt) => ValueKey::DateTime(*dt),
        }
    }

    /// Join-key proxy with numeric promotion, so `1 = 1.0` matches across
    /// sources whose schemas inferred different numeric widths.
    pub fn join_key(&self) -> ValueKey {
        match self {
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                ValueKey::Integer(*f as i64)
            }
            Value::Decimal(d) => match d.normalize().to_i64() {
                Some(i) if d.fract() == Decimal::ZERO => ValueKey::Integer(i),
                _ => ValueKey::Decimal(d.normalize()),
            },
            _ => self.key(),
        }
    }

    /// Arithmetic with numeric promotion; NULL operands propagate NULL.
    pub fn arith(&self, op: ArithOp, other: &Value) -> Result<Value> {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        let (lt, rt) = (self.data_type(), other.data_type());
        if !(lt.is_numeric() && rt.is_numeric()) {
            return Err(FsqError::type_mismatch(op.as_str(), lt, rt));
        }
        // Division always leaves the integer domain.
        if op == ArithOp::Div {
            if lt == DataType::Decimal || rt == DataType::Decimal {
                let (a, b) = (to_decimal(self)?, to_decimal(other)?);
                return a
                    .checked_div(b)
                    .map(Value::Decimal)
                    .ok_or_else(|| FsqError::Data("division by zero".to_string()));
            }
            let (a, b) = (to_f64(self)?, to_f64(other)?);
            if b == 0.0 {
                return Err(FsqError::Data("division by zero".to_string()));
            }
            return Ok(Value::Float(a / b));
        }
        match lt.promote(rt) {
            DataType::Integer => {
                let (a, b) = (to_i64(self)?, to_i64(other)?);
                let out = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    ArithOp::Div => unreachable!(),
                };
                match out {
                    Some(v) => Ok(Value::Integer(v)),
                    // Overflow promotes to decimal rather than wrapping.
                    None => Value::Decimal(Decimal::from(a)).arith(op, &Value::Decimal(Decimal::from(b))),
                }
            }
            DataType::Decimal => {
                let (a, b) = (to_decimal(self)?, to_decimal(other)?);
                let out = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    ArithOp::Div => unreachable!(),
                };
                out.map(Value::Decimal)
                    .ok_or_else(|| FsqError::Data("decimal overflow".to_string()))
            }
            _ => {
                let (a, b) = (to_f64(self)?, to_f64(other)?);
                let v = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => unreachable!(),
                };
                Ok(Value::Float(v))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Arithmetic operators supported in projection expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
}

impl ArithOp {
    /// SQL spelling of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// Hashable, equality-stable proxy for a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// NULL key; NULL group keys compare equal to each other.
    Null,
    /// Integer key.
    Integer(i64),
    /// Float key by bit pattern.
    Float(u64),
    /// Normalized decimal key.
    Decimal(Decimal),
    /// String key.
    Str(String),
    /// JSON key by canonical text.
    Json(String),
    /// Boolean key.
    Bool(bool),
    /// Date key.
    Date(NaiveDate),
    /// Time key.
    Time(NaiveTime),
    /// Datetime key.
    DateTime(NaiveDateTime),
}

fn compare_numeric(a: &Value, b: &Value) -> Result<Ordering> {
    use Value::*;
    match (a, b) {
        (Float(_), _) | (_, Float(_)) => {
            let (x, y) = (to_f64(a)?, to_f64(b)?);
            Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
        _ => Ok(to_decimal(a)?.cmp(&to_decimal(b)?)),
    }
}

fn to_i64(v: &Value) -> Result<i64> {
    match v {
        Value::Integer(i) => Ok(*i),
        _ => Err(FsqError::type_mismatch("integer", v.data_type(), DataType::Integer)),
    }
}

fn to_f64(v: &Value) -> Result<f64> {
    match v {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        Value::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| FsqError::Data(format!("decimal {d} out of float range"))),
        _ => Err(FsqError::type_mismatch("numeric", v.data_type(), DataType::Float)),
    }
}

fn to_decimal(v: &Value) -> Result<Decimal> {
    match v {
        Value::Integer(i) => Ok(Decimal::from(*i)),
        Value::Decimal(d) => Ok(*d),
        Value::Float(f) => Decimal::from_f64(*f)
            .ok_or_else(|| FsqError::Data(format!("float {f} not representable as decimal"))),
        _ => Err(FsqError::type_mismatch("numeric", v.data_type(), DataType::Decimal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_comparisons_yield_none() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)).unwrap(), None);
        assert_eq!(Value::Str("x".into()).compare(&Value::Null).unwrap(), None);
    }

    #[test]
    fn cross_numeric_comparisons_promote() {
        let ord = Value::Integer(2).compare(&Value::Float(2.5)).unwrap();
        assert_eq!(ord, Some(Ordering::Less));
        let ord = Value::Decimal("2.50".parse().unwrap())
            .compare(&Value::Float(2.5))
            .unwrap();
        assert_eq!(ord, Some(Ordering::Equal));
    }

    #[test]
    fn incomparable_types_error() {
        let err = Value::Integer(1).compare(&Value::Str("1".into())).unwrap_err();
        assert!(matches!(err, FsqError::Type { .. }));
    }

    #[test]
    fn nulls_sort_last() {
        let mut vals = vec![Value::Null, Value::Integer(2), Value::Integer(1)];
        vals.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(vals, vec![Value::Integer(1), Value::Integer(2), Value::Null]);
    }

    #[test]
    fn integer_overflow_promotes_to_decimal() {
        let out = Value::Integer(i64::MAX).arith(ArithOp::Add, &Value::Integer(1)).unwrap();
        assert_eq!(out.data_type(), DataType::Decimal);
    }

    #[test]
    fn division_leaves_integer_domain() {
        let out = Value::Integer(3).arith(ArithOp::Div, &Value::Integer(2)).unwrap();
        assert_eq!(out, Value::Float(1.5));
    }

    #[test]
    fn canonical_round_trips_types() {
        use crate::types::infer_type_from_string;
        for v in [
            Value::Integer(42),
            Value::Bool(true),
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            Value::Str("plain".into()),
            Value::Decimal("3.14159".parse().unwrap()),
        ] {
            assert_eq!(infer_type_from_string(&v.canonical()), v.data_type(), "{v:?}");
        }
        // Documented exception: floats may widen to decimal.
        let t = infer_type_from_string(&Value::Float(2.5).canonical());
        assert!(matches!(t, DataType::Float | DataType::Decimal));
    }

    #[test]
    fn join_keys_match_across_numeric_widths() {
        assert_eq!(Value::Integer(7).join_key(), Value::Float(7.0).join_key());
        assert_eq!(
            Value::Integer(7).join_key(),
            Value::Decimal(Decimal::from(7)).join_key()
        );
    }
}
