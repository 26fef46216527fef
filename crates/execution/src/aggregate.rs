//! Blocking hash aggregation. Groups are keyed by the GROUP BY value
//! tuple; memory is proportional to the number of distinct keys.
//! Output order is unspecified.

use std::collections::HashMap;

use fsq_common::{FsqError, Result, Row, Value, ValueKey};
use fsq_sql::ast::{AggregateArg, AggregateCall, AggregateFunc};

use crate::operator::{BoxedOperator, Operator};

pub struct AggregateOp {
    child: BoxedOperator,
    group_keys: Vec<String>,
    aggregates: Vec<(AggregateCall, String)>,
    output: Vec<Row>,
    pos: usize,
}

impl AggregateOp {
    pub fn new(
        child: BoxedOperator,
        group_keys: Vec<String>,
        aggregates: Vec<(AggregateCall, String)>,
    ) -> Self {
        Self {
            child,
            group_keys,
            aggregates,
            output: Vec::new(),
            pos: 0,
        }
    }

    fn accumulators(&self) -> Vec<Accumulator> {
        self.aggregates
            .iter()
            .map(|(call, _)| Accumulator::new(call))
            .collect()
    }
}

impl Operator for AggregateOp {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        let mut groups: HashMap<Vec<ValueKey>, (Vec<Value>, Vec<Accumulator>)> = HashMap::new();

        while let Some(row) = self.child.next()? {
            let key_values: Vec<Value> = self
                .group_keys
                .iter()
                .map(|k| row.get(k).cloned().unwrap_or(Value::Null))
                .collect();
            let key: Vec<ValueKey> = key_values.iter().map(|v| v.key()).collect();
            if !groups.contains_key(&key) {
                let accs = self.accumulators();
                groups.insert(key.clone(), (key_values, accs));
            }
            let entry = groups.get_mut(&key).expect("group inserted above");
            for (i, (call, _)) in self.aggregates.iter().enumerate() {
                let arg = match &call.arg {
                    AggregateArg::Star => None,
                    AggregateArg::Column(c) => Some(row.get(&c.name).unwrap_or(&Value::Null)),
                };
                entry.1[i].update(arg)?;
            }
        }
        self.child.close();

        // A groupless aggregate over empty input still produces one row:
        // COUNT(*) = 0, the other aggregates null.
        if groups.is_empty() && self.group_keys.is_empty() {
            groups.insert(Vec::new(), (Vec::new(), self.accumulators()));
        }

        for (_, (key_values, accs)) in groups {
            let mut row = Row::new();
            for (name, value) in self.group_keys.iter().zip(key_values) {
                row.push(name.clone(), value);
            }
            for ((_, name), acc) in self.aggregates.iter().zip(&accs) {
                row.push(name.clone(), acc.finish()?);
            }
            self.output.push(row);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if self.pos >= self.output.len() {
            return Ok(None);
        }
        let row = self.output[self.pos].clone();
        self.pos += 1;
        Ok(Some(row))
    }

    fn close(&mut self) {
        self.output.clear();
        self.pos = 0;
        self.child.close();
    }
}

/// Per-group accumulator state.
enum Accumulator {
    CountStar(i64),
    /// Counts non-null inputs only.
    Count(i64),
    /// Running sum; stays null until the first non-null input. Integer
    /// overflow promotes the accumulator to decimal.
    Sum(Option<Value>),
    Avg { sum: Option<Value>, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(call: &AggregateCall) -> Self {
        match (call.func, &call.arg) {
            (AggregateFunc::Count, AggregateArg::Star) => Accumulator::CountStar(0),
            (AggregateFunc::Count, _) => Accumulator::Count(0),
            (AggregateFunc::Sum, _) => Accumulator::Sum(None),
            (AggregateFunc::Avg, _) => Accumulator::Avg { sum: None, count: 0 },
            (AggregateFunc::Min, _) => Accumulator::Min(None),
            (AggregateFunc::Max, _) => Accumulator::Max(None),
        }
    }

    fn update(&mut self, value: Option<&Value>) -> Result<()> {
        match self {
            Accumulator::CountStar(n) => *n += 1,
            Accumulator::Count(n) => {
                if value.map(|v| !v.is_null()).unwrap_or(false) {
                    *n += 1;
                }
            }
            Accumulator::Sum(acc) => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    *acc = Some(match acc.take() {
                        None => v.clone(),
                        Some(sum) => sum.arith(fsq_common::ArithOp::Add, v)?,
                    });
                }
            }
            Accumulator::Avg { sum, count } => {
                if let Some(v) = value.filter(|v| !v.is_null()) {
                    *sum = Some(match sum.take() {
                        None => v.clone(),
                        Some(s) => s.arith(fsq_common::ArithOp::Add, v)?,
                    });
                    *count += 1;
                }
            }
            Accumulator::Min(best) => update_extreme(best, value, std::cmp::Ordering::Less)?,
            Accumulator::Max(best) => update_extreme(best, value, std::cmp::Ordering::Greater)?,
        }
        Ok(())
    }

    fn finish(&self) -> Result<Value> {
        Ok(match self {
            Accumulator::CountStar(n) | Accumulator::Count(n) => Value::Integer(*n),
            Accumulator::Sum(acc) => acc.clone().unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => match sum {
                None => Value::Null,
                Some(s) => s.arith(fsq_common::ArithOp::Div, &Value::Integer(*count))?,
            },
            Accumulator::Min(v) | Accumulator::Max(v) => v.clone().unwrap_or(Value::Null),
        })
    }
}

fn update_extreme(
    best: &mut Option<Value>,
    value: Option<&Value>,
    keep_when: std::cmp::Ordering,
) -> Result<()> {
    let Some(v) = value.filter(|v| !v.is_null()) else {
        return Ok(());
    };
    match best {
        None => *best = Some(v.clone()),
        Some(current) => {
            let ord = v.compare(current)?.ok_or_else(|| {
                FsqError::type_mismatch("min/max", v.data_type(), current.data_type())
            })?;
            if ord == keep_when {
                *best = Some(v.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::VecOperator;
    use fsq_common::DataType;
    use fsq_sql::ast::ColumnRef;

    fn call(func: AggregateFunc, col: Option<&str>) -> (AggregateCall, String) {
        let call = AggregateCall {
            func,
            arg: match col {
                None => AggregateArg::Star,
                Some(c) => AggregateArg::Column(ColumnRef::bare(c)),
            },
        };
        let name = call.canonical_name();
        (call, name)
    }

    fn kv(k: &str, v: Value) -> Row {
        Row::from_pairs(vec![("k".into(), Value::Str(k.into())), ("v".into(), v)])
    }

    fn run(op: &mut AggregateOp) -> Vec<Row> {
        op.open().unwrap();
        let mut out = Vec::new();
        while let Some(r) = op.next().unwrap() {
            out.push(r);
        }
        out
    }

    #[test]
    fn grouped_average() {
        let rows = vec![
            kv("A", Value::Integer(10)),
            kv("A", Value::Integer(30)),
            kv("B", Value::Integer(20)),
        ];
        let mut op = AggregateOp::new(
            Box::new(VecOperator::new(rows)),
            vec!["k".into()],
            vec![call(AggregateFunc::Avg, Some("v"))],
        );
        let mut out = run(&mut op);
        out.sort_by(|a, b| a.get("k").unwrap().sort_cmp(b.get("k").unwrap()));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get("AVG(v)"), Some(&Value::Float(20.0)));
        assert_eq!(out[1].get("AVG(v)"), Some(&Value::Float(20.0)));
    }

    #[test]
    fn empty_groupless_input_yields_one_row() {
        let mut op = AggregateOp::new(
            Box::new(VecOperator::new(vec![])),
            vec![],
            vec![
                call(AggregateFunc::Count, None),
                call(AggregateFunc::Sum, Some("v")),
                call(AggregateFunc::Min, Some("v")),
            ],
        );
        let out = run(&mut op);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("COUNT(*)"), Some(&Value::Integer(0)));
        assert_eq!(out[0].get("SUM(v)"), Some(&Value::Null));
        assert_eq!(out[0].get("MIN(v)"), Some(&Value::Null));
    }

    #[test]
    fn count_column_skips_nulls_and_sum_of_all_nulls_is_null() {
        let rows = vec![
            kv("A", Value::Null),
            kv("A", Value::Null),
        ];
        let mut op = AggregateOp::new(
            Box::new(VecOperator::new(rows)),
            vec!["k".into()],
            vec![
                call(AggregateFunc::Count, Some("v")),
                call(AggregateFunc::Count, None),
                call(AggregateFunc::Sum, Some("v")),
                call(AggregateFunc::Avg, Some("v")),
            ],
        );
        let out = run(&mut op);
        assert_eq!(out[0].get("COUNT(v)"), Some(&Value::Integer(0)));
        assert_eq!(out[0].get("COUNT(*)"), Some(&Value::Integer(2)));
        assert_eq!(out[0].get("SUM(v)"), Some(&Value::Null));
        assert_eq!(out[0].get("AVG(v)"), Some(&Value::Null));
    }

    #[test]
    fn integer_sum_overflow_promotes_to_decimal() {
        let rows = vec![
            kv("A", Value::Integer(i64::MAX)),
            kv("A", Value::Integer(i64::MAX)),
        ];
        let mut op = AggregateOp::new(
            Box::new(VecOperator::new(rows)),
            vec![],
            vec![call(AggregateFunc::Sum, Some("v"))],
        );
        let out = run(&mut op);
        assert_eq!(out[0].get("SUM(v)").unwrap().data_type(), DataType::Decimal);
    }

    #[test]
    fn sum_promotes_across_mixed_numeric_inputs() {
        let rows = vec![kv("A", Value::Integer(1)), kv("A", Value::Float(0.5))];
        let mut op = AggregateOp::new(
            Box::new(VecOperator::new(rows)),
            vec![],
            vec![call(AggregateFunc::Sum, Some("v"))],
        );
        let out = run(&mut op);
        assert_eq!(out[0].get("SUM(v)"), Some(&Value::Float(1.5)));
    }
}
