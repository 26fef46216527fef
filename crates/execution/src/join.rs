//! Hash join. The right input is the build side; the left side streams
//! and probes. INNER emits matches; LEFT adds left+nulls rows; RIGHT
//! adds unmatched build rows with a null left side; FULL OUTER adds
//! both, with the unmatched-right rows emitted after the probe side is
//! exhausted. Matched rows follow probe order.

use std::collections::{HashMap, VecDeque};

use fsq_common::{Result, Row, Value, ValueKey};
use fsq_sql::ast::JoinKind;

use crate::operator::{BoxedOperator, Operator};

struct BuildEntry {
    rows: Vec<Row>,
    matched: bool,
}

pub struct HashJoinOp {
    left: BoxedOperator,
    right: BoxedOperator,
    on: Vec<(String, String)>,
    kind: JoinKind,
    /// Output column layout, left side first.
    left_columns: Vec<String>,
    right_columns: Vec<String>,
    table: HashMap<Vec<ValueKey>, BuildEntry>,
    pending: VecDeque<Row>,
    probing: bool,
    /// Unmatched build rows queued once the probe side ends.
    leftovers: VecDeque<Row>,
}

impl HashJoinOp {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        on: Vec<(String, String)>,
        kind: JoinKind,
        left_columns: Vec<String>,
        right_columns: Vec<String>,
    ) -> Self {
        Self {
            left,
            right,
            on,
            kind,
            left_columns,
            right_columns,
            table: HashMap::new(),
            pending: VecDeque::new(),
            probing: true,
            leftovers: VecDeque::new(),
        }
    }

    fn emit_unmatched_left(&self) -> bool {
        matches!(self.kind, JoinKind::Left | JoinKind::Full)
    }

    fn emit_unmatched_right(&self) -> bool {
        matches!(self.kind, JoinKind::Right | JoinKind::Full)
    }

    fn combined(&self, left: Option<&Row>, right: Option<&Row>) -> Row {
        let mut out = Row::new();
        for name in &self.left_columns {
            let v = left
                .and_then(|r| r.get(name))
                .cloned()
                .unwrap_or(Value::Null);
            out.push(name.clone(), v);
        }
        for name in &self.right_columns {
            let v = right
                .and_then(|r| r.get(name))
                .cloned()
                .unwrap_or(Value::Null);
            // Same-named columns across sides resolve to the right side,
            // matching schema merge.
            out.push(name.clone(), v);
        }
        out
    }

    /// Join keys never match on NULL.
    fn key_of(row: &Row, columns: impl Iterator<Item = impl AsRef<str>>) -> Option<Vec<ValueKey>> {
        let mut key = Vec::new();
        for col in columns {
            let v = row.get(col.as_ref())?;
            if v.is_null() {
                return None;
            }
            key.push(v.join_key());
        }
        Some(key)
    }
}

impl Operator for HashJoinOp {
    fn name(&self) -> &'static str {
        "HashJoin"
    }

    fn open(&mut self) -> Result<()> {
        self.left.open()?;
        self.right.open()?;
        // Build phase: drain the right child.
        while let Some(row) = self.right.next()? {
            let key = match Self::key_of(&row, self.on.iter().map(|(_, r)| r)) {
                Some(k) => k,
                None => {
                    // Null-keyed build rows can only surface as
                    // unmatched rows of an outer join.
                    if self.emit_unmatched_right() {
                        let padded = self.combined(None, Some(&row));
                        self.leftovers.push_back(padded);
                    }
                    continue;
                }
            };
            self.table
                .entry(key)
                .or_insert_with(|| BuildEntry {
                    rows: Vec::new(),
                    matched: false,
                })
                .rows
                .push(row);
        }
        self.right.close();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            if !self.probing {
                return Ok(self.leftovers.pop_front());
            }
            match self.left.next()? {
                Some(left_row) => {
                    let key = Self::key_of(&left_row, self.on.iter().map(|(l, _)| l));
                    let entry = key.and_then(|k| self.table.get_mut(&k));
                    match entry {
                        Some(entry) => {
                            entry.matched = true;
                            let rows: Vec<Row> = entry.rows.clone();
                            for build_row in &rows {
                                let combined = self.combined(Some(&left_row), Some(build_row));
                                self.pending.push_back(combined);
                            }
                        }
                        None => {
                            if self.emit_unmatched_left() {
                                self.pending
                                    .push_back(self.combined(Some(&left_row), None));
                            }
                        }
                    }
                }
                None => {
                    // Probe exhausted; queue unmatched build rows.
                    self.probing = false;
                    self.left.close();
                    if self.emit_unmatched_right() {
                        for entry in self.table.values() {
                            if !entry.matched {
                                for row in &entry.rows {
                                    self.leftovers.push_back(self.combined(None, Some(row)));
                                }
                            }
                        }
                    }
                    self.table.clear();
                }
            }
        }
    }

    fn close(&mut self) {
        self.table.clear();
        self.pending.clear();
        self.leftovers.clear();
        self.left.close();
        self.right.close();
    }
}
