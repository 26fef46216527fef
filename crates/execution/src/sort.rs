//! Blocking sort: materializes the child, stable-sorts by the composite
//! key. NULLs order last regardless of direction — the engine-wide
//! convention, which differs from ANSI's NULLS FIRST/LAST choice.

use std::cmp::Ordering;

use fsq_common::{Result, Row, Value};
use fsq_planner::PlanSortKey;

use crate::operator::{BoxedOperator, Operator};

pub struct SortOp {
    child: BoxedOperator,
    keys: Vec<PlanSortKey>,
    buffer: Vec<Row>,
    pos: usize,
    opened: bool,
}

impl SortOp {
    pub fn new(child: BoxedOperator, keys: Vec<PlanSortKey>) -> Self {
        Self {
            child,
            keys,
            buffer: Vec::new(),
            pos: 0,
            opened: false,
        }
    }
}

impl Operator for SortOp {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        while let Some(row) = self.child.next()? {
            self.buffer.push(row);
        }
        self.child.close();
        let keys = self.keys.clone();
        // Stable sort preserves input order for tied keys.
        self.buffer.sort_by(|a, b| composite_cmp(&keys, a, b));
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if self.pos >= self.buffer.len() {
            return Ok(None);
        }
        let row = self.buffer[self.pos].clone();
        self.pos += 1;
        Ok(Some(row))
    }

    fn close(&mut self) {
        self.buffer.clear();
        self.pos = 0;
        self.child.close();
    }
}

fn composite_cmp(keys: &[PlanSortKey], a: &Row, b: &Row) -> Ordering {
    for key in keys {
        let av = a.get(&key.column).unwrap_or(&Value::Null);
        let bv = b.get(&key.column).unwrap_or(&Value::Null);
        let ord = match (av.is_null(), bv.is_null()) {
            (true, true) => Ordering::Equal,
            // NULLs last either way.
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let o = av.sort_cmp(bv);
                if key.ascending {
                    o
                } else {
                    o.reverse()
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
