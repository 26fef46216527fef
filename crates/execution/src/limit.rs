//! Row-count cap. Closes its child as soon as the cap is reached;
//! further `next()` calls keep returning end.

use fsq_common::{Result, Row};

use crate::operator::{BoxedOperator, Operator};

pub struct LimitOp {
    child: BoxedOperator,
    n: usize,
    emitted: usize,
    exhausted: bool,
}

impl LimitOp {
    pub fn new(child: BoxedOperator, n: usize) -> Self {
        Self {
            child,
            n,
            emitted: 0,
            exhausted: false,
        }
    }
}

impl Operator for LimitOp {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn open(&mut self) -> Result<()> {
        if self.n == 0 {
            self.exhausted = true;
            return Ok(());
        }
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.child.next()? {
            Some(row) => {
                self.emitted += 1;
                if self.emitted >= self.n {
                    self.exhausted = true;
                    self.child.close();
                }
                Ok(Some(row))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.child.close();
    }
}
