//! Leaf scan: wraps a reader, re-applies any pushdown filters the
//! reader declined, and enforces the row cap when the reader could not.
//! Partition columns are synthesized at the scan layer (inside the
//! partitioned reader), so everything above sees uniform rows.

use fsq_common::{all_match, Result, Row, SimplePredicate};
use fsq_readers::{Reader, RowsIter};

use crate::operator::Operator;

pub struct ScanOp {
    reader: Option<Box<dyn Reader>>,
    rows: Option<RowsIter>,
    /// Filters the reader declined; enforced here so pushdown never
    /// widens results.
    residual_filters: Vec<SimplePredicate>,
    row_cap: Option<usize>,
    emitted: usize,
}

impl ScanOp {
    pub fn new(
        reader: Box<dyn Reader>,
        residual_filters: Vec<SimplePredicate>,
        row_cap: Option<usize>,
    ) -> Self {
        Self {
            reader: Some(reader),
            rows: None,
            residual_filters,
            row_cap,
            emitted: 0,
        }
    }
}

impl Operator for ScanOp {
    fn name(&self) -> &'static str {
        "Scan"
    }

    fn open(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            self.rows = Some(reader.rows()?);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if let Some(cap) = self.row_cap {
            if self.emitted >= cap {
                self.close();
                return Ok(None);
            }
        }
        let Some(rows) = &mut self.rows else {
            return Ok(None);
        };
        for row in rows {
            let row = row?;
            if !all_match(&self.residual_filters, &row)? {
                continue;
            }
            self.emitted += 1;
            return Ok(Some(row));
        }
        Ok(None)
    }

    fn close(&mut self) {
        // Dropping the stream and reader releases file handles and
        // remote sessions.
        self.rows = None;
        self.reader = None;
    }
}
