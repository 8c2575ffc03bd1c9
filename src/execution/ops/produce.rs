//! ProduceResults: the root of every returning plan. Truncates each
//! record to the visible projection slots (hidden ORDER BY keys ride
//! behind them) and hands it up to the result-set collector, which
//! stops pulling once full.

use crate::error::QueryResult;
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::value::Record;

#[derive(Debug)]
pub struct ProduceResults {
    child: BoxedOperator,
    visible: usize,
}

impl ProduceResults {
    pub fn new(child: BoxedOperator, visible: usize) -> Self {
        ProduceResults { child, visible }
    }
}

impl Operator for ProduceResults {
    fn name(&self) -> &'static str {
        "ProduceResults"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.child.open(ctx)
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(record) = self.child.consume(ctx)? else {
            return Ok(None);
        };
        let mut values = record.into_values();
        values.truncate(self.visible);
        Ok(Some(Record::from(values)))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.child.reset()
    }
}
