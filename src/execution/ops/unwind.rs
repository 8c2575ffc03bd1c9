//! Unwind and ProcedureCall: record multipliers.
//!
//! Unwind crosses each upstream record with the elements of its
//! collection expression (a Null collection contributes nothing, a
//! scalar behaves as a one-element list, element order is preserved).
//! ProcedureCall streams a procedure's rows into the yield slots,
//! replaying the procedure per upstream record.

use crate::arithmetic::{self, ExprNode};
use crate::error::QueryResult;
use crate::execution::ops::{BoxedOperator, OpContext, Operator};
use crate::procedures::ProcedureInstance;
use crate::value::{Record, Value};
use std::collections::VecDeque;

#[derive(Debug)]
pub struct Unwind {
    child: Option<BoxedOperator>,
    expr: ExprNode,
    slot: usize,
    width: usize,
    pending: VecDeque<Record>,
    leaf_done: bool,
    eof: bool,
}

impl Unwind {
    pub fn new(child: Option<BoxedOperator>, expr: ExprNode, slot: usize, width: usize) -> Self {
        Unwind {
            child,
            expr,
            slot,
            width,
            pending: VecDeque::new(),
            leaf_done: false,
            eof: false,
        }
    }

    fn expand(&mut self, ctx: &mut OpContext<'_>, record: &Record) -> QueryResult<()> {
        let collection = arithmetic::evaluate(&self.expr, record, ctx.graph())?;
        let elements = match collection {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            scalar => vec![scalar],
        };
        for element in elements {
            let mut out = record.clone();
            out.set(self.slot, element);
            self.pending.push_back(out);
        }
        Ok(())
    }
}

impl Operator for Unwind {
    fn name(&self) -> &'static str {
        "Unwind"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }
            ctx.timeout.check()?;
            let upstream = match &mut self.child {
                Some(child) => child.consume(ctx)?,
                None => {
                    if self.leaf_done {
                        None
                    } else {
                        self.leaf_done = true;
                        Some(Record::new(self.width))
                    }
                }
            };
            match upstream {
                Some(record) => self.expand(ctx, &record)?,
                None => {
                    self.eof = true;
                    return Ok(None);
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.pending.clear();
        self.leaf_done = false;
        self.eof = false;
        match &mut self.child {
            Some(child) => child.reset(),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct ProcedureCall {
    child: Option<BoxedOperator>,
    procedure: String,
    args: Vec<ExprNode>,
    /// output column index -> record slot, in declared-output order
    yield_slots: Vec<(usize, usize)>,
    width: usize,
    pending: VecDeque<Record>,
    leaf_done: bool,
    eof: bool,
}

impl ProcedureCall {
    pub fn new(
        child: Option<BoxedOperator>,
        procedure: String,
        args: Vec<ExprNode>,
        yield_slots: Vec<(usize, usize)>,
        width: usize,
    ) -> Self {
        ProcedureCall {
            child,
            procedure,
            args,
            yield_slots,
            width,
            pending: VecDeque::new(),
            leaf_done: false,
            eof: false,
        }
    }

    fn invoke(&mut self, ctx: &mut OpContext<'_>, record: &Record) -> QueryResult<()> {
        let args = self
            .args
            .iter()
            .map(|e| arithmetic::evaluate(e, record, ctx.graph()))
            .collect::<QueryResult<Vec<_>>>()?;
        let mut instance = ProcedureInstance::invoke(&self.procedure, ctx.graph(), &args)?;
        while let Some(row) = instance.step() {
            let mut out = record.clone();
            for (column, slot) in &self.yield_slots {
                out.set(*slot, row.get(*column).cloned().unwrap_or(Value::Null));
            }
            self.pending.push_back(out);
        }
        Ok(())
    }
}

impl Operator for ProcedureCall {
    fn name(&self) -> &'static str {
        "ProcedureCall"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        match &mut self.child {
            Some(child) => child.open(ctx),
            None => Ok(()),
        }
    }

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }
            ctx.timeout.check()?;
            let upstream = match &mut self.child {
                Some(child) => child.consume(ctx)?,
                None => {
                    if self.leaf_done {
                        None
                    } else {
                        self.leaf_done = true;
                        Some(Record::new(self.width))
                    }
                }
            };
            match upstream {
                Some(record) => self.invoke(ctx, &record)?,
                None => {
                    self.eof = true;
                    return Ok(None);
                }
            }
        }
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.pending.clear();
        self.leaf_done = false;
        self.eof = false;
        match &mut self.child {
            Some(child) => child.reset(),
            None => Ok(()),
        }
    }
}
