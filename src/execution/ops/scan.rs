//! Scan operators: the leaves that feed records into a chain.

use crate::error::{QueryError, QueryResult};
use crate::execution::ops::{OpContext, Operator};
use crate::graph::IndexOp;
use crate::value::{NodeId, Record, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// One record per node in the graph, in allocation order
#[derive(Debug)]
pub struct AllNodeScan {
    slot: usize,
    width: usize,
    ids: Vec<NodeId>,
    cursor: usize,
}

impl AllNodeScan {
    pub fn new(slot: usize, width: usize) -> Self {
        AllNodeScan {
            slot,
            width,
            ids: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for AllNodeScan {
    fn name(&self) -> &'static str {
        "AllNodeScan"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.ids = ctx.graph().nodes().map(|n| n.id).collect();
        self.cursor = 0;
        Ok(())
    }

    fn consume(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(id) = self.ids.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let mut record = Record::new(self.width);
        record.set(self.slot, Value::Node(*id));
        Ok(Some(record))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// One record per node carrying a label, read off the label matrix
/// diagonal
#[derive(Debug)]
pub struct NodeByLabelScan {
    label: String,
    slot: usize,
    width: usize,
    ids: Vec<NodeId>,
    cursor: usize,
}

impl NodeByLabelScan {
    pub fn new(label: String, slot: usize, width: usize) -> Self {
        NodeByLabelScan {
            label,
            slot,
            width,
            ids: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for NodeByLabelScan {
    fn name(&self) -> &'static str {
        "NodeByLabelScan"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.cursor = 0;
        self.ids.clear();
        let Some(label_id) = ctx.graph().schema().label_id(&self.label) else {
            // unknown label: empty scan
            return Ok(());
        };
        ctx.flush_graph();
        let matrix = ctx.graph().label_matrix(label_id)?;
        self.ids = matrix.extract_tuples().map(|(i, _, _)| i).collect();
        Ok(())
    }

    fn consume(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(id) = self.ids.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let mut record = Record::new(self.width);
        record.set(self.slot, Value::Node(*id));
        Ok(Some(record))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Nodes matching an indexed predicate on (label, property)
#[derive(Debug)]
pub struct NodeByIndexScan {
    label: String,
    prop: String,
    op: IndexOp,
    value: Value,
    slot: usize,
    width: usize,
    ids: Vec<NodeId>,
    cursor: usize,
}

impl NodeByIndexScan {
    pub fn new(
        label: String,
        prop: String,
        op: IndexOp,
        value: Value,
        slot: usize,
        width: usize,
    ) -> Self {
        NodeByIndexScan {
            label,
            prop,
            op,
            value,
            slot,
            width,
            ids: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for NodeByIndexScan {
    fn name(&self) -> &'static str {
        "NodeByIndexScan"
    }

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.cursor = 0;
        self.ids.clear();
        let schema = ctx.graph().schema();
        let (Some(label_id), Some(prop_id)) = (
            schema.label_id(&self.label),
            schema.prop_key_id(&self.prop),
        ) else {
            return Ok(());
        };
        let index = ctx.graph().index_for(label_id, prop_id).ok_or_else(|| {
            QueryError::Internal(format!(
                "index scan planned for missing index :{}({})",
                self.label, self.prop
            ))
        })?;
        self.ids = index.scan(self.op, &self.value);
        Ok(())
    }

    fn consume(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        let Some(id) = self.ids.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let mut record = Record::new(self.width);
        record.set(self.slot, Value::Node(*id));
        Ok(Some(record))
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Shared cell through which an apply-style parent hands its current
/// upstream record to the leaf of a sub-plan
pub type ArgumentSlot = Rc<RefCell<Option<Record>>>;

/// Emits the injected upstream record exactly once per reset
#[derive(Debug)]
pub struct Argument {
    input: ArgumentSlot,
    emitted: bool,
}

impl Argument {
    pub fn new(input: ArgumentSlot) -> Self {
        Argument {
            input,
            emitted: false,
        }
    }
}

impl Operator for Argument {
    fn name(&self) -> &'static str {
        "Argument"
    }

    fn open(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<()> {
        self.emitted = false;
        Ok(())
    }

    fn consume(&mut self, _ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        Ok(self.input.borrow().clone())
    }

    fn reset(&mut self) -> QueryResult<()> {
        self.emitted = false;
        Ok(())
    }
}
