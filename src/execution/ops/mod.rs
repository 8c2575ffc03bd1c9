//! # Pull Operators
//!
//! The execution plan is a tree of these. Every operator obeys the
//! same contract:
//!
//! - `open` runs once before the first consume and propagates to
//!   children;
//! - `consume` returns at most one record it owns; `None` is EOF and
//!   stays EOF on every later call;
//! - `reset` rewinds a re-openable operator (materializing operators
//!   refuse once they have started streaming; a reset before the
//!   first consume is always allowed);
//! - dropping the operator releases everything it owns.
//!
//! Records are moved to the parent, never shared; an operator keeps
//! no reference to a record it has returned.

mod aggregate;
mod cartesian;
mod filter;
mod merge;
mod mutate;
mod produce;
mod project;
mod scan;
mod sort;
mod traverse;
mod traverse_support;
mod unwind;
mod varlen;

pub use aggregate::{AggregateOp, ProjectionItem};
pub use cartesian::{CartesianProduct, Optional};
pub use filter::Filter;
pub use merge::MergeOp;
pub use mutate::{CreateOp, DeleteOp, EdgeSpec, EntitySpec, PatternSpec, UpdateOp};
pub use produce::ProduceResults;
pub use project::Project;
pub use scan::{AllNodeScan, Argument, ArgumentSlot, NodeByIndexScan, NodeByLabelScan};
pub use sort::{Distinct, Limit, Skip, Sort};
pub use traverse::{CondTraverse, ExpandInto};
pub use unwind::{ProcedureCall, Unwind};
pub use varlen::CondVarLenTraverse;

use crate::error::{QueryError, QueryResult};
use crate::execution::timeout::QueryTimeout;
use crate::graph::Graph;
use crate::resultset::QueryStats;
use crate::value::Record;

/// How the running query holds the graph store: readers share the
/// store under the process read lock, writers own it exclusively.
/// A writer flushes at commit, so a reader always starts from clean
/// matrices and never needs a flush of its own.
enum GraphAccess<'a> {
    Read(&'a Graph),
    Write(&'a mut Graph),
}

/// Everything an operator needs while running: graph access, the
/// cancellation token, and the mutation counters
pub struct OpContext<'a> {
    graph: GraphAccess<'a>,
    pub timeout: &'a QueryTimeout,
    pub stats: &'a mut QueryStats,
}

impl<'a> OpContext<'a> {
    pub fn read_only(
        graph: &'a Graph,
        timeout: &'a QueryTimeout,
        stats: &'a mut QueryStats,
    ) -> Self {
        OpContext {
            graph: GraphAccess::Read(graph),
            timeout,
            stats,
        }
    }

    pub fn read_write(
        graph: &'a mut Graph,
        timeout: &'a QueryTimeout,
        stats: &'a mut QueryStats,
    ) -> Self {
        OpContext {
            graph: GraphAccess::Write(graph),
            timeout,
            stats,
        }
    }

    pub fn graph(&self) -> &Graph {
        match &self.graph {
            GraphAccess::Read(g) => g,
            GraphAccess::Write(g) => g,
        }
    }

    /// Mutable store access; only write plans hold it
    pub fn graph_mut(&mut self) -> QueryResult<&mut Graph> {
        match &mut self.graph {
            GraphAccess::Write(g) => Ok(g),
            GraphAccess::Read(_) => Err(QueryError::Internal(
                "mutation operator in a read-only plan".to_string(),
            )),
        }
    }

    /// Merge pending matrix updates before a multiply. A no-op for
    /// readers, whose matrices are clean by construction.
    pub fn flush_graph(&mut self) {
        if let GraphAccess::Write(g) = &mut self.graph {
            g.flush_pending();
        }
    }
}

/// The shared pull contract
pub trait Operator: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn open(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<()>;

    fn consume(&mut self, ctx: &mut OpContext<'_>) -> QueryResult<Option<Record>>;

    fn reset(&mut self) -> QueryResult<()>;
}

pub type BoxedOperator = Box<dyn Operator>;
