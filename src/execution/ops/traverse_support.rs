//! Shared frontier plumbing for the traversal operators.

use crate::error::QueryResult;
use crate::execution::ops::OpContext;
use crate::graph::RelTypeId;
use crate::matrix::{self, semiring, Descriptor, SparseVector};

/// Resolve type names to relation ids; `None` means a named type does
/// not exist and the traversal matches nothing. An empty name list is
/// the untyped traversal over the adjacency matrix.
pub fn resolve_types(
    ctx: &OpContext<'_>,
    types: &[String],
) -> Option<Vec<Option<RelTypeId>>> {
    if types.is_empty() {
        return Some(vec![None]);
    }
    let resolved: Vec<RelTypeId> = types
        .iter()
        .filter_map(|t| ctx.graph().schema().rel_type_id(t))
        .collect();
    if resolved.is_empty() {
        return None;
    }
    Some(resolved.into_iter().map(Some).collect())
}

/// One frontier step over a single relation matrix (adjacency when
/// `rel_type` is None). Destinations accumulate into `next` as an
/// element-wise union, so alternative types union naturally.
pub fn expand_frontier(
    ctx: &mut OpContext<'_>,
    rel_type: Option<RelTypeId>,
    frontier: &SparseVector<u64>,
    next: &mut SparseVector<u64>,
    transpose: bool,
    bidirectional: bool,
) -> QueryResult<()> {
    ctx.flush_graph();
    let matrix = match rel_type {
        Some(t) => ctx.graph().relation_matrix(t)?,
        None => ctx.graph().adjacency_matrix(),
    };
    let accum = semiring::ANY_UINT64;
    let desc = Descriptor {
        transpose_a: transpose,
        ..Descriptor::default()
    };
    matrix::vxm(
        next,
        None::<&SparseVector<u64>>,
        Some(&accum),
        &semiring::ANY_PAIR_BOOL,
        frontier,
        matrix,
        &desc,
    )?;
    if bidirectional {
        let flipped = Descriptor {
            transpose_a: !transpose,
            ..desc
        };
        matrix::vxm(
            next,
            None::<&SparseVector<u64>>,
            Some(&accum),
            &semiring::ANY_PAIR_BOOL,
            frontier,
            matrix,
            &flipped,
        )?;
    }
    Ok(())
}

/// Frontier step unioned across every type alternative
pub fn expand_all_types(
    ctx: &mut OpContext<'_>,
    types: &[String],
    frontier: &SparseVector<u64>,
    next: &mut SparseVector<u64>,
    transpose: bool,
    bidirectional: bool,
) -> QueryResult<()> {
    let Some(resolved) = resolve_types(ctx, types) else {
        return Ok(());
    };
    for rel_type in resolved {
        expand_frontier(ctx, rel_type, frontier, next, transpose, bidirectional)?;
    }
    Ok(())
}
