//! # Sparse Matrix Façade
//!
//! The kernel surface the rest of the engine programs against:
//! masked matrix-matrix and matrix-vector multiplies under a
//! selectable semiring, element-wise union/intersection, transpose,
//! and scalar reduction, over the storage in [`sparse`].
//!
//! Every operation here requires flushed operands; the graph store's
//! accessors flush before handing a matrix out, so pending tuples are
//! merged exactly when an operation needs a clean matrix. Output
//! aliasing with an input is ruled out statically (`&mut C` cannot
//! alias `&A`), which is the borrow-checked rendition of the
//! duplicate-on-alias rule a C kernel needs.
//!
//! A multiply may parallelize across rows of A internally; that
//! parallelism completes before the call returns and is invisible to
//! operators.

pub mod semiring;
pub mod sparse;

pub use semiring::{KernelScalar, Monoid, MultiplyOp, Semiring};
pub use sparse::{SparseMatrix, SparseVector};

use crate::error::{QueryError, QueryResult};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Row count below which multiplies stay single-threaded.
/// Tuned from `KernelConfig::parallel_threshold` at startup.
static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(1024);

/// Install the kernel's parallelism threshold
pub fn set_parallel_threshold(rows: usize) {
    PARALLEL_THRESHOLD.store(rows.max(1), Ordering::Relaxed);
}

/// Operation modifiers, mirroring the usual GraphBLAS descriptor bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Descriptor {
    /// Use A transposed
    pub transpose_a: bool,
    /// Use B transposed
    pub transpose_b: bool,
    /// Clear C before writing results
    pub replace_c: bool,
    /// Invert the mask: write where the mask has no entry
    pub complement_mask: bool,
}

impl Descriptor {
    pub fn transposed_a() -> Self {
        Descriptor {
            transpose_a: true,
            ..Descriptor::default()
        }
    }

    pub fn replace() -> Self {
        Descriptor {
            replace_c: true,
            ..Descriptor::default()
        }
    }
}

fn mask_allows<M: KernelScalar>(
    mask: Option<&SparseMatrix<M>>,
    complement: bool,
    i: u64,
    j: u64,
) -> bool {
    match mask {
        None => true,
        Some(m) => m.get_element(i, j).is_some() != complement,
    }
}

fn dims_error(op: &str) -> QueryError {
    QueryError::Resource(format!("{op}: operand dimension mismatch"))
}

/// C<mask> = accum(C, A·B) under `semiring`.
///
/// `desc.transpose_a` / `transpose_b` multiply with the transposed
/// operand (materialized internally); `desc.replace_c` clears C
/// first; `desc.complement_mask` inverts the mask.
pub fn mxm<T: KernelScalar, M: KernelScalar>(
    c: &mut SparseMatrix<T>,
    mask: Option<&SparseMatrix<M>>,
    accum: Option<&Monoid<T>>,
    semiring: &Semiring<T>,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<T>,
    desc: &Descriptor,
) -> QueryResult<()> {
    let at;
    let a_eff = if desc.transpose_a {
        at = a.transpose();
        &at
    } else {
        a
    };
    let bt;
    let b_eff = if desc.transpose_b {
        bt = b.transpose();
        &bt
    } else {
        b
    };

    if a_eff.ncols() != b_eff.nrows()
        || c.nrows() != a_eff.nrows()
        || c.ncols() != b_eff.ncols()
    {
        return Err(dims_error("mxm"));
    }
    if desc.replace_c {
        c.clear();
    }

    let complement = desc.complement_mask;
    let compute_row = |i: u64| -> (u64, BTreeMap<u64, T>) {
        let mut out: BTreeMap<u64, T> = BTreeMap::new();
        if let Some(arow) = a_eff.row(i) {
            for (k, av) in arow {
                if let Some(brow) = b_eff.row(*k) {
                    for (j, bv) in brow {
                        if !mask_allows(mask, complement, i, *j) {
                            continue;
                        }
                        let prod = (semiring.multiply)(*av, *bv, *k, *j);
                        out.entry(*j)
                            .and_modify(|acc| *acc = semiring.add.apply(*acc, prod))
                            .or_insert(prod);
                    }
                }
            }
        }
        (i, out)
    };

    let row_ids: Vec<u64> = a_eff.row_indices().collect();
    let produced: Vec<(u64, BTreeMap<u64, T>)> =
        if row_ids.len() >= PARALLEL_THRESHOLD.load(Ordering::Relaxed) {
            row_ids.par_iter().map(|i| compute_row(*i)).collect()
        } else {
            row_ids.iter().map(|i| compute_row(*i)).collect()
        };

    for (i, row) in produced {
        for (j, v) in row {
            let merged = match (accum, c.get_element(i, j)) {
                (Some(acc), Some(old)) => acc.apply(old, v),
                _ => v,
            };
            c.set_element(i, j, merged)?;
        }
    }
    c.flush();
    Ok(())
}

/// w<mask> = accum(w, v·A): the frontier step of BFS-style expansion.
///
/// With `desc.transpose_a` the multiply walks A's rows against the
/// frontier instead of materializing Aᵀ, so a transpose recorded by
/// the planner costs nothing extra here.
pub fn vxm<T: KernelScalar, M: KernelScalar>(
    w: &mut SparseVector<T>,
    mask: Option<&SparseVector<M>>,
    accum: Option<&Monoid<T>>,
    semiring: &Semiring<T>,
    v: &SparseVector<T>,
    a: &SparseMatrix<T>,
    desc: &Descriptor,
) -> QueryResult<()> {
    let (in_dim, out_dim) = if desc.transpose_a {
        (a.ncols(), a.nrows())
    } else {
        (a.nrows(), a.ncols())
    };
    if v.size() != in_dim || w.size() != out_dim {
        return Err(dims_error("vxm"));
    }
    if desc.replace_c {
        w.clear();
    }

    let mut out: BTreeMap<u64, T> = BTreeMap::new();
    let mut fold = |j: u64, k: u64, vv: T, av: T| {
        let allowed = match mask {
            None => true,
            Some(m) => m.get_element(j).is_some() != desc.complement_mask,
        };
        if !allowed {
            return;
        }
        let prod = (semiring.multiply)(vv, av, k, j);
        out.entry(j)
            .and_modify(|acc| *acc = semiring.add.apply(*acc, prod))
            .or_insert(prod);
    };
    if desc.transpose_a {
        // (v·Aᵀ)[j] folds A's row j against the frontier
        for j in a.row_indices().collect::<Vec<_>>() {
            if let Some(arow) = a.row(j) {
                for (k, av) in arow {
                    if let Some(vv) = v.get_element(*k) {
                        fold(j, *k, vv, *av);
                    }
                }
            }
        }
    } else {
        for (k, vv) in v.iter() {
            if let Some(arow) = a.row(k) {
                for (j, av) in arow {
                    fold(*j, k, vv, *av);
                }
            }
        }
    }
    for (j, v_new) in out {
        let merged = match (accum, w.get_element(j)) {
            (Some(acc), Some(old)) => acc.apply(old, v_new),
            _ => v_new,
        };
        w.set_element(j, merged)?;
    }
    Ok(())
}

/// w<mask> = accum(w, A·v)
pub fn mxv<T: KernelScalar, M: KernelScalar>(
    w: &mut SparseVector<T>,
    mask: Option<&SparseVector<M>>,
    accum: Option<&Monoid<T>>,
    semiring: &Semiring<T>,
    a: &SparseMatrix<T>,
    v: &SparseVector<T>,
    desc: &Descriptor,
) -> QueryResult<()> {
    // A·v is v·Aᵀ with the transpose flag inverted
    let flipped = Descriptor {
        transpose_a: !desc.transpose_a,
        ..*desc
    };
    vxm(w, mask, accum, semiring, v, a, &flipped)
}

/// C<mask> = accum(C, A ∪ B), applying `op` where both sides have an
/// entry
pub fn element_wise_add<T: KernelScalar, M: KernelScalar>(
    c: &mut SparseMatrix<T>,
    mask: Option<&SparseMatrix<M>>,
    accum: Option<&Monoid<T>>,
    op: fn(T, T) -> T,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<T>,
    desc: &Descriptor,
) -> QueryResult<()> {
    if a.nrows() != b.nrows()
        || a.ncols() != b.ncols()
        || c.nrows() != a.nrows()
        || c.ncols() != a.ncols()
    {
        return Err(dims_error("element_wise_add"));
    }
    if desc.replace_c {
        c.clear();
    }
    let mut union: BTreeMap<(u64, u64), T> = BTreeMap::new();
    for (i, j, v) in a.extract_tuples() {
        union.insert((i, j), v);
    }
    for (i, j, v) in b.extract_tuples() {
        union
            .entry((i, j))
            .and_modify(|existing| *existing = op(*existing, v))
            .or_insert(v);
    }
    for ((i, j), v) in union {
        if !mask_allows(mask, desc.complement_mask, i, j) {
            continue;
        }
        let merged = match (accum, c.get_element(i, j)) {
            (Some(acc), Some(old)) => acc.apply(old, v),
            _ => v,
        };
        c.set_element(i, j, merged)?;
    }
    c.flush();
    Ok(())
}

/// C<mask> = accum(C, A ∩ B), applying `op` to coinciding entries
pub fn element_wise_mult<T: KernelScalar, M: KernelScalar>(
    c: &mut SparseMatrix<T>,
    mask: Option<&SparseMatrix<M>>,
    accum: Option<&Monoid<T>>,
    op: fn(T, T) -> T,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<T>,
    desc: &Descriptor,
) -> QueryResult<()> {
    if a.nrows() != b.nrows()
        || a.ncols() != b.ncols()
        || c.nrows() != a.nrows()
        || c.ncols() != a.ncols()
    {
        return Err(dims_error("element_wise_mult"));
    }
    if desc.replace_c {
        c.clear();
    }
    for (i, j, av) in a.extract_tuples() {
        let Some(bv) = b.get_element(i, j) else {
            continue;
        };
        if !mask_allows(mask, desc.complement_mask, i, j) {
            continue;
        }
        let v = op(av, bv);
        let merged = match (accum, c.get_element(i, j)) {
            (Some(acc), Some(old)) => acc.apply(old, v),
            _ => v,
        };
        c.set_element(i, j, merged)?;
    }
    c.flush();
    Ok(())
}

/// Fold every merged entry of A under `monoid`
pub fn reduce_scalar<T: KernelScalar>(monoid: &Monoid<T>, a: &SparseMatrix<T>) -> T {
    a.extract_tuples()
        .fold(monoid.identity, |acc, (_, _, v)| monoid.apply(acc, v))
}
