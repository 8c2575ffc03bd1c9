//! Sparse matrix / vector storage.
//!
//! Row-major map-of-maps layout with the update discipline the graph
//! store depends on:
//!
//! - insertions land in an append-only pending buffer ("pending
//!   tuples") until [`SparseMatrix::flush`] merges them;
//! - deletions become tombstones ("zombies") that reads skip
//!   transparently and flush applies;
//! - dimensions only grow while a query is running.
//!
//! Kernel operations (multiplies, element-wise ops, reductions) live
//! in the parent module and require a flushed operand.

use crate::error::{QueryError, QueryResult};
use crate::matrix::semiring::KernelScalar;
use std::collections::{BTreeMap, HashSet};

/// Sparse rows × cols matrix over `T`
#[derive(Debug, Clone)]
pub struct SparseMatrix<T: KernelScalar> {
    nrows: u64,
    ncols: u64,
    rows: BTreeMap<u64, BTreeMap<u64, T>>,
    /// Unmerged insertions, in arrival order
    pending: Vec<(u64, u64, T)>,
    /// Logically deleted coordinates awaiting flush
    zombies: HashSet<(u64, u64)>,
}

impl<T: KernelScalar> Default for SparseMatrix<T> {
    fn default() -> Self {
        SparseMatrix::new(0, 0)
    }
}

impl<T: KernelScalar> SparseMatrix<T> {
    pub fn new(nrows: u64, ncols: u64) -> Self {
        SparseMatrix {
            nrows,
            ncols,
            rows: BTreeMap::new(),
            pending: Vec::new(),
            zombies: HashSet::new(),
        }
    }

    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn ncols(&self) -> u64 {
        self.ncols
    }

    /// Count of merged entries; pending tuples are not included
    pub fn nvals(&self) -> usize {
        self.rows
            .iter()
            .map(|(i, row)| {
                row.keys()
                    .filter(|j| !self.zombies.contains(&(*i, **j)))
                    .count()
            })
            .sum()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.zombies.is_empty()
    }

    fn check_bounds(&self, i: u64, j: u64) -> QueryResult<()> {
        if i >= self.nrows || j >= self.ncols {
            return Err(QueryError::Resource(format!(
                "matrix index ({i},{j}) out of bounds for {}x{}",
                self.nrows, self.ncols
            )));
        }
        Ok(())
    }

    /// Queue an insertion. The entry becomes visible to point reads
    /// immediately and to kernel operations after the next flush.
    pub fn set_element(&mut self, i: u64, j: u64, v: T) -> QueryResult<()> {
        self.check_bounds(i, j)?;
        self.zombies.remove(&(i, j));
        self.pending.push((i, j, v));
        Ok(())
    }

    /// Queue a deletion; point reads skip the entry from now on
    pub fn remove_element(&mut self, i: u64, j: u64) -> QueryResult<()> {
        self.check_bounds(i, j)?;
        self.pending.retain(|(pi, pj, _)| !(*pi == i && *pj == j));
        self.zombies.insert((i, j));
        Ok(())
    }

    /// Point read that sees pending insertions and skips zombies
    pub fn get_element(&self, i: u64, j: u64) -> Option<T> {
        if self.zombies.contains(&(i, j)) {
            return None;
        }
        // latest pending write wins
        for (pi, pj, v) in self.pending.iter().rev() {
            if *pi == i && *pj == j {
                return Some(*v);
            }
        }
        self.rows.get(&i).and_then(|row| row.get(&j).copied())
    }

    /// Merge pending tuples (in arrival order) and apply tombstones
    pub fn flush(&mut self) {
        if self.zombies.is_empty() && self.pending.is_empty() {
            return;
        }
        for (i, j) in self.zombies.drain() {
            if let Some(row) = self.rows.get_mut(&i) {
                row.remove(&j);
                if row.is_empty() {
                    self.rows.remove(&i);
                }
            }
        }
        for (i, j, v) in std::mem::take(&mut self.pending) {
            self.rows.entry(i).or_default().insert(j, v);
        }
    }

    /// Drop buffered updates without applying them (error teardown)
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.zombies.clear();
    }

    /// Grow (or shrink) the dimensions. Shrinking drops out-of-range
    /// entries, merged and pending alike.
    pub fn resize(&mut self, nrows: u64, ncols: u64) {
        if nrows < self.nrows || ncols < self.ncols {
            self.rows.retain(|i, _| *i < nrows);
            for row in self.rows.values_mut() {
                row.retain(|j, _| *j < ncols);
            }
            self.pending.retain(|(i, j, _)| *i < nrows && *j < ncols);
            self.zombies.retain(|(i, j)| *i < nrows && *j < ncols);
        }
        self.nrows = nrows;
        self.ncols = ncols;
    }

    /// Drop every entry, keeping the dimensions
    pub fn clear(&mut self) {
        self.rows.clear();
        self.pending.clear();
        self.zombies.clear();
    }

    /// Deep copy, GraphBLAS-style name
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Merged entries of one row; requires a flushed matrix
    pub fn row(&self, i: u64) -> Option<&BTreeMap<u64, T>> {
        debug_assert!(!self.has_pending(), "row access on unflushed matrix");
        self.rows.get(&i)
    }

    /// Row-major iterator over merged (i, j, value) tuples
    pub fn extract_tuples(&self) -> impl Iterator<Item = (u64, u64, T)> + '_ {
        debug_assert!(!self.has_pending(), "tuple extraction on unflushed matrix");
        self.rows
            .iter()
            .flat_map(|(i, row)| row.iter().map(move |(j, v)| (*i, *j, *v)))
    }

    /// Occupied row indices, ascending; requires a flushed matrix
    pub(crate) fn row_indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.keys().copied()
    }

    /// Materialize the transpose of the merged entries
    pub fn transpose(&self) -> SparseMatrix<T> {
        debug_assert!(!self.has_pending(), "transpose of unflushed matrix");
        let mut t = SparseMatrix::new(self.ncols, self.nrows);
        for (i, j, v) in self.extract_tuples() {
            t.rows.entry(j).or_default().insert(i, v);
        }
        t
    }
}

/// Sparse vector over `T`, used as a traversal frontier
#[derive(Debug, Clone)]
pub struct SparseVector<T: KernelScalar> {
    size: u64,
    entries: BTreeMap<u64, T>,
}

impl<T: KernelScalar> SparseVector<T> {
    pub fn new(size: u64) -> Self {
        SparseVector {
            size,
            entries: BTreeMap::new(),
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn nvals(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_element(&mut self, i: u64, v: T) -> QueryResult<()> {
        if i >= self.size {
            return Err(QueryError::Resource(format!(
                "vector index {i} out of bounds for size {}",
                self.size
            )));
        }
        self.entries.insert(i, v);
        Ok(())
    }

    pub fn get_element(&self, i: u64) -> Option<T> {
        self.entries.get(&i).copied()
    }

    pub fn remove_element(&mut self, i: u64) {
        self.entries.remove(&i);
    }

    pub fn resize(&mut self, size: u64) {
        if size < self.size {
            self.entries.retain(|i, _| *i < size);
        }
        self.size = size;
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, T)> + '_ {
        self.entries.iter().map(|(i, v)| (*i, *v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_visible_to_point_reads() {
        let mut m = SparseMatrix::<u64>::new(4, 4);
        m.set_element(1, 2, 42).unwrap();
        assert_eq!(m.get_element(1, 2), Some(42));
        // not merged yet
        assert_eq!(m.nvals(), 0);
        m.flush();
        assert_eq!(m.nvals(), 1);
        assert_eq!(m.get_element(1, 2), Some(42));
    }

    #[test]
    fn test_zombie_skipped_before_flush() {
        let mut m = SparseMatrix::<u64>::new(4, 4);
        m.set_element(0, 0, 7).unwrap();
        m.flush();
        m.remove_element(0, 0).unwrap();
        // logically deleted but physically present
        assert_eq!(m.get_element(0, 0), None);
        m.flush();
        assert_eq!(m.nvals(), 0);
    }

    #[test]
    fn test_reinsert_after_remove() {
        let mut m = SparseMatrix::<u64>::new(2, 2);
        m.set_element(0, 1, 1).unwrap();
        m.flush();
        m.remove_element(0, 1).unwrap();
        m.set_element(0, 1, 2).unwrap();
        assert_eq!(m.get_element(0, 1), Some(2));
        m.flush();
        assert_eq!(m.get_element(0, 1), Some(2));
    }

    #[test]
    fn test_latest_pending_wins() {
        let mut m = SparseMatrix::<u64>::new(2, 2);
        m.set_element(0, 0, 1).unwrap();
        m.set_element(0, 0, 2).unwrap();
        assert_eq!(m.get_element(0, 0), Some(2));
        m.flush();
        assert_eq!(m.get_element(0, 0), Some(2));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut m = SparseMatrix::<u64>::new(2, 2);
        assert!(m.set_element(2, 0, 1).is_err());
        assert!(m.remove_element(0, 5).is_err());
    }

    #[test]
    fn test_resize_grow_preserves() {
        let mut m = SparseMatrix::<u64>::new(2, 2);
        m.set_element(1, 1, 9).unwrap();
        m.flush();
        m.resize(10, 10);
        assert_eq!(m.get_element(1, 1), Some(9));
        m.set_element(9, 9, 1).unwrap();
        m.flush();
        assert_eq!(m.nvals(), 2);
    }

    #[test]
    fn test_transpose() {
        let mut m = SparseMatrix::<u64>::new(3, 2);
        m.set_element(2, 1, 5).unwrap();
        m.flush();
        let t = m.transpose();
        assert_eq!(t.nrows(), 2);
        assert_eq!(t.ncols(), 3);
        assert_eq!(t.get_element(1, 2), Some(5));
    }

    #[test]
    fn test_extract_tuples_row_major() {
        let mut m = SparseMatrix::<u64>::new(3, 3);
        m.set_element(2, 0, 1).unwrap();
        m.set_element(0, 1, 2).unwrap();
        m.set_element(0, 0, 3).unwrap();
        m.flush();
        let tuples: Vec<_> = m.extract_tuples().collect();
        assert_eq!(tuples, vec![(0, 0, 3), (0, 1, 2), (2, 0, 1)]);
    }

    #[test]
    fn test_vector_frontier_ops() {
        let mut v = SparseVector::<u64>::new(8);
        v.set_element(3, 1).unwrap();
        v.set_element(5, 1).unwrap();
        assert_eq!(v.nvals(), 2);
        v.remove_element(3);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(5, 1)]);
    }
}
