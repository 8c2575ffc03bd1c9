//! # Semiring Catalogue
//!
//! Monoid and semiring definitions the kernel multiplies under:
//! - `ANY_PAIR`: existence traversal (any witness is as good as another)
//! - `LOR_LAND`: boolean reachability
//! - `MIN_FIRSTJ` / `MAX_FIRSTJ`: positional, BFS-parent style
//! - `PLUS_TIMES`: conventional numeric algebra (Int64 and Double)
//!
//! Graph matrices carry `u64` payloads (edge ids, or 1 for a bare
//! existence bit), so the traversal semirings are defined over `u64`.
//! The kernel itself is generic; the numeric Double semiring operates
//! on `f64` matrices.

use std::fmt;

/// Scalar domains the kernel computes over
pub trait KernelScalar: Copy + PartialEq + Send + Sync + fmt::Debug + 'static {}

impl KernelScalar for bool {}
impl KernelScalar for u64 {}
impl KernelScalar for i64 {}
impl KernelScalar for f64 {}

/// Associative binary operator with an identity element
#[derive(Clone, Copy)]
pub struct Monoid<T: KernelScalar> {
    pub name: &'static str,
    pub identity: T,
    pub op: fn(T, T) -> T,
}

impl<T: KernelScalar> Monoid<T> {
    pub fn apply(&self, a: T, b: T) -> T {
        (self.op)(a, b)
    }
}

impl<T: KernelScalar> fmt::Debug for Monoid<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Monoid({})", self.name)
    }
}

/// Multiplicative operator of a semiring.
///
/// Receives the two operand values plus the (k, j) coordinates of the
/// multiply site C(i,j) += A(i,k) * B(k,j), so positional operators
/// (the FIRSTJ family) can select an index instead of a payload.
pub type MultiplyOp<T> = fn(a: T, b: T, k: u64, j: u64) -> T;

/// Additive monoid paired with a multiply distributing over it
#[derive(Clone, Copy)]
pub struct Semiring<T: KernelScalar> {
    pub name: &'static str,
    pub add: Monoid<T>,
    pub multiply: MultiplyOp<T>,
}

impl<T: KernelScalar> fmt::Debug for Semiring<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Semiring({})", self.name)
    }
}

// ---------------------------------------------------------------------
// Monoids
// ---------------------------------------------------------------------

/// Take either operand; used where any witness value suffices
pub const ANY_UINT64: Monoid<u64> = Monoid {
    name: "ANY_UINT64",
    identity: 0,
    op: |a, _| a,
};

pub const MIN_UINT64: Monoid<u64> = Monoid {
    name: "MIN_UINT64",
    identity: u64::MAX,
    op: |a, b| if a <= b { a } else { b },
};

pub const MAX_UINT64: Monoid<u64> = Monoid {
    name: "MAX_UINT64",
    identity: 0,
    op: |a, b| if a >= b { a } else { b },
};

pub const LOR_UINT64: Monoid<u64> = Monoid {
    name: "LOR_UINT64",
    identity: 0,
    op: |a, b| u64::from(a != 0 || b != 0),
};

pub const PLUS_INT64: Monoid<i64> = Monoid {
    name: "PLUS_INT64",
    identity: 0,
    op: |a, b| a.wrapping_add(b),
};

pub const PLUS_FP64: Monoid<f64> = Monoid {
    name: "PLUS_FP64",
    identity: 0.0,
    op: |a, b| a + b,
};

pub const PLUS_UINT64: Monoid<u64> = Monoid {
    name: "PLUS_UINT64",
    identity: 0,
    op: u64::wrapping_add,
};

// ---------------------------------------------------------------------
// Semirings
// ---------------------------------------------------------------------

/// Existence traversal: any surviving entry marks reachability
pub const ANY_PAIR_BOOL: Semiring<u64> = Semiring {
    name: "ANY_PAIR_BOOL",
    add: ANY_UINT64,
    multiply: |_, _, _, _| 1,
};

/// Boolean reachability with explicit OR accumulation
pub const LOR_LAND_BOOL: Semiring<u64> = Semiring {
    name: "LOR_LAND_BOOL",
    add: LOR_UINT64,
    multiply: |a, b, _, _| u64::from(a != 0 && b != 0),
};

/// BFS-parent style: the multiply yields the k coordinate (the column
/// of the A operand), the add keeps the smallest
pub const MIN_FIRSTJ_INT64: Semiring<u64> = Semiring {
    name: "MIN_FIRSTJ_INT64",
    add: MIN_UINT64,
    multiply: |_, _, k, _| k,
};

/// As MIN_FIRSTJ_INT64, keeping the largest parent
pub const MAX_FIRSTJ_INT64: Semiring<u64> = Semiring {
    name: "MAX_FIRSTJ_INT64",
    add: MAX_UINT64,
    multiply: |_, _, k, _| k,
};

/// Conventional numeric algebra over integers
pub const PLUS_TIMES_INT64: Semiring<i64> = Semiring {
    name: "PLUS_TIMES_INT64",
    add: PLUS_INT64,
    multiply: |a, b, _, _| a.wrapping_mul(b),
};

/// Conventional numeric algebra over doubles
pub const PLUS_TIMES_FP64: Semiring<f64> = Semiring {
    name: "PLUS_TIMES_FP64",
    add: PLUS_FP64,
    multiply: |a, b, _, _| a * b,
};

/// Entry counting, used by degree-style reductions
pub const PLUS_PAIR_UINT64: Semiring<u64> = Semiring {
    name: "PLUS_PAIR_UINT64",
    add: PLUS_UINT64,
    multiply: |_, _, _, _| 1,
};
