//! Certified common invariant subspaces of families of complex matrices.
//!
//! Given square matrices `M_1, ..., M_k` known only up to enclosures (every
//! entry is a [`ball::ComplexBall`]), this crate either finds a proper,
//! nonzero subspace invariant under all of them, or proves that none exists.
//! Every answer holds for *every* family of exact matrices enclosed by the
//! input. When the enclosures are too wide to decide, the search fails with a
//! precision error, and the caller recomputes the inputs at a higher precision.
//!
//! ## Algorithms
//!
//! **Row echelon form** ([`algorithms::echelon`]): Gaussian elimination that only
//! pivots on entries certified nonzero, and can resume from pivots certified
//! earlier. Everything else is built on it.
//!
//! **Orbits** ([`algorithms::orbit`]): the smallest invariant subspace containing
//! a vector, optionally with the words of the family realizing each basis vector.
//!
//! **Generated algebra** ([`algorithms::algebra`]): the same closure applied to
//! matrices under multiplication. The family is irreducible exactly when the
//! algebra is everything (Burnside's theorem).
//!
//! **Splittings** ([`algorithms::splitting`]): a decomposition of the space
//! into generalized eigenspaces of random elements of the algebra, refined until
//! a line block or a common eigenvector produces a proper orbit.
//!
//! **Search and escalation** ([`solvers`]): [`invariant_subspace`] runs the
//! structural search at one precision, and [`certify_invariant_subspace`]
//! repeats it at increasing precisions.
//!
//! ## Example Usage
//!
//! ```rust
//! use invsub::{
//!     ball::{ComplexBall, MAX_PREC}, invariant_subspace, matrix::BallMatrix, precision::Context,
//! };
//!
//! // Two matrices sharing the eigenvector e_1.
//! let a = BallMatrix::from_fn(2, 2, |i, j| ComplexBall::from_i64([[1, 1], [0, 2]][i][j], MAX_PREC));
//! let b = BallMatrix::from_fn(2, 2, |i, j| ComplexBall::from_i64([[3, 0], [0, 1]][i][j], MAX_PREC));
//!
//! let outcome = invariant_subspace(&[a, b], &Context::default()).unwrap();
//! assert_eq!(outcome.subspace().map(|basis| basis.len()), Some(1));
//! ```

pub mod algorithms;
pub mod ball;
pub mod error;
pub mod matrix;
pub mod precision;
pub mod solvers;
pub mod utils;

pub use solvers::{SearchOutcome, certify_invariant_subspace, invariant_subspace};
