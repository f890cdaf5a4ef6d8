//! Dense vectors and matrices of complex balls, and the operator abstraction.
//!
//! The algorithms of this crate only ever need a handful of operations on
//! enclosure matrices: products, row manipulations, block assembly, and a
//! certified inverse. They are implemented here once, with plain row-major
//! storage and value semantics (no views, no aliasing), so every intermediate
//! result is an independent enclosure.
//!
//! The [`BallOperator`] trait mirrors the matrix-free design of iterative
//! solvers: the orbit computation only needs the action of an operator on a
//! vector, which lets a recorded transition operator be replayed on a vector
//! without ever materializing its matrix.

use crate::{
    ball::{ComplexBall, MAX_PREC},
    error::{InvSubError, InvSubErrorKind},
};
use faer::{Mat, c64};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut, Mul};

/// Represents a linear operator acting on ball vectors.
pub trait BallOperator {
    /// Returns the number of rows of the operator.
    fn nrows(&self) -> usize;

    /// Returns the number of columns of the operator.
    fn ncols(&self) -> usize;

    /// Applies the operator to `rhs`.
    ///
    /// # Panics
    ///
    /// Panics if `rhs.len()` does not match [`BallOperator::ncols`].
    fn apply(&self, rhs: &BallVector) -> BallVector;
}

/// An owned vector of complex balls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallVector {
    entries: Vec<ComplexBall>,
}

impl BallVector {
    pub fn new(entries: Vec<ComplexBall>) -> Self {
        BallVector { entries }
    }

    pub fn zeros(n: usize, prec: u32) -> Self {
        BallVector::new(vec![ComplexBall::zero(prec); n])
    }

    /// The `i`-th canonical basis vector of length `n`.
    pub fn unit(n: usize, i: usize, prec: u32) -> Self {
        let mut v = BallVector::zeros(n, prec);
        v[i] = ComplexBall::one(prec);
        v
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComplexBall> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[ComplexBall] {
        &self.entries
    }

    pub fn into_inner(self) -> Vec<ComplexBall> {
        self.entries
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
    }

    /// Returns `c * self`.
    pub fn scale(&self, c: &ComplexBall) -> BallVector {
        BallVector::new(self.entries.iter().map(|x| c * x).collect())
    }

    /// Returns `self - c * other`.
    pub fn sub_scaled(&self, c: &ComplexBall, other: &BallVector) -> BallVector {
        assert_eq!(self.len(), other.len(), "Vector length mismatch.");
        BallVector::new(
            self.entries
                .iter()
                .zip(other.iter())
                .map(|(a, b)| *a - *c * *b)
                .collect(),
        )
    }

    /// Returns a copy with every entry's radius enlarged by `err`.
    pub fn add_error(&self, err: f64) -> BallVector {
        BallVector::new(self.entries.iter().map(|x| x.add_error(err)).collect())
    }

    /// Exact balls at the midpoints of the entries.
    pub fn centered(&self) -> BallVector {
        self.entries
            .iter()
            .map(|x| ComplexBall::exact(x.mid(), x.prec()))
            .collect()
    }

    /// `true` if every entry may be zero.
    pub fn may_be_zero(&self) -> bool {
        self.entries.iter().all(ComplexBall::contains_zero)
    }

    /// Smallest working precision among the entries.
    pub fn prec(&self) -> u32 {
        self.entries
            .iter()
            .map(ComplexBall::prec)
            .min()
            .unwrap_or(MAX_PREC)
    }
}

impl Index<usize> for BallVector {
    type Output = ComplexBall;

    fn index(&self, i: usize) -> &ComplexBall {
        &self.entries[i]
    }
}

impl IndexMut<usize> for BallVector {
    fn index_mut(&mut self, i: usize) -> &mut ComplexBall {
        &mut self.entries[i]
    }
}

impl FromIterator<ComplexBall> for BallVector {
    fn from_iter<I: IntoIterator<Item = ComplexBall>>(iter: I) -> Self {
        BallVector::new(iter.into_iter().collect())
    }
}

/// An owned, row-major matrix of complex balls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<ComplexBall>,
}

impl BallMatrix {
    pub fn zeros(nrows: usize, ncols: usize, prec: u32) -> Self {
        BallMatrix {
            nrows,
            ncols,
            data: vec![ComplexBall::zero(prec); nrows * ncols],
        }
    }

    pub fn identity(n: usize, prec: u32) -> Self {
        let mut m = BallMatrix::zeros(n, n, prec);
        for i in 0..n {
            m[(i, i)] = ComplexBall::one(prec);
        }
        m
    }

    pub fn from_fn(
        nrows: usize,
        ncols: usize,
        mut f: impl FnMut(usize, usize) -> ComplexBall,
    ) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for j in 0..ncols {
                data.push(f(i, j));
            }
        }
        BallMatrix { nrows, ncols, data }
    }

    /// Stacks `rows` as the rows of a matrix with `ncols` columns.
    pub fn from_rows(rows: &[BallVector], ncols: usize) -> Result<Self, InvSubError> {
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for row in rows {
            if row.len() != ncols {
                return Err(InvSubErrorKind::DimensionMismatch {
                    expected: ncols,
                    actual: row.len(),
                }
                .into());
            }
            data.extend_from_slice(row.as_slice());
        }
        Ok(BallMatrix {
            nrows: rows.len(),
            ncols,
            data,
        })
    }

    /// Reshapes a row-major flattened `n*n` vector into an `n x n` matrix.
    pub fn from_flat(n: usize, flat: &BallVector) -> Result<Self, InvSubError> {
        if flat.len() != n * n {
            return Err(InvSubErrorKind::DimensionMismatch {
                expected: n * n,
                actual: flat.len(),
            }
            .into());
        }
        Ok(BallMatrix {
            nrows: n,
            ncols: n,
            data: flat.as_slice().to_vec(),
        })
    }

    /// Flattens the matrix row by row.
    pub fn flatten(&self) -> BallVector {
        BallVector::new(self.data.clone())
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    pub fn row_slice(&self, i: usize) -> &[ComplexBall] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    pub fn row(&self, i: usize) -> BallVector {
        BallVector::new(self.row_slice(i).to_vec())
    }

    pub fn rows(&self) -> Vec<BallVector> {
        (0..self.nrows).map(|i| self.row(i)).collect()
    }

    pub fn set_row(&mut self, i: usize, row: &BallVector) {
        assert_eq!(row.len(), self.ncols, "Row length mismatch.");
        self.data[i * self.ncols..(i + 1) * self.ncols].copy_from_slice(row.as_slice());
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.ncols {
            self.data.swap(a * self.ncols + j, b * self.ncols + j);
        }
    }

    pub fn column(&self, j: usize) -> BallVector {
        (0..self.nrows).map(|i| self[(i, j)]).collect()
    }

    /// The first `count` rows.
    pub fn top_rows(&self, count: usize) -> BallMatrix {
        let count = count.min(self.nrows);
        BallMatrix {
            nrows: count,
            ncols: self.ncols,
            data: self.data[..count * self.ncols].to_vec(),
        }
    }

    /// Appends `rows` below `self`.
    pub fn stack(&self, rows: &[BallVector]) -> BallMatrix {
        let mut data = self.data.clone();
        for row in rows {
            assert_eq!(row.len(), self.ncols, "Row length mismatch.");
            data.extend_from_slice(row.as_slice());
        }
        BallMatrix {
            nrows: self.nrows + rows.len(),
            ncols: self.ncols,
            data,
        }
    }

    pub fn transpose(&self) -> BallMatrix {
        BallMatrix::from_fn(self.ncols, self.nrows, |i, j| self[(j, i)])
    }

    /// The `nrows x ncols` block starting at `(row, col)`.
    pub fn submatrix(&self, row: usize, col: usize, nrows: usize, ncols: usize) -> BallMatrix {
        BallMatrix::from_fn(nrows, ncols, |i, j| self[(row + i, col + j)])
    }

    /// Block-diagonal sum of square or rectangular blocks.
    pub fn block_diag(blocks: &[BallMatrix], prec: u32) -> BallMatrix {
        let nrows = blocks.iter().map(BallMatrix::nrows).sum();
        let ncols = blocks.iter().map(BallMatrix::ncols).sum();
        let mut out = BallMatrix::zeros(nrows, ncols, prec);
        let (mut r, mut c) = (0, 0);
        for block in blocks {
            for i in 0..block.nrows {
                for j in 0..block.ncols {
                    out[(r + i, c + j)] = block[(i, j)];
                }
            }
            r += block.nrows;
            c += block.ncols;
        }
        out
    }

    pub fn scale(&self, c: &ComplexBall) -> BallMatrix {
        BallMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().map(|x| c * x).collect(),
        }
    }

    pub fn add(&self, other: &BallMatrix) -> BallMatrix {
        assert_eq!(
            (self.nrows, self.ncols),
            (other.nrows, other.ncols),
            "Matrix shape mismatch."
        );
        BallMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + b)
                .collect(),
        }
    }

    pub fn sub(&self, other: &BallMatrix) -> BallMatrix {
        self.add(&other.scale(&-ComplexBall::one(MAX_PREC)))
    }

    /// Returns `self - c * I`.
    pub fn shift(&self, c: &ComplexBall) -> BallMatrix {
        let mut out = self.clone();
        for i in 0..self.nrows.min(self.ncols) {
            out[(i, i)] = out[(i, i)] - *c;
        }
        out
    }

    /// Returns a copy with every entry's radius enlarged by `err`.
    pub fn add_error(&self, err: f64) -> BallMatrix {
        BallMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().map(|x| x.add_error(err)).collect(),
        }
    }

    /// Exact balls at the midpoints of the entries.
    pub fn centered(&self) -> BallMatrix {
        BallMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self
                .data
                .iter()
                .map(|x| ComplexBall::exact(x.mid(), x.prec()))
                .collect(),
        }
    }

    /// Re-rounds every entry at another working precision.
    pub fn with_prec(&self, prec: u32) -> BallMatrix {
        BallMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().map(|x| x.with_prec(prec)).collect(),
        }
    }

    /// Certified upper bound of the largest entry modulus.
    pub fn max_abs(&self) -> f64 {
        self.data
            .iter()
            .map(ComplexBall::above_abs)
            .fold(0.0, f64::max)
    }

    /// Smallest working precision among the entries.
    pub fn prec(&self) -> u32 {
        self.data
            .iter()
            .map(ComplexBall::prec)
            .min()
            .unwrap_or(MAX_PREC)
    }

    /// Minimum certified accuracy (in bits) over all entries.
    pub fn accuracy(&self) -> i64 {
        self.data
            .iter()
            .map(ComplexBall::accuracy)
            .min()
            .unwrap_or(MAX_PREC as i64)
    }

    /// The matrix of midpoints, as a `faer` matrix.
    pub fn midpoint(&self) -> Mat<c64> {
        Mat::from_fn(self.nrows, self.ncols, |i, j| {
            let z = self[(i, j)].mid();
            c64::new(z.re, z.im)
        })
    }

    /// Enclosure of the determinant.
    ///
    /// Gaussian elimination with partial pivoting on certified-nonzero entries.
    /// If at some step no remaining entry of the pivot column is certified
    /// nonzero, the matrix may be singular and the indeterminate ball is returned.
    pub fn determinant(&self) -> ComplexBall {
        assert!(self.is_square(), "Determinant of a non-square matrix.");
        let n = self.nrows;
        let prec = self.prec();
        let mut work = self.clone();
        let mut det = ComplexBall::one(prec);
        for col in 0..n {
            let Some(pivot_row) = work.best_pivot(col, col) else {
                return ComplexBall::indeterminate(prec);
            };
            if pivot_row != col {
                work.swap_rows(pivot_row, col);
                det = -det;
            }
            let pivot = work[(col, col)];
            det = det * pivot;
            let pivot_inv = pivot.inv();
            for r in (col + 1)..n {
                let factor = work[(r, col)] * pivot_inv;
                for c in col..n {
                    let v = work[(col, c)];
                    work[(r, c)] = work[(r, c)] - factor * v;
                }
            }
        }
        det
    }

    /// Certified inverse by Gauss-Jordan elimination.
    ///
    /// Fails with a precision error when some pivot cannot be certified nonzero.
    pub fn inverse(&self) -> Result<BallMatrix, InvSubError> {
        if !self.is_square() {
            return Err(InvSubErrorKind::NotSquare {
                nrows: self.nrows,
                ncols: self.ncols,
            }
            .into());
        }
        let n = self.nrows;
        let prec = self.prec();
        let mut work = self.clone();
        let mut inv = BallMatrix::identity(n, prec);
        for col in 0..n {
            let pivot_row = work
                .best_pivot(col, col)
                .ok_or_else(|| InvSubError::precision("Cannot certify invertibility."))?;
            work.swap_rows(pivot_row, col);
            inv.swap_rows(pivot_row, col);
            let pivot_inv = work[(col, col)].inv();
            for c in 0..n {
                work[(col, c)] = work[(col, c)] * pivot_inv;
                inv[(col, c)] = inv[(col, c)] * pivot_inv;
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = work[(r, col)];
                for c in 0..n {
                    let (w, v) = (work[(col, c)], inv[(col, c)]);
                    work[(r, c)] = work[(r, c)] - factor * w;
                    inv[(r, c)] = inv[(r, c)] - factor * v;
                }
            }
        }
        Ok(inv)
    }

    /// Row index in `from..` whose entry in column `col` is certified nonzero
    /// with the largest certified modulus.
    pub(crate) fn best_pivot(&self, col: usize, from: usize) -> Option<usize> {
        (from..self.nrows)
            .filter(|&i| self[(i, col)].is_nonzero())
            .max_by(|&a, &b| {
                self[(a, col)]
                    .below_abs()
                    .total_cmp(&self[(b, col)].below_abs())
            })
    }
}

impl Index<(usize, usize)> for BallMatrix {
    type Output = ComplexBall;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &ComplexBall {
        &self.data[i * self.ncols + j]
    }
}

impl IndexMut<(usize, usize)> for BallMatrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut ComplexBall {
        &mut self.data[i * self.ncols + j]
    }
}

impl Mul for &BallMatrix {
    type Output = BallMatrix;

    fn mul(self, rhs: &BallMatrix) -> BallMatrix {
        assert_eq!(
            self.ncols, rhs.nrows,
            "Dimension mismatch: left operand has {} columns but right operand has {} rows.",
            self.ncols, rhs.nrows,
        );
        let prec = self.prec().min(rhs.prec());
        BallMatrix::from_fn(self.nrows, rhs.ncols, |i, j| {
            (0..self.ncols).fold(ComplexBall::zero(prec), |acc, k| {
                acc + self[(i, k)] * rhs[(k, j)]
            })
        })
    }
}

impl BallOperator for BallMatrix {
    #[inline]
    fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.ncols
    }

    fn apply(&self, rhs: &BallVector) -> BallVector {
        assert_eq!(
            self.ncols,
            rhs.len(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.ncols,
            rhs.len(),
        );
        (0..self.nrows)
            .map(|i| {
                self.row_slice(i)
                    .iter()
                    .zip(rhs.iter())
                    .fold(ComplexBall::zero(rhs.prec()), |acc, (a, b)| acc + a * b)
            })
            .collect()
    }
}
