//! Rigorous row echelon forms of ball matrices.
//!
//! [`row_echelon`] computes an "almost reduced" row echelon form: pivots are
//! exactly 1 and everything below a pivot is exactly 0, but entries above the
//! pivots are left unreduced. Let `(R, T, p)` be the output for a ball matrix
//! `mat`. For every matrix `M` enclosed by `mat` there are `R'` in `R` and `T'`
//! in `T` such that:
//!
//! 1. for each `(j, p[j])` of the pivot map, `R'[p[j], j] = 1` and
//!    `R'[i, j] = 0` for `i > p[j]`;
//! 2. `R' = T' M` and, when the transformation is requested, `T'` is invertible;
//! 3. the number of pivots does not exceed the rank of `M`;
//! 4. only the first `|p|` rows of `R` may fail to contain the zero row.
//!
//! Conversely, if `mat` is precise enough the number of pivots equals the rank.
//!
//! The elimination is expressed as left multiplication by an evolving matrix
//! `T`, so that the identity `R = T mat` is carried by ball arithmetic instead
//! of being recomputed. Incremental callers (orbits, algebra closures) pass the
//! pivots they already certified as `prec_pivots`; those rows are only replayed
//! against the new rows instead of being eliminated again.

use crate::{
    ball::ComplexBall,
    error::{InvSubError, InvSubErrorKind},
    matrix::{BallMatrix, BallOperator, BallVector},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps the index of every pivot column to the row holding its pivot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotMap(BTreeMap<usize, usize>);

impl PivotMap {
    pub fn new() -> Self {
        PivotMap(BTreeMap::new())
    }

    /// Number of pivots, i.e. the certified lower bound of the rank.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, col: usize, row: usize) {
        self.0.insert(col, row);
    }

    pub fn contains_column(&self, col: usize) -> bool {
        self.0.contains_key(&col)
    }

    pub fn row_of(&self, col: usize) -> Option<usize> {
        self.0.get(&col).copied()
    }

    /// Iterates over `(column, row)` pairs in increasing column order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&c, &r)| (c, r))
    }

    /// Pivot columns indexed by their row.
    pub fn columns_by_row(&self) -> Vec<usize> {
        let mut cols = vec![0; self.len()];
        for (c, r) in self.iter() {
            cols[r] = c;
        }
        cols
    }
}

/// Whether [`row_echelon`] must return (and certify) its transformation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    Discard,
    Certify,
}

/// Output of [`row_echelon`].
#[derive(Debug, Clone)]
pub struct EchelonForm {
    /// The almost reduced echelon form `R`.
    pub reduced: BallMatrix,
    /// The certified invertible `T` with `R = T mat`, if requested.
    pub transformation: Option<BallMatrix>,
    /// The pivot map `p`.
    pub pivots: PivotMap,
}

impl EchelonForm {
    /// Number of pivots.
    pub fn rank(&self) -> usize {
        self.pivots.len()
    }

    /// The rows of `R` that hold a pivot.
    pub fn pivot_rows(&self) -> Vec<BallVector> {
        (0..self.rank()).map(|i| self.reduced.row(i)).collect()
    }
}

/// Computes a certified row echelon form of `mat`.
///
/// # Arguments
/// * `mat`: An `m x n` ball matrix.
/// * `prec_pivots`: Pivots already certified for the first rows of `mat`. Those
///   rows must satisfy property 1 of the module documentation.
/// * `transformation`: Whether to return and certify the transformation `T`.
///
/// # Returns
/// The [`EchelonForm`], or a precision failure if `T` was requested and its
/// determinant cannot be certified nonzero.
pub fn row_echelon(
    mat: &BallMatrix,
    prec_pivots: &PivotMap,
    transformation: Transformation,
) -> Result<EchelonForm, InvSubError> {
    let (m, n) = (mat.nrows(), mat.ncols());
    for (c, r) in prec_pivots.iter() {
        if c >= n || r >= m {
            return Err(InvSubErrorKind::DimensionMismatch {
                expected: m.min(n),
                actual: c.max(r) + 1,
            }
            .into());
        }
    }

    let prec = mat.prec();
    let mut t = BallMatrix::identity(m, prec);
    let mut p = prec_pivots.clone();
    let certified = p.len();

    // Replay the already certified pivot rows against the remaining rows.
    for (j, pj) in prec_pivots.iter() {
        let col = t.apply(&mat.column(j));
        let pivot_row = t.row(pj);
        for i in certified..m {
            let updated = t.row(i).sub_scaled(&col[i], &pivot_row);
            t.set_row(i, &updated);
        }
    }

    for j in 0..n {
        if p.contains_column(j) {
            continue;
        }
        let r = p.len();
        let mut col = t.apply(&mat.column(j));
        let best = (r..m)
            .filter(|&l| col[l].is_nonzero())
            .max_by(|&a, &b| col[a].below_abs().total_cmp(&col[b].below_abs()));

        if let Some(i) = best {
            p.insert(j, r);
            t.swap_rows(i, r);
            col.swap(i, r);

            let normalized = t.row(r).scale(&col[r].inv());
            t.set_row(r, &normalized);
            for l in (r + 1)..m {
                let updated = t.row(l).sub_scaled(&col[l], &normalized);
                t.set_row(l, &updated);
            }
        }
    }

    let mut reduced = &t * mat;
    for (j, pj) in p.iter() {
        reduced[(pj, j)] = ComplexBall::one(prec);
        for i in (pj + 1)..m {
            reduced[(i, j)] = ComplexBall::zero(prec);
        }
    }

    let transformation = match transformation {
        Transformation::Discard => None,
        Transformation::Certify => {
            if t.determinant().contains_zero() {
                return Err(InvSubError::precision("Cannot compute an invertible matrix."));
            }
            Some(t)
        }
    };

    log::trace!("REF of a {}x{} matrix: {} pivots", m, n, p.len());

    Ok(EchelonForm {
        reduced,
        transformation,
        pivots: p,
    })
}

/// Coordinates of `vec` in the basis formed by the pivot rows of an echelon form.
///
/// Row `i` of `rows` holds its pivot in column `pivots.columns_by_row()[i]`, and
/// every later row vanishes exactly in that column, so the coordinates are read
/// off by forward substitution. Returns the coordinates and the residual
/// `vec - sum(c_i rows_i)`, which contains zero when `vec` lies in the span.
pub fn coordinates(
    vec: &BallVector,
    rows: &[BallVector],
    pivots: &PivotMap,
) -> (Vec<ComplexBall>, BallVector) {
    let columns = pivots.columns_by_row();
    let mut residual = vec.clone();
    let mut coeffs = Vec::with_capacity(rows.len());
    for (row, &col) in rows.iter().zip(columns.iter()) {
        let x = residual[col];
        residual = residual.sub_scaled(&x, row);
        coeffs.push(x);
    }
    (coeffs, residual)
}

/// A basis of the right kernel of `mat`, read off its echelon form.
///
/// Columns without a certified pivot are free; each free column yields one
/// kernel vector by back substitution through the pivot rows. The number of
/// vectors is an upper bound of the true nullity, which makes this the kernel
/// of choice on optimistic (radius-inflated) matrices.
pub fn right_kernel(mat: &BallMatrix) -> Result<Vec<BallVector>, InvSubError> {
    let n = mat.ncols();
    let prec = mat.prec();
    let echelon = row_echelon(mat, &PivotMap::new(), Transformation::Discard)?;
    let reduced = &echelon.reduced;
    let columns = echelon.pivots.columns_by_row();

    let free: Vec<usize> = (0..n)
        .filter(|&j| !echelon.pivots.contains_column(j))
        .collect();

    let mut basis = Vec::with_capacity(free.len());
    for &f in &free {
        let mut x = BallVector::unit(n, f, prec);
        for (i, &c) in columns.iter().enumerate().rev() {
            let acc = (0..n)
                .filter(|&k| k != c)
                .fold(ComplexBall::zero(prec), |acc, k| acc + reduced[(i, k)] * x[k]);
            x[c] = -acc;
        }
        basis.push(x);
    }
    Ok(basis)
}
