//! The unital algebra generated by a family of square matrices.
//!
//! The span is closed under products exactly like [`super::orbit::orbit`]
//! closes a vector under the family: every round multiplies all known elements
//! by the ones found in the previous round, until nothing new appears or the
//! span reaches `n^2`. The identity is part of the seed, so the result is the
//! unital algebra.
//!
//! The elements kept are the products themselves, rescaled by powers of two.
//! Matrices are flattened row-major into vectors of length `n^2` only to test
//! a candidate for independence against an echelon form of the known ones;
//! the echelon rows never enter a product, so the elimination error of one
//! round does not compound into the next.

use super::echelon::{PivotMap, Transformation, row_echelon};
use crate::{
    ball::{ComplexBall, MAX_PREC},
    error::{InvSubError, InvSubErrorKind},
    matrix::{BallMatrix, BallVector},
};

/// Checks that `family` is a non-empty list of square matrices of one dimension.
pub(crate) fn validate_family(family: &[BallMatrix]) -> Result<usize, InvSubError> {
    let first = family.first().ok_or(InvSubErrorKind::EmptyFamily)?;
    if !first.is_square() {
        return Err(InvSubErrorKind::NotSquare {
            nrows: first.nrows(),
            ncols: first.ncols(),
        }
        .into());
    }
    let n = first.nrows();
    for m in &family[1..] {
        if !m.is_square() {
            return Err(InvSubErrorKind::NotSquare {
                nrows: m.nrows(),
                ncols: m.ncols(),
            }
            .into());
        }
        if m.nrows() != n {
            return Err(InvSubErrorKind::DimensionMismatch {
                expected: n,
                actual: m.nrows(),
            }
            .into());
        }
    }
    Ok(n)
}

/// Linearly independent algebra elements, with an echelon form of their span.
struct AlgebraClosure {
    width: usize,
    elements: Vec<BallMatrix>,
    rows: Vec<BallVector>,
    pivots: PivotMap,
}

impl AlgebraClosure {
    fn new(width: usize) -> Self {
        AlgebraClosure {
            width,
            elements: Vec::new(),
            rows: Vec::new(),
            pivots: PivotMap::new(),
        }
    }

    fn dim(&self) -> usize {
        self.elements.len()
    }

    /// Keeps `element` if it certifiably adds a pivot to the echelon form.
    fn try_push(&mut self, element: BallMatrix) -> Result<bool, InvSubError> {
        let element = rescaled(element);
        let mut rows = self.rows.clone();
        rows.push(element.flatten());
        let form = row_echelon(
            &BallMatrix::from_rows(&rows, self.width)?,
            &self.pivots,
            Transformation::Discard,
        )?;
        if form.rank() == self.pivots.len() {
            return Ok(false);
        }
        self.rows = form.pivot_rows();
        self.pivots = form.pivots;
        self.elements.push(element);
        Ok(true)
    }
}

/// `mat` times the power of two that brings its largest entry closest to 1.
fn rescaled(mat: BallMatrix) -> BallMatrix {
    let size = mat.max_abs();
    if !(size.is_finite() && size > 0.0) {
        return mat;
    }
    let shift = size.log2().round();
    if shift == 0.0 {
        return mat;
    }
    let factor = ComplexBall::from_f64((-shift).exp2(), mat.prec());
    mat.scale(&factor)
}

/// Returns a basis of the algebra generated by `family` and the identity.
///
/// Every returned element is a scalar multiple of a product of matrices of the
/// family, and the elements are linearly independent. A basis of length `n^2`
/// proves the family acts irreducibly.
pub fn generated_algebra(family: &[BallMatrix]) -> Result<Vec<BallMatrix>, InvSubError> {
    let n = validate_family(family)?;
    let full = n * n;
    let prec = family
        .iter()
        .map(BallMatrix::prec)
        .min()
        .unwrap_or(MAX_PREC);

    let mut closure = AlgebraClosure::new(full);
    closure.try_push(BallMatrix::identity(n, prec))?;
    for m in family {
        closure.try_push(m.clone())?;
    }
    let mut new = 0..closure.dim();

    while !new.is_empty() && closure.dim() < full {
        let known = closure.dim();
        'products: for left in 0..known {
            for right in new.clone() {
                if closure.dim() == full {
                    break 'products;
                }
                let product = &closure.elements[left] * &closure.elements[right];
                closure.try_push(product)?;
            }
        }
        log::trace!("algebra closure: dimension {} -> {}", known, closure.dim());
        new = known..closure.dim();
    }

    log::debug!("generated algebra has dimension {} of {}", closure.dim(), full);
    Ok(closure.elements)
}
