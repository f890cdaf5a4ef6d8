//! Helpers shared by the integration tests.

use anyhow::{Result, anyhow, ensure};
use faer::{Mat, c64};
use invsub::{
    SearchOutcome,
    matrix::{BallMatrix, BallVector},
    utils::family_loader::Expected,
};

/// Relative size below which a singular value counts as zero. Answers may be
/// certified at 16 bits, whose midpoints are only accurate to about `1e-5`.
const RANK_TOLERANCE: f64 = 1e-3;

fn sorted_singular_values(mat: &Mat<c64>) -> Result<Vec<f64>> {
    let mut values = mat
        .singular_values()
        .map_err(|e| anyhow!("SVD failed: {:?}", e))?;
    values.sort_by(|a, b| b.total_cmp(a));
    Ok(values)
}

/// Checks on the midpoints that `basis` is independent and that every matrix
/// of `family` maps its span into itself.
pub fn ensure_invariant(family: &[BallMatrix], basis: &[BallVector]) -> Result<()> {
    let n = family[0].nrows();
    let d = basis.len();
    ensure!(d > 0 && d < n, "subspace of dimension {} is not proper", d);

    let b = BallMatrix::from_rows(basis, n)?.transpose().midpoint();
    let sigma = sorted_singular_values(&b)?;
    ensure!(
        sigma[d - 1] > RANK_TOLERANCE * sigma[0],
        "basis is numerically dependent: {:?}",
        sigma
    );

    for (k, m) in family.iter().enumerate() {
        let image = &m.midpoint() * &b;
        let joined = Mat::from_fn(n, 2 * d, |i, j| if j < d { b[(i, j)] } else { image[(i, j - d)] });
        let sigma = sorted_singular_values(&joined)?;
        ensure!(
            sigma[d] <= RANK_TOLERANCE * sigma[0],
            "matrix {} moves the subspace: singular values {:?}",
            k,
            sigma
        );
    }
    Ok(())
}

/// Checks an outcome against the known answer, and its subspace for invariance.
pub fn ensure_outcome(
    family: &[BallMatrix],
    outcome: &SearchOutcome,
    expected: Expected,
) -> Result<()> {
    match (outcome, expected) {
        (SearchOutcome::Irreducible, Expected::Irreducible) => Ok(()),
        (SearchOutcome::Reducible(basis), Expected::Reducible { dimension }) => {
            if let Some(d) = dimension {
                ensure!(basis.len() == d, "expected dimension {}, got {}", d, basis.len());
            }
            ensure_invariant(family, basis)
        }
        (outcome, expected) => Err(anyhow!("expected {:?}, got {:?}", expected, outcome)),
    }
}
