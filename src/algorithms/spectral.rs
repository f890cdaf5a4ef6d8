//! Spectral helpers: clustered eigenvalues, spectral projectors and
//! generalized eigenspaces of ball matrices.
//!
//! Eigenvalues are approximated on the midpoint matrix with [`faer`] and
//! grouped by single-linkage clustering. The clustering tolerance shrinks with
//! the accuracy of the matrix, and two clusters that are too close to be told
//! apart raise a precision failure rather than a guess.
//!
//! The projector onto the generalized eigenspace of a cluster is represented as
//! the polynomial
//!
//! ```text
//! f(x) = Q(x) * g(x - lambda),   Q(x) = prod_{mu != lambda} (x - mu)^m_mu
//! ```
//!
//! where `g` is the Taylor inverse of `Q(lambda + t)` modulo `t^m`. Then
//! `f = 1 mod (x - lambda)^m` and `f = 0 mod (x - mu)^m_mu`, so `f(A)` is the
//! spectral projector of any matrix `A` with that spectrum, and `f` can be
//! applied to other matrices than the one it was computed from.

use super::echelon::{PivotMap, Transformation, right_kernel, row_echelon};
use crate::{
    ball::ComplexBall,
    error::{InvSubError, InvSubErrorKind},
    matrix::{BallMatrix, BallOperator, BallVector},
};
use num_complex::Complex64;

/// Clustering tolerance is `scale * 2^(-accuracy * CLUSTER_EXPONENT)`.
const CLUSTER_EXPONENT: f64 = 0.25;

/// Distinct clusters must be at least this many tolerances apart.
const AMBIGUITY_FACTOR: f64 = 4.0;

/// Below this many accurate bits, eigenvalues are not grouped at all.
const MIN_CLUSTER_ACCURACY: i64 = 4;

/// A group of numerically coincident eigenvalues.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenCluster {
    pub center: Complex64,
    pub multiplicity: usize,
}

fn ensure_square(mat: &BallMatrix) -> Result<(), InvSubError> {
    if mat.is_square() {
        Ok(())
    } else {
        Err(InvSubErrorKind::NotSquare {
            nrows: mat.nrows(),
            ncols: mat.ncols(),
        }
        .into())
    }
}

fn approximate_eigenvalues(mat: &BallMatrix) -> Result<Vec<Complex64>, InvSubError> {
    if mat.nrows() == 1 {
        return Ok(vec![mat[(0, 0)].mid()]);
    }
    let values = mat
        .midpoint()
        .eigenvalues()
        .map_err(InvSubErrorKind::EigenSolver)?;
    Ok(values
        .into_iter()
        .map(|z| Complex64::new(z.re, z.im))
        .collect())
}

/// Eigenvalues of `mat` grouped into clusters, with multiplicities summing to `n`.
pub fn eigen_clusters(mat: &BallMatrix) -> Result<Vec<EigenCluster>, InvSubError> {
    ensure_square(mat)?;
    let n = mat.nrows();
    if n == 0 {
        return Ok(Vec::new());
    }
    let accuracy = mat.accuracy().min(i64::from(mat.prec()));
    if accuracy < MIN_CLUSTER_ACCURACY {
        return Err(InvSubError::precision(
            "Matrix is too inaccurate to separate its eigenvalues.",
        ));
    }

    let values = approximate_eigenvalues(mat)?;
    let scale = mat.max_abs().max(1.0);
    let tol = scale * (-(accuracy as f64) * CLUSTER_EXPONENT).exp2();

    let mut label = vec![usize::MAX; values.len()];
    let mut members: Vec<Vec<usize>> = Vec::new();
    for start in 0..values.len() {
        if label[start] != usize::MAX {
            continue;
        }
        let id = members.len();
        label[start] = id;
        let mut group = vec![start];
        let mut frontier = vec![start];
        while let Some(k) = frontier.pop() {
            for j in 0..values.len() {
                if label[j] == usize::MAX && (values[k] - values[j]).norm() <= tol {
                    label[j] = id;
                    group.push(j);
                    frontier.push(j);
                }
            }
        }
        members.push(group);
    }

    for i in 0..values.len() {
        for j in (i + 1)..values.len() {
            if label[i] != label[j] && (values[i] - values[j]).norm() <= AMBIGUITY_FACTOR * tol {
                return Err(InvSubError::precision(format!(
                    "Ambiguous eigenvalue grouping at tolerance {tol:e}."
                )));
            }
        }
    }

    let clusters: Vec<EigenCluster> = members
        .into_iter()
        .map(|group| {
            let sum: Complex64 = group.iter().map(|&k| values[k]).sum();
            EigenCluster {
                center: sum / group.len() as f64,
                multiplicity: group.len(),
            }
        })
        .collect();
    log::trace!("eigenvalue clusters at tolerance {:e}: {:?}", tol, clusters);
    Ok(clusters)
}

/// Polynomial spectral projector of one eigenvalue cluster.
#[derive(Debug, Clone)]
pub struct SpectralProjector {
    eigenvalue: ComplexBall,
    others: Vec<(ComplexBall, usize)>,
    correction: Vec<ComplexBall>,
}

impl SpectralProjector {
    fn new(clusters: &[EigenCluster], index: usize, prec: u32) -> Result<Self, InvSubError> {
        let m = clusters[index].multiplicity;
        let eigenvalue = ComplexBall::exact(clusters[index].center, prec);
        let others: Vec<(ComplexBall, usize)> = clusters
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != index)
            .map(|(_, c)| (ComplexBall::exact(c.center, prec), c.multiplicity))
            .collect();

        // Truncated series of Q(lambda + t).
        let mut q = vec![ComplexBall::zero(prec); m];
        q[0] = ComplexBall::one(prec);
        for (mu, mult) in &others {
            let d = eigenvalue - *mu;
            for _ in 0..*mult {
                for k in (0..m).rev() {
                    let lower = if k > 0 { q[k - 1] } else { ComplexBall::zero(prec) };
                    q[k] = d * q[k] + lower;
                }
            }
        }
        if !q[0].is_nonzero() {
            return Err(InvSubError::precision(
                "Cannot separate an eigenvalue cluster from the rest of the spectrum.",
            ));
        }

        let q0_inv = q[0].inv();
        let mut correction = vec![q0_inv];
        for k in 1..m {
            let acc = (1..=k).fold(ComplexBall::zero(prec), |acc, i| acc + q[i] * correction[k - i]);
            correction.push(-(acc * q0_inv));
        }

        Ok(SpectralProjector {
            eigenvalue,
            others,
            correction,
        })
    }

    /// The cluster's eigenvalue, as an exact ball.
    pub fn eigenvalue(&self) -> ComplexBall {
        self.eigenvalue
    }

    /// Evaluates the projector polynomial at `mat`.
    pub fn evaluate(&self, mat: &BallMatrix) -> BallMatrix {
        let n = mat.nrows();
        let prec = mat.prec();
        let identity = BallMatrix::identity(n, prec);
        let shifted = mat.shift(&self.eigenvalue);

        let mut g = identity.scale(&self.correction[self.correction.len() - 1]);
        for c in self.correction.iter().rev().skip(1) {
            g = (&g * &shifted).add(&identity.scale(c));
        }

        let mut q = identity;
        for (mu, mult) in &self.others {
            let factor = mat.shift(mu);
            for _ in 0..*mult {
                q = &q * &factor;
            }
        }
        &q * &g
    }
}

/// A generalized eigenspace: the range of its spectral projector.
#[derive(Debug, Clone)]
pub struct GenEigenspace {
    pub multiplicity: usize,
    /// `multiplicity` independent vectors spanning the space.
    pub basis: Vec<BallVector>,
    pub projector: SpectralProjector,
}

/// Generalized eigenspaces of `mat`, one per eigenvalue cluster.
///
/// The bases together have `n` vectors. Fails with a precision error when a
/// projector's rank cannot be certified to equal its cluster's multiplicity.
pub fn gen_eigenspaces(mat: &BallMatrix) -> Result<Vec<GenEigenspace>, InvSubError> {
    let clusters = eigen_clusters(mat)?;
    let n = mat.nrows();
    let prec = mat.prec();

    let mut spaces = Vec::with_capacity(clusters.len());
    for (index, cluster) in clusters.iter().enumerate() {
        let projector = SpectralProjector::new(&clusters, index, prec)?;
        let range = if clusters.len() == 1 {
            (0..n).map(|i| BallVector::unit(n, i, prec)).collect()
        } else {
            let p = projector.evaluate(mat);
            let form = row_echelon(&p.transpose(), &PivotMap::new(), Transformation::Discard)?;
            if form.rank() < cluster.multiplicity {
                return Err(InvSubError::precision(
                    "Cannot certify the dimension of a generalized eigenspace.",
                ));
            }
            form.reduced.top_rows(cluster.multiplicity).rows()
        };
        spaces.push(GenEigenspace {
            multiplicity: cluster.multiplicity,
            basis: range,
            projector,
        });
    }
    Ok(spaces)
}

/// Replaces every entry of `mat` by its midpoint with absolute radius
/// `eps * max(1, |mat|)`: the matrix an optimistic numerical computation
/// would see.
pub fn optimistic(mat: &BallMatrix, eps: f64) -> BallMatrix {
    mat.centered().add_error(eps * mat.max_abs().max(1.0))
}

/// Intersects the span of `kernel` with the eigenvectors of `mat`.
///
/// Returns `None` when `mat` has more than one eigenvalue cluster. Otherwise the
/// kernel of `mat - lambda` restricted to the span is computed on the optimistic
/// view at `eps`, and returned in echelon form. An empty `kernel` stays empty.
pub fn intersect_eigenvectors(
    kernel: &[BallVector],
    mat: &BallMatrix,
    eps: f64,
) -> Result<Option<Vec<BallVector>>, InvSubError> {
    let clusters = eigen_clusters(mat)?;
    if clusters.len() > 1 {
        return Ok(None);
    }
    if kernel.is_empty() || clusters.is_empty() {
        return Ok(Some(Vec::new()));
    }

    let n = mat.nrows();
    let lambda = ComplexBall::exact(clusters[0].center, mat.prec());
    let shifted = optimistic(&mat.shift(&lambda), eps);
    let span = BallMatrix::from_rows(kernel, n)?.transpose();
    let restricted = &shifted * &span;

    let vectors: Vec<BallVector> = right_kernel(&restricted)?
        .iter()
        .map(|y| span.apply(y))
        .collect();
    if vectors.is_empty() {
        return Ok(Some(vectors));
    }
    let form = row_echelon(
        &BallMatrix::from_rows(&vectors, n)?,
        &PivotMap::new(),
        Transformation::Discard,
    )?;
    Ok(Some(form.pivot_rows()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ball::MAX_PREC;

    fn int_matrix(rows: &[&[i64]]) -> BallMatrix {
        BallMatrix::from_fn(rows.len(), rows[0].len(), |i, j| {
            ComplexBall::from_i64(rows[i][j], MAX_PREC)
        })
    }

    fn conjugate(mat: &BallMatrix) -> BallMatrix {
        let p = int_matrix(&[&[1, 1, 0], &[0, 1, 1], &[1, 0, 2]]);
        let p_inv = p.inverse().unwrap();
        &(&p_inv * mat) * &p
    }

    fn multiplicities(clusters: &[EigenCluster]) -> Vec<usize> {
        let mut m: Vec<usize> = clusters.iter().map(|c| c.multiplicity).collect();
        m.sort_unstable();
        m
    }

    #[test]
    fn test_repeated_eigenvalue_forms_one_cluster() {
        let mat = conjugate(&int_matrix(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 3]]));
        assert_eq!(multiplicities(&eigen_clusters(&mat).unwrap()), vec![1, 2]);
    }

    #[test]
    fn test_jordan_block_is_one_cluster() {
        let mat = conjugate(&int_matrix(&[&[2, 1, 0], &[0, 2, 1], &[0, 0, 2]]));
        let clusters = eigen_clusters(&mat).unwrap();
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].center - Complex64::new(2.0, 0.0)).norm() < 1e-3);
    }

    #[test]
    fn test_near_coincident_eigenvalues_are_ambiguous() {
        let delta = (-12.0f64).exp2();
        let mat = BallMatrix::from_fn(2, 2, |i, j| {
            let v = if i == 1 && j == 1 { delta } else { 0.0 };
            ComplexBall::from_f64(v, MAX_PREC)
        });
        let err = eigen_clusters(&mat).unwrap_err();
        assert!(err.is_precision_failure());
    }

    #[test]
    fn test_projectors_split_the_identity() {
        let mat = conjugate(&int_matrix(&[&[1, 1, 0], &[0, 1, 0], &[0, 0, 4]]));
        let spaces = gen_eigenspaces(&mat).unwrap();
        assert_eq!(spaces.len(), 2);
        assert_eq!(spaces.iter().map(|s| s.basis.len()).sum::<usize>(), 3);

        let total = spaces
            .iter()
            .fold(BallMatrix::zeros(3, 3, MAX_PREC), |acc, s| {
                acc.add(&s.projector.evaluate(&mat))
            });
        let identity = BallMatrix::identity(3, MAX_PREC);
        for i in 0..3 {
            for j in 0..3 {
                assert!((total[(i, j)].mid() - identity[(i, j)].mid()).norm() < 1e-9);
            }
        }

        // Each basis vector stays in its eigenspace under the matrix.
        for space in &spaces {
            let p = space.projector.evaluate(&mat);
            for v in &space.basis {
                let image = mat.apply(v);
                let projected = p.apply(&image);
                for k in 0..3 {
                    assert!((image[k].mid() - projected[k].mid()).norm() < 1e-8);
                }
            }
        }
    }

    #[test]
    fn test_intersect_eigenvectors_of_a_jordan_block() {
        let mat = int_matrix(&[&[1, 1, 0], &[0, 1, 0], &[0, 0, 1]]);
        let all: Vec<BallVector> = (0..3).map(|i| BallVector::unit(3, i, MAX_PREC)).collect();
        let eps = (-20.0f64).exp2();
        let lines = intersect_eigenvectors(&all, &mat, eps).unwrap().unwrap();
        assert_eq!(lines.len(), 2);
        for v in &lines {
            assert!(v[1].contains_zero());
        }

        let split = int_matrix(&[&[1, 0, 0], &[0, 2, 0], &[0, 0, 2]]);
        assert!(intersect_eigenvectors(&all, &split, eps).unwrap().is_none());
    }
}
