//! Block decompositions of the ambient space driven by spectral projectors.
//!
//! A [`Splitting`] records a decomposition `C^n = V_1 + ... + V_k` of the
//! space into the generalized eigenspaces of matrices drawn from the algebra
//! generated by a family. It keeps:
//!
//! * `partition`: the block sizes `dim V_j`, summing to `n`;
//! * `basis`: the columns of the change of basis, block by block;
//! * `matrices`: the family expressed in that basis;
//! * `projections`: for every block, the projector onto `V_j` along the other
//!   blocks, expressed in that basis. In exact arithmetic this is the identity
//!   on block `j` and zero elsewhere; the enclosures measure how far from that
//!   the computed basis is.
//!
//! [`Splitting::refine`] splits every block further with the eigenspaces of a
//! new matrix. [`Splitting::check_lines`] and [`Splitting::check_nolines`] look
//! for invariant subspaces through the lines and the common eigenvectors of the
//! blocks.

use super::{
    echelon::{PivotMap, Transformation, coordinates, row_echelon},
    orbit::{orbit, orbit_with_transitions},
    spectral::{gen_eigenspaces, intersect_eigenvectors, optimistic},
};
use crate::{
    ball::{ComplexBall, MAX_PREC},
    error::InvSubError,
    matrix::{BallMatrix, BallOperator, BallVector},
};

/// Outcome of [`Splitting::check_nolines`].
#[derive(Debug, Clone)]
pub enum NoLinesOutcome {
    /// Basis (in original coordinates) of a proper invariant subspace.
    Subspace(Vec<BallVector>),
    /// A matrix of the algebra, in the splitting's basis, that splits some block.
    NeedsRefinement(BallMatrix),
    /// No block gave an answer.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct Splitting {
    prec: u32,
    partition: Vec<usize>,
    basis: BallMatrix,
    matrices: Vec<BallMatrix>,
    projections: Vec<BallMatrix>,
}

impl Splitting {
    /// The trivial splitting: one block, identity basis.
    pub fn new(family: &[BallMatrix]) -> Result<Self, InvSubError> {
        let n = super::algebra::validate_family(family)?;
        let prec = family.iter().map(BallMatrix::prec).min().unwrap_or(MAX_PREC);
        Ok(Splitting {
            prec,
            partition: vec![n],
            basis: BallMatrix::identity(n, prec),
            matrices: family.to_vec(),
            projections: vec![BallMatrix::identity(n, prec)],
        })
    }

    pub fn dim(&self) -> usize {
        self.basis.nrows()
    }

    pub fn partition(&self) -> &[usize] {
        &self.partition
    }

    pub fn basis(&self) -> &BallMatrix {
        &self.basis
    }

    pub fn matrices(&self) -> &[BallMatrix] {
        &self.matrices
    }

    pub fn projections(&self) -> &[BallMatrix] {
        &self.projections
    }

    /// Index of the first coordinate of each block.
    pub fn block_offsets(&self) -> Vec<usize> {
        self.partition
            .iter()
            .scan(0, |start, &size| {
                let offset = *start;
                *start += size;
                Some(offset)
            })
            .collect()
    }

    /// Splits every block along the generalized eigenspaces of the block's
    /// compression of `mat`, which must be given in the splitting's basis.
    ///
    /// Fails with a precision error when an eigenspace dimension or the new
    /// change of basis cannot be certified.
    pub fn refine(self, mat: &BallMatrix) -> Result<Self, InvSubError> {
        let mut partition = Vec::new();
        let mut projections = Vec::new();
        let mut blocks = Vec::with_capacity(self.partition.len());

        for (j, (&size, start)) in self
            .partition
            .iter()
            .zip(self.block_offsets())
            .enumerate()
        {
            let compressed = mat.submatrix(start, start, size, size);
            let spaces = gen_eigenspaces(&compressed)?;
            let parent = &self.projections[j];
            let mut columns = Vec::with_capacity(size);
            for space in spaces {
                partition.push(space.multiplicity);
                let f = space.projector.evaluate(mat);
                projections.push(&(parent * &f) * parent);
                columns.extend(space.basis);
            }
            blocks.push(BallMatrix::from_rows(&columns, size)?.transpose());
        }

        let t = BallMatrix::block_diag(&blocks, self.prec);
        let t_inv = t.inverse()?;
        let conjugate = |m: &BallMatrix| &(&t_inv * m) * &t;

        log::debug!("refined partition {:?} -> {:?}", self.partition, partition);

        Ok(Splitting {
            prec: self.prec,
            basis: &self.basis * &t,
            matrices: self.matrices.iter().map(conjugate).collect(),
            projections: projections.iter().map(conjugate).collect(),
            partition,
        })
    }

    /// Tries the line spanned by every one-dimensional block.
    ///
    /// The projection onto a line block `s` equals `E_ss` up to an error bounded
    /// by the largest row sum of `P - E_ss`. The ball `e_s + err` therefore
    /// encloses the projected line, and if its orbit is a proper subspace that
    /// subspace is returned, in original coordinates.
    pub fn check_lines(&self) -> Result<Option<Vec<BallVector>>, InvSubError> {
        let n = self.dim();
        for (j, (&size, s)) in self.partition.iter().zip(self.block_offsets()).enumerate() {
            if size != 1 {
                continue;
            }
            let mut deviation = self.projections[j].clone();
            deviation[(s, s)] = deviation[(s, s)] - ComplexBall::one(self.prec);
            let err = (0..n)
                .map(|i| {
                    deviation
                        .row_slice(i)
                        .iter()
                        .map(ComplexBall::above_abs)
                        .sum::<f64>()
                })
                .fold(0.0, f64::max);
            if !(err <= 1.0) {
                return Err(InvSubError::precision(format!(
                    "Projection onto line block {j} is off by {err:e}."
                )));
            }

            let line = BallVector::unit(n, s, self.prec).add_error(err);
            let orbit = orbit(&self.matrices, &line)?;
            log::trace!("line block {} has an orbit of dimension {}", j, orbit.dim());
            if orbit.dim() < n {
                self.verify(&orbit.basis)?;
                return Ok(Some(self.to_original(&orbit.basis)));
            }
        }
        Ok(None)
    }

    /// Searches the blocks of dimension at least two for invariant subspaces
    /// generated by common eigenvectors, working on the optimistic view.
    ///
    /// For every such block, the common eigenvectors `K` of the compressed
    /// family are computed, giving up on the block as soon as a compression
    /// shows more than one eigenvalue. While `K` is non-empty, the orbit of its
    /// first vector is either proper (and returned) or contains a second
    /// direction `v1` of the block, and the operator `M` of the orbit mapping
    /// the first vector to `v1` either splits the block (and is returned for
    /// refinement) or shrinks `K`.
    pub fn check_nolines(&self) -> Result<NoLinesOutcome, InvSubError> {
        let (view, eps) = self.optimistic_view()?;
        let n = self.dim();

        for (&size, s) in self.partition.iter().zip(self.block_offsets()) {
            if size < 2 {
                continue;
            }
            let compress = |m: &BallMatrix| m.submatrix(s, s, size, size);

            let mut kernel: Option<Vec<BallVector>> = Some(
                (0..size)
                    .map(|i| BallVector::unit(size, i, self.prec))
                    .collect(),
            );
            for m in &self.matrices {
                let Some(current) = kernel.take() else { break };
                kernel = intersect_eigenvectors(&current, &compress(m), eps)?;
            }
            let Some(mut kernel) = kernel else {
                log::trace!("block at {} has several eigenvalues; skipped", s);
                continue;
            };

            while let Some(first) = kernel.first() {
                let vec0 = embed(first, s, n);
                let orbit = orbit_with_transitions(&view, &vec0)?;
                if orbit.dim() < n {
                    self.verify(&orbit.basis)?;
                    return Ok(NoLinesOutcome::Subspace(self.to_original(&orbit.basis)));
                }

                let mut vec1 = BallVector::unit(n, s, self.prec);
                let pair = BallMatrix::from_rows(&[vec0.clone(), vec1.clone()], n)?;
                if row_echelon(&pair, &PivotMap::new(), Transformation::Discard)?.rank() < 2 {
                    vec1 = BallVector::unit(n, s + 1, self.prec);
                }
                let (weights, _) = coordinates(&vec1, &orbit.basis, &orbit.pivots);
                let Some(program) = orbit.transitions.as_ref() else {
                    break;
                };
                let coefficients: Vec<ComplexBall> = program
                    .combine(&weights)
                    .iter()
                    .map(|c| ComplexBall::exact(c.mid(), self.prec))
                    .collect();
                let candidate = program.evaluate(&self.matrices, &coefficients)?;

                match intersect_eigenvectors(&kernel, &compress(&candidate), eps)? {
                    None => return Ok(NoLinesOutcome::NeedsRefinement(candidate)),
                    Some(next) if next.len() < kernel.len() => kernel = next,
                    Some(_) => {
                        log::warn!("common eigenvectors of block at {} did not shrink", s);
                        break;
                    }
                }
            }
        }
        Ok(NoLinesOutcome::Exhausted)
    }

    /// The family with every entry replaced by its midpoint and a relative
    /// tolerance `eps = 2^(-3 prec / 8)`.
    ///
    /// Fails with a precision error once the family or the basis has lost more
    /// than half of the working precision.
    pub fn optimistic_view(&self) -> Result<(Vec<BallMatrix>, f64), InvSubError> {
        let accuracy = self
            .matrices
            .iter()
            .map(BallMatrix::accuracy)
            .chain(std::iter::once(self.basis.accuracy()))
            .min()
            .unwrap_or(i64::from(self.prec));
        if 2 * accuracy < i64::from(self.prec) {
            return Err(InvSubError::precision("Losing too much precision to continue."));
        }
        let eps = (-3.0 * f64::from(self.prec) / 8.0).exp2();
        Ok((
            self.matrices.iter().map(|m| optimistic(m, eps)).collect(),
            eps,
        ))
    }

    fn to_original(&self, vectors: &[BallVector]) -> Vec<BallVector> {
        vectors.iter().map(|v| self.basis.apply(v)).collect()
    }

    /// Rejects a candidate subspace (in the splitting's basis) that a
    /// matrix of the family visibly moves out of its span.
    fn verify(&self, vectors: &[BallVector]) -> Result<(), InvSubError> {
        let (view, _) = self.optimistic_view()?;
        let rows: Vec<BallVector> = vectors.iter().map(BallVector::centered).collect();
        let images: Vec<BallVector> = view
            .iter()
            .flat_map(|m| rows.iter().map(move |v| m.apply(v)))
            .collect();
        let n = self.dim();
        let stacked = BallMatrix::from_rows(&rows, n)?.stack(&images);
        let rank = row_echelon(&stacked, &PivotMap::new(), Transformation::Discard)?.rank();
        if rank > vectors.len() {
            return Err(InvSubError::precision(
                "Candidate subspace is not invariant at the working precision.",
            ));
        }
        Ok(())
    }
}

/// `v` placed at coordinates `start..start + v.len()` of a length-`n` vector.
fn embed(v: &BallVector, start: usize, n: usize) -> BallVector {
    let mut out = BallVector::zeros(n, v.prec());
    for (k, x) in v.iter().enumerate() {
        out[start + k] = *x;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_matrix(rows: &[&[i64]]) -> BallMatrix {
        BallMatrix::from_fn(rows.len(), rows[0].len(), |i, j| {
            ComplexBall::from_i64(rows[i][j], MAX_PREC)
        })
    }

    fn conjugate(p: &BallMatrix, mat: &BallMatrix) -> BallMatrix {
        let p_inv = p.inverse().unwrap();
        &(&p_inv * mat) * p
    }

    fn sorted(mut v: Vec<usize>) -> Vec<usize> {
        v.sort_unstable();
        v
    }

    #[test]
    fn test_refine_follows_eigenspaces() {
        let p = int_matrix(&[&[1, 1, 0], &[0, 1, 1], &[1, 0, 2]]);
        let a = conjugate(&p, &int_matrix(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 5]]));
        let split = Splitting::new(&[a.clone()]).unwrap().refine(&a).unwrap();
        assert_eq!(sorted(split.partition().to_vec()), vec![1, 2]);
        assert_eq!(split.block_offsets(), vec![0, split.partition()[0]]);

        // In the new basis the family is block diagonal.
        let m = &split.matrices()[0];
        let (first, second) = (split.partition()[0], split.partition()[1]);
        for i in 0..first {
            for j in first..first + second {
                assert!(m[(i, j)].above_abs() < 1e-8);
                assert!(m[(j, i)].above_abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_check_lines_finds_common_eigenvector() {
        // e_1 is a common eigenvector of both matrices.
        let a = int_matrix(&[&[2, 1, 1], &[0, 3, 1], &[0, 1, 4]]);
        let b = int_matrix(&[&[1, 2, 0], &[0, 0, 1], &[0, 1, 0]]);
        let split = Splitting::new(&[a.clone(), b]).unwrap().refine(&a).unwrap();
        assert_eq!(split.partition().len(), 3);
        let subspace = split.check_lines().unwrap().expect("eigenline expected");
        assert_eq!(subspace.len(), 1);
        let v = &subspace[0];
        assert!(v[0].is_nonzero());
        assert!(v[1].above_abs() < 1e-8 * v[0].below_abs());
        assert!(v[2].above_abs() < 1e-8 * v[0].below_abs());
    }

    #[test]
    fn test_check_lines_rejects_irreducible_pair() {
        let a = int_matrix(&[&[1, 0, 0], &[0, 2, 0], &[0, 0, 3]]);
        let b = int_matrix(&[&[1, 1, 1], &[1, 1, 1], &[1, 1, 1]]);
        let split = Splitting::new(&[a.clone(), b]).unwrap().refine(&a).unwrap();
        assert!(split.check_lines().unwrap().is_none());
    }

    #[test]
    fn test_check_nolines_on_scalar_block() {
        // A scalar in the first two coordinates and a shared line e_1.
        let a = int_matrix(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 2]]);
        let b = int_matrix(&[&[1, 1, 0], &[0, 1, 0], &[0, 0, 3]]);
        let split = Splitting::new(&[a.clone(), b]).unwrap().refine(&a).unwrap();
        match split.check_nolines().unwrap() {
            NoLinesOutcome::Subspace(basis) => {
                assert!(basis.len() < 3);
                assert!(!basis.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_check_nolines_skips_blocks_with_several_eigenvalues() {
        let a = int_matrix(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 1]]);
        let b = int_matrix(&[&[0, 1, 0], &[1, 0, 1], &[0, 1, 0]]);
        let c = int_matrix(&[&[1, 0, 0], &[0, 2, 0], &[0, 0, 3]]);
        let split = Splitting::new(&[a, b, c]).unwrap();
        assert!(matches!(
            split.check_nolines().unwrap(),
            NoLinesOutcome::Exhausted
        ));
    }

    #[test]
    fn test_check_nolines_asks_for_refinement() {
        // Both compressions to the first block are the identity, but the
        // word b^2 - 2b swaps e_1 and e_2.
        let a = int_matrix(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 2]]);
        let b = int_matrix(&[&[1, 0, 1], &[0, 1, 1], &[1, 1, 1]]);
        let split = Splitting {
            prec: MAX_PREC,
            partition: vec![2, 1],
            basis: BallMatrix::identity(3, MAX_PREC),
            matrices: vec![a, b],
            projections: vec![
                int_matrix(&[&[1, 0, 0], &[0, 1, 0], &[0, 0, 0]]),
                int_matrix(&[&[0, 0, 0], &[0, 0, 0], &[0, 0, 1]]),
            ],
        };
        let NoLinesOutcome::NeedsRefinement(m) = split.check_nolines().unwrap() else {
            panic!("refinement expected");
        };
        assert!(m[(0, 1)].contains(num_complex::Complex64::new(1.0, 0.0)));
        assert!(m[(0, 0)].contains_zero());

        let refined = split.refine(&m).unwrap();
        assert_eq!(refined.partition(), &[1, 1, 1]);
    }
}
