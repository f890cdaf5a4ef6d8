//! Smallest invariant subspace containing a vector.
//!
//! [`orbit`] grows an echelon basis by applying every matrix of the family to
//! the vectors found in the previous round, until no new independent vector
//! appears or the whole space is reached. Let `b` be its output for a family
//! `mats` and a vector `vec`. For every selection of matrices enclosed by
//! `mats` and every vector enclosed by `vec`, there are vectors enclosed by `b`
//! which are linearly independent and span a subspace of the smallest invariant
//! subspace containing the vector. If the inputs are precise enough, that span
//! is the whole invariant subspace. In particular, an orbit of dimension `n`
//! proves that the vector generates the entire space.
//!
//! [`orbit_with_transitions`] additionally records, for every basis vector, an
//! operator realizing it as `operator(vec)`. The operators are polynomials in
//! the family, stored as a [`TransitionProgram`]: a list of generator words and
//! one coefficient vector per basis vector. The program is plain data, so it can
//! be serialized and replayed against the same family at another precision.

use super::echelon::{PivotMap, Transformation, row_echelon};
use crate::{
    ball::{ComplexBall, MAX_PREC},
    error::{InvSubError, InvSubErrorKind},
    matrix::{BallMatrix, BallOperator, BallVector},
};
use serde::{Deserialize, Serialize};

/// A generator word of a [`TransitionProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generator {
    /// The identity.
    Seed,
    /// `family[matrix] * operator(operand)`.
    Apply { matrix: usize, operand: usize },
}

/// Transition operators of an orbit, as a straight-line program over the family.
///
/// Operator `i` is `sum_g coefficients[i][g] * G_g`, where `G_g` is the matrix
/// of generator `g`. A generator only refers to operators whose coefficient
/// vectors were complete when it was created, so the program can be evaluated
/// in a single forward pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionProgram {
    generators: Vec<Generator>,
    operators: Vec<Vec<ComplexBall>>,
}

impl TransitionProgram {
    fn empty() -> Self {
        TransitionProgram {
            generators: Vec::new(),
            operators: Vec::new(),
        }
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    /// Number of operators (one per basis vector of the orbit).
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Coefficients of operator `i` over the generators.
    pub fn operator(&self, i: usize) -> &[ComplexBall] {
        &self.operators[i]
    }

    /// Coefficients over the generators of `sum_i weights[i] * operator(i)`.
    pub fn combine(&self, weights: &[ComplexBall]) -> Vec<ComplexBall> {
        let prec = weights.iter().map(ComplexBall::prec).min().unwrap_or(MAX_PREC);
        let mut out = vec![ComplexBall::zero(prec); self.generators.len()];
        for (w, op) in weights.iter().zip(self.operators.iter()) {
            for (acc, c) in out.iter_mut().zip(op.iter()) {
                *acc = *acc + *w * *c;
            }
        }
        out
    }

    fn check_family(&self, family: &[BallMatrix]) -> Result<(), InvSubError> {
        let needed = self
            .generators
            .iter()
            .filter_map(|g| match g {
                Generator::Apply { matrix, .. } => Some(matrix + 1),
                Generator::Seed => None,
            })
            .max()
            .unwrap_or(0);
        if family.len() < needed {
            return Err(InvSubErrorKind::DimensionMismatch {
                expected: needed,
                actual: family.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Materializes `sum_g coefficients[g] * G_g` against `family`.
    pub fn evaluate(
        &self,
        family: &[BallMatrix],
        coefficients: &[ComplexBall],
    ) -> Result<BallMatrix, InvSubError> {
        self.check_family(family)?;
        let n = family.first().map(BallMatrix::nrows).unwrap_or(0);
        let prec = family.iter().map(BallMatrix::prec).min().unwrap_or(MAX_PREC);

        let mut words: Vec<BallMatrix> = Vec::with_capacity(self.generators.len());
        let mut operators: Vec<Option<BallMatrix>> = vec![None; self.operators.len()];
        for g in &self.generators {
            let word = match *g {
                Generator::Seed => BallMatrix::identity(n, prec),
                Generator::Apply { matrix, operand } => {
                    let op = operators[operand].get_or_insert_with(|| {
                        linear_combination(&self.operators[operand], &words, n, prec)
                    });
                    &family[matrix] * &*op
                }
            };
            words.push(word);
        }
        Ok(linear_combination(coefficients, &words, n, prec))
    }

    /// Materializes operator `i` against `family`.
    pub fn matrix(&self, family: &[BallMatrix], i: usize) -> Result<BallMatrix, InvSubError> {
        self.evaluate(family, &self.operators[i])
    }

    /// A matrix-free view of operator `i`, acting through `family`.
    pub fn operator_view<'a>(
        &'a self,
        family: &'a [BallMatrix],
        i: usize,
    ) -> Result<TransitionOperator<'a>, InvSubError> {
        self.check_family(family)?;
        Ok(TransitionOperator {
            program: self,
            family,
            coefficients: &self.operators[i],
        })
    }
}

fn linear_combination(
    coefficients: &[ComplexBall],
    words: &[BallMatrix],
    n: usize,
    prec: u32,
) -> BallMatrix {
    coefficients
        .iter()
        .zip(words.iter())
        .fold(BallMatrix::zeros(n, n, prec), |acc, (c, w)| acc.add(&w.scale(c)))
}

/// One transition operator applied without materializing its matrix.
pub struct TransitionOperator<'a> {
    program: &'a TransitionProgram,
    family: &'a [BallMatrix],
    coefficients: &'a [ComplexBall],
}

impl BallOperator for TransitionOperator<'_> {
    fn nrows(&self) -> usize {
        self.family.first().map(BallMatrix::nrows).unwrap_or(0)
    }

    fn ncols(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, rhs: &BallVector) -> BallVector {
        let n = rhs.len();
        let prec = rhs.prec();
        let combine = |coeffs: &[ComplexBall], images: &[BallVector]| {
            coeffs
                .iter()
                .zip(images.iter())
                .fold(BallVector::zeros(n, prec), |acc, (c, v)| {
                    acc.sub_scaled(&-*c, v)
                })
        };

        let mut images: Vec<BallVector> = Vec::with_capacity(self.program.generators.len());
        for g in &self.program.generators {
            let image = match *g {
                Generator::Seed => rhs.clone(),
                Generator::Apply { matrix, operand } => {
                    let inner = combine(&self.program.operators[operand], &images);
                    self.family[matrix].apply(&inner)
                }
            };
            images.push(image);
        }
        combine(self.coefficients, &images)
    }
}

/// Output of [`orbit`] and [`orbit_with_transitions`].
#[derive(Debug, Clone)]
pub struct Orbit {
    /// Echelon basis of the orbit (pivots exactly 1).
    pub basis: Vec<BallVector>,
    /// Pivot map of the basis.
    pub pivots: PivotMap,
    /// Transition operators, when requested.
    pub transitions: Option<TransitionProgram>,
}

impl Orbit {
    pub fn dim(&self) -> usize {
        self.basis.len()
    }
}

/// Returns a basis of the smallest subspace containing `vec` and invariant
/// under every matrix of `family`.
pub fn orbit(family: &[BallMatrix], vec: &BallVector) -> Result<Orbit, InvSubError> {
    orbit_impl(family, vec, false)
}

/// Same as [`orbit`], also recording the transition operators.
///
/// Fails with a precision error when some echelon transformation cannot be
/// certified invertible.
pub fn orbit_with_transitions(
    family: &[BallMatrix],
    vec: &BallVector,
) -> Result<Orbit, InvSubError> {
    orbit_impl(family, vec, true)
}

fn orbit_impl(family: &[BallMatrix], vec: &BallVector, track: bool) -> Result<Orbit, InvSubError> {
    let n = vec.len();
    for m in family {
        if m.nrows() != n || m.ncols() != n {
            return Err(InvSubErrorKind::DimensionMismatch {
                expected: n,
                actual: if m.nrows() != n { m.nrows() } else { m.ncols() },
            }
            .into());
        }
    }
    let mode = if track {
        Transformation::Certify
    } else {
        Transformation::Discard
    };

    let seed = BallMatrix::from_rows(std::slice::from_ref(vec), n)?;
    let first = row_echelon(&seed, &PivotMap::new(), mode)?;

    if first.pivots.is_empty() {
        return Ok(Orbit {
            basis: Vec::new(),
            pivots: first.pivots,
            transitions: track.then(TransitionProgram::empty),
        });
    }

    let mut program = match (&first.transformation, track) {
        (Some(s), true) => Some(TransitionProgram {
            generators: vec![Generator::Seed],
            operators: vec![vec![s[(0, 0)]]],
        }),
        _ => None,
    };

    let mut basis = first.reduced;
    let mut pivots = first.pivots;
    let mut r = 1;
    let mut new = 0..1;

    while !new.is_empty() && r < n {
        let mut candidates = Vec::with_capacity(family.len() * new.len());
        for m in family {
            for i in new.clone() {
                candidates.push(m.apply(&basis.row(i)));
            }
        }
        let first_candidate_generator = program.as_ref().map_or(0, |p| p.generators.len());
        if let Some(p) = program.as_mut() {
            for k in 0..family.len() {
                for i in new.clone() {
                    p.generators.push(Generator::Apply {
                        matrix: k,
                        operand: i,
                    });
                }
            }
        }

        let stacked = basis.stack(&candidates);
        let form = row_echelon(&stacked, &pivots, mode)?;
        let rank = form.rank();

        if let (Some(p), Some(s)) = (program.as_mut(), form.transformation.as_ref()) {
            let width = p.generators.len();
            let prec = s.prec();
            for i in r..rank {
                let mut coeffs = vec![ComplexBall::zero(prec); width];
                for j in 0..stacked.nrows() {
                    let sij = s[(i, j)];
                    if j < r {
                        for (acc, c) in coeffs.iter_mut().zip(p.operators[j].iter()) {
                            *acc = *acc + sij * *c;
                        }
                    } else {
                        let g = first_candidate_generator + (j - r);
                        coeffs[g] = coeffs[g] + sij;
                    }
                }
                p.operators.push(coeffs);
            }
        }

        basis = form.reduced.top_rows(rank);
        pivots = form.pivots;
        new = r..rank;
        r = rank;
    }

    log::debug!("orbit of dimension {} in dimension {}", r, n);

    Ok(Orbit {
        basis: basis.rows(),
        pivots,
        transitions: program,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn int_matrix(rows: &[&[i64]]) -> BallMatrix {
        BallMatrix::from_fn(rows.len(), rows[0].len(), |i, j| {
            ComplexBall::from_i64(rows[i][j], MAX_PREC)
        })
    }

    fn random_invertible(rng: &mut StdRng, n: usize) -> BallMatrix {
        BallMatrix::from_fn(n, n, |i, j| {
            let shift = if i == j { 2.0 } else { 0.0 };
            ComplexBall::from_parts(
                shift + rng.random_range(-0.5..0.5),
                rng.random_range(-0.5..0.5),
                MAX_PREC,
            )
        })
    }

    #[test]
    fn test_jordan_block_orbits_have_increasing_dimension() {
        let mut rng = StdRng::seed_from_u64(17);
        let jordan = int_matrix(&[&[1, 1, 0], &[0, 1, 1], &[0, 0, 1]]);
        let p = random_invertible(&mut rng, 3);
        let p_inv = p.inverse().unwrap();
        let conj = &(&p_inv * &jordan) * &p;
        let dims: Vec<usize> = (0..3)
            .map(|i| {
                let v = p_inv.apply(&BallVector::unit(3, i, MAX_PREC));
                orbit(&[conj.clone()], &v).unwrap().dim()
            })
            .collect();
        assert_eq!(dims, vec![1, 2, 3]);
    }

    #[test]
    fn test_two_nilpotent_matrices_generate_more_together() {
        let e13 = int_matrix(&[&[0, 0, 1], &[0, 0, 0], &[0, 0, 0]]);
        let e23 = int_matrix(&[&[0, 0, 0], &[0, 0, 1], &[0, 0, 0]]);
        let v = BallVector::unit(3, 2, MAX_PREC);
        assert_eq!(orbit(&[e13.clone()], &v).unwrap().dim(), 2);
        assert_eq!(orbit(&[e13, e23], &v).unwrap().dim(), 3);
    }

    #[test]
    fn test_zero_seed_has_empty_orbit() {
        let m = int_matrix(&[&[1, 2], &[3, 4]]);
        let orbit = orbit_with_transitions(&[m], &BallVector::zeros(2, MAX_PREC)).unwrap();
        assert_eq!(orbit.dim(), 0);
        assert!(orbit.transitions.unwrap().is_empty());
    }

    #[test]
    fn test_transition_operators_reproduce_basis() {
        let mut rng = StdRng::seed_from_u64(23);
        let a = random_invertible(&mut rng, 3);
        let b = random_invertible(&mut rng, 3);
        let family = vec![a, b];
        let v: BallVector = (0..3)
            .map(|_| ComplexBall::from_parts(rng.random_range(-1.0..1.0), 0.0, MAX_PREC))
            .collect();
        let orbit = orbit_with_transitions(&family, &v).unwrap();
        assert_eq!(orbit.dim(), 3);
        let program = orbit.transitions.as_ref().unwrap();
        assert_eq!(program.len(), 3);
        for (i, basis_vector) in orbit.basis.iter().enumerate() {
            let materialized = program.matrix(&family, i).unwrap().apply(&v);
            let matrix_free = program.operator_view(&family, i).unwrap().apply(&v);
            for k in 0..3 {
                assert!(materialized[k].overlaps(&basis_vector[k]));
                assert!(matrix_free[k].overlaps(&basis_vector[k]));
            }
        }
    }

    #[test]
    fn test_program_survives_serialization() {
        let m = int_matrix(&[&[0, 1], &[1, 0]]);
        let v = BallVector::new(vec![
            ComplexBall::one(MAX_PREC),
            ComplexBall::exact(Complex64::new(2.0, 0.0), MAX_PREC),
        ]);
        let orbit = orbit_with_transitions(&[m.clone()], &v).unwrap();
        let program = orbit.transitions.unwrap();
        let json = serde_json::to_string(&program).unwrap();
        let replayed: TransitionProgram = serde_json::from_str(&json).unwrap();
        assert_eq!(replayed, program);
        let again = replayed.matrix(&[m], 1).unwrap().apply(&v);
        for k in 0..2 {
            assert!(again[k].overlaps(&orbit.basis[1][k]));
        }
    }
}
