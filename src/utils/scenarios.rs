//! Synthetic matrix families with a known answer.
//!
//! Each generator draws `f64` matrices from a seeded [`StdRng`] and conjugates
//! them by a random, well-conditioned change of basis, in ball arithmetic at the
//! requested precision. The exact family is fixed by the seed, so every
//! precision encloses the same matrices; only the radii change.

use super::family_loader::Expected;
use crate::{ball::ComplexBall, error::InvSubError, matrix::BallMatrix};
use rand::{Rng, SeedableRng, rngs::StdRng};

#[derive(Debug, Clone)]
pub struct Scenario {
    pub family: Vec<BallMatrix>,
    pub expected: Expected,
}

fn random_ball(rng: &mut StdRng, prec: u32) -> ComplexBall {
    ComplexBall::from_parts(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0), prec)
}

fn random_matrix(rng: &mut StdRng, n: usize, prec: u32) -> BallMatrix {
    BallMatrix::from_fn(n, n, |_, _| random_ball(rng, prec))
}

/// A random matrix with a dominant diagonal: invertible with a small condition number.
fn random_change_of_basis(rng: &mut StdRng, n: usize, prec: u32) -> BallMatrix {
    BallMatrix::from_fn(n, n, |i, j| {
        let shift = if i == j { n as f64 } else { 0.0 };
        ComplexBall::from_parts(
            shift + rng.random_range(-0.5..0.5),
            rng.random_range(-0.5..0.5),
            prec,
        )
    })
}

fn conjugate_all(
    rng: &mut StdRng,
    family: Vec<BallMatrix>,
    prec: u32,
) -> Result<Vec<BallMatrix>, InvSubError> {
    let n = family.first().map_or(0, BallMatrix::nrows);
    let p = random_change_of_basis(rng, n, prec);
    let p_inv = p.inverse()?;
    Ok(family.iter().map(|m| &(&p_inv * m) * &p).collect())
}

/// `count` matrices sharing the block-diagonal structure given by `sizes`.
pub fn block_diagonal(
    sizes: &[usize],
    count: usize,
    seed: u64,
    prec: u32,
) -> Result<Scenario, InvSubError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let family = (0..count)
        .map(|_| {
            let blocks: Vec<BallMatrix> = sizes
                .iter()
                .map(|&d| random_matrix(&mut rng, d, prec))
                .collect();
            BallMatrix::block_diag(&blocks, prec)
        })
        .collect();
    let expected = if sizes.len() < 2 {
        Expected::Irreducible
    } else {
        Expected::Reducible { dimension: None }
    };
    Ok(Scenario {
        family: conjugate_all(&mut rng, family, prec)?,
        expected,
    })
}

/// A single Jordan block of size `n` and its square.
pub fn jordan(n: usize, seed: u64, prec: u32) -> Result<Scenario, InvSubError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let lambda = random_ball(&mut rng, prec);
    let block = BallMatrix::from_fn(n, n, |i, j| {
        if i == j {
            lambda
        } else if j == i + 1 {
            ComplexBall::one(prec)
        } else {
            ComplexBall::zero(prec)
        }
    });
    let square = &block * &block;
    Ok(Scenario {
        family: conjugate_all(&mut rng, vec![block, square], prec)?,
        expected: Expected::Reducible { dimension: None },
    })
}

/// `count` unrelated random matrices, irreducible with probability one when
/// `count >= 2`.
pub fn generic(n: usize, count: usize, seed: u64, prec: u32) -> Result<Scenario, InvSubError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let family = (0..count).map(|_| random_matrix(&mut rng, n, prec)).collect();
    Ok(Scenario {
        family: conjugate_all(&mut rng, family, prec)?,
        expected: if count >= 2 || n <= 1 {
            Expected::Irreducible
        } else {
            Expected::Reducible { dimension: None }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ball::MAX_PREC;

    #[test]
    fn test_same_seed_encloses_same_family() {
        let low = generic(3, 2, 9, 20).unwrap();
        let high = generic(3, 2, 9, MAX_PREC).unwrap();
        for (a, b) in low.family.iter().zip(high.family.iter()) {
            for i in 0..3 {
                for j in 0..3 {
                    assert!(a[(i, j)].overlaps(&b[(i, j)]));
                }
            }
        }
    }

    #[test]
    fn test_expected_answers() {
        let split = block_diagonal(&[2, 1], 2, 1, MAX_PREC).unwrap();
        assert_eq!(split.expected, Expected::Reducible { dimension: None });
        assert_eq!(split.family.len(), 2);
        assert_eq!(jordan(3, 1, MAX_PREC).unwrap().family.len(), 2);
        assert_eq!(generic(3, 2, 1, MAX_PREC).unwrap().expected, Expected::Irreducible);
    }
}
