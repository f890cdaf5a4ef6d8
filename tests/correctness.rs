//! Integration test suite for the invariant subspace search.
//!
//! # Test Methodology
//!
//! Every test family is built so that its answer is known in advance:
//!
//! 1.  **Construct a family with known structure:** block-diagonal families have
//!     an invariant subspace per block, a Jordan block has a flag of invariant
//!     subspaces, and unrelated random matrices are irreducible. A random change
//!     of basis hides the structure from the search.
//! 2.  **Run the escalating search:** the family is rebuilt at every precision
//!     of the schedule, as a caller re-deriving its inputs would.
//! 3.  **Check the answer:** the outcome must agree with the known structure,
//!     and a returned subspace must be invariant under the midpoint matrices.
//!
//! The building blocks (orbits, algebras) are checked against the same
//! families: an orbit never leaves the block of its seed, and the algebra of a
//! block-diagonal family has the dimension predicted by Burnside's theorem.

mod common;

use anyhow::{Result, ensure};
use invsub::{
    SearchOutcome,
    algorithms::{algebra::generated_algebra, orbit::orbit},
    ball::{ComplexBall, MAX_PREC},
    certify_invariant_subspace, invariant_subspace,
    matrix::{BallMatrix, BallOperator, BallVector},
    precision::{Context, PrecisionSchedule},
    utils::scenarios::{self, Scenario},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Schedule used by the search tests: 24, 48 then 53 bits.
fn schedule() -> PrecisionSchedule {
    PrecisionSchedule::new(24, MAX_PREC, 3).expect("valid schedule")
}

/// A macro to generate the boilerplate for each search test.
///
/// 1. Build the scenario at the requested precision with the given seed.
/// 2. Run the escalating search.
/// 3. Compare against the scenario's known answer at full precision.
macro_rules! generate_search_test {
    ($test_name:ident, $build:expr, $seed:expr) => {
        #[test]
        fn $test_name() -> Result<()> {
            let build = $build;
            let outcome = certify_invariant_subspace(&schedule(), $seed, |ctx| {
                let scenario: Scenario = build(ctx.prec, $seed)?;
                Ok(scenario.family)
            })?;
            let reference: Scenario = build(MAX_PREC, $seed)?;
            common::ensure_outcome(&reference.family, &outcome, reference.expected)
        }
    };
}

// --- Search Suite ---

generate_search_test!(
    test_two_blocks_of_sizes_two_and_one,
    |prec, seed| scenarios::block_diagonal(&[2, 1], 2, seed, prec),
    11
);

generate_search_test!(
    test_two_blocks_of_size_two,
    |prec, seed| scenarios::block_diagonal(&[2, 2], 2, seed, prec),
    12
);

generate_search_test!(
    test_three_blocks,
    |prec, seed| scenarios::block_diagonal(&[1, 2, 1], 3, seed, prec),
    13
);

generate_search_test!(
    test_jordan_block_of_size_three,
    |prec, seed| scenarios::jordan(3, seed, prec),
    14
);

generate_search_test!(
    test_generic_pair_in_dimension_three,
    |prec, seed| scenarios::generic(3, 2, seed, prec),
    15
);

generate_search_test!(
    test_generic_pair_in_dimension_four,
    |prec, seed| scenarios::generic(4, 2, seed, prec),
    16
);

#[test]
fn test_block_diagonal_families_are_split_for_many_seeds() -> Result<()> {
    for sizes in [&[2, 1][..], &[2, 2][..]] {
        for seed in 0..12 {
            let scenario = scenarios::block_diagonal(sizes, 2, seed, MAX_PREC)?;
            let ctx = Context::new(MAX_PREC, seed)?;
            let outcome = invariant_subspace(&scenario.family, &ctx)?;
            common::ensure_outcome(&scenario.family, &outcome, scenario.expected)
                .map_err(|e| e.context(format!("sizes {:?}, seed {}", sizes, seed)))?;
        }
    }
    Ok(())
}

#[test]
fn test_escalation_from_truncated_precision() -> Result<()> {
    // One input, truncated to the precision of each attempt.
    let scenario = scenarios::block_diagonal(&[2, 1], 2, 17, MAX_PREC)?;
    let schedule = PrecisionSchedule::new(3, MAX_PREC, 6)?;
    let mut tried = Vec::new();
    let outcome = certify_invariant_subspace(&schedule, 17, |ctx| {
        tried.push(ctx.prec);
        Ok(scenario.family.iter().map(|m| m.with_prec(ctx.prec)).collect())
    })?;
    ensure!(tried.first() == Some(&3), "first attempt at {:?} bits", tried.first());
    ensure!(tried.len() > 1, "3 bits cannot certify anything");
    let basis = outcome
        .subspace()
        .ok_or_else(|| anyhow::anyhow!("expected a subspace, got {:?}", outcome))?;
    ensure!(!basis.is_empty() && basis.len() < 3);
    Ok(())
}

// --- Building Blocks ---

/// `count` random block-diagonal matrices, in the standard basis.
fn block_family(rng: &mut StdRng, sizes: &[usize], count: usize) -> Vec<BallMatrix> {
    (0..count)
        .map(|_| {
            let blocks: Vec<BallMatrix> = sizes
                .iter()
                .map(|&d| {
                    BallMatrix::from_fn(d, d, |_, _| {
                        ComplexBall::from_parts(
                            rng.random_range(-1.0..1.0),
                            rng.random_range(-1.0..1.0),
                            MAX_PREC,
                        )
                    })
                })
                .collect();
            BallMatrix::block_diag(&blocks, MAX_PREC)
        })
        .collect()
}

#[test]
fn test_orbit_stays_in_the_block_of_its_seed() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(21);
    let family = block_family(&mut rng, &[2, 3], 2);
    let seed: BallVector = (0..5)
        .map(|i| {
            let x = if i >= 2 { rng.random_range(-1.0..1.0) } else { 0.0 };
            ComplexBall::from_f64(x, MAX_PREC)
        })
        .collect();
    let orbit = orbit(&family, &seed)?;
    ensure!(orbit.dim() == 3, "orbit has dimension {}", orbit.dim());
    for v in &orbit.basis {
        ensure!(v[0].contains_zero() && v[1].contains_zero(), "orbit left its block");
    }
    // Every image of a basis vector stays in the block as well.
    for m in &family {
        for v in &orbit.basis {
            let image = m.apply(v);
            ensure!(image[0].contains_zero() && image[1].contains_zero());
        }
    }
    Ok(())
}

#[test]
fn test_algebra_dimension_follows_burnside() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(22);
    let family = block_family(&mut rng, &[2, 1], 2);
    let algebra = generated_algebra(&family)?;
    // M_2 + M_1 for two irreducible, non-isomorphic blocks.
    ensure!(algebra.len() == 5, "algebra has dimension {}", algebra.len());

    let family = block_family(&mut rng, &[3], 2);
    ensure!(generated_algebra(&family)?.len() == 9);
    Ok(())
}

#[test]
fn test_search_at_fixed_precision_is_deterministic() -> Result<()> {
    let scenario = scenarios::block_diagonal(&[2, 1], 2, 31, MAX_PREC)?;
    let ctx = Context::new(MAX_PREC, 99)?;
    let first = invariant_subspace(&scenario.family, &ctx)?;
    let second = invariant_subspace(&scenario.family, &ctx)?;
    match (&first, &second) {
        (SearchOutcome::Reducible(a), SearchOutcome::Reducible(b)) => {
            ensure!(a == b, "two runs with one seed disagree");
        }
        outcomes => ensure!(false, "expected reducible outcomes, got {:?}", outcomes),
    }
    Ok(())
}
