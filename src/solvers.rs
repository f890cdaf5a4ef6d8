//! This module provides the high-level API: searching a family of ball matrices
//! for a common invariant subspace, and escalating the working precision until
//! the search can certify its answer.

use crate::{
    algorithms::{
        algebra::{generated_algebra, validate_family},
        splitting::{NoLinesOutcome, Splitting},
    },
    ball::ComplexBall,
    error::{InvSubError, InvSubErrorKind},
    matrix::{BallMatrix, BallVector},
    precision::{Context, PrecisionSchedule, family_accuracy},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Result of a successful search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Linearly independent vectors spanning a proper, nonzero subspace that is
    /// invariant under every matrix enclosed by the family.
    Reducible(Vec<BallVector>),
    /// Every family of matrices enclosed by the input acts irreducibly.
    Irreducible,
}

impl SearchOutcome {
    pub fn is_irreducible(&self) -> bool {
        matches!(self, SearchOutcome::Irreducible)
    }

    /// The spanning vectors of the subspace, if one was found.
    pub fn subspace(&self) -> Option<&[BallVector]> {
        match self {
            SearchOutcome::Reducible(basis) => Some(basis),
            SearchOutcome::Irreducible => None,
        }
    }
}

/// What one structural pass over a family concluded.
enum StructuralSearch {
    Found(Vec<BallVector>),
    Irreducible,
    Exhausted,
}

fn random_combination(family: &[BallMatrix], rng: &mut StdRng, prec: u32) -> BallMatrix {
    let n = family.first().map(BallMatrix::nrows).unwrap_or(0);
    family
        .iter()
        .fold(BallMatrix::zeros(n, n, prec), |acc, m| {
            let c = ComplexBall::from_parts(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                prec,
            );
            acc.add(&m.scale(&c))
        })
}

/// Splits the space with a random element of the algebra, then alternates
/// line checks, common-eigenvector checks and refinements.
fn structural_search(
    family: &[BallMatrix],
    rng: &mut StdRng,
    prec: u32,
) -> Result<StructuralSearch, InvSubError> {
    let n = family[0].nrows();
    let mut split = Splitting::new(family)?;
    let mix = random_combination(split.matrices(), rng, prec);
    split = split.refine(&mix)?;

    loop {
        log::debug!("searching with partition {:?}", split.partition());
        if let Some(basis) = split.check_lines()? {
            return Ok(StructuralSearch::Found(basis));
        }
        if split.partition().len() == n {
            return Ok(StructuralSearch::Irreducible);
        }
        match split.check_nolines()? {
            NoLinesOutcome::Subspace(basis) => return Ok(StructuralSearch::Found(basis)),
            NoLinesOutcome::Exhausted => return Ok(StructuralSearch::Exhausted),
            NoLinesOutcome::NeedsRefinement(m) => {
                let blocks = split.partition().len();
                split = split.refine(&m)?;
                if split.partition().len() <= blocks {
                    log::warn!("refinement did not split any block");
                    return Ok(StructuralSearch::Exhausted);
                }
            }
        }
    }
}

/// Searches for a proper, nonzero subspace invariant under every matrix of `family`.
///
/// The inputs are re-rounded at `ctx.prec`, and the random combinations the
/// search draws come from `ctx.seed`. When the structural search runs out of
/// candidates, it restarts once on a basis of the algebra generated by the
/// family: that basis has the same invariant subspaces, and a full-dimensional
/// algebra proves irreducibility.
///
/// # Errors
/// A usage error for an empty family or mismatched shapes, and a precision
/// failure whenever some step cannot be certified at `ctx.prec`.
pub fn invariant_subspace(
    family: &[BallMatrix],
    ctx: &Context,
) -> Result<SearchOutcome, InvSubError> {
    search_with_fallback(family, ctx, structural_search)
}

/// Runs `pass` on the family, then at most once on a basis of its algebra.
///
/// Each round either answers or moves from the family to its algebra, so the
/// loop runs at most twice.
fn search_with_fallback<F>(
    family: &[BallMatrix],
    ctx: &Context,
    mut pass: F,
) -> Result<SearchOutcome, InvSubError>
where
    F: FnMut(&[BallMatrix], &mut StdRng, u32) -> Result<StructuralSearch, InvSubError>,
{
    let n = validate_family(family)?;
    if n == 0 {
        return Ok(SearchOutcome::Irreducible);
    }
    let mut rng = StdRng::seed_from_u64(ctx.seed);
    let mut current: Vec<BallMatrix> = family.iter().map(|m| m.with_prec(ctx.prec)).collect();
    let mut on_algebra = false;

    loop {
        match pass(&current, &mut rng, ctx.prec)? {
            StructuralSearch::Found(basis) => {
                log::info!("found an invariant subspace of dimension {}", basis.len());
                return Ok(SearchOutcome::Reducible(basis));
            }
            StructuralSearch::Irreducible => return Ok(SearchOutcome::Irreducible),
            StructuralSearch::Exhausted if on_algebra => {
                return Err(InvSubError::precision(
                    "Structural search exhausted on a basis of the generated algebra.",
                ));
            }
            StructuralSearch::Exhausted => {}
        }

        let algebra = generated_algebra(&current)?;
        if algebra.len() == n * n {
            return Ok(SearchOutcome::Irreducible);
        }
        log::info!(
            "falling back to the generated algebra (dimension {} of {})",
            algebra.len(),
            n * n
        );
        current = algebra;
        on_algebra = true;
    }
}

/// Runs [`invariant_subspace`] at the precisions of `schedule` until it succeeds.
///
/// `build` produces the family at the requested context; it is called again
/// at every attempt, so that inputs derived from a higher-precision computation
/// can be recomputed. A family whose accuracy is below three quarters of the
/// working precision triggers the next attempt without being searched.
///
/// # Errors
/// Usage errors and builder failures are returned as soon as they occur.
/// Precision failures lead to the next attempt, and become
/// `PrecisionExhausted` once the schedule is used up.
pub fn certify_invariant_subspace<F>(
    schedule: &PrecisionSchedule,
    seed: u64,
    mut build: F,
) -> Result<SearchOutcome, InvSubError>
where
    F: FnMut(&Context) -> Result<Vec<BallMatrix>, anyhow::Error>,
{
    let precisions = schedule.precisions();
    let mut last = String::from("no attempt was made");
    let mut last_prec = schedule.initial;

    for (attempt, &prec) in precisions.iter().enumerate() {
        let ctx = Context::new(prec, seed)?;
        last_prec = prec;
        let family = build(&ctx).map_err(|e| InvSubErrorKind::Builder(e.to_string()))?;

        let accuracy = family_accuracy(&family);
        if 4 * accuracy < 3 * i64::from(prec) {
            last = format!("inputs carry {accuracy} accurate bits at precision {prec}");
            log::info!("attempt {}: {}; escalating", attempt + 1, last);
            continue;
        }

        match invariant_subspace(&family, &ctx) {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_precision_failure() => {
                log::info!("attempt {} at {} bits: {}; escalating", attempt + 1, prec, e);
                last = e.to_string();
            }
            Err(e) => return Err(e),
        }
    }

    Err(InvSubErrorKind::PrecisionExhausted {
        attempts: precisions.len(),
        prec: last_prec,
        last,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ball::MAX_PREC, precision::DEFAULT_SEED};

    fn int_matrix(rows: &[&[i64]], prec: u32) -> BallMatrix {
        BallMatrix::from_fn(rows.len(), rows[0].len(), |i, j| {
            ComplexBall::from_i64(rows[i][j], prec)
        })
    }

    #[test]
    fn test_empty_family_is_a_usage_error() {
        let err = invariant_subspace(&[], &Context::default()).unwrap_err();
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_single_jordan_block_has_an_eigenline() {
        let j = int_matrix(&[&[3, 1, 0], &[0, 3, 1], &[0, 0, 3]], MAX_PREC);
        let outcome = invariant_subspace(&[j], &Context::default()).unwrap();
        let basis = outcome.subspace().expect("a Jordan block is reducible");
        assert!(!basis.is_empty() && basis.len() < 3);
    }

    #[test]
    fn test_diagonal_and_all_ones_are_irreducible() {
        let a = int_matrix(&[&[1, 0, 0], &[0, 2, 0], &[0, 0, 3]], MAX_PREC);
        let b = int_matrix(&[&[1, 1, 1], &[1, 1, 1], &[1, 1, 1]], MAX_PREC);
        let outcome = invariant_subspace(&[a, b], &Context::default()).unwrap();
        assert!(outcome.is_irreducible());
    }

    #[test]
    fn test_exhausted_search_on_a_full_algebra_is_irreducible() {
        let a = int_matrix(&[&[1, 0, 0], &[0, 2, 0], &[0, 0, 3]], MAX_PREC);
        let b = int_matrix(&[&[1, 1, 1], &[1, 1, 1], &[1, 1, 1]], MAX_PREC);
        let mut passes = 0;
        let outcome = search_with_fallback(&[a, b], &Context::default(), |_, _, _| {
            passes += 1;
            Ok(StructuralSearch::Exhausted)
        })
        .unwrap();
        assert!(outcome.is_irreducible());
        assert_eq!(passes, 1);
    }

    #[test]
    fn test_exhausted_search_restarts_once_on_the_algebra() {
        let e12 = int_matrix(&[&[0, 1], &[0, 0]], MAX_PREC);
        let d = int_matrix(&[&[1, 0], &[0, 2]], MAX_PREC);
        let mut families = Vec::new();
        let err = search_with_fallback(&[e12, d], &Context::default(), |family, _, _| {
            families.push(family.len());
            Ok(StructuralSearch::Exhausted)
        })
        .unwrap_err();
        // The upper triangular algebra has dimension 3 < 4: one restart, then give up.
        assert!(err.is_precision_failure());
        assert_eq!(families, vec![2, 3]);
    }

    #[test]
    fn test_subspace_found_on_the_algebra_is_returned() {
        let e12 = int_matrix(&[&[0, 1], &[0, 0]], MAX_PREC);
        let d = int_matrix(&[&[1, 0], &[0, 2]], MAX_PREC);
        let mut passes = 0;
        let outcome = search_with_fallback(&[e12, d], &Context::default(), |_, _, prec| {
            passes += 1;
            if passes == 1 {
                Ok(StructuralSearch::Exhausted)
            } else {
                Ok(StructuralSearch::Found(vec![BallVector::unit(2, 0, prec)]))
            }
        })
        .unwrap();
        assert_eq!(passes, 2);
        assert_eq!(outcome.subspace().map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_truncated_precision_fails_then_full_precision_succeeds() {
        let a = int_matrix(&[&[1, 1, 0], &[0, 1, 0], &[0, 0, 5]], MAX_PREC);
        let b = int_matrix(&[&[2, 0, 0], &[0, 3, 1], &[0, 0, 7]], MAX_PREC);
        let family = [a, b];
        let err = invariant_subspace(&family, &Context::new(3, DEFAULT_SEED).unwrap()).unwrap_err();
        assert!(err.is_precision_failure());
        let outcome = invariant_subspace(&family, &Context::default()).unwrap();
        assert!(outcome.subspace().is_some());
    }

    #[test]
    fn test_schedule_exhaustion_is_reported() {
        let schedule = PrecisionSchedule::new(8, 16, 2).unwrap();
        let mut calls = 0;
        let err = certify_invariant_subspace(&schedule, 1, |ctx| {
            calls += 1;
            // Inputs that never get more accurate than 4 bits.
            Ok(vec![BallMatrix::identity(2, ctx.prec).add_error(1.0 / 16.0)])
        })
        .unwrap_err();
        assert_eq!(calls, 2);
        assert!(err.to_string().starts_with("Precision exhausted after 2 attempts"));
    }

    #[test]
    fn test_builder_errors_are_not_retried() {
        let err = certify_invariant_subspace(&PrecisionSchedule::default(), 1, |_| {
            Err(anyhow::anyhow!("no data"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "The family builder failed: no data");
    }
}
