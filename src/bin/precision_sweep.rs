//! Experiment runner for the precision sweep.
//!
//! Builds a synthetic family with a known answer and runs the invariant
//! subspace search at a range of working precisions, recording for each one
//! whether the search certified an answer, which answer, and how long it took.
//! A fixture file can be swept instead of a synthetic scenario.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use invsub::{
    SearchOutcome,
    ball::{MAX_PREC, MIN_PREC},
    invariant_subspace,
    matrix::BallMatrix,
    precision::{Context, DEFAULT_SEED, family_accuracy},
    utils::{
        family_loader::{Expected, load_family},
        scenarios,
    },
};
use serde::Serialize;
use std::{path::PathBuf, time::Instant};

/// The synthetic family to search.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum Scenario {
    /// Matrices sharing a two-block diagonal structure behind a change of basis.
    BlockDiagonal,
    /// A Jordan block and its square behind a change of basis.
    Jordan,
    /// Unrelated random matrices: irreducible.
    Generic,
}

/// Command-line arguments for the precision sweep.
#[derive(Parser, Debug)]
#[clap(
    name = "precision-sweep",
    about = "Runs the invariant subspace search over a range of working precisions."
)]
struct SweepArgs {
    /// The synthetic scenario to build. Ignored when `--fixture` is given.
    #[clap(long, value_enum, default_value = "generic")]
    scenario: Scenario,

    /// A JSON fixture to sweep instead of a synthetic scenario.
    #[clap(long, value_name = "PATH")]
    fixture: Option<PathBuf>,

    /// Dimension of the synthetic matrices.
    #[clap(long, default_value_t = 4)]
    n: usize,

    /// Number of matrices in the synthetic family.
    #[clap(long, default_value_t = 2)]
    count: usize,

    /// Lowest working precision, in bits.
    #[clap(long, default_value_t = 8)]
    prec_min: u32,

    /// Highest working precision, in bits.
    #[clap(long, default_value_t = MAX_PREC)]
    prec_max: u32,

    /// Step between precisions.
    #[clap(long, default_value_t = 4)]
    prec_step: u32,

    /// Seed of the scenario and of the search.
    #[clap(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data for the sweep CSV.
#[derive(Debug, Serialize)]
struct SweepResult {
    prec: u32,
    /// Smallest certified accuracy of the inputs, in bits.
    input_accuracy: i64,
    /// `reducible`, `irreducible`, `precision-failure` or `error`.
    outcome: &'static str,
    /// Dimension of the certified subspace, if any.
    dimension: Option<usize>,
    /// Whether the outcome agrees with the known answer.
    consistent: Option<bool>,
    elapsed_ms: f64,
    message: String,
}

fn build_family(args: &SweepArgs, prec: u32) -> Result<(Vec<BallMatrix>, Expected)> {
    if let Some(path) = &args.fixture {
        let fixture = load_family(path)?;
        let family = fixture.embed(&Context::new(prec, args.seed)?)?;
        return Ok((family, fixture.expected));
    }
    let scenario = match args.scenario {
        Scenario::BlockDiagonal => {
            let first = args.n.div_ceil(2);
            scenarios::block_diagonal(&[first, args.n - first], args.count, args.seed, prec)?
        }
        Scenario::Jordan => scenarios::jordan(args.n, args.seed, prec)?,
        Scenario::Generic => scenarios::generic(args.n, args.count, args.seed, prec)?,
    };
    Ok((scenario.family, scenario.expected))
}

fn is_consistent(outcome: &SearchOutcome, expected: Expected) -> bool {
    match (outcome, expected) {
        (SearchOutcome::Irreducible, Expected::Irreducible) => true,
        (SearchOutcome::Reducible(basis), Expected::Reducible { dimension }) => {
            dimension.is_none_or(|d| d == basis.len())
        }
        _ => false,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()?;
    let args = SweepArgs::parse();
    if args.prec_min < MIN_PREC || args.prec_max > MAX_PREC || args.prec_min > args.prec_max {
        return Err(anyhow!(
            "precision range {}..={} is outside {}..={}",
            args.prec_min,
            args.prec_max,
            MIN_PREC,
            MAX_PREC
        ));
    }
    log::info!(
        "Starting precision sweep for scenario: {:?}, n: {}, fixture: {:?}",
        args.scenario,
        args.n,
        args.fixture
    );

    let mut results = Vec::new();
    for prec in (args.prec_min..=args.prec_max).step_by(args.prec_step.max(1) as usize) {
        let (family, expected) = build_family(&args, prec)?;
        let ctx = Context::new(prec, args.seed)?;
        log::info!("Running at {} bits...", prec);

        let start = Instant::now();
        let result = invariant_subspace(&family, &ctx);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;

        let row = match result {
            Ok(outcome) => SweepResult {
                prec,
                input_accuracy: family_accuracy(&family),
                outcome: if outcome.is_irreducible() {
                    "irreducible"
                } else {
                    "reducible"
                },
                dimension: outcome.subspace().map(<[_]>::len),
                consistent: Some(is_consistent(&outcome, expected)),
                elapsed_ms,
                message: String::new(),
            },
            Err(e) => SweepResult {
                prec,
                input_accuracy: family_accuracy(&family),
                outcome: if e.is_precision_failure() {
                    "precision-failure"
                } else {
                    "error"
                },
                dimension: None,
                consistent: None,
                elapsed_ms,
                message: e.to_string(),
            },
        };
        if row.consistent == Some(false) {
            log::warn!("Inconsistent answer at {} bits: {:?}", prec, row);
        }
        results.push(row);
    }

    log::info!("Writing results to {:?}...", &args.output);
    let mut writer = csv::Writer::from_path(&args.output)?;
    for record in results {
        writer.serialize(record)?;
    }
    writer.flush()?;

    log::info!("Precision sweep complete.");
    Ok(())
}
