//! This module loads matrix families with exact entries from JSON files.
//!
//! A fixture stores every entry exactly, as an integer, a rational string
//! `"p/q"`, or an object `{"re": ..., "im": ...}` whose parts are either of
//! those. Embedding a fixture at a [`Context`] encloses each entry in a ball at
//! the context's precision, so the same file can be replayed at every step of a
//! precision escalation.
//!
//! ```json
//! {
//!   "name": "jordan_3",
//!   "expected": { "kind": "reducible", "dimension": 1 },
//!   "matrices": [[[2, 1, 0], [0, 2, 1], [0, 0, 2]]]
//! }
//! ```

use crate::{ball::ComplexBall, matrix::BallMatrix, precision::Context};
use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error;

/// Represents all possible errors that can occur while loading a fixture.
#[derive(Error, Debug)]
pub enum FamilyLoaderError {
    /// Wraps a standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The file is not a valid fixture document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// An entry could not be read as an exact number.
    #[error("Parse error: '{0}' is not an integer or a fraction p/q")]
    ParseRational(String),
    /// A matrix is not square, or not of the family's dimension.
    #[error("Shape error: matrix {index} is not {dim}x{dim}")]
    Shape { index: usize, dim: usize },
}

/// A real number stored exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactReal {
    Integer(i64),
    Fraction(String),
}

impl ExactReal {
    fn to_ball(&self, prec: u32) -> Result<ComplexBall, FamilyLoaderError> {
        match self {
            ExactReal::Integer(x) => Ok(ComplexBall::from_i64(*x, prec)),
            ExactReal::Fraction(s) => {
                let parse = |t: &str| {
                    t.trim()
                        .parse::<i64>()
                        .map_err(|_| FamilyLoaderError::ParseRational(s.clone()))
                };
                match s.split_once('/') {
                    Some((num, den)) => {
                        let den = parse(den)?;
                        if den == 0 {
                            return Err(FamilyLoaderError::ParseRational(s.clone()));
                        }
                        Ok(ComplexBall::from_rational(parse(num)?, den, prec))
                    }
                    None => Ok(ComplexBall::from_i64(parse(s)?, prec)),
                }
            }
        }
    }
}

/// A matrix entry stored exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExactEntry {
    Complex { re: ExactReal, im: ExactReal },
    Real(ExactReal),
}

impl ExactEntry {
    pub fn to_ball(&self, prec: u32) -> Result<ComplexBall, FamilyLoaderError> {
        match self {
            ExactEntry::Real(x) => x.to_ball(prec),
            ExactEntry::Complex { re, im } => {
                let i = ComplexBall::from_parts(0.0, 1.0, prec);
                Ok(re.to_ball(prec)? + i * im.to_ball(prec)?)
            }
        }
    }
}

/// The answer a fixture is known to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Expected {
    /// Some invariant subspace exists; `dimension`, when given, is the only
    /// dimension it can have.
    Reducible {
        #[serde(default)]
        dimension: Option<usize>,
    },
    Irreducible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyFixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub expected: Expected,
    pub matrices: Vec<Vec<Vec<ExactEntry>>>,
}

impl FamilyFixture {
    /// Dimension of the matrices (0 for an empty family).
    pub fn dim(&self) -> usize {
        self.matrices.first().map_or(0, Vec::len)
    }

    fn check_shapes(&self) -> Result<(), FamilyLoaderError> {
        let dim = self.dim();
        for (index, rows) in self.matrices.iter().enumerate() {
            if rows.len() != dim || rows.iter().any(|row| row.len() != dim) {
                return Err(FamilyLoaderError::Shape { index, dim });
            }
        }
        Ok(())
    }

    /// Encloses every matrix at the context's working precision.
    pub fn embed(&self, ctx: &Context) -> Result<Vec<BallMatrix>, FamilyLoaderError> {
        let dim = self.dim();
        self.matrices
            .iter()
            .map(|rows| {
                let mut m = BallMatrix::zeros(dim, dim, ctx.prec);
                for (i, row) in rows.iter().enumerate() {
                    for (j, entry) in row.iter().enumerate() {
                        m[(i, j)] = entry.to_ball(ctx.prec)?;
                    }
                }
                Ok(m)
            })
            .collect()
    }
}

/// Parses a fixture from a JSON string.
pub fn parse_family(json: &str) -> Result<FamilyFixture, FamilyLoaderError> {
    let fixture: FamilyFixture = serde_json::from_str(json)?;
    fixture.check_shapes()?;
    Ok(fixture)
}

/// Reads and parses a fixture file.
pub fn load_family(path: impl AsRef<Path>) -> Result<FamilyFixture, FamilyLoaderError> {
    parse_family(&fs::read_to_string(path)?)
}
