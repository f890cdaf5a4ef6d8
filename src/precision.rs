//! Working-precision configuration.
//!
//! A [`Context`] carries the working precision and the random seed of one
//! search attempt, and is passed explicitly to every entry point. A
//! [`PrecisionSchedule`] describes how attempts escalate after a precision
//! failure: the precision doubles from `initial` until it reaches `max`.
//! Both are plain serde structs, so an experiment can store them next to its
//! results.

use crate::{
    ball::{MAX_PREC, MIN_PREC},
    error::{InvSubError, InvSubErrorKind},
    matrix::BallMatrix,
};
use serde::{Deserialize, Serialize};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 0x5eed_1a7e;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Working precision, in bits.
    pub prec: u32,
    /// Seed of the random linear combinations drawn by the search.
    pub seed: u64,
}

impl Context {
    pub fn new(prec: u32, seed: u64) -> Result<Self, InvSubError> {
        validate_prec(prec)?;
        Ok(Context { prec, seed })
    }
}

impl Default for Context {
    fn default() -> Self {
        Context {
            prec: MAX_PREC,
            seed: DEFAULT_SEED,
        }
    }
}

fn validate_prec(prec: u32) -> Result<(), InvSubError> {
    if (MIN_PREC..=MAX_PREC).contains(&prec) {
        Ok(())
    } else {
        Err(InvSubErrorKind::InvalidPrecision {
            prec,
            max: MAX_PREC,
        }
        .into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionSchedule {
    pub initial: u32,
    pub max: u32,
    /// Upper bound on the number of attempts, whatever the precisions.
    pub max_attempts: usize,
}

impl Default for PrecisionSchedule {
    fn default() -> Self {
        PrecisionSchedule {
            initial: 16,
            max: MAX_PREC,
            max_attempts: 4,
        }
    }
}

impl PrecisionSchedule {
    pub fn new(initial: u32, max: u32, max_attempts: usize) -> Result<Self, InvSubError> {
        validate_prec(initial)?;
        validate_prec(max)?;
        if initial > max {
            return Err(InvSubErrorKind::InvalidPrecision { prec: initial, max }.into());
        }
        Ok(PrecisionSchedule {
            initial,
            max,
            max_attempts,
        })
    }

    /// The precisions tried in order: `initial`, doubled each time, with the
    /// last one clamped to `max`.
    pub fn precisions(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut prec = self.initial.clamp(MIN_PREC, self.max.max(MIN_PREC));
        while out.len() < self.max_attempts {
            out.push(prec);
            if prec >= self.max {
                break;
            }
            prec = (prec * 2).min(self.max);
        }
        out
    }
}

/// Smallest accuracy, in bits, over all entries of the family.
pub fn family_accuracy(family: &[BallMatrix]) -> i64 {
    family
        .iter()
        .map(BallMatrix::accuracy)
        .min()
        .unwrap_or(i64::from(MAX_PREC))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles_to_the_cap() {
        assert_eq!(PrecisionSchedule::default().precisions(), vec![16, 32, 53]);
    }

    #[test]
    fn test_schedule_respects_attempt_limit() {
        let schedule = PrecisionSchedule::new(4, 53, 2).unwrap();
        assert_eq!(schedule.precisions(), vec![4, 8]);
    }

    #[test]
    fn test_invalid_precisions_are_rejected() {
        assert!(Context::new(0, 1).unwrap_err().is_usage_error());
        assert!(Context::new(64, 1).unwrap_err().is_usage_error());
        assert!(PrecisionSchedule::new(40, 20, 3).is_err());
    }

    #[test]
    fn test_schedule_deserializes_with_defaults() {
        let schedule: PrecisionSchedule = serde_json::from_str(r#"{"initial": 8}"#).unwrap();
        assert_eq!(schedule.max, MAX_PREC);
        assert_eq!(schedule.precisions(), vec![8, 16, 32, 53]);
    }
}
