//! This module defines the custom error types for the library.
//!
//! Every failure that can arise while certifying an invariant subspace is
//! centralized into a single enum, [`InvSubErrorKind`], hidden behind the
//! opaque [`InvSubError`].
//!
//! Two families of errors exist. Usage errors (an empty family, matrices of
//! incompatible shapes, an invalid precision) are fatal and must not be
//! retried. Precision failures signal that some step could not be certified
//! with the enclosures at hand; they are always recoverable by re-deriving the
//! inputs at a higher working precision and calling again. Callers tell them
//! apart with [`InvSubError::is_precision_failure`].
//!
//! [`faer::linalg::evd::EvdError`] does not implement [`std::error::Error`], so
//! it is wrapped by value rather than through `#[from]`.
use thiserror::Error;

/// Represents all possible errors that can occur during an invariant-subspace search.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct InvSubError(#[from] InvSubErrorKind);

/// Private enum containing the distinct kinds of errors.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum InvSubErrorKind {
    /// A step required a certificate that the current enclosures cannot provide.
    #[error("Precision failure: {0}")]
    Precision(String),

    /// The search was called without any matrix.
    #[error("Invalid input: the matrix family is empty.")]
    EmptyFamily,

    /// A matrix was expected to be square.
    #[error("Invalid input: expected a square matrix, got {nrows}x{ncols}.")]
    NotSquare { nrows: usize, ncols: usize },

    /// Two operands have incompatible dimensions.
    #[error("Dimension mismatch: expected {expected}, got {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The requested working precision is outside the supported range.
    #[error("Invalid precision: {prec} bits (supported range is 2..={max}).")]
    InvalidPrecision { prec: u32, max: u32 },

    /// The escalation schedule ran out of attempts while failures persisted.
    #[error("Precision exhausted after {attempts} attempts (last precision {prec} bits): {last}")]
    PrecisionExhausted {
        attempts: usize,
        prec: u32,
        last: String,
    },

    /// The caller-provided family builder failed.
    #[error("The family builder failed: {0}")]
    Builder(String),

    /// Wraps an error from [`faer`]'s eigenvalue solver, used for clustering.
    #[error("A numerical error occurred while computing eigenvalues: {0:?}")]
    EigenSolver(faer::linalg::evd::EvdError),
}

impl InvSubError {
    /// Shorthand for a retryable precision failure.
    pub(crate) fn precision(reason: impl Into<String>) -> Self {
        InvSubErrorKind::Precision(reason.into()).into()
    }

    /// Returns `true` when re-running at a higher precision may succeed.
    pub fn is_precision_failure(&self) -> bool {
        matches!(self.0, InvSubErrorKind::Precision(_))
    }

    /// Returns `true` for input errors that no amount of precision can fix.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self.0,
            InvSubErrorKind::EmptyFamily
                | InvSubErrorKind::NotSquare { .. }
                | InvSubErrorKind::DimensionMismatch { .. }
                | InvSubErrorKind::InvalidPrecision { .. }
        )
    }
}

// Manually implement PartialEq for the public error type.
impl PartialEq for InvSubError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
