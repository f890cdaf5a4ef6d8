//! Complex balls: the enclosure number type every algorithm in this crate works over.
//!
//! A [`ComplexBall`] is a disk in the complex plane, stored as a midpoint and a
//! radius, with the guarantee that the true value lies inside the disk. All
//! arithmetic is conservative: the disk returned by an operation contains every
//! result obtainable from values in the operand disks.
//!
//! ## Precision model
//!
//! Each ball carries a working precision `prec` (in bits, at most [`MAX_PREC`]).
//! After every operation the midpoint is rounded to `prec` significant bits and
//! the rounding error is folded into the radius. Lowering `prec` therefore gives
//! an honest, coarser enclosure, and doubling it (up to the `f64` mantissa width)
//! is how callers escalate precision after a [`crate::error::InvSubError`]
//! precision failure.
//!
//! Midpoint rounding errors are computed exactly with error-free transformations
//! (`two_sum`, `two_prod`), so exact operations on exactly representable inputs
//! yield exact balls. Radii are accumulated with upward-inflated `f64` arithmetic.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
};

/// Largest supported working precision: the mantissa width of `f64`.
pub const MAX_PREC: u32 = 53;

/// Smallest supported working precision.
pub const MIN_PREC: u32 = 2;

/// Accuracy reported for balls that carry no information at all.
const NO_ACCURACY: i64 = -(1 << 30);

/// Rounds a non-negative magnitude upward to absorb the rounding of the `f64`
/// operations that produced it.
#[inline]
fn up(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * (1.0 + 4.0 * f64::EPSILON) + f64::MIN_POSITIVE
    }
}

/// Rounds a non-negative magnitude downward.
#[inline]
fn down(x: f64) -> f64 {
    (x * (1.0 - 4.0 * f64::EPSILON)).max(0.0)
}

/// Error-free transformation: `a + b == s + e` exactly.
#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bb = s - a;
    let e = (a - (s - bb)) + (b - bb);
    (s, e)
}

/// Error-free transformation: `a * b == p + e` exactly (barring underflow).
#[inline]
fn two_prod(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    let e = a.mul_add(b, -p);
    (p, e)
}

/// Rounds `x` to `prec` significant bits, returning the rounded value and the
/// exact magnitude of the rounding error.
fn round_to_prec(x: f64, prec: u32) -> (f64, f64) {
    if prec >= MAX_PREC || x == 0.0 || !x.is_finite() {
        return (x, 0.0);
    }
    let exp = x.abs().log2().floor() as i32;
    let shift = exp - prec as i32 + 1;
    if shift < -1000 {
        // The grid would be subnormal; keep the f64 value.
        return (x, 0.0);
    }
    let scale = 2f64.powi(shift);
    let rounded = (x / scale).round() * scale;
    // `rounded` and `x` are within a factor two of each other, so the
    // difference is exact.
    (rounded, (rounded - x).abs())
}

/// A complex ball `{ z : |z - mid| <= rad }` at a given working precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexBall {
    mid: Complex64,
    rad: f64,
    prec: u32,
}

impl ComplexBall {
    /// Creates a ball from its midpoint and radius. The midpoint is rounded to
    /// `prec` bits and the rounding error is added to the radius.
    pub fn new(mid: Complex64, rad: f64, prec: u32) -> Self {
        let prec = prec.clamp(MIN_PREC, MAX_PREC);
        if !mid.re.is_finite() || !mid.im.is_finite() || !rad.is_finite() || rad < 0.0 {
            return Self::indeterminate(prec);
        }
        Self::finish(mid, 0.0, rad, prec)
    }

    /// An exact ball (zero radius before rounding to `prec`).
    pub fn exact(mid: Complex64, prec: u32) -> Self {
        Self::new(mid, 0.0, prec)
    }

    /// Embeds a real number.
    pub fn from_f64(x: f64, prec: u32) -> Self {
        Self::exact(Complex64::new(x, 0.0), prec)
    }

    /// Embeds `re + i·im`.
    pub fn from_parts(re: f64, im: f64, prec: u32) -> Self {
        Self::exact(Complex64::new(re, im), prec)
    }

    /// Embeds an integer, accounting for the conversion error of large values.
    pub fn from_i64(x: i64, prec: u32) -> Self {
        let approx = x as f64;
        let err = (approx as i128 - x as i128).unsigned_abs() as f64;
        Self::new(Complex64::new(approx, 0.0), up(err), prec)
    }

    /// Encloses the rational number `num / den`.
    pub fn from_rational(num: i64, den: i64, prec: u32) -> Self {
        Self::from_i64(num, prec) / Self::from_i64(den, prec)
    }

    pub fn zero(prec: u32) -> Self {
        Self::exact(Complex64::new(0.0, 0.0), prec)
    }

    pub fn one(prec: u32) -> Self {
        Self::exact(Complex64::new(1.0, 0.0), prec)
    }

    /// The ball containing every complex number.
    pub fn indeterminate(prec: u32) -> Self {
        ComplexBall {
            mid: Complex64::new(0.0, 0.0),
            rad: f64::INFINITY,
            prec: prec.clamp(MIN_PREC, MAX_PREC),
        }
    }

    #[inline]
    pub fn mid(&self) -> Complex64 {
        self.mid
    }

    #[inline]
    pub fn rad(&self) -> f64 {
        self.rad
    }

    #[inline]
    pub fn prec(&self) -> u32 {
        self.prec
    }

    /// Returns `true` when the radius is zero.
    pub fn is_exact(&self) -> bool {
        self.rad == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.rad.is_finite()
    }

    /// Certified upper bound of `|z|` over the ball.
    pub fn above_abs(&self) -> f64 {
        up(up(self.mid.norm()) + self.rad)
    }

    /// Certified lower bound of `|z|` over the ball.
    pub fn below_abs(&self) -> f64 {
        down(down(self.mid.norm()) - self.rad)
    }

    /// `true` if zero is certainly not in the ball.
    pub fn is_nonzero(&self) -> bool {
        self.rad.is_finite() && down(self.mid.norm()) > self.rad
    }

    /// `true` if zero may be in the ball.
    pub fn contains_zero(&self) -> bool {
        !self.is_nonzero()
    }

    /// `true` if the point `z` lies in the ball.
    pub fn contains(&self, z: Complex64) -> bool {
        down((z - self.mid).norm()) <= self.rad
    }

    /// `true` if the two balls may share a value.
    pub fn overlaps(&self, other: &ComplexBall) -> bool {
        down((self.mid - other.mid).norm()) <= up(self.rad + other.rad)
    }

    /// Returns a copy with the radius enlarged by `err`.
    pub fn add_error(&self, err: f64) -> Self {
        if !err.is_finite() {
            return Self::indeterminate(self.prec);
        }
        ComplexBall {
            mid: self.mid,
            rad: up(self.rad + err.abs()),
            prec: self.prec,
        }
    }

    /// Re-rounds the midpoint at another working precision.
    pub fn with_prec(&self, prec: u32) -> Self {
        Self::finish(self.mid, 0.0, self.rad, prec.clamp(MIN_PREC, MAX_PREC))
    }

    /// Number of bits of the value that are certainly correct.
    ///
    /// For a ball that contains zero, the accuracy is measured absolutely
    /// (`-log2(rad)`), so entries that vanish up to rounding do not dominate
    /// the accuracy of a matrix. The result never exceeds the working precision.
    pub fn accuracy(&self) -> i64 {
        let prec = self.prec as i64;
        if self.rad == 0.0 {
            return prec;
        }
        if !self.rad.is_finite() {
            return NO_ACCURACY;
        }
        let magnitude = self.mid.norm();
        let bits = if magnitude == 0.0 || self.contains_zero() {
            -self.rad.log2()
        } else {
            (magnitude / self.rad).log2()
        };
        (bits.floor() as i64).min(prec)
    }

    /// Multiplicative inverse; the indeterminate ball if `self` may vanish.
    pub fn inv(&self) -> Self {
        if !self.is_nonzero() {
            return Self::indeterminate(self.prec);
        }
        let m = self.mid;
        let (q, mid_err) = if m.im == 0.0 {
            let q = 1.0 / m.re;
            // The residual 1 - m·q is exact, and 1/m - q = residual / m.
            let residual = (-m.re).mul_add(q, 1.0);
            (Complex64::new(q, 0.0), up(residual.abs() / m.re.abs()))
        } else {
            let d = m.re * m.re + m.im * m.im;
            let q = Complex64::new(m.re / d, -m.im / d);
            (q, up(8.0 * f64::EPSILON * q.norm()))
        };
        // |1/z - 1/m| <= r / (|m| (|m| - r)) for |z - m| <= r < |m|.
        let lo = down(m.norm());
        let gap = down(lo - self.rad);
        let spread = if self.rad == 0.0 {
            0.0
        } else {
            up(self.rad / down(lo * gap))
        };
        Self::finish(q, mid_err, spread, self.prec)
    }

    /// Rounds the midpoint to `prec` bits and assembles the ball.
    fn finish(mid: Complex64, mid_err: f64, rad: f64, prec: u32) -> Self {
        if !mid.re.is_finite() || !mid.im.is_finite() || !rad.is_finite() || !mid_err.is_finite()
        {
            return Self::indeterminate(prec);
        }
        let (re, err_re) = round_to_prec(mid.re, prec);
        let (im, err_im) = round_to_prec(mid.im, prec);
        ComplexBall {
            mid: Complex64::new(re, im),
            rad: up(rad + mid_err + err_re + err_im),
            prec,
        }
    }
}

impl Default for ComplexBall {
    fn default() -> Self {
        Self::zero(MAX_PREC)
    }
}

impl fmt::Display for ComplexBall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rad == 0.0 {
            write!(f, "{}", self.mid)
        } else {
            write!(f, "[{} +/- {:.2e}]", self.mid, self.rad)
        }
    }
}

impl Add for ComplexBall {
    type Output = ComplexBall;

    fn add(self, rhs: ComplexBall) -> ComplexBall {
        let (re, e_re) = two_sum(self.mid.re, rhs.mid.re);
        let (im, e_im) = two_sum(self.mid.im, rhs.mid.im);
        ComplexBall::finish(
            Complex64::new(re, im),
            up(e_re.abs() + e_im.abs()),
            up(self.rad + rhs.rad),
            self.prec.min(rhs.prec),
        )
    }
}

impl Neg for ComplexBall {
    type Output = ComplexBall;

    fn neg(self) -> ComplexBall {
        ComplexBall {
            mid: -self.mid,
            rad: self.rad,
            prec: self.prec,
        }
    }
}

impl Sub for ComplexBall {
    type Output = ComplexBall;

    fn sub(self, rhs: ComplexBall) -> ComplexBall {
        self + (-rhs)
    }
}

impl Mul for ComplexBall {
    type Output = ComplexBall;

    fn mul(self, rhs: ComplexBall) -> ComplexBall {
        let (a, b) = (self.mid, rhs.mid);

        let (p1, e1) = two_prod(a.re, b.re);
        let (p2, e2) = two_prod(a.im, b.im);
        let (re, e3) = two_sum(p1, -p2);

        let (p3, e4) = two_prod(a.re, b.im);
        let (p4, e5) = two_prod(a.im, b.re);
        let (im, e6) = two_sum(p3, p4);

        let mut mid_err = up(e1.abs() + e2.abs() + e3.abs() + e4.abs() + e5.abs() + e6.abs());
        if re == 0.0 && im == 0.0 && a.norm() != 0.0 && b.norm() != 0.0 {
            // Underflow of a genuinely nonzero product.
            mid_err = up(mid_err + f64::MIN_POSITIVE);
        }

        let rad = up(up(a.norm()) * rhs.rad)
            + up(up(b.norm()) * self.rad)
            + up(self.rad * rhs.rad);

        ComplexBall::finish(
            Complex64::new(re, im),
            mid_err,
            up(rad),
            self.prec.min(rhs.prec),
        )
    }
}

impl Div for ComplexBall {
    type Output = ComplexBall;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn div(self, rhs: ComplexBall) -> ComplexBall {
        let prec = self.prec.min(rhs.prec);
        if !rhs.is_nonzero() {
            return ComplexBall::indeterminate(prec);
        }
        self * rhs.inv()
    }
}

impl<'a> Add<&'a ComplexBall> for &'a ComplexBall {
    type Output = ComplexBall;

    fn add(self, rhs: &'a ComplexBall) -> ComplexBall {
        *self + *rhs
    }
}

impl<'a> Sub<&'a ComplexBall> for &'a ComplexBall {
    type Output = ComplexBall;

    fn sub(self, rhs: &'a ComplexBall) -> ComplexBall {
        *self - *rhs
    }
}

impl<'a> Mul<&'a ComplexBall> for &'a ComplexBall {
    type Output = ComplexBall;

    fn mul(self, rhs: &'a ComplexBall) -> ComplexBall {
        *self * *rhs
    }
}

impl<'a> Div<&'a ComplexBall> for &'a ComplexBall {
    type Output = ComplexBall;

    fn div(self, rhs: &'a ComplexBall) -> ComplexBall {
        *self / *rhs
    }
}
