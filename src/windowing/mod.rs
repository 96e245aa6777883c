//! Decay shapes.
//!
//! A decay shape is described by an infinite, non-decreasing sequence of
//! window lengths ([`WindowLengths`]), newest window first. Laid out backwards
//! from "now", the lengths define window markers over element ages: age 0 is
//! the most recent element. A [`Windowing`] answers the one question the merge
//! scheduler needs: given two adjacent windows covering insert positions
//! `[tl, tr]`, at which future element count will that range fall entirely
//! inside a single decay window?

mod generic;
mod lengths;
mod rational_power;

pub use generic::GenericWindowing;
pub use lengths::{ConstantLengths, ExponentialLengths, RationalPowerLengths, WindowLengths};
pub use rational_power::RationalPowerWindowing;

use crate::error::{Result, StoreError};

/// Age-based decay markers consulted by the merge scheduler.
///
/// Implementations grow their internal state lazily, so queries take
/// `&mut self`.
pub trait Windowing: Send + Sync {
    /// Smallest element count `T' >= t` at which insert positions
    /// `[tl, tr]` (0-indexed, `tl <= tr < t`) lie inside one window.
    ///
    /// Returns `None` when the decay's maximum window length can never cover
    /// a span of `tr - tl + 1` elements.
    fn first_containing_time(&mut self, tl: u64, tr: u64, t: u64) -> Option<u64>;

    /// Capacity of the newest window.
    fn first_window_size(&self) -> u64;

    /// Lengths of the newest windows, newest first, for the longest prefix
    /// whose total length does not exceed `n`.
    fn windows_covering_upto(&mut self, n: u64) -> Vec<u64>;
}

/// Built-in decay shapes.
///
/// `Decay` validates its parameters and picks the fastest [`Windowing`] for
/// the shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decay {
    /// Window lengths `ceil(base^k)` for `k = 0, 1, 2, ...`.
    Exponential {
        /// Growth factor, must be at least 1.
        base: f64,
    },
    /// For `k = 1, 2, ...`: `r * k^(p-1)` windows each of length `s * k^q`.
    RationalPower {
        /// Window count exponent, at least 1.
        p: u32,
        /// Window length exponent.
        q: u32,
        /// Window count multiplier, at least 1.
        r: u64,
        /// Window length multiplier, at least 1.
        s: u64,
    },
    /// Every window holds exactly `length` elements.
    Constant {
        /// Window length, at least 1.
        length: u64,
    },
}

impl Decay {
    /// Exponential decay with the given growth factor.
    pub fn exponential(base: f64) -> Self {
        Decay::Exponential { base }
    }

    /// Rational-power decay `(p, q, r, s)`.
    pub fn rational_power(p: u32, q: u32, r: u64, s: u64) -> Self {
        Decay::RationalPower { p, q, r, s }
    }

    /// Fixed-length windows.
    pub fn constant(length: u64) -> Self {
        Decay::Constant { length }
    }

    /// Validates the parameters and builds the windowing for this shape.
    ///
    /// Rational-power shapes whose marker sums have a closed form use
    /// [`RationalPowerWindowing`]; everything else walks its length sequence
    /// through [`GenericWindowing`].
    pub fn build(&self) -> Result<Box<dyn Windowing>> {
        match *self {
            Decay::Exponential { base } => {
                if !base.is_finite() || base < 1.0 {
                    return Err(StoreError::config(format!(
                        "exponential base must be a finite number >= 1, got {base}"
                    )));
                }
                Ok(Box::new(GenericWindowing::new(ExponentialLengths::new(
                    base,
                ))))
            }
            Decay::RationalPower { p, q, r, s } => {
                if p == 0 || r == 0 || s == 0 {
                    return Err(StoreError::config(format!(
                        "rational-power parameters must satisfy p >= 1, r >= 1, s >= 1, \
                         got p={p} q={q} r={r} s={s}"
                    )));
                }
                match RationalPowerWindowing::new(p, q, r, s) {
                    Some(windowing) => Ok(Box::new(windowing)),
                    None => Ok(Box::new(GenericWindowing::new(
                        RationalPowerLengths::new(p, q, r, s),
                    ))),
                }
            }
            Decay::Constant { length } => {
                if length == 0 {
                    return Err(StoreError::config("constant window length must be >= 1"));
                }
                Ok(Box::new(GenericWindowing::new(ConstantLengths::new(length))))
            }
        }
    }
}
