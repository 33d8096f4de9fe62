//! Fixed-point prices and quantities.
//!
//! All book arithmetic runs on unsigned integers scaled by 1e8. The scale
//! is one decimal finer than the smallest tick the wire format can carry,
//! so quantities that differ by less than 1e-8 collapse to the same value
//! at ingest and "dust" residues cannot exist inside the engine.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places carried by a [`Fixed`] value.
pub const SCALE: u32 = 8;

/// Raw representation of 1.0.
pub const UNIT: u64 = 100_000_000;

/// An unsigned fixed-point decimal with 8 fractional digits.
///
/// Used for both prices and quantities. Comparison, equality and hashing
/// are exact integer operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(u64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(UNIT);

    /// Build from a raw scaled integer (`raw = value * 1e8`).
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Fixed(raw)
    }

    /// The raw scaled integer.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whole units, ignoring the fractional part.
    #[inline]
    pub const fn from_int(units: u64) -> Self {
        Fixed(units * UNIT)
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert a parsed decimal, rounding half-away-from-zero at the 8th
    /// fractional digit. Returns `None` for negative values and values
    /// whose integer part does not fit the scaled u64 range.
    pub fn from_decimal(d: Decimal) -> Option<Self> {
        if d.is_sign_negative() && !d.is_zero() {
            return None;
        }
        let scaled = d
            .round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::from(UNIT))?;
        scaled.to_u64().map(Fixed)
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Fixed)
    }
}

impl Add for Fixed {
    type Output = Fixed;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Fixed(self.0 + rhs.0)
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        debug_assert!(self.0 >= rhs.0, "fixed-point underflow");
        Fixed(self.0 - rhs.0)
    }
}

impl SubAssign for Fixed {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        debug_assert!(self.0 >= rhs.0, "fixed-point underflow");
        self.0 -= rhs.0;
    }
}

/// Renders without superfluous digits: `100`, `100.5`, `0.00000001`.
/// Allocation-free so it is safe to call while formatting envelopes.
impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / UNIT;
        let mut frac = self.0 % UNIT;
        if frac == 0 {
            return write!(f, "{int}");
        }
        let mut width = SCALE as usize;
        while frac % 10 == 0 {
            frac /= 10;
            width -= 1;
        }
        write!(f, "{int}.{frac:0width$}")
    }
}
