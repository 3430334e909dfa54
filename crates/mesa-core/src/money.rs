//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Zero-Decimal Currency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  The restaurant trades in a currency without a fractional unit.         │
//! │                                                                         │
//! │    A menu price of $44,500 is stored as 44500 minor units.              │
//! │    One minor unit (1) is the smallest amount a cashier can tender.      │
//! │                                                                         │
//! │  Every amount (order total, payment, cash movement, drawer balance)     │
//! │  is an integer count of minor units. No floats, ever.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mesa_core::money::Money;
//!
//! let total = Money::from_minor(44_500);
//! let paid = Money::from_minor(44_000);
//!
//! assert_eq!((total - paid).minor(), 500);
//! assert!(!total.within(paid, Money::from_minor(1)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor units of a zero-decimal currency.
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds, withdrawals and
///   signed drawer differences
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Transparent in SQL**: stored as a plain INTEGER column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use mesa_core::money::Money;
    ///
    /// let price = Money::from_minor(12_900);
    /// assert_eq!(price.minor(), 12_900);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    ///
    /// ## Example
    /// ```rust
    /// use mesa_core::money::Money;
    ///
    /// let refund = Money::from_minor(-25_000);
    /// assert_eq!(refund.abs().minor(), 25_000);
    /// ```
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns true when `self` and `other` differ by at most `tolerance`.
    ///
    /// ## Example
    /// ```rust
    /// use mesa_core::money::Money;
    ///
    /// let one = Money::from_minor(1);
    /// assert!(Money::from_minor(44_500).within(Money::from_minor(44_501), one));
    /// assert!(!Money::from_minor(44_500).within(Money::from_minor(44_000), one));
    /// ```
    #[inline]
    pub const fn within(&self, other: Money, tolerance: Money) -> bool {
        self.0.abs_diff(other.0) <= tolerance.0.unsigned_abs()
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money with a currency sign and thousands separators: `$44,500`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        write!(f, "{}${}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Money::from_minor(0).to_string(), "$0");
        assert_eq!(Money::from_minor(999).to_string(), "$999");
        assert_eq!(Money::from_minor(44_500).to_string(), "$44,500");
        assert_eq!(Money::from_minor(1_234_567).to_string(), "$1,234,567");
        assert_eq!(Money::from_minor(-3_000).to_string(), "-$3,000");
    }

    #[test]
    fn test_arithmetic() {
        let mut m = Money::from_minor(100_000);
        m += Money::from_minor(25_000);
        m -= Money::from_minor(3_000);
        assert_eq!(m.minor(), 122_000);
        assert_eq!((-m).minor(), -122_000);
    }

    #[test]
    fn test_sum() {
        let amounts = [Money::from_minor(20_000), Money::from_minor(24_500)];
        let total: Money = amounts.iter().sum();
        assert_eq!(total, Money::from_minor(44_500));
    }

    #[test]
    fn test_within_tolerance() {
        let one = Money::from_minor(1);
        assert!(Money::from_minor(100).within(Money::from_minor(99), one));
        assert!(Money::from_minor(100).within(Money::from_minor(101), one));
        assert!(!Money::from_minor(100).within(Money::from_minor(102), one));
    }

    #[test]
    fn test_within_at_the_extremes() {
        let one = Money::from_minor(1);
        assert!(!Money::from_minor(i64::MAX).within(Money::from_minor(i64::MIN), one));
        assert!(Money::from_minor(i64::MIN).within(Money::from_minor(i64::MIN + 1), one));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)).is_none());
        assert_eq!(
            Money::from_minor(1).checked_add(Money::from_minor(2)),
            Some(Money::from_minor(3))
        );
    }
}
