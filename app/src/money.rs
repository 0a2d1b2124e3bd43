//! Fixed-point money amounts. Wallet balances, top-ups and order totals are all stored as
//! `NUMERIC(12, 2)`, so every [`Amount`] entering the system is checked against that shape.

use rust_decimal::Decimal;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional digits kept by the store.
pub const SCALE: u32 = 2;

/// Largest value a `NUMERIC(12, 2)` column can hold.
const MAX_UNITS: i64 = 9_999_999_999_99;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is not a number")]
    NotANumber,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount has more than {} decimal places", SCALE)]
    TooPrecise,
    #[error("amount is too large")]
    TooLarge,
}

#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// Builds an amount from a count of minor units, e.g. `Amount::from_minor(5000)` is 50.00.
    pub fn from_minor(units: i64) -> Self {
        Self(Decimal::new(units, SCALE))
    }

    /// Parses user input into a strictly positive amount that fits the store.
    pub fn parse_positive(s: &str) -> Result<Self, AmountError> {
        Self::positive(parse_decimal(s)?)
    }

    /// Parses a signed amount, e.g. a balance adjustment delta.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        Self::fitting(parse_decimal(s)?)
    }

    /// Validates a decimal as a strictly positive amount that fits the store.
    pub fn positive(amount: Decimal) -> Result<Self, AmountError> {
        let amount = Self::fitting(amount)?;
        if amount.is_positive() {
            Ok(amount)
        } else {
            Err(AmountError::NotPositive)
        }
    }

    /// Validates a signed decimal (e.g. a balance adjustment delta).
    pub fn fitting(amount: Decimal) -> Result<Self, AmountError> {
        let normalized = amount.normalize();
        if normalized.scale() > SCALE {
            return Err(AmountError::TooPrecise);
        }
        if normalized.abs() > Decimal::new(MAX_UNITS, SCALE) {
            return Err(AmountError::TooLarge);
        }
        let mut amount = normalized;
        amount.rescale(SCALE);
        Ok(Self(amount))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

fn parse_decimal(s: &str) -> Result<Decimal, AmountError> {
    Decimal::from_str(s.trim()).map_err(|_| AmountError::NotANumber)
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        value.rescale(SCALE);
        write!(f, "{}", value)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("50", "50.00")]
    #[case("50.5", "50.50")]
    #[case(" 0.01 ", "0.01")]
    #[case("30.10", "30.10")]
    fn parse_positive_accepts_store_shaped_amounts(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Amount::parse_positive(input).unwrap().to_string(), expected);
    }

    #[rstest]
    #[case("", AmountError::NotANumber)]
    #[case("fifty", AmountError::NotANumber)]
    #[case("0", AmountError::NotPositive)]
    #[case("-3.00", AmountError::NotPositive)]
    #[case("1.005", AmountError::TooPrecise)]
    #[case("10000000000.00", AmountError::TooLarge)]
    fn parse_positive_rejects(#[case] input: &str, #[case] expected: AmountError) {
        assert_eq!(Amount::parse_positive(input), Err(expected));
    }

    #[test]
    fn fitting_allows_negative_deltas() {
        let delta = Amount::fitting(Decimal::new(-1250, 2)).unwrap();
        assert!(delta.is_negative());
        assert_eq!(delta.abs(), Amount::from_minor(1250));
    }

    #[rstest]
    #[case("-12.50", -1250)]
    #[case("7", 700)]
    fn parse_keeps_the_sign(#[case] input: &str, #[case] minor: i64) {
        assert_eq!(Amount::parse(input), Ok(Amount::from_minor(minor)));
    }

    #[test]
    fn trailing_zeroes_do_not_count_as_precision() {
        let amount = Amount::parse_positive("12.3400").unwrap();
        assert_eq!(amount, Amount::from_minor(1234));
    }

    #[test]
    fn sums_and_differences() {
        let total: Amount = [Amount::from_minor(1000), Amount::from_minor(2050)]
            .into_iter()
            .sum();
        assert_eq!(total, Amount::from_minor(3050));
        assert_eq!(total - Amount::from_minor(50), Amount::from_minor(3000));
        assert_eq!(-total, Amount::from_minor(-3050));
    }
}
