use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const USDC_CURRENCY_CODE: &str = "USDC";
/// USDC carries six decimal places on every chain we care about.
pub const USDC_DECIMALS: u32 = 6;

const MICRO_PER_USDC: i64 = 1_000_000;

//--------------------------------------     MicroUsdc       ---------------------------------------------------------
/// An amount of USDC in micro-units (one millionth of a dollar), stored as a signed 64-bit integer.
///
/// All ledger arithmetic happens in micro-units so that amounts survive database round-trips exactly.
/// Conversions from on-chain `uint256` values must go through [`MicroUsdc::try_from`] to catch overflow.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MicroUsdc(i64);

op!(binary MicroUsdc, Add, add);
op!(binary MicroUsdc, Sub, sub);
op!(inplace MicroUsdc, SubAssign, sub_assign);
op!(unary MicroUsdc, Neg, neg);

impl Mul<i64> for MicroUsdc {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MicroUsdc {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in microUSDC: {0}")]
pub struct MicroUsdcConversionError(String);

impl From<i64> for MicroUsdc {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MicroUsdc {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MicroUsdc {}

impl TryFrom<u128> for MicroUsdc {
    type Error = MicroUsdcConversionError;

    fn try_from(value: u128) -> Result<Self, Self::Error> {
        if value > i64::MAX as u128 {
            Err(MicroUsdcConversionError(format!("Value {value} is too large to convert to MicroUsdc")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MicroUsdc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dollars = self.0 as f64 / MICRO_PER_USDC as f64;
        write!(f, "${dollars:0.2}")
    }
}

impl FromStr for MicroUsdc {
    type Err = MicroUsdcConversionError;

    /// Parses a decimal dollar amount ("249.50") into micro-units, truncating past six decimals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('$');
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let whole = whole.parse::<i64>().map_err(|e| MicroUsdcConversionError(format!("{s}: {e}")))?;
        let mut frac_micro = 0i64;
        if !frac.is_empty() {
            let digits: String = frac.chars().take(USDC_DECIMALS as usize).collect();
            let parsed = digits.parse::<i64>().map_err(|e| MicroUsdcConversionError(format!("{s}: {e}")))?;
            frac_micro = parsed * 10i64.pow(USDC_DECIMALS - digits.len() as u32);
        }
        let sign = if whole < 0 { -1 } else { 1 };
        whole
            .checked_mul(MICRO_PER_USDC)
            .and_then(|w| w.checked_add(sign * frac_micro))
            .map(Self)
            .ok_or_else(|| MicroUsdcConversionError(format!("{s} overflows microUSDC")))
    }
}

impl MicroUsdc {
    pub const fn from_micro(value: i64) -> Self {
        Self(value)
    }

    pub const fn from_whole(dollars: i64) -> Self {
        Self(dollars * MICRO_PER_USDC)
    }

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents * MICRO_PER_USDC / 100)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// The amount in whole cents, rounding towards zero. Stripe amounts are expressed in cents.
    pub fn as_cents(&self) -> i64 {
        self.0 / (MICRO_PER_USDC / 100)
    }

    /// Applies a basis-point fraction using 128-bit intermediate arithmetic.
    pub fn bps(&self, bps: i64) -> Self {
        let scaled = (self.0 as i128 * bps as i128) / 10_000;
        #[allow(clippy::cast_possible_truncation)]
        Self(scaled as i64)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_formats_as_dollars() {
        assert_eq!(MicroUsdc::from_whole(500).to_string(), "$500.00");
        assert_eq!(MicroUsdc::from_cents(24_950).to_string(), "$249.50");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("249.50".parse::<MicroUsdc>().unwrap(), MicroUsdc::from_cents(24_950));
        assert_eq!("$1".parse::<MicroUsdc>().unwrap(), MicroUsdc::from_whole(1));
        assert_eq!("0.000001".parse::<MicroUsdc>().unwrap(), MicroUsdc::from_micro(1));
    }

    #[test]
    fn bps_matches_expected_payout_amounts() {
        // 49.9% of the $500 unlock price is the direct bonus
        assert_eq!(MicroUsdc::from_whole(500).bps(4_990), MicroUsdc::from_cents(24_950));
        // 3.5% fiat processing fee on $100
        let gross = MicroUsdc::from_whole(100);
        assert_eq!(gross - gross.bps(350), MicroUsdc::from_cents(9_650));
    }

    #[test]
    fn u128_conversion_guards_overflow() {
        assert!(MicroUsdc::try_from(u128::from(u64::MAX) * 2).is_err());
        assert_eq!(MicroUsdc::try_from(1_000_000u128).unwrap(), MicroUsdc::from_whole(1));
    }
}
