//! Fixed-point amounts.
//!
//! Every monetary value is an unsigned integer count of its smallest unit:
//!
//! | Type           | Unit                          | Decimals |
//! |----------------|-------------------------------|----------|
//! | [`NativeAmount`] | token base units (wei-like) | 18       |
//! | [`UsdAmount`]    | cents                       | 2        |
//! | [`UsdPrice`]     | micro-dollars per token     | 6        |
//! | [`Percent`]      | hundredths of a percent     | 2        |
//!
//! Parsing from decimal strings happens once, at the boundary, through
//! [`FromStr`]. Negative, empty, non-numeric or over-precise input is
//! rejected with [`TrackerError::InvalidAmount`]. The same decimal strings
//! are used as the serde representation so persisted records stay readable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TrackerError};

pub const NATIVE_DECIMALS: u32 = 18;
pub const USD_DECIMALS: u32 = 2;
pub const PRICE_DECIMALS: u32 = 6;
pub const PERCENT_DECIMALS: u32 = 2;

const NATIVE_ONE: u128 = 10u128.pow(NATIVE_DECIMALS);
/// Micro-dollars per cent.
const MICROS_PER_CENT: u128 = 10u128.pow(PRICE_DECIMALS - USD_DECIMALS);
/// `100.00%` expressed in hundredths.
const PERCENT_SCALE: u128 = 100 * 10u128.pow(PERCENT_DECIMALS);

macro_rules! fixed_point {
    ($(#[$meta:meta])* $name:ident, $decimals:expr, $pad:expr) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(u128);

        impl $name {
            pub const ZERO: Self = Self(0);

            /// Wrap a raw count of the smallest unit.
            pub const fn from_raw(raw: u128) -> Self {
                Self(raw)
            }

            /// The raw count of the smallest unit.
            pub const fn raw(self) -> u128 {
                self.0
            }

            pub const fn is_zero(self) -> bool {
                self.0 == 0
            }

            pub fn saturating_add(self, other: Self) -> Self {
                Self(self.0.saturating_add(other.0))
            }
        }

        impl FromStr for $name {
            type Err = TrackerError;

            fn from_str(s: &str) -> Result<Self> {
                parse_fixed(s, $decimals).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&format_fixed(self.0, $decimals, $pad))
            }
        }

        impl TryFrom<String> for $name {
            type Error = TrackerError;

            fn try_from(s: String) -> Result<Self> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> String {
                v.to_string()
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, Self::saturating_add)
            }
        }
    };
}

fixed_point!(
    /// A token amount in base units (18 decimals), e.g. `"1.5"` native coins.
    NativeAmount,
    NATIVE_DECIMALS,
    false
);

fixed_point!(
    /// A USD value in cents, always displayed with two decimals.
    UsdAmount,
    USD_DECIMALS,
    true
);

fixed_point!(
    /// USD price of one whole token, in micro-dollars.
    UsdPrice,
    PRICE_DECIMALS,
    false
);

fixed_point!(
    /// Percentage in hundredths, always displayed with two decimals.
    Percent,
    PERCENT_DECIMALS,
    true
);

impl UsdPrice {
    /// Build a price from a floating point quote as returned by JSON price APIs.
    ///
    /// Returns `None` for non-finite, non-positive or sub-micro-dollar quotes.
    pub fn from_f64(usd: f64) -> Option<Self> {
        if !usd.is_finite() || usd <= 0.0 {
            return None;
        }
        let micros = (usd * 10f64.powi(PRICE_DECIMALS as i32)).round();
        if micros < 1.0 || micros >= u128::MAX as f64 {
            return None;
        }
        Some(Self(micros as u128))
    }

    /// USD value of `amount` at this price, rounded half-up to the cent.
    pub fn value_of(self, amount: NativeAmount) -> UsdAmount {
        let whole = amount.0 / NATIVE_ONE;
        let frac = amount.0 % NATIVE_ONE;
        let micros = whole
            .saturating_mul(self.0)
            .saturating_add(frac.saturating_mul(self.0) / NATIVE_ONE);
        UsdAmount(micros.saturating_add(MICROS_PER_CENT / 2) / MICROS_PER_CENT)
    }
}

impl Percent {
    /// `round2(part / whole * 100)`; zero when `whole` is zero.
    pub fn of(part: UsdAmount, whole: UsdAmount) -> Self {
        if whole.is_zero() {
            return Self::ZERO;
        }
        let numerator = part
            .0
            .saturating_mul(PERCENT_SCALE)
            .saturating_mul(2)
            .saturating_add(whole.0);
        Self(numerator / whole.0.saturating_mul(2))
    }
}

fn invalid(input: &str, reason: &str) -> TrackerError {
    TrackerError::InvalidAmount(format!("{input:?}: {reason}"))
}

/// Parse an unsigned decimal string into a count of `10^-decimals` units.
fn parse_fixed(input: &str, decimals: u32) -> Result<u128> {
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid(input, "empty amount"));
    }
    if s.starts_with('-') {
        return Err(invalid(input, "negative amounts are not accepted"));
    }

    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid(input, "no digits"));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid(input, "not a decimal number"));
    }
    if frac_part.len() > decimals as usize {
        return Err(invalid(
            input,
            &format!("more than {decimals} decimal places"),
        ));
    }

    let too_large = || invalid(input, "amount too large");
    let scale = 10u128.pow(decimals);

    let int_value = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<u128>().map_err(|_| too_large())?
    };
    let frac_value = if frac_part.is_empty() {
        0
    } else {
        let padding = 10u128.pow(decimals - frac_part.len() as u32);
        frac_part.parse::<u128>().map_err(|_| too_large())? * padding
    };

    int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(too_large)
}

/// Render a fixed-point value. With `pad` the fraction always shows every
/// decimal; otherwise trailing zeros (and a bare dot) are dropped.
fn format_fixed(value: u128, decimals: u32, pad: bool) -> String {
    let scale = 10u128.pow(decimals);
    let int_value = value / scale;
    let frac_value = value % scale;
    let frac = format!("{frac_value:0width$}", width = decimals as usize);

    if pad {
        return format!("{int_value}.{frac}");
    }
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int_value.to_string()
    } else {
        format!("{int_value}.{frac}")
    }
}
