//! Exact coin amounts
//!
//! Every balance, threshold and transfer goes through [`Amount`], an
//! arbitrary-precision count of the smallest indivisible unit. One ALPH is
//! 10^18 smallest units. Nothing here ever goes through floating point,
//! except [`Amount::as_alph_f64`] which only feeds metric gauges.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Decimal places between the smallest unit and one ALPH
pub const DECIMALS: usize = 18;

/// Unit suffix used by [`Amount::display_string`]
pub const UNIT_SYMBOL: &str = "ALPH";

/// Digits kept when printing in display units
const NANO_DIGITS: u32 = 9;

fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u8).pow(exp)
}

/// Splits an optional leading sign off `text`
fn split_sign(text: &str) -> (bool, &str) {
    if let Some(rest) = text.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = text.strip_prefix('+') {
        (false, rest)
    } else {
        (false, text)
    }
}

fn all_digits(text: &str) -> bool {
    text.bytes().all(|b| b.is_ascii_digit())
}

/// Quantity of ALPH in smallest units
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigInt);

impl Amount {
    /// Explicit zero
    pub fn zero() -> Self {
        Self(BigInt::default())
    }

    pub fn from_raw_units(units: i128) -> Self {
        Self(BigInt::from(units))
    }

    /// Parse a decimal amount expressed in ALPH, e.g. `"12"` or `"0.5"`
    ///
    /// The fractional part is right-padded (or truncated) to 18 digits and
    /// glued to the integer part, so `"1.5"` is 1_500_000_000_000_000_000
    /// smallest units.
    pub fn parse_display(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidAmount(format!("'{}' is not a decimal ALPH amount", text));

        let (negative, unsigned) = split_sign(text.trim());
        let (whole, fraction) = match unsigned.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (unsigned, None),
        };

        if !all_digits(whole) {
            return Err(invalid());
        }

        let value = match fraction {
            None => {
                if whole.is_empty() {
                    return Err(invalid());
                }
                let units = BigInt::parse_bytes(whole.as_bytes(), 10).ok_or_else(invalid)?;
                units * pow10(DECIMALS as u32)
            }
            Some(fraction) => {
                if !all_digits(fraction) || (whole.is_empty() && fraction.is_empty()) {
                    return Err(invalid());
                }
                let mut decimals: String = fraction.chars().take(DECIMALS).collect();
                while decimals.len() < DECIMALS {
                    decimals.push('0');
                }
                let joined = format!("{}{}", whole, decimals);
                BigInt::parse_bytes(joined.as_bytes(), 10).ok_or_else(invalid)?
            }
        };

        Ok(Self(if negative { -value } else { value }))
    }

    /// Parse an integer count of smallest units, e.g. `"20000000000000000000"`
    pub fn parse_raw(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidAmount(format!("'{}' is not an integer amount", text));

        let (negative, digits) = split_sign(text.trim());
        if digits.is_empty() || !all_digits(digits) {
            return Err(invalid());
        }
        let value = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(invalid)?;
        Ok(Self(if negative { -value } else { value }))
    }

    pub fn add(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }

    pub fn subtract(&self, other: &Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }

    pub fn multiply(&self, factor: i64) -> Amount {
        Amount(&self.0 * BigInt::from(factor))
    }

    /// Integer division, truncating toward zero
    ///
    /// # Panics
    /// Panics when `divisor` is zero.
    pub fn divide(&self, divisor: i64) -> Amount {
        Amount(&self.0 / BigInt::from(divisor))
    }

    /// Three-way comparison
    pub fn compare(&self, other: &Amount) -> Ordering {
        self.0.cmp(&other.0)
    }

    pub fn is_positive(&self) -> bool {
        self.0.sign() == Sign::Plus
    }

    pub fn is_zero(&self) -> bool {
        self.0.sign() == Sign::NoSign
    }

    /// Integer text in smallest units
    pub fn raw_string(&self) -> String {
        self.0.to_string()
    }

    /// Human-facing rendering
    ///
    /// Above one nano-ALPH (10^9 smallest units) the value is shown in ALPH
    /// at nano precision with trailing zeros stripped, e.g. `12.5ALPH`.
    /// Smaller values are shown as the bare smallest-unit integer.
    pub fn display_string(&self) -> String {
        let nano_unit = pow10(NANO_DIGITS);
        if self.0 <= nano_unit {
            return self.raw_string();
        }

        let nanos = &self.0 / &nano_unit;
        let whole = &nanos / &nano_unit;
        let fraction = format!("{:0>width$}", (&nanos % &nano_unit).to_string(), width = NANO_DIGITS as usize);
        let fraction = fraction.trim_end_matches('0');

        if fraction.is_empty() {
            format!("{}{}", whole, UNIT_SYMBOL)
        } else {
            format!("{}.{}{}", whole, fraction, UNIT_SYMBOL)
        }
    }

    /// Exact decimal in ALPH without unit suffix, e.g. `"0.000000000000000007"`
    pub fn to_decimal_string(&self) -> String {
        let digits = self.0.magnitude().to_string();
        let padded = format!("{:0>width$}", digits, width = DECIMALS + 1);
        let (whole, fraction) = padded.split_at(padded.len() - DECIMALS);
        let fraction = fraction.trim_end_matches('0');
        let sign = if self.0.sign() == Sign::Minus { "-" } else { "" };

        if fraction.is_empty() {
            format!("{}{}", sign, whole)
        } else {
            format!("{}{}.{}", sign, whole, fraction)
        }
    }

    /// Lossy value in ALPH, for gauges only
    pub fn as_alph_f64(&self) -> f64 {
        self.to_decimal_string().parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

// Amounts travel as quoted integers so JSON numbers never lose precision
impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Amount::parse_raw(&text).map_err(serde::de::Error::custom)
    }
}
