//! Exact decimal values of any length.
//!
//! Numeric columns may hold more significant digits than fixed-width decimal
//! types allow, so values are kept as a canonical digit string with a power of
//! ten. Two spellings of the same number (`1.5`, `1.50`, `15e-1`) compare and
//! hash equal.

use std::{fmt, str::FromStr};

/// Exponents beyond this are rejected rather than expanded into huge strings.
const MAX_EXPONENT: i64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactDecimal {
    negative: bool,
    /// Significant digits without leading or trailing zeros; empty for zero.
    digits: String,
    /// Power of ten applied to `digits`.
    exponent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDecimalError;

impl fmt::Display for ParseDecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decimal literal")
    }
}

impl std::error::Error for ParseDecimalError {}

impl ExactDecimal {
    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn is_integer(&self) -> bool {
        self.exponent >= 0
    }

    pub fn significant_digits(&self) -> usize {
        self.digits.len()
    }

    /// Decimal exponent of the leading digit (`0` for `1.5`, `-2` for `0.01`).
    pub fn adjusted_exponent(&self) -> i64 {
        if self.is_zero() {
            0
        } else {
            self.digits.len() as i64 + self.exponent - 1
        }
    }

    /// Digits after the decimal point in the canonical form.
    pub fn scale(&self) -> u32 {
        u32::try_from(-self.exponent.min(0)).unwrap_or(u32::MAX)
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.is_integer() {
            self.to_string().parse().ok()
        } else {
            None
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.to_string().parse().ok()
    }
}

impl FromStr for ExactDecimal {
    type Err = ParseDecimalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (negative, unsigned) = match value.as_bytes().first() {
            Some(b'-') => (true, &value[1..]),
            Some(b'+') => (false, &value[1..]),
            _ => (false, value),
        };
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(idx) => {
                let exponent = unsigned[idx + 1..]
                    .parse::<i64>()
                    .map_err(|_| ParseDecimalError)?;
                (&unsigned[..idx], exponent)
            }
            None => (unsigned, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if (whole.is_empty() && fraction.is_empty())
            || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
            || exponent.abs() > MAX_EXPONENT
        {
            return Err(ParseDecimalError);
        }

        let all_digits = format!("{whole}{fraction}");
        let significant = all_digits.trim_start_matches('0');
        let trimmed = significant.trim_end_matches('0');
        if trimmed.is_empty() {
            return Ok(Self {
                negative: false,
                digits: String::new(),
                exponent: 0,
            });
        }
        let trailing_zeros = (significant.len() - trimmed.len()) as i64;
        Ok(Self {
            negative,
            digits: trimmed.to_string(),
            exponent: exponent - fraction.len() as i64 + trailing_zeros,
        })
    }
}

/// Plain positional notation, never scientific.
impl fmt::Display for ExactDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        if self.negative {
            write!(f, "-")?;
        }
        if self.exponent >= 0 {
            return write!(f, "{}{}", self.digits, "0".repeat(self.exponent as usize));
        }
        let point = self.digits.len() as i64 + self.exponent;
        if point > 0 {
            let (whole, fraction) = self.digits.split_at(point as usize);
            write!(f, "{whole}.{fraction}")
        } else {
            write!(f, "0.{}{}", "0".repeat(point.unsigned_abs() as usize), self.digits)
        }
    }
}
