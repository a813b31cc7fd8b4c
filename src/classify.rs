//! Column type classification from textual values.
//!
//! Every incoming value is inspected as text. A column is numeric when all of
//! its non-null values fully match one configured number pattern, a timestamp
//! when they all match one date pattern, and a string otherwise. A column with
//! no values at all falls back to `NUMERIC(1,0)`. The order is fixed: a value
//! that looks numeric is never treated as a string.
//!
//! Numeric sizing counts the leading integer digits and the digits following
//! the first decimal point. Two defaulting rules coexist on purpose:
//! [`DigitCounts::fresh_type`] (used when a column is created) contributes
//! nothing for an absent integer part, while [`DigitCounts::migration_parts`]
//! (used when comparing against an existing column) assumes one integer digit.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::IngestConfig,
    error::{IngestError, IngestResult},
    sql_type::{DecimalSpec, SqlType},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InferredType {
    Numeric(DecimalSpec),
    Timestamp,
    VarChar(u32),
    NumericFallback,
}

impl InferredType {
    pub fn sql_type(&self) -> SqlType {
        match self {
            InferredType::Numeric(spec) => SqlType::Numeric(*spec),
            InferredType::Timestamp => SqlType::Timestamp,
            InferredType::VarChar(length) => SqlType::VarChar(*length),
            InferredType::NumericFallback => SqlType::numeric(1, 0),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, InferredType::Numeric(_))
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, InferredType::Timestamp)
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferredType::NumericFallback => write!(f, "{} (no values)", self.sql_type()),
            _ => write!(f, "{}", self.sql_type()),
        }
    }
}

/// Largest integer-part and fractional-part digit counts seen in a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitCounts {
    pub whole: Option<u32>,
    pub fractional: Option<u32>,
}

impl DigitCounts {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts = DigitCounts::default();
        for value in values {
            if let Some(whole) = leading_digits(value) {
                counts.whole = Some(counts.whole.map_or(whole, |seen| seen.max(whole)));
            }
            if let Some(fractional) = fractional_digits(value) {
                counts.fractional = Some(
                    counts
                        .fractional
                        .map_or(fractional, |seen| seen.max(fractional)),
                );
            }
        }
        counts
    }

    /// Type for a column that does not exist yet.
    pub fn fresh_type(&self) -> DecimalSpec {
        let whole = self.whole.unwrap_or(0);
        let fractional = self.fractional.unwrap_or(0);
        DecimalSpec::new(whole.saturating_add(fractional), fractional)
    }

    /// `(whole, fractional)` used as the comparison baseline against an
    /// existing numeric column.
    pub fn migration_parts(&self) -> (u32, u32) {
        (self.whole.unwrap_or(1), self.fractional.unwrap_or(0))
    }
}

fn leading_digits(value: &str) -> Option<u32> {
    let count = value.chars().take_while(char::is_ascii_digit).count();
    (count > 0).then(|| saturating_u32(count))
}

fn fractional_digits(value: &str) -> Option<u32> {
    value.match_indices('.').find_map(|(idx, _)| {
        let count = value[idx + 1..]
            .chars()
            .take_while(char::is_ascii_digit)
            .count();
        (count > 0).then(|| saturating_u32(count))
    })
}

#[derive(Debug, Clone)]
pub struct TypeClassifier {
    number_patterns: Vec<Regex>,
    date_patterns: Vec<Regex>,
}

impl TypeClassifier {
    pub fn new(config: &IngestConfig) -> IngestResult<Self> {
        Ok(Self {
            number_patterns: compile_patterns("number", &config.number_patterns)?,
            date_patterns: compile_patterns("date", &config.date_patterns)?,
        })
    }

    pub fn classify(&self, column: &[Option<String>]) -> InferredType {
        if self.is_numeric(column) {
            InferredType::Numeric(DigitCounts::from_values(non_null(column)).fresh_type())
        } else if self.is_timestamp(column) {
            InferredType::Timestamp
        } else if has_values(column) {
            InferredType::VarChar(max_length(column).max(1))
        } else {
            InferredType::NumericFallback
        }
    }

    pub fn is_numeric(&self, column: &[Option<String>]) -> bool {
        has_values(column) && matches_any(&self.number_patterns, column)
    }

    pub fn is_timestamp(&self, column: &[Option<String>]) -> bool {
        has_values(column) && matches_any(&self.date_patterns, column)
    }
}

fn compile_patterns(kind: &'static str, patterns: &[String]) -> IngestResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                IngestError::InvalidPattern {
                    kind,
                    pattern: pattern.clone(),
                    source,
                }
            })
        })
        .collect()
}

/// True when a single pattern matches every non-null value.
fn matches_any(patterns: &[Regex], column: &[Option<String>]) -> bool {
    patterns
        .iter()
        .any(|pattern| non_null(column).all(|value| pattern.is_match(value)))
}

fn saturating_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

pub fn non_null(column: &[Option<String>]) -> impl Iterator<Item = &str> {
    column.iter().filter_map(|value| value.as_deref())
}

pub fn has_values(column: &[Option<String>]) -> bool {
    column.iter().any(Option::is_some)
}

/// Longest non-null value, in characters.
pub fn max_length(column: &[Option<String>]) -> u32 {
    non_null(column)
        .map(|value| saturating_u32(value.chars().count()))
        .max()
        .unwrap_or(0)
}
