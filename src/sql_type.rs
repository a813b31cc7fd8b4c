//! Column types as the target store understands them.
//!
//! [`SqlType`] is the vendor-side vocabulary: exact numerics with a
//! [`DecimalSpec`], timestamps, bounded character columns, unbounded text, and
//! an opaque catch-all for declared types this crate does not reason about.
//! Types render to DDL via [`SqlType::ddl`] and parse back from the declared
//! type text reported by table introspection via [`SqlType::from_declared`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DecimalSpec {
    pub precision: u32,
    pub scale: u32,
}

impl DecimalSpec {
    /// Builds a spec, clamping precision so it is never zero and never
    /// smaller than the scale.
    pub fn new(precision: u32, scale: u32) -> Self {
        Self {
            precision: precision.max(scale).max(1),
            scale,
        }
    }

    /// Digits available left of the decimal point.
    pub fn whole_digits(&self) -> u32 {
        self.precision.saturating_sub(self.scale)
    }

    /// True when every value representable by `other` is representable by `self`.
    pub fn covers(&self, other: &DecimalSpec) -> bool {
        self.whole_digits() >= other.whole_digits() && self.scale >= other.scale
    }

    pub fn signature(&self) -> String {
        format!("NUMERIC({},{})", self.precision, self.scale)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SqlType {
    Numeric(DecimalSpec),
    Timestamp,
    VarChar(u32),
    /// Character column without a declared length limit.
    Text,
    /// Declared type outside the numeric/timestamp/character model.
    Other(String),
}

impl SqlType {
    pub fn numeric(precision: u32, scale: u32) -> Self {
        SqlType::Numeric(DecimalSpec::new(precision, scale))
    }

    pub fn is_character(&self) -> bool {
        matches!(self, SqlType::VarChar(_) | SqlType::Text)
    }

    pub fn decimal_spec(&self) -> Option<&DecimalSpec> {
        match self {
            SqlType::Numeric(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn ddl(&self) -> String {
        match self {
            SqlType::Numeric(spec) => spec.signature(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::VarChar(length) => format!("VARCHAR({length})"),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Other(name) => name.clone(),
        }
    }

    /// Parses a declared column type such as `NUMERIC(5,2)` or `varchar(12)`.
    pub fn from_declared(declared: &str) -> Self {
        let trimmed = declared.trim();
        let (base, args) = match trimmed.find('(') {
            Some(start) if trimmed.ends_with(')') => (
                trimmed[..start].trim(),
                Some(&trimmed[start + 1..trimmed.len() - 1]),
            ),
            _ => (trimmed, None),
        };
        let base_normalized = base.to_ascii_uppercase();
        let numbers = args.map(parse_type_arguments);

        match base_normalized.as_str() {
            "NUMERIC" | "DECIMAL" => match numbers.as_deref() {
                Some([Some(precision)]) => SqlType::numeric(*precision, 0),
                Some([Some(precision), Some(scale)]) => SqlType::numeric(*precision, *scale),
                _ => SqlType::Other(trimmed.to_string()),
            },
            "TIMESTAMP" | "DATETIME" => SqlType::Timestamp,
            "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" | "CHAR" | "CHARACTER" => {
                match numbers.as_deref() {
                    Some([Some(length)]) => SqlType::VarChar(*length),
                    None => SqlType::Text,
                    _ => SqlType::Other(trimmed.to_string()),
                }
            }
            "TEXT" | "CLOB" | "STRING" => SqlType::Text,
            _ => SqlType::Other(trimmed.to_string()),
        }
    }
}

fn parse_type_arguments(inner: &str) -> Vec<Option<u32>> {
    inner
        .split(',')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ddl())
    }
}
