use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NUMBER_PATTERN: &str = r"^([1-9][0-9]+|[0-9])(\.[0-9]+$|$)";
pub const DEFAULT_DATE_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}([+-]\d{2}:\d{2}|Z)?$";

/// What happens to the store connection once an ingest call returns.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPolicy {
    #[default]
    Release,
    Retain,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    pub number_patterns: Vec<String>,
    pub date_patterns: Vec<String>,
    pub connection: ConnectionPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            number_patterns: vec![DEFAULT_NUMBER_PATTERN.to_string()],
            date_patterns: vec![DEFAULT_DATE_PATTERN.to_string()],
            connection: ConnectionPolicy::default(),
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: IngestConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    pub fn retain_connection(mut self) -> Self {
        self.connection = ConnectionPolicy::Retain;
        self
    }
}
