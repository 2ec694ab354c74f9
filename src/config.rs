//! Run configuration: destination, update strategy and the list of sources.
//!
//! A run is described either by a YAML file or by command-line flags; both
//! produce the same [`SyncConfig`].

use std::{fmt, fs::File, io::BufReader, path::Path, path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cli::{SourceArgs, SyncArgs, parse_delimiter},
    schema::{CanonicalSchema, FieldSpec},
    store::ConnectSettings,
};

pub const DEFAULT_TABLE: &str = "vendedoras_data";
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid range '{0}': expected 'start:end' with start <= end")]
    InvalidRange(String),
    #[error("no sources configured")]
    NoSources,
    #[error("source '{source_name}': {message}")]
    InvalidSource { source_name: String, message: String },
    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,
    #[error("connect_attempts must be greater than zero")]
    ZeroConnectAttempts,
    #[error(
        "strategy replace-all with {0} sources would let each source delete the previous one's rows; use keyed-update with identifier ranges"
    )]
    ReplaceAllMultipleSources(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum Strategy {
    /// Delete every destination row, then insert the new set
    #[default]
    ReplaceAll,
    /// Overwrite destination rows addressed by identifier
    KeyedUpdate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::ReplaceAll => f.write_str("replace-all"),
            Strategy::KeyedUpdate => f.write_str("keyed-update"),
        }
    }
}

/// Inclusive identifier range assigned to one source, written `start:end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub fn new(start: i64, end: i64) -> Result<Self, ConfigError> {
        if end < start {
            return Err(ConfigError::InvalidRange(format!("{start}:{end}")));
        }
        Ok(Self { start, end })
    }
}

impl FromStr for IdRange {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRange(value.to_string());
        let (start, end) = value.trim().split_once(':').ok_or_else(invalid)?;
        let start = start.trim().parse::<i64>().map_err(|_| invalid())?;
        let end = end.trim().parse::<i64>().map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

impl TryFrom<String> for IdRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IdRange> for String {
    fn from(range: IdRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// How destination identifiers are derived from source row positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    /// Identifier equals the 1-based row position.
    Sequential,
    /// Identifier is `start + position - 1`, discarded past `end`.
    Range(IdRange),
}

impl IdScheme {
    /// Identifier for a 1-based position, or `None` when it falls past the range.
    pub fn id_for(&self, position: usize) -> Option<i64> {
        match self {
            IdScheme::Sequential => i64::try_from(position).ok(),
            IdScheme::Range(range) => {
                let offset = i64::try_from(position).ok()?.checked_sub(1)?;
                range
                    .start
                    .checked_add(offset)
                    .filter(|id| (range.start..=range.end).contains(id))
            }
        }
    }
}

impl From<Option<IdRange>> for IdScheme {
    fn from(range: Option<IdRange>) -> Self {
        range.map_or(IdScheme::Sequential, IdScheme::Range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub database: PathBuf,
    #[serde(default = "DestinationConfig::default_table")]
    pub table: String,
    #[serde(default = "DestinationConfig::default_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "DestinationConfig::default_backoff")]
    pub backoff_ms: u64,
}

impl DestinationConfig {
    pub fn new(database: PathBuf) -> Self {
        Self {
            database,
            table: Self::default_table(),
            connect_attempts: Self::default_attempts(),
            backoff_ms: Self::default_backoff(),
        }
    }

    fn default_table() -> String {
        DEFAULT_TABLE.to_string()
    }

    const fn default_attempts() -> u32 {
        DEFAULT_CONNECT_ATTEMPTS
    }

    const fn default_backoff() -> u64 {
        DEFAULT_BACKOFF_MS
    }

    pub fn connect_settings(&self) -> ConnectSettings {
        ConnectSettings {
            database: self.database.clone(),
            table: self.table.clone(),
            attempts: self.connect_attempts,
            backoff: std::time::Duration::from_millis(self.backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<IdRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    /// 1-based sheet row holding the column headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl SourceConfig {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.locator)
    }

    pub fn id_scheme(&self) -> IdScheme {
        IdScheme::from(self.range)
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>, ConfigError> {
        self.delimiter
            .as_deref()
            .map(|value| {
                parse_delimiter(value).map_err(|message| ConfigError::InvalidSource {
                    source_name: self.display_name().to_string(),
                    message,
                })
            })
            .transpose()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidSource {
            source_name: self.display_name().to_string(),
            message: message.to_string(),
        };
        if self.locator.trim().is_empty() {
            return Err(invalid("locator is empty"));
        }
        if self.header_row == Some(0) {
            return Err(invalid("header_row is 1-based"));
        }
        if self.header_row.is_some() && self.marker.is_some() {
            return Err(invalid("header_row and marker are mutually exclusive"));
        }
        if self.marker.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(invalid("marker is empty"));
        }
        self.delimiter_byte()?;
        Ok(())
    }

    pub fn from_args(locator: &str, args: &SourceArgs) -> Self {
        Self {
            name: None,
            locator: locator.to_string(),
            sheet: args.sheet.clone(),
            range: args.range,
            marker: args.marker.clone(),
            header_row: args.header_row,
            delimiter: args.delimiter.clone(),
            encoding: args.input_encoding.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub destination: DestinationConfig,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default = "SyncConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub insert_unmatched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<FieldSpec>>,
    pub sources: Vec<SourceConfig>,
}

impl SyncConfig {
    const fn default_batch_size() -> usize {
        DEFAULT_BATCH_SIZE
    }

    pub fn new(destination: DestinationConfig, sources: Vec<SourceConfig>) -> Self {
        Self {
            destination,
            strategy: Strategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            insert_unmatched: false,
            schema: None,
            sources,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: SyncConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config
            .validate()
            .with_context(|| format!("Validating config {path:?}"))?;
        Ok(config)
    }

    /// Builds a config from `sync` flags, letting explicit flags override a loaded file.
    pub fn from_args(args: &SyncArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => {
                let database = args
                    .database
                    .clone()
                    .context("Either --config or --database must be provided")?;
                let sources = args
                    .inputs
                    .iter()
                    .map(|input| SourceConfig::from_args(&input.to_string_lossy(), &args.source))
                    .collect();
                Self::new(DestinationConfig::new(database), sources)
            }
        };
        if args.config.is_some() {
            if let Some(database) = &args.database {
                config.destination.database = database.clone();
            }
            config.sources.extend(
                args.inputs
                    .iter()
                    .map(|input| SourceConfig::from_args(&input.to_string_lossy(), &args.source)),
            );
        }
        if let Some(table) = &args.table {
            config.destination.table = table.clone();
        }
        if let Some(strategy) = args.strategy {
            config.strategy = strategy;
        }
        if let Some(batch_size) = args.batch_size {
            config.batch_size = batch_size;
        }
        if args.insert_unmatched {
            config.insert_unmatched = true;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources.into());
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize.into());
        }
        if self.destination.connect_attempts == 0 {
            return Err(ConfigError::ZeroConnectAttempts.into());
        }
        if self.strategy == Strategy::ReplaceAll && self.sources.len() > 1 {
            return Err(ConfigError::ReplaceAllMultipleSources(self.sources.len()).into());
        }
        for source in &self.sources {
            source.validate()?;
        }
        self.canonical_schema()?;
        Ok(())
    }

    pub fn canonical_schema(&self) -> Result<CanonicalSchema> {
        match &self.schema {
            Some(fields) => CanonicalSchema::new(fields.clone()).context("Validating schema"),
            None => Ok(CanonicalSchema::leads()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_parses_and_rejects_inverted_bounds() {
        let range: IdRange = "10001:20000".parse().unwrap();
        assert_eq!(range, IdRange { start: 10001, end: 20000 });
        assert_eq!(range.to_string(), "10001:20000");
        assert!("20000:10001".parse::<IdRange>().is_err());
        assert!("abc:10".parse::<IdRange>().is_err());
        assert!("10001".parse::<IdRange>().is_err());
    }

    #[test]
    fn range_scheme_offsets_positions_and_stops_at_end() {
        let scheme = IdScheme::Range("10001:10003".parse().unwrap());
        assert_eq!(scheme.id_for(1), Some(10001));
        assert_eq!(scheme.id_for(3), Some(10003));
        assert_eq!(scheme.id_for(4), None);
        assert_eq!(IdScheme::Sequential.id_for(5), Some(5));
    }

    #[test]
    fn range_ending_at_i64_max_does_not_overflow() {
        let scheme = IdScheme::Range(IdRange::new(i64::MAX - 1, i64::MAX).unwrap());
        assert_eq!(scheme.id_for(1), Some(i64::MAX - 1));
        assert_eq!(scheme.id_for(2), Some(i64::MAX));
        assert_eq!(scheme.id_for(3), None);
        assert_eq!(scheme.id_for(usize::MAX), None);
    }

    #[test]
    fn position_zero_has_no_identifier_in_a_range() {
        let scheme = IdScheme::Range(IdRange::new(i64::MIN, i64::MIN + 5).unwrap());
        assert_eq!(scheme.id_for(0), None);
        assert_eq!(scheme.id_for(1), Some(i64::MIN));
    }
}
