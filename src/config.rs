use chrono::{FixedOffset, Local, Offset};
use std::path::PathBuf;

const DEFAULT_DB_NAME: &str = "drill.db";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid DRILL_UTC_OFFSET '{0}': expected hours between -23 and 23, e.g. -5 or 5.5")]
    InvalidOffset(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
    /// Offset used for day and week boundaries
    pub utc_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup. Empty values count as
    /// unset.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let db_path = match var("DRILL_DB") {
            Some(path) => PathBuf::from(path),
            None => default_db_path(),
        };

        let log_filter = var("DRILL_LOG")
            .or_else(|| var("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let utc_offset = match var("DRILL_UTC_OFFSET") {
            Some(raw) => parse_offset(&raw)?,
            None => Local::now().offset().fix(),
        };

        Ok(Self {
            db_path,
            log_filter,
            utc_offset,
        })
    }
}

fn default_db_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drill");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

/// Parses an offset given in hours. Fractional hours are allowed for zones
/// such as +05:30.
pub fn parse_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidOffset(raw.to_string());

    let hours: f64 = raw.trim().parse().map_err(|_| invalid())?;
    if !hours.is_finite() || hours.abs() >= 24.0 {
        return Err(invalid());
    }
    let seconds = (hours * 3600.0).round() as i32;
    FixedOffset::east_opt(seconds).ok_or_else(invalid)
}
