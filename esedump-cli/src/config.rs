//! Dump settings: built-in profiles and the TOML configuration file.
//!
//! Settings are layered, each layer overriding the fields the previous one
//! sets: profile, then configuration file, then command-line arguments.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::ValueEnum;
use serde::Deserialize;

/// Largest accepted future time limit, in days (10,000 years).
pub const MAX_FUTURE_TIME_LIMIT_DAYS: u32 = 3_650_000;

/// Well-known databases and the settings they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// The browser cache database (`WebCacheV01.dat`).
    Webcache,
    /// The Windows Search index (`Windows.edb`).
    Search,
    /// The system resource usage monitor database (`SRUDB.dat`).
    Srum,
}

impl Profile {
    pub fn settings(self) -> Settings {
        match self {
            Profile::Webcache => Settings {
                log_prefix: Some("V01".into()),
                stop_processes: Some(vec!["taskhostw.exe".into(), "dllhost.exe".into()]),
                page_size: Some(32 * 1024),
                ..Settings::default()
            },
            Profile::Search => Settings {
                log_prefix: Some("MSS".into()),
                stop_processes: Some(vec!["SearchIndexer.exe".into()]),
                ..Settings::default()
            },
            Profile::Srum => Settings {
                log_prefix: Some("SRU".into()),
                ..Settings::default()
            },
        }
    }
}

/// A (partial) set of dump settings. Unset fields keep the value of the
/// layer below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub log_prefix: Option<String>,
    pub stop_processes: Option<Vec<String>>,
    pub page_size: Option<u32>,
    pub recovery: Option<bool>,
    pub circular_logging: Option<bool>,
    pub username: Option<String>,
    /// Upper bound, in days past now, for integers to be read as timestamps.
    pub future_time_limit_days: Option<u32>,
    pub binary_as_bytes: Option<bool>,
    pub tables: Option<Vec<String>>,
}

impl Settings {
    /// Reads a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file `{}`", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file `{}`", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Returns the future time limit, if set.
    pub fn future_time_limit(&self) -> Result<Option<Duration>> {
        let Some(days) = self.future_time_limit_days else {
            return Ok(None);
        };
        if days > MAX_FUTURE_TIME_LIMIT_DAYS {
            bail!("future time limit of {days} days exceeds {MAX_FUTURE_TIME_LIMIT_DAYS} days");
        }
        Duration::try_days(days.into())
            .map(Some)
            .with_context(|| format!("future time limit of {days} days is out of range"))
    }

    /// Overrides the fields of `self` that `other` sets.
    pub fn merge(self, other: Settings) -> Settings {
        Settings {
            log_prefix: other.log_prefix.or(self.log_prefix),
            stop_processes: other.stop_processes.or(self.stop_processes),
            page_size: other.page_size.or(self.page_size),
            recovery: other.recovery.or(self.recovery),
            circular_logging: other.circular_logging.or(self.circular_logging),
            username: other.username.or(self.username),
            future_time_limit_days: other.future_time_limit_days.or(self.future_time_limit_days),
            binary_as_bytes: other.binary_as_bytes.or(self.binary_as_bytes),
            tables: other.tables.or(self.tables),
        }
    }
}
