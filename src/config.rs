//! Runtime configuration, loaded from an optional `~/.freeloop/config.yaml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{SchedulerConfig, DEFAULT_BPM};
use crate::symbol::{Paging, TableConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub page_size: usize,
    pub max_pages: usize,
    /// Extra filters passed to every search, e.g. `license: "Creative Commons 0"`.
    pub filters: BTreeMap<String, String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let paging = Paging::default();
        Self {
            page_size: paging.page_size,
            max_pages: paging.max_pages,
            filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the search API. Empty disables remote search.
    pub api_url: String,
    pub api_key: Option<String>,
}

/// Everything tunable about a runtime. Every field has a default.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub bpm: f64,
    /// Seed for choices and result picking.
    pub seed: u64,
    /// Scheduler tick interval.
    pub lookahead_ms: u64,
    pub schedule_ahead_secs: f64,
    /// Quiet time after an edit before a block is committed.
    pub parse_debounce_ms: u64,
    /// Quiet time before a new sound's search starts.
    pub fetch_debounce_ms: u64,
    pub quantize_launch: bool,
    pub search: SearchConfig,
    /// Directory of WAV files to search locally.
    pub library_dir: Option<PathBuf>,
    pub remote: RemoteConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            bpm: DEFAULT_BPM,
            seed: 0,
            lookahead_ms: scheduler.lookahead.as_millis() as u64,
            schedule_ahead_secs: scheduler.schedule_ahead,
            parse_debounce_ms: 300,
            fetch_debounce_ms: 250,
            quantize_launch: scheduler.quantize_launch,
            search: SearchConfig::default(),
            library_dir: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// `~/.freeloop/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".freeloop").join("config.yaml"))
    }

    /// Load from the default path. A missing file (or home) yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. A missing file yields defaults; a malformed one is
    /// an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    pub fn table_config(&self) -> TableConfig {
        TableConfig {
            fetch_debounce: Duration::from_millis(self.fetch_debounce_ms),
            paging: Paging {
                page_size: self.search.page_size.max(1),
                max_pages: self.search.max_pages.max(1),
            },
            filters: self.search.filters.clone(),
            seed: self.seed,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            lookahead: Duration::from_millis(self.lookahead_ms.max(1)),
            schedule_ahead: self.schedule_ahead_secs.max(0.0),
            quantize_launch: self.quantize_launch,
        }
    }

    pub fn parse_debounce(&self) -> Duration {
        Duration::from_millis(self.parse_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.bpm, 120.0);
        assert_eq!(config.search.page_size, 15);
        assert_eq!(config.search.max_pages, 5);
        assert!(config.library_dir.is_none());
        assert!(config.remote.api_url.is_empty());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = RuntimeConfig::parse("bpm: 90\nsearch:\n  page_size: 30\n").unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.search.page_size, 30);
        assert_eq!(config.search.max_pages, 5);
        assert_eq!(config.fetch_debounce_ms, 250);
    }

    #[test]
    fn full_yaml() {
        let yaml = r#"
bpm: 140
seed: 7
lookahead_ms: 50
schedule_ahead_secs: 0.2
parse_debounce_ms: 500
fetch_debounce_ms: 100
quantize_launch: false
search:
  page_size: 10
  max_pages: 2
  filters:
    license: "Creative Commons 0"
library_dir: /tmp/samples
remote:
  api_url: https://freesound.org/apiv2
  api_key: abc
"#;
        let config = RuntimeConfig::parse(yaml).unwrap();
        assert_eq!(config.seed, 7);
        assert!(!config.quantize_launch);
        assert_eq!(config.library_dir, Some(PathBuf::from("/tmp/samples")));
        assert_eq!(config.remote.api_key.as_deref(), Some("abc"));

        let table = config.table_config();
        assert_eq!(table.fetch_debounce, Duration::from_millis(100));
        assert_eq!(table.paging.max_pages, 2);
        assert_eq!(table.filters["license"], "Creative Commons 0");

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.lookahead, Duration::from_millis(50));
        assert_eq!(scheduler.schedule_ahead, 0.2);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "bpm: [fast").unwrap();
        let err = RuntimeConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn round_trips_through_yaml() {
        let config = RuntimeConfig {
            bpm: 99.0,
            ..RuntimeConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::parse(&yaml).unwrap(), config);
    }
}
