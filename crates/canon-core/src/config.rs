//! Canon store configuration
//!
//! Settings can be built in code, read from a TOML/YAML/JSON file, and
//! overridden from `CANON_*` environment variables.

use crate::error::ConfigError;
use crate::lock::LockOptions;
use crate::predicates::PredicateCatalog;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default segment size limit (10 MiB)
pub const DEFAULT_SEGMENT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default segment claim limit for `claim_count` rotation
pub const DEFAULT_SEGMENT_MAX_CLAIMS: u64 = 10_000;

/// When the segment writer opens a new segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateStrategy {
    /// Rotate before a record would push the segment past `segment_max_bytes`
    #[default]
    Size,
    /// Rotate once a segment holds `segment_max_claims` records
    ClaimCount,
    /// Single segment
    Never,
}

impl std::str::FromStr for RotateStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" => Ok(RotateStrategy::Size),
            "claim_count" | "count" => Ok(RotateStrategy::ClaimCount),
            "never" => Ok(RotateStrategy::Never),
            _ => Err(ConfigError::InvalidValue {
                key: "rotate_strategy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Canon API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonConfig {
    /// Directory holding segments, manifest and index
    pub storage_dir: PathBuf,

    /// Run conflict detection before writes
    pub guard_enabled: bool,

    pub segment_max_bytes: u64,
    pub segment_max_claims: u64,
    pub rotate_strategy: RotateStrategy,

    /// Lock acquisition timeout in milliseconds
    pub lock_timeout_ms: u64,

    /// Delay between lock attempts in milliseconds
    pub lock_retry_interval_ms: u64,

    /// fsync each segment append
    pub sync_on_append: bool,

    /// Optional predicate catalog replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
}

impl Default for CanonConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("canon"),
            guard_enabled: true,
            segment_max_bytes: DEFAULT_SEGMENT_MAX_BYTES,
            segment_max_claims: DEFAULT_SEGMENT_MAX_CLAIMS,
            rotate_strategy: RotateStrategy::Size,
            lock_timeout_ms: 5_000,
            lock_retry_interval_ms: 50,
            sync_on_append: false,
            catalog_path: None,
        }
    }
}

impl CanonConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_guard_enabled(mut self, enabled: bool) -> Self {
        self.guard_enabled = enabled;
        self
    }

    pub fn with_segment_max_bytes(mut self, max_bytes: u64) -> Self {
        self.segment_max_bytes = max_bytes;
        self
    }

    pub fn with_segment_max_claims(mut self, max_claims: u64) -> Self {
        self.segment_max_claims = max_claims;
        self
    }

    pub fn with_rotate_strategy(mut self, strategy: RotateStrategy) -> Self {
        self.rotate_strategy = strategy;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            retry_interval: Duration::from_millis(self.lock_retry_interval_ms.max(1)),
        }
    }

    /// Load from a `.toml`, `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_structured(path.as_ref())
    }

    /// Apply `CANON_*` environment overrides
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CANON_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CANON_GUARD_ENABLED") {
            self.guard_enabled = parse_bool("CANON_GUARD_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("CANON_SEGMENT_MAX_BYTES") {
            self.segment_max_bytes = parse_u64("CANON_SEGMENT_MAX_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("CANON_SEGMENT_ROTATE_STRATEGY") {
            self.rotate_strategy = raw.parse()?;
        }
        if let Some(raw) = lookup("CANON_LOCK_TIMEOUT_MS") {
            self.lock_timeout_ms = parse_u64("CANON_LOCK_TIMEOUT_MS", &raw)?;
        }
        if let Some(path) = lookup("CANON_CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Read the configured predicate catalog, if any
    pub fn load_catalog(&self) -> Result<Option<PredicateCatalog>, ConfigError> {
        self.catalog_path
            .as_deref()
            .map(read_structured::<PredicateCatalog>)
            .transpose()
    }
}

fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(toml::from_str(&content)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        Some("json") => Ok(serde_json::from_str(&content)?),
        other => Err(ConfigError::ParseError(format!(
            "unsupported config format: {:?}",
            other
        ))),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CanonConfig::default();
        assert!(config.guard_enabled);
        assert_eq!(config.segment_max_bytes, DEFAULT_SEGMENT_MAX_BYTES);
        assert_eq!(config.rotate_strategy, RotateStrategy::Size);
        assert_eq!(config.lock_options().timeout, Duration::from_secs(5));
        assert_eq!(config.lock_options().retry_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canon.toml");
        std::fs::write(
            &path,
            "storage_dir = \"/var/lib/canon\"\nguard_enabled = false\nrotate_strategy = \"claim_count\"\nsegment_max_claims = 3\n",
        )
        .unwrap();

        let config = CanonConfig::from_file(&path).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/canon"));
        assert!(!config.guard_enabled);
        assert_eq!(config.rotate_strategy, RotateStrategy::ClaimCount);
        assert_eq!(config.segment_max_claims, 3);
        assert_eq!(config.lock_timeout_ms, 5_000);
    }

    #[test]
    fn test_from_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("canon.yaml");
        std::fs::write(&yaml, "segment_max_bytes: 2048\n").unwrap();
        assert_eq!(CanonConfig::from_file(&yaml).unwrap().segment_max_bytes, 2048);

        let json = dir.path().join("canon.json");
        std::fs::write(&json, r#"{"rotate_strategy": "never"}"#).unwrap();
        assert_eq!(CanonConfig::from_file(&json).unwrap().rotate_strategy, RotateStrategy::Never);

        let ini = dir.path().join("canon.ini");
        std::fs::write(&ini, "x=1").unwrap();
        assert!(matches!(CanonConfig::from_file(&ini), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CANON_STORAGE_DIR", "/tmp/canon"),
            ("CANON_GUARD_ENABLED", "off"),
            ("CANON_SEGMENT_MAX_BYTES", "4096"),
            ("CANON_SEGMENT_ROTATE_STRATEGY", "count"),
        ]
        .into_iter()
        .collect();

        let config = CanonConfig::default()
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/canon"));
        assert!(!config.guard_enabled);
        assert_eq!(config.segment_max_bytes, 4096);
        assert_eq!(config.rotate_strategy, RotateStrategy::ClaimCount);
    }

    #[test]
    fn test_invalid_override() {
        let result = CanonConfig::default().apply_overrides(|k| {
            (k == "CANON_LOCK_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let catalog = PredicateCatalog::builtin();
        std::fs::write(&path, serde_json::to_string(&catalog).unwrap()).unwrap();

        let config = CanonConfig::new(dir.path()).with_catalog_path(&path);
        assert_eq!(config.load_catalog().unwrap(), Some(catalog));
        assert_eq!(CanonConfig::new(dir.path()).load_catalog().unwrap(), None);
    }
}
