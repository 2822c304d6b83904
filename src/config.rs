//! Connector configuration, loaded from YAML
//!
//! ```yaml
//! database: /var/lib/ctxstore/events.db
//! confidence: "50"
//! preload: true
//! preload_files: [ontology/context.ttl]
//! tenant_aware: true
//! isolation: serializable
//! lock_timeout_ms: 5000
//! functional_predicates:
//!   - urn:p:location
//! ```
//!
//! Every field is optional.

use crate::connector::clamp_threshold;
use crate::model::vocab::DEFAULT_SCOPE_PREFIX;
use crate::storage::IsolationLevel;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// SQLite data file; defaults to the user data directory
    pub database: Option<PathBuf>,
    /// Confidence threshold as written by the operator. Parsed leniently,
    /// see [`threshold`](Self::threshold).
    #[serde(deserialize_with = "string_or_number")]
    pub confidence: Option<String>,
    /// Load `preload_files` when the connector opens
    pub preload: bool,
    pub preload_files: Vec<PathBuf>,
    /// Store each event into graphs named after its scopes
    pub tenant_aware: bool,
    /// Prefix turning local scope names into graph IRIs
    pub scope_prefix: String,
    pub isolation: IsolationLevel,
    pub lock_timeout_ms: Option<u64>,
    pub functional_predicates: Vec<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            database: None,
            confidence: None,
            preload: false,
            preload_files: Vec::new(),
            tenant_aware: false,
            scope_prefix: DEFAULT_SCOPE_PREFIX.to_string(),
            isolation: IsolationLevel::default(),
            lock_timeout_ms: None,
            functional_predicates: Vec::new(),
        }
    }
}

impl ConnectorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // an empty document is an all-defaults config
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Effective confidence threshold.
    ///
    /// Missing means 0. A value that is not an integer is logged and
    /// treated as 0. Values above 100 become 100.
    pub fn threshold(&self) -> u8 {
        let Some(raw) = self.confidence.as_deref() else {
            return 0;
        };
        match raw.trim().parse::<i64>() {
            Ok(value) => clamp_threshold(value),
            Err(e) => {
                tracing::warn!(value = raw, error = %e, "invalid confidence threshold, using 0");
                0
            }
        }
    }

    pub fn lock_wait(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Configured database path, or `<data dir>/ctxstore/ctxstore.db`
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(default_database_path)
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ctxstore")
        .join("ctxstore.db")
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_yaml::Value::Null) => None,
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "confidence must be a scalar, got {:?}",
                other
            )))
        }
    })
}
