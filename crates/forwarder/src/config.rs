//! Generator configuration
//!
//! Everything the generator needs besides the spec itself and the secret
//! lookup: reserved names, buffering defaults and filesystem roots used in the
//! rendered configuration. All fields have documented defaults so an empty
//! YAML document is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the output backed by the cluster's own log store
pub const DEFAULT_OUTPUT_NAME: &str = "default";

/// Only a forwarder with this name is compiled
pub const SINGLETON_NAME: &str = "instance";

/// Errors loading a [`GeneratorConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Main generator configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorConfig {
    /// Names users may not give to outputs, pipelines or inputs
    pub reserved_names: ReservedNames,

    /// Buffering policy applied to every store
    pub buffer: BufferTuning,

    /// Directory holding per-store file buffers
    pub buffer_root: String,

    /// Directory where output secrets are mounted, one subdirectory per secret
    pub secrets_root: String,

    /// Internal log store reachable through the reserved `default` output
    pub default_output: Option<DefaultOutput>,

    /// Required resource name when compiling a whole resource; `None`
    /// accepts any name
    pub singleton_name: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            reserved_names: ReservedNames::default(),
            buffer: BufferTuning::default(),
            buffer_root: "/var/lib/fluentd".to_string(),
            secrets_root: "/var/run/ocp-collector/secrets".to_string(),
            default_output: None,
            singleton_name: Some(SINGLETON_NAME.to_string()),
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        debug!(path = %path.display(), "Loaded generator configuration");
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Path of a file inside a mounted output secret
    pub fn secret_path(&self, secret: &str, file: &str) -> String {
        format!("{}/{secret}/{file}", self.secrets_root.trim_end_matches('/'))
    }

    /// Path of the file buffer for a store id
    pub fn buffer_path(&self, store_id: &str) -> String {
        format!("{}/{store_id}", self.buffer_root.trim_end_matches('/'))
    }
}

/// The cluster's internal log store, addressed as the `default` output
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultOutput {
    /// Elasticsearch URL of the internal store
    pub url: String,

    /// Secret with client certificates for the internal store
    #[serde(default)]
    pub secret_name: Option<String>,
}

/// Set of names reserved for internal use
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReservedNames(BTreeSet<String>);

impl ReservedNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ReservedNames {
    /// The built-in source names plus the default output
    fn default() -> Self {
        Self::new([DEFAULT_OUTPUT_NAME, "application", "infrastructure", "audit"])
    }
}

/// What a full buffer queue does with new chunks
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowAction {
    #[default]
    Block,
    DropOldestChunk,
    ThrowException,
}

impl fmt::Display for OverflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowAction::Block => write!(f, "block"),
            OverflowAction::DropOldestChunk => write!(f, "drop_oldest_chunk"),
            OverflowAction::ThrowException => write!(f, "throw_exception"),
        }
    }
}

impl FromStr for OverflowAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "block" => Ok(OverflowAction::Block),
            "drop_oldest_chunk" => Ok(OverflowAction::DropOldestChunk),
            "throw_exception" => Ok(OverflowAction::ThrowException),
            other => Err(format!("unknown overflow action '{other}'")),
        }
    }
}

const ENV_QUEUE_LIMIT: &str = "BUFFER_QUEUE_LIMIT";
const ENV_SIZE_LIMIT: &str = "BUFFER_SIZE_LIMIT";
const ENV_FLUSH_INTERVAL: &str = "FLUSH_INTERVAL";
const ENV_FLUSH_THREAD_COUNT: &str = "FLUSH_THREAD_COUNT";
const ENV_FLUSH_AT_SHUTDOWN: &str = "FLUSH_AT_SHUTDOWN";
const ENV_RETRY_MAX_INTERVAL: &str = "RETRY_MAX_INTERVAL";
const ENV_QUEUE_FULL_ACTION: &str = "BUFFER_QUEUE_FULL_ACTION";

/// Buffering policy rendered into every store's `<buffer>` section
///
/// | field | default |
/// |---|---|
/// | `queuedChunksLimitSize` | 32 |
/// | `chunkLimitSize` | `8m` |
/// | `flushInterval` | `1s` |
/// | `flushThreadCount` | 2 |
/// | `flushAtShutdown` | false |
/// | `retryMaxInterval` | `300s` |
/// | `overflowAction` | `block` |
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferTuning {
    pub queued_chunks_limit_size: u32,
    pub chunk_limit_size: String,
    pub flush_interval: String,
    pub flush_thread_count: u32,
    pub flush_at_shutdown: bool,
    pub retry_max_interval: String,
    pub overflow_action: OverflowAction,
}

impl Default for BufferTuning {
    fn default() -> Self {
        Self {
            queued_chunks_limit_size: 32,
            chunk_limit_size: "8m".to_string(),
            flush_interval: "1s".to_string(),
            flush_thread_count: 2,
            flush_at_shutdown: false,
            retry_max_interval: "300s".to_string(),
            overflow_action: OverflowAction::Block,
        }
    }
}

impl BufferTuning {
    /// Defaults overridden by the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().overlay(lookup)
    }

    /// Apply overrides from `lookup` on top of `self`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn overlay<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut tuning = self;
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = value(ENV_QUEUE_LIMIT) {
            assign_parsed(&mut tuning.queued_chunks_limit_size, ENV_QUEUE_LIMIT, &raw);
        }
        if let Some(raw) = value(ENV_SIZE_LIMIT) {
            tuning.chunk_limit_size = raw;
        }
        if let Some(raw) = value(ENV_FLUSH_INTERVAL) {
            tuning.flush_interval = raw;
        }
        if let Some(raw) = value(ENV_FLUSH_THREAD_COUNT) {
            assign_parsed(&mut tuning.flush_thread_count, ENV_FLUSH_THREAD_COUNT, &raw);
        }
        if let Some(raw) = value(ENV_FLUSH_AT_SHUTDOWN) {
            let normalized = raw.to_ascii_lowercase();
            assign_parsed(&mut tuning.flush_at_shutdown, ENV_FLUSH_AT_SHUTDOWN, &normalized);
        }
        if let Some(raw) = value(ENV_RETRY_MAX_INTERVAL) {
            tuning.retry_max_interval = raw;
        }
        if let Some(raw) = value(ENV_QUEUE_FULL_ACTION) {
            assign_parsed(&mut tuning.overflow_action, ENV_QUEUE_FULL_ACTION, &raw);
        }

        tuning
    }
}

fn assign_parsed<T>(target: &mut T, key: &str, raw: &str)
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw.parse() {
        Ok(parsed) => *target = parsed,
        Err(e) => warn!(variable = key, value = raw, error = %e, "Ignoring invalid buffer override"),
    }
}
