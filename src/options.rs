//! Construction-time configuration for the store.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::ConfigError;

/// Directory under the root that holds the index and node files.
pub const STORAGE_DIR: &str = "storage";

/// How the byte ceiling is applied to incoming writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaMode {
    /// Every put is checked against the ceiling.
    Enforced,
    /// The ceiling is only consulted after a flush has failed. Until then
    /// writes are admitted regardless of size.
    Soft,
}

/// Which successful writes receive an acknowledgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckPolicyKind {
    /// Relayed writes are sampled by their ack hint; local writes always ack.
    Sampled,
    /// Every non-reply write is acknowledged.
    All,
}

/// Options consumed when an adapter is constructed.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Root directory; node files live in `<root>/storage/`.
    pub root: PathBuf,
    /// When false the adapter forwards every event and persists nothing.
    pub enabled: bool,
    /// Ceiling on the total bytes of all node files.
    pub max_bytes: u64,
    /// How `max_bytes` is applied.
    pub quota_mode: QuotaMode,
    /// Quiet period after the last put before a flush runs.
    pub debounce: Duration,
    /// Delay before retrying a flush deferred because the pipeline was busy.
    pub busy_retry: Duration,
    /// Gap between consecutive acknowledgments of one batch.
    pub ack_stagger: Duration,
    /// Acknowledgment selection policy.
    pub ack_policy: AckPolicyKind,
    /// Rebuild the index from node files when it is missing or unreadable.
    pub rebuild_index: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("gun-data"),
            enabled: true,
            max_bytes: 100_000_000,
            quota_mode: QuotaMode::Enforced,
            debounce: Duration::from_millis(10),
            busy_retry: Duration::from_millis(99),
            ack_stagger: Duration::from_millis(5),
            ack_policy: AckPolicyKind::Sampled,
            rebuild_index: true,
        }
    }
}

impl StoreOptions {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Directory holding `index.json` and the node files.
    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    /// Loads options from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawOptions = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        raw.into_options()
    }

    /// Parses options from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawOptions = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        raw.into_options()
    }
}

/// Default location of the CLI options file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("soulstore").join("store.toml"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    root: Option<PathBuf>,
    enabled: Option<bool>,
    max_bytes: Option<u64>,
    quota_mode: Option<String>,
    debounce_ms: Option<u64>,
    busy_retry_ms: Option<u64>,
    ack_stagger_ms: Option<u64>,
    ack_policy: Option<String>,
    rebuild_index: Option<bool>,
}

impl RawOptions {
    fn into_options(self) -> Result<StoreOptions, ConfigError> {
        let mut opts = StoreOptions::default();
        if let Some(root) = self.root {
            opts.root = root;
        }
        if let Some(enabled) = self.enabled {
            opts.enabled = enabled;
        }
        if let Some(max_bytes) = self.max_bytes {
            opts.max_bytes = max_bytes;
        }
        if let Some(mode) = self.quota_mode.as_deref() {
            opts.quota_mode = match mode {
                "enforced" => QuotaMode::Enforced,
                "soft" => QuotaMode::Soft,
                other => {
                    return Err(ConfigError::Invalid {
                        field: "quota_mode",
                        reason: format!("expected 'enforced' or 'soft', got '{other}'"),
                    })
                }
            };
        }
        if let Some(ms) = self.debounce_ms {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    field: "debounce_ms",
                    reason: "must be at least 1".into(),
                });
            }
            opts.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = self.busy_retry_ms {
            opts.busy_retry = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = self.ack_stagger_ms {
            opts.ack_stagger = Duration::from_millis(ms);
        }
        if let Some(policy) = self.ack_policy.as_deref() {
            opts.ack_policy = match policy {
                "sampled" => AckPolicyKind::Sampled,
                "all" => AckPolicyKind::All,
                other => {
                    return Err(ConfigError::Invalid {
                        field: "ack_policy",
                        reason: format!("expected 'sampled' or 'all', got '{other}'"),
                    })
                }
            };
        }
        if let Some(rebuild) = self.rebuild_index {
            opts.rebuild_index = rebuild;
        }
        Ok(opts)
    }
}
