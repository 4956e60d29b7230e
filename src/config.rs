//! # Configuration
//!
//! [`StoreConfig`] is resolved with [`figment`] in priority order:
//! 1. **Environment variables**: `PETCARE_STORAGE__PATH`, `PETCARE_REMOTE__URL`, ...
//!    (`__` separates nesting levels).
//! 2. **YAML file**: passed to [`StoreConfig::load`].
//! 3. **Compiled defaults**: [`StoreConfig::default`].
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `storage.backend` | `sqlite` | `sqlite` or `memory` |
//! | `storage.path` | `petcare.db` | SQLite database file |
//! | `remote` | unset | Supabase project; no mirroring when absent |
//! | `migrations.max_attempts` | `5` | Failed runs before a step is quarantined |
//! | `bootstrap.init_timeout_ms` | `10000` | Deadline for each startup step |
//! | `logging.filter` | `info` | `tracing` filter directive, `RUST_LOG` wins |

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PETCARE_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("petcare.db"),
        }
    }
}

fn default_remote_timeout_secs() -> u64 {
    15
}

/// Connection settings for the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Public (anon) API key.
    pub api_key: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub max_attempts: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub init_timeout_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration for [`AppContext`](crate::AppContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage: StorageConfig,
    pub remote: Option<RemoteConfig>,
    pub migrations: MigrationConfig,
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
}

impl StoreConfig {
    /// Load defaults, then `path` (if given), then `PETCARE_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(StoreConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    /// In-memory storage, no remote. Handy for tests and previews.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap.init_timeout_ms)
    }
}
