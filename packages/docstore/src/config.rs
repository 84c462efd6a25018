//! Store configuration (YAML/Env loading)
//!
//! ```yaml
//! backend:
//!   engine: remote
//!   url: postgres://bot@db.internal/bot
//!   ssl_fix: true
//! default_prefix: "?"
//! import:
//!   staging_dir: ./local_dbs
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Default embedded-file directory
pub const DEFAULT_FILE_PATH: &str = "./local_database";

/// Default embedded-relational directory
pub const DEFAULT_SQLITE_PATH: &str = "./.local_database_sqlite";

/// Default bulk-import staging directory
pub const DEFAULT_STAGING_DIR: &str = "./local_dbs";

/// Environment variables that switch the TLS compatibility shim on
pub const TLS_FIX_ENV_VARS: [&str; 3] = ["SSL_FIX", "MONGO_SSL_FIX", "REPL_SLUG"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    /// Fallback command prefix when a guild has none stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prefix: Option<String>,

    #[serde(default)]
    pub import: ImportConfig,
}

/// Which backend adapter to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum BackendConfig {
    EmbeddedFile {
        #[serde(default = "default_file_path")]
        path: PathBuf,
    },
    EmbeddedRelational {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
    Remote {
        url: String,
        #[serde(default)]
        ssl_fix: bool,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::EmbeddedFile {
            path: default_file_path(),
        }
    }
}

impl BackendConfig {
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendConfig::Remote { .. })
    }
}

/// Bulk import settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_FILE_PATH)
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from(DEFAULT_SQLITE_PATH)
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STAGING_DIR)
}

impl StoreConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StorageError::from(e).during("read config", path.display()))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load configuration from the process environment
    ///
    /// | Variable | Effect |
    /// |---|---|
    /// | `REMOTE_DATABASE_URL` | remote backend when set |
    /// | `LOCAL_DATABASE_ENGINE` | `file` (default) or `sqlite` |
    /// | `LOCAL_DATABASE_PATH` | embedded store directory |
    /// | `SSL_FIX` / `MONGO_SSL_FIX` / `REPL_SLUG` | enable the TLS shim |
    /// | `DEFAULT_PREFIX` | fallback command prefix |
    /// | `IMPORT_STAGING_DIR` | bulk import staging directory |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an arbitrary variable source.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = match var("REMOTE_DATABASE_URL") {
            Some(url) => BackendConfig::Remote {
                url,
                ssl_fix: TLS_FIX_ENV_VARS.iter().any(|&key| var(key).is_some()),
            },
            None => {
                let path = var("LOCAL_DATABASE_PATH").map(PathBuf::from);
                let engine = var("LOCAL_DATABASE_ENGINE").unwrap_or_else(|| "file".to_string());
                match engine.to_ascii_lowercase().as_str() {
                    "file" => BackendConfig::EmbeddedFile {
                        path: path.unwrap_or_else(default_file_path),
                    },
                    "sqlite" => BackendConfig::EmbeddedRelational {
                        path: path.unwrap_or_else(default_sqlite_path),
                    },
                    other => {
                        return Err(StorageError::config(format!(
                            "LOCAL_DATABASE_ENGINE must be 'file' or 'sqlite', got '{}'",
                            other
                        )))
                    }
                }
            }
        };

        Ok(Self {
            backend,
            default_prefix: var("DEFAULT_PREFIX"),
            import: ImportConfig {
                staging_dir: var("IMPORT_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_staging_dir),
            },
        })
    }
}

/// Whether the TLS shim is requested through the environment
pub fn tls_fix_requested() -> bool {
    TLS_FIX_ENV_VARS
        .iter()
        .any(|key| std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false))
}
