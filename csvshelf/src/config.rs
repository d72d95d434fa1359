//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `CSVSHELF_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CSVSHELF_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `CSVSHELF_STORE__SCHEMA_VERSION=2` sets the `store.schema_version` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Store**: `store.data_dir`, `store.name`, `store.schema_version` - which store file to open
//!   and at which schema version
//! - **Upload**: `upload.max_file_size`, `upload.max_name_attempts` - upload limits
//!
//! Every store operation takes the relevant section explicitly; there is no global config.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::Error;

/// Largest accepted upload: 200 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CSVSHELF_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation, so an empty or
/// missing config file is valid.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Which store to open and at which schema version
    pub store: StoreConfig,
    /// Upload limits
    pub upload: UploadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            store: StoreConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

/// Location and schema version of a store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one SQLite file per store
    pub data_dir: PathBuf,
    /// Store name, used as the file stem
    pub name: String,
    /// Schema version to open the store at (>= 1)
    pub schema_version: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            name: "csv-files".to_string(),
            schema_version: 1,
        }
    }
}

impl StoreConfig {
    /// Path of the store file on disk
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", self.name))
    }
}

/// Upload limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum file size in bytes (default: 200 MiB)
    pub max_file_size: u64,
    /// Total insert attempts when resolving a name collision (default: 5)
    pub max_name_attempts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_name_attempts: 5,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let name = &self.store.name;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::Internal {
                operation: format!("Config validation: store.name '{name}' must be a non-empty file stem without path separators"),
            });
        }

        if self.store.schema_version == 0 {
            return Err(Error::Internal {
                operation: "Config validation: store.schema_version must be at least 1".to_string(),
            });
        }

        if self.upload.max_file_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: upload.max_file_size must be greater than 0".to_string(),
            });
        }

        if self.upload.max_name_attempts == 0 {
            return Err(Error::Internal {
                operation: "Config validation: upload.max_name_attempts must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("CSVSHELF_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
