//! Node configuration: TOML file plus `AGORA__*` environment overrides.
//!
//! Only operator concerns live here. Consensus constants (starter words,
//! payload delimiter, extension word limit, response codes) are fixed in
//! code so replicas cannot diverge through configuration.

use crate::application::AppError;
use agora_state::{ForumStore, MemoryStore};
use config::{Config, Environment, File, FileFormat};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ENV_PREFIX: &str = "AGORA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: StorageBackend,

    /// RocksDB directory
    pub db_path: PathBuf,

    /// RocksDB memtable size in bytes
    pub write_buffer_size: usize,

    /// RocksDB flush and compaction threads
    pub max_background_jobs: i32,

    /// Words this validator signals through its vote extensions
    pub moderation_words: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            backend: StorageBackend::Rocksdb,
            db_path: PathBuf::from("data/agora"),
            write_buffer_size: 64 * 1024 * 1024,
            max_background_jobs: 4,
            moderation_words: Vec::new(),
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("moderation_words")
}

impl AppConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config = builder
            .add_source(env_source())
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Self::finish(config)
    }

    /// Parse TOML text, without environment overrides.
    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, AppError> {
        let parsed: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.backend == StorageBackend::Rocksdb && self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config(
                "db_path is required for the rocksdb backend".to_string(),
            ));
        }
        Ok(())
    }

    /// Open the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn ForumStore>, AppError> {
        match self.backend {
            StorageBackend::Memory => {
                info!("Using in-memory store");
                Ok(Arc::new(MemoryStore::new()))
            }
            StorageBackend::Rocksdb => self.open_rocksdb(),
        }
    }

    #[cfg(feature = "rocksdb")]
    fn open_rocksdb(&self) -> Result<Arc<dyn ForumStore>, AppError> {
        let tuning = agora_state::RocksDbConfig {
            write_buffer_size: self.write_buffer_size,
            max_background_jobs: self.max_background_jobs,
        };
        let store = agora_state::RocksStore::open_with_config(&self.db_path, tuning)?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "rocksdb"))]
    fn open_rocksdb(&self) -> Result<Arc<dyn ForumStore>, AppError> {
        Err(AppError::Config(
            "rocksdb backend requested but agora-app was built without the rocksdb feature"
                .to_string(),
        ))
    }
}
