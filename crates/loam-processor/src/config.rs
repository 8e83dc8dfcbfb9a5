use log::{info, LevelFilter};
use loam_common::{LoamError, Result};
use loam_protocol::{ChunkDecoder, DecoderOptions};
use loam_world::{BlockRegistry, BlockTranslator, RuntimeIdTable, TranslationCache};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const WORKERS_ENV: &str = "LOAM_WORKERS";
pub const LOG_ENV: &str = "LOAM_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Upper bound on decode threads.
    pub worker_threads: usize,
    /// How long an idle worker waits for a job before exiting.
    pub worker_idle_timeout_ms: u64,
    /// Sections carry sky and block light arrays.
    pub extended_light: bool,
    pub log_level: String,
    pub block_registry_path: Option<PathBuf>,
    pub legacy_map_path: Option<PathBuf>,
    pub runtime_table_path: Option<PathBuf>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            worker_threads: 4,
            worker_idle_timeout_ms: 1000,
            extended_light: false,
            log_level: "info".to_string(),
            block_registry_path: None,
            legacy_map_path: None,
            runtime_table_path: None,
        }
    }
}

impl ProcessorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ProcessorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON file, then applies environment overrides.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let mut config: ProcessorConfig = serde_json::from_str(&json)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `LOAM_WORKERS` and `LOAM_LOG` from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = lookup(WORKERS_ENV) {
            self.worker_threads = workers.trim().parse().map_err(|_| {
                LoamError::ConfigError(format!("{} is not a number: {}", WORKERS_ENV, workers))
            })?;
        }
        if let Some(level) = lookup(LOG_ENV) {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(LoamError::ConfigError(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_idle_timeout_ms)
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| LoamError::ConfigError(format!("Unknown log level: {}", self.log_level)))
    }

    /// Builds a decoder over the configured block tables. Without a block
    /// list the registry only knows air; without a runtime table every
    /// palette entry is unresolved.
    pub fn load_decoder(&self) -> Result<ChunkDecoder> {
        let registry = match &self.block_registry_path {
            Some(path) => {
                let blocks = fs::read_to_string(path)?;
                let legacy = match &self.legacy_map_path {
                    Some(path) => Some(fs::read_to_string(path)?),
                    None => None,
                };
                BlockRegistry::from_json(&blocks, legacy.as_deref())?
            }
            None => BlockRegistry::builder().build(),
        };
        let runtime_table = match &self.runtime_table_path {
            Some(path) => RuntimeIdTable::from_json(&fs::read_to_string(path)?)?,
            None => RuntimeIdTable::default(),
        };
        info!(
            "Loaded {} block states and {} runtime ids",
            registry.len(),
            runtime_table.len()
        );

        let translator = BlockTranslator::new(
            Arc::new(registry),
            Arc::new(runtime_table),
            Arc::new(TranslationCache::new()),
        );
        Ok(ChunkDecoder::new(
            Arc::new(translator),
            DecoderOptions {
                extended_light: self.extended_light,
            },
        ))
    }
}
