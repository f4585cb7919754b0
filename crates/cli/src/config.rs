use anyhow::{Context, Result};
use phone_matcher_pipeline::PipelineConfig;
use phone_matcher_registry::{PoolConfig, DEFAULT_POOL_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub(crate) const ENV_DB: &str = "PHONE_MATCHER_DB";
pub(crate) const ENV_POOL_SIZE: &str = "PHONE_MATCHER_POOL_SIZE";
const DEFAULT_DATABASE: &str = "phone-matcher.sqlite";

/// Settings resolved from defaults, an optional TOML file and the
/// environment. Command-line flags are applied on top by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub database: PathBuf,
    pub pipeline: PipelineConfig,
    pub pool: PoolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            pipeline: PipelineConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl AppConfig {
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(base.with_overrides_from(|key| std::env::var(key).ok()))
    }

    fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(Into::into)
    }

    fn with_overrides_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database = lookup(ENV_DB)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or(self.database, PathBuf::from);
        let pool_default = if self.pool.max_handles == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.pool.max_handles
        };
        let max_handles =
            PoolConfig::parse_max_handles(lookup(ENV_POOL_SIZE).as_deref(), pool_default);

        Self {
            database,
            pipeline: self.pipeline.with_overrides_from(&lookup),
            pool: PoolConfig::new(max_handles),
        }
    }
}
