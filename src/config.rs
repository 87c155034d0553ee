use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToplineConfig {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Whole-pipeline attempts per query, including the first run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entry lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_max_attempts() -> usize {
    2
}
fn default_max_entries() -> usize {
    100
}
fn default_ttl_secs() -> u64 {
    600
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl ToplineConfig {
    pub async fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("topline.toml");
        if !config_path.exists() {
            info!("No topline.toml found, using default settings.");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let config: ToplineConfig = toml::from_str(&content)?;

        info!(
            "Loaded config: max_attempts={}, cache_entries={}, cache_ttl={}s",
            config.pipeline.max_attempts, config.cache.max_entries, config.cache.default_ttl_secs
        );
        Ok(config)
    }
}
