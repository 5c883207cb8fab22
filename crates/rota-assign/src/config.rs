use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STATE_DIR: &str = ".rota";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub assign: AssignConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file name, relative to the state directory.
    pub db_file: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignConfig {
    /// Fixed shuffle seed for reproducible batches. Unset: seeded from the clock.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig { db_file: "mission.db".to_string(), busy_timeout_ms: default_busy_timeout_ms() },
            assign: AssignConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse rota.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store.busy_timeout_ms)
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join("rota.toml")
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(&self.store.db_file)
    }
}
