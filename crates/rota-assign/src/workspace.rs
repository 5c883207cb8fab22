use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use rota_storage_sqlite::SqliteStorage;
use tracing::info;

use crate::{Assigner, Config};

/// A directory holding `.rota/rota.toml` and the mission database.
pub struct Workspace {
    pub root: PathBuf,
    pub cfg: Config,
    pub assigner: Assigner<SqliteStorage>,
}

impl Workspace {
    /// Open the workspace, writing a default config the first time. The schema
    /// is applied on every open.
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg = load_or_create_config(&root)?;
        let storage = SqliteStorage::open_with_timeout(&cfg.db_path(&root), cfg.busy_timeout())?;
        let assigner = Assigner::new(Arc::new(storage)).with_seed(cfg.assign.seed);
        Ok(Self { root, cfg, assigner })
    }

    pub fn init(root: &Path) -> Result<()> {
        let cfg = load_or_create_config(root)?;
        let db_path = cfg.db_path(root);
        let _ = SqliteStorage::open(&db_path)?;
        info!(db = %db_path.display(), "initialized workspace");
        Ok(())
    }

    pub fn storage(&self) -> &SqliteStorage {
        self.assigner.store()
    }
}

fn load_or_create_config(root: &Path) -> Result<Config> {
    let cfg_path = Config::config_path(root);
    if cfg_path.exists() {
        return Config::load_from(&cfg_path);
    }
    let cfg = Config::default();
    cfg.save_to(&cfg_path)?;
    Ok(cfg)
}
