use std::path::{Path, PathBuf};

use uuid::Uuid;

use warden_store::{KvStore, StoreResult};

const KV_DIR: &str = "kv";
const DEFINITION_FILE: &str = "service.json";
const LOG_FILE: &str = "controller.log";
const RUN_DIR: &str = "run";

/// Layout of one controller's state directory.
///
/// ```text
/// <root>/kv/<key>
/// <root>/service.json
/// <root>/controller.log
/// <root>/run/*.gate
/// ```
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kv(&self) -> PathBuf {
        self.root.join(KV_DIR)
    }

    pub fn definition(&self) -> PathBuf {
        self.root.join(DEFINITION_FILE)
    }

    pub fn log(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(RUN_DIR)
    }

    /// Fresh, never-used gate path under `run/`.
    pub fn gate_path(&self, prefix: &str) -> PathBuf {
        self.run_dir()
            .join(format!("{prefix}-{}.gate", Uuid::new_v4().simple()))
    }

    /// Store handle without touching the filesystem.
    pub fn store(&self) -> KvStore {
        KvStore::open(self.kv())
    }

    /// Store handle, creating the directory tree when missing.
    pub fn init_store(&self) -> StoreResult<KvStore> {
        KvStore::init(self.kv())
    }
}
