// ── Local config persistence ──
//
// The sync orchestrator loads, snapshots and restores the local config
// through `ConfigStore`. The file store writes pretty JSON atomically and
// keeps the previous file as `<name>.bak`, next to it or in a backup dir.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::CoreError;
use crate::model::UnifiedConfig;

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<UnifiedConfig, CoreError>;
    fn save(&self, config: &UnifiedConfig) -> Result<(), CoreError>;
}

// ── File store ───────────────────────────────────────────────────────

/// JSON config file on disk.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    backup_dir: Option<PathBuf>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: None,
        }
    }

    /// Keep backups in `dir` instead of next to the config file.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `doorman.json` → `doorman.json.bak`.
    pub fn backup_path(&self) -> PathBuf {
        let beside = sibling(&self.path, "bak");
        match (&self.backup_dir, beside.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => beside,
        }
    }

    fn temp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<UnifiedConfig, CoreError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            CoreError::store(format!("cannot read {}: {e}", self.path.display()))
        })?;
        UnifiedConfig::from_json(&text).map_err(|e| CoreError::Config {
            message: format!("{} is not a valid config: {e}", self.path.display()),
        })
    }

    fn save(&self, config: &UnifiedConfig) -> Result<(), CoreError> {
        let text = config.to_json_pretty()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoreError::store(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        if self.path.exists() {
            if let Some(ref dir) = self.backup_dir {
                fs::create_dir_all(dir).map_err(|e| {
                    CoreError::store(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
            fs::copy(&self.path, self.backup_path())
                .map_err(|e| CoreError::store(format!("cannot write backup: {e}")))?;
        }

        let temp = self.temp_path();
        fs::write(&temp, text)
            .map_err(|e| CoreError::store(format!("cannot write {}: {e}", temp.display())))?;
        fs::rename(&temp, &self.path).map_err(|e| {
            CoreError::store(format!("cannot replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), rules = config.rules.len(), ips = config.ips.len(), "saved config");
        Ok(())
    }
}

// ── Memory store ─────────────────────────────────────────────────────

/// In-process store; the initial value is what `load` returns until saved.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<UnifiedConfig>,
    saves: Mutex<usize>,
}

impl MemoryConfigStore {
    pub fn new(config: UnifiedConfig) -> Self {
        Self {
            config: Mutex::new(config),
            saves: Mutex::new(0),
        }
    }

    /// Current contents.
    pub fn snapshot(&self) -> Result<UnifiedConfig, CoreError> {
        self.load()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map_or(0, |count| *count)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<UnifiedConfig, CoreError> {
        self.config
            .lock()
            .map(|config| config.clone())
            .map_err(|_| CoreError::store("memory store lock poisoned"))
    }

    fn save(&self, config: &UnifiedConfig) -> Result<(), CoreError> {
        let mut slot = self
            .config
            .lock()
            .map_err(|_| CoreError::store("memory store lock poisoned"))?;
        *slot = config.clone();
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{IpAction, UnifiedIpRule};
    use pretty_assertions::assert_eq;

    #[test]
    fn file_store_round_trips_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("doorman.json"));

        let first = UnifiedConfig::default();
        store.save(&first).unwrap();
        assert!(!store.backup_path().exists());
        assert_eq!(store.load().unwrap(), first);

        let second =
            UnifiedConfig::default().with_ips(vec![UnifiedIpRule::new("10.0.0.1", IpAction::Deny)]);
        store.save(&second).unwrap();
        assert_eq!(store.load().unwrap(), second);

        let backup = fs::read_to_string(store.backup_path()).unwrap();
        assert_eq!(UnifiedConfig::from_json(&backup).unwrap(), first);
        assert!(!dir.path().join("doorman.json.tmp").exists());
    }

    #[test]
    fn file_store_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("nested").join("fw.json"));
        store.save(&UnifiedConfig::default()).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.starts_with("{\n  \"schemaVersion\": 2"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn backups_can_live_in_a_separate_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");
        let store =
            FileConfigStore::new(dir.path().join("doorman.json")).with_backup_dir(&backups);
        assert_eq!(store.backup_path(), backups.join("doorman.json.bak"));

        store.save(&UnifiedConfig::default()).unwrap();
        store.save(&UnifiedConfig::default()).unwrap();
        assert!(backups.join("doorman.json.bak").exists());
        assert!(!dir.path().join("doorman.json.bak").exists());
    }

    #[test]
    fn missing_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(CoreError::Store { .. })));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileConfigStore::new(path).load(),
            Err(CoreError::Config { .. })
        ));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryConfigStore::new(UnifiedConfig::default());
        assert_eq!(store.save_count(), 0);
        let mut next = UnifiedConfig::default();
        next.version = Some(4);
        store.save(&next).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().unwrap().version, Some(4));
    }
}
