use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    pin::pin,
    process,
};

use futures_util::StreamExt;
use inotify::{Inotify, WatchMask};
use tracing::trace;

use crate::{StoreError, StoreResult};

/// Default value written by [`KvStore::set_flag`].
const FLAG_VALUE: &str = "true";

/// Directory-backed string store.
///
/// Each key is a file whose entire contents are the value. Writes go through a
/// hidden temporary file and an atomic `rename`, so readers observe either the
/// previous value or the new one, never a partial write. Hidden (dot) files are
/// not keys.
///
/// There is no locking: callers coordinate through single-writer-per-key discipline.
#[derive(Debug, Clone)]
pub struct KvStore {
    dir: PathBuf,
}

impl KvStore {
    /// Open a store at `dir` without touching the filesystem.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open a store at `dir`, creating the directory if needed.
    pub fn init(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::open(dir);
        fs::create_dir_all(&store.dir)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns `true` if `key` can name an entry of the store.
    pub fn is_valid_key(key: &str) -> bool {
        !key.is_empty() && !key.starts_with('.') && !key.contains('/') && !key.contains('\0')
    }

    fn path_of(&self, key: &str) -> StoreResult<PathBuf> {
        if !Self::is_valid_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }

    /// Write `value` as the full contents of `key`.
    pub fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_of(key)?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", process::id()));
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            f.write_all(value.as_bytes())?;
            f.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        trace!(key, value, "kv set");
        Ok(())
    }

    /// Write the conventional `true` marker under `key`.
    pub fn set_flag(&self, key: &str) -> StoreResult<()> {
        self.set(key, FLAG_VALUE)
    }

    /// Read `key`, failing with [`StoreError::NotFound`] if it is absent.
    pub fn get(&self, key: &str) -> StoreResult<String> {
        let path = self.path_of(key)?;
        match fs::read_to_string(&path) {
            Ok(v) => Ok(v),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read `key`, returning `default` if it is absent.
    pub fn get_or(&self, key: &str, default: &str) -> StoreResult<String> {
        match self.get(key) {
            Err(StoreError::NotFound(_)) => Ok(default.to_string()),
            other => other,
        }
    }

    /// Read `key`, mapping absence to `None`.
    pub fn get_opt(&self, key: &str) -> StoreResult<Option<String>> {
        match self.get(key) {
            Ok(v) => Ok(Some(v)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_of(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Remove `key`; an absent key is not an error.
    pub fn clear(&self, key: &str) -> StoreResult<()> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                trace!(key, "kv clear");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry, including abandoned temporary files, keeping the directory.
    pub fn flush(&self) -> StoreResult<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            match fs::remove_file(entry.path()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        trace!(dir = %self.dir.display(), "kv flush");
        Ok(())
    }

    /// Visible keys in sorted order.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if Self::is_valid_key(name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// All visible entries. Keys removed while scanning are skipped.
    pub fn snapshot(&self) -> StoreResult<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for key in self.keys()? {
            if let Some(value) = self.get_opt(&key)? {
                out.insert(key, value);
            }
        }
        Ok(out)
    }

    /// Wait until `key` exists and return its value.
    ///
    /// Blocks on directory-change notifications; a key that already exists
    /// returns immediately.
    pub async fn wait_for_key(&self, key: &str) -> StoreResult<String> {
        self.path_of(key)?;

        let inotify = Inotify::init()?;
        inotify
            .watches()
            .add(&self.dir, WatchMask::MOVED_TO | WatchMask::CLOSE_WRITE)?;

        // Armed before the existence check: a write landing in between is still queued.
        if let Some(value) = self.get_opt(key)? {
            return Ok(value);
        }

        let mut events = pin!(inotify.into_event_stream([0u8; 1024])?);
        while let Some(event) = events.next().await {
            let event = event?;
            if event.name.as_deref().and_then(|n| n.to_str()) != Some(key) {
                continue;
            }
            if let Some(value) = self.get_opt(key)? {
                return Ok(value);
            }
        }
        Err(StoreError::WatchClosed(self.dir.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, KvStore) {
        let tmp = TempDir::new().unwrap();
        let kv = KvStore::init(tmp.path().join("kv")).unwrap();
        (tmp, kv)
    }

    #[test]
    fn set_then_get_returns_exact_value() {
        let (_tmp, kv) = store();
        kv.set("status", "complete,pass").unwrap();
        assert_eq!(kv.get("status").unwrap(), "complete,pass");

        kv.set("multi", "a\nb\n").unwrap();
        assert_eq!(kv.get("multi").unwrap(), "a\nb\n");
    }

    #[test]
    fn last_write_wins() {
        let (_tmp, kv) = store();
        kv.set("k", "one").unwrap();
        kv.set("k", "two").unwrap();
        assert_eq!(kv.get("k").unwrap(), "two");
    }

    #[test]
    fn flag_defaults_to_true() {
        let (_tmp, kv) = store();
        kv.set_flag("ready").unwrap();
        assert_eq!(kv.get("ready").unwrap(), "true");
    }

    #[test]
    fn missing_key_is_not_found_or_default() {
        let (_tmp, kv) = store();
        assert!(matches!(kv.get("nope"), Err(StoreError::NotFound(k)) if k == "nope"));
        assert_eq!(kv.get_or("nope", "fallback").unwrap(), "fallback");
        assert_eq!(kv.get_opt("nope").unwrap(), None);
    }

    #[test]
    fn clear_is_idempotent() {
        let (_tmp, kv) = store();
        kv.set("k", "v").unwrap();
        kv.clear("k").unwrap();
        kv.clear("k").unwrap();
        assert!(!kv.contains("k"));
    }

    #[test]
    fn flush_empties_but_keeps_directory() {
        let (_tmp, kv) = store();
        kv.set("a", "1").unwrap();
        kv.set("b", "2").unwrap();
        fs::write(kv.dir().join(".a.99.tmp"), "junk").unwrap();

        kv.flush().unwrap();

        assert!(kv.dir().is_dir());
        assert!(kv.keys().unwrap().is_empty());
        assert_eq!(fs::read_dir(kv.dir()).unwrap().count(), 0);
    }

    #[test]
    fn hidden_files_are_not_keys() {
        let (_tmp, kv) = store();
        kv.set("b", "2").unwrap();
        kv.set("a", "1").unwrap();
        fs::write(kv.dir().join(".partial"), "x").unwrap();

        assert_eq!(kv.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        let snap = kv.snapshot().unwrap();
        assert_eq!(snap.get("a").map(String::as_str), Some("1"));
        assert_eq!(snap.len(), 2);
    }

    #[test]
    fn rejects_invalid_keys() {
        let (_tmp, kv) = store();
        for bad in ["", ".hidden", "a/b"] {
            assert!(matches!(kv.set(bad, "v"), Err(StoreError::InvalidKey(_))));
        }
    }

    #[test]
    fn set_on_missing_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let kv = KvStore::open(tmp.path().join("absent"));
        assert!(matches!(kv.set("k", "v"), Err(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn wait_for_key_returns_existing_value() {
        let (_tmp, kv) = store();
        kv.set("svcpid", "42").unwrap();
        assert_eq!(kv.wait_for_key("svcpid").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn wait_for_key_blocks_until_written() {
        let (_tmp, kv) = store();
        let writer = kv.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.set("other", "x").unwrap();
            writer.set("cntrlpid", "7").unwrap();
        });

        let value = tokio::time::timeout(Duration::from_secs(5), kv.wait_for_key("cntrlpid"))
            .await
            .expect("key should appear")
            .unwrap();
        assert_eq!(value, "7");
    }
}
