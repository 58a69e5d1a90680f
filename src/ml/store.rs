//! Model artifact persistence.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ForecastResult;

/// Named blob storage for trained models and scalers.
///
/// Calls block; run them through the worker pool.
pub trait ModelStore: Send + Sync {
    fn save(&self, name: &str, bytes: &[u8]) -> io::Result<()>;
    fn load(&self, name: &str) -> io::Result<Vec<u8>>;
    fn exists(&self, name: &str) -> bool;
    /// Last write time, `None` when the artifact does not exist.
    fn modified_at(&self, name: &str) -> Option<DateTime<Utc>>;
}

pub fn save_artifact<T: Serialize>(store: &dyn ModelStore, name: &str, value: &T) -> ForecastResult<()> {
    let bytes = bincode::serialize(value)?;
    store.save(name, &bytes)?;
    debug!(artifact = name, bytes = bytes.len(), "artifact saved");
    Ok(())
}

pub fn load_artifact<T: DeserializeOwned>(store: &dyn ModelStore, name: &str) -> ForecastResult<T> {
    let bytes = store.load(name)?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Artifacts as files in one directory.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl ModelStore for FileModelStore {
    fn save(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        let target = self.path(name);
        let tmp = self.path(&format!(".{name}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)
    }

    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path(name))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    fn modified_at(&self, name: &str) -> Option<DateTime<Utc>> {
        fs::metadata(self.path(name))
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    entries: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the recorded write time of an existing artifact.
    pub fn set_modified_at(&self, name: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.lock().get_mut(name) {
            entry.1 = at;
        }
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries.lock().insert(name.to_string(), (bytes.to_vec(), Utc::now()));
        Ok(())
    }

    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        self.entries
            .lock()
            .get(name)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("artifact {name} not found")))
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    fn modified_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(name).map(|(_, at)| *at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::FeatureScaler;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path().join("models")).unwrap();
        assert!(!store.exists("scaler.bin"));
        assert_eq!(store.modified_at("scaler.bin"), None);

        let scaler = FeatureScaler::fit(&[vec![1.0, 2.0], vec![3.0, 6.0]]).unwrap();
        save_artifact(&store, "scaler.bin", &scaler).unwrap();

        assert!(store.exists("scaler.bin"));
        assert!(store.modified_at("scaler.bin").is_some());
        let restored: FeatureScaler = load_artifact(&store, "scaler.bin").unwrap();
        assert_eq!(restored, scaler);
        assert!(!dir.path().join("models").join(".scaler.bin.tmp").exists());
    }

    #[test]
    fn test_load_missing_is_storage_error() {
        let store = MemoryModelStore::new();
        let err = load_artifact::<FeatureScaler>(&store, "missing.bin").unwrap_err();
        assert!(matches!(err, crate::error::ForecastError::Storage(_)));
    }

    #[test]
    fn test_memory_store_modified_override() {
        let store = MemoryModelStore::new();
        store.save("a", b"x").unwrap();
        let past = Utc::now() - chrono::Duration::days(3);
        store.set_modified_at("a", past);
        assert_eq!(store.modified_at("a"), Some(past));
    }
}
