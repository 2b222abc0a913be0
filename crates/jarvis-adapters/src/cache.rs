//! On-disk key/value cache, `{ "Data": { key: value } }`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use jarvis_core::{KvCache, PortError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(rename = "Data", default)]
    data: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    /// `None` until the file has been read.
    data: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<MutexGuard<'_, Option<BTreeMap<String, String>>>, PortError> {
        let mut guard = self
            .data
            .lock()
            .map_err(|e| PortError::Cache(format!("cache lock poisoned: {e}")))?;
        if guard.is_none() {
            *guard = Some(read_file(&self.path));
        }
        Ok(guard)
    }

    fn flush(&self, data: &BTreeMap<String, String>) -> Result<(), PortError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| PortError::Cache(format!("create {}: {e}", dir.display())))?;
        }
        let body = serde_json::to_vec(&CacheFile { data: data.clone() })
            .map_err(|e| PortError::Cache(format!("serialize cache: {e}")))?;
        let mut file = fs::File::create(&self.path)
            .map_err(|e| PortError::Cache(format!("open {}: {e}", self.path.display())))?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| PortError::Cache(format!("write {}: {e}", self.path.display())))
    }
}

fn read_file(path: &Path) -> BTreeMap<String, String> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cache file not readable, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice::<CacheFile>(&raw) {
        Ok(file) => file.data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cache file is corrupt, starting empty");
            BTreeMap::new()
        }
    }
}

impl KvCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(guard) => guard.as_ref().and_then(|d| d.get(&key.to_lowercase()).cloned()),
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let mut guard = match self.load() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "cache write skipped");
                return;
            }
        };
        let data = guard.get_or_insert_with(BTreeMap::new);
        data.insert(key.to_lowercase(), value.to_owned());
        if let Err(e) = self.flush(data) {
            warn!(key, error = %e, "cache flush failed, keeping value in memory");
        } else {
            debug!(key, "cache entry written");
        }
    }
}
