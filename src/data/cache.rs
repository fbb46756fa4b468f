use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use once_cell::sync::Lazy;

use super::error::LoadError;
use super::loader::{load_with, LoadOptions};
use super::model::ProjectTable;

/// Identity of a source file's content as seen by the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl SourceFingerprint {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

struct CachedTable {
    fingerprint: SourceFingerprint,
    table: Arc<ProjectTable>,
}

type CacheKey = (PathBuf, LoadOptions);

/// Memoized base tables, one per source file and load options.
///
/// An entry is reused while the file's fingerprint is unchanged. Loads run
/// outside the lock, so two callers missing at once both load and the
/// later insert wins; tables are immutable once shared.
#[derive(Default)]
pub struct DatasetCache {
    entries: Mutex<HashMap<CacheKey, CachedTable>>,
}

static GLOBAL: Lazy<DatasetCache> = Lazy::new(DatasetCache::default);

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache.
    pub fn global() -> &'static DatasetCache {
        &GLOBAL
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CachedTable>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached table for `path`, loading it when absent or stale.
    /// Errors are not cached.
    pub fn get_or_load(
        &self,
        path: &Path,
        options: &LoadOptions,
    ) -> Result<Arc<ProjectTable>, LoadError> {
        let source = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let fingerprint = SourceFingerprint::of(&source).map_err(|e| LoadError::Io {
            path: source.clone(),
            source: e,
        })?;
        let key = (source, options.clone());

        if let Some(entry) = self.lock().get(&key) {
            if entry.fingerprint == fingerprint {
                log::debug!("Dataset cache hit for {}", key.0.display());
                return Ok(Arc::clone(&entry.table));
            }
            log::info!("{} changed on disk, reloading", key.0.display());
        }

        let table = Arc::new(load_with(&key.0, options)?);
        self.lock().insert(
            key,
            CachedTable {
                fingerprint,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    /// Drop every entry for `path`. Returns whether anything was removed.
    pub fn invalidate(&self, path: &Path) -> bool {
        let source = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(p, _), _| *p != source);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
