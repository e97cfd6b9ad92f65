//! Directory-backed [`FastCache`] implementation.
//!
//! Each key is one file under the cache directory. Writes go to a
//! temporary sibling first and are renamed into place, so a reader sees
//! either the old value or the new one, never a torn file. Values survive
//! process restarts.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::storage::error::StorageError;
use crate::storage::fast_cache::{check_quota, FastCache};

use super::memory::DEFAULT_FAST_CACHE_CAPACITY;

const VALUE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Configuration for [`FileFastCache`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFastCacheConfig {
    /// Directory holding one file per key. Created if missing.
    pub dir: PathBuf,
    /// Maximum bytes across all values. `None` means unbounded.
    #[serde(default = "default_capacity")]
    pub capacity_bytes: Option<u64>,
}

#[allow(clippy::unnecessary_wraps)]
fn default_capacity() -> Option<u64> {
    Some(DEFAULT_FAST_CACHE_CAPACITY)
}

impl FileFastCacheConfig {
    /// Config for `dir` with the default capacity.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity_bytes: default_capacity(),
        }
    }
}

/// Fast cache persisting each key as a file.
#[derive(Debug)]
pub struct FileFastCache {
    dir: PathBuf,
    capacity: Option<u64>,
}

impl FileFastCache {
    /// Opens (and creates if needed) the cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn open(config: FileFastCacheConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            dir: config.dir,
            capacity: config.capacity_bytes,
        })
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{VALUE_EXTENSION}", encode_file_name(key)))
    }

    fn value_files(&self) -> impl Iterator<Item = fs::DirEntry> {
        fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|entry| {
                entry.path().extension().and_then(|ext| ext.to_str()) == Some(VALUE_EXTENSION)
            })
    }
}

/// Maps a key to a portable file name: ASCII alphanumerics, `-`, `_` and
/// `.` pass through, every other byte becomes `%XX`.
fn encode_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map_or(0, |meta| meta.len())
}

impl FastCache for FileFastCache {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.value_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.value_path(key);
        check_quota(
            self.capacity,
            self.used_bytes(),
            file_len(&path),
            value.len() as u64,
        )?;

        let temp = path.with_extension(TEMP_EXTENSION);
        let mut file = fs::File::create(&temp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        self.value_path(key).is_file()
    }

    fn len(&self) -> usize {
        self.value_files().count()
    }

    fn used_bytes(&self) -> u64 {
        self.value_files().map(|entry| file_len(&entry.path())).sum()
    }
}
