// Copyright 2025 The Strata Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![expect(missing_docs)]

//! Typed record storage under the repository directory.
//!
//! All persisted state goes through this adapter: whole-file JSON records and
//! line-delimited JSON logs. Writes are atomic (temp file in the target
//! directory, then rename), so concurrent readers observe either the old or
//! the new record, never a torn one. Reads are cached in memory and the cache
//! entry is invalidated by any write through the same adapter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RepoError;
use crate::error::RepoResult;
use crate::file_util;

/// Record store rooted at a repository directory.
#[derive(Debug)]
pub struct ObjectStore {
    root: PathBuf,
    cache: RefCell<HashMap<String, Arc<Vec<u8>>>>,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Creates the directory and any missing parents.
    pub fn mkdir_p(&self, rel: &str) -> RepoResult<()> {
        let path = self.abs(rel);
        fs::create_dir_all(&path).map_err(|err| RepoError::DirectoryCreateFailed {
            path,
            source: err.into(),
        })
    }

    /// Atomically replaces the record at `rel` with `bytes`.
    pub fn write_atomic(&self, rel: &str, bytes: &[u8]) -> RepoResult<()> {
        let path = self.abs(rel);
        file_util::write_atomic(&path, bytes).map_err(|err| RepoError::StorageWriteFailed {
            path: path.clone(),
            source: err.into(),
        })?;
        tracing::debug!(path = %path.display(), len = bytes.len(), "wrote record");
        self.cache.borrow_mut().remove(rel);
        Ok(())
    }

    /// Reads the record at `rel`, or `None` if it does not exist.
    pub fn read(&self, rel: &str) -> RepoResult<Option<Arc<Vec<u8>>>> {
        if let Some(cached) = self.cache.borrow().get(rel) {
            return Ok(Some(cached.clone()));
        }
        let path = self.abs(rel);
        match fs::read(&path) {
            Ok(bytes) => {
                let bytes = Arc::new(bytes);
                self.cache
                    .borrow_mut()
                    .insert(rel.to_string(), bytes.clone());
                Ok(Some(bytes))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RepoError::StorageReadFailed {
                path,
                source: err.into(),
            }),
        }
    }

    /// Appends one line to the log at `rel`, creating it if missing.
    pub fn append_line(&self, rel: &str, line: &str) -> RepoResult<()> {
        debug_assert!(!line.contains('\n'));
        let path = self.abs(rel);
        let append = || -> std::io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            writeln!(file, "{line}")?;
            file.sync_data()
        };
        append().map_err(|err| RepoError::StorageWriteFailed {
            path: path.clone(),
            source: err.into(),
        })?;
        self.cache.borrow_mut().remove(rel);
        Ok(())
    }

    /// Reads the log at `rel` as lines, empty if the file does not exist.
    pub fn read_lines(&self, rel: &str) -> RepoResult<Vec<String>> {
        match self.read(rel)? {
            None => Ok(vec![]),
            Some(bytes) => {
                let text = str::from_utf8(&bytes).map_err(|err| RepoError::StorageCorrupt {
                    path: self.abs(rel),
                    message: err.to_string(),
                })?;
                Ok(text.lines().map(|line| line.to_string()).collect())
            }
        }
    }

    /// Metadata of the record at `rel`, or `None` if it does not exist.
    pub fn stat(&self, rel: &str) -> RepoResult<Option<fs::Metadata>> {
        let path = self.abs(rel);
        match fs::metadata(&path) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RepoError::StorageReadFailed {
                path,
                source: err.into(),
            }),
        }
    }

    pub fn rename(&self, src: &str, dst: &str) -> RepoResult<()> {
        let from = self.abs(src);
        let to = self.abs(dst);
        fs::rename(&from, &to).map_err(|err| RepoError::FileMoveFailed {
            from,
            to,
            source: err.into(),
        })?;
        let mut cache = self.cache.borrow_mut();
        cache.remove(src);
        cache.remove(dst);
        Ok(())
    }

    pub fn rm_rf(&self, rel: &str) -> RepoResult<()> {
        let path = self.abs(rel);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(RepoError::StorageWriteFailed {
                    path,
                    source: err.into(),
                });
            }
        }
        self.cache
            .borrow_mut()
            .retain(|key, _| !key.starts_with(rel));
        Ok(())
    }

    /// Reads and parses the JSON record at `rel`.
    pub fn read_json<T: DeserializeOwned>(&self, rel: &str) -> RepoResult<Option<T>> {
        let Some(bytes) = self.read(rel)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(|err| RepoError::StorageCorrupt {
            path: self.abs(rel),
            message: err.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Serializes `value` and atomically replaces the record at `rel`.
    pub fn write_json<T: Serialize>(&self, rel: &str, value: &T) -> RepoResult<()> {
        let bytes =
            serde_json::to_vec_pretty(value).map_err(|err| RepoError::StorageWriteFailed {
                path: self.abs(rel),
                source: err.into(),
            })?;
        self.write_atomic(rel, &bytes)
    }

    /// Registers a filesystem watch. Watching is delegated to external
    /// collaborators; the plain filesystem store does not provide it.
    pub fn watch(
        &self,
        _rel: &str,
        _callback: Box<dyn FnMut(&Path) + 'static>,
    ) -> RepoResult<WatchHandle> {
        Err(RepoError::WatchNotSupported)
    }
}

/// Opaque handle returned by a successful [`ObjectStore::watch`]
/// registration; dropping it cancels the watch.
#[derive(Debug)]
pub struct WatchHandle {
    _private: (),
}
