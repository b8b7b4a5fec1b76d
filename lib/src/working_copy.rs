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

//! The per-workspace working copy.
//!
//! Tracks a file-state index (path to mtime/size/mode), detects on-disk
//! modifications, scans the tree into file maps, and restores file trees
//! from a change's snapshot. There is no staging area: scans feed directly
//! into the working-copy change.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use globset::GlobBuilder;
use serde::Deserialize;
use serde::Serialize;

use crate::backend::Change;
use crate::backend::FileMap;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::op_store::OperationId;
use crate::repo_path::RepoPathBuf;

pub const STATE_FORMAT_VERSION: u32 = 1;

/// Files larger than this are omitted from pre-operation undo snapshots.
pub const MAX_SNAPSHOT_FILE_SIZE: u64 = 1 << 20;
/// Total undo-snapshot budget; once exceeded, further files are omitted.
pub const MAX_SNAPSHOT_TOTAL_SIZE: u64 = 10 << 20;

/// Name of the engine's control directory inside a workspace.
pub const CONTROL_DIR: &str = ".jj";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileState {
    pub mtime_millis: i64,
    pub size: u64,
    pub mode: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl FileState {
    /// Creates a new `FileState` from filesystem metadata.
    pub fn for_metadata(metadata: &fs::Metadata) -> Self {
        let mtime_millis = metadata
            .modified()
            .map(|mtime| DateTime::<Utc>::from(mtime).timestamp_millis())
            .unwrap_or(0);
        Self {
            mtime_millis,
            size: metadata.len(),
            mode: file_mode(metadata),
            content_hash: None,
        }
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt as _;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// On-disk working-copy state record (`state.json`).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingCopyRecord {
    pub version: u32,
    pub workspace_id: String,
    pub change_id: crate::backend::ChangeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationId>,
    pub file_states: BTreeMap<RepoPathBuf, FileState>,
    #[serde(default)]
    pub sparse_patterns: Vec<String>,
}

#[derive(Debug)]
pub struct WorkingCopy {
    workspace_root: PathBuf,
    workspace_id: String,
    change_id: crate::backend::ChangeId,
    operation: Option<OperationId>,
    file_states: BTreeMap<RepoPathBuf, FileState>,
    sparse_patterns: Vec<String>,
}

impl WorkingCopy {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        workspace_id: impl Into<String>,
        change_id: crate::backend::ChangeId,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            workspace_id: workspace_id.into(),
            change_id,
            operation: None,
            file_states: BTreeMap::new(),
            sparse_patterns: vec![],
        }
    }

    pub fn from_record(workspace_root: impl Into<PathBuf>, record: WorkingCopyRecord) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            workspace_id: record.workspace_id,
            change_id: record.change_id,
            operation: record.operation,
            file_states: record.file_states,
            sparse_patterns: record.sparse_patterns,
        }
    }

    pub fn to_record(&self) -> WorkingCopyRecord {
        WorkingCopyRecord {
            version: STATE_FORMAT_VERSION,
            workspace_id: self.workspace_id.clone(),
            change_id: self.change_id.clone(),
            operation: self.operation.clone(),
            file_states: self.file_states.clone(),
            sparse_patterns: self.sparse_patterns.clone(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// The change the working copy currently edits.
    pub fn change_id(&self) -> &crate::backend::ChangeId {
        &self.change_id
    }

    /// Points the working copy at `change_id`.
    pub fn set_change_id(&mut self, change_id: crate::backend::ChangeId) {
        self.change_id = change_id;
    }

    /// Records the operation that last updated this working copy.
    pub fn set_operation(&mut self, operation: OperationId) {
        self.operation = Some(operation);
    }

    pub fn file_states(&self) -> &BTreeMap<RepoPathBuf, FileState> {
        &self.file_states
    }

    pub fn track(&mut self, path: RepoPathBuf, state: FileState) {
        self.file_states.insert(path, state);
    }

    pub fn untrack(&mut self, path: &RepoPathBuf) {
        self.file_states.remove(path);
    }

    pub fn sparse_patterns(&self) -> &[String] {
        &self.sparse_patterns
    }

    pub fn set_sparse_patterns(&mut self, patterns: Vec<String>) {
        self.sparse_patterns = patterns;
    }

    /// Whether `path` is part of the sparse checkout. An empty pattern list
    /// means full checkout. Patterns ending with `/` match any descendant of
    /// that directory; otherwise standard glob semantics apply (`*` within a
    /// segment, `**` across segments, `?` one non-separator character).
    pub fn matches_sparse(&self, path: &RepoPathBuf) -> bool {
        if self.sparse_patterns.is_empty() {
            return true;
        }
        self.sparse_patterns.iter().any(|pattern| {
            if let Some(dir) = pattern.strip_suffix('/') {
                return path.as_str().starts_with(&format!("{dir}/")) || path.as_str() == dir;
            }
            GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map(|glob| glob.compile_matcher().is_match(path.as_str()))
                .unwrap_or(false)
        })
    }

    /// Tracked paths whose on-disk mtime or size differ from the recorded
    /// state, or whose file has been deleted.
    pub fn modified_files(&self) -> RepoResult<Vec<RepoPathBuf>> {
        let mut modified = vec![];
        for (path, recorded) in &self.file_states {
            let fs_path = path.to_fs_path(&self.workspace_root);
            match fs::metadata(&fs_path) {
                Ok(metadata) => {
                    let current = FileState::for_metadata(&metadata);
                    if current.mtime_millis != recorded.mtime_millis
                        || current.size != recorded.size
                    {
                        modified.push(path.clone());
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    modified.push(path.clone());
                }
                Err(err) => {
                    return Err(RepoError::SnapshotFailed {
                        path: path.to_string(),
                        source: err.into(),
                    });
                }
            }
        }
        Ok(modified)
    }

    /// Scans the whole workspace tree into a file map, skipping the control
    /// directory and paths outside the sparse patterns. No size bounds: this
    /// feeds the working-copy change's snapshot, which must not drop data.
    pub fn scan(&self) -> RepoResult<FileMap> {
        let mut files = FileMap::new();
        self.scan_dir(&self.workspace_root, &mut files)?;
        Ok(files)
    }

    fn scan_dir(&self, dir: &Path, files: &mut FileMap) -> RepoResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(RepoError::SnapshotFailed {
                    path: dir.display().to_string(),
                    source: err.into(),
                });
            }
        };
        for entry in entries {
            let entry = entry.map_err(|err| RepoError::SnapshotFailed {
                path: dir.display().to_string(),
                source: err.into(),
            })?;
            let fs_path = entry.path();
            if entry.file_name() == CONTROL_DIR {
                continue;
            }
            if fs_path.is_dir() {
                self.scan_dir(&fs_path, files)?;
                continue;
            }
            let relative = fs_path
                .strip_prefix(&self.workspace_root)
                .expect("scanned path is under the workspace root");
            let path = RepoPathBuf::from_relative_path(relative)?;
            if !self.matches_sparse(&path) {
                continue;
            }
            let content = fs::read(&fs_path).map_err(|err| RepoError::SnapshotFailed {
                path: path.to_string(),
                source: err.into(),
            })?;
            files.insert(path, content);
        }
        Ok(())
    }

    /// Captures the contents of tracked files for the pre-operation undo
    /// snapshot. Files over [`MAX_SNAPSHOT_FILE_SIZE`] are omitted, and the
    /// total is capped at [`MAX_SNAPSHOT_TOTAL_SIZE`]; deleted files are
    /// skipped. An unreadable file fails the snapshot rather than being
    /// silently dropped.
    pub fn pre_snapshot(&self) -> RepoResult<FileMap> {
        let mut files = FileMap::new();
        let mut total = 0u64;
        for path in self.file_states.keys() {
            let fs_path = path.to_fs_path(&self.workspace_root);
            let metadata = match fs::metadata(&fs_path) {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(RepoError::SnapshotFailed {
                        path: path.to_string(),
                        source: err.into(),
                    });
                }
            };
            if metadata.len() > MAX_SNAPSHOT_FILE_SIZE
                || total + metadata.len() > MAX_SNAPSHOT_TOTAL_SIZE
            {
                tracing::debug!(%path, size = metadata.len(), "omitting file from undo snapshot");
                continue;
            }
            let content = fs::read(&fs_path).map_err(|err| RepoError::SnapshotFailed {
                path: path.to_string(),
                source: err.into(),
            })?;
            total += content.len() as u64;
            files.insert(path.clone(), content);
        }
        Ok(files)
    }

    /// Writes `content` at `path` inside the workspace, creating intermediate
    /// directories, and tracks the result.
    pub fn write_file(&mut self, path: &RepoPathBuf, content: &[u8]) -> RepoResult<()> {
        let fs_path = path.to_fs_path(&self.workspace_root);
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).map_err(|err| RepoError::DirectoryCreateFailed {
                path: parent.to_path_buf(),
                source: err.into(),
            })?;
        }
        fs::write(&fs_path, content).map_err(|err| RepoError::FileRestoreFailed {
            path: path.to_string(),
            source: err.into(),
        })?;
        let metadata = fs::metadata(&fs_path).map_err(|err| RepoError::FileRestoreFailed {
            path: path.to_string(),
            source: err.into(),
        })?;
        self.track(path.clone(), FileState::for_metadata(&metadata));
        Ok(())
    }

    /// Replaces the tracked tree with `files`: writes every entry, removes
    /// tracked files that are no longer present, and updates tracking.
    pub fn restore_files(&mut self, files: &FileMap) -> RepoResult<()> {
        let stale: Vec<RepoPathBuf> = self
            .file_states
            .keys()
            .filter(|path| !files.contains_key(*path))
            .cloned()
            .collect();
        for path in stale {
            let fs_path = path.to_fs_path(&self.workspace_root);
            match fs::remove_file(&fs_path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(RepoError::FileRestoreFailed {
                        path: path.to_string(),
                        source: err.into(),
                    });
                }
            }
            self.untrack(&path);
        }
        for (path, content) in files {
            self.write_file(path, content)?;
        }
        Ok(())
    }

    /// Restores the file tree recorded in `change`'s snapshot. Fails with
    /// `CannotRevert` when the change has no snapshot to restore from.
    pub fn restore_from(&mut self, change: &Change) -> RepoResult<()> {
        let Some(files) = &change.file_snapshot else {
            return Err(RepoError::CannotRevert {
                id: crate::object_id::ObjectId::hex(&change.id),
                reason: "change has no file snapshot".to_string(),
            });
        };
        self.restore_files(files)
    }

    /// Replaces the tracked index with the paths of `files`, re-reading each
    /// state from disk.
    pub fn retrack(&mut self, files: &FileMap) -> RepoResult<()> {
        self.file_states.clear();
        self.track_files(files)
    }

    /// Re-records the tracked state of every path in `files` from disk.
    pub fn track_files(&mut self, files: &FileMap) -> RepoResult<()> {
        for path in files.keys() {
            let fs_path = path.to_fs_path(&self.workspace_root);
            match fs::metadata(&fs_path) {
                Ok(metadata) => self.track(path.clone(), FileState::for_metadata(&metadata)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => self.untrack(path),
                Err(err) => {
                    return Err(RepoError::SnapshotFailed {
                        path: path.to_string(),
                        source: err.into(),
                    });
                }
            }
        }
        Ok(())
    }
}
