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

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use strata_lib::backend::Change;
use strata_lib::backend::ChangeId;
use strata_lib::backend::CommitId;
use strata_lib::backend::FileMap;
use strata_lib::backend::Signature;
use strata_lib::repo::Repository;
use strata_lib::repo_path::RepoPathBuf;
use strata_lib::settings::UserSettings;
use strata_lib::sync::synthesize_tree_id;
use tempfile::TempDir;

pub mod test_backend;

pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("strata-test-")
        .tempdir()
        .unwrap()
}

/// Returns settings with the fake user configuration needed to run basic
/// operations.
pub fn user_settings() -> UserSettings {
    UserSettings::new("Test User", "test.user@example.com")
}

pub fn repo_path(value: &str) -> RepoPathBuf {
    RepoPathBuf::from_internal_string(value).unwrap()
}

/// A timestamp `seconds` past the epoch, for deterministic ordering.
pub fn timestamp_at(seconds: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::seconds(seconds)
}

pub fn signature(name: &str, email: &str, at: DateTime<Utc>) -> Signature {
    Signature {
        name: name.to_string(),
        email: email.to_string(),
        timestamp: at,
    }
}

/// A minimal change for graph-level tests. Callers adjust the public fields
/// as needed.
pub fn basic_change(id: &'static str, parents: &[ChangeId]) -> Change {
    let user = signature("Test User", "test.user@example.com", timestamp_at(0));
    Change {
        id: ChangeId::from_hex(id),
        commit_id: CommitId::zero(),
        parents: parents.to_vec(),
        tree: synthesize_tree_id(&FileMap::new()),
        author: user.clone(),
        committer: user,
        description: String::new(),
        timestamp: timestamp_at(0),
        file_snapshot: None,
        abandoned: false,
    }
}

/// A repository in a fresh temporary workspace.
#[derive(Debug)]
pub struct TestRepo {
    pub repo: Repository,
    temp_dir: TempDir,
}

impl TestRepo {
    pub fn init() -> Self {
        Self::init_with_settings(user_settings())
    }

    pub fn init_with_settings(settings: UserSettings) -> Self {
        let temp_dir = new_temp_dir();
        let repo = Repository::init(temp_dir.path(), settings).unwrap();
        Self { repo, temp_dir }
    }

    /// The workspace root (the directory containing `.jj`).
    pub fn workspace_root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The repository control directory.
    pub fn repo_path(&self) -> PathBuf {
        self.temp_dir.path().join(".jj")
    }

    /// Writes a file inside the workspace, creating parent directories.
    pub fn write_file(&self, path: &str, contents: impl AsRef<[u8]>) {
        let fs_path = repo_path(path).to_fs_path(self.workspace_root());
        if let Some(parent) = fs_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(fs_path, contents.as_ref()).unwrap();
    }

    /// Reads a workspace file as bytes.
    pub fn read_file(&self, path: &str) -> Vec<u8> {
        fs::read(repo_path(path).to_fs_path(self.workspace_root())).unwrap()
    }

    /// Deletes a workspace file.
    pub fn remove_file(&self, path: &str) {
        fs::remove_file(repo_path(path).to_fs_path(self.workspace_root())).unwrap();
    }
}
