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

//! Repo-relative file paths.
//!
//! A [`RepoPathBuf`] is always relative to the workspace root, uses `/` as
//! the separator on every platform, and never contains `.` or `..`
//! components. All path-keyed maps in the engine (file snapshots, working-copy
//! state, conflicts) use this type.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as _;

use crate::error::RepoError;
use crate::error::RepoResult;

/// Owned repository path.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RepoPathBuf(String);

impl RepoPathBuf {
    /// Creates a `RepoPathBuf` from a slash-separated internal string.
    ///
    /// Fails with `InvalidPath` if the path is empty, absolute, or contains
    /// `.`/`..` components or empty components.
    pub fn from_internal_string(value: impl Into<String>) -> RepoResult<Self> {
        let value = value.into();
        let invalid = |reason| RepoError::InvalidPath {
            path: value.clone(),
            reason,
        };
        if value.is_empty() {
            return Err(invalid("path is empty"));
        }
        if value.starts_with('/') || value.contains(':') || value.contains('\\') {
            return Err(invalid("path must be relative and slash-separated"));
        }
        for component in value.split('/') {
            match component {
                "" => return Err(invalid("path contains an empty component")),
                "." | ".." => return Err(invalid("path contains a traversal component")),
                _ => {}
            }
        }
        Ok(Self(value))
    }

    /// Converts a filesystem path relative to `base` into a `RepoPathBuf`.
    pub fn from_relative_path(path: &Path) -> RepoResult<Self> {
        let mut components = vec![];
        for component in path.components() {
            match component {
                std::path::Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| RepoError::InvalidPath {
                        path: path.display().to_string(),
                        reason: "path is not valid UTF-8",
                    })?;
                    components.push(name);
                }
                _ => {
                    return Err(RepoError::InvalidPath {
                        path: path.display().to_string(),
                        reason: "path must be relative and slash-separated",
                    });
                }
            }
        }
        Self::from_internal_string(components.join("/"))
    }

    /// The internal slash-separated representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path components, in order.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// The final component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap()
    }

    /// The extension of the final component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty()).then_some(ext)
    }

    /// The parent path, or `None` for a top-level file.
    pub fn parent(&self) -> Option<RepoPathBuf> {
        let (parent, _) = self.0.rsplit_once('/')?;
        Some(Self(parent.to_string()))
    }

    /// Resolves this path against a workspace root.
    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        let mut result = base.to_path_buf();
        result.extend(self.components());
        result
    }
}

impl fmt::Debug for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_tuple("RepoPathBuf").field(&self.0).finish()
    }
}

impl fmt::Display for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.pad(&self.0)
    }
}

impl AsRef<str> for RepoPathBuf {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for RepoPathBuf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RepoPathBuf {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_internal_string(value).map_err(D::Error::custom)
    }
}
