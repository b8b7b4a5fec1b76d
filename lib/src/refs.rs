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

//! Named references: bookmarks and tags.
//!
//! Bookmarks are mutable per-name pointers, either local or qualified by a
//! remote (`remote/name`). Tags are immutable: create and delete only.

use std::collections::BTreeMap;

use globset::GlobBuilder;
use serde::Deserialize;
use serde::Serialize;

use crate::backend::ChangeId;
use crate::error::RepoError;
use crate::error::RepoResult;

pub const BOOKMARKS_FORMAT_VERSION: u32 = 1;

/// Checks a bookmark or tag name against the ref-name rules: non-empty, no
/// whitespace or any of `* ~ ^ : ? [ ] \`, no `..` or `//`, must not start
/// or end with `.`, must not end with `.lock`.
pub fn is_valid_ref_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || "*~^:?[]\\".contains(c))
        && !name.contains("..")
        && !name.contains("//")
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.ends_with(".lock")
}

fn validate_bookmark_name(name: &str) -> RepoResult<()> {
    if is_valid_ref_name(name) {
        Ok(())
    } else {
        Err(RepoError::InvalidBookmarkName {
            name: name.to_string(),
        })
    }
}

fn validate_tag_name(name: &str) -> RepoResult<()> {
    if is_valid_ref_name(name) {
        Ok(())
    } else {
        Err(RepoError::InvalidTagName {
            name: name.to_string(),
        })
    }
}

fn glob_matcher(pattern: &str) -> RepoResult<globset::GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map_err(|err| RepoError::InvalidArgument {
            message: format!("Invalid pattern {pattern:?}: {err}"),
        })?;
    Ok(glob.compile_matcher())
}

/// A bookmark as returned by `list()`: remote entries come qualified as
/// `remote/name`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BookmarkEntry {
    pub name: String,
    pub target: ChangeId,
    pub remote: Option<String>,
}

/// On-disk form of the bookmark store.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarksRecord {
    pub version: u32,
    pub local: BTreeMap<String, ChangeId>,
    pub remote: BTreeMap<String, BTreeMap<String, ChangeId>>,
    #[serde(default)]
    pub tracked: BTreeMap<String, bool>,
}

#[derive(Clone, Debug, Default)]
pub struct BookmarkStore {
    local: BTreeMap<String, ChangeId>,
    remote: BTreeMap<String, BTreeMap<String, ChangeId>>,
    tracked: BTreeMap<String, bool>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: BookmarksRecord) -> Self {
        Self {
            local: record.local,
            remote: record.remote,
            tracked: record.tracked,
        }
    }

    pub fn to_record(&self) -> BookmarksRecord {
        BookmarksRecord {
            version: BOOKMARKS_FORMAT_VERSION,
            local: self.local.clone(),
            remote: self.remote.clone(),
            tracked: self.tracked.clone(),
        }
    }

    /// Creates a new local bookmark. Fails if the name is taken.
    pub fn set(&mut self, name: &str, target: ChangeId) -> RepoResult<()> {
        validate_bookmark_name(name)?;
        if self.local.contains_key(name) {
            return Err(RepoError::BookmarkExists {
                name: name.to_string(),
            });
        }
        self.local.insert(name.to_string(), target);
        Ok(())
    }

    /// Moves an existing local bookmark. Fails if the name does not exist.
    pub fn move_to(&mut self, name: &str, target: ChangeId) -> RepoResult<()> {
        let slot = self
            .local
            .get_mut(name)
            .ok_or_else(|| RepoError::BookmarkNotFound {
                name: name.to_string(),
            })?;
        *slot = target;
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> RepoResult<()> {
        self.local
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RepoError::BookmarkNotFound {
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&ChangeId> {
        self.local.get(name)
    }

    pub fn local_bookmarks(&self) -> &BTreeMap<String, ChangeId> {
        &self.local
    }

    pub fn remote_bookmarks(&self) -> &BTreeMap<String, BTreeMap<String, ChangeId>> {
        &self.remote
    }

    /// Records a remote bookmark observed by fetch. Remote names are not
    /// user input, but the bookmark's own name still has to be valid.
    pub fn set_remote(&mut self, remote: &str, name: &str, target: ChangeId) -> RepoResult<()> {
        validate_bookmark_name(name)?;
        self.remote
            .entry(remote.to_string())
            .or_default()
            .insert(name.to_string(), target);
        Ok(())
    }

    pub fn get_remote(&self, remote: &str, name: &str) -> Option<&ChangeId> {
        self.remote.get(remote)?.get(name)
    }

    /// Replaces all local and remote entries. Used by undo to restore a
    /// recorded view.
    pub fn restore(
        &mut self,
        local: BTreeMap<String, ChangeId>,
        remote: BTreeMap<String, BTreeMap<String, ChangeId>>,
    ) {
        self.local = local;
        self.remote = remote;
    }

    /// Flat listing: local entries first, then remote entries qualified as
    /// `remote/name`.
    pub fn list(&self) -> Vec<BookmarkEntry> {
        let local = self.local.iter().map(|(name, target)| BookmarkEntry {
            name: name.clone(),
            target: target.clone(),
            remote: None,
        });
        let remote = self.remote.iter().flat_map(|(remote, bookmarks)| {
            bookmarks.iter().map(move |(name, target)| BookmarkEntry {
                name: format!("{remote}/{name}"),
                target: target.clone(),
                remote: Some(remote.clone()),
            })
        });
        local.chain(remote).collect()
    }

    /// Targets of local bookmarks whose name matches `pattern` (all local
    /// bookmarks if `None`).
    pub fn matching(&self, pattern: Option<&str>) -> RepoResult<Vec<(&str, &ChangeId)>> {
        let matcher = pattern.map(glob_matcher).transpose()?;
        Ok(self
            .local
            .iter()
            .filter(|(name, _)| {
                matcher
                    .as_ref()
                    .is_none_or(|matcher| matcher.is_match(name.as_str()))
            })
            .map(|(name, target)| (name.as_str(), target))
            .collect())
    }
}

/// On-disk form of the tag store: a plain name-to-change mapping.
pub type TagsRecord = BTreeMap<String, ChangeId>;

#[derive(Clone, Debug, Default)]
pub struct TagStore {
    tags: BTreeMap<String, ChangeId>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: TagsRecord) -> Self {
        Self { tags: record }
    }

    pub fn to_record(&self) -> TagsRecord {
        self.tags.clone()
    }

    /// Creates a tag. Tags are immutable: creating over an existing name
    /// fails, there is no move.
    pub fn create(&mut self, name: &str, target: ChangeId) -> RepoResult<()> {
        validate_tag_name(name)?;
        if self.tags.contains_key(name) {
            return Err(RepoError::TagExists {
                name: name.to_string(),
            });
        }
        self.tags.insert(name.to_string(), target);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> RepoResult<()> {
        self.tags
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RepoError::TagNotFound {
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&ChangeId> {
        self.tags.get(name)
    }

    /// Tags whose name matches `pattern` (all tags if `None`).
    pub fn list(&self, pattern: Option<&str>) -> RepoResult<Vec<(&str, &ChangeId)>> {
        let matcher = pattern.map(glob_matcher).transpose()?;
        Ok(self
            .tags
            .iter()
            .filter(|(name, _)| {
                matcher
                    .as_ref()
                    .is_none_or(|matcher| matcher.is_match(name.as_str()))
            })
            .map(|(name, target)| (name.as_str(), target))
            .collect())
    }
}
