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

use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::DateTime;
use chrono::Utc;
use rand::RngCore as _;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::object_id::ObjectId;
use crate::object_id::id_type;
use crate::repo_path::RepoPathBuf;

pub const CHANGE_ID_LENGTH: usize = 16;
pub const COMMIT_ID_LENGTH: usize = 20;

id_type!(
    /// Stable identifier of a change. 128 random bits, never rewritten.
    pub ChangeId
);
id_type!(
    /// Identifier of the commit object realized from a change's current
    /// state. Regenerated whenever the change's content changes.
    pub CommitId
);
id_type!(
    /// Content address of a change's file tree.
    pub TreeId
);

impl ChangeId {
    /// Generates a fresh random change id.
    pub fn generate() -> Self {
        let mut bytes = vec![0; CHANGE_ID_LENGTH];
        rand::rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

impl CommitId {
    /// The sentinel id of a change that has never been realized as a commit.
    pub fn zero() -> Self {
        Self::new(vec![0; COMMIT_ID_LENGTH])
    }

    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }
}

impl TreeId {
    /// The content address of an empty file tree.
    pub fn empty() -> Self {
        Self::new(vec![0; COMMIT_ID_LENGTH])
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

/// Mapping from repo path to file contents, the materialized view of a
/// change's tree.
pub type FileMap = BTreeMap<RepoPathBuf, Vec<u8>>;

/// Serde adapter for `FileMap` values; contents are hex strings on disk.
pub mod serde_file_map {
    use std::collections::BTreeMap;

    use serde::Deserialize as _;
    use serde::Deserializer;
    use serde::Serialize as _;
    use serde::Serializer;
    use serde::de::Error as _;

    use super::FileMap;
    use crate::hex_util;
    use crate::repo_path::RepoPathBuf;

    pub fn serialize<S: Serializer>(map: &FileMap, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&RepoPathBuf, String> = map
            .iter()
            .map(|(path, content)| (path, hex_util::encode_hex(content)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FileMap, D::Error> {
        let encoded = BTreeMap::<RepoPathBuf, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(path, hex)| {
                let content = hex_util::decode_hex(&hex)
                    .ok_or_else(|| D::Error::custom(format!("invalid hex content for {path}")))?;
                Ok((path, content))
            })
            .collect()
    }

    /// `Option<FileMap>` flavor of the adapter.
    pub mod opt {
        use serde::Deserialize as _;
        use serde::Deserializer;
        use serde::Serialize as _;
        use serde::Serializer;

        use super::super::FileMap;

        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        struct Wrapper(#[serde(with = "super")] FileMap);

        pub fn serialize<S: Serializer>(
            map: &Option<FileMap>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            map.clone().map(Wrapper).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<FileMap>, D::Error> {
            Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(map)| map))
        }
    }
}

/// The central entity: a conceptual edit with a stable identity.
///
/// The `id` never changes after creation; `commit_id` is regenerated at sync
/// time whenever the content (tree, description, signatures, or parents)
/// changes. `file_snapshot`, when present, is the materialized view of the
/// change's tree at the moment it was described, and the sole source of truth
/// for reconstructing file contents in the absence of a backend.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: ChangeId,
    pub commit_id: CommitId,
    pub parents: Vec<ChangeId>,
    pub tree: TreeId,
    pub author: Signature,
    pub committer: Signature,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_file_map::opt"
    )]
    pub file_snapshot: Option<FileMap>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub abandoned: bool,
}

impl Change {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The file map this change materializes: its snapshot if it has one,
    /// otherwise empty.
    pub fn materialized_files(&self) -> FileMap {
        self.file_snapshot.clone().unwrap_or_default()
    }
}

/// Creates the root change of a new repository: no parents, zero commit id,
/// empty tree, anonymous signatures.
pub fn make_root_change(timestamp: DateTime<Utc>) -> Change {
    let anonymous = Signature {
        name: String::new(),
        email: String::new(),
        timestamp,
    };
    Change {
        id: ChangeId::generate(),
        commit_id: CommitId::zero(),
        parents: vec![],
        tree: TreeId::empty(),
        author: anonymous.clone(),
        committer: anonymous,
        description: String::new(),
        timestamp,
        file_snapshot: None,
        abandoned: false,
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Object {hash} of type {object_type} not found")]
    ObjectNotFound {
        object_type: String,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Could not write object of type {object_type}")]
    WriteObject {
        object_type: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Unsupported backend operation: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Commit data handed to the backend for realization.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackendCommit {
    pub message: String,
    pub author: Signature,
    pub committer: Signature,
    pub parents: Vec<CommitId>,
}

/// A ref in the underlying commit store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackendRef {
    pub name: String,
    pub oid: CommitId,
}

#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub remote: Option<String>,
    pub refs: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    pub remote: Option<String>,
    pub refs: Vec<String>,
    pub force: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CloneOptions {
    pub url: String,
    pub depth: Option<u32>,
}

/// The underlying commit-object store.
///
/// The engine never creates commit objects itself; the sync middleware calls
/// into this trait. Implementations live outside the engine (a test
/// implementation ships in `testutils`). All methods may suspend; per the
/// scheduling model this is the only boundary besides stores and merge
/// drivers where that happens.
pub trait CommitBackend: Debug {
    fn name(&self) -> &str;

    fn init(&self, default_branch: &str) -> BackendResult<()>;

    /// Makes the current working tree visible to the backend before commits
    /// are synthesized.
    fn stage_all(&self) -> BackendResult<()>;

    /// Synthesizes a commit object and returns its id.
    fn create_commit(&self, commit: &BackendCommit) -> BackendResult<CommitId>;

    fn list_refs(&self, prefix: &str) -> BackendResult<Vec<BackendRef>>;

    fn update_ref(&self, name: &str, oid: &CommitId) -> BackendResult<()>;

    fn fetch(&self, options: &FetchOptions) -> BackendResult<()>;

    fn push(&self, options: &PushOptions) -> BackendResult<()>;

    fn clone_repo(&self, options: &CloneOptions) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_id::ObjectId as _;

    fn signature() -> Signature {
        Signature {
            name: "Someone".to_string(),
            email: "someone@example.com".to_string(),
            timestamp: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_change_id_generate() {
        let a = ChangeId::generate();
        let b = ChangeId::generate();
        assert_eq!(a.as_bytes().len(), CHANGE_ID_LENGTH);
        assert_eq!(a.hex().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_commit_id() {
        assert!(CommitId::zero().is_zero());
        assert!(!CommitId::from_hex("01").is_zero());
        assert_eq!(CommitId::zero().hex().len(), 40);
    }

    #[test]
    fn test_root_change() {
        let root = make_root_change(DateTime::UNIX_EPOCH);
        assert!(root.is_root());
        assert!(root.commit_id.is_zero());
        assert!(root.author.email.is_empty());
        assert_eq!(root.materialized_files(), FileMap::new());
    }

    #[test]
    fn test_change_json_roundtrip() {
        let mut change = make_root_change(DateTime::UNIX_EPOCH);
        change.author = signature();
        change.description = "hello".to_string();
        change.file_snapshot = Some(FileMap::from([(
            crate::repo_path::RepoPathBuf::from_internal_string("a/b.txt").unwrap(),
            b"\x00\x01binary".to_vec(),
        )]));
        let json = serde_json::to_string(&change).unwrap();
        // Contents are stored as hex strings, ids as hex.
        assert!(json.contains(&change.id.hex()));
        assert!(json.contains("000162696e617279"));
        let parsed: Change = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, change);
    }

    #[test]
    fn test_abandoned_field_omitted_when_false() {
        let change = make_root_change(DateTime::UNIX_EPOCH);
        let json = serde_json::to_string(&change).unwrap();
        assert!(!json.contains("abandoned"));
    }
}
