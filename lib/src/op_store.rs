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

//! The append-only operation log.
//!
//! Every mutation of the repository is recorded as an [`Operation`] carrying
//! a [`View`] snapshot of the resulting state plus the pre-operation
//! filesystem snapshot used by undo. Operations are stored one JSON record
//! per line; ids are content hashes, so the id of each operation pins its
//! whole ancestry.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest as _;
use sha2::Sha256;

use crate::backend::ChangeId;
use crate::backend::FileMap;
use crate::backend::serde_file_map;
use crate::conflicts::ConflictsRecord;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::object_id::HexPrefix;
use crate::object_id::ObjectId as _;
use crate::object_id::PrefixResolution;
use crate::object_id::id_type;
use crate::object_id::resolve_prefix;

id_type!(
    /// Content-hash identifier of an operation (SHA-256, 64 hex chars).
    pub OperationId
);

/// Who performed an operation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OperationUser {
    pub name: String,
    pub email: String,
    pub hostname: String,
}

/// The observable repository state at the conclusion of an operation.
///
/// `file_snapshot` captures the filesystem contents *before* the operation
/// ran; this is what undo restores. `conflicts_snapshot` likewise captures
/// the pre-operation conflict store.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub local_bookmarks: BTreeMap<String, ChangeId>,
    pub remote_bookmarks: BTreeMap<String, BTreeMap<String, ChangeId>>,
    pub head_ids: Vec<ChangeId>,
    pub wc_change_id: ChangeId,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_file_map::opt"
    )]
    pub file_snapshot: Option<FileMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts_snapshot: Option<ConflictsRecord>,
}

/// A recorded operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub timestamp: DateTime<Utc>,
    pub user: OperationUser,
    pub description: String,
    pub parents: Vec<OperationId>,
    pub view: View,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// An operation that has not been assigned an id yet.
#[derive(Clone, Debug)]
pub struct NewOperation {
    pub timestamp: DateTime<Utc>,
    pub user: OperationUser,
    pub description: String,
    pub parents: Vec<OperationId>,
    pub view: View,
    pub metadata: Option<BTreeMap<String, String>>,
}

// The hashed form fixes the field order; map contents are BTreeMaps, so the
// canonical JSON of a given operation is deterministic.
#[derive(Serialize)]
struct HashedOperation<'a> {
    timestamp: &'a DateTime<Utc>,
    user: &'a OperationUser,
    description: &'a str,
    parents: &'a [OperationId],
    view: &'a View,
}

fn hash_operation(operation: &NewOperation) -> OperationId {
    let hashed = HashedOperation {
        timestamp: &operation.timestamp,
        user: &operation.user,
        description: &operation.description,
        parents: &operation.parents,
        view: &operation.view,
    };
    let canonical = serde_json::to_vec(&hashed).expect("operation serializes to JSON");
    let digest = Sha256::digest(&canonical);
    OperationId::new(digest.to_vec())
}

/// The in-memory operation log. The head operation is the tail of the
/// sequence.
#[derive(Clone, Debug, Default)]
pub struct OpLog {
    operations: Vec<Operation>,
    index: HashMap<OperationId, usize>,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the log from the persisted JSONL lines.
    pub fn from_lines(lines: &[String], path: &Path) -> RepoResult<Self> {
        let mut log = Self::new();
        for line in lines {
            let operation: Operation =
                serde_json::from_str(line).map_err(|err| RepoError::StorageCorrupt {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })?;
            log.index
                .insert(operation.id.clone(), log.operations.len());
            log.operations.push(operation);
        }
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn head(&self) -> Option<&Operation> {
        self.operations.last()
    }

    pub fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.index.get(id).map(|&index| &self.operations[index])
    }

    /// Appends a new operation. The parents default to the current head; the
    /// id is the content hash over all other fields.
    pub fn record(&mut self, mut new_operation: NewOperation) -> &Operation {
        if let Some(head) = self.head() {
            new_operation.parents = vec![head.id.clone()];
        }
        let id = hash_operation(&new_operation);
        let operation = Operation {
            id: id.clone(),
            timestamp: new_operation.timestamp,
            user: new_operation.user,
            description: new_operation.description,
            parents: new_operation.parents,
            view: new_operation.view,
            metadata: new_operation.metadata,
        };
        tracing::debug!(id = %operation.id, description = %operation.description, "recorded operation");
        self.index.insert(id, self.operations.len());
        self.operations.push(operation);
        self.operations.last().unwrap()
    }

    /// The view undo would restore the working-copy pointer from: the view
    /// of the head's first parent, or of the single operation in a
    /// single-entry log. Falls back to the penultimate operation if the
    /// parent is missing.
    pub fn undo_view(&self) -> RepoResult<&View> {
        match self.operations.as_slice() {
            [] => Err(RepoError::NothingToUndo),
            [only] => Ok(&only.view),
            [.., penultimate, head] => {
                let parent = head.parents.first().and_then(|id| self.get(id));
                Ok(&parent.unwrap_or(penultimate).view)
            }
        }
    }

    /// The recorded view of a past operation (time travel).
    pub fn snapshot_at(&self, id: &OperationId) -> RepoResult<&View> {
        self.get(id)
            .map(|operation| &operation.view)
            .ok_or_else(|| RepoError::OperationNotFound { id: id.hex() })
    }

    /// Removes an operation and relinks its direct children to its parents.
    /// Forbidden when it is the only operation.
    pub fn abandon(&mut self, id: &OperationId) -> RepoResult<()> {
        let &index = self
            .index
            .get(id)
            .ok_or_else(|| RepoError::OperationNotFound { id: id.hex() })?;
        if self.operations.len() == 1 {
            return Err(RepoError::CannotAbandon {
                id: id.hex(),
                reason: "it is the only operation".to_string(),
            });
        }
        let removed = self.operations.remove(index);
        for operation in &mut self.operations {
            if operation.parents.contains(id) {
                operation.parents = operation
                    .parents
                    .iter()
                    .flat_map(|parent| {
                        if parent == id {
                            removed.parents.clone()
                        } else {
                            vec![parent.clone()]
                        }
                    })
                    .collect();
            }
        }
        self.index = self
            .operations
            .iter()
            .enumerate()
            .map(|(index, operation)| (operation.id.clone(), index))
            .collect();
        Ok(())
    }

    /// Resolves a full operation id or an unambiguous hex prefix.
    pub fn resolve_prefix(&self, text: &str) -> RepoResult<OperationId> {
        let prefix = HexPrefix::try_from_hex(text).ok_or_else(|| RepoError::InvalidArgument {
            message: format!("Invalid operation id prefix {text:?}"),
        })?;
        match resolve_prefix(&prefix, self.operations.iter().map(|op| op.id.clone())) {
            PrefixResolution::SingleMatch(id) => Ok(id),
            PrefixResolution::NoMatch => Err(RepoError::OperationNotFound {
                id: text.to_string(),
            }),
            PrefixResolution::AmbiguousMatch => Err(RepoError::AmbiguousOperation {
                prefix: text.to_string(),
            }),
        }
    }

    /// Serializes the whole log back to JSONL. Used after `abandon`, which
    /// is the one mutation that rewrites history instead of appending.
    pub fn to_lines(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|operation| serde_json::to_string(operation).expect("operation serializes"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn new_view(wc: &'static str) -> View {
        View {
            local_bookmarks: BTreeMap::new(),
            remote_bookmarks: BTreeMap::new(),
            head_ids: vec![],
            wc_change_id: ChangeId::from_hex(wc),
            file_snapshot: None,
            conflicts_snapshot: None,
        }
    }

    fn new_operation(description: &str, wc: &'static str) -> NewOperation {
        NewOperation {
            timestamp: DateTime::UNIX_EPOCH,
            user: OperationUser {
                name: "Test User".to_string(),
                email: "test.user@example.com".to_string(),
                hostname: "host.example.com".to_string(),
            },
            description: description.to_string(),
            parents: vec![],
            view: new_view(wc),
            metadata: None,
        }
    }

    #[test]
    fn test_record_links_to_head() {
        let mut log = OpLog::new();
        let first = log.record(new_operation("init", "01")).id.clone();
        assert_eq!(first.hex().len(), 64);
        let second = log.record(new_operation("describe", "01")).id.clone();
        assert_eq!(log.head().unwrap().id, second);
        assert_eq!(log.get(&second).unwrap().parents, [first]);
    }

    #[test]
    fn test_id_is_content_hash() {
        let mut log1 = OpLog::new();
        let mut log2 = OpLog::new();
        let id1 = log1.record(new_operation("init", "01")).id.clone();
        let id2 = log2.record(new_operation("init", "01")).id.clone();
        assert_eq!(id1, id2);
        let id3 = log2.record(new_operation("init", "01")).id.clone();
        // Same fields, different parent: different id.
        assert_ne!(id2, id3);
    }

    #[test]
    fn test_undo_view() {
        let mut log = OpLog::new();
        assert_matches!(log.undo_view(), Err(RepoError::NothingToUndo));

        log.record(new_operation("init", "01"));
        assert_eq!(log.undo_view().unwrap().wc_change_id, ChangeId::from_hex("01"));

        log.record(new_operation("describe", "02"));
        assert_eq!(log.undo_view().unwrap().wc_change_id, ChangeId::from_hex("01"));
    }

    #[test]
    fn test_abandon_relinks_children() {
        let mut log = OpLog::new();
        let first = log.record(new_operation("init", "01")).id.clone();
        let second = log.record(new_operation("describe", "02")).id.clone();
        let third = log.record(new_operation("new", "03")).id.clone();

        log.abandon(&second).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(&third).unwrap().parents, [first.clone()]);

        // The only remaining pair cannot be reduced to nothing.
        log.abandon(&third).unwrap();
        assert_matches!(log.abandon(&first), Err(RepoError::CannotAbandon { .. }));
        assert_matches!(
            log.abandon(&second),
            Err(RepoError::OperationNotFound { .. })
        );
    }

    #[test]
    fn test_lines_roundtrip() {
        let mut log = OpLog::new();
        log.record(new_operation("init", "01"));
        log.record(new_operation("describe", "02"));

        let lines = log.to_lines();
        let reloaded = OpLog::from_lines(&lines, Path::new("oplog.jsonl")).unwrap();
        assert_eq!(reloaded.operations(), log.operations());

        let corrupt = vec!["not json".to_string()];
        assert_matches!(
            OpLog::from_lines(&corrupt, Path::new("oplog.jsonl")),
            Err(RepoError::StorageCorrupt { .. })
        );
    }

    #[test]
    fn test_resolve_prefix() {
        let mut log = OpLog::new();
        let id = log.record(new_operation("init", "01")).id.clone();
        assert_eq!(log.resolve_prefix(&id.hex()).unwrap(), id);
        assert_eq!(log.resolve_prefix(&id.hex()[..8]).unwrap(), id);
        assert_matches!(
            log.resolve_prefix("ffff"),
            Err(RepoError::OperationNotFound { .. })
        );
        assert_matches!(
            log.resolve_prefix("zz"),
            Err(RepoError::InvalidArgument { .. })
        );
    }
}
