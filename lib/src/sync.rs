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

//! Backend sync: realizing changes as commit objects.
//!
//! After a mutation, every touched change (and its descendants, whose parent
//! commit ids changed) gets a freshly realized commit id. With a backend
//! attached the id comes from `create_commit`; without one it is synthesized
//! locally as a deterministic content hash, which preserves the stable-id
//! property in a pure-local repository. Backend failures always surface;
//! the engine never silently skips a sync.

use blake2::Blake2b;
use blake2::Digest as _;
use digest::consts::U20;

use crate::backend::BackendCommit;
use crate::backend::Change;
use crate::backend::CommitBackend;
use crate::backend::CommitId;
use crate::backend::FileMap;
use crate::backend::TreeId;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::graph::ChangeGraph;
use crate::object_id::ObjectId as _;

type Blake2b160 = Blake2b<U20>;

/// Content address of a file map.
pub fn synthesize_tree_id(files: &FileMap) -> TreeId {
    let mut hasher = Blake2b160::new();
    for (path, content) in files {
        hasher.update(path.as_str().as_bytes());
        hasher.update([0]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(content);
    }
    TreeId::new(hasher.finalize().to_vec())
}

/// Deterministic commit id for a change's current content and parents, used
/// when no backend is attached.
pub fn synthesize_commit_id(change: &Change, parent_commit_ids: &[CommitId]) -> CommitId {
    let mut hasher = Blake2b160::new();
    hasher.update(change.tree.as_bytes());
    hasher.update([0]);
    hasher.update(change.description.as_bytes());
    hasher.update([0]);
    for signature in [&change.author, &change.committer] {
        hasher.update(signature.name.as_bytes());
        hasher.update([0]);
        hasher.update(signature.email.as_bytes());
        hasher.update([0]);
        hasher.update(signature.timestamp.timestamp_millis().to_le_bytes());
    }
    for parent in parent_commit_ids {
        hasher.update(parent.as_bytes());
    }
    CommitId::new(hasher.finalize().to_vec())
}

/// Intercepts change-graph mutations and mirrors them into the commit store.
#[derive(Debug, Default)]
pub struct BackendSyncMiddleware;

impl BackendSyncMiddleware {
    pub fn new() -> Self {
        Self
    }

    /// Realizes commit ids for `mutated` changes and every descendant, in
    /// topological order so each change sees its parents' new commit ids.
    /// Returns the ids of the changes whose commit id was rewritten.
    pub fn sync(
        &self,
        graph: &mut ChangeGraph,
        backend: Option<&dyn CommitBackend>,
        mutated: &[crate::backend::ChangeId],
    ) -> RepoResult<Vec<crate::backend::ChangeId>> {
        let mut affected = vec![];
        for id in mutated {
            for descendant in graph.descendants(id)? {
                if !affected.contains(&descendant) {
                    affected.push(descendant);
                }
            }
        }
        let ordered = graph.topological(&affected);

        if let Some(backend) = backend
            && !ordered.is_empty()
        {
            backend
                .stage_all()
                .map_err(|err| RepoError::BackendSyncFailed { source: err.into() })?;
        }

        let mut synced = vec![];
        for id in ordered {
            let change = graph.get_or_err(&id)?.clone();
            // The root change keeps its zero sentinel.
            if change.is_root() {
                continue;
            }
            let parent_commit_ids: Vec<CommitId> = change
                .parents
                .iter()
                .filter_map(|parent| graph.get(parent))
                .map(|parent| parent.commit_id.clone())
                .filter(|commit_id| !commit_id.is_zero())
                .collect();
            let commit_id = match backend {
                Some(backend) => backend
                    .create_commit(&BackendCommit {
                        message: change.description.clone(),
                        author: change.author.clone(),
                        committer: change.committer.clone(),
                        parents: parent_commit_ids,
                    })
                    .map_err(|err| RepoError::BackendSyncFailed { source: err.into() })?,
                None => synthesize_commit_id(&change, &parent_commit_ids),
            };
            if commit_id != change.commit_id {
                tracing::debug!(change = %change.id, %commit_id, "realized commit");
                graph.set_commit_id(&id, commit_id)?;
                synced.push(id);
            }
        }
        Ok(synced)
    }
}
