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

//! The in-memory DAG of changes.
//!
//! Changes live in an arena addressed by a compact index; a `HashMap` keyed
//! by change id plus reverse maps for commit ids and children are rebuilt on
//! load and mutated in place by `add`/`update`. The whole graph persists as a
//! single record.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use indexmap::IndexSet;
use serde::Deserialize;
use serde::Serialize;

use crate::backend::Change;
use crate::backend::ChangeId;
use crate::backend::CommitId;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::object_id::HexPrefix;
use crate::object_id::ObjectId as _;
use crate::object_id::PrefixResolution;
use crate::object_id::resolve_prefix;

pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// On-disk form of the whole graph.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRecord {
    pub version: u32,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Default)]
pub struct ChangeGraph {
    arena: Vec<Change>,
    index_by_id: HashMap<ChangeId, usize>,
    children: HashMap<ChangeId, Vec<ChangeId>>,
    by_commit_id: HashMap<CommitId, ChangeId>,
    // Changes mutated since the last sync, in mutation order.
    dirty: IndexSet<ChangeId>,
}

impl ChangeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the graph and its indices from a persisted record.
    pub fn from_record(record: GraphRecord) -> Self {
        let mut graph = Self::new();
        for change in record.changes {
            let index = graph.arena.len();
            graph.index_by_id.insert(change.id.clone(), index);
            graph.index_change(&change);
            graph.arena.push(change);
        }
        graph
    }

    pub fn to_record(&self) -> GraphRecord {
        GraphRecord {
            version: GRAPH_FORMAT_VERSION,
            changes: self.arena.clone(),
        }
    }

    fn index_change(&mut self, change: &Change) {
        for parent in &change.parents {
            self.children
                .entry(parent.clone())
                .or_default()
                .push(change.id.clone());
        }
        if !change.commit_id.is_zero() {
            self.by_commit_id
                .insert(change.commit_id.clone(), change.id.clone());
        }
    }

    fn unindex_change(&mut self, change: &Change) {
        for parent in &change.parents {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.retain(|id| id != &change.id);
            }
        }
        self.by_commit_id.remove(&change.commit_id);
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.arena.iter()
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &ChangeId> {
        self.arena.iter().map(|change| &change.id)
    }

    /// Inserts a new change. The change id must be fresh and every parent
    /// must already be present.
    pub fn add(&mut self, change: Change) -> RepoResult<()> {
        if self.index_by_id.contains_key(&change.id) {
            return Err(RepoError::DuplicateChange {
                id: change.id.hex(),
            });
        }
        for parent in &change.parents {
            if !self.index_by_id.contains_key(parent) {
                return Err(RepoError::ChangeNotFound { id: parent.hex() });
            }
        }
        let index = self.arena.len();
        self.index_by_id.insert(change.id.clone(), index);
        self.index_change(&change);
        self.dirty.insert(change.id.clone());
        self.arena.push(change);
        Ok(())
    }

    /// Replaces an existing change record. The change id never changes; the
    /// affected index entries are rebuilt.
    pub fn update(&mut self, change: Change) -> RepoResult<()> {
        let &index = self
            .index_by_id
            .get(&change.id)
            .ok_or_else(|| RepoError::ChangeNotFound {
                id: change.id.hex(),
            })?;
        for parent in &change.parents {
            if !self.index_by_id.contains_key(parent) {
                return Err(RepoError::ChangeNotFound { id: parent.hex() });
            }
        }
        let old = self.arena[index].clone();
        self.unindex_change(&old);
        self.index_change(&change);
        self.dirty.insert(change.id.clone());
        self.arena[index] = change;
        Ok(())
    }

    /// Updates only the commit id of a change, without touching the dirty
    /// set. Used by the sync middleware to write back realized commit ids
    /// without re-triggering itself.
    pub fn set_commit_id(&mut self, id: &ChangeId, commit_id: CommitId) -> RepoResult<()> {
        let &index = self
            .index_by_id
            .get(id)
            .ok_or_else(|| RepoError::ChangeNotFound { id: id.hex() })?;
        let old_commit_id = self.arena[index].commit_id.clone();
        self.by_commit_id.remove(&old_commit_id);
        if !commit_id.is_zero() {
            self.by_commit_id.insert(commit_id.clone(), id.clone());
        }
        self.arena[index].commit_id = commit_id;
        Ok(())
    }

    pub fn get(&self, id: &ChangeId) -> Option<&Change> {
        self.index_by_id.get(id).map(|&index| &self.arena[index])
    }

    pub fn get_or_err(&self, id: &ChangeId) -> RepoResult<&Change> {
        self.get(id)
            .ok_or_else(|| RepoError::ChangeNotFound { id: id.hex() })
    }

    pub fn contains(&self, id: &ChangeId) -> bool {
        self.index_by_id.contains_key(id)
    }

    pub fn parents(&self, id: &ChangeId) -> RepoResult<&[ChangeId]> {
        Ok(&self.get_or_err(id)?.parents)
    }

    pub fn children(&self, id: &ChangeId) -> RepoResult<&[ChangeId]> {
        self.get_or_err(id)?;
        Ok(self
            .children
            .get(id)
            .map(|ids| ids.as_slice())
            .unwrap_or_default())
    }

    /// All changes reachable through parents, including `id` itself, in BFS
    /// order.
    pub fn ancestors(&self, id: &ChangeId) -> RepoResult<Vec<ChangeId>> {
        self.reachable(id, |graph, id| {
            graph.get(id).map(|change| change.parents.clone()).unwrap_or_default()
        })
    }

    /// All changes reachable through children, including `id` itself, in BFS
    /// order.
    pub fn descendants(&self, id: &ChangeId) -> RepoResult<Vec<ChangeId>> {
        self.reachable(id, |graph, id| {
            graph.children.get(id).cloned().unwrap_or_default()
        })
    }

    fn reachable(
        &self,
        id: &ChangeId,
        neighbors: impl Fn(&Self, &ChangeId) -> Vec<ChangeId>,
    ) -> RepoResult<Vec<ChangeId>> {
        self.get_or_err(id)?;
        let mut visited = HashSet::from([id.clone()]);
        let mut result = vec![id.clone()];
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for next in neighbors(self, &current) {
                if visited.insert(next.clone()) {
                    result.push(next.clone());
                    queue.push_back(next);
                }
            }
        }
        Ok(result)
    }

    pub fn find_by_commit_id(&self, commit_id: &CommitId) -> Option<&Change> {
        self.by_commit_id.get(commit_id).and_then(|id| self.get(id))
    }

    /// Changes with no children.
    pub fn heads(&self) -> Vec<ChangeId> {
        self.arena
            .iter()
            .filter(|change| {
                self.children
                    .get(&change.id)
                    .is_none_or(|children| children.is_empty())
            })
            .map(|change| change.id.clone())
            .collect()
    }

    /// The oldest parentless change.
    pub fn root(&self) -> Option<&Change> {
        self.arena
            .iter()
            .filter(|change| change.parents.is_empty())
            .min_by_key(|change| change.timestamp)
    }

    /// Whether making `new_parent` a parent of `id` would create a cycle.
    /// True iff `new_parent` is `id` or one of its descendants.
    pub fn would_create_cycle(&self, id: &ChangeId, new_parent: &ChangeId) -> RepoResult<bool> {
        Ok(self.descendants(id)?.contains(new_parent))
    }

    /// Resolves a change-id hex prefix against the graph.
    pub fn resolve_change_prefix(&self, prefix: &HexPrefix) -> PrefixResolution<ChangeId> {
        resolve_prefix(prefix, self.all_ids().cloned())
    }

    /// Drains the set of changes mutated since the last call, in mutation
    /// order.
    pub fn take_dirty(&mut self) -> Vec<ChangeId> {
        self.dirty.drain(..).collect()
    }

    /// Topological order over the given set: parents before children. Ties
    /// are broken by change-id lexicographic order for determinism.
    pub fn topological(&self, ids: &[ChangeId]) -> Vec<ChangeId> {
        let set: HashSet<_> = ids.iter().cloned().collect();
        let mut in_degree: HashMap<ChangeId, usize> = ids
            .iter()
            .map(|id| {
                let degree = self
                    .get(id)
                    .map(|change| {
                        change
                            .parents
                            .iter()
                            .filter(|parent| set.contains(*parent))
                            .count()
                    })
                    .unwrap_or(0);
                (id.clone(), degree)
            })
            .collect();
        let mut ready: BinaryHeap<Reverse<ChangeId>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(id, _)| Reverse(id.clone()))
            .collect();
        let mut result = vec![];
        while let Some(Reverse(id)) = ready.pop() {
            result.push(id.clone());
            for child in self.children.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(child.clone()));
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::backend::Signature;
    use crate::backend::TreeId;

    fn new_change(id: &'static str, parents: &[&Change]) -> Change {
        let signature = Signature {
            name: "Someone".to_string(),
            email: "someone@example.com".to_string(),
            timestamp: DateTime::UNIX_EPOCH,
        };
        Change {
            id: ChangeId::from_hex(id),
            commit_id: CommitId::zero(),
            parents: parents.iter().map(|parent| parent.id.clone()).collect(),
            tree: TreeId::empty(),
            author: signature.clone(),
            committer: signature,
            description: String::new(),
            timestamp: DateTime::UNIX_EPOCH,
            file_snapshot: None,
            abandoned: false,
        }
    }

    #[test]
    fn test_add_duplicate() {
        let mut graph = ChangeGraph::new();
        let root = new_change("00", &[]);
        graph.add(root.clone()).unwrap();
        assert_eq!(
            graph.add(root).unwrap_err().kind(),
            crate::error::ErrorKind::DuplicateChange
        );
    }

    #[test]
    fn test_add_dangling_parent() {
        let mut graph = ChangeGraph::new();
        let root = new_change("00", &[]);
        let child = new_change("01", &[&root]);
        assert_eq!(
            graph.add(child).unwrap_err().kind(),
            crate::error::ErrorKind::ChangeNotFound
        );
    }

    #[test]
    fn test_record_roundtrip_rebuilds_indices() {
        let mut graph = ChangeGraph::new();
        let root = new_change("00", &[]);
        let mut child = new_change("01", &[&root]);
        child.commit_id = CommitId::from_hex("aa");
        graph.add(root.clone()).unwrap();
        graph.add(child.clone()).unwrap();

        let reloaded = ChangeGraph::from_record(graph.to_record());
        assert_eq!(reloaded.children(&root.id).unwrap(), &[child.id.clone()]);
        assert_eq!(
            reloaded.find_by_commit_id(&child.commit_id).unwrap().id,
            child.id
        );
    }

    #[test]
    fn test_cycle_guard() {
        let mut graph = ChangeGraph::new();
        let a = new_change("0a", &[]);
        let b = new_change("0b", &[&a]);
        let c = new_change("0c", &[&b]);
        graph.add(a.clone()).unwrap();
        graph.add(b.clone()).unwrap();
        graph.add(c.clone()).unwrap();

        assert!(graph.would_create_cycle(&a.id, &c.id).unwrap());
        assert!(graph.would_create_cycle(&a.id, &a.id).unwrap());
        assert!(!graph.would_create_cycle(&c.id, &a.id).unwrap());
    }
}
