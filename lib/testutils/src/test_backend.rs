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

//! A deterministic in-memory commit backend for tests.

use std::cell::RefCell;
use std::collections::BTreeMap;

use blake2::Blake2b;
use blake2::Digest as _;
use digest::consts::U20;
use strata_lib::backend::BackendCommit;
use strata_lib::backend::BackendError;
use strata_lib::backend::BackendRef;
use strata_lib::backend::BackendResult;
use strata_lib::backend::CloneOptions;
use strata_lib::backend::CommitBackend;
use strata_lib::backend::CommitId;
use strata_lib::backend::FetchOptions;
use strata_lib::backend::PushOptions;
use strata_lib::object_id::ObjectId as _;

type Blake2b160 = Blake2b<U20>;

/// Synthesizes SHA-1-shaped commit ids by hashing the commit fields, records
/// every created commit, and serves a configurable ref table.
///
/// A repeated identical input gets a fresh id (the field set excludes the
/// tree, so two snapshots of different trees can otherwise hash alike); the
/// ids are still deterministic for a given call sequence.
#[derive(Debug, Default)]
pub struct TestCommitBackend {
    commits: RefCell<Vec<(CommitId, BackendCommit)>>,
    refs: RefCell<BTreeMap<String, CommitId>>,
    staged: RefCell<usize>,
    seen: RefCell<BTreeMap<Vec<u8>, u64>>,
}

impl TestCommitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.borrow().len()
    }

    pub fn commits(&self) -> Vec<(CommitId, BackendCommit)> {
        self.commits.borrow().clone()
    }

    pub fn stage_count(&self) -> usize {
        *self.staged.borrow()
    }

    pub fn set_ref(&self, name: impl Into<String>, oid: CommitId) {
        self.refs.borrow_mut().insert(name.into(), oid);
    }
}

impl CommitBackend for TestCommitBackend {
    fn name(&self) -> &str {
        "test"
    }

    fn init(&self, _default_branch: &str) -> BackendResult<()> {
        Ok(())
    }

    fn stage_all(&self) -> BackendResult<()> {
        *self.staged.borrow_mut() += 1;
        Ok(())
    }

    fn create_commit(&self, commit: &BackendCommit) -> BackendResult<CommitId> {
        let mut input = vec![];
        input.extend_from_slice(commit.message.as_bytes());
        input.push(0);
        for signature in [&commit.author, &commit.committer] {
            input.extend_from_slice(signature.name.as_bytes());
            input.push(0);
            input.extend_from_slice(signature.email.as_bytes());
            input.push(0);
            input.extend_from_slice(&signature.timestamp.timestamp_millis().to_le_bytes());
        }
        for parent in &commit.parents {
            input.extend_from_slice(parent.as_bytes());
        }
        let occurrence = {
            let mut seen = self.seen.borrow_mut();
            let count = seen.entry(input.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let mut hasher = Blake2b160::new();
        hasher.update(&input);
        hasher.update(occurrence.to_le_bytes());
        let id = CommitId::new(hasher.finalize().to_vec());
        self.commits.borrow_mut().push((id.clone(), commit.clone()));
        Ok(id)
    }

    fn list_refs(&self, prefix: &str) -> BackendResult<Vec<BackendRef>> {
        Ok(self
            .refs
            .borrow()
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, oid)| BackendRef {
                name: name.clone(),
                oid: oid.clone(),
            })
            .collect())
    }

    fn update_ref(&self, name: &str, oid: &CommitId) -> BackendResult<()> {
        self.refs.borrow_mut().insert(name.to_string(), oid.clone());
        Ok(())
    }

    fn fetch(&self, _options: &FetchOptions) -> BackendResult<()> {
        Ok(())
    }

    fn push(&self, _options: &PushOptions) -> BackendResult<()> {
        Ok(())
    }

    fn clone_repo(&self, _options: &CloneOptions) -> BackendResult<()> {
        Err(BackendError::Unsupported(
            "the test backend cannot clone".to_string(),
        ))
    }
}
