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

//! The repository facade.
//!
//! Owns every store and drives the fixed operation pipeline: load,
//! pre-snapshot, preventable pre-event, mutation, backend sync, operation
//! record, informational post-event. A repository instance is owned by a
//! single caller; multi-process safety comes from atomic record replacement
//! in the object store.

use std::collections::BTreeMap;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::backend::Change;
use crate::backend::ChangeId;
use crate::backend::CommitBackend;
use crate::backend::FetchOptions;
use crate::backend::FileMap;
use crate::backend::PushOptions;
use crate::backend::Signature;
use crate::backend::make_root_change;
use crate::conflicts::Conflict;
use crate::conflicts::ConflictId;
use crate::conflicts::ConflictsRecord;
use crate::conflicts::ConflictStore;
use crate::conflicts::Resolution;
use crate::conflicts::ResolutionStrategy;
use crate::conflicts::resolution_content;
use crate::conflicts::strategy_resolution;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::event::Event;
use crate::event::EventDispatcher;
use crate::fsmonitor::SnapshotQueue;
use crate::graph::ChangeGraph;
use crate::graph::GRAPH_FORMAT_VERSION;
use crate::graph::GraphRecord;
use crate::merge_driver::DriverContext;
use crate::merge_driver::MergeDriver;
use crate::merge_driver::MergeDriverRegistry;
use crate::object_id::ObjectId as _;
use crate::op_store::NewOperation;
use crate::op_store::OpLog;
use crate::op_store::OperationId;
use crate::op_store::OperationUser;
use crate::op_store::View;
use crate::refs::BOOKMARKS_FORMAT_VERSION;
use crate::refs::BookmarkEntry;
use crate::refs::BookmarkStore;
use crate::refs::BookmarksRecord;
use crate::refs::TagStore;
use crate::refs::TagsRecord;
use crate::repo_path::RepoPathBuf;
use crate::revset;
use crate::revset::RevsetContext;
use crate::settings::SettingsRecord;
use crate::settings::UserSettings;
use crate::store::ObjectStore;
use crate::sync::BackendSyncMiddleware;
use crate::sync::synthesize_tree_id;
use crate::working_copy::CONTROL_DIR;
use crate::working_copy::STATE_FORMAT_VERSION;
use crate::working_copy::WorkingCopy;
use crate::working_copy::WorkingCopyRecord;

pub const DEFAULT_WORKSPACE: &str = "default";

const GRAPH_PATH: &str = "repo/store/graph.json";
const BOOKMARKS_PATH: &str = "repo/store/bookmarks.json";
const TAGS_PATH: &str = "repo/store/tags.json";
const WORKSPACES_PATH: &str = "repo/store/workspaces.json";
const CONFIG_PATH: &str = "repo/store/config.json";
const OPLOG_PATH: &str = "repo/op_log/oplog.jsonl";
const CONFLICTS_PATH: &str = "repo/conflicts/conflicts.json";

fn wc_state_path(workspace_id: &str) -> String {
    format!("working_copy/{workspace_id}/state.json")
}

/// One registered workspace.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRecord {
    pub name: String,
    pub path: String,
    pub change_id: ChangeId,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct WorkspacesRecord {
    workspaces: BTreeMap<String, WorkspaceRecord>,
}

/// Return value of [`Repository::split`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SplitPart {
    pub id: ChangeId,
    pub description: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SplitResult {
    pub original: SplitPart,
    pub new: SplitPart,
}

/// Return value of [`Repository::merge`].
#[derive(Clone, Debug)]
pub struct MergeResult {
    pub change_id: ChangeId,
    pub conflicts: Vec<ConflictId>,
}

pub struct Repository {
    workspace_root: PathBuf,
    store: ObjectStore,
    settings: UserSettings,
    graph: ChangeGraph,
    op_log: OpLog,
    bookmarks: BookmarkStore,
    tags: TagStore,
    conflicts: ConflictStore,
    working_copy: WorkingCopy,
    workspaces: BTreeMap<String, WorkspaceRecord>,
    drivers: MergeDriverRegistry,
    events: EventDispatcher,
    middleware: BackendSyncMiddleware,
    backend: Option<Box<dyn CommitBackend>>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("workspace_root", &self.workspace_root)
            .field("changes", &self.graph.len())
            .field("operations", &self.op_log.len())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Initializes a new repository under `workspace_root/.jj` with a root
    /// change and an empty working-copy change on top of it.
    pub fn init(
        workspace_root: impl Into<PathBuf>,
        settings: UserSettings,
    ) -> RepoResult<Self> {
        let workspace_root = workspace_root.into();
        let store = ObjectStore::new(workspace_root.join(CONTROL_DIR));
        store.mkdir_p("repo/store")?;
        store.mkdir_p("repo/op_log")?;
        store.mkdir_p("repo/conflicts")?;
        store.mkdir_p(&format!("working_copy/{DEFAULT_WORKSPACE}"))?;

        let now = Utc::now();
        let user = Signature {
            name: settings.user_name().to_string(),
            email: settings.user_email().to_string(),
            timestamp: now,
        };
        let root = make_root_change(now);
        let root_id = root.id.clone();
        let wc_change = Change {
            id: ChangeId::generate(),
            commit_id: crate::backend::CommitId::zero(),
            parents: vec![root_id.clone()],
            tree: synthesize_tree_id(&FileMap::new()),
            author: user.clone(),
            committer: user,
            description: String::new(),
            timestamp: now,
            file_snapshot: None,
            abandoned: false,
        };
        let wc_change_id = wc_change.id.clone();

        let mut graph = ChangeGraph::new();
        graph.add(root)?;
        graph.add(wc_change)?;
        let middleware = BackendSyncMiddleware::new();
        let dirty = graph.take_dirty();
        middleware.sync(&mut graph, None, &dirty)?;

        let working_copy =
            WorkingCopy::new(&workspace_root, DEFAULT_WORKSPACE, wc_change_id.clone());
        let workspaces = BTreeMap::from([(
            DEFAULT_WORKSPACE.to_string(),
            WorkspaceRecord {
                name: DEFAULT_WORKSPACE.to_string(),
                path: ".".to_string(),
                change_id: wc_change_id,
                created: now,
            },
        )]);

        let mut repo = Self {
            workspace_root,
            store,
            settings,
            graph,
            op_log: OpLog::new(),
            bookmarks: BookmarkStore::new(),
            tags: TagStore::new(),
            conflicts: ConflictStore::new(),
            working_copy,
            workspaces,
            drivers: MergeDriverRegistry::new(),
            events: EventDispatcher::new(),
            middleware,
            backend: None,
        };
        repo.store
            .write_json(CONFIG_PATH, &repo.settings.to_record())?;
        let op_id = repo.record_operation(
            "initialize repository".to_string(),
            FileMap::new(),
            ConflictsRecord::default(),
        )?;
        repo.working_copy.set_operation(op_id);
        repo.persist()?;
        Ok(repo)
    }

    /// Loads an existing repository in its default workspace.
    pub fn load(workspace_root: impl Into<PathBuf>) -> RepoResult<Self> {
        Self::load_workspace(workspace_root, DEFAULT_WORKSPACE)
    }

    /// Loads an existing repository bound to the given workspace.
    pub fn load_workspace(
        workspace_root: impl Into<PathBuf>,
        workspace_id: &str,
    ) -> RepoResult<Self> {
        let workspace_root = workspace_root.into();
        let store = ObjectStore::new(workspace_root.join(CONTROL_DIR));

        let graph_record: GraphRecord =
            store
                .read_json(GRAPH_PATH)?
                .ok_or_else(|| RepoError::StorageReadFailed {
                    path: store.root().join(GRAPH_PATH),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "repository is not initialized",
                    )
                    .into(),
                })?;
        if graph_record.version != GRAPH_FORMAT_VERSION {
            return Err(RepoError::StorageVersionMismatch {
                path: store.root().join(GRAPH_PATH),
                found: graph_record.version,
                expected: GRAPH_FORMAT_VERSION,
            });
        }
        let graph = ChangeGraph::from_record(graph_record);

        let bookmarks = match store.read_json::<BookmarksRecord>(BOOKMARKS_PATH)? {
            Some(record) if record.version != BOOKMARKS_FORMAT_VERSION => {
                return Err(RepoError::StorageVersionMismatch {
                    path: store.root().join(BOOKMARKS_PATH),
                    found: record.version,
                    expected: BOOKMARKS_FORMAT_VERSION,
                });
            }
            Some(record) => BookmarkStore::from_record(record),
            None => BookmarkStore::new(),
        };
        let tags = store
            .read_json::<TagsRecord>(TAGS_PATH)?
            .map(TagStore::from_record)
            .unwrap_or_default();
        let conflicts = store
            .read_json::<ConflictsRecord>(CONFLICTS_PATH)?
            .map(ConflictStore::from_record)
            .unwrap_or_default();
        let workspaces = store
            .read_json::<WorkspacesRecord>(WORKSPACES_PATH)?
            .unwrap_or_default()
            .workspaces;
        let settings = store
            .read_json::<SettingsRecord>(CONFIG_PATH)?
            .map(UserSettings::from_record)
            .unwrap_or_default();

        let lines = store.read_lines(OPLOG_PATH)?;
        let op_log = OpLog::from_lines(&lines, &store.root().join(OPLOG_PATH))?;

        let wc_record: WorkingCopyRecord = store
            .read_json(&wc_state_path(workspace_id))?
            .ok_or_else(|| RepoError::WorkspaceNotFound {
                name: workspace_id.to_string(),
            })?;
        if wc_record.version != STATE_FORMAT_VERSION {
            return Err(RepoError::StorageVersionMismatch {
                path: store.root().join(wc_state_path(workspace_id)),
                found: wc_record.version,
                expected: STATE_FORMAT_VERSION,
            });
        }
        let working_copy = WorkingCopy::from_record(&workspace_root, wc_record);

        Ok(Self {
            workspace_root,
            store,
            settings,
            graph,
            op_log,
            bookmarks,
            tags,
            conflicts,
            working_copy,
            workspaces,
            drivers: MergeDriverRegistry::new(),
            events: EventDispatcher::new(),
            middleware: BackendSyncMiddleware::new(),
            backend: None,
        })
    }

    // ---- accessors ------------------------------------------------------

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn graph(&self) -> &ChangeGraph {
        &self.graph
    }

    pub fn op_log(&self) -> &OpLog {
        &self.op_log
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn working_copy(&self) -> &WorkingCopy {
        &self.working_copy
    }

    /// The working-copy change id (`@`).
    pub fn wc_change_id(&self) -> &ChangeId {
        self.working_copy.change_id()
    }

    pub fn get_change(&self, id: &ChangeId) -> RepoResult<&Change> {
        self.graph.get_or_err(id)
    }

    pub fn bookmark_list(&self) -> Vec<BookmarkEntry> {
        self.bookmarks.list()
    }

    pub fn bookmark_get(&self, name: &str) -> RepoResult<&ChangeId> {
        self.bookmarks
            .get(name)
            .ok_or_else(|| RepoError::BookmarkNotFound {
                name: name.to_string(),
            })
    }

    pub fn tag_get(&self, name: &str) -> RepoResult<&ChangeId> {
        self.tags.get(name).ok_or_else(|| RepoError::TagNotFound {
            name: name.to_string(),
        })
    }

    pub fn tag_list(&self, pattern: Option<&str>) -> RepoResult<Vec<(String, ChangeId)>> {
        Ok(self
            .tags
            .list(pattern)?
            .into_iter()
            .map(|(name, target)| (name.to_string(), target.clone()))
            .collect())
    }

    pub fn conflict_list(&self) -> Vec<&Conflict> {
        self.conflicts.list().collect()
    }

    pub fn unresolved_conflicts(&self) -> Vec<&Conflict> {
        self.conflicts.unresolved().collect()
    }

    pub fn workspace_list(&self) -> Vec<&WorkspaceRecord> {
        self.workspaces.values().collect()
    }

    pub fn config_get(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    /// Registers an event listener; see [`EventDispatcher::on`].
    pub fn on(&mut self, event: impl Into<String>, listener: impl FnMut(&mut Event) + 'static) {
        self.events.on(event, listener);
    }

    pub fn register_merge_driver(&mut self, driver: MergeDriver) {
        self.drivers.register(driver);
    }

    /// In strict mode merge-driver failures surface instead of falling back
    /// to the default driver.
    pub fn set_strict_drivers(&mut self, strict: bool) {
        self.drivers.set_strict(strict);
    }

    /// Attaches a commit backend and realizes commits for the whole graph.
    pub fn attach_backend(&mut self, backend: Box<dyn CommitBackend>) -> RepoResult<()> {
        backend
            .init("main")
            .map_err(|err| RepoError::BackendSyncFailed { source: err.into() })?;
        self.backend = Some(backend);
        let all: Vec<ChangeId> = self.graph.all_ids().cloned().collect();
        self.middleware
            .sync(&mut self.graph, self.backend.as_deref(), &all)?;
        self.store.write_json(GRAPH_PATH, &self.graph.to_record())?;
        Ok(())
    }

    pub fn backend(&self) -> Option<&dyn CommitBackend> {
        self.backend.as_deref()
    }

    // ---- revsets --------------------------------------------------------

    /// Evaluates a revset expression to a set of change ids.
    pub fn evaluate_revset(&self, text: &str) -> RepoResult<HashSet<ChangeId>> {
        let context = RevsetContext {
            graph: &self.graph,
            bookmarks: &self.bookmarks,
            tags: &self.tags,
            wc_change_id: self.working_copy.change_id(),
            user_email: self.settings.user_email(),
            backend: self.backend.as_deref(),
            now: Utc::now(),
        };
        revset::evaluate(text, &context)
    }

    /// Changes matching `revset` (default `all()`), children before parents.
    /// Ties break by committer timestamp descending, then change id.
    pub fn log(&self, revset: Option<&str>) -> RepoResult<Vec<Change>> {
        let ids = self.evaluate_revset(revset.unwrap_or("all()"))?;
        Ok(self.log_order(&ids))
    }

    fn log_order(&self, ids: &HashSet<ChangeId>) -> Vec<Change> {
        // Kahn's algorithm over the child edges restricted to `ids`: a change
        // is ready once every child inside the set has been emitted.
        let mut blockers: HashMap<ChangeId, usize> = ids
            .iter()
            .map(|id| {
                let count = self
                    .graph
                    .children(id)
                    .map(|children| children.iter().filter(|child| ids.contains(*child)).count())
                    .unwrap_or(0);
                (id.clone(), count)
            })
            .collect();
        let key = |id: &ChangeId| {
            let change = self.graph.get(id).expect("log ids come from the graph");
            (change.committer.timestamp, std::cmp::Reverse(id.clone()))
        };
        let mut ready: BinaryHeap<_> = blockers
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(id, _)| (key(id), id.clone()))
            .collect();
        let mut result: Vec<Change> = vec![];
        while let Some((_, id)) = ready.pop() {
            let change = self.graph.get(&id).unwrap().clone();
            for parent in &change.parents {
                if let Some(count) = blockers.get_mut(parent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push((key(parent), parent.clone()));
                    }
                }
            }
            result.push(change);
        }
        result
    }

    /// Resolves a full change id or an unambiguous hex prefix. Non-hex text
    /// or an ambiguous prefix reports `InvalidChangeId`.
    pub fn resolve_change_id(&self, text: &str) -> RepoResult<ChangeId> {
        let prefix = crate::object_id::HexPrefix::try_from_hex(text).ok_or_else(|| {
            RepoError::InvalidChangeId {
                text: text.to_string(),
            }
        })?;
        match self.graph.resolve_change_prefix(&prefix) {
            crate::object_id::PrefixResolution::SingleMatch(id) => Ok(id),
            crate::object_id::PrefixResolution::NoMatch => Err(RepoError::ChangeNotFound {
                id: text.to_string(),
            }),
            crate::object_id::PrefixResolution::AmbiguousMatch => {
                Err(RepoError::InvalidChangeId {
                    text: text.to_string(),
                })
            }
        }
    }

    /// First common ancestor of `a` and `b`, or `NoCommonAncestor`.
    pub fn common_ancestor(&self, a: &ChangeId, b: &ChangeId) -> RepoResult<ChangeId> {
        let ancestors_of_a: HashSet<ChangeId> = self.graph.ancestors(a)?.into_iter().collect();
        self.graph
            .ancestors(b)?
            .into_iter()
            .find(|id| ancestors_of_a.contains(id))
            .ok_or_else(|| RepoError::NoCommonAncestor {
                a: a.hex(),
                b: b.hex(),
            })
    }

    // ---- the operation pipeline -----------------------------------------

    fn operation_user(&self) -> OperationUser {
        OperationUser {
            name: self.settings.user_name().to_string(),
            email: self.settings.user_email().to_string(),
            hostname: whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string()),
        }
    }

    fn signature(&self, timestamp: DateTime<Utc>) -> Signature {
        Signature {
            name: self.settings.user_name().to_string(),
            email: self.settings.user_email().to_string(),
            timestamp,
        }
    }

    /// Runs one public mutation through the fixed pipeline.
    fn run_operation<T>(
        &mut self,
        name: &str,
        description: String,
        mutate: impl FnOnce(&mut Self) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let pre_snapshot = self.working_copy.pre_snapshot()?;
        let pre_conflicts = self.conflicts.to_record();
        self.events
            .dispatch_pre(name, json!({ "description": &description }))?;

        let result = mutate(self)?;

        let dirty = self.graph.take_dirty();
        self.middleware
            .sync(&mut self.graph, self.backend.as_deref(), &dirty)?;

        let op_id = self.record_operation(description.clone(), pre_snapshot, pre_conflicts)?;
        self.working_copy.set_operation(op_id.clone());
        self.persist()?;

        self.events
            .dispatch_post(name, json!({ "description": &description, "operation": op_id.hex() }));
        Ok(result)
    }

    fn record_operation(
        &mut self,
        description: String,
        pre_snapshot: FileMap,
        pre_conflicts: ConflictsRecord,
    ) -> RepoResult<OperationId> {
        let mut head_ids = self.graph.heads();
        head_ids.sort();
        let view = View {
            local_bookmarks: self.bookmarks.local_bookmarks().clone(),
            remote_bookmarks: self.bookmarks.remote_bookmarks().clone(),
            head_ids,
            wc_change_id: self.working_copy.change_id().clone(),
            file_snapshot: Some(pre_snapshot),
            conflicts_snapshot: Some(pre_conflicts),
        };
        let operation = self.op_log.record(NewOperation {
            timestamp: Utc::now(),
            user: self.operation_user(),
            description,
            parents: vec![],
            view,
            metadata: None,
        });
        let line = serde_json::to_string(operation).expect("operation serializes");
        let id = operation.id.clone();
        self.store.append_line(OPLOG_PATH, &line)?;
        Ok(id)
    }

    fn persist(&self) -> RepoResult<()> {
        self.store.write_json(GRAPH_PATH, &self.graph.to_record())?;
        self.store
            .write_json(BOOKMARKS_PATH, &self.bookmarks.to_record())?;
        self.store.write_json(TAGS_PATH, &self.tags.to_record())?;
        self.store
            .write_json(CONFLICTS_PATH, &self.conflicts.to_record())?;
        self.store.write_json(
            WORKSPACES_PATH,
            &WorkspacesRecord {
                workspaces: self.workspaces.clone(),
            },
        )?;
        self.store.write_json(
            &wc_state_path(self.working_copy.workspace_id()),
            &self.working_copy.to_record(),
        )?;
        Ok(())
    }

    // ---- change mutations -----------------------------------------------

    /// Creates a new empty change on top of `parents` (default: the working
    /// copy) and makes it the working-copy change.
    pub fn new_change(
        &mut self,
        parents: Option<Vec<ChangeId>>,
        description: Option<&str>,
    ) -> RepoResult<ChangeId> {
        let description = description.unwrap_or_default().to_string();
        let op_description = "new empty change".to_string();
        self.run_operation("new", op_description, move |repo| {
            let parents = match parents {
                Some(parents) if !parents.is_empty() => parents,
                _ => vec![repo.working_copy.change_id().clone()],
            };
            for parent in &parents {
                repo.graph.get_or_err(parent)?;
            }
            let now = Utc::now();
            // The new change starts out with its first parent's tree.
            let files = repo
                .graph
                .get_or_err(&parents[0])?
                .materialized_files();
            let signature = repo.signature(now);
            let change = Change {
                id: ChangeId::generate(),
                commit_id: crate::backend::CommitId::zero(),
                parents,
                tree: synthesize_tree_id(&files),
                author: signature.clone(),
                committer: signature,
                description,
                timestamp: now,
                file_snapshot: Some(files),
                abandoned: false,
            };
            let id = change.id.clone();
            repo.graph.add(change)?;
            repo.working_copy.set_change_id(id.clone());
            Ok(id)
        })
    }

    /// Captures the working tree into the working-copy change and sets its
    /// description.
    pub fn describe(&mut self, message: &str) -> RepoResult<()> {
        let message = message.to_string();
        self.run_operation("describe", format!("describe change: {message}"), |repo| {
            repo.snapshot_wc_change(Some(&message))?;
            // Committing the change forward retires resolved conflicts.
            repo.conflicts.sweep_resolved();
            Ok(())
        })
    }

    /// Captures the working tree into the working-copy change, optionally
    /// replacing its description.
    pub fn amend(&mut self, message: Option<&str>) -> RepoResult<()> {
        let message = message.map(str::to_string);
        self.run_operation("amend", "amend change".to_string(), |repo| {
            repo.snapshot_wc_change(message.as_deref())?;
            repo.conflicts.sweep_resolved();
            Ok(())
        })
    }

    fn snapshot_wc_change(&mut self, message: Option<&str>) -> RepoResult<()> {
        let files = self.working_copy.scan()?;
        let mut change = self.graph.get_or_err(self.working_copy.change_id())?.clone();
        let now = Utc::now();
        if let Some(message) = message {
            change.description = message.to_string();
        }
        change.tree = synthesize_tree_id(&files);
        change.committer = self.signature(now);
        change.timestamp = now;
        change.file_snapshot = Some(files.clone());
        self.graph.update(change)?;
        self.working_copy.retrack(&files)?;
        Ok(())
    }

    /// Points the working copy at an existing change and materializes its
    /// tree.
    pub fn edit(&mut self, id: &ChangeId) -> RepoResult<()> {
        let id = id.clone();
        self.run_operation("edit", format!("edit change {}", short(&id)), move |repo| {
            let change = repo.graph.get_or_err(&id)?;
            if change.is_root() {
                return Err(RepoError::InvalidArgument {
                    message: "cannot edit the root change".to_string(),
                });
            }
            if change.abandoned {
                return Err(RepoError::InvalidArgument {
                    message: format!("change {} is abandoned", short(&id)),
                });
            }
            let files = change
                .file_snapshot
                .clone()
                .ok_or_else(|| RepoError::TreeReadFailed {
                    id: id.hex(),
                    message: "change has no file snapshot to materialize".to_string(),
                })?;
            repo.working_copy.restore_files(&files)?;
            repo.working_copy.set_change_id(id.clone());
            Ok(())
        })
    }

    /// Splits a change in two: the original keeps `paths1` (and gets
    /// `description1`), a new child carries the remainder.
    pub fn split(
        &mut self,
        id: &ChangeId,
        description1: &str,
        description2: &str,
        paths1: &[RepoPathBuf],
    ) -> RepoResult<SplitResult> {
        let id = id.clone();
        let description1 = description1.to_string();
        let description2 = description2.to_string();
        let paths1 = paths1.to_vec();
        self.run_operation("split", format!("split change {}", short(&id)), move |repo| {
            let change = repo.graph.get_or_err(&id)?.clone();
            let files = change.materialized_files();
            for path in &paths1 {
                if !files.contains_key(path) {
                    return Err(RepoError::FileNotFound {
                        path: path.to_string(),
                    });
                }
            }
            let part1: FileMap = files
                .iter()
                .filter(|(path, _)| paths1.contains(path))
                .map(|(path, content)| (path.clone(), content.clone()))
                .collect();
            if part1.is_empty() || part1.len() == files.len() {
                return Err(RepoError::InvalidArgument {
                    message: "split requires both parts to be non-empty".to_string(),
                });
            }

            let now = Utc::now();
            let mut original = change.clone();
            original.description = description1.clone();
            original.tree = synthesize_tree_id(&part1);
            original.file_snapshot = Some(part1);
            original.committer = repo.signature(now);
            repo.graph.update(original)?;

            // The new change stacks on the original, so its tree is the full
            // original file set.
            let signature = repo.signature(now);
            let new_change = Change {
                id: ChangeId::generate(),
                commit_id: crate::backend::CommitId::zero(),
                parents: vec![id.clone()],
                tree: synthesize_tree_id(&files),
                author: signature.clone(),
                committer: signature,
                description: description2.clone(),
                timestamp: now,
                file_snapshot: Some(files),
                abandoned: false,
            };
            let new_id = new_change.id.clone();
            repo.graph.add(new_change)?;

            if repo.working_copy.change_id() == &id {
                repo.working_copy.set_change_id(new_id.clone());
            }
            Ok(SplitResult {
                original: SplitPart {
                    id: id.clone(),
                    description: description1.clone(),
                },
                new: SplitPart {
                    id: new_id,
                    description: description2.clone(),
                },
            })
        })
    }

    /// Squashes `source` (default: the working-copy change) into its first
    /// parent and abandons it.
    pub fn squash(&mut self, source: Option<&ChangeId>) -> RepoResult<()> {
        let source = source
            .unwrap_or(self.working_copy.change_id())
            .clone();
        self.run_operation("squash", format!("squash change {}", short(&source)), move |repo| {
            let change = repo.graph.get_or_err(&source)?.clone();
            let parent_id = change
                .parents
                .first()
                .cloned()
                .ok_or_else(|| RepoError::NoParents { id: source.hex() })?;
            let parent = repo.graph.get_or_err(&parent_id)?.clone();
            if parent.is_root() {
                return Err(RepoError::InvalidArgument {
                    message: "cannot squash into the root change".to_string(),
                });
            }

            let now = Utc::now();
            let mut parent = parent;
            let files = change.materialized_files();
            parent.tree = synthesize_tree_id(&files);
            parent.file_snapshot = Some(files);
            if parent.description.is_empty() {
                parent.description = change.description.clone();
            }
            parent.committer = repo.signature(now);
            repo.graph.update(parent)?;

            let mut abandoned = change;
            abandoned.abandoned = true;
            repo.graph.update(abandoned)?;
            repo.reparent_children(&source, std::slice::from_ref(&parent_id))?;

            if repo.working_copy.change_id() == &source {
                repo.working_copy.set_change_id(parent_id);
            }
            Ok(())
        })
    }

    /// Marks a change abandoned and splices its children onto its parents.
    pub fn abandon(&mut self, id: &ChangeId) -> RepoResult<()> {
        let id = id.clone();
        self.run_operation("abandon", format!("abandon change {}", short(&id)), move |repo| {
            let change = repo.graph.get_or_err(&id)?.clone();
            if change.is_root() {
                return Err(RepoError::CannotAbandon {
                    id: id.hex(),
                    reason: "it is the root change".to_string(),
                });
            }
            let mut abandoned = change.clone();
            abandoned.abandoned = true;
            repo.graph.update(abandoned)?;
            repo.reparent_children(&id, &change.parents)?;

            if repo.working_copy.change_id() == &id {
                let parent_id = change.parents[0].clone();
                let files = repo.graph.get_or_err(&parent_id)?.materialized_files();
                repo.working_copy.restore_files(&files)?;
                repo.working_copy.set_change_id(parent_id);
            }
            Ok(())
        })
    }

    fn reparent_children(&mut self, from: &ChangeId, to: &[ChangeId]) -> RepoResult<()> {
        for child_id in self.graph.children(from)?.to_vec() {
            let mut child = self.graph.get_or_err(&child_id)?.clone();
            child.parents = child
                .parents
                .iter()
                .flat_map(|parent| {
                    if parent == from {
                        to.to_vec()
                    } else {
                        vec![parent.clone()]
                    }
                })
                .collect();
            let mut seen = HashSet::new();
            child.parents.retain(|parent| seen.insert(parent.clone()));
            self.graph.update(child)?;
        }
        Ok(())
    }

    /// Restores files from `from` (default: the working-copy change's first
    /// parent) into the working copy, then recaptures the working-copy
    /// change.
    pub fn restore(
        &mut self,
        from: Option<&ChangeId>,
        paths: Option<&[RepoPathBuf]>,
    ) -> RepoResult<()> {
        let wc_id = self.working_copy.change_id().clone();
        let from = match from {
            Some(from) => from.clone(),
            None => self
                .graph
                .get_or_err(&wc_id)?
                .parents
                .first()
                .cloned()
                .ok_or_else(|| RepoError::NoParents { id: wc_id.hex() })?,
        };
        let paths = paths.map(<[RepoPathBuf]>::to_vec);
        self.run_operation("restore", format!("restore from {}", short(&from)), move |repo| {
            if from == *repo.working_copy.change_id() {
                return Err(RepoError::CannotRevert {
                    id: from.hex(),
                    reason: "cannot restore the working copy from itself".to_string(),
                });
            }
            let source = repo.graph.get_or_err(&from)?;
            let files = match &source.file_snapshot {
                Some(files) => files.clone(),
                None if source.is_root() => FileMap::new(),
                None => {
                    return Err(RepoError::CannotRevert {
                        id: from.hex(),
                        reason: "change has no file snapshot".to_string(),
                    });
                }
            };
            match &paths {
                None => repo.working_copy.restore_files(&files)?,
                Some(paths) => {
                    for path in paths {
                        let content =
                            files.get(path).ok_or_else(|| RepoError::FileNotFound {
                                path: path.to_string(),
                            })?;
                        repo.working_copy.write_file(path, content)?;
                    }
                }
            }
            repo.snapshot_wc_change(None)
        })
    }

    /// Moves a change onto new parents. Refuses to create a cycle.
    pub fn rebase(&mut self, id: &ChangeId, new_parents: &[ChangeId]) -> RepoResult<()> {
        let id = id.clone();
        let new_parents = new_parents.to_vec();
        self.run_operation("rebase", format!("rebase change {}", short(&id)), move |repo| {
            let change = repo.graph.get_or_err(&id)?.clone();
            if change.is_root() {
                return Err(RepoError::InvalidArgument {
                    message: "cannot rebase the root change".to_string(),
                });
            }
            if new_parents.is_empty() {
                return Err(RepoError::InvalidArgument {
                    message: "rebase requires at least one destination".to_string(),
                });
            }
            for parent in &new_parents {
                repo.graph.get_or_err(parent)?;
                if repo.graph.would_create_cycle(&id, parent)? {
                    return Err(RepoError::InvalidArgument {
                        message: format!(
                            "cannot rebase {} onto its own descendant {}",
                            short(&id),
                            short(parent)
                        ),
                    });
                }
            }
            let mut rebased = change;
            rebased.parents = new_parents.clone();
            repo.graph.update(rebased)?;
            Ok(())
        })
    }

    /// Merges `source` into the working copy: creates a two-parent change,
    /// detects conflicts three-way against the common ancestor, persists
    /// them, and materializes the merged tree.
    pub fn merge(&mut self, source: &ChangeId) -> RepoResult<MergeResult> {
        self.merge_with_driver(source, None)
    }

    /// Like [`Self::merge`], with a per-merge driver that takes precedence
    /// over registered drivers.
    pub fn merge_with_driver(
        &mut self,
        source: &ChangeId,
        custom: Option<MergeDriver>,
    ) -> RepoResult<MergeResult> {
        let source = source.clone();
        self.run_operation("merge", format!("merge change {}", short(&source)), move |repo| {
            let left_id = repo.working_copy.change_id().clone();
            if source == left_id {
                return Err(RepoError::InvalidArgument {
                    message: "cannot merge the working copy with itself".to_string(),
                });
            }
            let right = repo.graph.get_or_err(&source)?.clone();
            if right.abandoned {
                return Err(RepoError::InvalidArgument {
                    message: format!("change {} is abandoned", short(&source)),
                });
            }

            // Capture any working-copy edits before merging.
            repo.snapshot_wc_change(None)?;
            let left_files = repo.graph.get_or_err(&left_id)?.materialized_files();
            let right_files = right.materialized_files();
            let ancestors_of_left: HashSet<ChangeId> =
                repo.graph.ancestors(&left_id)?.into_iter().collect();
            let base_files = repo
                .graph
                .ancestors(&source)?
                .into_iter()
                .find(|id| ancestors_of_left.contains(id))
                .map(|base| repo.graph.get_or_err(&base).map(|c| c.materialized_files()))
                .transpose()?
                .unwrap_or_default();

            let now = Utc::now();
            let merged = repo.drivers.merge_trees(
                &base_files,
                &left_files,
                &right_files,
                custom.as_ref(),
                &DriverContext::default(),
                now,
            )?;

            let signature = repo.signature(now);
            let merge_change = Change {
                id: ChangeId::generate(),
                commit_id: crate::backend::CommitId::zero(),
                parents: vec![left_id, source.clone()],
                tree: synthesize_tree_id(&merged.files),
                author: signature.clone(),
                committer: signature,
                description: String::new(),
                timestamp: now,
                file_snapshot: Some(merged.files.clone()),
                abandoned: false,
            };
            let merge_id = merge_change.id.clone();
            repo.graph.add(merge_change)?;
            repo.working_copy.restore_files(&merged.files)?;
            repo.working_copy.set_change_id(merge_id.clone());

            let conflict_ids: Vec<ConflictId> = merged
                .conflicts
                .iter()
                .map(|conflict| conflict.id.clone())
                .collect();
            for conflict in merged.conflicts {
                tracing::debug!(path = %conflict.path, kind = ?conflict.kind, "recorded conflict");
                repo.conflicts.insert(conflict);
            }
            Ok(MergeResult {
                change_id: merge_id,
                conflicts: conflict_ids,
            })
        })
    }

    // ---- conflict resolution --------------------------------------------

    /// Resolves one conflict, writing the resolved bytes to the working copy
    /// unless the resolution is manual.
    pub fn resolve_conflict(&mut self, id: &ConflictId, resolution: Resolution) -> RepoResult<()> {
        let id = id.clone();
        self.run_operation("resolve", format!("resolve conflict {}", short_hex(&id.hex())), move |repo| {
            repo.apply_resolution(&id, resolution.clone())
        })
    }

    /// Applies one strategy across every unresolved conflict.
    pub fn resolve_all(&mut self, strategy: ResolutionStrategy) -> RepoResult<usize> {
        self.run_operation("resolve", format!("resolve all conflicts ({strategy:?})"), move |repo| {
            let pending: Vec<ConflictId> = repo
                .conflicts
                .unresolved()
                .map(|conflict| conflict.id.clone())
                .collect();
            for id in &pending {
                let sides = repo.conflicts.get_or_err(id)?.sides.clone();
                let resolution = strategy_resolution(strategy, &sides)?;
                repo.apply_resolution(id, resolution)?;
            }
            Ok(pending.len())
        })
    }

    fn apply_resolution(&mut self, id: &ConflictId, resolution: Resolution) -> RepoResult<()> {
        let conflict = self.conflicts.get_or_err(id)?;
        let path = conflict.path.clone();
        let content = resolution_content(&conflict.sides, &resolution)?;
        if let Some(content) = content {
            self.working_copy.write_file(&path, &content)?;
        }
        self.conflicts.mark_resolved(id, resolution, Utc::now())?;
        // The resolved content belongs to the working-copy change.
        self.snapshot_wc_change(None)
    }

    // ---- bookmarks & tags -----------------------------------------------

    pub fn bookmark_set(&mut self, name: &str, target: Option<&ChangeId>) -> RepoResult<()> {
        let name = name.to_string();
        let target = target.unwrap_or(self.working_copy.change_id()).clone();
        self.run_operation("bookmark-set", format!("create bookmark {name}"), move |repo| {
            repo.graph.get_or_err(&target)?;
            repo.bookmarks.set(&name, target.clone())
        })
    }

    pub fn bookmark_move(&mut self, name: &str, target: Option<&ChangeId>) -> RepoResult<()> {
        let name = name.to_string();
        let target = target.unwrap_or(self.working_copy.change_id()).clone();
        self.run_operation("bookmark-move", format!("move bookmark {name}"), move |repo| {
            repo.graph.get_or_err(&target)?;
            repo.bookmarks.move_to(&name, target.clone())
        })
    }

    pub fn bookmark_delete(&mut self, name: &str) -> RepoResult<()> {
        let name = name.to_string();
        self.run_operation("bookmark-delete", format!("delete bookmark {name}"), move |repo| {
            repo.bookmarks.delete(&name)
        })
    }

    pub fn tag_create(&mut self, name: &str, target: Option<&ChangeId>) -> RepoResult<()> {
        let name = name.to_string();
        let target = target.unwrap_or(self.working_copy.change_id()).clone();
        self.run_operation("tag-create", format!("create tag {name}"), move |repo| {
            repo.graph.get_or_err(&target)?;
            repo.tags.create(&name, target.clone())
        })
    }

    pub fn tag_delete(&mut self, name: &str) -> RepoResult<()> {
        let name = name.to_string();
        self.run_operation("tag-delete", format!("delete tag {name}"), move |repo| {
            repo.tags.delete(&name)
        })
    }

    // ---- navigation ------------------------------------------------------

    /// Moves the working copy to its single child, `count` times.
    pub fn next(&mut self, count: usize) -> RepoResult<ChangeId> {
        let start = self.working_copy.change_id().clone();
        let mut current = start.clone();
        let mut walked = 0;
        for _ in 0..count.max(1) {
            let children: Vec<ChangeId> = self
                .graph
                .children(&current)?
                .iter()
                .filter(|child| {
                    self.graph
                        .get(child)
                        .is_some_and(|change| !change.abandoned)
                })
                .cloned()
                .collect();
            match children.as_slice() {
                [] if walked == 0 => return Err(RepoError::NoChildren { id: current.hex() }),
                [] => {
                    return Err(RepoError::InsufficientChildren {
                        id: start.hex(),
                        wanted: count.max(1),
                        walked,
                    });
                }
                [only] => current = only.clone(),
                _ => {
                    return Err(RepoError::InvalidArgument {
                        message: format!("change {} has multiple children", short(&current)),
                    });
                }
            }
            walked += 1;
        }
        self.edit(&current)?;
        Ok(current)
    }

    /// Moves the working copy to its first parent, `count` times.
    pub fn prev(&mut self, count: usize) -> RepoResult<ChangeId> {
        let mut current = self.working_copy.change_id().clone();
        for _ in 0..count.max(1) {
            current = self
                .graph
                .parents(&current)?
                .first()
                .cloned()
                .ok_or_else(|| RepoError::NoParents { id: current.hex() })?;
        }
        self.edit(&current)?;
        Ok(current)
    }

    // ---- operation log ---------------------------------------------------

    /// Undoes the last operation: restores the working-copy pointer and
    /// bookmarks from the previous view, re-materializes the pre-operation
    /// file snapshot, restores conflict state, and appends an "undo"
    /// operation.
    pub fn undo(&mut self) -> RepoResult<OperationId> {
        let target_view = self.op_log.undo_view()?.clone();
        let head = self
            .op_log
            .head()
            .expect("undo_view succeeded, so the log is non-empty")
            .clone();
        self.run_operation("undo", format!("undo operation {}", short_hex(&head.id.hex())), move |repo| {
            repo.working_copy
                .set_change_id(target_view.wc_change_id.clone());
            repo.bookmarks.restore(
                target_view.local_bookmarks.clone(),
                target_view.remote_bookmarks.clone(),
            );
            if let Some(snapshot) = &head.view.file_snapshot {
                repo.working_copy.restore_files(snapshot)?;
            }
            if let Some(conflicts) = &head.view.conflicts_snapshot {
                repo.conflicts.restore(conflicts.clone());
            }
            Ok(())
        })?;
        Ok(self.op_log.head().unwrap().id.clone())
    }

    /// Restores the repository to the view recorded by a past operation
    /// (exact time travel). Accepts a full operation id or unambiguous
    /// prefix.
    pub fn undo_to(&mut self, operation: &str) -> RepoResult<OperationId> {
        let op_id = self.op_log.resolve_prefix(operation)?;
        let view = self.op_log.snapshot_at(&op_id)?.clone();
        self.run_operation("undo", format!("restore to operation {}", short_hex(&op_id.hex())), move |repo| {
            repo.working_copy.set_change_id(view.wc_change_id.clone());
            repo.bookmarks
                .restore(view.local_bookmarks.clone(), view.remote_bookmarks.clone());
            if let Some(snapshot) = &view.file_snapshot {
                repo.working_copy.restore_files(snapshot)?;
            }
            if let Some(conflicts) = &view.conflicts_snapshot {
                repo.conflicts.restore(conflicts.clone());
            }
            Ok(())
        })?;
        Ok(self.op_log.head().unwrap().id.clone())
    }

    /// The recorded view of a past operation, without changing any state.
    pub fn snapshot_at(&self, operation: &str) -> RepoResult<View> {
        let op_id = self.op_log.resolve_prefix(operation)?;
        Ok(self.op_log.snapshot_at(&op_id)?.clone())
    }

    /// Removes an operation from the log, relinking its children to its
    /// parents. This is the one oplog mutation that rewrites instead of
    /// appending.
    pub fn abandon_operation(&mut self, operation: &str) -> RepoResult<()> {
        let op_id = self.op_log.resolve_prefix(operation)?;
        self.events
            .dispatch_pre("abandon-operation", json!({ "operation": op_id.hex() }))?;
        self.op_log.abandon(&op_id)?;
        let lines = self.op_log.to_lines().join("\n");
        self.store
            .write_atomic(OPLOG_PATH, format!("{lines}\n").as_bytes())?;
        self.events
            .dispatch_post("abandon-operation", json!({ "operation": op_id.hex() }));
        Ok(())
    }

    // ---- background snapshots -------------------------------------------

    /// Drains the auto-snapshot queue if its quiet period has elapsed and
    /// records a snapshot operation when the working tree actually changed.
    pub fn poll_auto_snapshot(
        &mut self,
        queue: &mut SnapshotQueue,
        now: Instant,
    ) -> RepoResult<Option<OperationId>> {
        if queue.poll(now).is_none() {
            return Ok(None);
        }
        let scanned = self.working_copy.scan()?;
        let current = self
            .graph
            .get_or_err(self.working_copy.change_id())?
            .materialized_files();
        if scanned == current {
            return Ok(None);
        }
        self.run_operation("snapshot", "snapshot working copy".to_string(), |repo| {
            repo.snapshot_wc_change(None)
        })?;
        Ok(Some(self.op_log.head().unwrap().id.clone()))
    }

    // ---- configuration ---------------------------------------------------

    /// Sets a configuration entry and persists the config record.
    pub fn config_set(&mut self, key: &str, value: serde_json::Value) -> RepoResult<()> {
        self.settings.set(key, value)?;
        self.store
            .write_json(CONFIG_PATH, &self.settings.to_record())
    }

    // ---- backend passthrough --------------------------------------------

    fn require_backend(&self, operation: &str) -> RepoResult<&dyn CommitBackend> {
        self.backend
            .as_deref()
            .ok_or_else(|| RepoError::UnsupportedOperation {
                operation: operation.to_string(),
                message: "no backend attached".to_string(),
            })
    }

    /// Fetches from the backend and imports `refs/remotes/<remote>/<name>`
    /// refs as remote bookmarks.
    pub fn fetch(&mut self, options: &FetchOptions) -> RepoResult<()> {
        let options = options.clone();
        self.run_operation("fetch", "fetch from remote".to_string(), move |repo| {
            let backend = repo.require_backend("fetch")?;
            backend
                .fetch(&options)
                .map_err(|err| backend_error("fetch", err))?;
            let refs = backend
                .list_refs("refs/remotes/")
                .map_err(|err| backend_error("fetch", err))?;
            let imported: Vec<(String, String, ChangeId)> = refs
                .iter()
                .filter_map(|r| {
                    let rest = r.name.strip_prefix("refs/remotes/")?;
                    let (remote, name) = rest.split_once('/')?;
                    let change = repo.graph.find_by_commit_id(&r.oid)?;
                    Some((remote.to_string(), name.to_string(), change.id.clone()))
                })
                .collect();
            for (remote, name, target) in imported {
                repo.bookmarks.set_remote(&remote, &name, target)?;
            }
            Ok(())
        })
    }

    /// Pushes through the backend. Mutates no engine state.
    pub fn push(&mut self, options: &PushOptions) -> RepoResult<()> {
        let backend = self.require_backend("push")?;
        backend
            .push(options)
            .map_err(|err| backend_error("push", err))
    }

    // ---- workspaces ------------------------------------------------------

    /// Registers a new workspace with its own working-copy change on top of
    /// the root.
    pub fn workspace_add(&mut self, name: &str, path: &str) -> RepoResult<ChangeId> {
        let name = name.to_string();
        let path = path.to_string();
        self.run_operation("workspace-add", format!("add workspace {name}"), move |repo| {
            if repo.workspaces.contains_key(&name) {
                return Err(RepoError::WorkspaceExists { name: name.clone() });
            }
            let target = repo.workspace_root.join(&path);
            if target.is_dir()
                && target
                    .read_dir()
                    .map_err(|err| RepoError::StorageReadFailed {
                        path: target.clone(),
                        source: err.into(),
                    })?
                    .next()
                    .is_some()
            {
                return Err(RepoError::WorkspaceNotEmpty { name: name.clone() });
            }

            let now = Utc::now();
            let root_id = repo
                .graph
                .root()
                .map(|change| change.id.clone())
                .expect("an initialized repository has a root change");
            let signature = repo.signature(now);
            let change = Change {
                id: ChangeId::generate(),
                commit_id: crate::backend::CommitId::zero(),
                parents: vec![root_id],
                tree: synthesize_tree_id(&FileMap::new()),
                author: signature.clone(),
                committer: signature,
                description: String::new(),
                timestamp: now,
                file_snapshot: Some(FileMap::new()),
                abandoned: false,
            };
            let change_id = change.id.clone();
            repo.graph.add(change)?;

            repo.store.mkdir_p(&format!("working_copy/{name}"))?;
            let record = WorkingCopyRecord {
                version: STATE_FORMAT_VERSION,
                workspace_id: name.clone(),
                change_id: change_id.clone(),
                operation: None,
                file_states: BTreeMap::new(),
                sparse_patterns: vec![],
            };
            repo.store.write_json(&wc_state_path(&name), &record)?;
            repo.workspaces.insert(
                name.clone(),
                WorkspaceRecord {
                    name: name.clone(),
                    path: path.clone(),
                    change_id: change_id.clone(),
                    created: now,
                },
            );
            Ok(change_id)
        })
    }

    /// Forgets a workspace. The default workspace cannot be forgotten.
    pub fn workspace_forget(&mut self, name: &str) -> RepoResult<()> {
        let name = name.to_string();
        self.run_operation("workspace-forget", format!("forget workspace {name}"), move |repo| {
            if name == DEFAULT_WORKSPACE {
                return Err(RepoError::InvalidArgument {
                    message: "the default workspace cannot be forgotten".to_string(),
                });
            }
            if repo.workspaces.remove(&name).is_none() {
                return Err(RepoError::WorkspaceNotFound { name: name.clone() });
            }
            repo.store.rm_rf(&format!("working_copy/{name}"))?;
            Ok(())
        })
    }
}

fn backend_error(operation: &str, err: crate::backend::BackendError) -> RepoError {
    match err {
        crate::backend::BackendError::Unsupported(message) => RepoError::UnsupportedOperation {
            operation: operation.to_string(),
            message,
        },
        err => RepoError::BackendSyncFailed { source: err.into() },
    }
}

fn short(id: &ChangeId) -> String {
    short_hex(&id.hex())
}

fn short_hex(hex: &str) -> String {
    hex[..hex.len().min(12)].to_string()
}
