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

use std::collections::HashSet;

use assert_matches::assert_matches;
use strata_lib::backend::ChangeId;
use strata_lib::error::ErrorKind;
use strata_lib::error::RepoError;
use strata_lib::object_id::ObjectId as _;
use testutils::TestRepo;
use testutils::repo_path;
use testutils::test_backend::TestCommitBackend;

#[test]
fn test_init_creates_root_and_working_copy() {
    let test_repo = TestRepo::init();
    let repo = &test_repo.repo;

    let wc = repo.wc_change_id();
    let wc_change = repo.get_change(wc).unwrap();
    assert_eq!(wc_change.parents.len(), 1);

    let root = repo.graph().root().unwrap();
    assert_eq!(wc_change.parents[0], root.id);
    assert!(root.commit_id.is_zero());
    assert!(!wc_change.commit_id.is_zero());
    assert_eq!(wc.hex().len(), 32);
    assert_eq!(wc_change.commit_id.hex().len(), 40);
}

#[test]
fn test_change_id_stable_under_amend() {
    // Scenario: describe, edit a file, amend. The change id never moves;
    // the commit id does.
    let mut test_repo = TestRepo::init();
    test_repo.repo.describe("A").unwrap();
    let w1 = test_repo.repo.wc_change_id().clone();
    let commit_before = test_repo.repo.get_change(&w1).unwrap().commit_id.clone();

    test_repo.write_file("a", "v1");
    test_repo.repo.amend(Some("A")).unwrap();

    assert_eq!(test_repo.repo.wc_change_id(), &w1);
    let commit_after = test_repo.repo.get_change(&w1).unwrap().commit_id.clone();
    assert_ne!(commit_before, commit_after);
}

#[test]
fn test_stacked_rebasing_regenerates_descendant_commits() {
    // Scenario: a chain a -> b -> c; amending a preserves every change id
    // and regenerates the commit ids of b and c.
    let mut test_repo = TestRepo::init();
    let a = test_repo.repo.wc_change_id().clone();
    test_repo.write_file("a.txt", "a");
    test_repo.repo.describe("A").unwrap();

    let b = test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("b.txt", "b");
    test_repo.repo.describe("B").unwrap();

    let c = test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("c.txt", "c");
    test_repo.repo.describe("C").unwrap();

    let b_commit = test_repo.repo.get_change(&b).unwrap().commit_id.clone();
    let c_commit = test_repo.repo.get_change(&c).unwrap().commit_id.clone();

    test_repo.repo.edit(&a).unwrap();
    test_repo.write_file("a.txt", "a-amended");
    test_repo.repo.amend(None).unwrap();

    // The log contains exactly the root plus {a, b, c}.
    let root = test_repo.repo.graph().root().unwrap().id.clone();
    let logged: HashSet<ChangeId> = test_repo
        .repo
        .log(None)
        .unwrap()
        .into_iter()
        .map(|change| change.id)
        .collect();
    assert_eq!(logged, HashSet::from([root, a.clone(), b.clone(), c.clone()]));

    assert_ne!(test_repo.repo.get_change(&b).unwrap().commit_id, b_commit);
    assert_ne!(test_repo.repo.get_change(&c).unwrap().commit_id, c_commit);
}

#[test]
fn test_split_preserves_identity_for_part_one() {
    // Scenario: split a change holding docs/ and tests/ files; the original
    // id keeps the docs part, a new child carries the rest.
    let mut test_repo = TestRepo::init();
    test_repo.write_file("docs/x.md", "doc");
    test_repo.write_file("tests/x.test", "test");
    test_repo.repo.describe("mixed").unwrap();
    let x = test_repo.repo.wc_change_id().clone();

    let result = test_repo
        .repo
        .split(&x, "docs", "tests", &[repo_path("docs/x.md")])
        .unwrap();

    assert_eq!(result.original.id, x);
    assert_eq!(result.original.description, "docs");
    assert_ne!(result.new.id, x);
    assert_eq!(result.new.description, "tests");

    let new_change = test_repo.repo.get_change(&result.new.id).unwrap();
    assert_eq!(new_change.parents, [x.clone()]);

    let original = test_repo.repo.get_change(&x).unwrap();
    let files = original.file_snapshot.as_ref().unwrap();
    assert!(files.contains_key(&repo_path("docs/x.md")));
    assert!(!files.contains_key(&repo_path("tests/x.test")));

    // The working copy moved to the second part; the tree is unchanged.
    assert_eq!(test_repo.repo.wc_change_id(), &result.new.id);
    assert_eq!(test_repo.read_file("tests/x.test"), b"test");
}

#[test]
fn test_split_rejects_unknown_and_empty_parts() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("only", "file");
    test_repo.repo.describe("one file").unwrap();
    let x = test_repo.repo.wc_change_id().clone();

    assert_matches!(
        test_repo
            .repo
            .split(&x, "a", "b", &[repo_path("missing")]),
        Err(RepoError::FileNotFound { .. })
    );
    // Taking every file leaves nothing for the second part.
    assert_matches!(
        test_repo.repo.split(&x, "a", "b", &[repo_path("only")]),
        Err(RepoError::InvalidArgument { .. })
    );
}

#[test]
fn test_squash_into_parent() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("base.txt", "base");
    test_repo.repo.describe("parent work").unwrap();
    let parent = test_repo.repo.wc_change_id().clone();

    let child = test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("child.txt", "child");
    test_repo.repo.describe("child work").unwrap();

    test_repo.repo.squash(None).unwrap();

    // The parent absorbed the child's tree; the child is gone from the log.
    assert_eq!(test_repo.repo.wc_change_id(), &parent);
    let parent_change = test_repo.repo.get_change(&parent).unwrap();
    let files = parent_change.file_snapshot.as_ref().unwrap();
    assert!(files.contains_key(&repo_path("base.txt")));
    assert!(files.contains_key(&repo_path("child.txt")));
    assert_eq!(parent_change.description, "parent work");

    assert!(test_repo.repo.get_change(&child).unwrap().abandoned);
    let logged: Vec<ChangeId> = test_repo
        .repo
        .log(None)
        .unwrap()
        .into_iter()
        .map(|change| change.id)
        .collect();
    assert!(!logged.contains(&child));
}

#[test]
fn test_squash_root_child_is_rejected() {
    let test_repo = TestRepo::init();
    let mut repo = test_repo.repo;
    // The working-copy change sits directly on the root.
    let err = repo.squash(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_abandon_splices_descendants() {
    let mut test_repo = TestRepo::init();
    let a = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("a").unwrap();
    let b = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.describe("b").unwrap();
    let c = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.describe("c").unwrap();
    test_repo.repo.edit(&a).unwrap();

    test_repo.repo.abandon(&b).unwrap();

    // c is now a's direct child; b is hidden but its record remains.
    assert_eq!(test_repo.repo.get_change(&c).unwrap().parents, [a.clone()]);
    assert!(test_repo.repo.get_change(&b).unwrap().abandoned);
    let visible = test_repo.repo.evaluate_revset("all()").unwrap();
    assert!(!visible.contains(&b));
    assert!(visible.contains(&c));
}

#[test]
fn test_abandon_root_is_rejected() {
    let test_repo = TestRepo::init();
    let mut repo = test_repo.repo;
    let root = repo.graph().root().unwrap().id.clone();
    let err = repo.abandon(&root).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotAbandon);
}

#[test]
fn test_rebase_moves_change_and_refuses_cycles() {
    let mut test_repo = TestRepo::init();
    let a = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("a").unwrap();
    let b = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.describe("b").unwrap();
    let c = test_repo.repo.new_change(Some(vec![a.clone()]), None).unwrap();
    test_repo.repo.describe("c").unwrap();

    // Moving c from a onto b is fine.
    test_repo.repo.rebase(&c, &[b.clone()]).unwrap();
    assert_eq!(test_repo.repo.get_change(&c).unwrap().parents, [b.clone()]);

    // Rebasing a onto its own descendant would create a cycle.
    let err = test_repo.repo.rebase(&a, &[c.clone()]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    // The graph is unchanged.
    assert_eq!(test_repo.repo.get_change(&c).unwrap().parents, [b]);
}

#[test]
fn test_restore_from_parent() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("x", "original");
    test_repo.repo.describe("parent").unwrap();

    test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("x", "modified");
    test_repo.repo.describe("child edit").unwrap();
    assert_eq!(test_repo.read_file("x"), b"modified");

    test_repo.repo.restore(None, None).unwrap();
    assert_eq!(test_repo.read_file("x"), b"original");

    // The restored content belongs to the working-copy change now.
    let wc_change = test_repo
        .repo
        .get_change(test_repo.repo.wc_change_id())
        .unwrap();
    assert_eq!(
        wc_change.file_snapshot.as_ref().unwrap()[&repo_path("x")],
        b"original"
    );
}

#[test]
fn test_restore_specific_paths() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("x", "x0");
    test_repo.write_file("y", "y0");
    test_repo.repo.describe("parent").unwrap();

    test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("x", "x1");
    test_repo.write_file("y", "y1");
    test_repo.repo.describe("child").unwrap();

    test_repo
        .repo
        .restore(None, Some(&[repo_path("x")]))
        .unwrap();
    assert_eq!(test_repo.read_file("x"), b"x0");
    assert_eq!(test_repo.read_file("y"), b"y1");

    assert_matches!(
        test_repo.repo.restore(None, Some(&[repo_path("missing")])),
        Err(RepoError::FileNotFound { .. })
    );
}

#[test]
fn test_bookmark_pipeline() {
    let mut test_repo = TestRepo::init();
    test_repo.repo.describe("base").unwrap();
    let first = test_repo.repo.wc_change_id().clone();

    test_repo.repo.bookmark_set("main", None).unwrap();
    assert_eq!(test_repo.repo.bookmark_get("main").unwrap(), &first);
    assert_matches!(
        test_repo.repo.bookmark_set("main", None),
        Err(RepoError::BookmarkExists { .. })
    );

    let second = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.bookmark_move("main", None).unwrap();
    assert_eq!(test_repo.repo.bookmark_get("main").unwrap(), &second);

    let entries = test_repo.repo.bookmark_list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "main");

    test_repo.repo.bookmark_delete("main").unwrap();
    assert_matches!(
        test_repo.repo.bookmark_move("main", None),
        Err(RepoError::BookmarkNotFound { .. })
    );
}

#[test]
fn test_bookmark_name_rules_apply() {
    let mut test_repo = TestRepo::init();
    for name in ["bad name", "bad..name", ".bad", "bad.lock", "bad//name"] {
        let err = test_repo.repo.bookmark_set(name, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBookmarkName, "name {name:?}");
    }
    // A failed validation records no operation.
    let ops = test_repo.repo.op_log().len();
    let _ = test_repo.repo.bookmark_set("also bad", None);
    assert_eq!(test_repo.repo.op_log().len(), ops);
}

#[test]
fn test_tag_pipeline() {
    let mut test_repo = TestRepo::init();
    test_repo.repo.describe("base").unwrap();
    test_repo.repo.tag_create("v1.0", None).unwrap();
    assert_matches!(
        test_repo.repo.tag_create("v1.0", None),
        Err(RepoError::TagExists { .. })
    );
    assert_eq!(test_repo.repo.tag_list(Some("v1*")).unwrap().len(), 1);
    test_repo.repo.tag_delete("v1.0").unwrap();
    assert_matches!(
        test_repo.repo.tag_delete("v1.0"),
        Err(RepoError::TagNotFound { .. })
    );
}

#[test]
fn test_pre_event_cancels_operation() {
    let mut test_repo = TestRepo::init();
    test_repo.repo.on("pre-describe", |event| {
        event.cancel("vetoed by listener");
    });

    let ops = test_repo.repo.op_log().len();
    let err = test_repo.repo.describe("blocked").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EventCancelled);
    // The cancelled operation left no record.
    assert_eq!(test_repo.repo.op_log().len(), ops);

    // Other operations are unaffected.
    test_repo.repo.new_change(None, None).unwrap();
}

#[test]
fn test_post_event_fires_after_mutation() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let mut test_repo = TestRepo::init();
    let seen = Rc::new(RefCell::new(vec![]));
    {
        let seen = seen.clone();
        test_repo.repo.on("post-describe", move |event| {
            seen.borrow_mut().push(event.name().to_string());
        });
    }
    test_repo.repo.describe("watched").unwrap();
    assert_eq!(*seen.borrow(), ["post-describe"]);
}

#[test]
fn test_backend_sync_realizes_commits() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("a", "v1");
    test_repo.repo.describe("before backend").unwrap();
    let wc = test_repo.repo.wc_change_id().clone();
    let local_commit = test_repo.repo.get_change(&wc).unwrap().commit_id.clone();

    test_repo
        .repo
        .attach_backend(Box::new(TestCommitBackend::new()))
        .unwrap();

    // Attaching re-realizes commit ids through the backend.
    let backend_commit = test_repo.repo.get_change(&wc).unwrap().commit_id.clone();
    assert_ne!(backend_commit, local_commit);
    assert_eq!(test_repo.repo.wc_change_id(), &wc);

    // Further mutations create commits through the backend as well.
    test_repo.write_file("a", "v2");
    test_repo.repo.amend(None).unwrap();
    let amended_commit = test_repo.repo.get_change(&wc).unwrap().commit_id.clone();
    assert_ne!(amended_commit, backend_commit);
}

#[test]
fn test_git_refs_resolve_through_backend() {
    let mut test_repo = TestRepo::init();
    test_repo.repo.describe("base").unwrap();
    let wc = test_repo.repo.wc_change_id().clone();

    let backend = Box::new(TestCommitBackend::new());
    test_repo.repo.attach_backend(backend).unwrap();
    let commit_id = test_repo.repo.get_change(&wc).unwrap().commit_id.clone();

    // Point a backend ref at the realized commit.
    let backend = test_repo.repo.backend().unwrap();
    backend.update_ref("refs/heads/main", &commit_id).unwrap();
    backend.update_ref("HEAD", &commit_id).unwrap();

    let refs = test_repo.repo.evaluate_revset("git_refs()").unwrap();
    assert_eq!(refs, HashSet::from([wc.clone()]));
    let head = test_repo.repo.evaluate_revset("git_head()").unwrap();
    assert_eq!(head, HashSet::from([wc]));
}

#[test]
fn test_restore_from_self_is_rejected() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("x", "v1");
    test_repo.repo.describe("base").unwrap();
    let wc = test_repo.repo.wc_change_id().clone();
    let err = test_repo.repo.restore(Some(&wc), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotRevert);
}

#[test]
fn test_fetch_imports_remote_bookmarks() {
    let mut test_repo = TestRepo::init();
    test_repo.repo.describe("base").unwrap();
    let wc = test_repo.repo.wc_change_id().clone();

    test_repo
        .repo
        .attach_backend(Box::new(TestCommitBackend::new()))
        .unwrap();
    let commit_id = test_repo.repo.get_change(&wc).unwrap().commit_id.clone();
    test_repo
        .repo
        .backend()
        .unwrap()
        .update_ref("refs/remotes/origin/main", &commit_id)
        .unwrap();

    test_repo
        .repo
        .fetch(&strata_lib::backend::FetchOptions::default())
        .unwrap();
    let entries = test_repo.repo.bookmark_list();
    assert!(entries.iter().any(|entry| {
        entry.name == "origin/main"
            && entry.remote.as_deref() == Some("origin")
            && entry.target == wc
    }));
}

#[test]
fn test_push_without_backend_is_unsupported() {
    let test_repo = TestRepo::init();
    let mut repo = test_repo.repo;
    let err = repo
        .push(&strata_lib::backend::PushOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn test_workspaces() {
    let mut test_repo = TestRepo::init();
    assert_eq!(test_repo.repo.workspace_list().len(), 1);

    let change_id = test_repo.repo.workspace_add("second", "second").unwrap();
    assert_eq!(test_repo.repo.workspace_list().len(), 2);
    assert!(test_repo.repo.get_change(&change_id).is_ok());
    assert_matches!(
        test_repo.repo.workspace_add("second", "elsewhere"),
        Err(RepoError::WorkspaceExists { .. })
    );

    test_repo.repo.workspace_forget("second").unwrap();
    assert_matches!(
        test_repo.repo.workspace_forget("second"),
        Err(RepoError::WorkspaceNotFound { .. })
    );
    assert_matches!(
        test_repo.repo.workspace_forget("default"),
        Err(RepoError::InvalidArgument { .. })
    );
}

#[test]
fn test_workspace_add_rejects_non_empty_directory() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("taken/file", "content");
    assert_matches!(
        test_repo.repo.workspace_add("taken", "taken"),
        Err(RepoError::WorkspaceNotEmpty { .. })
    );
}

#[test]
fn test_navigation() {
    let mut test_repo = TestRepo::init();
    let a = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("a").unwrap();
    let b = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.describe("b").unwrap();

    // prev climbs to the parent, next comes back.
    assert_eq!(test_repo.repo.prev(1).unwrap(), a);
    assert_eq!(test_repo.repo.wc_change_id(), &a);
    assert_eq!(test_repo.repo.next(1).unwrap(), b);

    let err = test_repo.repo.next(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoChildren);

    test_repo.repo.prev(1).unwrap();
    let err = test_repo.repo.next(3).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientChildren);
}

#[test]
fn test_log_orders_children_first() {
    let mut test_repo = TestRepo::init();
    let a = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("a").unwrap();
    let b = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.describe("b").unwrap();
    let c = test_repo.repo.new_change(None, None).unwrap();
    test_repo.repo.describe("c").unwrap();

    let logged: Vec<ChangeId> = test_repo
        .repo
        .log(None)
        .unwrap()
        .into_iter()
        .map(|change| change.id)
        .collect();
    let position = |id: &ChangeId| logged.iter().position(|logged| logged == id).unwrap();
    assert!(position(&c) < position(&b));
    assert!(position(&b) < position(&a));
    let root = test_repo.repo.graph().root().unwrap().id.clone();
    assert_eq!(position(&root), logged.len() - 1);
}

#[test]
fn test_resolve_change_id() {
    let mut test_repo = TestRepo::init();
    test_repo.repo.describe("base").unwrap();
    let wc = test_repo.repo.wc_change_id().clone();

    assert_eq!(test_repo.repo.resolve_change_id(&wc.hex()).unwrap(), wc);
    assert_eq!(test_repo.repo.resolve_change_id(&wc.hex()[..10]).unwrap(), wc);
    assert_eq!(
        test_repo.repo.resolve_change_id("not-hex").unwrap_err().kind(),
        ErrorKind::InvalidChangeId
    );
    assert_eq!(
        test_repo
            .repo
            .resolve_change_id("ffffffffffffffff")
            .unwrap_err()
            .kind(),
        ErrorKind::ChangeNotFound
    );
    // The empty prefix matches every change.
    assert_eq!(
        test_repo.repo.resolve_change_id("").unwrap_err().kind(),
        ErrorKind::InvalidChangeId
    );
}

#[test]
fn test_common_ancestor_facade() {
    let mut test_repo = TestRepo::init();
    let base = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("base").unwrap();
    let left = test_repo.repo.new_change(None, None).unwrap();
    let right = test_repo
        .repo
        .new_change(Some(vec![base.clone()]), None)
        .unwrap();

    assert_eq!(test_repo.repo.common_ancestor(&left, &right).unwrap(), base);
}

#[test]
fn test_auto_snapshot_queue_records_when_dirty() {
    use std::time::Duration;
    use std::time::Instant;

    use strata_lib::fsmonitor::SnapshotQueue;

    let mut test_repo = TestRepo::init();
    test_repo.write_file("x", "one");
    test_repo.repo.describe("m1").unwrap();

    let mut queue = SnapshotQueue::with_quiet_period(Duration::from_millis(0));
    let start = Instant::now();

    // Nothing queued: no snapshot.
    assert_eq!(
        test_repo
            .repo
            .poll_auto_snapshot(&mut queue, start)
            .unwrap(),
        None
    );

    // A change event with an unchanged tree: still no snapshot.
    queue.note_change(repo_path("x"), start);
    assert_eq!(
        test_repo
            .repo
            .poll_auto_snapshot(&mut queue, start + Duration::from_millis(10))
            .unwrap(),
        None
    );

    // A real edit gets captured.
    test_repo.write_file("x", "two");
    queue.note_change(repo_path("x"), start);
    let op = test_repo
        .repo
        .poll_auto_snapshot(&mut queue, start + Duration::from_millis(10))
        .unwrap();
    assert!(op.is_some());
    let wc_change = test_repo
        .repo
        .get_change(test_repo.repo.wc_change_id())
        .unwrap();
    assert_eq!(
        wc_change.file_snapshot.as_ref().unwrap()[&repo_path("x")],
        b"two"
    );
}
