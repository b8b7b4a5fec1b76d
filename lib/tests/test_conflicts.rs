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

use assert_matches::assert_matches;
use strata_lib::backend::ChangeId;
use strata_lib::conflicts::ConflictSide;
use strata_lib::conflicts::ConflictType;
use strata_lib::conflicts::Resolution;
use strata_lib::conflicts::ResolutionStrategy;
use strata_lib::conflicts::parse_conflict_markers;
use strata_lib::error::ErrorKind;
use strata_lib::error::RepoError;
use strata_lib::merge_driver::DriverOutcome;
use strata_lib::merge_driver::MergeDriver;
use strata_lib::repo::MergeResult;
use strata_lib::repo::Repository;
use testutils::TestRepo;
use testutils::repo_path;

// Base has s = "v0"; a left child sets "A", a right child sets "B". Returns
// the repo positioned at the left change plus the right change's id.
fn diverged_repo(left: &str, right: &str) -> (TestRepo, ChangeId) {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("s", "v0\n");
    test_repo.repo.describe("base").unwrap();
    let base = test_repo.repo.wc_change_id().clone();

    let left_id = test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("s", left);
    test_repo.repo.describe("left").unwrap();

    test_repo
        .repo
        .new_change(Some(vec![base]), None)
        .unwrap();
    test_repo.write_file("s", right);
    let right_id = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("right").unwrap();

    test_repo.repo.edit(&left_id).unwrap();
    assert_eq!(test_repo.read_file("s"), left.as_bytes());
    (test_repo, right_id)
}

fn merge(test_repo: &mut TestRepo, source: &ChangeId) -> MergeResult {
    test_repo.repo.merge(source).unwrap()
}

#[test]
fn test_merge_detects_content_conflict() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    let result = merge(&mut test_repo, &right_id);
    assert_eq!(result.conflicts.len(), 1);

    let conflicts = test_repo.repo.unresolved_conflicts();
    assert_eq!(conflicts.len(), 1);
    let conflict = conflicts[0];
    assert_eq!(conflict.kind, ConflictType::Content);
    assert_eq!(conflict.path, repo_path("s"));
    assert!(!conflict.resolved);
    assert_eq!(conflict.sides.base.as_deref(), Some(b"v0\n".as_slice()));
    assert_eq!(conflict.sides.left.as_deref(), Some(b"A\n".as_slice()));
    assert_eq!(conflict.sides.right.as_deref(), Some(b"B\n".as_slice()));

    // The merge change has both parents.
    let merge_change = test_repo.repo.get_change(&result.change_id).unwrap();
    assert_eq!(merge_change.parents.len(), 2);
}

#[test]
fn test_conflicts_do_not_block_other_operations() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    merge(&mut test_repo, &right_id);
    assert_eq!(test_repo.repo.unresolved_conflicts().len(), 1);

    // Unrelated operations keep working while the conflict persists.
    test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("unrelated", "content");
    test_repo.repo.describe("still works").unwrap();
    test_repo.repo.bookmark_set("wip", None).unwrap();
    assert_eq!(test_repo.repo.unresolved_conflicts().len(), 1);
}

#[test]
fn test_conflict_markers_on_disk_parse_back() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    merge(&mut test_repo, &right_id);

    let materialized = test_repo.read_file("s");
    let text = str::from_utf8(&materialized).unwrap();
    assert!(text.starts_with("<<<<<<< Left\n"));
    assert!(text.contains("||||||| Base\n"));
    assert!(text.contains("=======\n"));
    assert!(text.ends_with(">>>>>>> Right\n"));

    let sides = parse_conflict_markers(&materialized).unwrap();
    assert_eq!(sides.base.as_deref(), Some(b"v0\n".as_slice()));
    assert_eq!(sides.left.as_deref(), Some(b"A\n".as_slice()));
    assert_eq!(sides.right.as_deref(), Some(b"B\n".as_slice()));
}

#[test]
fn test_resolve_by_side_overwrites_working_copy() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    let result = merge(&mut test_repo, &right_id);
    let conflict_id = result.conflicts[0].clone();

    test_repo
        .repo
        .resolve_conflict(
            &conflict_id,
            Resolution::Side {
                side: ConflictSide::Theirs,
            },
        )
        .unwrap();
    assert_eq!(test_repo.read_file("s"), b"B\n");
    assert_eq!(test_repo.repo.unresolved_conflicts().len(), 0);

    // Resolved conflicts stay listed until the resolving change is
    // committed forward.
    assert_eq!(test_repo.repo.conflict_list().len(), 1);
    test_repo.repo.describe("resolved").unwrap();
    assert_eq!(test_repo.repo.conflict_list().len(), 0);
}

#[test]
fn test_resolve_by_content() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    let result = merge(&mut test_repo, &right_id);
    let conflict_id = result.conflicts[0].clone();

    test_repo
        .repo
        .resolve_conflict(
            &conflict_id,
            Resolution::Content {
                content: b"AB merged\n".to_vec(),
            },
        )
        .unwrap();
    assert_eq!(test_repo.read_file("s"), b"AB merged\n");
}

#[test]
fn test_resolve_all_with_union_strategy() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("s", "v0\n");
    test_repo.write_file("t", "w0\n");
    test_repo.repo.describe("base").unwrap();
    let base = test_repo.repo.wc_change_id().clone();

    let left_id = test_repo.repo.new_change(None, None).unwrap();
    test_repo.write_file("s", "A\n");
    test_repo.write_file("t", "C\n");
    test_repo.repo.describe("left").unwrap();

    test_repo.repo.new_change(Some(vec![base]), None).unwrap();
    test_repo.write_file("s", "B\n");
    test_repo.write_file("t", "D\n");
    let right_id = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("right").unwrap();

    test_repo.repo.edit(&left_id).unwrap();
    let result = test_repo.repo.merge(&right_id).unwrap();
    assert_eq!(result.conflicts.len(), 2);

    let resolved = test_repo
        .repo
        .resolve_all(ResolutionStrategy::Union)
        .unwrap();
    assert_eq!(resolved, 2);
    assert_eq!(test_repo.read_file("s"), b"A\nB\n");
    assert_eq!(test_repo.read_file("t"), b"C\nD\n");
    assert_eq!(test_repo.repo.unresolved_conflicts().len(), 0);
}

#[test]
fn test_resolving_twice_is_invalid() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    let result = merge(&mut test_repo, &right_id);
    let conflict_id = result.conflicts[0].clone();

    test_repo
        .repo
        .resolve_conflict(
            &conflict_id,
            Resolution::Side {
                side: ConflictSide::Ours,
            },
        )
        .unwrap();
    let err = test_repo
        .repo
        .resolve_conflict(&conflict_id, Resolution::Manual)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidResolution);

    assert_matches!(
        test_repo
            .repo
            .resolve_conflict(&strata_lib::conflicts::ConflictId::generate(), Resolution::Manual),
        Err(RepoError::ConflictNotFound { .. })
    );
}

#[test]
fn test_delete_modify_conflict() {
    let mut test_repo = TestRepo::init();
    test_repo.write_file("s", "v0\n");
    test_repo.repo.describe("base").unwrap();
    let base = test_repo.repo.wc_change_id().clone();

    // Left deletes, right modifies.
    let left_id = test_repo.repo.new_change(None, None).unwrap();
    test_repo.remove_file("s");
    test_repo.repo.describe("delete s").unwrap();

    test_repo.repo.new_change(Some(vec![base]), None).unwrap();
    test_repo.write_file("s", "B\n");
    let right_id = test_repo.repo.wc_change_id().clone();
    test_repo.repo.describe("modify s").unwrap();

    test_repo.repo.edit(&left_id).unwrap();
    let result = test_repo.repo.merge(&right_id).unwrap();
    assert_eq!(result.conflicts.len(), 1);
    let conflicts = test_repo.repo.unresolved_conflicts();
    assert_eq!(conflicts[0].kind, ConflictType::DeleteModify);
    // The surviving side's content is materialized.
    assert_eq!(test_repo.read_file("s"), b"B\n");
}

#[test]
fn test_conflicts_survive_reload() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    merge(&mut test_repo, &right_id);

    let reloaded = Repository::load(test_repo.workspace_root()).unwrap();
    let conflicts = reloaded.unresolved_conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].kind, ConflictType::Content);
}

#[test]
fn test_registered_driver_handles_merge() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    test_repo
        .repo
        .register_merge_driver(MergeDriver::new("take-both", vec!["*".to_string()], {
            |_, sides, _| {
                let mut content = sides.left.clone().unwrap_or_default();
                content.extend_from_slice(sides.right.as_deref().unwrap_or_default());
                Ok(DriverOutcome {
                    content,
                    has_conflict: false,
                    message: None,
                })
            }
        }));

    let result = merge(&mut test_repo, &right_id);
    assert_eq!(result.conflicts.len(), 0);
    assert_eq!(test_repo.read_file("s"), b"A\nB\n");
}

#[test]
fn test_strict_driver_failure_aborts_merge() {
    let (mut test_repo, right_id) = diverged_repo("A\n", "B\n");
    test_repo.repo.set_strict_drivers(true);
    test_repo
        .repo
        .register_merge_driver(MergeDriver::new("broken", vec!["*".to_string()], |_, _, _| {
            Err("boom".to_string())
        }));

    let err = test_repo.repo.merge(&right_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DriverFailed);
    // The failed merge recorded no conflicts and left no merge change
    // behind the working copy.
    assert_eq!(test_repo.repo.unresolved_conflicts().len(), 0);
}
