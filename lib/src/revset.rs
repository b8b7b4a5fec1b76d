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

//! Revset evaluation.
//!
//! Evaluates a parsed [`ExpressionKind`] tree against the change graph and
//! the surrounding stores. Results are deduplicated sets of change ids;
//! ordering is unspecified unless a calling API applies its own sort.

use std::collections::HashSet;
use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Utc;
use globset::GlobBuilder;
use itertools::Itertools as _;

use crate::backend::Change;
use crate::backend::ChangeId;
use crate::backend::CommitBackend;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::graph::ChangeGraph;
use crate::object_id::HexPrefix;
use crate::object_id::ObjectId as _;
use crate::object_id::PrefixResolution;
use crate::refs::BookmarkStore;
use crate::refs::TagStore;
use crate::revset_parser::BinaryOp;
use crate::revset_parser::ExpressionKind;
use crate::revset_parser::NeighborOp;
use crate::revset_parser::parse_program;

/// Everything a revset can observe.
pub struct RevsetContext<'a> {
    pub graph: &'a ChangeGraph,
    pub bookmarks: &'a BookmarkStore,
    pub tags: &'a TagStore,
    pub wc_change_id: &'a ChangeId,
    pub user_email: &'a str,
    pub backend: Option<&'a dyn CommitBackend>,
    pub now: DateTime<Utc>,
}

/// Parses and evaluates `text`, returning the deduplicated result set.
pub fn evaluate(text: &str, context: &RevsetContext<'_>) -> RepoResult<HashSet<ChangeId>> {
    let expression = parse_program(text).map_err(|err| RepoError::InvalidRevset {
        text: text.to_string(),
        message: err.message,
    })?;
    let evaluator = Evaluator { text, context };
    evaluator.eval(&expression)
}

struct Evaluator<'a, 'b> {
    text: &'a str,
    context: &'a RevsetContext<'b>,
}

type ChangeSet = HashSet<ChangeId>;

impl Evaluator<'_, '_> {
    fn invalid(&self, message: impl Into<String>) -> RepoError {
        RepoError::InvalidRevset {
            text: self.text.to_string(),
            message: message.into(),
        }
    }

    fn graph(&self) -> &ChangeGraph {
        self.context.graph
    }

    fn eval(&self, expression: &ExpressionKind) -> RepoResult<ChangeSet> {
        match expression {
            ExpressionKind::WorkingCopy => {
                Ok(ChangeSet::from([self.context.wc_change_id.clone()]))
            }
            ExpressionKind::Symbol(text) => Ok(ChangeSet::from([self.resolve_symbol(text)?])),
            ExpressionKind::StringLiteral(text) => {
                Ok(ChangeSet::from([self.resolve_symbol(text)?]))
            }
            ExpressionKind::Range { from, to } => self.eval_range(from, to),
            ExpressionKind::Neighbors { base, ops } => {
                let mut set = self.eval(base)?;
                for op in ops {
                    // Stepping from the empty set stays empty; walking past
                    // the root is not an error.
                    if set.is_empty() {
                        break;
                    }
                    set = self.step(&set, *op)?;
                }
                Ok(set)
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Ok(match op {
                    BinaryOp::Union => lhs.union(&rhs).cloned().collect(),
                    BinaryOp::Intersection => lhs.intersection(&rhs).cloned().collect(),
                    BinaryOp::Difference => lhs.difference(&rhs).cloned().collect(),
                })
            }
            ExpressionKind::Function { name, args } => self.eval_function(name, args),
        }
    }

    fn step(&self, set: &ChangeSet, op: NeighborOp) -> RepoResult<ChangeSet> {
        let mut result = ChangeSet::new();
        for id in set {
            match op {
                NeighborOp::Parents => {
                    result.extend(self.graph().parents(id)?.iter().cloned());
                }
                NeighborOp::Children => {
                    result.extend(self.graph().children(id)?.iter().cloned());
                }
            }
        }
        Ok(result)
    }

    /// Resolves a bare symbol: full change id, unambiguous change-id prefix,
    /// bookmark name, then tag name.
    fn resolve_symbol(&self, text: &str) -> RepoResult<ChangeId> {
        if let Some(id) = ChangeId::try_from_hex(text)
            && id.as_bytes().len() == crate::backend::CHANGE_ID_LENGTH
        {
            return if self.graph().contains(&id) {
                Ok(id)
            } else {
                Err(RepoError::ChangeNotFound { id: id.hex() })
            };
        }
        if let Some(prefix) = HexPrefix::try_from_hex(text) {
            match self.graph().resolve_change_prefix(&prefix) {
                PrefixResolution::SingleMatch(id) => return Ok(id),
                PrefixResolution::AmbiguousMatch => {
                    return Err(self.invalid(format!("change id prefix {text:?} is ambiguous")));
                }
                PrefixResolution::NoMatch => {}
            }
        }
        if let Some(target) = self.context.bookmarks.get(text) {
            return Ok(target.clone());
        }
        if let Some(target) = self.context.tags.get(text) {
            return Ok(target.clone());
        }
        Err(RepoError::ChangeNotFound {
            id: text.to_string(),
        })
    }

    fn eval_function(&self, name: &str, args: &[ExpressionKind]) -> RepoResult<ChangeSet> {
        match name {
            "all" => {
                self.expect_arg_count(name, args, 0..=0)?;
                Ok(self.all_visible().map(|change| change.id.clone()).collect())
            }
            "none" => {
                self.expect_arg_count(name, args, 0..=0)?;
                Ok(ChangeSet::new())
            }
            "root" => {
                self.expect_arg_count(name, args, 0..=0)?;
                Ok(self
                    .graph()
                    .root()
                    .map(|change| change.id.clone())
                    .into_iter()
                    .collect())
            }
            "visible_heads" => {
                self.expect_arg_count(name, args, 0..=0)?;
                let heads = self.graph().heads();
                Ok(heads
                    .into_iter()
                    .filter(|id| self.graph().get(id).is_some_and(|change| !change.abandoned))
                    .collect())
            }
            "git_refs" => {
                self.expect_arg_count(name, args, 0..=0)?;
                self.backend_refs("")
            }
            "git_head" => {
                self.expect_arg_count(name, args, 0..=0)?;
                self.backend_refs("HEAD")
            }
            "empty" => {
                self.expect_arg_count(name, args, 0..=0)?;
                Ok(self
                    .all_visible()
                    .filter(|change| self.is_empty_change(change))
                    .map(|change| change.id.clone())
                    .collect())
            }
            "mine" => {
                self.expect_arg_count(name, args, 0..=0)?;
                Ok(self
                    .all_visible()
                    .filter(|change| change.author.email == self.context.user_email)
                    .map(|change| change.id.clone())
                    .collect())
            }
            "merge" => {
                self.expect_arg_count(name, args, 0..=0)?;
                Ok(self
                    .all_visible()
                    .filter(|change| change.parents.len() >= 2)
                    .map(|change| change.id.clone())
                    .collect())
            }
            "ancestors" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let set = self.eval(&args[0])?;
                let mut result = ChangeSet::new();
                for id in &set {
                    result.extend(self.graph().ancestors(id)?);
                }
                Ok(result)
            }
            "descendants" => {
                self.expect_arg_count(name, args, 1..=2)?;
                let set = self.eval(&args[0])?;
                let depth = args.get(1).map(|arg| self.expect_number(arg)).transpose()?;
                let mut result = ChangeSet::new();
                for id in &set {
                    result.extend(self.descendants_of(id, depth)?);
                }
                Ok(result)
            }
            "parents" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let set = self.eval(&args[0])?;
                self.step(&set, NeighborOp::Parents)
            }
            "children" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let set = self.eval(&args[0])?;
                self.step(&set, NeighborOp::Children)
            }
            "roots" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let set = self.eval(&args[0])?;
                let mut result = ChangeSet::new();
                for id in &set {
                    let parents = self.graph().parents(id)?;
                    if parents.iter().all(|parent| !set.contains(parent)) {
                        result.insert(id.clone());
                    }
                }
                Ok(result)
            }
            "heads" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let set = self.eval(&args[0])?;
                let mut result = ChangeSet::new();
                for id in &set {
                    let children = self.graph().children(id)?;
                    if children.iter().all(|child| !set.contains(child)) {
                        result.insert(id.clone());
                    }
                }
                Ok(result)
            }
            "latest" => {
                self.expect_arg_count(name, args, 1..=2)?;
                let set = self.eval(&args[0])?;
                let count = args
                    .get(1)
                    .map(|arg| self.expect_number(arg))
                    .transpose()?
                    .unwrap_or(1);
                Ok(self.most_recent(set.iter(), count))
            }
            "author" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let needle = self.expect_text(&args[0])?;
                Ok(self
                    .all_visible()
                    .filter(|change| {
                        change.author.name.contains(&needle)
                            || change.author.email.contains(&needle)
                    })
                    .map(|change| change.id.clone())
                    .collect())
            }
            "description" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let needle = self.expect_text(&args[0])?;
                Ok(self
                    .all_visible()
                    .filter(|change| change.description.contains(&needle))
                    .map(|change| change.id.clone())
                    .collect())
            }
            "file" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let pattern = self.expect_text(&args[0])?;
                let matcher = GlobBuilder::new(&pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|err| self.invalid(format!("invalid file pattern: {err}")))?
                    .compile_matcher();
                Ok(self
                    .all_visible()
                    .filter(|change| {
                        change.file_snapshot.as_ref().is_some_and(|files| {
                            files.keys().any(|path| matcher.is_match(path.as_str()))
                        })
                    })
                    .map(|change| change.id.clone())
                    .collect())
            }
            "tags" => {
                self.expect_arg_count(name, args, 0..=1)?;
                let pattern = args.first().map(|arg| self.expect_text(arg)).transpose()?;
                let tags = self.context.tags.list(pattern.as_deref())?;
                Ok(tags.into_iter().map(|(_, target)| target.clone()).collect())
            }
            "bookmarks" => {
                self.expect_arg_count(name, args, 0..=1)?;
                let pattern = args.first().map(|arg| self.expect_text(arg)).transpose()?;
                let bookmarks = self.context.bookmarks.matching(pattern.as_deref())?;
                Ok(bookmarks
                    .into_iter()
                    .map(|(_, target)| target.clone())
                    .collect())
            }
            "bookmark" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let bookmark = self.expect_text(&args[0])?;
                let target = self.context.bookmarks.get(&bookmark).ok_or_else(|| {
                    RepoError::BookmarkNotFound {
                        name: bookmark.clone(),
                    }
                })?;
                Ok(ChangeSet::from([target.clone()]))
            }
            "last" => {
                self.expect_arg_count(name, args, 1..=1)?;
                self.eval_last(&args[0])
            }
            "since" => {
                self.expect_arg_count(name, args, 1..=1)?;
                let start = self.expect_date(&args[0])?;
                Ok(self
                    .all_visible()
                    .filter(|change| change.committer.timestamp >= start)
                    .map(|change| change.id.clone())
                    .collect())
            }
            "between" => {
                self.expect_arg_count(name, args, 2..=2)?;
                let start = self.expect_date(&args[0])?;
                let end = self.expect_date(&args[1])?;
                Ok(self
                    .all_visible()
                    .filter(|change| {
                        change.committer.timestamp >= start && change.committer.timestamp <= end
                    })
                    .map(|change| change.id.clone())
                    .collect())
            }
            "common_ancestor" | "diverge_point" => {
                self.expect_arg_count(name, args, 2..=2)?;
                let a = self.expect_single(&args[0])?;
                let b = self.expect_single(&args[1])?;
                Ok(self.common_ancestor(&a, &b)?.into_iter().collect())
            }
            "range" => {
                self.expect_arg_count(name, args, 1..=1)?;
                match &args[0] {
                    ExpressionKind::Range { from, to } => self.eval_range(from, to),
                    _ => Err(self.invalid("range() expects `a..b`")),
                }
            }
            "connected" => {
                self.expect_arg_count(name, args, 2..=2)?;
                let a = self.expect_single(&args[0])?;
                let b = self.expect_single(&args[1])?;
                let connected = self.graph().ancestors(&b)?.contains(&a)
                    || self.graph().ancestors(&a)?.contains(&b);
                if connected {
                    Ok(ChangeSet::from([a, b]))
                } else {
                    Ok(ChangeSet::new())
                }
            }
            _ => Err(self.invalid(format!("function `{name}` doesn't exist"))),
        }
    }

    fn all_visible(&self) -> impl Iterator<Item = &Change> {
        self.graph().iter().filter(|change| !change.abandoned)
    }

    fn is_empty_change(&self, change: &Change) -> bool {
        let parent_files = change
            .parents
            .first()
            .and_then(|parent| self.graph().get(parent))
            .map(|parent| parent.materialized_files())
            .unwrap_or_default();
        change.materialized_files() == parent_files
    }

    fn backend_refs(&self, prefix: &str) -> RepoResult<ChangeSet> {
        let Some(backend) = self.context.backend else {
            return Ok(ChangeSet::new());
        };
        let refs = backend
            .list_refs(prefix)
            .map_err(|err| RepoError::BackendSyncFailed { source: err.into() })?;
        Ok(refs
            .iter()
            .filter_map(|r| self.graph().find_by_commit_id(&r.oid))
            .map(|change| change.id.clone())
            .collect())
    }

    fn descendants_of(&self, id: &ChangeId, depth: Option<usize>) -> RepoResult<ChangeSet> {
        self.graph().get_or_err(id)?;
        let mut result = ChangeSet::new();
        let mut queue = VecDeque::from([(id.clone(), 0usize)]);
        let mut visited = ChangeSet::from([id.clone()]);
        while let Some((current, level)) = queue.pop_front() {
            if depth.is_some_and(|depth| level >= depth) {
                continue;
            }
            for child in self.graph().children(&current)? {
                if visited.insert(child.clone()) {
                    result.insert(child.clone());
                    queue.push_back((child.clone(), level + 1));
                }
            }
        }
        Ok(result)
    }

    /// First ancestor of `b` (in BFS order) that is also an ancestor of `a`.
    fn common_ancestor(&self, a: &ChangeId, b: &ChangeId) -> RepoResult<Option<ChangeId>> {
        let ancestors_of_a: ChangeSet = self.graph().ancestors(a)?.into_iter().collect();
        Ok(self
            .graph()
            .ancestors(b)?
            .into_iter()
            .find(|id| ancestors_of_a.contains(id)))
    }

    fn eval_range(&self, from: &str, to: &str) -> RepoResult<ChangeSet> {
        let from = self.resolve_symbol(from)?;
        let to = self.resolve_symbol(to)?;
        let excluded: ChangeSet = self.graph().ancestors(&from)?.into_iter().collect();
        Ok(self
            .graph()
            .ancestors(&to)?
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect())
    }

    fn eval_last(&self, arg: &ExpressionKind) -> RepoResult<ChangeSet> {
        let text = self.expect_text(arg)?;
        if let Ok(count) = text.parse::<usize>() {
            let ids: Vec<ChangeId> = self
                .all_visible()
                .map(|change| change.id.clone())
                .collect();
            return Ok(self.most_recent(ids.iter(), count));
        }
        let (number, unit) = text.split_at(text.len().saturating_sub(1));
        let count: i64 = number
            .parse()
            .map_err(|_| self.invalid(format!("last() expects a count or time span, got {text:?}")))?;
        let span = match unit {
            "d" => Duration::days(count),
            "h" => Duration::hours(count),
            _ => {
                return Err(RepoError::InvalidTimeUnit {
                    unit: unit.to_string(),
                });
            }
        };
        let cutoff = self.context.now - span;
        Ok(self
            .all_visible()
            .filter(|change| change.committer.timestamp >= cutoff)
            .map(|change| change.id.clone())
            .collect())
    }

    /// The `count` most recent members of `ids` by committer timestamp,
    /// descending; ties broken by change id for determinism.
    fn most_recent<'i>(
        &self,
        ids: impl Iterator<Item = &'i ChangeId>,
        count: usize,
    ) -> ChangeSet {
        ids.filter_map(|id| self.graph().get(id))
            .sorted_by(|a, b| {
                b.committer
                    .timestamp
                    .cmp(&a.committer.timestamp)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .take(count)
            .map(|change| change.id.clone())
            .collect()
    }

    fn expect_arg_count(
        &self,
        name: &str,
        args: &[ExpressionKind],
        expected: std::ops::RangeInclusive<usize>,
    ) -> RepoResult<()> {
        if expected.contains(&args.len()) {
            Ok(())
        } else {
            Err(self.invalid(format!(
                "function `{name}` expected {} to {} arguments, got {}",
                expected.start(),
                expected.end(),
                args.len()
            )))
        }
    }

    fn expect_text(&self, arg: &ExpressionKind) -> RepoResult<String> {
        match arg {
            ExpressionKind::Symbol(text) | ExpressionKind::StringLiteral(text) => {
                Ok(text.clone())
            }
            _ => Err(self.invalid("expected a text argument")),
        }
    }

    fn expect_number(&self, arg: &ExpressionKind) -> RepoResult<usize> {
        let text = self.expect_text(arg)?;
        text.parse()
            .map_err(|_| self.invalid(format!("expected a number, got {text:?}")))
    }

    fn expect_single(&self, arg: &ExpressionKind) -> RepoResult<ChangeId> {
        let set = self.eval(arg)?;
        set.into_iter()
            .exactly_one()
            .map_err(|_| self.invalid("expected a single change"))
    }

    fn expect_date(&self, arg: &ExpressionKind) -> RepoResult<DateTime<Utc>> {
        let text = self.expect_text(arg)?;
        let date = NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .map_err(|_| self.invalid(format!("expected an ISO-8601 date, got {text:?}")))?;
        // Midnight UTC of the given date.
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists for every date");
        Ok(midnight.and_utc())
    }
}
