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

//! First-class merge conflicts.
//!
//! A conflict is persisted data, not an error: detection records one
//! [`Conflict`] per disagreeing path and the repository keeps working.
//! Exactly one unresolved conflict may exist per path; conflicts survive
//! unrelated operations and disappear only on explicit resolution and
//! removal.

use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use rand::RngCore as _;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RepoError;
use crate::error::RepoResult;
use crate::object_id::ObjectId as _;
use crate::object_id::id_type;
use crate::repo_path::RepoPathBuf;

id_type!(
    /// Identifier of a conflict record.
    pub ConflictId
);

impl ConflictId {
    pub fn generate() -> Self {
        let mut bytes = vec![0; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

/// What kind of three-way disagreement produced a conflict.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    /// All three sides exist and all differ.
    Content,
    /// Deleted on the left, modified on the right.
    DeleteModify,
    /// Modified on the left, deleted on the right.
    ModifyDelete,
    /// Added on both sides with different contents.
    AddAdd,
    /// Directory/file or other tree-shape disagreement.
    Path,
    /// A merge driver reported a conflict it could not resolve.
    DriverConflict,
}

/// Serde adapter for optional byte contents, stored as hex.
mod serde_hex_opt {
    use serde::Deserialize as _;
    use serde::Deserializer;
    use serde::Serialize as _;
    use serde::Serializer;
    use serde::de::Error as _;

    use crate::hex_util;

    pub fn serialize<S: Serializer>(
        data: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        data.as_deref()
            .map(hex_util::encode_hex)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(hex) => hex_util::decode_hex(&hex)
                .map(Some)
                .ok_or_else(|| D::Error::custom("invalid hex content")),
        }
    }
}

/// The contents of the sides that participate in a conflict. An absent side
/// means the file did not exist there.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConflictSides {
    #[serde(default, with = "serde_hex_opt")]
    pub base: Option<Vec<u8>>,
    #[serde(default, with = "serde_hex_opt")]
    pub left: Option<Vec<u8>>,
    #[serde(default, with = "serde_hex_opt")]
    pub right: Option<Vec<u8>>,
}

/// Which side a resolution picks.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictSide {
    Ours,
    Theirs,
    Base,
}

/// A per-hunk side choice. With whole-file sides there is a single hunk at
/// index 0; the variant exists so partial resolutions stay representable.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResolvedHunk {
    pub index: usize,
    pub side: ConflictSide,
}

/// How a conflict was resolved.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Resolution {
    Side { side: ConflictSide },
    Content {
        #[serde(with = "crate::hex_util::serde_hex")]
        content: Vec<u8>,
    },
    Hunks { hunks: Vec<ResolvedHunk> },
    Manual,
}

/// A strategy applied across many conflicts at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolutionStrategy {
    Ours,
    Theirs,
    /// Concatenates left then right.
    Union,
}

/// A persisted conflict record.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: ConflictId,
    #[serde(rename = "type")]
    pub kind: ConflictType,
    pub path: RepoPathBuf,
    pub sides: ConflictSides,
    pub message: String,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn new(
        kind: ConflictType,
        path: RepoPathBuf,
        sides: ConflictSides,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::generate(),
            kind,
            path,
            sides,
            message: message.into(),
            resolved: false,
            resolution: None,
            timestamp,
            resolved_at: None,
        }
    }
}

/// The outcome of merging one file three ways.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FileMergeOutcome {
    /// No conflict; `None` means the file is absent in the merge result.
    Resolved(Option<Vec<u8>>),
    /// A conflict of the given type.
    Conflicted(ConflictType),
}

/// The three-way detection table. `None` means the file does not exist on
/// that side.
pub fn three_way_file(
    base: Option<&[u8]>,
    left: Option<&[u8]>,
    right: Option<&[u8]>,
) -> FileMergeOutcome {
    use FileMergeOutcome::Conflicted;
    use FileMergeOutcome::Resolved;
    match (base, left, right) {
        // Unchanged everywhere, or changed identically on both sides.
        (_, left, right) if left == right => Resolved(left.map(|c| c.to_vec())),
        // Changed on one side only.
        (base, left, right) if base == left => Resolved(right.map(|c| c.to_vec())),
        (base, left, right) if base == right => Resolved(left.map(|c| c.to_vec())),
        // Both sides changed, and disagree.
        (None, Some(_), Some(_)) => Conflicted(ConflictType::AddAdd),
        (Some(_), Some(_), None) => Conflicted(ConflictType::ModifyDelete),
        (Some(_), None, Some(_)) => Conflicted(ConflictType::DeleteModify),
        (Some(_), Some(_), Some(_)) => Conflicted(ConflictType::Content),
        // Deleted on both sides; other shapes are caught by the guards above.
        _ => Resolved(None),
    }
}

const MARKER_LEFT: &str = "<<<<<<< Left";
const MARKER_BASE: &str = "||||||| Base";
const MARKER_SEPARATOR: &str = "=======";
const MARKER_RIGHT: &str = ">>>>>>> Right";
const NO_EOL_NOTE: &str = " (no terminating newline)";

fn push_section(out: &mut Vec<u8>, marker: &str, content: &[u8]) {
    let missing_eol = !content.is_empty() && !content.ends_with(b"\n");
    out.extend_from_slice(marker.as_bytes());
    if missing_eol {
        out.extend_from_slice(NO_EOL_NOTE.as_bytes());
    }
    out.push(b'\n');
    out.extend_from_slice(content);
    if missing_eol {
        out.push(b'\n');
    }
}

/// Materializes a content conflict in the canonical marker form:
///
/// ```text
/// <<<<<<< Left
/// <left>
/// ||||||| Base
/// <base>
/// =======
/// <right>
/// >>>>>>> Right
/// ```
pub fn generate_conflict_markers(sides: &ConflictSides) -> Vec<u8> {
    let mut out = vec![];
    push_section(&mut out, MARKER_LEFT, sides.left.as_deref().unwrap_or(b""));
    push_section(&mut out, MARKER_BASE, sides.base.as_deref().unwrap_or(b""));
    push_section(
        &mut out,
        MARKER_SEPARATOR,
        sides.right.as_deref().unwrap_or(b""),
    );
    out.extend_from_slice(MARKER_RIGHT.as_bytes());
    out.push(b'\n');
    out
}

struct MarkerSection {
    content: Vec<u8>,
    strip_eol: bool,
}

/// Parses the canonical marker form back into its three sides. Returns
/// `None` if `content` is not exactly that form.
pub fn parse_conflict_markers(content: &[u8]) -> Option<ConflictSides> {
    let text = str::from_utf8(content).ok()?;
    let mut sections: Vec<MarkerSection> = vec![];
    let mut seen_markers = 0usize;
    for line in text.lines() {
        let marker = [MARKER_LEFT, MARKER_BASE, MARKER_SEPARATOR, MARKER_RIGHT]
            .get(seen_markers)
            .copied()
            .filter(|marker| {
                line == *marker || line == format!("{marker}{NO_EOL_NOTE}").as_str()
            });
        if let Some(marker) = marker {
            seen_markers += 1;
            if seen_markers < 4 {
                sections.push(MarkerSection {
                    content: vec![],
                    strip_eol: line.len() > marker.len(),
                });
            }
        } else {
            if seen_markers == 4 {
                // Trailing content after the closing marker.
                return None;
            }
            let section = sections.last_mut()?;
            section.content.extend_from_slice(line.as_bytes());
            section.content.push(b'\n');
        }
    }
    if seen_markers != 4 || sections.len() != 3 {
        return None;
    }
    let mut contents = sections.into_iter().map(|section| {
        let mut content = section.content;
        if section.strip_eol {
            content.pop();
        }
        content
    });
    let left = contents.next().unwrap();
    let base = contents.next().unwrap();
    let right = contents.next().unwrap();
    Some(ConflictSides {
        base: Some(base),
        left: Some(left),
        right: Some(right),
    })
}

impl ConflictSides {
    fn side_content(&self, side: ConflictSide) -> RepoResult<Vec<u8>> {
        let content = match side {
            ConflictSide::Ours => &self.left,
            ConflictSide::Theirs => &self.right,
            ConflictSide::Base => &self.base,
        };
        content.clone().ok_or_else(|| RepoError::InvalidResolution {
            message: format!("side {side:?} has no content"),
        })
    }
}

/// Builds the [`Resolution`] a bulk strategy produces for one conflict.
pub fn strategy_resolution(
    strategy: ResolutionStrategy,
    sides: &ConflictSides,
) -> RepoResult<Resolution> {
    match strategy {
        ResolutionStrategy::Ours => Ok(Resolution::Side {
            side: ConflictSide::Ours,
        }),
        ResolutionStrategy::Theirs => Ok(Resolution::Side {
            side: ConflictSide::Theirs,
        }),
        ResolutionStrategy::Union => {
            let mut content = sides.side_content(ConflictSide::Ours)?;
            content.extend_from_slice(&sides.side_content(ConflictSide::Theirs)?);
            Ok(Resolution::Content { content })
        }
    }
}

/// The bytes a resolution writes to the working copy, or `None` for a manual
/// resolution (the caller already wrote the file).
pub fn resolution_content(
    sides: &ConflictSides,
    resolution: &Resolution,
) -> RepoResult<Option<Vec<u8>>> {
    match resolution {
        Resolution::Side { side } => Ok(Some(sides.side_content(*side)?)),
        Resolution::Content { content } => Ok(Some(content.clone())),
        Resolution::Hunks { hunks } => {
            if hunks.is_empty() {
                return Err(RepoError::InvalidResolution {
                    message: "hunk resolution picks no hunks".to_string(),
                });
            }
            let mut sorted = hunks.clone();
            sorted.sort_by_key(|hunk| hunk.index);
            let mut content = vec![];
            for hunk in &sorted {
                content.extend_from_slice(&sides.side_content(hunk.side)?);
            }
            Ok(Some(content))
        }
        Resolution::Manual => Ok(None),
    }
}

/// On-disk form of the conflict store (`conflicts.json`); also embedded in
/// operation views as the pre-operation conflicts snapshot.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictsRecord {
    pub conflicts: BTreeMap<ConflictId, Conflict>,
    pub file_conflicts: BTreeMap<RepoPathBuf, ConflictId>,
}

#[derive(Clone, Debug, Default)]
pub struct ConflictStore {
    conflicts: BTreeMap<ConflictId, Conflict>,
    // Active (unresolved) conflict per path; at most one.
    file_conflicts: BTreeMap<RepoPathBuf, ConflictId>,
}

impl ConflictStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(record: ConflictsRecord) -> Self {
        Self {
            conflicts: record.conflicts,
            file_conflicts: record.file_conflicts,
        }
    }

    pub fn to_record(&self) -> ConflictsRecord {
        ConflictsRecord {
            conflicts: self.conflicts.clone(),
            file_conflicts: self.file_conflicts.clone(),
        }
    }

    pub fn restore(&mut self, record: ConflictsRecord) {
        self.conflicts = record.conflicts;
        self.file_conflicts = record.file_conflicts;
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn get(&self, id: &ConflictId) -> Option<&Conflict> {
        self.conflicts.get(id)
    }

    pub fn get_or_err(&self, id: &ConflictId) -> RepoResult<&Conflict> {
        self.get(id)
            .ok_or_else(|| RepoError::ConflictNotFound { id: id.hex() })
    }

    /// The active (unresolved) conflict on `path`, if any.
    pub fn active_for_path(&self, path: &RepoPathBuf) -> Option<&Conflict> {
        let id = self.file_conflicts.get(path)?;
        self.conflicts.get(id).filter(|conflict| !conflict.resolved)
    }

    pub fn list(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values().filter(|conflict| !conflict.resolved)
    }

    /// Inserts a conflict, replacing any active conflict on the same path so
    /// that at most one unresolved conflict exists per path.
    pub fn insert(&mut self, conflict: Conflict) {
        if let Some(existing) = self.file_conflicts.get(&conflict.path).cloned()
            && self
                .conflicts
                .get(&existing)
                .is_some_and(|conflict| !conflict.resolved)
        {
            self.conflicts.remove(&existing);
        }
        self.file_conflicts
            .insert(conflict.path.clone(), conflict.id.clone());
        self.conflicts.insert(conflict.id.clone(), conflict);
    }

    /// Transitions a conflict to resolved. Fails if it is already resolved
    /// or the resolution does not apply to its sides.
    pub fn mark_resolved(
        &mut self,
        id: &ConflictId,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    ) -> RepoResult<&Conflict> {
        // Validate before mutating.
        let conflict = self.get_or_err(id)?;
        if conflict.resolved {
            return Err(RepoError::InvalidResolution {
                message: format!("conflict {id} is already resolved"),
            });
        }
        resolution_content(&conflict.sides, &resolution)?;

        let conflict = self.conflicts.get_mut(id).unwrap();
        conflict.resolved = true;
        conflict.resolution = Some(resolution);
        conflict.resolved_at = Some(resolved_at);
        Ok(conflict)
    }

    /// Removes a conflict record entirely. Called when the resolving change
    /// is committed forward.
    pub fn remove(&mut self, id: &ConflictId) -> RepoResult<Conflict> {
        let conflict = self
            .conflicts
            .remove(id)
            .ok_or_else(|| RepoError::ConflictNotFound { id: id.hex() })?;
        if self.file_conflicts.get(&conflict.path) == Some(id) {
            self.file_conflicts.remove(&conflict.path);
        }
        Ok(conflict)
    }

    /// Drops resolved conflicts, keeping active ones. Returns the removed
    /// records.
    pub fn sweep_resolved(&mut self) -> Vec<Conflict> {
        let resolved: Vec<ConflictId> = self
            .conflicts
            .values()
            .filter(|conflict| conflict.resolved)
            .map(|conflict| conflict.id.clone())
            .collect();
        resolved
            .into_iter()
            .map(|id| self.remove(&id).unwrap())
            .collect()
    }
}
