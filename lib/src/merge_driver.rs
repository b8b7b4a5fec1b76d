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

//! Content-aware merge drivers.
//!
//! Drivers are user-supplied functions dispatched by glob pattern per file
//! before the default three-way detection runs. Driver code is untrusted: it
//! runs on a separate thread under a wall-clock timeout and its output is
//! validated before acceptance. In lenient mode a failing driver falls back
//! to the default three-way driver; in strict mode the failure surfaces.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use globset::GlobBuilder;
use itertools::Itertools as _;

use crate::backend::FileMap;
use crate::conflicts::Conflict;
use crate::conflicts::ConflictSides;
use crate::conflicts::ConflictType;
use crate::conflicts::FileMergeOutcome;
use crate::conflicts::generate_conflict_markers;
use crate::conflicts::three_way_file;
use crate::error::RepoError;
use crate::error::RepoResult;
use crate::repo_path::RepoPathBuf;

/// Default wall-clock timeout for a driver invocation.
pub const DEFAULT_DRIVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Extensions classified as binary without content inspection.
const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "a", "avi", "bin", "bmp", "bz2", "class", "dll", "dylib", "exe", "gif", "gz", "ico",
    "jar", "jpeg", "jpg", "mov", "mp3", "mp4", "o", "otf", "pdf", "png", "so", "tar", "ttf",
    "wasm", "webm", "webp", "woff", "woff2", "xz", "zip",
];

/// Whether `content` at `path` should be treated as binary: extension
/// allowlist first, then content inspection (null byte or >30% non-printable
/// bytes in the leading window).
pub fn is_binary(path: &RepoPathBuf, content: &[u8]) -> bool {
    if let Some(extension) = path.extension()
        && BINARY_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
    {
        return true;
    }
    let window = &content[..content.len().min(8192)];
    if window.contains(&0) {
        return true;
    }
    if window.is_empty() {
        return false;
    }
    let non_printable = window
        .iter()
        .filter(|&&b| !(0x20..0x7f).contains(&b) && !b"\n\r\t".contains(&b))
        .count();
    non_printable * 100 > window.len() * 30
}

/// What a driver returns for one file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DriverOutcome {
    pub content: Vec<u8>,
    pub has_conflict: bool,
    /// Driver-provided detail about remaining conflicts.
    pub message: Option<String>,
}

/// Extra context passed to drivers.
#[derive(Clone, Debug, Default)]
pub struct DriverContext {
    pub metadata: BTreeMap<String, String>,
}

type DriverFn =
    Arc<dyn Fn(&RepoPathBuf, &ConflictSides, &DriverContext) -> Result<DriverOutcome, String> + Send + Sync>;

/// A registered merge driver.
#[derive(Clone)]
pub struct MergeDriver {
    pub name: String,
    pub patterns: Vec<String>,
    pub accepts_text: bool,
    pub accepts_binary: bool,
    pub timeout: Duration,
    func: DriverFn,
}

impl std::fmt::Debug for MergeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeDriver")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl MergeDriver {
    pub fn new(
        name: impl Into<String>,
        patterns: Vec<String>,
        func: impl Fn(&RepoPathBuf, &ConflictSides, &DriverContext) -> Result<DriverOutcome, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            patterns,
            accepts_text: true,
            accepts_binary: false,
            timeout: DEFAULT_DRIVER_TIMEOUT,
            func: Arc::new(func),
        }
    }

    pub fn accepts(mut self, text: bool, binary: bool) -> Self {
        self.accepts_text = text;
        self.accepts_binary = binary;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Specificity of the best pattern matching `path`: the number of
    /// non-wildcard characters. `None` if no pattern matches.
    fn match_specificity(&self, path: &RepoPathBuf) -> Option<usize> {
        self.patterns
            .iter()
            .filter(|pattern| {
                GlobBuilder::new(pattern)
                    .literal_separator(false)
                    .build()
                    .map(|glob| glob.compile_matcher().is_match(path.as_str()))
                    .unwrap_or(false)
            })
            .map(|pattern| {
                pattern
                    .chars()
                    .filter(|c| !matches!(c, '*' | '?' | '[' | ']'))
                    .count()
            })
            .max()
    }
}

enum DriverRun {
    Completed(DriverOutcome),
    Failed(String),
    TimedOut,
}

fn run_driver(
    driver: &MergeDriver,
    path: &RepoPathBuf,
    sides: &ConflictSides,
    context: &DriverContext,
) -> DriverRun {
    let (sender, receiver) = mpsc::channel();
    let func = driver.func.clone();
    let path = path.clone();
    let sides = sides.clone();
    let context = context.clone();
    thread::spawn(move || {
        let _ = sender.send(func(&path, &sides, &context));
    });
    match receiver.recv_timeout(driver.timeout) {
        Ok(Ok(outcome)) => DriverRun::Completed(outcome),
        Ok(Err(message)) => DriverRun::Failed(message),
        Err(_) => DriverRun::TimedOut,
    }
}

/// The result of merging two file trees against a base.
#[derive(Debug, Default)]
pub struct MergedTree {
    pub files: FileMap,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Default)]
pub struct MergeDriverRegistry {
    drivers: Vec<MergeDriver>,
    strict: bool,
}

impl MergeDriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// In strict mode driver failures surface as errors instead of falling
    /// back to the default driver.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn register(&mut self, driver: MergeDriver) {
        tracing::debug!(name = %driver.name, patterns = ?driver.patterns, "registered merge driver");
        self.drivers.push(driver);
    }

    /// Selects the most specific registered driver for `path` whose accepts
    /// flags match the binary/text classification. Ties go to the earliest
    /// registration.
    pub fn select(&self, path: &RepoPathBuf, binary: bool) -> Option<&MergeDriver> {
        self.drivers
            .iter()
            .filter(|driver| {
                if binary {
                    driver.accepts_binary
                } else {
                    driver.accepts_text
                }
            })
            .filter_map(|driver| driver.match_specificity(path).map(|score| (driver, score)))
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(driver, _)| driver)
    }

    /// Merges `left` and `right` against `base`, file by file. A custom
    /// per-merge driver takes precedence over registered drivers; both take
    /// precedence over the default three-way detection.
    pub fn merge_trees(
        &self,
        base: &FileMap,
        left: &FileMap,
        right: &FileMap,
        custom: Option<&MergeDriver>,
        context: &DriverContext,
        timestamp: DateTime<Utc>,
    ) -> RepoResult<MergedTree> {
        let mut merged = MergedTree::default();
        let paths: Vec<&RepoPathBuf> = base
            .keys()
            .chain(left.keys())
            .chain(right.keys())
            .sorted()
            .dedup()
            .collect();
        for path in paths {
            let sides = ConflictSides {
                base: base.get(path).cloned(),
                left: left.get(path).cloned(),
                right: right.get(path).cloned(),
            };
            self.merge_file(path, sides, custom, context, timestamp, &mut merged)?;
        }
        Ok(merged)
    }

    fn merge_file(
        &self,
        path: &RepoPathBuf,
        sides: ConflictSides,
        custom: Option<&MergeDriver>,
        context: &DriverContext,
        timestamp: DateTime<Utc>,
        merged: &mut MergedTree,
    ) -> RepoResult<()> {
        // Trivial resolutions never reach a driver.
        if let FileMergeOutcome::Resolved(_) = three_way_file(
            sides.base.as_deref(),
            sides.left.as_deref(),
            sides.right.as_deref(),
        ) {
            return self.default_merge(path, sides, None, timestamp, merged);
        }
        let sample = sides
            .left
            .as_deref()
            .or(sides.right.as_deref())
            .or(sides.base.as_deref())
            .unwrap_or(b"");
        let binary = is_binary(path, sample);
        let driver = custom.or_else(|| self.select(path, binary));

        if let Some(driver) = driver {
            match run_driver(driver, path, &sides, context) {
                DriverRun::Completed(outcome) => {
                    if outcome.has_conflict {
                        let message = outcome
                            .message
                            .unwrap_or_else(|| format!("driver {} reported a conflict", driver.name));
                        merged.files.insert(path.clone(), outcome.content);
                        merged.conflicts.push(Conflict::new(
                            ConflictType::DriverConflict,
                            path.clone(),
                            sides,
                            message,
                            timestamp,
                        ));
                    } else {
                        merged.files.insert(path.clone(), outcome.content);
                    }
                    return Ok(());
                }
                DriverRun::Failed(message) => {
                    if self.strict {
                        return Err(RepoError::DriverFailed {
                            driver: driver.name.clone(),
                            path: path.to_string(),
                            message,
                        });
                    }
                    tracing::warn!(driver = %driver.name, %path, %message, "merge driver failed; using default driver");
                    return self.default_merge(
                        path,
                        sides,
                        Some(format!("driver-failed=true: {message}")),
                        timestamp,
                        merged,
                    );
                }
                DriverRun::TimedOut => {
                    if self.strict {
                        return Err(RepoError::DriverTimeout {
                            driver: driver.name.clone(),
                            path: path.to_string(),
                            timeout_ms: driver.timeout.as_millis() as u64,
                        });
                    }
                    tracing::warn!(driver = %driver.name, %path, "merge driver timed out; using default driver");
                    return self.default_merge(
                        path,
                        sides,
                        Some("driver-failed=true: timed out".to_string()),
                        timestamp,
                        merged,
                    );
                }
            }
        }
        self.default_merge(path, sides, None, timestamp, merged)
    }

    fn default_merge(
        &self,
        path: &RepoPathBuf,
        sides: ConflictSides,
        annotation: Option<String>,
        timestamp: DateTime<Utc>,
        merged: &mut MergedTree,
    ) -> RepoResult<()> {
        match three_way_file(
            sides.base.as_deref(),
            sides.left.as_deref(),
            sides.right.as_deref(),
        ) {
            FileMergeOutcome::Resolved(None) => {}
            FileMergeOutcome::Resolved(Some(content)) => {
                merged.files.insert(path.clone(), content);
            }
            FileMergeOutcome::Conflicted(kind) => {
                let content = match kind {
                    // Content disagreements materialize as marker text.
                    ConflictType::Content | ConflictType::AddAdd => {
                        generate_conflict_markers(&sides)
                    }
                    // One side deleted: keep the surviving side's content.
                    _ => sides
                        .left
                        .clone()
                        .or_else(|| sides.right.clone())
                        .unwrap_or_default(),
                };
                merged.files.insert(path.clone(), content);
                let message = match annotation {
                    Some(annotation) => format!("{} on {path} ({annotation})", kind_message(kind)),
                    None => format!("{} on {path}", kind_message(kind)),
                };
                merged
                    .conflicts
                    .push(Conflict::new(kind, path.clone(), sides, message, timestamp));
            }
        }
        Ok(())
    }
}

fn kind_message(kind: ConflictType) -> &'static str {
    match kind {
        ConflictType::Content => "content conflict",
        ConflictType::DeleteModify => "delete/modify conflict",
        ConflictType::ModifyDelete => "modify/delete conflict",
        ConflictType::AddAdd => "add/add conflict",
        ConflictType::Path => "path conflict",
        ConflictType::DriverConflict => "driver conflict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_path(value: &str) -> RepoPathBuf {
        RepoPathBuf::from_internal_string(value).unwrap()
    }

    fn file_map(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(path, content)| (repo_path(path), content.as_bytes().to_vec()))
            .collect()
    }

    fn merge(
        registry: &MergeDriverRegistry,
        base: &[(&str, &str)],
        left: &[(&str, &str)],
        right: &[(&str, &str)],
    ) -> MergedTree {
        registry
            .merge_trees(
                &file_map(base),
                &file_map(left),
                &file_map(right),
                None,
                &DriverContext::default(),
                DateTime::UNIX_EPOCH,
            )
            .unwrap()
    }

    #[test]
    fn test_binary_classification() {
        assert!(is_binary(&repo_path("logo.png"), b"not sniffed"));
        assert!(is_binary(&repo_path("a.txt"), b"nul\x00byte"));
        assert!(is_binary(
            &repo_path("a.txt"),
            b"\x01\x02\x03\x04\x05\x06\x07ab"
        ));
        assert!(!is_binary(&repo_path("a.txt"), b"plain text\nwith lines\n"));
        assert!(!is_binary(&repo_path("empty.txt"), b""));
    }

    #[test]
    fn test_default_merge_takes_unchanged_sides() {
        let registry = MergeDriverRegistry::new();
        let merged = merge(
            &registry,
            &[("s", "v0"), ("gone", "x")],
            &[("s", "v0"), ("gone", "x"), ("new", "added")],
            &[("s", "v1")],
        );
        assert!(merged.conflicts.is_empty());
        assert_eq!(
            merged.files,
            file_map(&[("s", "v1"), ("new", "added")])
        );
    }

    #[test]
    fn test_default_merge_detects_content_conflict() {
        let registry = MergeDriverRegistry::new();
        let merged = merge(&registry, &[("s", "v0\n")], &[("s", "A\n")], &[("s", "B\n")]);
        assert_eq!(merged.conflicts.len(), 1);
        let conflict = &merged.conflicts[0];
        assert_eq!(conflict.kind, ConflictType::Content);
        assert_eq!(conflict.path, repo_path("s"));
        let materialized = str::from_utf8(&merged.files[&repo_path("s")]).unwrap();
        assert!(materialized.starts_with("<<<<<<< Left\n"));
        assert!(materialized.ends_with(">>>>>>> Right\n"));
    }

    #[test]
    fn test_most_specific_driver_wins() {
        let mut registry = MergeDriverRegistry::new();
        registry.register(MergeDriver::new("any", vec!["*".to_string()], |_, _, _| {
            Ok(DriverOutcome {
                content: b"any".to_vec(),
                has_conflict: false,
                message: None,
            })
        }));
        registry.register(MergeDriver::new(
            "json",
            vec!["*.json".to_string()],
            |_, _, _| {
                Ok(DriverOutcome {
                    content: b"json".to_vec(),
                    has_conflict: false,
                    message: None,
                })
            },
        ));

        let selected = registry.select(&repo_path("package.json"), false).unwrap();
        assert_eq!(selected.name, "json");
        let selected = registry.select(&repo_path("readme.md"), false).unwrap();
        assert_eq!(selected.name, "any");
        // Binary files only dispatch to drivers that accept them.
        assert!(registry.select(&repo_path("logo.png"), true).is_none());
    }

    #[test]
    fn test_driver_conflict_outcome() {
        let mut registry = MergeDriverRegistry::new();
        registry.register(MergeDriver::new(
            "partial",
            vec!["*.cfg".to_string()],
            |_, _, _| {
                Ok(DriverOutcome {
                    content: b"partially merged".to_vec(),
                    has_conflict: true,
                    message: Some("two keys clashed".to_string()),
                })
            },
        ));
        let merged = merge(
            &registry,
            &[("a.cfg", "v0")],
            &[("a.cfg", "A")],
            &[("a.cfg", "B")],
        );
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].kind, ConflictType::DriverConflict);
        assert_eq!(merged.conflicts[0].message, "two keys clashed");
        assert_eq!(merged.files[&repo_path("a.cfg")], b"partially merged");
    }

    #[test]
    fn test_failing_driver_falls_back_in_lenient_mode() {
        let mut registry = MergeDriverRegistry::new();
        registry.register(MergeDriver::new(
            "broken",
            vec!["*.cfg".to_string()],
            |_, _, _| Err("boom".to_string()),
        ));
        let merged = merge(
            &registry,
            &[("a.cfg", "v0\n")],
            &[("a.cfg", "A\n")],
            &[("a.cfg", "B\n")],
        );
        assert_eq!(merged.conflicts.len(), 1);
        assert_eq!(merged.conflicts[0].kind, ConflictType::Content);
        assert!(merged.conflicts[0].message.contains("driver-failed=true"));
        assert!(merged.conflicts[0].message.contains("boom"));
    }

    #[test]
    fn test_failing_driver_surfaces_in_strict_mode() {
        let mut registry = MergeDriverRegistry::new();
        registry.set_strict(true);
        registry.register(MergeDriver::new(
            "broken",
            vec!["*.cfg".to_string()],
            |_, _, _| Err("boom".to_string()),
        ));
        let err = registry
            .merge_trees(
                &file_map(&[("a.cfg", "v0")]),
                &file_map(&[("a.cfg", "A")]),
                &file_map(&[("a.cfg", "B")]),
                None,
                &DriverContext::default(),
                DateTime::UNIX_EPOCH,
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DriverFailed);
    }

    #[test]
    fn test_driver_timeout() {
        let mut registry = MergeDriverRegistry::new();
        registry.set_strict(true);
        registry.register(
            MergeDriver::new("slow", vec!["*.cfg".to_string()], |_, _, _| {
                thread::sleep(Duration::from_secs(60));
                Ok(DriverOutcome {
                    content: vec![],
                    has_conflict: false,
                    message: None,
                })
            })
            .with_timeout(Duration::from_millis(50)),
        );
        let err = registry
            .merge_trees(
                &file_map(&[]),
                &file_map(&[("a.cfg", "A")]),
                &file_map(&[("a.cfg", "B")]),
                None,
                &DriverContext::default(),
                DateTime::UNIX_EPOCH,
            )
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DriverTimeout);
    }

    #[test]
    fn test_custom_driver_takes_precedence() {
        let mut registry = MergeDriverRegistry::new();
        registry.register(MergeDriver::new(
            "registered",
            vec!["*".to_string()],
            |_, _, _| {
                Ok(DriverOutcome {
                    content: b"registered".to_vec(),
                    has_conflict: false,
                    message: None,
                })
            },
        ));
        let custom = MergeDriver::new("custom", vec!["*".to_string()], |_, _, _| {
            Ok(DriverOutcome {
                content: b"custom".to_vec(),
                has_conflict: false,
                message: None,
            })
        });
        let merged = registry
            .merge_trees(
                &file_map(&[("s", "v0")]),
                &file_map(&[("s", "A")]),
                &file_map(&[("s", "B")]),
                Some(&custom),
                &DriverContext::default(),
                DateTime::UNIX_EPOCH,
            )
            .unwrap();
        assert_eq!(merged.files[&repo_path("s")], b"custom");
    }
}
