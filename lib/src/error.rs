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

//! The engine-wide error taxonomy.
//!
//! Every failure surfaced by the repository carries a machine-readable
//! [`ErrorKind`], a human message, and the contextual fields needed for logs.
//! Lower layers (backend, revset parser, merge drivers) have their own error
//! types which convert into [`RepoError`] at the facade boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Machine-readable error kind, one per [`RepoError`] variant.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(missing_docs)]
pub enum ErrorKind {
    // Lookup
    ChangeNotFound,
    OperationNotFound,
    BookmarkNotFound,
    TagNotFound,
    WorkspaceNotFound,
    FileNotFound,
    ConflictNotFound,
    // Validation
    InvalidChangeId,
    InvalidPath,
    InvalidBookmarkName,
    InvalidTagName,
    InvalidRevset,
    InvalidResolution,
    InvalidTimeUnit,
    InvalidArgument,
    AmbiguousOperation,
    // State
    DuplicateChange,
    BookmarkExists,
    TagExists,
    WorkspaceExists,
    WorkspaceNotEmpty,
    EventCancelled,
    NothingToUndo,
    NoCommonAncestor,
    NoChildren,
    NoParents,
    InsufficientChildren,
    CannotAbandon,
    CannotRevert,
    // Storage
    StorageReadFailed,
    StorageWriteFailed,
    StorageVersionMismatch,
    StorageCorrupt,
    SnapshotFailed,
    FileRestoreFailed,
    TreeReadFailed,
    DirectoryCreateFailed,
    FileMoveFailed,
    // Integration
    BackendSyncFailed,
    DriverFailed,
    DriverTimeout,
    WatchNotSupported,
    UnsupportedOperation,
}

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Any error returned by the repository facade or one of its stores.
#[derive(Debug, Error)]
#[expect(missing_docs)]
pub enum RepoError {
    #[error("Change {id} not found")]
    ChangeNotFound { id: String },
    #[error("Operation {id} not found")]
    OperationNotFound { id: String },
    #[error("Bookmark {name} not found")]
    BookmarkNotFound { name: String },
    #[error("Tag {name} not found")]
    TagNotFound { name: String },
    #[error("Workspace {name} not found")]
    WorkspaceNotFound { name: String },
    #[error("File {path} not found")]
    FileNotFound { path: String },
    #[error("Conflict {id} not found")]
    ConflictNotFound { id: String },

    #[error("Invalid change id {text:?}")]
    InvalidChangeId { text: String },
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("Invalid bookmark name {name:?}")]
    InvalidBookmarkName { name: String },
    #[error("Invalid tag name {name:?}")]
    InvalidTagName { name: String },
    #[error("Invalid revset {text:?}: {message}")]
    InvalidRevset { text: String, message: String },
    #[error("Invalid conflict resolution: {message}")]
    InvalidResolution { message: String },
    #[error("Invalid time unit {unit:?}")]
    InvalidTimeUnit { unit: String },
    #[error("{message}")]
    InvalidArgument { message: String },
    #[error("Operation id prefix {prefix} is ambiguous")]
    AmbiguousOperation { prefix: String },

    #[error("Change {id} already exists")]
    DuplicateChange { id: String },
    #[error("Bookmark {name} already exists")]
    BookmarkExists { name: String },
    #[error("Tag {name} already exists")]
    TagExists { name: String },
    #[error("Workspace {name} already exists")]
    WorkspaceExists { name: String },
    #[error("Workspace {name} is not empty")]
    WorkspaceNotEmpty { name: String },
    #[error("Operation {event} cancelled by listener: {reason}")]
    EventCancelled { event: String, reason: String },
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("No common ancestor of {a} and {b}")]
    NoCommonAncestor { a: String, b: String },
    #[error("Change {id} has no children")]
    NoChildren { id: String },
    #[error("Change {id} has no parents")]
    NoParents { id: String },
    #[error("Change {id} has too few descendant steps: wanted {wanted}, walked {walked}")]
    InsufficientChildren {
        id: String,
        wanted: usize,
        walked: usize,
    },
    #[error("Cannot abandon {id}: {reason}")]
    CannotAbandon { id: String, reason: String },
    #[error("Cannot revert to {id}: {reason}")]
    CannotRevert { id: String, reason: String },

    #[error("Failed to read {path}")]
    StorageReadFailed { path: PathBuf, source: DynError },
    #[error("Failed to write {path}")]
    StorageWriteFailed { path: PathBuf, source: DynError },
    #[error("Version mismatch in {path}: found {found}, expected {expected}")]
    StorageVersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("Corrupt record in {path}: {message}")]
    StorageCorrupt { path: PathBuf, message: String },
    #[error("Failed to snapshot {path}")]
    SnapshotFailed { path: String, source: DynError },
    #[error("Failed to restore file {path}")]
    FileRestoreFailed { path: String, source: DynError },
    #[error("Failed to read tree of change {id}: {message}")]
    TreeReadFailed { id: String, message: String },
    #[error("Failed to create directory {path}")]
    DirectoryCreateFailed { path: PathBuf, source: DynError },
    #[error("Failed to move {from} to {to}")]
    FileMoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: DynError,
    },

    #[error("Backend sync failed")]
    BackendSyncFailed { source: DynError },
    #[error("Merge driver {driver} failed on {path}: {message}")]
    DriverFailed {
        driver: String,
        path: String,
        message: String,
    },
    #[error("Merge driver {driver} timed out on {path} after {timeout_ms}ms")]
    DriverTimeout {
        driver: String,
        path: String,
        timeout_ms: u64,
    },
    #[error("Filesystem watching is not supported by this store")]
    WatchNotSupported,
    #[error("Unsupported operation {operation}: {message}")]
    UnsupportedOperation { operation: String, message: String },
}

impl RepoError {
    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ChangeNotFound { .. } => ErrorKind::ChangeNotFound,
            Self::OperationNotFound { .. } => ErrorKind::OperationNotFound,
            Self::BookmarkNotFound { .. } => ErrorKind::BookmarkNotFound,
            Self::TagNotFound { .. } => ErrorKind::TagNotFound,
            Self::WorkspaceNotFound { .. } => ErrorKind::WorkspaceNotFound,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::ConflictNotFound { .. } => ErrorKind::ConflictNotFound,
            Self::InvalidChangeId { .. } => ErrorKind::InvalidChangeId,
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::InvalidBookmarkName { .. } => ErrorKind::InvalidBookmarkName,
            Self::InvalidTagName { .. } => ErrorKind::InvalidTagName,
            Self::InvalidRevset { .. } => ErrorKind::InvalidRevset,
            Self::InvalidResolution { .. } => ErrorKind::InvalidResolution,
            Self::InvalidTimeUnit { .. } => ErrorKind::InvalidTimeUnit,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::AmbiguousOperation { .. } => ErrorKind::AmbiguousOperation,
            Self::DuplicateChange { .. } => ErrorKind::DuplicateChange,
            Self::BookmarkExists { .. } => ErrorKind::BookmarkExists,
            Self::TagExists { .. } => ErrorKind::TagExists,
            Self::WorkspaceExists { .. } => ErrorKind::WorkspaceExists,
            Self::WorkspaceNotEmpty { .. } => ErrorKind::WorkspaceNotEmpty,
            Self::EventCancelled { .. } => ErrorKind::EventCancelled,
            Self::NothingToUndo => ErrorKind::NothingToUndo,
            Self::NoCommonAncestor { .. } => ErrorKind::NoCommonAncestor,
            Self::NoChildren { .. } => ErrorKind::NoChildren,
            Self::NoParents { .. } => ErrorKind::NoParents,
            Self::InsufficientChildren { .. } => ErrorKind::InsufficientChildren,
            Self::CannotAbandon { .. } => ErrorKind::CannotAbandon,
            Self::CannotRevert { .. } => ErrorKind::CannotRevert,
            Self::StorageReadFailed { .. } => ErrorKind::StorageReadFailed,
            Self::StorageWriteFailed { .. } => ErrorKind::StorageWriteFailed,
            Self::StorageVersionMismatch { .. } => ErrorKind::StorageVersionMismatch,
            Self::StorageCorrupt { .. } => ErrorKind::StorageCorrupt,
            Self::SnapshotFailed { .. } => ErrorKind::SnapshotFailed,
            Self::FileRestoreFailed { .. } => ErrorKind::FileRestoreFailed,
            Self::TreeReadFailed { .. } => ErrorKind::TreeReadFailed,
            Self::DirectoryCreateFailed { .. } => ErrorKind::DirectoryCreateFailed,
            Self::FileMoveFailed { .. } => ErrorKind::FileMoveFailed,
            Self::BackendSyncFailed { .. } => ErrorKind::BackendSyncFailed,
            Self::DriverFailed { .. } => ErrorKind::DriverFailed,
            Self::DriverTimeout { .. } => ErrorKind::DriverTimeout,
            Self::WatchNotSupported => ErrorKind::WatchNotSupported,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
        }
    }

    /// A hint that may help the user recover, if one applies.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidBookmarkName { .. } | Self::InvalidTagName { .. } => Some(
                "Names must be non-empty, contain no whitespace or any of `* ~ ^ : ? [ ] \\`, \
                 no `..` or `//`, must not start or end with `.`, and must not end with `.lock`"
                    .to_string(),
            ),
            Self::AmbiguousOperation { prefix } => Some(format!(
                "Multiple operations start with {prefix}; use more digits"
            )),
            Self::NothingToUndo => Some("The operation log is empty".to_string()),
            Self::DriverTimeout { driver, .. } => Some(format!(
                "Raise the timeout for driver {driver} or let the default driver handle the file"
            )),
            Self::WorkspaceNotEmpty { name } => Some(format!(
                "Move or delete the files under workspace {name} first"
            )),
            _ => None,
        }
    }
}

/// Alias for engine results.
pub type RepoResult<T> = Result<T, RepoError>;
