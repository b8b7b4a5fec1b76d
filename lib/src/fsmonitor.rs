// Copyright 2026 The Strata Authors
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

//! Debounced auto-snapshot queue.
//!
//! File watchers are an external collaborator; they feed change events into
//! this queue. Events under the engine's control directory are ignored, and
//! a snapshot is released only after a quiet period with no further events.
//! The owner drains the queue between user-initiated operations, so queued
//! snapshots never interleave with them.

use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use crate::repo_path::RepoPathBuf;
use crate::working_copy::CONTROL_DIR;

/// Default quiet period before a snapshot is released.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct SnapshotQueue {
    pending: BTreeSet<RepoPathBuf>,
    last_event: Option<Instant>,
    quiet_period: Duration,
}

impl Default for SnapshotQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotQueue {
    pub fn new() -> Self {
        Self {
            pending: BTreeSet::new(),
            last_event: None,
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }

    pub fn with_quiet_period(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            ..Self::new()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Records a filesystem change event. Events under the control directory
    /// are ignored.
    pub fn note_change(&mut self, path: RepoPathBuf, now: Instant) {
        if path.components().next() == Some(CONTROL_DIR) {
            return;
        }
        tracing::debug!(%path, "queued filesystem change");
        self.pending.insert(path);
        self.last_event = Some(now);
    }

    /// Releases the pending paths if the quiet period has elapsed since the
    /// last event, else `None`. Draining resets the queue.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<RepoPathBuf>> {
        let last_event = self.last_event?;
        if now.duration_since(last_event) < self.quiet_period {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.pending).into_iter().collect())
    }
}
