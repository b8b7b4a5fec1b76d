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

//! Library for Strata, a change-centric version control engine.
//!
//! Strata layers a stable-identity change model on top of a content-addressed
//! commit store: every file edit is captured in the working-copy change,
//! history rewriting is routine (descendants follow automatically), merge
//! conflicts are first-class persisted data, and every mutation lands in an
//! append-only operation log that supports exact time travel and undo.
//!
//! The entry point is [`repo::Repository`].

#![warn(missing_docs)]

pub mod backend;
pub mod conflicts;
pub mod error;
pub mod event;
pub mod file_util;
pub mod fsmonitor;
pub mod graph;
pub mod hex_util;
pub mod merge_driver;
pub mod object_id;
pub mod op_store;
pub mod refs;
pub mod repo;
pub mod repo_path;
pub mod revset;
pub mod revset_parser;
pub mod settings;
pub mod store;
pub mod sync;
pub mod working_copy;
