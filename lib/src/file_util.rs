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

//! Durable whole-file replacement.
//!
//! Every persisted record in the repository is replaced as a unit: the new
//! content goes into a uniquely named temporary file in the target's own
//! directory, is flushed to disk, and is then renamed over the target.
//! Concurrent readers observe either the old record or the new one, never a
//! torn mix, which is what makes multi-process access safe without locks.

use std::io;
use std::io::Write as _;
use std::path::Path;

use tempfile::NamedTempFile;

/// Atomically replaces the file at `target` with `bytes`.
///
/// The temporary file lives in `target`'s directory, so the rename cannot
/// cross filesystems. Content is synced before the rename; after a crash the
/// target either still holds its previous record or holds the new one in
/// full. The rename itself may be lost on crash if the directory entry was
/// not yet durable, which callers accept for repository records (the prior
/// record remains valid).
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_data()?;
    // On Unix the rename replaces an existing target in one step. On
    // Windows replacement can fail while another handle is open; the caller
    // sees that as a storage write failure and the old record survives.
    temp_file.persist(target).map_err(|err| err.error)?;
    Ok(())
}
