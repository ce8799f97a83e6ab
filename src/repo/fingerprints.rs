/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use relative_path::RelativePath;

use super::{DatasetId, DraftId, VersionId};
use crate::chunk::FileFingerprints;
use crate::store::{ContentStore, EntryKey};

/// Identifies the draft or version a set of fingerprints belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintKey {
    Draft(DraftId),
    Version(DatasetId, VersionId),
}

impl FingerprintKey {
    fn entry(self) -> EntryKey {
        match self {
            FingerprintKey::Draft(id) => EntryKey::DraftFingerprints(id),
            FingerprintKey::Version(dataset, version) => {
                EntryKey::VersionFingerprints(dataset, version)
            }
        }
    }
}

/// Return `old` with every file in `new` added, replacing files with the same path.
pub fn merge(old: &FileFingerprints, new: &FileFingerprints) -> FileFingerprints {
    let mut merged = old.clone();
    merged.extend(
        new.iter()
            .map(|(path, chunks)| (path.to_relative_path_buf(), chunks.to_vec())),
    );
    merged
}

/// Persists the fingerprints of drafts and versions in a [`ContentStore`].
///
/// This does no locking of its own. Callers must hold the lock of the draft whose fingerprints
/// they update.
#[derive(Debug)]
pub struct FingerprintStore<'a, S: ContentStore> {
    store: &'a S,
}

impl<'a, S: ContentStore> FingerprintStore<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Load the fingerprints stored under `key`.
    ///
    /// A draft or version with no fingerprint blob has no files, so this returns an empty value.
    ///
    /// # Errors
    /// - `Error::Deserialize`: The stored blob is not valid.
    /// - `Error::UnsupportedFormat`: The stored blob has an unknown format version.
    /// - `Error::Io`: An I/O error occurred.
    pub fn load(&self, key: FingerprintKey) -> crate::Result<FileFingerprints> {
        match self.store.read(&self.store.path_for(key.entry()))? {
            Some(blob) => FileFingerprints::decode(&blob),
            None => Ok(FileFingerprints::new()),
        }
    }

    /// Atomically replace the fingerprints stored under `key`.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    pub fn save(&self, key: FingerprintKey, fingerprints: &FileFingerprints) -> crate::Result<()> {
        self.store
            .write_atomic(&self.store.path_for(key.entry()), &fingerprints.encode())
    }

    /// Merge `new` into the fingerprints stored under `key` and return the result.
    pub fn update(
        &self,
        key: FingerprintKey,
        new: &FileFingerprints,
    ) -> crate::Result<FileFingerprints> {
        let merged = merge(&self.load(key)?, new);
        self.save(key, &merged)?;
        Ok(merged)
    }

    /// Remove the file at `path` and every file below it from the fingerprints under `key`.
    ///
    /// This returns the number of files removed.
    pub fn remove_path(&self, key: FingerprintKey, path: &RelativePath) -> crate::Result<usize> {
        let mut fingerprints = self.load(key)?;
        let removed = fingerprints.remove_prefix(path);
        if removed > 0 {
            self.save(key, &fingerprints)?;
        }
        Ok(removed)
    }
}
