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

use std::path::{Path, PathBuf};

use super::fingerprints::{merge, FingerprintKey, FingerprintStore};
use crate::chunk::FileFingerprints;
use crate::store::ContentStore;

/// A completed change to the files or fingerprints of a draft.
#[derive(Debug)]
enum Change {
    /// A directory which didn't exist was created, along with everything below it.
    CreatedDirectory(PathBuf),

    /// The file which was at `original` was moved to `backup`.
    MovedAside { original: PathBuf, backup: PathBuf },

    /// A staged file was moved to this path.
    Placed(PathBuf),

    /// The fingerprints were saved, replacing these.
    SavedFingerprints(FileFingerprints),
}

/// The state of moving staged uploads into a draft, which can be undone until it is committed.
///
/// Files replaced by an upload are kept in the temporary directory of the store until the
/// replacement is committed, so a failure at any step leaves the draft as it was.
#[derive(Debug)]
pub(super) struct Replacement<'a, S: ContentStore> {
    store: &'a S,
    key: FingerprintKey,
    completed: Vec<Change>,
}

impl<'a, S: ContentStore> Replacement<'a, S> {
    pub fn new(store: &'a S, key: FingerprintKey) -> Self {
        Self {
            store,
            key,
            completed: Vec::new(),
        }
    }

    /// Create the directory at `path` and any missing parents.
    pub fn create_dir(&mut self, path: &Path) -> crate::Result<()> {
        let topmost_missing = path
            .ancestors()
            .take_while(|ancestor| !self.store.exists(ancestor))
            .last();
        if let Some(created) = topmost_missing {
            // Recorded first so a partially created tree is removed as well.
            self.completed
                .push(Change::CreatedDirectory(created.to_path_buf()));
            self.store.create_dir(path)?;
        }
        Ok(())
    }

    /// Move the staged file at `staged` to `destination`, keeping any file already there.
    pub fn place(&mut self, staged: &Path, destination: &Path) -> crate::Result<()> {
        if let Some(parent) = destination.parent() {
            self.create_dir(parent)?;
        }

        if self.store.exists(destination) {
            let backup = self.store.temp_path();
            self.store.move_entry(destination, &backup)?;
            self.completed.push(Change::MovedAside {
                original: destination.to_path_buf(),
                backup,
            });
        }

        self.store.move_entry(staged, destination)?;
        self.completed
            .push(Change::Placed(destination.to_path_buf()));
        Ok(())
    }

    /// Merge `new` into the stored fingerprints and return the result.
    pub fn update_fingerprints(&mut self, new: &FileFingerprints) -> crate::Result<FileFingerprints> {
        let fingerprints = FingerprintStore::new(self.store);
        let old = fingerprints.load(self.key)?;
        let merged = merge(&old, new);
        fingerprints.save(self.key, &merged)?;
        self.completed.push(Change::SavedFingerprints(old));
        Ok(merged)
    }

    /// Discard the files which were replaced.
    pub fn commit(self) {
        for change in &self.completed {
            if let Change::MovedAside { backup, .. } = change {
                if let Err(error) = self.store.permanently_remove(backup) {
                    tracing::warn!(
                        backup = %backup.display(),
                        %error,
                        "failed to remove replaced file"
                    );
                }
            }
        }
    }

    /// Undo every completed change, newest first.
    pub fn roll_back(&mut self) {
        while let Some(change) = self.completed.pop() {
            let result = match &change {
                Change::SavedFingerprints(old) => FingerprintStore::new(self.store).save(self.key, old),
                Change::Placed(path) => self.store.permanently_remove(path),
                Change::MovedAside { original, backup } => self.store.move_entry(backup, original),
                Change::CreatedDirectory(path) => self.store.permanently_remove(path),
            };
            if let Err(error) = result {
                tracing::warn!(?change, %error, "failed to undo upload step");
            }
        }
    }
}
