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

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use static_assertions::assert_obj_safe;

use crate::repo::{DatasetId, DraftId, VersionId};

/// The name of the file which holds the record of a draft, dataset, or version.
pub const RECORD_FILE: &str = "record";

/// The name of the file which holds the fingerprint blob of a draft or version.
pub const FINGERPRINTS_FILE: &str = "fingerprints";

/// The name of the directory which holds the files of a draft or version.
pub const DATA_DIRECTORY: &str = "data";

const DRAFTS_DIRECTORY: &str = "drafts";
const DATASETS_DIRECTORY: &str = "datasets";
const VERSIONS_DIRECTORY: &str = "versions";

/// A location in a [`ContentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKey {
    /// The directory containing every draft.
    Drafts,

    /// The root directory of a draft.
    Draft(DraftId),

    /// The record of a draft.
    DraftRecord(DraftId),

    /// The directory of files in a draft.
    DraftData(DraftId),

    /// The fingerprint blob of a draft.
    DraftFingerprints(DraftId),

    /// The directory containing every dataset.
    Datasets,

    /// The root directory of a dataset.
    Dataset(DatasetId),

    /// The record of a dataset, which points to its current version.
    DatasetRecord(DatasetId),

    /// The directory containing every version of a dataset.
    Versions(DatasetId),

    /// The root directory of a version.
    Version(DatasetId, VersionId),

    /// The record of a version.
    VersionRecord(DatasetId, VersionId),

    /// The directory of files in a version.
    VersionData(DatasetId, VersionId),

    /// The fingerprint blob of a version.
    VersionFingerprints(DatasetId, VersionId),
}

impl EntryKey {
    /// The path of this entry relative to the root of the store.
    pub fn relative_path(&self) -> PathBuf {
        match *self {
            EntryKey::Drafts => PathBuf::from(DRAFTS_DIRECTORY),
            EntryKey::Draft(id) => EntryKey::Drafts.relative_path().join(id.to_string()),
            EntryKey::DraftRecord(id) => EntryKey::Draft(id).relative_path().join(RECORD_FILE),
            EntryKey::DraftData(id) => EntryKey::Draft(id).relative_path().join(DATA_DIRECTORY),
            EntryKey::DraftFingerprints(id) => {
                EntryKey::Draft(id).relative_path().join(FINGERPRINTS_FILE)
            }
            EntryKey::Datasets => PathBuf::from(DATASETS_DIRECTORY),
            EntryKey::Dataset(id) => EntryKey::Datasets.relative_path().join(id.to_string()),
            EntryKey::DatasetRecord(id) => EntryKey::Dataset(id).relative_path().join(RECORD_FILE),
            EntryKey::Versions(id) => EntryKey::Dataset(id)
                .relative_path()
                .join(VERSIONS_DIRECTORY),
            EntryKey::Version(dataset, version) => EntryKey::Versions(dataset)
                .relative_path()
                .join(version.to_string()),
            EntryKey::VersionRecord(dataset, version) => EntryKey::Version(dataset, version)
                .relative_path()
                .join(RECORD_FILE),
            EntryKey::VersionData(dataset, version) => EntryKey::Version(dataset, version)
                .relative_path()
                .join(DATA_DIRECTORY),
            EntryKey::VersionFingerprints(dataset, version) => EntryKey::Version(dataset, version)
                .relative_path()
                .join(FINGERPRINTS_FILE),
        }
    }
}

/// A persistent store for the files and records of a repository.
///
/// A `ContentStore` maps [`EntryKey`] values to paths in a file system and provides the
/// primitive operations a repository is built from. Moves within a store are atomic renames
/// wherever the underlying file system allows.
///
/// Implementations must be safe to share between threads. Serializing access to individual
/// entries is the responsibility of the repository.
pub trait ContentStore: Debug + Send + Sync {
    /// Return the path of the entry with the given `key`.
    fn path_for(&self, key: EntryKey) -> PathBuf;

    /// Return the directory temporary files are created in.
    ///
    /// This must be on the same file system as every entry in the store.
    fn temp_dir(&self) -> PathBuf;

    /// Return a new unused path in the temporary directory.
    fn temp_path(&self) -> PathBuf;

    /// Return whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Return the contents of the file at `path` or `None` if it doesn't exist.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    fn read(&self, path: &Path) -> crate::Result<Option<Vec<u8>>>;

    /// Replace the contents of the file at `path` with `data`.
    ///
    /// This is an atomic operation. Missing parent directories are created.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> crate::Result<()>;

    /// Create the directory at `path` and any missing parents.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    fn create_dir(&self, path: &Path) -> crate::Result<()>;

    /// Move the file or directory at `source` to `destination`.
    ///
    /// Missing parent directories of `destination` are created.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is nothing at `source`.
    /// - `Error::Io`: An I/O error occurred.
    fn move_entry(&self, source: &Path, destination: &Path) -> crate::Result<()>;

    /// Recursively copy the file or directory at `source` to `destination`.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is nothing at `source`.
    /// - `Error::Io`: An I/O error occurred.
    fn copy_entry(&self, source: &Path, destination: &Path) -> crate::Result<()>;

    /// Move the file or directory at `path` out of the way so it can be recovered later.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is nothing at `path`.
    /// - `Error::Io`: An I/O error occurred.
    fn trash(&self, path: &Path) -> crate::Result<()>;

    /// Remove the file or directory at `path` and everything below it.
    ///
    /// If there is nothing at `path`, this does nothing and returns `Ok`.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    fn permanently_remove(&self, path: &Path) -> crate::Result<()>;

    /// Return the names of the entries in the directory at `path`, sorted.
    ///
    /// If there is no directory at `path`, this returns an empty list.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    fn list(&self, path: &Path) -> crate::Result<Vec<String>>;
}

assert_obj_safe!(ContentStore);

impl ContentStore for Box<dyn ContentStore> {
    fn path_for(&self, key: EntryKey) -> PathBuf {
        self.as_ref().path_for(key)
    }

    fn temp_dir(&self) -> PathBuf {
        self.as_ref().temp_dir()
    }

    fn temp_path(&self) -> PathBuf {
        self.as_ref().temp_path()
    }

    fn exists(&self, path: &Path) -> bool {
        self.as_ref().exists(path)
    }

    fn read(&self, path: &Path) -> crate::Result<Option<Vec<u8>>> {
        self.as_ref().read(path)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> crate::Result<()> {
        self.as_ref().write_atomic(path, data)
    }

    fn create_dir(&self, path: &Path) -> crate::Result<()> {
        self.as_ref().create_dir(path)
    }

    fn move_entry(&self, source: &Path, destination: &Path) -> crate::Result<()> {
        self.as_ref().move_entry(source, destination)
    }

    fn copy_entry(&self, source: &Path, destination: &Path) -> crate::Result<()> {
        self.as_ref().copy_entry(source, destination)
    }

    fn trash(&self, path: &Path) -> crate::Result<()> {
        self.as_ref().trash(path)
    }

    fn permanently_remove(&self, path: &Path) -> crate::Result<()> {
        self.as_ref().permanently_remove(path)
    }

    fn list(&self, path: &Path) -> crate::Result<Vec<String>> {
        self.as_ref().list(path)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn version_entries_live_under_their_dataset() {
        let dataset = DatasetId::new(Uuid::from_u128(1));
        let version = VersionId::new(Uuid::from_u128(2));

        assert_eq!(
            EntryKey::VersionData(dataset, version).relative_path(),
            PathBuf::from(format!("datasets/{}/versions/{}/data", dataset, version))
        );
        assert_eq!(
            EntryKey::DatasetRecord(dataset).relative_path(),
            PathBuf::from(format!("datasets/{}/record", dataset))
        );
    }
}
