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

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::iter;
use std::path::{Path, PathBuf};

use relative_path::{RelativePath, RelativePathBuf};
use serde::de::DeserializeOwned;
use serde::Serialize;
use static_assertions::assert_impl_all;
use tempfile::TempDir;

use super::archive::{unpack, ArchiveFormat};
use super::config::{DeleteMode, RepoConfig};
use super::entity::{from_record, to_record, Dataset, Draft, Version};
use super::fingerprints::{FingerprintKey, FingerprintStore};
use super::lock::LockTable;
use super::staging::Replacement;
use super::tree::{scan, validate_path};
use super::{DatasetId, DraftId, VersionId};
use crate::chunk::{Chunk, Chunker, FileFingerprints, FileUpload, Reconstructor};
use crate::error::Conflict;
use crate::store::{
    ContentStore, DirectoryStore, EntryKey, OpenStore, DATA_DIRECTORY, FINGERPRINTS_FILE,
    RECORD_FILE,
};

/// The name of an upload in its staging directory.
const STAGED_FILE: &str = "upload";

/// Return whether a parent of `path` below `root` is a file.
fn has_file_above(root: &Path, path: &RelativePath) -> bool {
    let mut current = path.parent();
    while let Some(ancestor) = current {
        if ancestor.as_str().is_empty() {
            break;
        }
        if ancestor.to_path(root).is_file() {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

/// A store of datasets, their published versions, and the drafts which become new versions.
///
/// Files are uploaded into a mutable [`Draft`], either whole with [`add_file`] or as a delta
/// against the stored copy with [`replace_file`]. Publishing a draft turns it into an immutable
/// [`Version`] of its dataset.
///
/// A repository is `Send + Sync`; every operation takes `&self`, so one instance can be shared
/// between worker threads by reference or through an `Arc`. Operations on the same draft are
/// serialized, as are publishes to the same dataset.
///
/// # Concurrency
/// Publishing uses optimistic concurrency. A draft records the version it was forked from, and
/// it can only be published while that version is still the current version of its dataset.
/// Otherwise [`publish`] fails with [`Conflict::StaleParent`] and the draft is left untouched.
///
/// A repository cannot protect against concurrent access from multiple processes. Opening the
/// same store from multiple processes at once may cause data loss.
///
/// [`add_file`]: crate::repo::Repository::add_file
/// [`replace_file`]: crate::repo::Repository::replace_file
/// [`publish`]: crate::repo::Repository::publish
#[derive(Debug)]
pub struct Repository<S: ContentStore = DirectoryStore> {
    store: S,
    config: RepoConfig,
    chunker: Chunker,
    draft_locks: LockTable<DraftId>,
    dataset_locks: LockTable<DatasetId>,
}

assert_impl_all!(Repository<DirectoryStore>: Send, Sync);

impl<S: ContentStore> Repository<S> {
    /// Return a repository which keeps its data in `store`.
    ///
    /// # Errors
    /// - `Error::InvalidConfig`: The chunking parameters in `config` are invalid.
    pub fn new(store: S, config: RepoConfig) -> crate::Result<Self> {
        let chunker = Chunker::new(config.chunking)?;
        Ok(Self {
            store,
            config,
            chunker,
            draft_locks: LockTable::new(),
            dataset_locks: LockTable::new(),
        })
    }

    /// Open the store described by `store_config` and return a repository backed by it.
    ///
    /// # Errors
    /// - `Error::UnsupportedStore`: The store is an unsupported format.
    /// - `Error::InvalidConfig`: The chunking parameters in `config` are invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn open<O>(store_config: &O, config: RepoConfig) -> crate::Result<Self>
    where
        O: OpenStore<Store = S>,
    {
        Self::new(store_config.open()?, config)
    }

    /// The configuration of this repository.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// The store this repository keeps its data in.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The chunker clients must use to prepare uploads for this repository.
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    fn fingerprints(&self) -> FingerprintStore<'_, S> {
        FingerprintStore::new(&self.store)
    }

    fn read_record<T: DeserializeOwned>(&self, key: EntryKey) -> crate::Result<T> {
        match self.store.read(&self.store.path_for(key))? {
            Some(data) => from_record(&data),
            None => Err(crate::Error::NotFound),
        }
    }

    fn write_record<T: Serialize>(&self, key: EntryKey, value: &T) -> crate::Result<()> {
        self.store
            .write_atomic(&self.store.path_for(key), &to_record(value)?)
    }

    /// Create a new draft with no dataset and no files.
    ///
    /// Publishing this draft creates a new dataset.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    pub fn create_empty_draft(&self) -> crate::Result<Draft> {
        let draft = Draft::new(None, None);
        let id = draft.id;

        let result = self
            .store
            .create_dir(&self.store.path_for(EntryKey::DraftData(id)))
            .and_then(|()| {
                self.fingerprints()
                    .save(FingerprintKey::Draft(id), &FileFingerprints::new())
            })
            .and_then(|()| self.write_record(EntryKey::DraftRecord(id), &draft));
        if let Err(error) = result {
            self.abandon_draft(id);
            return Err(error);
        }

        tracing::info!(draft = %id, "created empty draft");
        Ok(draft)
    }

    /// Create a new draft containing a copy of the current version of a dataset.
    ///
    /// The new draft can only be published while that version is still the current version.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no dataset with the given ID.
    /// - `Error::Io`: An I/O error occurred.
    pub fn fork_draft(&self, dataset_id: DatasetId) -> crate::Result<Draft> {
        let version = self.current_version(dataset_id)?;
        let mut draft = Draft::new(Some(dataset_id), Some(version.id));
        draft.contents = version.contents.clone();
        let id = draft.id;

        let result = self
            .store
            .copy_entry(
                &self
                    .store
                    .path_for(EntryKey::VersionData(dataset_id, version.id)),
                &self.store.path_for(EntryKey::DraftData(id)),
            )
            .and_then(|()| {
                self.store.copy_entry(
                    &self
                        .store
                        .path_for(EntryKey::VersionFingerprints(dataset_id, version.id)),
                    &self.store.path_for(EntryKey::DraftFingerprints(id)),
                )
            })
            .and_then(|()| self.write_record(EntryKey::DraftRecord(id), &draft));
        if let Err(error) = result {
            self.abandon_draft(id);
            return Err(error);
        }

        tracing::info!(
            draft = %id,
            dataset = %dataset_id,
            version = %version.id,
            "forked draft"
        );
        Ok(draft)
    }

    /// Remove what was created of a draft which could not be created completely.
    fn abandon_draft(&self, id: DraftId) {
        let root = self.store.path_for(EntryKey::Draft(id));
        if let Err(error) = self.store.permanently_remove(&root) {
            tracing::warn!(draft = %id, %error, "failed to clean up incomplete draft");
        }
    }

    /// Rebuild the contents tree of `draft` from its files and save its record.
    fn refresh_contents(&self, draft: &mut Draft) -> crate::Result<()> {
        draft.contents = scan(&self.store.path_for(EntryKey::DraftData(draft.id)))?;
        self.write_record(EntryKey::DraftRecord(draft.id), draft)
    }

    /// Return where the file at `path` in a draft is stored.
    ///
    /// Directories can't be replaced by files, and files can't be placed below a file.
    fn upload_destination(&self, draft_id: DraftId, path: &RelativePath) -> crate::Result<PathBuf> {
        let data = self.store.path_for(EntryKey::DraftData(draft_id));
        let destination = path.to_path(&data);
        if destination.is_dir() || has_file_above(&data, path) {
            return Err(Conflict::AlreadyExists.into());
        }
        Ok(destination)
    }

    /// Create a directory for staging an upload, which is removed when it is dropped.
    fn staging_dir(&self) -> crate::Result<TempDir> {
        Ok(tempfile::Builder::new()
            .prefix("upload-")
            .tempdir_in(self.store.temp_dir())?)
    }

    /// Apply staged changes to `draft` with `apply` and refresh its contents.
    ///
    /// If any step fails, every change is undone and the draft is left as it was.
    fn apply_upload<F>(&self, draft: &mut Draft, apply: F) -> crate::Result<()>
    where
        F: FnOnce(&mut Replacement<'_, S>) -> crate::Result<()>,
    {
        let mut replacement = Replacement::new(&self.store, FingerprintKey::Draft(draft.id));
        match apply(&mut replacement).and_then(|()| self.refresh_contents(draft)) {
            Ok(()) => {
                replacement.commit();
                Ok(())
            }
            Err(error) => {
                tracing::warn!(draft = %draft.id, %error, "upload failed, rolling back");
                replacement.roll_back();
                Err(error)
            }
        }
    }

    /// Upload a whole file into a draft.
    ///
    /// The bytes are read from `reader` into a temporary file, chunked, and then moved to `path`
    /// in the draft. If there is already a file at `path`, it is replaced only if `overwrite` is
    /// `true`. If the upload fails, the draft is left as it was.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    /// - `Error::InvalidPath`: The path is empty, absolute, or outside the draft.
    /// - `Error::Conflict`: A file exists at `path` and `overwrite` is `false`, `path` is a
    /// directory, or a parent of `path` is a file.
    /// - `Error::Io`: An I/O error occurred.
    pub fn add_file(
        &self,
        draft_id: DraftId,
        path: &str,
        mut reader: impl Read,
        overwrite: bool,
    ) -> crate::Result<Draft> {
        let path = validate_path(path)?;
        let _lock = self.draft_locks.acquire(draft_id);
        let mut draft = self.lookup_draft(draft_id)?;

        let destination = self.upload_destination(draft_id, &path)?;
        if !overwrite && self.store.exists(&destination) {
            return Err(Conflict::AlreadyExists.into());
        }

        let staging = self.staging_dir()?;
        let staged = staging.path().join(STAGED_FILE);
        let length = {
            let mut file = File::create(&staged)?;
            let length = io::copy(&mut reader, &mut file)?;
            file.sync_all()?;
            length
        };
        let chunks = self.chunker.chunk_file(&staged)?;
        let chunk_count = chunks.len();
        let fingerprints = iter::once((path.clone(), chunks)).collect::<FileFingerprints>();

        self.apply_upload(&mut draft, |replacement| {
            replacement.place(&staged, &destination)?;
            replacement.update_fingerprints(&fingerprints)?;
            Ok(())
        })?;

        tracing::debug!(
            draft = %draft_id,
            path = %path,
            length,
            chunks = chunk_count,
            "added file"
        );
        Ok(draft)
    }

    /// Unpack a tar archive into a draft.
    ///
    /// Every file in the archive is placed below `directory` in the draft, or below the root of
    /// the draft if it is `None`, and chunked like a file uploaded with [`add_file`]. Existing
    /// files are replaced only if `overwrite` is `true`. Nothing in the draft is changed unless
    /// every file in the archive can be added.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    /// - `Error::InvalidPath`: `directory` or the path of an entry in the archive is empty,
    /// absolute, or outside the draft.
    /// - `Error::InvalidArchive`: The archive contains links or special files.
    /// - `Error::Conflict`: A file in the archive exists in the draft and `overwrite` is `false`,
    /// or a file in the archive would replace a directory or the other way around.
    /// - `Error::Io`: The archive is malformed or an I/O error occurred.
    ///
    /// [`add_file`]: crate::repo::Repository::add_file
    pub fn add_archive(
        &self,
        draft_id: DraftId,
        directory: Option<&str>,
        reader: impl Read,
        format: ArchiveFormat,
        overwrite: bool,
    ) -> crate::Result<Draft> {
        let prefix = match directory {
            Some(directory) => validate_path(directory)?,
            None => RelativePathBuf::new(),
        };
        let _lock = self.draft_locks.acquire(draft_id);
        let mut draft = self.lookup_draft(draft_id)?;

        let staging = self.staging_dir()?;
        let unpacked = unpack(reader, format, staging.path())?;
        let data = self.store.path_for(EntryKey::DraftData(draft_id));

        let mut fingerprints = FileFingerprints::new();
        let mut placements = Vec::with_capacity(unpacked.files.len());
        for file in &unpacked.files {
            let path = prefix.join_normalized(file);
            let destination = self.upload_destination(draft_id, &path)?;
            if !overwrite && self.store.exists(&destination) {
                return Err(Conflict::AlreadyExists.into());
            }

            let staged = file.to_path(staging.path());
            fingerprints.insert(path, self.chunker.chunk_file(&staged)?);
            placements.push((staged, destination));
        }

        let mut directories = Vec::with_capacity(unpacked.directories.len());
        for directory in &unpacked.directories {
            let path = prefix.join_normalized(directory);
            let target = path.to_path(&data);
            if (self.store.exists(&target) && !target.is_dir()) || has_file_above(&data, &path) {
                return Err(Conflict::AlreadyExists.into());
            }
            directories.push(target);
        }

        self.apply_upload(&mut draft, |replacement| {
            for target in &directories {
                replacement.create_dir(target)?;
            }
            for (staged, destination) in &placements {
                replacement.place(staged, destination)?;
            }
            replacement.update_fingerprints(&fingerprints)?;
            Ok(())
        })?;

        tracing::debug!(
            draft = %draft_id,
            directory = %prefix,
            ?format,
            files = placements.len(),
            "added archive"
        );
        Ok(draft)
    }

    /// Replace a file in a draft by reconstructing it from its stored copy and a delta upload.
    ///
    /// Chunks of the new file which the stored copy already has are copied from it, and all
    /// others are taken from `upload`. If `path` doesn't exist in the draft yet, every chunk must
    /// be supplied by the upload. If reconstruction or any later step fails, the stored copy and
    /// its fingerprints are left untouched.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    /// - `Error::InvalidPath`: The path is empty, absolute, or outside the draft.
    /// - `Error::Conflict`: The path is a directory or a parent of it is a file.
    /// - `Error::Corrupt`: The file could not be reconstructed from the upload.
    /// - `Error::Io`: An I/O error occurred.
    pub fn replace_file(
        &self,
        draft_id: DraftId,
        path: &str,
        upload: &FileUpload,
    ) -> crate::Result<Draft> {
        let path = validate_path(path)?;
        let _lock = self.draft_locks.acquire(draft_id);
        let mut draft = self.lookup_draft(draft_id)?;

        let destination = self.upload_destination(draft_id, &path)?;
        let stored = self.fingerprints().load(FingerprintKey::Draft(draft_id))?;

        let staging = self.staging_dir()?;
        let staged = staging.path().join(STAGED_FILE);
        let stats = Reconstructor::new(upload, stored.get(&path).unwrap_or(&[]))
            .reconstruct_file(&destination, staging.path(), &staged)?;
        let fingerprints =
            iter::once((path.clone(), upload.chunks().to_vec())).collect::<FileFingerprints>();

        self.apply_upload(&mut draft, |replacement| {
            replacement.place(&staged, &destination)?;
            replacement.update_fingerprints(&fingerprints)?;
            Ok(())
        })?;

        tracing::debug!(
            draft = %draft_id,
            path = %path,
            reused_bytes = stats.reused_bytes,
            supplied_bytes = stats.supplied_bytes,
            "replaced file"
        );
        Ok(draft)
    }

    /// Remove the file or directory at `path` from a draft.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID or nothing at `path`.
    /// - `Error::InvalidPath`: The path is empty, absolute, or outside the draft.
    /// - `Error::Io`: An I/O error occurred.
    pub fn remove_file(&self, draft_id: DraftId, path: &str) -> crate::Result<Draft> {
        let path = validate_path(path)?;
        let _lock = self.draft_locks.acquire(draft_id);
        let mut draft = self.lookup_draft(draft_id)?;

        let target = path.to_path(self.store.path_for(EntryKey::DraftData(draft_id)));
        if !self.store.exists(&target) {
            return Err(crate::Error::NotFound);
        }

        self.store.permanently_remove(&target)?;
        let removed = self
            .fingerprints()
            .remove_path(FingerprintKey::Draft(draft_id), &path)?;
        self.refresh_contents(&mut draft)?;

        tracing::debug!(draft = %draft_id, path = %path, removed, "removed file");
        Ok(draft)
    }

    /// Publish a draft as the new current version of its dataset.
    ///
    /// If the draft has no dataset, a new dataset is created. The draft is consumed and its
    /// files become the files of the new version. The ID of the new version is derived from the
    /// ID of the draft.
    ///
    /// Nothing is changed unless the new version is linked in completely. The draft is discarded
    /// according to [`RepoConfig::delete_mode`] afterwards; failing to discard it does not fail
    /// the publish.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID, or the draft's dataset no
    /// longer exists.
    /// - `Error::Conflict`: Another version of the dataset was published after the draft was
    /// forked.
    /// - `Error::InvalidRecord`: The author or message is empty.
    /// - `Error::Io`: An I/O error occurred.
    pub fn publish(&self, draft_id: DraftId, author: &str, message: &str) -> crate::Result<Version> {
        let _draft_lock = self.draft_locks.acquire(draft_id);
        let draft = self.lookup_draft(draft_id)?;

        let dataset_id = draft.dataset_id.unwrap_or_else(DatasetId::generate);
        let _dataset_lock = self.dataset_locks.acquire(dataset_id);

        let current = match draft.dataset_id {
            Some(id) => Some(self.lookup_dataset(id)?.current_version_id),
            None => None,
        };
        if draft.parent_version_id != current {
            tracing::info!(
                draft = %draft_id,
                dataset = %dataset_id,
                "rejected publish of a stale draft"
            );
            return Err(Conflict::StaleParent {
                parent: draft.parent_version_id,
                current,
            }
            .into());
        }

        let version = Version::new(
            VersionId::from(draft_id),
            dataset_id,
            current,
            author,
            message,
            draft.contents.clone(),
        )?;
        let dataset = Dataset {
            id: dataset_id,
            current_version_id: version.id,
        };

        let mut promotion = Promotion {
            store: &self.store,
            staging: self.store.temp_path(),
            draft_data: self.store.path_for(EntryKey::DraftData(draft_id)),
            draft_fingerprints: self.store.path_for(EntryKey::DraftFingerprints(draft_id)),
            version_root: self.store.path_for(EntryKey::Version(dataset_id, version.id)),
            new_dataset: match draft.dataset_id {
                Some(_) => None,
                None => Some(self.store.path_for(EntryKey::Dataset(dataset_id))),
            },
            completed: Vec::new(),
        };
        if let Err(error) = promotion.run(&version, &dataset) {
            tracing::warn!(draft = %draft_id, %error, "publish failed, rolling back");
            promotion.roll_back();
            return Err(error);
        }

        if let Err(error) = self.discard_draft(draft_id) {
            tracing::warn!(draft = %draft_id, %error, "failed to discard published draft");
        }

        tracing::info!(
            draft = %draft_id,
            dataset = %dataset_id,
            version = %version.id,
            author = %version.author,
            "published version"
        );
        Ok(version)
    }

    /// Delete a draft and its files.
    ///
    /// Published versions are not affected.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    /// - `Error::Io`: An I/O error occurred.
    pub fn delete_draft(&self, draft_id: DraftId) -> crate::Result<()> {
        let _lock = self.draft_locks.acquire(draft_id);
        if !self
            .store
            .exists(&self.store.path_for(EntryKey::DraftRecord(draft_id)))
        {
            return Err(crate::Error::NotFound);
        }

        self.discard_draft(draft_id)?;

        tracing::info!(draft = %draft_id, mode = ?self.config.delete_mode, "deleted draft");
        Ok(())
    }

    fn discard_draft(&self, draft_id: DraftId) -> crate::Result<()> {
        let root = self.store.path_for(EntryKey::Draft(draft_id));
        match self.config.delete_mode {
            DeleteMode::Trash => self.store.trash(&root),
            DeleteMode::Permanent => self.store.permanently_remove(&root),
        }
    }

    /// Return the draft with the given ID.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    /// - `Error::Deserialize`: The stored record is invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn lookup_draft(&self, draft_id: DraftId) -> crate::Result<Draft> {
        self.read_record(EntryKey::DraftRecord(draft_id))
    }

    /// Return the dataset with the given ID.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no dataset with the given ID.
    /// - `Error::Deserialize`: The stored record is invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn lookup_dataset(&self, dataset_id: DatasetId) -> crate::Result<Dataset> {
        self.read_record(EntryKey::DatasetRecord(dataset_id))
    }

    /// Return a version of a dataset.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no such version.
    /// - `Error::Deserialize`: The stored record is invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn lookup_version(
        &self,
        dataset_id: DatasetId,
        version_id: VersionId,
    ) -> crate::Result<Version> {
        self.read_record(EntryKey::VersionRecord(dataset_id, version_id))
    }

    /// Return the current version of a dataset.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no dataset with the given ID.
    /// - `Error::Deserialize`: A stored record is invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn current_version(&self, dataset_id: DatasetId) -> crate::Result<Version> {
        let dataset = self.lookup_dataset(dataset_id)?;
        self.lookup_version(dataset_id, dataset.current_version_id)
    }

    /// Return every draft in the repository, oldest first.
    pub fn list_drafts(&self) -> crate::Result<Vec<Draft>> {
        let mut drafts = Vec::new();
        for name in self.store.list(&self.store.path_for(EntryKey::Drafts))? {
            let id = match name.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            match self.lookup_draft(id) {
                Ok(draft) => drafts.push(draft),
                // The draft was published or deleted after it was listed.
                Err(crate::Error::NotFound) => continue,
                Err(error) => return Err(error),
            }
        }
        drafts.sort_by_key(|draft| draft.created);
        Ok(drafts)
    }

    /// Return every dataset in the repository.
    pub fn list_datasets(&self) -> crate::Result<Vec<Dataset>> {
        let mut datasets = Vec::new();
        for name in self.store.list(&self.store.path_for(EntryKey::Datasets))? {
            let id = match name.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            match self.lookup_dataset(id) {
                Ok(dataset) => datasets.push(dataset),
                // A first publish to this dataset is in progress or was rolled back.
                Err(crate::Error::NotFound) => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(datasets)
    }

    /// Return the history of a dataset, newest version first.
    ///
    /// This follows the chain of parent versions from the current version, so a version which
    /// was never linked in is not listed.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no dataset with the given ID or a version in its history is
    /// missing.
    /// - `Error::InvalidRecord`: The history of the dataset contains a cycle.
    /// - `Error::Io`: An I/O error occurred.
    pub fn list_versions(&self, dataset_id: DatasetId) -> crate::Result<Vec<Version>> {
        let dataset = self.lookup_dataset(dataset_id)?;

        let mut versions = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(dataset.current_version_id);

        while let Some(version_id) = next {
            if !visited.insert(version_id) {
                return Err(crate::Error::InvalidRecord(
                    "the version history contains a cycle",
                ));
            }
            let version = self.lookup_version(dataset_id, version_id)?;
            next = version.parent_version_id;
            versions.push(version);
        }

        Ok(versions)
    }

    /// Return the chunk lists of every file in a draft.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    /// - `Error::Deserialize`: The stored fingerprints are invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn draft_fingerprints(&self, draft_id: DraftId) -> crate::Result<FileFingerprints> {
        let _lock = self.draft_locks.acquire(draft_id);
        self.lookup_draft(draft_id)?;
        self.fingerprints().load(FingerprintKey::Draft(draft_id))
    }

    /// Return the chunk list of the file at `path` in a draft.
    ///
    /// Clients diff their local copy of a file against this list to prepare a [`FileUpload`].
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID or no file at `path`.
    /// - `Error::InvalidPath`: The path is empty, absolute, or outside the draft.
    /// - `Error::Io`: An I/O error occurred.
    pub fn draft_file_fingerprints(
        &self,
        draft_id: DraftId,
        path: &str,
    ) -> crate::Result<Vec<Chunk>> {
        let path = validate_path(path)?;
        let mut fingerprints = self.draft_fingerprints(draft_id)?;
        fingerprints.remove(&path).ok_or(crate::Error::NotFound)
    }

    /// Return the chunk lists of every file in a version.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no such version.
    /// - `Error::Deserialize`: The stored fingerprints are invalid.
    /// - `Error::Io`: An I/O error occurred.
    pub fn version_fingerprints(
        &self,
        dataset_id: DatasetId,
        version_id: VersionId,
    ) -> crate::Result<FileFingerprints> {
        self.lookup_version(dataset_id, version_id)?;
        self.fingerprints()
            .load(FingerprintKey::Version(dataset_id, version_id))
    }

    /// Return the directory the files of a draft are stored in.
    ///
    /// Files must not be modified through this path.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no draft with the given ID.
    pub fn draft_data_path(&self, draft_id: DraftId) -> crate::Result<PathBuf> {
        let path = self.store.path_for(EntryKey::DraftData(draft_id));
        if self.store.exists(&path) {
            Ok(path)
        } else {
            Err(crate::Error::NotFound)
        }
    }

    /// Return the directory the files of a version are stored in.
    ///
    /// # Errors
    /// - `Error::NotFound`: There is no such version.
    pub fn version_data_path(
        &self,
        dataset_id: DatasetId,
        version_id: VersionId,
    ) -> crate::Result<PathBuf> {
        let path = self
            .store
            .path_for(EntryKey::VersionData(dataset_id, version_id));
        if self.store.exists(&path) {
            Ok(path)
        } else {
            Err(crate::Error::NotFound)
        }
    }
}

/// A completed step of moving a draft into a new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CreatedStaging,
    MovedData,
    MovedFingerprints,
    LinkedVersion,
}

/// The state of promoting a draft into a version, which can be undone until it completes.
#[derive(Debug)]
struct Promotion<'a, S: ContentStore> {
    store: &'a S,

    /// Where the version is assembled before it is moved into its dataset.
    staging: PathBuf,

    draft_data: PathBuf,
    draft_fingerprints: PathBuf,
    version_root: PathBuf,

    /// The root of the dataset if this publish is creating it.
    new_dataset: Option<PathBuf>,

    completed: Vec<Step>,
}

impl<'a, S: ContentStore> Promotion<'a, S> {
    fn run(&mut self, version: &Version, dataset: &Dataset) -> crate::Result<()> {
        self.store.create_dir(&self.staging)?;
        self.completed.push(Step::CreatedStaging);

        self.store
            .move_entry(&self.draft_data, &self.staging.join(DATA_DIRECTORY))?;
        self.completed.push(Step::MovedData);

        self.store.move_entry(
            &self.draft_fingerprints,
            &self.staging.join(FINGERPRINTS_FILE),
        )?;
        self.completed.push(Step::MovedFingerprints);

        self.store
            .write_atomic(&self.staging.join(RECORD_FILE), &to_record(version)?)?;
        self.store.move_entry(&self.staging, &self.version_root)?;
        self.completed.push(Step::LinkedVersion);

        // Once the dataset points to the new version, the publish can't be undone.
        self.store.write_atomic(
            &self.store.path_for(EntryKey::DatasetRecord(dataset.id)),
            &to_record(dataset)?,
        )
    }

    fn roll_back(&mut self) {
        while let Some(step) = self.completed.pop() {
            let result = match step {
                Step::LinkedVersion => self.store.move_entry(&self.version_root, &self.staging),
                Step::MovedFingerprints => self.store.move_entry(
                    &self.staging.join(FINGERPRINTS_FILE),
                    &self.draft_fingerprints,
                ),
                Step::MovedData => self
                    .store
                    .move_entry(&self.staging.join(DATA_DIRECTORY), &self.draft_data),
                Step::CreatedStaging => self.store.permanently_remove(&self.staging),
            };
            if let Err(error) = result {
                tracing::warn!(?step, %error, "failed to undo publish step");
            }
        }

        if let Some(root) = &self.new_dataset {
            if let Err(error) = self.store.permanently_remove(root) {
                tracing::warn!(%error, "failed to remove incomplete dataset");
            }
        }
    }
}
