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

use std::ffi::OsStr;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rstest::*;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use ddreplay::repo::{DeleteMode, RepoConfig, Repository, Version};
use ddreplay::store::{
    ContentStore, DirectoryConfig, DirectoryStore, EntryKey, OpenStore, FINGERPRINTS_FILE,
    RECORD_FILE,
};

use super::data::small_chunking;

/// A value which is tied to the lifetime of a temporary directory.
pub struct WithTempDir<T> {
    directory: TempDir,
    value: T,
}

impl<T> WithTempDir<T> {
    /// The path of the temporary directory.
    pub fn path(&self) -> &Path {
        self.directory.path()
    }
}

impl<T> Deref for WithTempDir<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// The repository config used for testing.
pub fn test_config() -> RepoConfig {
    let mut config = RepoConfig::default();
    config.chunking = small_chunking();
    config.delete_mode = DeleteMode::Permanent;
    config
}

/// Send log output to the test harness, filtered by `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn open_repo(directory: &Path, config: RepoConfig) -> anyhow::Result<Repository> {
    init_logging();
    let store_config = DirectoryConfig::new(directory.join("store"));
    Ok(Repository::open(&store_config, config)?)
}

#[fixture]
pub fn repo() -> WithTempDir<Repository> {
    let directory = tempfile::tempdir().unwrap();
    let repo = open_repo(directory.path(), test_config()).unwrap();
    WithTempDir {
        directory,
        value: repo,
    }
}

#[fixture]
pub fn faulty_repo() -> WithTempDir<Repository<FaultyStore>> {
    init_logging();
    let directory = tempfile::tempdir().unwrap();
    let store = FaultyStore::open(&directory.path().join("store")).unwrap();
    let repo = Repository::new(store, test_config()).unwrap();
    WithTempDir {
        directory,
        value: repo,
    }
}

/// Publish `files` as the first version of a new dataset.
pub fn publish_new_dataset<S: ContentStore>(
    repo: &Repository<S>,
    files: &[(&str, &[u8])],
) -> anyhow::Result<Version> {
    let draft = repo.create_empty_draft()?;
    for (path, data) in files {
        repo.add_file(draft.id(), path, *data, false)?;
    }
    Ok(repo.publish(draft.id(), "tester", "Initial version")?)
}

/// A `DirectoryStore` which can be told to fail writes of records or fingerprints.
#[derive(Debug)]
pub struct FaultyStore {
    inner: DirectoryStore,
    fail_dataset_writes: AtomicBool,
    fail_draft_writes: AtomicBool,
    fail_fingerprint_writes: AtomicBool,
}

impl FaultyStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            inner: DirectoryConfig::new(path).open()?,
            fail_dataset_writes: AtomicBool::new(false),
            fail_draft_writes: AtomicBool::new(false),
            fail_fingerprint_writes: AtomicBool::new(false),
        })
    }

    /// Make every following write of a dataset record fail or succeed.
    pub fn fail_dataset_writes(&self, fail: bool) {
        self.fail_dataset_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every following write of a draft record fail or succeed.
    pub fn fail_draft_writes(&self, fail: bool) {
        self.fail_draft_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every following write of a fingerprint blob fail or succeed.
    pub fn fail_fingerprint_writes(&self, fail: bool) {
        self.fail_fingerprint_writes.store(fail, Ordering::SeqCst);
    }

    fn is_record_in(&self, path: &Path, key: EntryKey) -> bool {
        let root = self.inner.path_for(key);
        path.file_name() == Some(OsStr::new(RECORD_FILE))
            && path.parent().and_then(Path::parent) == Some(root.as_path())
    }

    fn should_fail(&self, path: &Path) -> bool {
        (self.fail_dataset_writes.load(Ordering::SeqCst)
            && self.is_record_in(path, EntryKey::Datasets))
            || (self.fail_draft_writes.load(Ordering::SeqCst)
                && self.is_record_in(path, EntryKey::Drafts))
            || (self.fail_fingerprint_writes.load(Ordering::SeqCst)
                && path.file_name() == Some(OsStr::new(FINGERPRINTS_FILE)))
    }
}

impl ContentStore for FaultyStore {
    fn path_for(&self, key: EntryKey) -> PathBuf {
        self.inner.path_for(key)
    }

    fn temp_dir(&self) -> PathBuf {
        self.inner.temp_dir()
    }

    fn temp_path(&self) -> PathBuf {
        self.inner.temp_path()
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn read(&self, path: &Path) -> ddreplay::Result<Option<Vec<u8>>> {
        self.inner.read(path)
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> ddreplay::Result<()> {
        if self.should_fail(path) {
            return Err(ddreplay::Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        self.inner.write_atomic(path, data)
    }

    fn create_dir(&self, path: &Path) -> ddreplay::Result<()> {
        self.inner.create_dir(path)
    }

    fn move_entry(&self, source: &Path, destination: &Path) -> ddreplay::Result<()> {
        self.inner.move_entry(source, destination)
    }

    fn copy_entry(&self, source: &Path, destination: &Path) -> ddreplay::Result<()> {
        self.inner.copy_entry(source, destination)
    }

    fn trash(&self, path: &Path) -> ddreplay::Result<()> {
        self.inner.trash(path)
    }

    fn permanently_remove(&self, path: &Path) -> ddreplay::Result<()> {
        self.inner.permanently_remove(path)
    }

    fn list(&self, path: &Path) -> ddreplay::Result<Vec<String>> {
        self.inner.list(path)
    }
}
