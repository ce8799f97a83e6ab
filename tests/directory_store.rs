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

use std::fs;

use ddreplay::repo::{DatasetId, DraftId};
use ddreplay::store::{ContentStore, DirectoryConfig, DirectoryStore, EntryKey, OpenStore};
use ddreplay::Error;
use common::*;

mod common;

#[fixture]
fn store() -> WithTempStore {
    let directory = tempfile::tempdir().unwrap();
    let store = DirectoryConfig::new(directory.path().join("store"))
        .open()
        .unwrap();
    WithTempStore {
        _directory: directory,
        store,
    }
}

struct WithTempStore {
    _directory: tempfile::TempDir,
    store: DirectoryStore,
}

#[test]
fn open_creates_layout() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let root = directory.path().join("store");

    let store = DirectoryConfig::new(&root).open()?;

    assert_that!(store.root()).is_equal_to(root.as_path());
    for name in ["tmp", "trash", "drafts", "datasets"] {
        assert!(root.join(name).is_dir(), "{} should be a directory", name);
    }
    assert!(root.join("version").is_file());

    Ok(())
}

#[test]
fn reopening_keeps_data() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let config = DirectoryConfig::new(directory.path());
    let path = {
        let store = config.open()?;
        let path = store.path_for(EntryKey::DraftRecord(DraftId::generate()));
        store.write_atomic(&path, b"record")?;
        path
    };

    let store = config.open()?;

    assert_that!(store.read(&path)?).is_equal_to(Some(b"record".to_vec()));

    Ok(())
}

#[test]
fn unknown_format_is_rejected() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let config = DirectoryConfig::new(directory.path());
    config.open()?;
    fs::write(directory.path().join("version"), "not a known version")?;

    assert_that!(config.open()).is_err_variant(Error::UnsupportedStore);

    Ok(())
}

#[test]
fn stale_temporary_files_are_removed() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let config = DirectoryConfig::new(directory.path());
    let store = config.open()?;
    fs::write(store.temp_path(), b"interrupted")?;
    fs::create_dir_all(store.temp_path().join("nested"))?;
    drop(store);

    let store = config.open()?;

    assert_that!(fs::read_dir(store.temp_dir())?.count()).is_equal_to(0);

    Ok(())
}

#[rstest]
fn missing_entry_reads_as_none(store: WithTempStore) -> anyhow::Result<()> {
    let path = store.store.path_for(EntryKey::DatasetRecord(DatasetId::generate()));

    assert_that!(store.store.read(&path)?).is_none();
    assert!(!store.store.exists(&path));

    Ok(())
}

#[rstest]
fn atomic_write_replaces_contents(store: WithTempStore) -> anyhow::Result<()> {
    let store = &store.store;
    let path = store.path_for(EntryKey::DraftFingerprints(DraftId::generate()));

    store.write_atomic(&path, b"first")?;
    store.write_atomic(&path, b"second")?;

    assert_that!(store.read(&path)?).is_equal_to(Some(b"second".to_vec()));
    assert_that!(fs::read_dir(store.temp_dir())?.count()).is_equal_to(0);

    Ok(())
}

#[rstest]
fn moving_missing_entry_fails(store: WithTempStore) {
    let store = &store.store;
    let source = store.temp_path();
    let destination = store.temp_path();

    assert_that!(store.move_entry(&source, &destination)).is_err_variant(Error::NotFound);
    assert_that!(store.copy_entry(&source, &destination)).is_err_variant(Error::NotFound);
}

#[rstest]
fn moved_directory_keeps_contents(store: WithTempStore) -> anyhow::Result<()> {
    let store = &store.store;
    let source = store.temp_path();
    store.write_atomic(&source.join("a/b"), b"nested")?;
    let destination = store.path_for(EntryKey::DraftData(DraftId::generate()));

    store.move_entry(&source, &destination)?;

    assert!(!store.exists(&source));
    assert_that!(store.read(&destination.join("a/b"))?).is_equal_to(Some(b"nested".to_vec()));

    Ok(())
}

#[rstest]
fn copied_directory_is_independent(store: WithTempStore) -> anyhow::Result<()> {
    let store = &store.store;
    let source = store.temp_path();
    store.write_atomic(&source.join("file"), b"original")?;
    let destination = store.temp_path();

    store.copy_entry(&source, &destination)?;
    store.write_atomic(&destination.join("file"), b"changed")?;

    assert_that!(store.read(&source.join("file"))?).is_equal_to(Some(b"original".to_vec()));

    Ok(())
}

#[rstest]
fn trashed_entries_are_kept_aside(store: WithTempStore) -> anyhow::Result<()> {
    let root = store.store.root().to_path_buf();
    let store = &store.store;
    let first = store.path_for(EntryKey::Draft(DraftId::generate()));
    let second = store.path_for(EntryKey::Draft(DraftId::generate()));
    store.create_dir(&first)?;
    store.create_dir(&second)?;

    store.trash(&first)?;
    store.trash(&second)?;

    assert!(!store.exists(&first));
    assert!(!store.exists(&second));
    assert_that!(fs::read_dir(root.join("trash"))?.count()).is_equal_to(2);
    assert_that!(store.trash(&first)).is_err_variant(Error::NotFound);

    Ok(())
}

#[rstest]
fn removing_missing_entry_succeeds(store: WithTempStore) -> anyhow::Result<()> {
    let store = &store.store;
    let path = store.path_for(EntryKey::Draft(DraftId::generate()));
    store.create_dir(&path)?;

    store.permanently_remove(&path)?;
    store.permanently_remove(&path)?;

    assert!(!store.exists(&path));

    Ok(())
}

#[rstest]
fn entries_are_listed_by_name(store: WithTempStore) -> anyhow::Result<()> {
    let store = &store.store;
    let parent = store.temp_path();
    for name in ["b", "c", "a"] {
        store.create_dir(&parent.join(name))?;
    }

    assert_that!(store.list(&parent)?).is_equal_to(vec![
        String::from("a"),
        String::from("b"),
        String::from("c"),
    ]);
    assert!(store.list(&store.temp_path())?.is_empty());

    Ok(())
}
