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

use std::fs::{self, create_dir_all, read_dir, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;

use super::content_store::{ContentStore, EntryKey};
use super::open_store::OpenStore;

/// A UUID which acts as the version ID of the directory store format.
const CURRENT_VERSION: &str = "5f0c2d1e-8a3b-11ee-9c41-2b7e5d0f6a13";

// The names of top-level files in the data store.
const TEMP_DIRECTORY: &str = "tmp";
const TRASH_DIRECTORY: &str = "trash";
const VERSION_FILE: &str = "version";

/// The configuration for opening a [`DirectoryStore`].
///
/// [`DirectoryStore`]: crate::store::DirectoryStore
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DirectoryConfig {
    /// The path of the directory store.
    pub path: PathBuf,
}

impl DirectoryConfig {
    /// Return a config for a store rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OpenStore for DirectoryConfig {
    type Store = DirectoryStore;

    fn open(&self) -> crate::Result<Self::Store> {
        create_dir_all(&self.path)?;
        create_dir_all(self.path.join(TEMP_DIRECTORY))?;
        create_dir_all(self.path.join(TRASH_DIRECTORY))?;
        create_dir_all(self.path.join(EntryKey::Drafts.relative_path()))?;
        create_dir_all(self.path.join(EntryKey::Datasets.relative_path()))?;

        let version_path = self.path.join(VERSION_FILE);

        if version_path.exists() {
            // Read the version ID file.
            let mut version_file = File::open(&version_path)?;
            let mut version_id = String::new();
            version_file.read_to_string(&mut version_id)?;

            // Verify the version ID.
            if version_id != CURRENT_VERSION {
                return Err(crate::Error::UnsupportedStore);
            }
        } else {
            // Write the version ID file.
            let mut version_file = File::create(&version_path)?;
            version_file.write_all(CURRENT_VERSION.as_bytes())?;
            version_file.sync_all()?;
        }

        let store = DirectoryStore {
            path: self.path.clone(),
        };

        // Anything left in the temporary directory belongs to an interrupted operation.
        let mut stale = 0usize;
        for entry in read_dir(store.temp_dir())? {
            remove_path(&entry?.path())?;
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "removed stale temporary files");
        }

        tracing::debug!(path = %self.path.display(), "opened directory store");

        Ok(store)
    }
}

/// A `ContentStore` which stores data in a directory in the local file system.
///
/// You can use [`DirectoryConfig`] to open a data store of this type.
///
/// [`DirectoryConfig`]: crate::store::DirectoryConfig
#[derive(Debug)]
pub struct DirectoryStore {
    /// The path of the store's root directory.
    path: PathBuf,
}

impl DirectoryStore {
    /// The path of the store's root directory.
    pub fn root(&self) -> &Path {
        &self.path
    }
}

impl ContentStore for DirectoryStore {
    fn path_for(&self, key: EntryKey) -> PathBuf {
        self.path.join(key.relative_path())
    }

    fn temp_dir(&self) -> PathBuf {
        self.path.join(TEMP_DIRECTORY)
    }

    fn temp_path(&self) -> PathBuf {
        let uuid_str = Uuid::new_v4().as_hyphenated().to_string();
        self.temp_dir().join(uuid_str)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> crate::Result<Option<Vec<u8>>> {
        match File::open(path) {
            Ok(mut file) => {
                let mut buffer = Vec::with_capacity(file.metadata()?.len() as usize);
                file.read_to_end(&mut buffer)?;
                Ok(Some(buffer))
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        // Write to a staging file and then atomically move it to its final destination.
        let mut staging_file = tempfile::NamedTempFile::new_in(self.temp_dir())?;
        staging_file.write_all(data)?;
        staging_file.as_file().sync_all()?;
        staging_file
            .persist(path)
            .map_err(|error| crate::Error::Io(error.error))?;

        Ok(())
    }

    fn create_dir(&self, path: &Path) -> crate::Result<()> {
        create_dir_all(path)?;
        Ok(())
    }

    fn move_entry(&self, source: &Path, destination: &Path) -> crate::Result<()> {
        if fs::symlink_metadata(source).is_err() {
            return Err(crate::Error::NotFound);
        }
        if let Some(parent) = destination.parent() {
            create_dir_all(parent)?;
        }

        match fs::rename(source, destination) {
            Ok(()) => Ok(()),
            Err(error) if is_cross_device(&error) => {
                tracing::warn!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "rename crossed file systems, falling back to a non-atomic copy"
                );
                copy_path(source, destination)?;
                remove_path(source)?;
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn copy_entry(&self, source: &Path, destination: &Path) -> crate::Result<()> {
        if fs::symlink_metadata(source).is_err() {
            return Err(crate::Error::NotFound);
        }
        copy_path(source, destination)?;
        Ok(())
    }

    fn trash(&self, path: &Path) -> crate::Result<()> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let trash_name = format!("{}-{}", Uuid::new_v4().as_simple(), name);
        let destination = self.path.join(TRASH_DIRECTORY).join(trash_name);
        self.move_entry(path, &destination)
    }

    fn permanently_remove(&self, path: &Path) -> crate::Result<()> {
        match remove_path(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn list(&self, path: &Path) -> crate::Result<Vec<String>> {
        let entries = match read_dir(path) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            if let Ok(name) = entry?.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();

        Ok(names)
    }
}

/// Remove the file or directory at `path`.
fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Recursively copy the file or directory at `source` to `destination`.
fn copy_path(source: &Path, destination: &Path) -> io::Result<()> {
    if !fs::symlink_metadata(source)?.is_dir() {
        if let Some(parent) = destination.parent() {
            create_dir_all(parent)?;
        }
        fs::copy(source, destination)?;
        return Ok(());
    }

    for entry in WalkDir::new(source) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn is_cross_device(error: &io::Error) -> bool {
    error.raw_os_error() == Some(nix::errno::Errno::EXDEV as i32)
}

#[cfg(not(unix))]
fn is_cross_device(_error: &io::Error) -> bool {
    false
}
