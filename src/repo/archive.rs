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

use std::collections::BTreeSet;
use std::fs::{create_dir_all, File};
use std::io::{self, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use relative_path::{RelativePath, RelativePathBuf};
use tar::{Archive, EntryType};

use super::tree::validate_path;

/// The formats an archive can be uploaded in.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArchiveFormat {
    /// An uncompressed tar archive.
    Tar,

    /// A tar archive compressed with gzip.
    TarGz,

    /// A tar archive compressed with bzip2.
    TarBz2,
}

impl ArchiveFormat {
    /// Return the format of an archive with the given file name, if it is one.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ArchiveFormat::TarBz2)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    /// Wrap `reader` to decompress the bytes of an archive in this format.
    fn decoder<'a, R: Read + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            ArchiveFormat::Tar => Box::new(reader),
            ArchiveFormat::TarGz => Box::new(GzDecoder::new(reader)),
            ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(reader)),
        }
    }
}

/// The paths unpacked from an archive, relative to the directory it was unpacked into.
#[derive(Debug, Default)]
pub(super) struct Unpacked {
    /// Every regular file.
    pub files: BTreeSet<RelativePathBuf>,

    /// Every directory, including the parents of files.
    pub directories: BTreeSet<RelativePathBuf>,
}

impl Unpacked {
    fn has_file_above(&self, path: &RelativePath) -> bool {
        let mut current = path.parent();
        while let Some(ancestor) = current {
            if self.files.contains(ancestor) {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    fn add_parents(&mut self, path: &RelativePath) {
        let mut current = path.parent();
        while let Some(ancestor) = current {
            if ancestor.as_str().is_empty() {
                break;
            }
            self.directories.insert(ancestor.to_relative_path_buf());
            current = ancestor.parent();
        }
    }
}

/// Unpack the archive read from `reader` into the directory `staging`.
///
/// Only regular files and directories are unpacked. When an archive contains the same file more
/// than once, the last copy wins.
///
/// # Errors
/// - `Error::InvalidPath`: An entry has an absolute path or a path outside the archive root.
/// - `Error::InvalidArchive`: An entry is a link or special file, or a path is both a file and a
/// directory.
/// - `Error::Io`: The archive is malformed or an I/O error occurred.
pub(super) fn unpack(
    reader: impl Read,
    format: ArchiveFormat,
    staging: &Path,
) -> crate::Result<Unpacked> {
    let mut archive = Archive::new(format.decoder(reader));
    let mut unpacked = Unpacked::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry
            .path()?
            .to_str()
            .ok_or(crate::Error::InvalidPath)?
            .to_owned();
        let kind = entry.header().entry_type();

        match kind {
            EntryType::Regular | EntryType::Continuous => {
                let path = validate_path(&raw_path)?;
                if unpacked.directories.contains(&path) || unpacked.has_file_above(&path) {
                    return Err(crate::Error::InvalidArchive(
                        "a path is both a file and a directory",
                    ));
                }

                let destination = path.to_path(staging);
                if let Some(parent) = destination.parent() {
                    create_dir_all(parent)?;
                }
                let mut file = File::create(&destination)?;
                io::copy(&mut entry, &mut file)?;
                file.sync_all()?;

                unpacked.add_parents(&path);
                unpacked.files.insert(path);
            }
            EntryType::Directory => {
                // The entry for the root of the archive.
                if RelativePath::new(&raw_path).normalize().as_str().is_empty() {
                    continue;
                }
                let path = validate_path(&raw_path)?;
                if unpacked.files.contains(&path) || unpacked.has_file_above(&path) {
                    return Err(crate::Error::InvalidArchive(
                        "a path is both a file and a directory",
                    ));
                }

                create_dir_all(path.to_path(staging))?;
                unpacked.add_parents(&path);
                unpacked.directories.insert(path);
            }
            EntryType::XGlobalHeader | EntryType::XHeader => continue,
            _ => {
                return Err(crate::Error::InvalidArchive(
                    "only regular files and directories can be unpacked",
                ))
            }
        }
    }

    tracing::debug!(
        files = unpacked.files.len(),
        directories = unpacked.directories.len(),
        "unpacked archive"
    );

    Ok(unpacked)
}
