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

use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::fingerprint::{check_coverage, Chunk, Fingerprint};
use super::upload::{FileUpload, PartKey};
use crate::error::Corruption;

/// Counts of where the bytes of a reconstructed file came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructStats {
    /// The number of chunks copied from the stored file.
    pub reused_chunks: usize,

    /// The number of bytes copied from the stored file.
    pub reused_bytes: u64,

    /// The number of chunks taken from the upload.
    pub supplied_chunks: usize,

    /// The number of bytes taken from the upload.
    pub supplied_bytes: u64,
}

/// The stored file which unchanged chunks are copied from.
///
/// The file is only opened once a chunk actually needs to be copied from it.
enum Source<'a> {
    Unopened(&'a Path),
    Open(File),
    Missing,
}

impl<'a> Source<'a> {
    fn file(&mut self) -> crate::Result<&mut File> {
        if let Source::Unopened(path) = self {
            *self = match File::open(path) {
                Ok(file) => Source::Open(file),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Source::Missing,
                Err(error) => return Err(error.into()),
            };
        }

        match self {
            Source::Open(file) => Ok(file),
            _ => Err(Corruption::MissingSource.into()),
        }
    }
}

/// Rebuilds a file from the bytes of its stored version and a [`FileUpload`].
#[derive(Debug)]
pub struct Reconstructor<'a> {
    upload: &'a FileUpload,

    /// The offsets of stored chunks, keyed by fingerprint and size.
    stored: HashMap<(Fingerprint, u32), u64>,
}

impl<'a> Reconstructor<'a> {
    /// Return a reconstructor for `upload` against the chunk list of the stored file.
    pub fn new(upload: &'a FileUpload, stored_chunks: &[Chunk]) -> Self {
        let stored = stored_chunks
            .iter()
            .map(|chunk| ((chunk.fingerprint, chunk.size), chunk.offset))
            .collect();
        Self { upload, stored }
    }

    /// Write the reconstructed file to `output`, copying reused chunks from `source`.
    ///
    /// Nothing is written unless the target chunk list covers the declared length exactly.
    /// Every chunk is hashed and compared against its fingerprint before it is written.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The chunk list is inconsistent, a payload is missing, or some bytes
    /// don't match their fingerprint.
    /// - `Error::Io`: An I/O error occurred.
    pub fn write_to<R, W>(&self, mut source: Option<R>, output: &mut W) -> crate::Result<ReconstructStats>
    where
        R: Read + Seek,
        W: Write,
    {
        check_coverage(self.upload.chunks(), self.upload.length())?;

        let mut stats = ReconstructStats::default();
        let mut buffer = Vec::new();

        for chunk in self.upload.chunks() {
            let bytes = match self.stored.get(&(chunk.fingerprint, chunk.size)) {
                Some(&stored_offset) => {
                    let reader = source.as_mut().ok_or(Corruption::MissingSource)?;
                    read_stored(reader, stored_offset, chunk.size, &mut buffer)?;
                    stats.reused_chunks += 1;
                    stats.reused_bytes += u64::from(chunk.size);
                    buffer.as_slice()
                }
                None => {
                    let payload = self
                        .upload
                        .part(&PartKey::from(chunk))
                        .ok_or(Corruption::MissingPayload {
                            offset: chunk.offset,
                            size: chunk.size,
                        })?;
                    if payload.len() != chunk.size as usize {
                        return Err(Corruption::PayloadSize {
                            offset: chunk.offset,
                            size: chunk.size,
                            actual: payload.len(),
                        }
                        .into());
                    }
                    stats.supplied_chunks += 1;
                    stats.supplied_bytes += u64::from(chunk.size);
                    payload
                }
            };

            if Fingerprint::of(bytes) != chunk.fingerprint {
                return Err(Corruption::FingerprintMismatch {
                    offset: chunk.offset,
                }
                .into());
            }

            output.write_all(bytes)?;
        }

        Ok(stats)
    }

    /// Reconstruct the file and atomically move it to `destination`.
    ///
    /// `stored_path` is the file the stored chunks are copied from and may be the same as
    /// `destination`. The new file is written to a temporary file in `temp_dir` first, which must
    /// be on the same file system as `destination`. If reconstruction fails, the temporary file
    /// is removed and `destination` is untouched.
    ///
    /// # Errors
    /// - `Error::Corrupt`: The file could not be reconstructed.
    /// - `Error::Io`: An I/O error occurred.
    pub fn reconstruct_file(
        &self,
        stored_path: &Path,
        temp_dir: &Path,
        destination: &Path,
    ) -> crate::Result<ReconstructStats> {
        let mut source = Source::Unopened(stored_path);
        let temp_file = tempfile::Builder::new()
            .prefix("reconstruct-")
            .tempfile_in(temp_dir)?;

        let stats = {
            let mut output = BufWriter::new(temp_file.as_file());
            let stats = if self.needs_source() {
                self.write_to(Some(source.file()?), &mut output)?
            } else {
                self.write_to(None::<File>, &mut output)?
            };
            output.flush()?;
            stats
        };
        temp_file.as_file().sync_all()?;

        if let Some(parent) = destination.parent() {
            create_dir_all(parent)?;
        }
        persist(temp_file, destination)?;

        tracing::debug!(
            destination = %destination.display(),
            reused_chunks = stats.reused_chunks,
            reused_bytes = stats.reused_bytes,
            supplied_chunks = stats.supplied_chunks,
            supplied_bytes = stats.supplied_bytes,
            "reconstructed file"
        );

        Ok(stats)
    }

    /// Return whether any target chunk is copied from the stored file.
    fn needs_source(&self) -> bool {
        self.upload
            .chunks()
            .iter()
            .any(|chunk| self.stored.contains_key(&(chunk.fingerprint, chunk.size)))
    }
}

/// Read `size` bytes at `offset` from `reader` into `buffer`.
fn read_stored<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    size: u32,
    buffer: &mut Vec<u8>,
) -> crate::Result<()> {
    buffer.resize(size as usize, 0);
    reader.seek(SeekFrom::Start(offset))?;
    match reader.read_exact(buffer) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Corruption::SourceTruncated { offset }.into())
        }
        Err(error) => Err(error.into()),
    }
}

/// Atomically rename `temp_file` to `destination`.
fn persist(temp_file: NamedTempFile, destination: &Path) -> io::Result<()> {
    temp_file
        .persist(destination)
        .map(|_| ())
        .map_err(|error| error.error)
}
