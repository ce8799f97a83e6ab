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

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::iter::FromIterator;

use relative_path::{RelativePath, RelativePathBuf};

use super::fingerprint::{check_coverage, covered_length, Chunk, Fingerprint, FINGERPRINT_SIZE};
use crate::repo::validate_path;

/// The bytes every fingerprint blob starts with.
const MAGIC: &[u8; 4] = b"DDFP";

/// The version of the fingerprint blob format which is written.
pub const FORMAT_VERSION: u16 = 1;

/// The encoded size of one chunk.
const CHUNK_SIZE: usize = 8 + 4 + FINGERPRINT_SIZE;

/// The chunk lists of every file in a draft or version, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFingerprints(BTreeMap<RelativePathBuf, Vec<Chunk>>);

impl FileFingerprints {
    /// Return an empty instance.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The chunk list of the file at `path`.
    pub fn get(&self, path: impl AsRef<RelativePath>) -> Option<&[Chunk]> {
        self.0.get(path.as_ref()).map(Vec::as_slice)
    }

    /// Set the chunk list of the file at `path`, returning the previous one.
    pub fn insert(&mut self, path: RelativePathBuf, chunks: Vec<Chunk>) -> Option<Vec<Chunk>> {
        self.0.insert(path, chunks)
    }

    /// Remove the file at `path`, returning its chunk list.
    pub fn remove(&mut self, path: impl AsRef<RelativePath>) -> Option<Vec<Chunk>> {
        self.0.remove(path.as_ref())
    }

    /// Remove the file at `path` and every file below it, returning how many were removed.
    pub fn remove_prefix(&mut self, path: impl AsRef<RelativePath>) -> usize {
        let prefix = path.as_ref();
        let before = self.0.len();
        self.0.retain(|file, _| !file.starts_with(prefix));
        before - self.0.len()
    }

    /// Whether there is a chunk list for `path`.
    pub fn contains(&self, path: impl AsRef<RelativePath>) -> bool {
        self.0.contains_key(path.as_ref())
    }

    /// The number of files.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no files.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The paths of all files in order.
    pub fn paths(&self) -> impl Iterator<Item = &RelativePath> {
        self.0.keys().map(RelativePathBuf::as_relative_path)
    }

    /// The files and their chunk lists in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&RelativePath, &[Chunk])> {
        self.0
            .iter()
            .map(|(path, chunks)| (path.as_relative_path(), chunks.as_slice()))
    }

    /// Encode this value as a fingerprint blob.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        buffer.extend_from_slice(&(self.0.len() as u32).to_be_bytes());

        for (path, chunks) in &self.0 {
            let path = path.as_str().as_bytes();
            buffer.extend_from_slice(&(path.len() as u32).to_be_bytes());
            buffer.extend_from_slice(path);
            buffer.extend_from_slice(&(chunks.len() as u32).to_be_bytes());

            for chunk in chunks {
                buffer.extend_from_slice(&chunk.offset.to_be_bytes());
                buffer.extend_from_slice(&chunk.size.to_be_bytes());
                buffer.extend_from_slice(chunk.fingerprint.as_bytes());
            }
        }

        buffer
    }

    /// Decode a fingerprint blob.
    ///
    /// # Errors
    /// - `Error::Deserialize`: The data is not a fingerprint blob, is truncated, or lists a path
    /// which is not normalized or appears more than once.
    /// - `Error::UnsupportedFormat`: The blob was written in an unknown format version.
    /// - `Error::Corrupt`: A chunk list in the blob is not contiguous.
    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        let mut reader = BlobReader { data };

        if reader.take(MAGIC.len())? != MAGIC {
            return Err(crate::Error::Deserialize);
        }
        if reader.u16()? != FORMAT_VERSION {
            return Err(crate::Error::UnsupportedFormat);
        }

        let file_count = reader.u32()?;
        let mut files = BTreeMap::new();

        for _ in 0..file_count {
            let path_len = reader.u32()? as usize;
            let path = std::str::from_utf8(reader.take(path_len)?)
                .map_err(|_| crate::Error::Deserialize)?;
            let path = decode_path(path)?;
            if files.contains_key(&path) {
                return Err(crate::Error::Deserialize);
            }

            let chunk_count = reader.u32()? as usize;
            let mut chunks = Vec::with_capacity(chunk_count.min(reader.data.len() / CHUNK_SIZE));
            for _ in 0..chunk_count {
                let offset = reader.u64()?;
                let size = reader.u32()?;
                let fingerprint = reader.fingerprint()?;
                chunks.push(Chunk {
                    offset,
                    size,
                    fingerprint,
                });
            }

            check_coverage(&chunks, covered_length(&chunks))?;
            files.insert(path, chunks);
        }

        if !reader.data.is_empty() {
            return Err(crate::Error::Deserialize);
        }

        Ok(Self(files))
    }
}

impl FromIterator<(RelativePathBuf, Vec<Chunk>)> for FileFingerprints {
    fn from_iter<T: IntoIterator<Item = (RelativePathBuf, Vec<Chunk>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<(RelativePathBuf, Vec<Chunk>)> for FileFingerprints {
    fn extend<T: IntoIterator<Item = (RelativePathBuf, Vec<Chunk>)>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for FileFingerprints {
    type Item = (RelativePathBuf, Vec<Chunk>);
    type IntoIter = btree_map::IntoIter<RelativePathBuf, Vec<Chunk>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Accept a stored path only if it is already in the form `validate_path` returns.
fn decode_path(raw: &str) -> crate::Result<RelativePathBuf> {
    match validate_path(raw) {
        Ok(path) if path.as_str() == raw => Ok(path),
        _ => Err(crate::Error::Deserialize),
    }
}

/// Reads big-endian fields from the front of a byte slice.
struct BlobReader<'a> {
    data: &'a [u8],
}

impl<'a> BlobReader<'a> {
    fn take(&mut self, len: usize) -> crate::Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(crate::Error::Deserialize);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> crate::Result<[u8; N]> {
        let bytes = self.take(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| crate::Error::Deserialize)
    }

    fn u16(&mut self) -> crate::Result<u16> {
        self.array().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> crate::Result<u32> {
        self.array().map(u32::from_be_bytes)
    }

    fn u64(&mut self) -> crate::Result<u64> {
        self.array().map(u64::from_be_bytes)
    }

    fn fingerprint(&mut self) -> crate::Result<Fingerprint> {
        self.array().map(Fingerprint::from_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks_of(data: &[&[u8]]) -> Vec<Chunk> {
        let mut offset = 0;
        data.iter()
            .map(|bytes| {
                let chunk = Chunk {
                    offset,
                    size: bytes.len() as u32,
                    fingerprint: Fingerprint::of(bytes),
                };
                offset += bytes.len() as u64;
                chunk
            })
            .collect()
    }

    fn sample() -> FileFingerprints {
        let mut fingerprints = FileFingerprints::new();
        fingerprints.insert("a.csv".into(), chunks_of(&[b"hello", b"world"]));
        fingerprints.insert("dir/b.bin".into(), chunks_of(&[b"x"]));
        fingerprints.insert("empty".into(), Vec::new());
        fingerprints
    }

    #[test]
    fn header_layout_is_fixed() {
        let blob = sample().encode();
        assert_eq!(&blob[..4], b"DDFP");
        assert_eq!(&blob[4..6], &[0, 1]);
        assert_eq!(&blob[6..10], &[0, 0, 0, 3]);
    }

    #[test]
    fn encoded_blob_decodes() {
        let fingerprints = sample();
        let decoded = FileFingerprints::decode(&fingerprints.encode()).unwrap();
        assert_eq!(decoded, fingerprints);
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let blob = sample().encode();
        for len in [0, 3, 9, blob.len() - 1] {
            assert!(matches!(
                FileFingerprints::decode(&blob[..len]),
                Err(crate::Error::Deserialize)
            ));
        }
    }

    #[test]
    fn foreign_data_is_rejected() {
        let mut blob = sample().encode();
        blob[0] = b'X';
        assert!(matches!(
            FileFingerprints::decode(&blob),
            Err(crate::Error::Deserialize)
        ));

        let mut blob = sample().encode();
        blob[5] = 2;
        assert!(matches!(
            FileFingerprints::decode(&blob),
            Err(crate::Error::UnsupportedFormat)
        ));
    }

    #[test]
    fn discontiguous_chunks_are_rejected() {
        let mut chunks = chunks_of(&[b"hello", b"world"]);
        chunks[1].offset += 1;
        let fingerprints: FileFingerprints = vec![(RelativePathBuf::from("a"), chunks)]
            .into_iter()
            .collect();

        assert!(matches!(
            FileFingerprints::decode(&fingerprints.encode()),
            Err(crate::Error::Corrupt(_))
        ));
    }

    /// Encode a blob listing `paths` in order, each with one chunk.
    fn raw_blob(paths: &[&str]) -> Vec<u8> {
        let chunk = chunks_of(&[b"x"]).remove(0);
        let mut blob = Vec::new();
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        blob.extend_from_slice(&(paths.len() as u32).to_be_bytes());
        for path in paths {
            blob.extend_from_slice(&(path.len() as u32).to_be_bytes());
            blob.extend_from_slice(path.as_bytes());
            blob.extend_from_slice(&1u32.to_be_bytes());
            blob.extend_from_slice(&chunk.offset.to_be_bytes());
            blob.extend_from_slice(&chunk.size.to_be_bytes());
            blob.extend_from_slice(chunk.fingerprint.as_bytes());
        }
        blob
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        assert!(FileFingerprints::decode(&raw_blob(&["a", "b"])).is_ok());
        assert!(matches!(
            FileFingerprints::decode(&raw_blob(&["a", "b", "a"])),
            Err(crate::Error::Deserialize)
        ));
    }

    #[test]
    fn unnormalized_paths_are_rejected() {
        for path in ["", "/etc/passwd", "../outside", "a/../../b", "./a", "a//b", "a/"] {
            assert!(
                matches!(
                    FileFingerprints::decode(&raw_blob(&[path])),
                    Err(crate::Error::Deserialize)
                ),
                "{:?} was accepted",
                path
            );
        }
    }

    #[test]
    fn remove_prefix_removes_subtree() {
        let mut fingerprints = sample();
        fingerprints.insert("dir/sub/c".into(), chunks_of(&[b"c"]));
        fingerprints.insert("directory".into(), chunks_of(&[b"d"]));

        assert_eq!(fingerprints.remove_prefix("dir"), 2);
        assert!(fingerprints.contains("directory"));
        assert!(fingerprints.contains("a.csv"));
        assert!(!fingerprints.contains("dir/b.bin"));
    }
}
