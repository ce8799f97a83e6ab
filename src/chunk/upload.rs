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
use std::fmt::{self, Display, Formatter};
use std::io::{Read, Seek, SeekFrom};
use std::str::FromStr;

use super::chunker::Chunker;
use super::delta::find_missing;
use super::fingerprint::{covered_length, Chunk};

/// Identifies the target chunk an upload part fills.
///
/// On the wire, a part is named `"<offset>-<size>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartKey {
    pub offset: u64,
    pub size: u32,
}

impl From<&Chunk> for PartKey {
    fn from(chunk: &Chunk) -> Self {
        Self {
            offset: chunk.offset,
            size: chunk.size,
        }
    }
}

impl Display for PartKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.offset, self.size)
    }
}

impl FromStr for PartKey {
    type Err = crate::Error;

    fn from_str(name: &str) -> crate::Result<Self> {
        let (offset, size) = name.split_once('-').ok_or(crate::Error::InvalidPartName)?;
        Ok(Self {
            offset: offset.parse().map_err(|_| crate::Error::InvalidPartName)?,
            size: size.parse().map_err(|_| crate::Error::InvalidPartName)?,
        })
    }
}

/// A delta upload of one file.
///
/// This carries the complete new chunk list of the file and the bytes of every chunk the server
/// doesn't already have.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpload {
    chunks: Vec<Chunk>,
    length: u64,
    parts: HashMap<PartKey, Vec<u8>>,
}

impl FileUpload {
    /// Return an upload for a file made of `chunks` with no parts yet.
    ///
    /// The length of the file is the sum of the chunk sizes.
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let length = covered_length(&chunks);
        Self {
            chunks,
            length,
            parts: HashMap::new(),
        }
    }

    /// Return an upload which declares a file `length` independent of the chunk sizes.
    ///
    /// The length is checked against the chunks when the file is reconstructed.
    pub fn with_length(chunks: Vec<Chunk>, length: u64) -> Self {
        Self {
            chunks,
            length,
            parts: HashMap::new(),
        }
    }

    /// Build the upload of the file in `reader` against the server's `remote` chunks.
    ///
    /// This chunks the whole file and then reads back only the chunks `remote` is missing.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    pub fn from_local<R: Read + Seek>(
        chunker: &Chunker,
        mut reader: R,
        remote: &[Chunk],
    ) -> crate::Result<Self> {
        let chunks = chunker.chunk_reader(&mut reader)?;
        let missing = find_missing(&chunks, remote);
        let mut upload = Self::new(chunks);

        for chunk in &missing {
            let mut payload = vec![0u8; chunk.size as usize];
            reader.seek(SeekFrom::Start(chunk.offset))?;
            reader.read_exact(&mut payload)?;
            upload.insert_part(PartKey::from(chunk), payload);
        }

        tracing::debug!(
            chunks = upload.chunks.len(),
            parts = upload.parts.len(),
            length = upload.length,
            "prepared upload"
        );

        Ok(upload)
    }

    /// Add the bytes for the target chunk identified by `key`.
    ///
    /// This replaces any bytes previously supplied for the same key.
    pub fn insert_part(&mut self, key: PartKey, payload: Vec<u8>) {
        self.parts.insert(key, payload);
    }

    /// Add a part whose wire `name` encodes its offset and size.
    ///
    /// # Errors
    /// - `Error::InvalidPartName`: The name does not have the form `"<offset>-<size>"`.
    pub fn insert_named_part(&mut self, name: &str, payload: Vec<u8>) -> crate::Result<()> {
        let key = name.parse()?;
        self.insert_part(key, payload);
        Ok(())
    }

    /// The complete chunk list of the new file.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The declared length of the new file.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The bytes supplied for the chunk identified by `key`.
    pub fn part(&self, key: &PartKey) -> Option<&[u8]> {
        self.parts.get(key).map(Vec::as_slice)
    }

    /// The parts of this upload.
    pub fn parts(&self) -> impl Iterator<Item = (&PartKey, &[u8])> {
        self.parts.iter().map(|(key, payload)| (key, payload.as_slice()))
    }

    /// The total number of payload bytes in this upload.
    pub fn payload_bytes(&self) -> u64 {
        self.parts.values().map(|payload| payload.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_names_parse() {
        let key: PartKey = "65536-32768".parse().unwrap();
        assert_eq!(
            key,
            PartKey {
                offset: 65536,
                size: 32768
            }
        );
        assert_eq!(key.to_string(), "65536-32768");
    }

    #[test]
    fn malformed_part_names_are_rejected() {
        for name in ["", "12", "12-", "-12", "a-b", "1-2-3", "5-99999999999"] {
            assert!(
                matches!(name.parse::<PartKey>(), Err(crate::Error::InvalidPartName)),
                "{:?} should not parse",
                name
            );
        }
    }
}
