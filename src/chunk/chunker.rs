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

use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use cdchunking::ChunkerImpl;
use serde::{Deserialize, Serialize};

use super::fingerprint::{Chunk, Fingerprint};

/// The number of bytes the rolling hash is computed over.
pub const WINDOW_SIZE: usize = 32;

/// The default minimum chunk size (16 KiB).
pub const MIN_BLOCK_SIZE: u32 = 16 * 1024;

/// The default target average chunk size (32 KiB).
pub const AVG_BLOCK_SIZE: u32 = 32 * 1024;

/// The default maximum chunk size (64 KiB).
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024;

/// The size of the buffer input is read into.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Generate the table of per-byte values mixed into the rolling hash.
///
/// The table is produced by a fixed SplitMix64 sequence so every build chunks identically.
const fn byte_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut state: u64 = 0x0dd5_eed0_1234_5678;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        table[i] = z ^ (z >> 31);
        i += 1;
    }
    table
}

static BYTE_TABLE: [u64; 256] = byte_table();

/// The parameters for content-defined chunking.
///
/// These values must never change for data which has already been chunked, otherwise unchanged
/// regions of a file will no longer produce the same chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// No chunk except the last one in a file is smaller than this.
    pub min_block_size: u32,

    /// The size chunks should have on average.
    pub avg_block_size: u32,

    /// No chunk is larger than this.
    pub max_block_size: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_block_size: MIN_BLOCK_SIZE,
            avg_block_size: AVG_BLOCK_SIZE,
            max_block_size: MAX_BLOCK_SIZE,
        }
    }
}

impl ChunkerConfig {
    /// Return a new config with the given block sizes.
    ///
    /// # Errors
    /// - `Error::InvalidConfig`: The sizes are out of order or smaller than the hash window.
    pub fn new(min_block_size: u32, avg_block_size: u32, max_block_size: u32) -> crate::Result<Self> {
        let config = Self {
            min_block_size,
            avg_block_size,
            max_block_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the block sizes are usable.
    ///
    /// # Errors
    /// - `Error::InvalidConfig`: The sizes are out of order or smaller than the hash window.
    pub fn validate(&self) -> crate::Result<()> {
        if (self.min_block_size as usize) < WINDOW_SIZE {
            return Err(crate::Error::InvalidConfig(
                "the minimum block size is smaller than the hash window",
            ));
        }
        if self.avg_block_size <= self.min_block_size {
            return Err(crate::Error::InvalidConfig(
                "the average block size must be larger than the minimum",
            ));
        }
        if self.max_block_size < self.avg_block_size {
            return Err(crate::Error::InvalidConfig(
                "the maximum block size is smaller than the average",
            ));
        }
        Ok(())
    }

    /// The modulus a hash value must be divisible by to mark a boundary.
    ///
    /// Past the minimum size a boundary is found every `avg - min` bytes on average, so chunks
    /// come out at `avg` bytes on average.
    fn modulus(&self) -> u64 {
        u64::from(self.avg_block_size - self.min_block_size)
    }
}

/// A `ChunkerImpl` which finds boundaries with a rolling hash over a sliding window.
///
/// `find_boundary` returns the number of bytes of `data` which belong to the current chunk when
/// the chunk ends inside `data`. The chunker must be reset at the start of every chunk.
pub struct RollingChunker {
    min_size: usize,
    max_size: usize,
    modulus: u64,
    window: [u8; WINDOW_SIZE],
    window_pos: usize,
    rolled: usize,
    hash: u64,
    chunk_len: usize,
}

impl Debug for RollingChunker {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingChunker")
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("chunk_len", &self.chunk_len)
            .finish_non_exhaustive()
    }
}

impl RollingChunker {
    /// Return a new instance which chunks data the way `chunker` does.
    ///
    /// This takes a [`Chunker`] rather than a [`ChunkerConfig`] so that the config has already
    /// been validated.
    pub fn new(chunker: &Chunker) -> Self {
        let config = chunker.config();
        Self {
            min_size: config.min_block_size as usize,
            max_size: config.max_block_size as usize,
            modulus: config.modulus(),
            window: [0u8; WINDOW_SIZE],
            window_pos: 0,
            rolled: 0,
            hash: 0,
            chunk_len: 0,
        }
    }

    fn roll(&mut self, byte: u8) {
        let outgoing = self.window[self.window_pos];
        self.window[self.window_pos] = byte;
        self.window_pos = (self.window_pos + 1) % WINDOW_SIZE;

        self.hash = self.hash.rotate_left(1) ^ BYTE_TABLE[byte as usize];
        if self.rolled >= WINDOW_SIZE {
            self.hash ^= BYTE_TABLE[outgoing as usize].rotate_left(WINDOW_SIZE as u32);
        } else {
            self.rolled += 1;
        }
    }
}

impl ChunkerImpl for RollingChunker {
    fn find_boundary(&mut self, data: &[u8]) -> Option<usize> {
        // Bytes before this point can't affect the hash at the earliest possible boundary.
        let hash_start = self.min_size - WINDOW_SIZE;

        for (index, &byte) in data.iter().enumerate() {
            self.chunk_len += 1;

            if self.chunk_len > hash_start {
                self.roll(byte);
            }

            if self.chunk_len >= self.max_size
                || (self.chunk_len >= self.min_size && self.hash % self.modulus == 0)
            {
                return Some(index + 1);
            }
        }

        None
    }

    fn reset(&mut self) {
        self.window = [0u8; WINDOW_SIZE];
        self.window_pos = 0;
        self.rolled = 0;
        self.hash = 0;
        self.chunk_len = 0;
    }
}

/// Splits byte streams into content-defined chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Return a chunker which uses the given `config`.
    ///
    /// # Errors
    /// - `Error::InvalidConfig`: The config is invalid.
    pub fn new(config: ChunkerConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The config this chunker uses.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Return an iterator over the chunks of the bytes read from `reader`.
    pub fn chunks<R: Read>(&self, reader: R) -> Chunks<R> {
        Chunks {
            reader,
            chunker: RollingChunker::new(self),
            buffer: vec![0u8; READ_BUFFER_SIZE],
            start: 0,
            end: 0,
            hasher: blake3::Hasher::new(),
            chunk_len: 0,
            offset: 0,
            done: false,
        }
    }

    /// Chunk all the bytes read from `reader`.
    ///
    /// # Errors
    /// - `Error::Io`: An I/O error occurred.
    pub fn chunk_reader(&self, reader: impl Read) -> crate::Result<Vec<Chunk>> {
        let chunks = self.chunks(reader).collect::<io::Result<Vec<_>>>()?;
        tracing::debug!(chunks = chunks.len(), "chunked stream");
        Ok(chunks)
    }

    /// Chunk the file at `path`.
    ///
    /// # Errors
    /// - `Error::Io`: The file could not be read to completion.
    pub fn chunk_file(&self, path: impl AsRef<Path>) -> crate::Result<Vec<Chunk>> {
        let file = File::open(path.as_ref())?;
        self.chunk_reader(file)
    }

    /// Chunk the bytes in `data`.
    pub fn chunk_bytes(&self, data: &[u8]) -> Vec<Chunk> {
        self.chunks(data)
            .collect::<io::Result<Vec<_>>>()
            .expect("Reading from a byte slice cannot fail.")
    }
}

/// An iterator over the chunks of a byte stream.
///
/// This is returned by [`Chunker::chunks`]. Once it returns an error or `None`, it returns `None`
/// forever.
pub struct Chunks<R> {
    reader: R,
    chunker: RollingChunker,
    buffer: Vec<u8>,
    start: usize,
    end: usize,
    hasher: blake3::Hasher,
    chunk_len: usize,
    offset: u64,
    done: bool,
}

impl<R> Debug for Chunks<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunks")
            .field("chunker", &self.chunker)
            .field("offset", &self.offset)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<R> Chunks<R> {
    fn finish_chunk(&mut self) -> Chunk {
        let hasher = std::mem::replace(&mut self.hasher, blake3::Hasher::new());
        let chunk = Chunk {
            offset: self.offset,
            size: self.chunk_len as u32,
            fingerprint: Fingerprint::from(hasher.finalize()),
        };
        self.offset += self.chunk_len as u64;
        self.chunk_len = 0;
        self.chunker.reset();
        chunk
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.start == self.end {
                let bytes_read = match self.reader.read(&mut self.buffer) {
                    Ok(bytes_read) => bytes_read,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                };

                if bytes_read == 0 {
                    self.done = true;
                    return if self.chunk_len > 0 {
                        Some(Ok(self.finish_chunk()))
                    } else {
                        None
                    };
                }

                self.start = 0;
                self.end = bytes_read;
            }

            let unchunked_data = &self.buffer[self.start..self.end];
            match self.chunker.find_boundary(unchunked_data) {
                Some(index) => {
                    self.hasher.update(&unchunked_data[..index]);
                    self.chunk_len += index;
                    self.start += index;
                    return Some(Ok(self.finish_chunk()));
                }
                None => {
                    self.hasher.update(unchunked_data);
                    self.chunk_len += unchunked_data.len();
                    self.start = self.end;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_table_has_no_duplicates() {
        let mut values = BYTE_TABLE.to_vec();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 256);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(ChunkerConfig::new(16, 64, 128).is_err());
        assert!(ChunkerConfig::new(1024, 1024, 4096).is_err());
        assert!(ChunkerConfig::new(1024, 4096, 2048).is_err());
        assert!(ChunkerConfig::new(1024, 2048, 4096).is_ok());
    }

    #[test]
    fn boundary_depends_only_on_window() {
        // A huge modulus keeps boundaries from ending either chunk early.
        let chunker = Chunker::new(ChunkerConfig::new(64, 1 << 30, u32::MAX).unwrap()).unwrap();
        let mut first = RollingChunker::new(&chunker);
        let mut second = RollingChunker::new(&chunker);

        // Feed both chunkers different prefixes of the same length, then identical bytes.
        let prefix_a = vec![1u8; 100];
        let prefix_b = vec![2u8; 100];
        let tail: Vec<u8> = (0..WINDOW_SIZE as u32).map(|i| (i * 7) as u8).collect();

        first.find_boundary(&prefix_a);
        second.find_boundary(&prefix_b);
        first.find_boundary(&tail);
        second.find_boundary(&tail);

        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        let chunker = Chunker::default();
        assert!(chunker.chunk_bytes(&[]).is_empty());
    }

    #[test]
    fn short_input_is_one_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk_bytes(b"small");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].size, 5);
        assert_eq!(chunks[0].fingerprint, Fingerprint::of(b"small"));
    }
}
