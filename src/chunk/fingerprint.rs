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

use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::Corruption;

/// The size of a [`Fingerprint`] in bytes.
pub const FINGERPRINT_SIZE: usize = 32;

/// The BLAKE3 hash of the bytes of a chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Compute the fingerprint of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap raw fingerprint `bytes`.
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }

    /// The raw bytes of this fingerprint.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// A content-defined byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    /// The offset of the first byte of the chunk in the file.
    pub offset: u64,

    /// The number of bytes in the chunk.
    pub size: u32,

    /// The hash of the bytes in the chunk.
    pub fingerprint: Fingerprint,
}

impl Chunk {
    /// The offset one past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }

    /// The range of bytes in the file this chunk covers.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.end()
    }
}

/// Check that `chunks` cover a file of `length` bytes exactly once, in order.
///
/// The first chunk must start at offset zero, every following chunk must start where the previous
/// one ended, no chunk may be empty, and the sizes must add up to `length`.
pub fn check_coverage(chunks: &[Chunk], length: u64) -> Result<(), Corruption> {
    let mut expected = 0u64;

    for chunk in chunks {
        if chunk.offset != expected {
            return Err(Corruption::Discontiguous {
                expected,
                found: chunk.offset,
            });
        }
        if chunk.size == 0 {
            return Err(Corruption::EmptyChunk {
                offset: chunk.offset,
            });
        }
        expected = chunk.end();
    }

    if expected != length {
        return Err(Corruption::LengthMismatch {
            expected: length,
            actual: expected,
        });
    }

    Ok(())
}

/// Return the number of bytes covered by `chunks`.
pub fn covered_length(chunks: &[Chunk]) -> u64 {
    chunks.iter().map(|chunk| u64::from(chunk.size)).sum()
}
