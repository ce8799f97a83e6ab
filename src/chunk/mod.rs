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

//! Content-defined chunking and delta transfer of files.
//!
//! A client splits its copy of a file into chunks with a [`Chunker`], compares them against the
//! chunks the server already has with [`find_missing`], and sends a [`FileUpload`] carrying the
//! complete new chunk list plus the bytes of the missing chunks. The server then rebuilds the
//! file with a [`Reconstructor`].

pub use self::blob::{FileFingerprints, FORMAT_VERSION};
pub use self::chunker::{
    Chunker, ChunkerConfig, Chunks, RollingChunker, AVG_BLOCK_SIZE, MAX_BLOCK_SIZE,
    MIN_BLOCK_SIZE, WINDOW_SIZE,
};
pub use self::delta::{find_missing, missing_bytes};
pub use self::fingerprint::{check_coverage, covered_length, Chunk, Fingerprint, FINGERPRINT_SIZE};
pub use self::reconstruct::{ReconstructStats, Reconstructor};
pub use self::upload::{FileUpload, PartKey};

mod blob;
mod chunker;
mod delta;
mod fingerprint;
mod reconstruct;
mod upload;
