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

use std::io;
use std::result;

use thiserror::Error as DeriveError;

use crate::repo::VersionId;

/// The reason a request conflicted with the current state of the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Another version of the dataset was published after the draft was created.
    ///
    /// The draft must be forked again from the current version and its edits redone.
    StaleParent {
        /// The version the draft was forked from.
        parent: Option<VersionId>,

        /// The version the dataset currently points to.
        current: Option<VersionId>,
    },

    /// The destination path already exists and overwriting was not allowed.
    AlreadyExists,
}

/// The way in which a reconstruction or a stored record was found to be inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// A chunk list did not start at offset zero or had a gap or overlap.
    Discontiguous {
        /// The offset the next chunk was expected to start at.
        expected: u64,

        /// The offset the chunk actually started at.
        found: u64,
    },

    /// A chunk had a size of zero.
    EmptyChunk { offset: u64 },

    /// The chunks did not add up to the declared length of the file.
    LengthMismatch { expected: u64, actual: u64 },

    /// A chunk which is not in the stored file was not supplied by the upload.
    MissingPayload { offset: u64, size: u32 },

    /// A supplied payload does not have the size of the chunk it fills.
    PayloadSize { offset: u64, size: u32, actual: usize },

    /// The bytes for a chunk do not hash to its fingerprint.
    FingerprintMismatch { offset: u64 },

    /// The stored file ended before a chunk which should be copied from it.
    SourceTruncated { offset: u64 },

    /// The stored file which chunks should be copied from does not exist.
    MissingSource,
}

/// The error type for operations with a repository.
#[derive(Debug, DeriveError)]
pub enum Error {
    /// A draft, dataset, version, or file was not found.
    #[error("A resource was not found.")]
    NotFound,

    /// The request conflicts with the current state of the repository.
    #[error("The request conflicts with the current state of the repository: {0:?}")]
    Conflict(Conflict),

    /// Data could not be reconstructed or a stored record is inconsistent.
    #[error("The data is corrupt: {0:?}")]
    Corrupt(Corruption),

    /// The provided file path is invalid.
    #[error("The provided file path is invalid.")]
    InvalidPath,

    /// A record failed validation.
    #[error("The record is invalid: {0}")]
    InvalidRecord(&'static str),

    /// A configuration value is invalid.
    #[error("The configuration is invalid: {0}")]
    InvalidConfig(&'static str),

    /// An uploaded archive contains an entry which can't be unpacked into a draft.
    #[error("The archive is invalid: {0}")]
    InvalidArchive(&'static str),

    /// The name of an upload part does not encode an offset and size.
    #[error("The upload part name is invalid.")]
    InvalidPartName,

    /// A value could not be serialized.
    #[error("A value could not be serialized.")]
    Serialize,

    /// A value could not be deserialized.
    #[error("A value could not be deserialized.")]
    Deserialize,

    /// This fingerprint format is not supported by this version of the library.
    #[error("This fingerprint format is not supported by this version of the library.")]
    UnsupportedFormat,

    /// This store format is not supported by this version of the library.
    #[error("This store format is not supported by this version of the library.")]
    UnsupportedStore,

    /// An I/O error occurred.
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl From<Conflict> for Error {
    fn from(conflict: Conflict) -> Self {
        Error::Conflict(conflict)
    }
}

impl From<Corruption> for Error {
    fn from(corruption: Corruption) -> Self {
        Error::Corrupt(corruption)
    }
}

/// The result type for operations with a repository.
pub type Result<T> = result::Result<T, Error>;
