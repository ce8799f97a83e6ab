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

//! Datasets, their versions, and the drafts which become new versions.
//!
//! A [`Repository`] keeps every dataset, version, and draft in a [`ContentStore`]. A dataset
//! has a linear history of immutable versions and a pointer to its current version. New versions
//! are created by uploading files into a [`Draft`] and publishing it.
//!
//! # Drafts
//! A draft is either created empty, in which case publishing it creates a new dataset, or forked
//! from the current version of an existing dataset, in which case it starts with a copy of that
//! version's files. Files can be added whole with [`Repository::add_file`], or replaced with a
//! delta upload against the stored copy using [`Repository::replace_file`]. A tar archive can be
//! unpacked into a draft with [`Repository::add_archive`].
//!
//! An upload which fails part way leaves the draft as it was. Files it would replace are kept
//! aside until the upload completes.
//!
//! # Publishing
//! Publishing a draft moves its files into a new version and points the dataset at it. A draft
//! forked from a version which is no longer current can't be published; it must be forked again
//! and its changes redone. See [`Repository::publish`] for details.
//!
//! Publishing is atomic with respect to the dataset pointer. If publishing fails at any point
//! before the pointer is updated, the files are moved back into the draft.
//!
//! [`ContentStore`]: crate::store::ContentStore

pub use self::archive::ArchiveFormat;
pub use self::config::{DeleteMode, RepoConfig};
pub use self::entity::{Dataset, Draft, Version};
pub use self::fingerprints::{merge, FingerprintKey, FingerprintStore};
pub use self::lock::{Lock, LockTable};
pub use self::repository::Repository;
pub use self::tree::{scan, validate_path, ContentNode};

mod archive;
mod config;
mod entity;
mod fingerprints;
mod lock;
mod repository;
mod staging;
mod tree;

uuid_type! {
    /// The ID of a draft.
    DraftId
}

uuid_type! {
    /// The ID of a dataset.
    DatasetId
}

uuid_type! {
    /// The ID of a version of a dataset.
    VersionId
}

/// A version takes the ID of the draft it was published from.
impl From<DraftId> for VersionId {
    fn from(id: DraftId) -> Self {
        VersionId::new(id.into())
    }
}
