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

//! `ddreplay` is a library for versioning datasets with delta uploads.
//!
//! Clients upload files into mutable drafts and publish drafts as immutable versions of a
//! dataset. Uploads use content-defined chunking so that only the parts of a file which changed
//! need to be transferred; the server rebuilds the complete file from the bytes it already has
//! plus the new chunks.
//!
//! This crate provides:
//! - [`chunk`], the delta transfer engine: a content-defined [`Chunker`], the [`find_missing`]
//! delta calculation, and the [`Reconstructor`] which rebuilds files from an upload.
//! - [`repo`], the [`Repository`] of drafts, datasets, and versions, including publishing with
//! optimistic concurrency.
//! - [`store`], the [`ContentStore`] a repository keeps its data in.
//!
//! This library logs through [`tracing`] and never installs a subscriber itself.
//!
//! # Examples
//! ```
//! use std::io::Cursor;
//! use ddreplay::repo::{RepoConfig, Repository};
//! use ddreplay::store::DirectoryConfig;
//!
//! fn main() -> ddreplay::Result<()> {
//!     let directory = tempfile::tempdir()?;
//!     let repo = Repository::open(&DirectoryConfig::new(directory.path()), RepoConfig::default())?;
//!
//!     // Upload a file into a new draft and publish it as the first version of a dataset.
//!     let draft = repo.create_empty_draft()?;
//!     repo.add_file(draft.id(), "data/table.csv", Cursor::new(b"a,b\n1,2\n"), false)?;
//!     let version = repo.publish(draft.id(), "Alice", "Initial import")?;
//!
//!     // Fork the dataset to start on the next version.
//!     let draft = repo.fork_draft(version.dataset_id())?;
//!     assert_eq!(draft.parent_version_id(), Some(version.id()));
//!
//!     Ok(())
//! }
//! ```
//!
//! [`Chunker`]: crate::chunk::Chunker
//! [`find_missing`]: crate::chunk::find_missing
//! [`Reconstructor`]: crate::chunk::Reconstructor
//! [`Repository`]: crate::repo::Repository
//! [`ContentStore`]: crate::store::ContentStore

pub use relative_path;
pub use uuid;

pub use error::{Conflict, Corruption, Error, Result};

mod id;

mod error;
pub mod chunk;
pub mod repo;
pub mod store;
