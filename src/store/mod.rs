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

//! Storage backends for repositories.
//!
//! This module provides the storage backend a [`Repository`] keeps its drafts, datasets, and
//! versions in. A [`ContentStore`] maps each [`EntryKey`] to a location and provides the
//! primitive operations a repository is built from, such as atomic writes and moves.
//!
//! Each content store has a corresponding config type which implements [`OpenStore`] and is used
//! to open or create the store. [`DirectoryStore`] is the store provided out of the box and keeps
//! everything in a directory in the local file system.
//!
//! [`Repository`]: crate::repo::Repository

pub use self::content_store::{
    ContentStore, EntryKey, DATA_DIRECTORY, FINGERPRINTS_FILE, RECORD_FILE,
};
pub use self::directory_store::{DirectoryConfig, DirectoryStore};
pub use self::open_store::OpenStore;

mod content_store;
mod directory_store;
mod open_store;
