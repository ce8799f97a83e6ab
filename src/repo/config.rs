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

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkerConfig;

/// What happens to a draft once it is published or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Move the draft to the store's trash directory, where it can be recovered by hand.
    Trash,

    /// Remove the draft and its files.
    Permanent,
}

/// The configuration for a repository.
///
/// This type implements `Default` to provide a reasonable default configuration. The chunking
/// parameters must not change once files have been uploaded, because clients and the server
/// must split the same bytes into the same chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct RepoConfig {
    /// The parameters for content-defined chunking.
    ///
    /// The default value is `ChunkerConfig::default()`.
    pub chunking: ChunkerConfig,

    /// What happens to drafts once they are published or deleted.
    ///
    /// The default value is `DeleteMode::Trash`.
    pub delete_mode: DeleteMode,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            chunking: ChunkerConfig::default(),
            delete_mode: DeleteMode::Trash,
        }
    }
}
