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

use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::tree::ContentNode;
use super::{DatasetId, DraftId, VersionId};

/// A mutable staging area which becomes a version of a dataset when it is published.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub(super) id: DraftId,
    pub(super) dataset_id: Option<DatasetId>,
    pub(super) parent_version_id: Option<VersionId>,
    pub(super) created: SystemTime,
    pub(super) contents: Vec<ContentNode>,
}

impl Draft {
    pub(super) fn new(dataset_id: Option<DatasetId>, parent_version_id: Option<VersionId>) -> Self {
        Self {
            id: DraftId::generate(),
            dataset_id,
            parent_version_id,
            created: SystemTime::now(),
            contents: Vec::new(),
        }
    }

    /// The ID of this draft.
    pub fn id(&self) -> DraftId {
        self.id
    }

    /// The dataset this draft will be published to.
    ///
    /// This is `None` if publishing the draft creates a new dataset.
    pub fn dataset_id(&self) -> Option<DatasetId> {
        self.dataset_id
    }

    /// The version this draft was forked from.
    ///
    /// This is `None` for a draft which was created empty.
    pub fn parent_version_id(&self) -> Option<VersionId> {
        self.parent_version_id
    }

    /// The time this draft was created.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// The tree of files in this draft.
    pub fn contents(&self) -> &[ContentNode] {
        &self.contents
    }
}

/// A logical collection of data with a linear history of versions.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub(super) id: DatasetId,
    pub(super) current_version_id: VersionId,
}

impl Dataset {
    /// The ID of this dataset.
    pub fn id(&self) -> DatasetId {
        self.id
    }

    /// The most recently published version of this dataset.
    pub fn current_version_id(&self) -> VersionId {
        self.current_version_id
    }
}

/// An immutable, published snapshot of a dataset.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Version {
    pub(super) id: VersionId,
    pub(super) dataset_id: DatasetId,
    pub(super) parent_version_id: Option<VersionId>,
    pub(super) created: SystemTime,
    pub(super) author: String,
    pub(super) message: String,
    pub(super) contents: Vec<ContentNode>,
}

impl Version {
    /// Create a version record, checking that it has an author and a message.
    ///
    /// # Errors
    /// - `Error::InvalidRecord`: The author or message is empty.
    pub(super) fn new(
        id: VersionId,
        dataset_id: DatasetId,
        parent_version_id: Option<VersionId>,
        author: &str,
        message: &str,
        contents: Vec<ContentNode>,
    ) -> crate::Result<Self> {
        if author.trim().is_empty() {
            return Err(crate::Error::InvalidRecord("a version must have an author"));
        }
        if message.trim().is_empty() {
            return Err(crate::Error::InvalidRecord("a version must have a message"));
        }

        Ok(Self {
            id,
            dataset_id,
            parent_version_id,
            created: SystemTime::now(),
            author: author.to_owned(),
            message: message.to_owned(),
            contents,
        })
    }

    /// The ID of this version.
    pub fn id(&self) -> VersionId {
        self.id
    }

    /// The dataset this version belongs to.
    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    /// The version which was current when this one was published.
    ///
    /// This is `None` for the first version of a dataset.
    pub fn parent_version_id(&self) -> Option<VersionId> {
        self.parent_version_id
    }

    /// The time this version was published.
    pub fn created(&self) -> SystemTime {
        self.created
    }

    /// Who published this version.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// A description of the changes in this version.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The tree of files in this version.
    pub fn contents(&self) -> &[ContentNode] {
        &self.contents
    }
}

/// Serialize a record.
pub(super) fn to_record<T: Serialize>(value: &T) -> crate::Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|_| crate::Error::Serialize)
}

/// Deserialize a record.
pub(super) fn from_record<T: DeserializeOwned>(data: &[u8]) -> crate::Result<T> {
    rmp_serde::from_slice(data).map_err(|_| crate::Error::Deserialize)
}
