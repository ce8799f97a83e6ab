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

use crate::store::ContentStore;

/// A value which can be used to open a `ContentStore`.
pub trait OpenStore {
    /// The type of `ContentStore` which this value can be used to open.
    type Store: ContentStore + 'static;

    /// Open or create a content store of type `Store`.
    ///
    /// This opens the content store, creating it if it does not already exist.
    ///
    /// # Errors
    /// - `Error::UnsupportedStore`: The content store is an unsupported format. This can happen
    /// if the layout changed or if the location represented by this value does not contain a
    /// valid content store.
    /// - `Error::Io`: An I/O error occurred.
    fn open(&self) -> crate::Result<Self::Store>;
}
