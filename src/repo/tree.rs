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
use std::path::Path;

use relative_path::{Component, RelativePath, RelativePathBuf};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// A file or directory in the contents of a draft or version.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum ContentNode {
    /// A regular file.
    File {
        /// The file name.
        name: String,

        /// The path of the file relative to the root of the draft or version.
        path: RelativePathBuf,
    },

    /// A directory.
    Directory {
        /// The directory name.
        name: String,

        /// The path of the directory relative to the root of the draft or version.
        path: RelativePathBuf,

        /// The entries in the directory, sorted by name.
        children: Vec<ContentNode>,
    },
}

impl ContentNode {
    /// The name of this file or directory.
    pub fn name(&self) -> &str {
        match self {
            ContentNode::File { name, .. } | ContentNode::Directory { name, .. } => name,
        }
    }

    /// The path of this file or directory relative to the root.
    pub fn path(&self) -> &RelativePath {
        match self {
            ContentNode::File { path, .. } | ContentNode::Directory { path, .. } => path,
        }
    }

    /// The entries in this directory, or an empty slice for a file.
    pub fn children(&self) -> &[ContentNode] {
        match self {
            ContentNode::File { .. } => &[],
            ContentNode::Directory { children, .. } => children,
        }
    }

    /// Whether this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, ContentNode::File { .. })
    }
}

/// Build the tree of files and directories below `root`.
///
/// # Errors
/// - `Error::InvalidPath`: A file name is not valid UTF-8.
/// - `Error::Io`: An I/O error occurred.
pub fn scan(root: &Path) -> crate::Result<Vec<ContentNode>> {
    scan_directory(root, RelativePath::new(""))
}

fn scan_directory(directory: &Path, prefix: &RelativePath) -> crate::Result<Vec<ContentNode>> {
    let walker = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    let mut nodes = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let name = entry
            .file_name()
            .to_str()
            .ok_or(crate::Error::InvalidPath)?
            .to_owned();
        let path = prefix.join(&name);

        if entry.file_type().is_dir() {
            let children = scan_directory(entry.path(), &path)?;
            nodes.push(ContentNode::Directory {
                name,
                path,
                children,
            });
        } else {
            nodes.push(ContentNode::File { name, path });
        }
    }

    Ok(nodes)
}

/// Check a client-supplied file path and return it in normal form.
///
/// # Errors
/// - `Error::InvalidPath`: The path is empty, absolute, or refers to a location outside the root.
pub fn validate_path(path: &str) -> crate::Result<RelativePathBuf> {
    if path.is_empty() || path.starts_with('/') || path.contains('\0') {
        return Err(crate::Error::InvalidPath);
    }

    let normalized = RelativePath::new(path).normalize();
    match normalized.components().next() {
        None | Some(Component::ParentDir) => Err(crate::Error::InvalidPath),
        Some(_) => Ok(normalized),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir_all, write};

    use super::*;

    #[test]
    fn escaping_paths_are_rejected() {
        for path in ["", "/etc/passwd", "..", "../x", "a/../../x", "a/..", "."] {
            assert!(
                matches!(validate_path(path), Err(crate::Error::InvalidPath)),
                "{:?} should be rejected",
                path
            );
        }
    }

    #[test]
    fn paths_are_normalized() {
        assert_eq!(validate_path("a/./b/../c.csv").unwrap().as_str(), "a/c.csv");
        assert_eq!(validate_path("data.bin").unwrap().as_str(), "data.bin");
    }

    #[test]
    fn scan_sorts_children_by_name() {
        let temp = tempfile::tempdir().unwrap();
        create_dir_all(temp.path().join("b/inner")).unwrap();
        write(temp.path().join("b/inner/z"), b"").unwrap();
        write(temp.path().join("b/a"), b"").unwrap();
        write(temp.path().join("c"), b"").unwrap();
        write(temp.path().join("a"), b"").unwrap();

        let tree = scan(temp.path()).unwrap();

        let names: Vec<_> = tree.iter().map(ContentNode::name).collect();
        assert_eq!(names, ["a", "b", "c"]);

        let directory = &tree[1];
        assert!(!directory.is_file());
        assert_eq!(directory.path().as_str(), "b");
        let children: Vec<_> = directory
            .children()
            .iter()
            .map(|child| child.path().as_str())
            .collect();
        assert_eq!(children, ["b/a", "b/inner"]);
        assert_eq!(
            directory.children()[1].children()[0].path().as_str(),
            "b/inner/z"
        );
    }
}
