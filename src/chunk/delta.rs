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

use std::collections::HashSet;

use super::fingerprint::{Chunk, Fingerprint};

/// Return the chunks in `local` which the holder of `remote` does not have.
///
/// Chunks are compared by fingerprint only. A local chunk whose bytes appear anywhere in the
/// remote file, even at a different offset, is considered present. The returned chunks are in the
/// same order as in `local`.
pub fn find_missing(local: &[Chunk], remote: &[Chunk]) -> Vec<Chunk> {
    let remote_fingerprints: HashSet<&Fingerprint> =
        remote.iter().map(|chunk| &chunk.fingerprint).collect();

    local
        .iter()
        .filter(|chunk| !remote_fingerprints.contains(&chunk.fingerprint))
        .copied()
        .collect()
}

/// Return the number of bytes which must be transferred to bring `remote` up to `local`.
pub fn missing_bytes(local: &[Chunk], remote: &[Chunk]) -> u64 {
    find_missing(local, remote)
        .iter()
        .map(|chunk| u64::from(chunk.size))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u64, size: u32, content: &[u8]) -> Chunk {
        Chunk {
            offset,
            size,
            fingerprint: Fingerprint::of(content),
        }
    }

    #[test]
    fn identical_lists_have_nothing_missing() {
        let chunks = vec![chunk(0, 3, b"abc"), chunk(3, 3, b"def")];
        assert!(find_missing(&chunks, &chunks).is_empty());
    }

    #[test]
    fn moved_chunk_is_not_missing() {
        let local = vec![chunk(0, 3, b"def"), chunk(3, 3, b"abc")];
        let remote = vec![chunk(0, 3, b"abc"), chunk(3, 3, b"def")];
        assert!(find_missing(&local, &remote).is_empty());
    }

    #[test]
    fn changed_chunks_are_missing_in_order() {
        let local = vec![chunk(0, 3, b"abc"), chunk(3, 3, b"xyz"), chunk(6, 2, b"zz")];
        let remote = vec![chunk(0, 3, b"abc"), chunk(3, 3, b"def")];

        let missing = find_missing(&local, &remote);

        assert_eq!(missing, vec![local[1], local[2]]);
        assert_eq!(missing_bytes(&local, &remote), 5);
    }

    #[test]
    fn everything_is_missing_from_empty_remote() {
        let local = vec![chunk(0, 3, b"abc")];
        assert_eq!(find_missing(&local, &[]), local);
    }
}
