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
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A lock acquired on a resource.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct Lock<'a, T: Eq + Hash + Clone + Debug> {
    table: &'a LockTable<T>,
    id: T,
}

impl<'a, T: Eq + Hash + Clone + Debug> Lock<'a, T> {
    /// The ID of the locked resource.
    pub fn id(&self) -> &T {
        &self.id
    }
}

impl<'a, T: Eq + Hash + Clone + Debug> Drop for Lock<'a, T> {
    fn drop(&mut self) {
        let mut locked = self.table.locked();
        locked.remove(&self.id);
        drop(locked);
        self.table.released.notify_all();
    }
}

/// A value which keeps track of locks on resources identified by generic IDs.
///
/// This locks resources between threads in a process. Locks on different IDs never contend.
#[derive(Debug)]
pub struct LockTable<T: Eq + Hash + Clone + Debug> {
    locked: Mutex<HashSet<T>>,
    released: Condvar,
}

impl<T: Eq + Hash + Clone + Debug> Default for LockTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone + Debug> LockTable<T> {
    /// Create a new empty `LockTable`.
    pub fn new() -> Self {
        Self {
            locked: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    // A panic while holding the mutex can't leave the set half-updated.
    fn locked(&self) -> MutexGuard<'_, HashSet<T>> {
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire a lock on the given `id`, blocking until it is available.
    pub fn acquire(&self, id: T) -> Lock<'_, T> {
        let mut locked = self.locked();
        while locked.contains(&id) {
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        locked.insert(id.clone());
        Lock { table: self, id }
    }

    /// Attempt to acquire a lock on the given `id`.
    ///
    /// This returns a new lock or `None` if the resource is already locked.
    pub fn try_acquire(&self, id: T) -> Option<Lock<'_, T>> {
        let mut locked = self.locked();
        if locked.contains(&id) {
            None
        } else {
            locked.insert(id.clone());
            Some(Lock { table: self, id })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn lock_is_released_on_drop() {
        let table = LockTable::new();
        let lock = table.try_acquire(1).unwrap();
        assert!(table.try_acquire(1).is_none());
        assert!(table.try_acquire(2).is_some());
        drop(lock);
        assert!(table.try_acquire(1).is_some());
    }

    #[test]
    fn acquire_excludes_other_threads() {
        let table = Arc::new(LockTable::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _lock = table.acquire("dataset");
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
