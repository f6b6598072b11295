//! Per-identifier shared/exclusive locks.
//!
//! Metadata records are guarded per uid, instance files per complete key.
//! Locks are created on first use and dropped from the table as soon as the
//! last guard for them is released, so the table only holds identifiers that
//! are currently in use.

use crate::key::RenditionKey;
use dashmap::DashMap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use std::sync::Arc;

/// What a per-identifier lock guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum LockId {
    /// A uid directory and its metadata record
    Uid(String),
    /// One instance file
    Instance(Arc<RenditionKey>),
}

type Slot = Arc<RwLock<()>>;

/// Reference-counted table of per-identifier locks.
#[derive(Default)]
pub(crate) struct LockTable {
    slots: DashMap<LockId, Slot>,
}

impl LockTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire `id` shared, blocking while a writer holds it.
    pub(crate) fn read(self: &Arc<Self>, id: LockId) -> ReadLock {
        let slot = self.slot(&id);
        let guard = slot.read_arc();
        ReadLock {
            guard: Some(guard),
            release: Release {
                table: Arc::clone(self),
                id,
            },
        }
    }

    /// Acquire `id` exclusively, blocking while any reader or writer holds it.
    pub(crate) fn write(self: &Arc<Self>, id: LockId) -> WriteLock {
        let slot = self.slot(&id);
        let guard = slot.write_arc();
        WriteLock {
            guard: Some(guard),
            release: Release {
                table: Arc::clone(self),
                id,
            },
        }
    }

    /// Number of identifiers with live guards.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, id: &LockId) -> Slot {
        Arc::clone(
            self.slots
                .entry(id.clone())
                .or_insert_with(|| Arc::new(RwLock::new(())))
                .value(),
        )
    }

    /// Remove the slot if nobody but the table references it.
    ///
    /// Runs under the shard lock, so it cannot race with [`slot`](Self::slot)
    /// handing out a new reference.
    fn forget_if_unused(&self, id: &LockId) {
        self.slots
            .remove_if(id, |_, slot| Arc::strong_count(slot) == 1);
    }
}

struct Release {
    table: Arc<LockTable>,
    id: LockId,
}

/// Shared guard on one identifier. Released on drop or by [`release`](Self::release).
pub(crate) struct ReadLock {
    guard: Option<ArcRwLockReadGuard<RawRwLock, ()>>,
    release: Release,
}

impl ReadLock {
    /// Release the lock. Idempotent.
    pub(crate) fn release(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.release.table.forget_if_unused(&self.release.id);
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.guard.is_none()
    }
}

impl Drop for ReadLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Exclusive guard on one identifier. Released on drop.
pub(crate) struct WriteLock {
    guard: Option<ArcRwLockWriteGuard<RawRwLock, ()>>,
    release: Release,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.release.table.forget_if_unused(&self.release.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn uid(s: &str) -> LockId {
        LockId::Uid(s.to_string())
    }

    #[test]
    fn test_table_forgets_released_locks() {
        let table = LockTable::new();
        {
            let _a = table.read(uid("a"));
            let _b = table.read(uid("a"));
            let _c = table.write(uid("c"));
            assert_eq!(table.len(), 2);
        }
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let table = LockTable::new();
        let mut lock = table.read(uid("a"));
        assert!(!lock.is_released());
        lock.release();
        lock.release();
        assert!(lock.is_released());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_readers_share() {
        let table = LockTable::new();
        let _first = table.read(uid("a"));

        let other = Arc::clone(&table);
        let handle = thread::spawn(move || {
            let _second = other.read(uid("a"));
            true
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_writer_waits_for_reader() {
        let table = LockTable::new();
        let mut reader = table.read(uid("a"));
        let written = Arc::new(AtomicBool::new(false));

        let other = Arc::clone(&table);
        let flag = Arc::clone(&written);
        let handle = thread::spawn(move || {
            let _w = other.write(uid("a"));
            flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!written.load(Ordering::SeqCst));

        reader.release();
        handle.join().unwrap();
        assert!(written.load(Ordering::SeqCst));
    }

    #[test]
    fn test_distinct_ids_do_not_block() {
        let table = LockTable::new();
        let _held = table.write(uid("a"));

        let other = Arc::clone(&table);
        let handle = thread::spawn(move || {
            let _w = other.write(uid("b"));
        });
        handle.join().unwrap();
    }
}
