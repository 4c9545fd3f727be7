//! Reader/writer guard around the record chain.
//!
//! [`Directory`] owns the chain and its lock together. All access goes through
//! [`Directory::read`] or [`Directory::write`], which report every lock
//! transition to an [`EventSink`] on behalf of the calling operation.

use std::fmt;

use parking_lot::RwLock;

use crate::events::EventSink;
use crate::store::OrderedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// Status transitions reported around a protected section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Waiting,
    Awakened,
    Acquired(LockMode),
    Released(LockMode),
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Waiting => "WAITING FOR MY TURN",
            LockStatus::Awakened => "AWAKENED FOR WORK",
            LockStatus::Acquired(LockMode::Read) => "READ LOCK ACQUIRED",
            LockStatus::Acquired(LockMode::Write) => "WRITE LOCK ACQUIRED",
            LockStatus::Released(LockMode::Read) => "READ LOCK RELEASED",
            LockStatus::Released(LockMode::Write) => "WRITE LOCK RELEASED",
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record chain bound to its single reader/writer lock.
#[derive(Debug, Default)]
pub struct Directory {
    store: RwLock<OrderedStore>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` under the read lock on behalf of `priority`.
    ///
    /// Any number of readers may hold the lock together; writers are excluded.
    pub fn read<R>(
        &self,
        events: &dyn EventSink,
        priority: u32,
        op: impl FnOnce(&OrderedStore) -> R,
    ) -> R {
        report(events, priority, LockStatus::Waiting);
        let store = self.store.read();
        report(events, priority, LockStatus::Awakened);
        report(events, priority, LockStatus::Acquired(LockMode::Read));

        let result = op(&store);

        drop(store);
        report(events, priority, LockStatus::Released(LockMode::Read));
        result
    }

    /// Run `op` under the exclusive write lock on behalf of `priority`.
    pub fn write<R>(
        &self,
        events: &dyn EventSink,
        priority: u32,
        op: impl FnOnce(&mut OrderedStore) -> R,
    ) -> R {
        report(events, priority, LockStatus::Waiting);
        let mut store = self.store.write();
        report(events, priority, LockStatus::Awakened);
        report(events, priority, LockStatus::Acquired(LockMode::Write));

        let result = op(&mut store);

        drop(store);
        report(events, priority, LockStatus::Released(LockMode::Write));
        result
    }

    /// Take the chain back once no other handle can reach the lock.
    pub fn into_store(self) -> OrderedStore {
        self.store.into_inner()
    }
}

fn report(events: &dyn EventSink, priority: u32, status: LockStatus) {
    events.log_status(priority, status.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::key::name_key;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    fn statuses(log: &EventLog<Vec<u8>>) -> Vec<String> {
        log.contents()
            .lines()
            .map(|line| {
                let (_, rest) = line.split_once(",THREAD ").unwrap();
                rest.to_string()
            })
            .collect()
    }

    #[test]
    fn test_write_reports_transitions_in_order() {
        let directory = Directory::new();
        let log = EventLog::in_memory();

        let upsert = directory.write(&log, 3, |store| {
            store.insert_or_update("alice", 1000, name_key("alice"))
        });
        assert!(!upsert.unwrap().was_update());

        assert_eq!(
            statuses(&log),
            [
                "3WAITING FOR MY TURN",
                "3AWAKENED FOR WORK",
                "3WRITE LOCK ACQUIRED",
                "3WRITE LOCK RELEASED",
            ]
        );
    }

    #[test]
    fn test_read_reports_transitions_in_order() {
        let directory = Directory::new();
        let log = EventLog::in_memory();

        let found = directory.read(&log, 9, |store| store.find("nobody"));
        assert!(found.is_none());

        assert_eq!(
            statuses(&log),
            [
                "9WAITING FOR MY TURN",
                "9AWAKENED FOR WORK",
                "9READ LOCK ACQUIRED",
                "9READ LOCK RELEASED",
            ]
        );
    }

    #[test]
    fn test_readers_share_the_lock() {
        let directory = Arc::new(Directory::new());
        let log = Arc::new(EventLog::in_memory());
        let barrier = Arc::new(Barrier::new(2));

        // Both readers must be inside the section at once to pass the barrier.
        let handles: Vec<_> = (0..2)
            .map(|priority| {
                let directory = directory.clone();
                let log = log.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    directory.read(log.as_ref(), priority, |store| {
                        barrier.wait();
                        store.len()
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0);
        }
    }

    #[test]
    fn test_writers_are_exclusive() {
        let directory = Arc::new(Directory::new());
        let log = Arc::new(EventLog::in_memory());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8u32)
            .map(|priority| {
                let directory = directory.clone();
                let log = log.clone();
                let inside = inside.clone();
                let overlaps = overlaps.clone();
                std::thread::spawn(move || {
                    for round in 0..25 {
                        let name = format!("w{priority}-{round}");
                        directory.write(log.as_ref(), priority, |store| {
                            if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            store.insert_or_update(&name, round, name_key(&name)).unwrap();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        let directory = Arc::try_unwrap(directory).unwrap();
        assert_eq!(directory.into_store().verify().unwrap(), 200);
    }
}
