//! Hash-ordered record chain.
//!
//! Records live in an arena and are linked through successor indices. The chain
//! is kept non-decreasing by key; records sharing a key form one contiguous run
//! in insertion order. None of the operations here synchronize on their own:
//! callers hold the [`Directory`](crate::guard::Directory) lock in the right mode.

pub mod record;

use std::collections::{HashSet, TryReserveError};

use thiserror::Error;

use crate::key::name_key;
pub use record::{Record, MAX_NAME_LEN};

/// Errors raised by chain operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },
    #[error("failed to allocate record storage: {0}")]
    AllocationFailed(#[from] TryReserveError),
    #[error("chain corrupted: {0}")]
    Corrupted(String),
}

/// Result of [`OrderedStore::insert_or_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new record was linked into the chain.
    Inserted,
    /// An existing record had its salary overwritten.
    Updated { previous: u32 },
}

impl Upsert {
    pub fn previous_salary(&self) -> Option<u32> {
        match self {
            Upsert::Inserted => None,
            Upsert::Updated { previous } => Some(*previous),
        }
    }

    pub fn was_update(&self) -> bool {
        matches!(self, Upsert::Updated { .. })
    }
}

#[derive(Debug)]
struct Node {
    record: Record,
    next: Option<usize>,
}

/// Where a name sits (or would sit) in the chain.
struct Position {
    prev: Option<usize>,
    matched: Option<usize>,
}

/// Arena-backed singly linked chain of records.
#[derive(Debug, Default)]
pub struct OrderedStore {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    len: usize,
}

impl OrderedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate records in chain order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            store: self,
            cursor: self.head,
        }
    }

    /// Look up `name`. Requires at least the read lock.
    ///
    /// Scans from the head, matching on key first and name second, and keeps
    /// going through a run of equal keys so colliding names are all visited.
    /// Stops as soon as a key larger than the target shows up.
    pub fn find(&self, name: &str) -> Option<Record> {
        let key = name_key(name);
        let mut cursor = self.head;
        while let Some(node) = cursor.and_then(|idx| self.node(idx)) {
            if node.record.key == key && node.record.name == name {
                return Some(node.record.clone());
            }
            if node.record.key > key {
                break;
            }
            cursor = node.next;
        }
        None
    }

    /// Insert `name` or overwrite its salary. Requires the write lock.
    ///
    /// New records go to the tail of their key's run.
    pub fn insert_or_update(
        &mut self,
        name: &str,
        salary: u32,
        key: u32,
    ) -> Result<Upsert, StoreError> {
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        let position = self.locate(name, key);
        if let Some(node) = position.matched.and_then(|idx| self.node_mut(idx)) {
            let previous = std::mem::replace(&mut node.record.salary, salary);
            return Ok(Upsert::Updated { previous });
        }

        let mut owned_name = String::new();
        owned_name.try_reserve_exact(name.len())?;
        owned_name.push_str(name);

        let next = match position.prev {
            Some(prev) => self.node(prev).and_then(|node| node.next),
            None => self.head,
        };
        let idx = self.allocate(Node {
            record: Record::new(key, owned_name, salary),
            next,
        })?;

        match position.prev.and_then(|prev| self.node_mut(prev)) {
            Some(prev) => prev.next = Some(idx),
            None => self.head = Some(idx),
        }
        self.len += 1;
        Ok(Upsert::Inserted)
    }

    /// Unlink `name` and return its salary. Requires the write lock.
    ///
    /// A missing name is a normal outcome and yields `None`.
    pub fn delete(&mut self, name: &str, key: u32) -> Option<u32> {
        let position = self.locate(name, key);
        let idx = position.matched?;
        let node = self.slots.get_mut(idx)?.take()?;

        match position.prev.and_then(|prev| self.node_mut(prev)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        self.len -= 1;
        // The slot stays unused if the free list cannot grow.
        if self.free.try_reserve(1).is_ok() {
            self.free.push(idx);
        }
        Some(node.record.salary)
    }

    /// Copy every record in chain order. Requires at least the read lock.
    ///
    /// The copy is independent of the chain, so the lock can be dropped before
    /// the records are formatted or written anywhere.
    pub fn snapshot(&self) -> Vec<Record> {
        let mut records = Vec::with_capacity(self.len);
        records.extend(self.iter().cloned());
        records
    }

    /// Walk the whole chain and check its structural invariants.
    ///
    /// Detects cycles, links into empty slots, keys going backwards, duplicate
    /// names and a record count that disagrees with the tracked length. Returns
    /// the number of records on success.
    pub fn verify(&self) -> Result<usize, StoreError> {
        let mut visited = vec![false; self.slots.len()];
        let mut names = HashSet::with_capacity(self.len);
        let mut last_key: Option<u32> = None;
        let mut count = 0;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let node = self
                .node(idx)
                .ok_or_else(|| StoreError::Corrupted(format!("link to empty slot {idx}")))?;
            if std::mem::replace(&mut visited[idx], true) {
                return Err(StoreError::Corrupted(format!("cycle through slot {idx}")));
            }
            if let Some(last) = last_key {
                if node.record.key < last {
                    return Err(StoreError::Corrupted(format!(
                        "key {} follows key {}",
                        node.record.key, last
                    )));
                }
            }
            if !names.insert(node.record.name.as_str()) {
                return Err(StoreError::Corrupted(format!(
                    "duplicate name {}",
                    node.record.name
                )));
            }
            last_key = Some(node.record.key);
            count += 1;
            cursor = node.next;
        }

        if count != self.len {
            return Err(StoreError::Corrupted(format!(
                "chain holds {count} records but length is {}",
                self.len
            )));
        }
        Ok(count)
    }

    /// Two-phase walk used by insert and delete: skip smaller keys, then scan
    /// the equal-key run for `name`. `prev` ends on the last node visited, which
    /// is the tail of the run when the name is absent.
    fn locate(&self, name: &str, key: u32) -> Position {
        let mut prev = None;
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else { break };
            if node.record.key >= key {
                break;
            }
            prev = Some(idx);
            cursor = node.next;
        }

        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else { break };
            if node.record.key != key {
                break;
            }
            if node.record.name == name {
                return Position {
                    prev,
                    matched: Some(idx),
                };
            }
            prev = Some(idx);
            cursor = node.next;
        }

        Position {
            prev,
            matched: None,
        }
    }

    fn allocate(&mut self, node: Node) -> Result<usize, StoreError> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            return Ok(idx);
        }
        self.slots.try_reserve(1)?;
        self.slots.push(Some(node));
        Ok(self.slots.len() - 1)
    }

    fn node(&self, idx: usize) -> Option<&Node> {
        self.slots.get(idx)?.as_ref()
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node> {
        self.slots.get_mut(idx)?.as_mut()
    }
}

/// Iterator over records in chain order.
pub struct Iter<'a> {
    store: &'a OrderedStore,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.store.node(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.record)
    }
}
