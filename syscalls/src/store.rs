//! Host key/value store abstraction
//!
//! The host's persistent state is an ordered byte-keyed mapping. Anything
//! implementing [`KvStore`] can be handed to the storage callbacks; the
//! in-memory [`MemoryStore`] is provided for tests and tools.

use std::collections::BTreeMap;
use std::ops::Bound;

use nova_program_runtime::storage::Record;

/// Cursor over a key range of a [`KvStore`]
///
/// Iterators are owned by the iterator registry, which may be shared across
/// threads, hence the `Send` bound on the boxed form.
pub trait KvIterator {
    /// True while the cursor points at a record
    fn valid(&self) -> bool;

    /// Key at the cursor. Only meaningful while [`KvIterator::valid`].
    fn key(&self) -> &[u8];

    /// Value at the cursor. Only meaningful while [`KvIterator::valid`].
    fn value(&self) -> &[u8];

    /// Move the cursor to the next record
    fn next(&mut self);
}

/// Boxed iterator as stored in the registry
pub type BoxedKvIterator = Box<dyn KvIterator + Send>;

/// Ordered key/value store owned by the host
pub trait KvStore {
    /// Read a key; `None` when it was never written or has been deleted
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Write a key. An empty value is a value, not a deletion.
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Delete a key. Deleting an absent key is a no-op.
    fn delete(&mut self, key: &[u8]);

    /// Iterate over `[start, end)` in increasing key order
    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> BoxedKvIterator;

    /// Iterate over `[start, end)` in decreasing key order
    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> BoxedKvIterator;
}

/// Smallest key greater than every key starting with `prefix`
///
/// `None` when no such key exists, i.e. the prefix is empty or all `0xFF`.
pub fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let position = prefix.iter().rposition(|byte| *byte != u8::MAX)?;
    let mut upper = prefix[..position].to_vec();
    upper.push(prefix[position].saturating_add(1));
    Some(upper)
}

/// Effective `[start, end)` bounds of a prefix scan
///
/// The start is the larger of `prefix` and `start`, the end the smaller of
/// `end` and the prefix successor. An empty or absent bound is unbounded.
pub fn prefix_range(
    prefix: &[u8],
    start: Option<&[u8]>,
    end: Option<&[u8]>,
) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let start = start.filter(|start| !start.is_empty());
    let end = end.filter(|end| !end.is_empty());

    let lower = match start {
        Some(start) if start > prefix => Some(start.to_vec()),
        _ if prefix.is_empty() => None,
        _ => Some(prefix.to_vec()),
    };

    let upper = match (end, successor(prefix)) {
        (Some(end), Some(limit)) => Some(end.min(limit.as_slice()).to_vec()),
        (Some(end), None) => Some(end.to_vec()),
        (None, limit) => limit,
    };

    (lower, upper)
}

/// Iterator over a snapshot of records taken when the scan was opened
///
/// Writes made after the scan are not visible through it.
pub struct SnapshotIterator {
    records: Vec<Record>,
    position: usize,
}

impl SnapshotIterator {
    /// Iterate over `records` in the given order
    pub fn new(records: Vec<Record>) -> Self {
        SnapshotIterator {
            records,
            position: 0,
        }
    }

    fn current(&self) -> Option<&Record> {
        self.records.get(self.position)
    }
}

impl KvIterator for SnapshotIterator {
    fn valid(&self) -> bool {
        self.current().is_some()
    }

    fn key(&self) -> &[u8] {
        self.current().map(|(key, _)| key.as_slice()).unwrap_or_default()
    }

    fn value(&self) -> &[u8] {
        self.current()
            .map(|(_, value)| value.as_slice())
            .unwrap_or_default()
    }

    fn next(&mut self) {
        if self.valid() {
            self.position = self.position.saturating_add(1);
        }
    }
}

/// In-memory [`KvStore`] backed by a `BTreeMap`
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn collect(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Vec<Record> {
        if let (Some(start), Some(end)) = (start, end) {
            // BTreeMap::range panics on inverted bounds
            if start >= end {
                return Vec::new();
            }
        }
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
        self.data
            .range::<[u8], _>((lower, upper))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.data.insert(key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, key: &[u8]) {
        self.data.remove(key);
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> BoxedKvIterator {
        Box::new(SnapshotIterator::new(self.collect(start, end)))
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> BoxedKvIterator {
        let mut records = self.collect(start, end);
        records.reverse();
        Box::new(SnapshotIterator::new(records))
    }
}
