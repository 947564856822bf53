//! Call-scoped iterator registry
//!
//! Host iterators cannot be handed to the VM as pointers. Instead, every
//! invocation gets a call id from [`IteratorRegistry::start_call`], each
//! scan stores its iterator in that call's frame, and the VM receives the
//! pair `(call_id, index)`. [`IteratorRegistry::end_call`] drops the whole
//! frame, whether or not the iterators were exhausted.
//!
//! The registry is an ordinary value shared by `Arc`, so independent hosts
//! (and tests) never see each other's iterators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nova_program_runtime::storage::Record;
use thiserror::Error;

use crate::store::{BoxedKvIterator, KvIterator};

/// Default maximum number of iterators one invocation may open
pub const MAX_ITERATORS_PER_CALL: usize = 32_768;

/// Registry error types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The invocation already holds the maximum number of iterators
    #[error("Reached iterator limit ({limit})")]
    LimitReached {
        /// Configured limit
        limit: usize,
    },
    /// The call id was never started or has already ended
    #[error("Call {call_id} is not active")]
    UnknownCall {
        /// The offending call id
        call_id: u64,
    },
}

type Frame = Vec<BoxedKvIterator>;
type SharedFrame = Arc<Mutex<Frame>>;

/// Iterator frames keyed by call id
///
/// The map lock is only held to look a frame up. Stepping an iterator locks
/// just its own frame, so a slow host cursor in one call does not stall the
/// others.
pub struct IteratorRegistry {
    next_call_id: AtomicU64,
    frames: Mutex<HashMap<u64, SharedFrame>>,
    limit: usize,
}

impl Default for IteratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// A panic while a lock is held (e.g. gas running out inside a metered
// iterator) leaves the data consistent, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IteratorRegistry {
    /// Creates a registry with the default per-call limit
    pub fn new() -> Self {
        Self::with_limit(MAX_ITERATORS_PER_CALL)
    }

    /// Creates a registry allowing at most `limit` iterators per call
    pub fn with_limit(limit: usize) -> Self {
        IteratorRegistry {
            next_call_id: AtomicU64::new(1),
            frames: Mutex::new(HashMap::new()),
            limit,
        }
    }

    /// Per-call iterator limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn frame(&self, call_id: u64) -> Option<SharedFrame> {
        lock(&self.frames).get(&call_id).cloned()
    }

    /// Allocates a fresh call id with an empty frame
    pub fn start_call(&self) -> u64 {
        let call_id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.frames).insert(call_id, Arc::new(Mutex::new(Vec::new())));
        log::debug!("started call {call_id}");
        call_id
    }

    /// Stores `iterator` in the frame of `call_id`
    ///
    /// # Returns
    /// The 1-based index of the iterator inside the frame
    ///
    /// # Errors
    /// - `LimitReached` - If the frame is full
    /// - `UnknownCall` - If the call is not active
    pub fn store_iterator(&self, call_id: u64, iterator: BoxedKvIterator) -> Result<u64, RegistryError> {
        self.store_iterator_with(call_id, || iterator)
    }

    /// Like [`IteratorRegistry::store_iterator`], but only builds the
    /// iterator once the frame is known to have room for it
    ///
    /// # Errors
    /// - `LimitReached` - If the frame is full; `open` is not called
    /// - `UnknownCall` - If the call is not active; `open` is not called
    pub fn store_iterator_with<F>(&self, call_id: u64, open: F) -> Result<u64, RegistryError>
    where
        F: FnOnce() -> BoxedKvIterator,
    {
        let frame = self
            .frame(call_id)
            .ok_or(RegistryError::UnknownCall { call_id })?;
        let mut frame = lock(&frame);
        if frame.len() >= self.limit {
            return Err(RegistryError::LimitReached { limit: self.limit });
        }
        frame.push(open());
        Ok(frame.len() as u64)
    }

    /// Returns the record under the cursor of iterator `index` and advances it
    ///
    /// Returns `None` once the iterator is exhausted, as often as it is
    /// asked.
    ///
    /// # Panics
    ///
    /// Panics if `call_id` is not active or `index` does not name an
    /// iterator of that call. A handle like that can only come from a broken
    /// or malicious caller.
    pub fn next(&self, call_id: u64, index: u64) -> Option<Record> {
        let found = self.frame(call_id).and_then(|frame| {
            let mut frame = lock(&frame);
            frame
                .get_mut(slot(index)?)
                .map(|iterator| take_record(iterator.as_mut()))
        });
        // No guard is held past this point
        match found {
            Some(record) => record,
            None => panic!("Iterator {index} of call {call_id} does not exist"),
        }
    }

    /// Drops every iterator of `call_id`
    ///
    /// # Returns
    /// The number of iterators released
    pub fn end_call(&self, call_id: u64) -> usize {
        let frame = lock(&self.frames).remove(&call_id);
        let released = frame.map_or(0, |frame| {
            let len = lock(&frame).len();
            len
        });
        log::debug!("ended call {call_id}, released {released} iterators");
        released
    }

    /// Number of calls currently holding a frame
    pub fn open_frames(&self) -> usize {
        lock(&self.frames).len()
    }

    /// Number of iterators open in `call_id`, `None` if the call is not active
    pub fn frame_len(&self, call_id: u64) -> Option<usize> {
        self.frame(call_id).map(|frame| {
            let len = lock(&frame).len();
            len
        })
    }
}

fn slot(index: u64) -> Option<usize> {
    usize::try_from(index.checked_sub(1)?).ok()
}

fn take_record(iterator: &mut (dyn KvIterator + Send)) -> Option<Record> {
    if !iterator.valid() {
        return None;
    }
    let record = (iterator.key().to_vec(), iterator.value().to_vec());
    iterator.next();
    Some(record)
}
