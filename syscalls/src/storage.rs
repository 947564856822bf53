//! Storage callbacks
//!
//! These are the host functions behind the storage and iterator tables.
//! The table state points at a [`DbState`], which bundles the store the VM
//! may touch during this invocation, the shared iterator registry and the
//! invocation's call id.
//!
//! Every callback:
//! 1. rejects null pointers and nil views with `BadArgument`;
//! 2. panics if an output slot already holds a vector;
//! 3. performs the operation;
//! 4. writes each output slot at most once, as its last step.
//!
//! Panics never leave a callback; see [`crate::recovery`].

use nova_program_runtime::db::{db_t, Db, DbVtable};
use nova_program_runtime::error::ErrorCode;
use nova_program_runtime::iterator::{iterator_t, IteratorVtable};
use nova_program_runtime::memory::{assert_none, write_output, U8SliceView, UnmanagedVector};
use nova_program_runtime::storage::Order;

use crate::callback_names;
use crate::recovery::recover_panic;
use crate::registry::IteratorRegistry;
use crate::store::{prefix_range, KvStore};

/// Host state behind a [`Db`] table
pub struct DbState<'a> {
    /// Store for this invocation
    pub store: &'a mut dyn KvStore,
    /// Registry holding this invocation's iterators
    pub registry: &'a IteratorRegistry,
    /// Call id of this invocation
    pub call_id: u64,
}

impl<'a> DbState<'a> {
    /// Bundles the state for one invocation
    pub fn new(store: &'a mut dyn KvStore, registry: &'a IteratorRegistry, call_id: u64) -> Self {
        DbState {
            store,
            registry,
            call_id,
        }
    }
}

/// The storage table pointing at the host callbacks of this module
pub fn db_vtable() -> DbVtable {
    DbVtable {
        read_db: Some(db_read),
        write_db: Some(db_write),
        remove_db: Some(db_remove),
        scan_db: Some(db_scan),
    }
}

/// The iterator table pointing at [`iterator_next`]
pub fn iterator_vtable() -> IteratorVtable {
    IteratorVtable {
        next_db: Some(iterator_next),
    }
}

/// Builds the [`Db`] handed to the VM for one invocation
///
/// The table borrows `state` without a lifetime; it must not be used after
/// `state` is dropped.
pub fn build_db(state: &mut DbState<'_>) -> Db {
    Db {
        state: state as *mut DbState<'_> as *mut db_t,
        vtable: db_vtable(),
        iterator_vtable: iterator_vtable(),
    }
}

/// Recovers the state behind a table pointer
///
/// # Safety
/// `db` must be null or come from [`build_db`] with the state still alive.
unsafe fn to_state<'s>(db: *mut db_t) -> Option<&'s mut DbState<'s>> {
    (db as *mut DbState<'s>).as_mut()
}

/// Writes `msg` into the error slot and returns `code`
fn fail(err_out: &mut UnmanagedVector, code: ErrorCode, msg: impl Into<String>) -> ErrorCode {
    write_output(err_out, Some(msg.into().into_bytes()));
    code
}

/// Host side of `read_db`
pub extern "C" fn db_read(
    db: *mut db_t,
    key: U8SliceView,
    value_out: *mut UnmanagedVector,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::DB_READ, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(value_out), Some(err_out)) =
            (unsafe { to_state(db) }, unsafe { value_out.as_mut() }, unsafe { err_out.as_mut() })
        else {
            return ErrorCode::BadArgument;
        };
        assert_none(value_out);
        assert_none(err_out);
        let Some(key) = key.read() else {
            return ErrorCode::BadArgument;
        };

        let value = state.store.get(key);
        log::debug!(
            "db_read: call={} key_len={} found={}",
            state.call_id,
            key.len(),
            value.is_some()
        );
        write_output(value_out, value);
        ErrorCode::Success
    })
    .into()
}

/// Host side of `write_db`
pub extern "C" fn db_write(
    db: *mut db_t,
    key: U8SliceView,
    value: U8SliceView,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::DB_WRITE, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(err_out)) = (unsafe { to_state(db) }, unsafe { err_out.as_mut() }) else {
            return ErrorCode::BadArgument;
        };
        assert_none(err_out);
        let (Some(key), Some(value)) = (key.read(), value.read()) else {
            return ErrorCode::BadArgument;
        };

        log::debug!(
            "db_write: call={} key_len={} value_len={}",
            state.call_id,
            key.len(),
            value.len()
        );
        state.store.set(key, value);
        ErrorCode::Success
    })
    .into()
}

/// Host side of `remove_db`
pub extern "C" fn db_remove(db: *mut db_t, key: U8SliceView, err_out: *mut UnmanagedVector) -> i32 {
    recover_panic(callback_names::DB_REMOVE, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(err_out)) = (unsafe { to_state(db) }, unsafe { err_out.as_mut() }) else {
            return ErrorCode::BadArgument;
        };
        assert_none(err_out);
        let Some(key) = key.read() else {
            return ErrorCode::BadArgument;
        };

        log::debug!("db_remove: call={} key_len={}", state.call_id, key.len());
        state.store.delete(key);
        ErrorCode::Success
    })
    .into()
}

/// Host side of `scan_db`
///
/// Opens an iterator over the keys starting with `prefix`, clamped to
/// `[start, end)`, and registers it in the current call's frame.
#[allow(clippy::too_many_arguments)]
pub extern "C" fn db_scan(
    db: *mut db_t,
    prefix: U8SliceView,
    start: U8SliceView,
    end: U8SliceView,
    order: i32,
    iter_out: *mut iterator_t,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::DB_SCAN, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(iter_out), Some(err_out)) =
            (unsafe { to_state(db) }, unsafe { iter_out.as_mut() }, unsafe { err_out.as_mut() })
        else {
            return ErrorCode::BadArgument;
        };
        assert_none(err_out);
        if iter_out.iterator_index != 0 {
            panic!("Got an assigned iterator handle we're about to override");
        }
        let Some(prefix) = prefix.read() else {
            return ErrorCode::BadArgument;
        };
        let Ok(order) = Order::try_from(order) else {
            return fail(err_out, ErrorCode::BadArgument, format!("Invalid order: {order}"));
        };

        let (lower, upper) = prefix_range(prefix, start.read(), end.read());
        let store = &*state.store;
        // The store is only asked for a cursor once the frame has room
        let stored = state.registry.store_iterator_with(state.call_id, || match order {
            Order::Ascending => store.iterator(lower.as_deref(), upper.as_deref()),
            Order::Descending => store.reverse_iterator(lower.as_deref(), upper.as_deref()),
        });

        match stored {
            Ok(iterator_index) => {
                log::debug!(
                    "db_scan: call={} prefix_len={} order={order:?} index={iterator_index}",
                    state.call_id,
                    prefix.len()
                );
                *iter_out = iterator_t {
                    call_id: state.call_id,
                    iterator_index,
                };
                ErrorCode::Success
            }
            Err(err) => fail(err_out, ErrorCode::User, err.to_string()),
        }
    })
    .into()
}

/// Host side of `next_db`
///
/// Writes the next record into `key_out`/`value_out`, or leaves both `none`
/// once the iterator is exhausted. An unknown or stale handle is a protocol
/// violation and yields `ErrorCode::Panic`.
pub extern "C" fn iterator_next(
    db: *mut db_t,
    iter: iterator_t,
    key_out: *mut UnmanagedVector,
    value_out: *mut UnmanagedVector,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::ITERATOR_NEXT, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(key_out), Some(value_out), Some(err_out)) = (
            unsafe { to_state(db) },
            unsafe { key_out.as_mut() },
            unsafe { value_out.as_mut() },
            unsafe { err_out.as_mut() },
        ) else {
            return ErrorCode::BadArgument;
        };
        assert_none(key_out);
        assert_none(value_out);
        assert_none(err_out);
        if iter.call_id != state.call_id {
            panic!(
                "Iterator of call {} used during call {}",
                iter.call_id, state.call_id
            );
        }

        if let Some((key, value)) = state.registry.next(iter.call_id, iter.iterator_index) {
            write_output(key_out, Some(key));
            write_output(value_out, Some(value));
        }
        ErrorCode::Success
    })
    .into()
}
