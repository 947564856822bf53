//! Storage capability table and the VM-side storage wrapper

use crate::error::{BackendError, BackendResult, ErrorCode};
use crate::iterator::{iterator_t, HostIterator, IteratorVtable};
use crate::memory::{U8SliceView, UnmanagedVector};
use crate::storage::{Order, Storage, StorageIterator};

/// Opaque per-invocation storage state owned by the host
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct db_t {
    _private: [u8; 0],
}

/// `read_db(db, key, value_out, err_out)`
pub type ReadDbFn = extern "C" fn(
    *mut db_t,
    U8SliceView,
    *mut UnmanagedVector, // value output
    *mut UnmanagedVector, // error message output
) -> i32;

/// `write_db(db, key, value, err_out)`
pub type WriteDbFn = extern "C" fn(
    *mut db_t,
    U8SliceView,
    U8SliceView,
    *mut UnmanagedVector, // error message output
) -> i32;

/// `remove_db(db, key, err_out)`
pub type RemoveDbFn = extern "C" fn(
    *mut db_t,
    U8SliceView,
    *mut UnmanagedVector, // error message output
) -> i32;

/// `scan_db(db, prefix, start, end, order, iter_out, err_out)`
pub type ScanDbFn = extern "C" fn(
    *mut db_t,
    U8SliceView, // prefix
    U8SliceView, // start
    U8SliceView, // end
    i32,         // order
    *mut iterator_t,
    *mut UnmanagedVector, // error message output
) -> i32;

// The host may hand over an incomplete table, so every slot is optional.
// Return values are plain i32 because a foreign enum value cannot be trusted.
/// Storage capability table
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct DbVtable {
    /// Read one key
    pub read_db: Option<ReadDbFn>,
    /// Write one key
    pub write_db: Option<WriteDbFn>,
    /// Remove one key
    pub remove_db: Option<RemoveDbFn>,
    /// Open a range iterator
    pub scan_db: Option<ScanDbFn>,
}

/// Storage capability: host state plus the tables operating on it
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct Db {
    /// Host state, only valid during the current invocation
    pub state: *mut db_t,
    /// Storage callbacks
    pub vtable: DbVtable,
    /// Callbacks for iterators opened through `scan_db`
    pub iterator_vtable: IteratorVtable,
}

fn missing(name: &str) -> BackendError {
    BackendError::unknown(format!("vtable function '{name}' not set"))
}

/// [`Storage`] implementation that forwards every call through a [`Db`]
pub struct VmStorage {
    db: Db,
}

impl VmStorage {
    /// Wraps the storage table received by an entry point
    pub fn new(db: Db) -> Self {
        VmStorage { db }
    }
}

impl Storage for VmStorage {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        let read_db = self.db.vtable.read_db.ok_or_else(|| missing("read_db"))?;

        let mut output = UnmanagedVector::default();
        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = read_db(
            self.db.state,
            U8SliceView::new(Some(key)),
            &mut output as *mut UnmanagedVector,
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();
        // The output is destroyed here whether or not it is needed
        let output = output.consume();

        let default = || {
            format!(
                "Failed to read a key in the db: {}",
                String::from_utf8_lossy(key)
            )
        };
        code.into_result(error_msg, default)?;

        Ok(output)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        let write_db = self.db.vtable.write_db.ok_or_else(|| missing("write_db"))?;

        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = write_db(
            self.db.state,
            U8SliceView::new(Some(key)),
            U8SliceView::new(Some(value)),
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();

        let default = || {
            format!(
                "Failed to set a key in the db: {}",
                String::from_utf8_lossy(key)
            )
        };
        code.into_result(error_msg, default)
    }

    fn remove(&mut self, key: &[u8]) -> BackendResult<()> {
        let remove_db = self
            .db
            .vtable
            .remove_db
            .ok_or_else(|| missing("remove_db"))?;

        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = remove_db(
            self.db.state,
            U8SliceView::new(Some(key)),
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();

        let default = || {
            format!(
                "Failed to delete a key in the db: {}",
                String::from_utf8_lossy(key)
            )
        };
        code.into_result(error_msg, default)
    }

    fn scan(
        &mut self,
        prefix: &[u8],
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BackendResult<Box<dyn StorageIterator>> {
        let scan_db = self.db.vtable.scan_db.ok_or_else(|| missing("scan_db"))?;

        let mut error_msg = UnmanagedVector::default();
        let mut iter = iterator_t::default();
        let code: ErrorCode = scan_db(
            self.db.state,
            U8SliceView::new(Some(prefix)),
            U8SliceView::new(start),
            U8SliceView::new(end),
            order.into(),
            &mut iter as *mut iterator_t,
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();

        let default = || {
            format!(
                "Failed to read the next key between {:?} and {:?}",
                start.map(String::from_utf8_lossy),
                end.map(String::from_utf8_lossy),
            )
        };
        code.into_result(error_msg, default)?;

        Ok(Box::new(HostIterator {
            db: self.db.state,
            state: iter,
            vtable: self.db.iterator_vtable,
        }))
    }
}
