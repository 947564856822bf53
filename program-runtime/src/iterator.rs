//! Iterator handles and the iterator capability table
//!
//! The host never hands out pointers to its iterators. Instead a scan
//! returns an [`iterator_t`] naming the invocation (call id) and the
//! position of the iterator inside that invocation's frame. The pair is
//! only meaningful until the invocation ends.

use crate::db::db_t;
use crate::error::{BackendError, BackendResult, ErrorCode};
use crate::memory::UnmanagedVector;
use crate::storage::{Record, StorageIterator};

/// Handle of a host-side iterator
///
/// `iterator_index` is 1-based; an index of 0 means "not assigned yet" and is
/// what the VM passes in as the scan output slot.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub struct iterator_t {
    /// Invocation the iterator belongs to
    pub call_id: u64,
    /// Position in the invocation's iterator frame, starting at 1
    pub iterator_index: u64,
}

/// Signature of the host's `next_db` callback
pub type NextDbFn = extern "C" fn(
    *mut db_t,
    iterator_t,
    *mut UnmanagedVector, // key output
    *mut UnmanagedVector, // value output
    *mut UnmanagedVector, // error message output
) -> i32;

/// Iterator capability table
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct IteratorVtable {
    /// Advance an iterator; returns an [`ErrorCode`] as `i32`
    pub next_db: Option<NextDbFn>,
}

/// A host iterator as seen by the VM
///
/// Holds everything needed to call back into the host: the storage state
/// pointer, the handle returned by the scan and the function table.
#[derive(Debug, Copy, Clone)]
pub struct HostIterator {
    /// Storage state the iterator was opened on
    pub db: *mut db_t,
    /// Handle assigned by the host
    pub state: iterator_t,
    /// Callback table
    pub vtable: IteratorVtable,
}

impl HostIterator {
    /// Fetches the next record from the host.
    ///
    /// Both output vectors are consumed whatever the host answered.
    pub fn next_record(&mut self) -> BackendResult<Option<Record>> {
        let next_db = self
            .vtable
            .next_db
            .ok_or_else(|| BackendError::unknown("iterator vtable not set"))?;

        let mut output_key = UnmanagedVector::default();
        let mut output_value = UnmanagedVector::default();
        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = next_db(
            self.db,
            self.state,
            &mut output_key as *mut UnmanagedVector,
            &mut output_value as *mut UnmanagedVector,
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();
        let output_key = output_key.consume();
        let output_value = output_value.consume();

        let default = || "Failed to fetch next item from iterator".to_string();
        code.into_result(error_msg, default)?;

        match (output_key, output_value) {
            (Some(key), Some(value)) => Ok(Some((key, value))),
            (None, _) => Ok(None),
            (Some(_), None) => Err(BackendError::unknown(
                "Failed to read value while reading the next key in the db",
            )),
        }
    }
}

impl StorageIterator for HostIterator {
    fn next(&mut self) -> BackendResult<Option<Record>> {
        self.next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::write_output;

    extern "C" fn next_pair(
        _db: *mut db_t,
        iter: iterator_t,
        key_out: *mut UnmanagedVector,
        value_out: *mut UnmanagedVector,
        _err_out: *mut UnmanagedVector,
    ) -> i32 {
        // Yields exactly one record for index 1, nothing for the others
        if iter.iterator_index == 1 {
            unsafe {
                write_output(&mut *key_out, Some(b"k".to_vec()));
                write_output(&mut *value_out, Some(b"v".to_vec()));
            }
        }
        ErrorCode::Success.into()
    }

    extern "C" fn next_key_only(
        _db: *mut db_t,
        _iter: iterator_t,
        key_out: *mut UnmanagedVector,
        _value_out: *mut UnmanagedVector,
        _err_out: *mut UnmanagedVector,
    ) -> i32 {
        unsafe { write_output(&mut *key_out, Some(b"k".to_vec())) };
        ErrorCode::Success.into()
    }

    extern "C" fn next_fails(
        _db: *mut db_t,
        _iter: iterator_t,
        _key_out: *mut UnmanagedVector,
        _value_out: *mut UnmanagedVector,
        err_out: *mut UnmanagedVector,
    ) -> i32 {
        unsafe { write_output(&mut *err_out, Some(b"iterator gone".to_vec())) };
        ErrorCode::User.into()
    }

    fn host_iterator(index: u64, next_db: NextDbFn) -> HostIterator {
        HostIterator {
            db: std::ptr::null_mut(),
            state: iterator_t {
                call_id: 1,
                iterator_index: index,
            },
            vtable: IteratorVtable {
                next_db: Some(next_db),
            },
        }
    }

    #[test]
    fn test_next_record() {
        let mut iter = host_iterator(1, next_pair);
        assert_eq!(iter.next().unwrap(), Some((b"k".to_vec(), b"v".to_vec())));

        let mut iter = host_iterator(2, next_pair);
        assert_eq!(iter.next().unwrap(), None);
    }

    #[test]
    fn test_next_record_key_without_value() {
        let mut iter = host_iterator(1, next_key_only);
        assert!(matches!(iter.next(), Err(BackendError::Unknown { .. })));
    }

    #[test]
    fn test_next_record_reports_host_error() {
        let mut iter = host_iterator(1, next_fails);
        assert_eq!(iter.next(), Err(BackendError::user_err("iterator gone")));
    }

    #[test]
    fn test_next_record_without_vtable() {
        let mut iter = HostIterator {
            db: std::ptr::null_mut(),
            state: iterator_t::default(),
            vtable: IteratorVtable::default(),
        };
        assert_eq!(
            iter.next(),
            Err(BackendError::unknown("iterator vtable not set"))
        );
    }
}
