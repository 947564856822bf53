//! Buffer types that cross the host/VM boundary.
//!
//! Two kinds of buffers exist:
//!
//! - **Views** ([`ByteSliceView`], [`U8SliceView`]) borrow memory owned by the
//!   caller for the duration of one call. The receiver never frees them and
//!   must copy anything it wants to keep.
//! - **Unmanaged vectors** ([`UnmanagedVector`]) own their memory. Whoever
//!   holds one is responsible for destroying it exactly once.
//!
//! Both kinds distinguish "absent" from "empty", which is how a missing key
//! is told apart from a key holding an empty value.

use std::mem::{self, ManuallyDrop};
use std::slice;

/// A view into an externally owned byte slice, created by the host when
/// calling into the VM.
///
/// The view is only valid for the duration of the call that received it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteSliceView {
    /// True when this view stands for "no value" rather than a slice.
    is_nil: bool,
    ptr: *const u8,
    len: usize,
}

impl ByteSliceView {
    /// Creates a view over `source`.
    ///
    /// The caller must keep `source` alive for as long as the view is used.
    pub fn new(source: &[u8]) -> Self {
        Self {
            is_nil: false,
            ptr: source.as_ptr(),
            len: source.len(),
        }
    }

    /// Creates a view standing for an absent value.
    pub fn nil() -> Self {
        Self {
            is_nil: true,
            ptr: std::ptr::null(),
            len: 0,
        }
    }

    /// Creates a view from an optional slice.
    pub fn from_option(source: Option<&[u8]>) -> Self {
        match source {
            Some(data) => Self::new(data),
            None => Self::nil(),
        }
    }

    /// Provides a reference to the viewed data, or `None` for a nil view.
    pub fn read(&self) -> Option<&[u8]> {
        if self.is_nil {
            None
        } else if self.len == 0 || self.ptr.is_null() {
            Some(&[])
        } else {
            // SAFETY: the producer guarantees ptr/len describe live memory
            // for the duration of the call.
            Some(unsafe { slice::from_raw_parts(self.ptr, self.len) })
        }
    }

    /// Copies the viewed data into a new vector.
    pub fn to_owned(&self) -> Option<Vec<u8>> {
        self.read().map(|slice| slice.to_vec())
    }
}

/// A view into a byte slice owned by the VM, passed to host callbacks.
///
/// Semantically identical to [`ByteSliceView`]; the separate type keeps the
/// direction of each call visible in signatures.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct U8SliceView {
    /// True when this view stands for "no value" rather than a slice.
    is_none: bool,
    ptr: *const u8,
    len: usize,
}

impl U8SliceView {
    /// Creates a view from an optional slice.
    pub fn new(source: Option<&[u8]>) -> Self {
        match source {
            Some(data) => Self {
                is_none: false,
                ptr: data.as_ptr(),
                len: data.len(),
            },
            None => Self {
                is_none: true,
                ptr: std::ptr::null(),
                len: 0,
            },
        }
    }

    /// Provides a reference to the viewed data, or `None` for an absent view.
    pub fn read(&self) -> Option<&[u8]> {
        if self.is_none {
            None
        } else if self.len == 0 || self.ptr.is_null() {
            Some(&[])
        } else {
            // SAFETY: the VM keeps the viewed memory alive until the
            // callback returns.
            Some(unsafe { slice::from_raw_parts(self.ptr, self.len) })
        }
    }
}

/// An optional vector that requires explicit creation and destruction and
/// can be sent across the boundary.
///
/// It is always allocated and freed by the Rust allocator. Ownership is the
/// right and the obligation to destroy it exactly once:
///
/// - when returned from an entry point, ownership moves to the host, which
///   copies the data and calls [`destroy_unmanaged_vector`];
/// - when a host callback writes one into an output pointer, ownership moves
///   to the VM, which destroys it with [`UnmanagedVector::consume`].
///
/// There is deliberately no `Drop` implementation: dropping a copy that has
/// crossed the boundary would free memory the other side still owns.
#[repr(C)]
#[derive(Debug)]
pub struct UnmanagedVector {
    /// True when this is "no value", as opposed to an empty vector.
    is_none: bool,
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

impl UnmanagedVector {
    /// Takes ownership of `source` (or records its absence).
    pub fn new(source: Option<Vec<u8>>) -> Self {
        match source {
            Some(data) => {
                let (ptr, len, cap) = if data.capacity() == 0 {
                    // Zero capacity vectors own no allocation
                    (std::ptr::null_mut::<u8>(), 0, 0)
                } else {
                    let mut data = ManuallyDrop::new(data);
                    (data.as_mut_ptr(), data.len(), data.capacity())
                };
                Self {
                    is_none: false,
                    ptr,
                    len,
                    cap,
                }
            }
            None => Self {
                is_none: true,
                ptr: std::ptr::null_mut::<u8>(),
                len: 0,
                cap: 0,
            },
        }
    }

    /// Returns true for "no value".
    pub fn is_none(&self) -> bool {
        self.is_none
    }

    /// Returns true when a value (possibly empty) is held.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Takes the data out and frees the unmanaged vector.
    ///
    /// This is the only way to release the memory.
    pub fn consume(self) -> Option<Vec<u8>> {
        if self.is_none {
            None
        } else if self.cap == 0 || self.ptr.is_null() {
            Some(Vec::new())
        } else {
            // SAFETY: ptr/len/cap came from a Vec<u8> leaked in `new`, and
            // ownership rules guarantee this is the only consumer.
            Some(unsafe { Vec::from_raw_parts(self.ptr, self.len, self.cap) })
        }
    }
}

impl Default for UnmanagedVector {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Writes `value` into an output slot handed over by the other side.
///
/// # Panics
///
/// Panics if the slot already holds a vector. Overwriting it would leak the
/// old value or, worse, let two owners free it; either way the glue code is
/// broken and must not continue.
pub fn write_output(slot: &mut UnmanagedVector, value: Option<Vec<u8>>) {
    assert_none(slot);
    *slot = UnmanagedVector::new(value);
}

/// Asserts that an output slot is still empty before anything is written.
///
/// # Panics
///
/// Panics when the slot is not `none`.
pub fn assert_none(slot: &UnmanagedVector) {
    if slot.is_some() {
        panic!(
            "Got a non-none UnmanagedVector we're about to override. \
             This is a bug because someone has to drop the old one."
        );
    }
}

/// Creates an unmanaged vector from foreign memory by copying it.
///
/// Used by the host when it needs to hand data to the VM through an output
/// pointer.
#[no_mangle]
pub extern "C" fn new_unmanaged_vector(
    nil: bool,
    ptr: *const u8,
    length: usize,
) -> UnmanagedVector {
    if nil {
        UnmanagedVector::new(None)
    } else if length == 0 || ptr.is_null() {
        UnmanagedVector::new(Some(Vec::new()))
    } else {
        // SAFETY: the caller guarantees ptr/length describe readable memory.
        let external_memory = unsafe { slice::from_raw_parts(ptr, length) };
        UnmanagedVector::new(Some(Vec::from(external_memory)))
    }
}

/// Destroys an unmanaged vector that was handed over by the VM.
#[no_mangle]
pub extern "C" fn destroy_unmanaged_vector(v: UnmanagedVector) {
    let _ = v.consume();
}

// Layout relied on by foreign callers.
const _: () = assert!(mem::size_of::<UnmanagedVector>() == 4 * mem::size_of::<usize>());
