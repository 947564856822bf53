//! Host capability traits
//!
//! This module defines the abstraction layer between the VM and the host.
//! The VM never touches host state directly; it goes through these traits,
//! which are implemented by the table wrappers in [`crate::db`],
//! [`crate::iterator`], [`crate::api`] and [`crate::querier`]. Tests can
//! implement them directly without any foreign calls.

pub use crate::error::BackendResult;

/// A key/value pair produced by an iterator
pub type Record = (Vec<u8>, Vec<u8>);

/// Direction of a range scan
///
/// The discriminants are what crosses the boundary, so they must not change.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    /// Increasing key order
    Ascending = 1,
    /// Decreasing key order
    Descending = 2,
}

impl TryFrom<i32> for Order {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Order::Ascending),
            2 => Ok(Order::Descending),
            other => Err(other),
        }
    }
}

impl From<Order> for i32 {
    fn from(order: Order) -> i32 {
        order as i32
    }
}

/// Storage provider trait
///
/// Host-owned, ordered key/value storage as seen by the VM.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use nova_program_runtime::storage::{BackendResult, Order, Storage, StorageIterator};
///
/// struct ChainStorage {
///     // Your storage implementation
/// }
///
/// impl Storage for ChainStorage {
///     fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
///         todo!()
///     }
///
///     fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
///         todo!()
///     }
///
///     fn remove(&mut self, key: &[u8]) -> BackendResult<()> {
///         todo!()
///     }
///
///     fn scan(
///         &mut self,
///         prefix: &[u8],
///         start: Option<&[u8]>,
///         end: Option<&[u8]>,
///         order: Order,
///     ) -> BackendResult<Box<dyn StorageIterator>> {
///         todo!()
///     }
/// }
/// ```
pub trait Storage {
    /// Read a value from storage
    ///
    /// # Arguments
    /// * `key` - Storage key
    ///
    /// # Returns
    /// * `Some(value)` if the key exists (the value may be empty)
    /// * `None` if the key doesn't exist
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

    /// Write a value to storage
    ///
    /// # Arguments
    /// * `key` - Storage key
    /// * `value` - Value to store
    fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()>;

    /// Remove a key from storage. Removing an absent key is not an error.
    fn remove(&mut self, key: &[u8]) -> BackendResult<()>;

    /// Open an iterator over the keys starting with `prefix`
    ///
    /// # Arguments
    /// * `prefix` - Keys must start with this; empty means the whole keyspace
    /// * `start` - Inclusive lower bound, `None` for unbounded
    /// * `end` - Exclusive upper bound, `None` for unbounded
    /// * `order` - Iteration direction
    ///
    /// The iterator is only valid for the current invocation.
    fn scan(
        &mut self,
        prefix: &[u8],
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BackendResult<Box<dyn StorageIterator>>;
}

/// Cursor over a range opened with [`Storage::scan`]
pub trait StorageIterator {
    /// Returns the record at the cursor and advances it, or `None` once the
    /// range is exhausted.
    fn next(&mut self) -> BackendResult<Option<Record>>;
}

/// Read-only access to chain metadata
pub trait BlockInfoResolver {
    /// Returns the latest block `(height, timestamp)`.
    fn get_block_info(&self) -> BackendResult<(u64, u64)>;
}

/// Token transfers executed by the host
pub trait BankTransfer {
    /// Transfer `amount` of `denom` to `recipient`
    ///
    /// # Returns
    /// The outcome and the gas the host spent on it. Gas is reported even
    /// when the transfer fails.
    fn transfer(&mut self, recipient: &[u8], denom: &[u8], amount: u64) -> (BackendResult<()>, u64);
}

/// Queries answered by the host
pub trait QueryResolver {
    /// Send an opaque request to the host and return its opaque answer
    fn query_raw(&self, request: &[u8]) -> BackendResult<Vec<u8>>;
}
