//! Nova Syscalls
//!
//! This crate provides the host side of the Nova VM boundary: the
//! `extern "C"` callbacks the VM invokes through its capability tables, and
//! the machinery they rely on.
//!
//! # Architecture
//!
//! Each callback:
//!
//! 1. Receives an opaque state pointer built for the current invocation
//!    (`DbState`, `ChainApiState`, `BankState`, `QuerierState`)
//! 2. Reads its inputs from borrowed views and writes its outputs into
//!    `UnmanagedVector` slots it checks are empty
//! 3. Runs inside [`recovery::recover_panic`], so a panic becomes an
//!    `ErrorCode` instead of unwinding into the VM
//! 4. Returns the `ErrorCode` as `i32`
//!
//! # Available Callbacks
//!
//! ## Storage
//! - `db_read` / `db_write` / `db_remove` - Single key access
//! - `db_scan` - Open a prefix scan, registered in the [`registry`]
//! - `iterator_next` - Advance a registered iterator
//!
//! ## Chain
//! - `get_block_info` - Latest block height and timestamp
//!
//! ## Bank
//! - `bank_transfer` - Move coins, reporting the gas spent
//!
//! ## Querier
//! - `query_external` - Opaque host queries
//!
//! # Usage
//!
//! ```rust,ignore
//! use nova_syscalls::{build_db, DbState, IteratorRegistry, MemoryStore};
//!
//! let registry = IteratorRegistry::new();
//! let mut store = MemoryStore::new();
//! let call_id = registry.start_call();
//! let mut state = DbState::new(&mut store, &registry, call_id);
//! let db = build_db(&mut state);
//! // hand `db` to an entry point ...
//! registry.end_call(call_id);
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod balance;
pub mod blockchain;
pub mod gas;
pub mod querier;
pub mod recovery;
pub mod registry;
pub mod storage;
pub mod store;

// Re-export main types
pub use balance::{build_bank_api, Bank, BankState, Coin};
pub use blockchain::{build_chain_api, BlockInfo, ChainApiState, ChainView};
pub use gas::{GasCosts, GasMeter, GasMeteredStore};
pub use querier::{build_querier, Querier, QuerierState};
pub use recovery::{recover_panic, GasOverflow, OutOfGas};
pub use registry::{IteratorRegistry, RegistryError, MAX_ITERATORS_PER_CALL};
pub use storage::{build_db, DbState};
pub use store::{BoxedKvIterator, KvIterator, KvStore, MemoryStore};

/// Callback names, as they appear in log output
pub mod callback_names {
    /// Read one key
    pub const DB_READ: &str = "db_read";
    /// Write one key
    pub const DB_WRITE: &str = "db_write";
    /// Remove one key
    pub const DB_REMOVE: &str = "db_remove";
    /// Open a scan
    pub const DB_SCAN: &str = "db_scan";
    /// Advance an iterator
    pub const ITERATOR_NEXT: &str = "iterator_next";
    /// Latest block info
    pub const GET_BLOCK_INFO: &str = "get_block_info";
    /// Bank transfer
    pub const BANK_TRANSFER: &str = "bank_transfer";
    /// External query
    pub const QUERY_EXTERNAL: &str = "query_external";
}
