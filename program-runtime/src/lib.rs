//! Nova Program Runtime
//!
//! This crate is the VM side of the boundary between a host process and an
//! embedded Nova VM. The host owns all state (storage, chain metadata, gas
//! accounting); the VM reaches it only through function tables the host
//! passes in with every invocation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Host                    │
//! │   (store, registry, chain, bank, ...)   │
//! └────────────────┬────────────────────────┘
//!                  │
//!                  │ Db / ChainApi / BankApi / HostQuerier
//!                  │ + views over the payload
//!                  ▼
//! ┌─────────────────────────────────────────┐
//! │   nova-program-runtime (this crate)     │
//! │  ┌─────────────────────────────────┐    │
//! │  │    interface (entry points)     │    │
//! │  │  - catch_unwind                 │    │
//! │  │  - status + error message       │    │
//! │  └─────────────────────────────────┘    │
//! │  ┌─────────────────────────────────┐    │
//! │  │    InvokeContext                │    │
//! │  │  - VmStorage / HostIterator     │    │
//! │  │  - VmChainApi / VmBank          │    │
//! │  │  - VmQuerier                    │    │
//! │  │  - gas tracking                 │    │
//! │  └─────────────────────────────────┘    │
//! └────────────────┬────────────────────────┘
//!                  │ &mut InvokeContext
//!                  ▼
//! ┌─────────────────────────────────────────┐
//! │        Engine (bytecode executor)       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Every call back into the host follows the same protocol: arguments go out
//! as borrowed views, results come back as [`memory::UnmanagedVector`]s
//! that this side consumes, and the returned `i32` is converted into an
//! [`error::ErrorCode`] before it is trusted.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nova_program_runtime::interface::{allocate_vm, execute_entry_function, release_vm};
//!
//! let vm = allocate_vm(Box::new(MyEngine::default()));
//! let mut status = 0;
//! let mut errmsg = UnmanagedVector::default();
//! let out = execute_entry_function(
//!     vm, db, api, bank, querier, false, 1_000_000,
//!     Some(&mut status), Some(&mut errmsg),
//!     ByteSliceView::new(b"session"), ByteSliceView::new(b"sender"), ByteSliceView::new(&payload),
//! );
//! let output = out.consume();
//! release_vm(vm);
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod api;
pub mod db;
pub mod engine;
pub mod error;
pub mod interface;
pub mod invoke_context;
pub mod iterator;
pub mod memory;
pub mod querier;
pub mod storage;

// Re-export main types
pub use api::{api_t, bank_t, BankApi, BankApiVtable, ChainApi, ChainApiVtable, VmBank, VmChainApi};
pub use db::{db_t, Db, DbVtable, VmStorage};
pub use engine::{Engine, EngineResult};
pub use error::{BackendError, BackendResult, ErrorCode, RustError};
pub use interface::{allocate_vm, release_vm, vm_t};
pub use invoke_context::InvokeContext;
pub use iterator::{iterator_t, HostIterator, IteratorVtable};
pub use memory::{ByteSliceView, U8SliceView, UnmanagedVector};
pub use querier::{querier_t, HostQuerier, QuerierVtable, QueryResponse, VmQuerier};
pub use storage::{BankTransfer, BlockInfoResolver, Order, QueryResolver, Record, Storage, StorageIterator};
