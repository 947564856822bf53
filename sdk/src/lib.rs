//! Nova VM SDK for hosts
//!
//! This SDK wraps the exported entry points of `nova-program-runtime` and the
//! callbacks of `nova-syscalls` into a safe handle for the host application.
//!
//! # Example
//!
//! ```rust,ignore
//! use nova_vm_sdk::{HostEnv, MemoryStore, NovaVm, VmConfig};
//!
//! let mut vm = NovaVm::new(Box::new(my_engine), VmConfig::default());
//! let mut store = MemoryStore::new();
//! let output = vm.execute_entry_function(
//!     &mut store,
//!     HostEnv::none(),
//!     None,
//!     b"session",
//!     b"sender",
//!     &payload,
//! )?;
//! ```

#![warn(missing_docs)]
#![deny(clippy::arithmetic_side_effects)]

pub mod config;
pub mod error;
pub mod vm;

// Re-export commonly used items
pub use config::{VmConfig, DEFAULT_GAS_LIMIT};
pub use error::{Error, Result};
pub use nova_program_runtime::engine::{Engine, EngineResult};
pub use nova_program_runtime::invoke_context::InvokeContext;
pub use nova_syscalls::{
    Bank, BlockInfo, ChainView, Coin, GasCosts, GasMeter, GasMeteredStore, IteratorRegistry, KvStore,
    MemoryStore, Querier,
};
pub use vm::{HostEnv, NovaVm};
