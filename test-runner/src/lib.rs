//! Scripted engine and in-memory host for exercising the Nova VM boundary
//!
//! [`ScriptEngine`] stands in for a bytecode interpreter: its payloads are
//! [`Script`]s whose ops go through the same capability tables a real engine
//! would use. The host side pairs a `MemoryStore` with [`MemoryBank`] and
//! [`StaticQuerier`].

pub mod engine;
pub mod host;
pub mod script;

pub use engine::{ScriptEngine, CODE_PREFIX, GENESIS_KEY};
pub use host::{MemoryBank, StaticQuerier, TRANSFER_GAS};
pub use script::{decode_results, Op, OpResult, Script};
