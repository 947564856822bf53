//! Exported entry points
//!
//! Every entry point follows the same shape:
//!
//! 1. resolve the `vm_t` handle and the required views (a null handle or
//!    nil view is reported as [`RustError::UnsetArg`]);
//! 2. wrap the received tables and build an [`InvokeContext`];
//! 3. run the engine under `catch_unwind`, so a fault inside the engine is
//!    reported as [`RustError::Panic`] instead of unwinding into foreign code;
//! 4. write the status code and error message, and return the output as an
//!    [`UnmanagedVector`] owned by the caller.

use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::api::{BankApi, ChainApi, VmBank, VmChainApi};
use crate::db::{Db, VmStorage};
use crate::engine::{Engine, EngineResult};
use crate::error::{handle_c_error_binary, panic_payload_text, RustError};
use crate::invoke_context::InvokeContext;
use crate::memory::{ByteSliceView, UnmanagedVector};
use crate::querier::{HostQuerier, VmQuerier};
use crate::storage::{BankTransfer, BlockInfoResolver, QueryResolver};

/// A VM instance, opaque to the host
#[allow(non_camel_case_types)]
pub struct vm_t {
    engine: Box<dyn Engine>,
}

/// Creates a VM handle around `engine`. Release it with [`release_vm`].
pub fn allocate_vm(engine: Box<dyn Engine>) -> *mut vm_t {
    Box::into_raw(Box::new(vm_t { engine }))
}

/// Destroys a handle created by [`allocate_vm`]. A null handle is ignored.
#[no_mangle]
pub extern "C" fn release_vm(vm: *mut vm_t) {
    if !vm.is_null() {
        // SAFETY: the handle came from allocate_vm and is released only once
        let _ = unsafe { Box::from_raw(vm) };
    }
}

fn to_engine<'v>(vm_ptr: *mut vm_t) -> Result<&'v mut dyn Engine, RustError> {
    // SAFETY: a non-null handle came from allocate_vm and is not aliased
    // while an entry point runs
    match unsafe { vm_ptr.as_mut() } {
        Some(vm) => Ok(vm.engine.as_mut()),
        None => Err(RustError::unset_arg("vm")),
    }
}

fn required<'v>(view: &'v ByteSliceView, name: &str) -> Result<&'v [u8], RustError> {
    view.read().ok_or_else(|| RustError::unset_arg(name))
}

fn guarded<F>(name: &str, f: F) -> EngineResult
where
    F: FnOnce() -> EngineResult,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        log::error!(
            "Panic in entry point {name}: {}\n{}",
            panic_payload_text(payload.as_ref()),
            Backtrace::force_capture()
        );
        Err(RustError::panic())
    })
}

/// Tables handed over by the host for one invocation
struct HostTables {
    db: Db,
    api: ChainApi,
    bank: BankApi,
    querier: HostQuerier,
}

impl HostTables {
    fn storage_only(db: Db) -> Self {
        HostTables {
            db,
            api: ChainApi::unavailable(),
            bank: BankApi::unavailable(),
            querier: HostQuerier::unavailable(),
        }
    }

    /// Builds the invocation context and runs `f` with it
    fn run<F>(self, verbose: bool, gas_limit: u64, f: F) -> EngineResult
    where
        F: FnOnce(&mut InvokeContext<'_>) -> EngineResult,
    {
        let mut storage = VmStorage::new(self.db);
        let chain_api = VmChainApi::new(self.api);
        let mut bank = VmBank::new(self.bank);
        let querier = VmQuerier::new(self.querier);

        let mut ctx = InvokeContext::new(&mut storage, gas_limit)
            .with_chain_api(chain_api.as_ref().map(|api| api as &dyn BlockInfoResolver))
            .with_bank(bank.as_mut().map(|bank| bank as &mut dyn BankTransfer))
            .with_querier(querier.as_ref().map(|querier| querier as &dyn QueryResolver));
        if verbose {
            ctx.enable_debug();
        }

        let result = f(&mut ctx);
        if verbose {
            log::info!(
                "invocation used {} of {} gas",
                ctx.get_gas_used(),
                ctx.get_gas_limit()
            );
        }
        result
    }
}

fn finish(
    result: EngineResult,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
) -> UnmanagedVector {
    let output = handle_c_error_binary(result, status, errmsg);
    UnmanagedVector::new(Some(output))
}

/// Initialize the chain with a genesis module bundle
#[no_mangle]
pub extern "C" fn initialize(
    vm_ptr: *mut vm_t,
    db: Db,
    verbose: bool,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    module_bundle: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("initialize", || {
        let engine = to_engine(vm_ptr)?;
        let module_bundle = required(&module_bundle, "module_bundle")?;
        HostTables::storage_only(db).run(verbose, u64::MAX, |ctx| {
            engine.initialize(ctx, module_bundle)
        })
    });
    finish(result, status, errmsg)
}

/// Publish a module bundle
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn publish_module_bundle(
    vm_ptr: *mut vm_t,
    db: Db,
    verbose: bool,
    gas_limit: u64,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    session_id: ByteSliceView,
    sender: ByteSliceView,
    module_bundle: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("publish_module_bundle", || {
        let engine = to_engine(vm_ptr)?;
        let session_id = required(&session_id, "session_id")?;
        let sender = required(&sender, "sender")?;
        let module_bundle = required(&module_bundle, "module_bundle")?;
        HostTables::storage_only(db).run(verbose, gas_limit, |ctx| {
            engine.publish_module_bundle(ctx, session_id, sender, module_bundle)
        })
    });
    finish(result, status, errmsg)
}

/// Execute an entry function
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn execute_entry_function(
    vm_ptr: *mut vm_t,
    db: Db,
    api: ChainApi,
    bank: BankApi,
    querier: HostQuerier,
    verbose: bool,
    gas_limit: u64,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    session_id: ByteSliceView,
    sender: ByteSliceView,
    payload: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("execute_entry_function", || {
        let engine = to_engine(vm_ptr)?;
        let session_id = required(&session_id, "session_id")?;
        let sender = required(&sender, "sender")?;
        let payload = required(&payload, "payload")?;
        let tables = HostTables {
            db,
            api,
            bank,
            querier,
        };
        tables.run(verbose, gas_limit, |ctx| {
            engine.execute_entry_function(ctx, session_id, sender, payload)
        })
    });
    finish(result, status, errmsg)
}

/// Execute a script
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn execute_script(
    vm_ptr: *mut vm_t,
    db: Db,
    api: ChainApi,
    bank: BankApi,
    querier: HostQuerier,
    verbose: bool,
    gas_limit: u64,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    session_id: ByteSliceView,
    sender: ByteSliceView,
    payload: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("execute_script", || {
        let engine = to_engine(vm_ptr)?;
        let session_id = required(&session_id, "session_id")?;
        let sender = required(&sender, "sender")?;
        let payload = required(&payload, "payload")?;
        let tables = HostTables {
            db,
            api,
            bank,
            querier,
        };
        tables.run(verbose, gas_limit, |ctx| {
            engine.execute_script(ctx, session_id, sender, payload)
        })
    });
    finish(result, status, errmsg)
}

/// Run an entry function in read-only mode
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn query_entry_function(
    vm_ptr: *mut vm_t,
    db: Db,
    api: ChainApi,
    querier: HostQuerier,
    verbose: bool,
    gas_limit: u64,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    payload: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("query_entry_function", || {
        let engine = to_engine(vm_ptr)?;
        let payload = required(&payload, "payload")?;
        let tables = HostTables {
            db,
            api,
            bank: BankApi::unavailable(),
            querier,
        };
        tables.run(verbose, gas_limit, |ctx| {
            engine.query_entry_function(ctx, payload)
        })
    });
    finish(result, status, errmsg)
}

/// Decode a stored resource
#[no_mangle]
pub extern "C" fn decode_move_resource(
    vm_ptr: *mut vm_t,
    db: Db,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    struct_tag: ByteSliceView,
    resource_bytes: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("decode_move_resource", || {
        let engine = to_engine(vm_ptr)?;
        let struct_tag = required(&struct_tag, "struct_tag")?;
        let resource_bytes = required(&resource_bytes, "resource_bytes")?;
        let storage = VmStorage::new(db);
        engine.decode_move_resource(&storage, struct_tag, resource_bytes)
    });
    finish(result, status, errmsg)
}

/// Decode module bytecode
#[no_mangle]
pub extern "C" fn decode_module_bytes(
    vm_ptr: *mut vm_t,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    module_bytes: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("decode_module_bytes", || {
        let engine = to_engine(vm_ptr)?;
        let module_bytes = required(&module_bytes, "module_bytes")?;
        engine.decode_module_bytes(module_bytes)
    });
    finish(result, status, errmsg)
}

/// Decode script bytecode
#[no_mangle]
pub extern "C" fn decode_script_bytes(
    vm_ptr: *mut vm_t,
    status: Option<&mut i32>,
    errmsg: Option<&mut UnmanagedVector>,
    script_bytes: ByteSliceView,
) -> UnmanagedVector {
    let result = guarded("decode_script_bytes", || {
        let engine = to_engine(vm_ptr)?;
        let script_bytes = required(&script_bytes, "script_bytes")?;
        engine.decode_script_bytes(script_bytes)
    });
    finish(result, status, errmsg)
}
