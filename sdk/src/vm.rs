//! The host-facing VM handle
//!
//! [`NovaVm`] owns a VM handle and the iterator registry shared by its
//! invocations. Each call:
//!
//! 1. opens a call scope (a fresh call id in the registry);
//! 2. builds the capability tables over the host's store and [`HostEnv`];
//! 3. calls the exported entry point;
//! 4. consumes the output and error message, then closes the scope so the
//!    call's iterators are dropped even when the call failed.

use std::sync::Arc;

use nova_program_runtime::api::{BankApi, ChainApi};
use nova_program_runtime::db::Db;
use nova_program_runtime::engine::Engine;
use nova_program_runtime::error::ErrorCode;
use nova_program_runtime::interface::{self, vm_t};
use nova_program_runtime::memory::{ByteSliceView, UnmanagedVector};
use nova_program_runtime::querier::HostQuerier;
use nova_syscalls::{
    build_bank_api, build_chain_api, build_db, build_querier, Bank, BankState, ChainApiState,
    ChainView, DbState, IteratorRegistry, KvStore, Querier, QuerierState,
};

use crate::config::VmConfig;
use crate::error::{Error, Result};

/// Optional host capabilities for one invocation
#[derive(Default)]
pub struct HostEnv<'a> {
    /// Chain metadata
    pub chain: Option<&'a dyn ChainView>,
    /// Bank for transfers
    pub bank: Option<&'a mut dyn Bank>,
    /// Querier for external queries
    pub querier: Option<&'a dyn Querier>,
}

impl<'a> HostEnv<'a> {
    /// No capabilities besides storage
    pub fn none() -> Self {
        Self::default()
    }

    /// Provide chain metadata
    pub fn with_chain(mut self, chain: &'a dyn ChainView) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Provide a bank
    pub fn with_bank(mut self, bank: &'a mut dyn Bank) -> Self {
        self.bank = Some(bank);
        self
    }

    /// Provide a querier
    pub fn with_querier(mut self, querier: &'a dyn Querier) -> Self {
        self.querier = Some(querier);
        self
    }
}

/// Registers a call id for the lifetime of the guard
struct CallScope<'r> {
    registry: &'r IteratorRegistry,
    call_id: u64,
}

impl<'r> CallScope<'r> {
    fn open(registry: &'r IteratorRegistry) -> Self {
        let call_id = registry.start_call();
        CallScope { registry, call_id }
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.registry.end_call(self.call_id);
    }
}

/// Status and error message slots of one entry point call
struct Outcome {
    status: i32,
    errmsg: UnmanagedVector,
}

impl Outcome {
    fn new() -> Self {
        Outcome {
            // Overwritten by every entry point
            status: ErrorCode::Other.into(),
            errmsg: UnmanagedVector::default(),
        }
    }

    /// Consumes the output and the message, in that order, whatever the status
    fn finish(self, output: UnmanagedVector) -> Result<Vec<u8>> {
        let output = output.consume();
        let errmsg = self.errmsg.consume();
        Error::from_status(self.status, errmsg)?;
        Ok(output.unwrap_or_default())
    }
}

/// Tables handed to an entry point
struct Tables {
    db: Db,
    api: ChainApi,
    bank: BankApi,
    querier: HostQuerier,
}

/// A VM instance owned by the host
pub struct NovaVm {
    handle: *mut vm_t,
    registry: Arc<IteratorRegistry>,
    config: VmConfig,
}

// The handle is owned exclusively and only used through &mut self.
unsafe impl Send for NovaVm {}

impl NovaVm {
    /// Creates a VM around `engine` with its own iterator registry
    pub fn new(engine: Box<dyn Engine>, config: VmConfig) -> Self {
        let registry = Arc::new(IteratorRegistry::with_limit(config.iterator_limit));
        Self::with_registry(engine, config, registry)
    }

    /// Creates a VM sharing `registry` with other VMs
    pub fn with_registry(engine: Box<dyn Engine>, config: VmConfig, registry: Arc<IteratorRegistry>) -> Self {
        NovaVm {
            handle: interface::allocate_vm(engine),
            registry,
            config,
        }
    }

    /// The iterator registry used by this VM
    pub fn registry(&self) -> &Arc<IteratorRegistry> {
        &self.registry
    }

    /// The configuration
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    fn gas(&self, gas_limit: Option<u64>) -> u64 {
        gas_limit.unwrap_or(self.config.default_gas_limit)
    }

    /// Runs one entry point call inside a call scope
    fn invoke<F>(&mut self, store: &mut dyn KvStore, env: HostEnv<'_>, call: F) -> Result<Vec<u8>>
    where
        F: FnOnce(*mut vm_t, Tables, &mut Outcome) -> UnmanagedVector,
    {
        let scope = CallScope::open(&self.registry);
        log::debug!("invocation started with call id {}", scope.call_id);

        let mut db_state = DbState::new(store, &self.registry, scope.call_id);
        let chain_state = env.chain.map(ChainApiState::new);
        let mut bank_state = env.bank.map(BankState::new);
        let querier_state = env.querier.map(QuerierState::new);

        let tables = Tables {
            db: build_db(&mut db_state),
            api: chain_state
                .as_ref()
                .map_or_else(ChainApi::unavailable, build_chain_api),
            bank: bank_state
                .as_mut()
                .map_or_else(BankApi::unavailable, build_bank_api),
            querier: querier_state
                .as_ref()
                .map_or_else(HostQuerier::unavailable, build_querier),
        };

        let mut outcome = Outcome::new();
        let output = call(self.handle, tables, &mut outcome);
        let result = outcome.finish(output);
        if let Err(err) = &result {
            log::debug!("invocation {} failed: {err}", scope.call_id);
        }
        result
    }

    /// Initialize the chain with a genesis module bundle
    pub fn initialize(&mut self, store: &mut dyn KvStore, module_bundle: &[u8]) -> Result<Vec<u8>> {
        let verbose = self.config.verbose;
        self.invoke(store, HostEnv::none(), |vm, tables, outcome| {
            interface::initialize(
                vm,
                tables.db,
                verbose,
                Some(&mut outcome.status),
                Some(&mut outcome.errmsg),
                ByteSliceView::new(module_bundle),
            )
        })
    }

    /// Publish a module bundle on behalf of `sender`
    pub fn publish_module_bundle(
        &mut self,
        store: &mut dyn KvStore,
        gas_limit: Option<u64>,
        session_id: &[u8],
        sender: &[u8],
        module_bundle: &[u8],
    ) -> Result<Vec<u8>> {
        let verbose = self.config.verbose;
        let gas_limit = self.gas(gas_limit);
        self.invoke(store, HostEnv::none(), |vm, tables, outcome| {
            interface::publish_module_bundle(
                vm,
                tables.db,
                verbose,
                gas_limit,
                Some(&mut outcome.status),
                Some(&mut outcome.errmsg),
                ByteSliceView::new(session_id),
                ByteSliceView::new(sender),
                ByteSliceView::new(module_bundle),
            )
        })
    }

    /// Execute an entry function
    pub fn execute_entry_function(
        &mut self,
        store: &mut dyn KvStore,
        env: HostEnv<'_>,
        gas_limit: Option<u64>,
        session_id: &[u8],
        sender: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let verbose = self.config.verbose;
        let gas_limit = self.gas(gas_limit);
        self.invoke(store, env, |vm, tables, outcome| {
            interface::execute_entry_function(
                vm,
                tables.db,
                tables.api,
                tables.bank,
                tables.querier,
                verbose,
                gas_limit,
                Some(&mut outcome.status),
                Some(&mut outcome.errmsg),
                ByteSliceView::new(session_id),
                ByteSliceView::new(sender),
                ByteSliceView::new(payload),
            )
        })
    }

    /// Execute a script
    pub fn execute_script(
        &mut self,
        store: &mut dyn KvStore,
        env: HostEnv<'_>,
        gas_limit: Option<u64>,
        session_id: &[u8],
        sender: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let verbose = self.config.verbose;
        let gas_limit = self.gas(gas_limit);
        self.invoke(store, env, |vm, tables, outcome| {
            interface::execute_script(
                vm,
                tables.db,
                tables.api,
                tables.bank,
                tables.querier,
                verbose,
                gas_limit,
                Some(&mut outcome.status),
                Some(&mut outcome.errmsg),
                ByteSliceView::new(session_id),
                ByteSliceView::new(sender),
                ByteSliceView::new(payload),
            )
        })
    }

    /// Run an entry function read-only. A bank in `env` is ignored.
    pub fn query_entry_function(
        &mut self,
        store: &mut dyn KvStore,
        env: HostEnv<'_>,
        gas_limit: Option<u64>,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let verbose = self.config.verbose;
        let gas_limit = self.gas(gas_limit);
        self.invoke(store, env, |vm, tables, outcome| {
            interface::query_entry_function(
                vm,
                tables.db,
                tables.api,
                tables.querier,
                verbose,
                gas_limit,
                Some(&mut outcome.status),
                Some(&mut outcome.errmsg),
                ByteSliceView::new(payload),
            )
        })
    }

    /// Decode a stored resource
    pub fn decode_resource(
        &mut self,
        store: &mut dyn KvStore,
        struct_tag: &[u8],
        resource_bytes: &[u8],
    ) -> Result<Vec<u8>> {
        self.invoke(store, HostEnv::none(), |vm, tables, outcome| {
            interface::decode_move_resource(
                vm,
                tables.db,
                Some(&mut outcome.status),
                Some(&mut outcome.errmsg),
                ByteSliceView::new(struct_tag),
                ByteSliceView::new(resource_bytes),
            )
        })
    }

    /// Decode module bytecode
    pub fn decode_module(&mut self, module_bytes: &[u8]) -> Result<Vec<u8>> {
        let mut outcome = Outcome::new();
        let output = interface::decode_module_bytes(
            self.handle,
            Some(&mut outcome.status),
            Some(&mut outcome.errmsg),
            ByteSliceView::new(module_bytes),
        );
        outcome.finish(output)
    }

    /// Decode script bytecode
    pub fn decode_script(&mut self, script_bytes: &[u8]) -> Result<Vec<u8>> {
        let mut outcome = Outcome::new();
        let output = interface::decode_script_bytes(
            self.handle,
            Some(&mut outcome.status),
            Some(&mut outcome.errmsg),
            ByteSliceView::new(script_bytes),
        );
        outcome.finish(output)
    }
}

impl Drop for NovaVm {
    fn drop(&mut self) {
        interface::release_vm(self.handle);
    }
}
