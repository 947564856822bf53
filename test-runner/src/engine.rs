//! An [`Engine`] that runs scripts instead of bytecode

use nova_program_runtime::engine::{Engine, EngineResult};
use nova_program_runtime::error::RustError;
use nova_program_runtime::invoke_context::InvokeContext;
use nova_program_runtime::storage::{Order, Storage};

use crate::script::{decode_ops, encode_results, Op, OpResult};

/// Prefix under which published bundles are stored
pub const CODE_PREFIX: &[u8] = b"code/";

/// Key holding the genesis bundle
pub const GENESIS_KEY: &[u8] = b"genesis";

/// Runs scripts against the host through the invocation context
#[derive(Debug, Default)]
pub struct ScriptEngine {
    executed: u64,
}

impl ScriptEngine {
    /// Creates an engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scripts run to completion
    pub fn executed(&self) -> u64 {
        self.executed
    }

    fn run(&mut self, ctx: &mut InvokeContext<'_>, payload: &[u8], read_only: bool) -> EngineResult {
        let ops = decode_ops(payload)?;
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            if read_only && matches!(op, Op::Set { .. } | Op::Remove { .. } | Op::Transfer { .. }) {
                return Err(RustError::vm_err("state change in query"));
            }
            results.push(apply(ctx, op)?);
        }
        self.executed = self.executed.saturating_add(1);
        encode_results(&results)
    }
}

fn collect(
    storage: &mut dyn Storage,
    prefix: &[u8],
    start: Option<&[u8]>,
    end: Option<&[u8]>,
    order: Order,
    limit: Option<u32>,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, RustError> {
    let mut iter = storage.scan(prefix, start, end, order)?;
    let mut records = Vec::new();
    while limit.map_or(true, |limit| records.len() < limit as usize) {
        match iter.next()? {
            Some(record) => records.push(record),
            None => break,
        }
    }
    Ok(records)
}

fn apply(ctx: &mut InvokeContext<'_>, op: Op) -> Result<OpResult, RustError> {
    let result = match op {
        Op::Get { key } => OpResult::Value(ctx.storage().get(&key)?),
        Op::Set { key, value } => {
            ctx.storage_mut().set(&key, &value)?;
            OpResult::Done
        }
        Op::Remove { key } => {
            ctx.storage_mut().remove(&key)?;
            OpResult::Done
        }
        Op::Scan {
            prefix,
            start,
            end,
            descending,
            limit,
        } => {
            let order = if descending {
                Order::Descending
            } else {
                Order::Ascending
            };
            OpResult::Records(collect(
                ctx.storage_mut(),
                &prefix,
                start.as_deref(),
                end.as_deref(),
                order,
                limit,
            )?)
        }
        Op::Open { count } => {
            for _ in 0..count {
                ctx.storage_mut().scan(b"", None, None, Order::Ascending)?;
            }
            OpResult::Opened(count)
        }
        Op::BlockInfo => {
            let (height, timestamp) = ctx.block_info()?;
            OpResult::Block { height, timestamp }
        }
        Op::Transfer {
            recipient,
            denom,
            amount,
        } => {
            ctx.bank_transfer(&recipient, &denom, amount)?;
            OpResult::Done
        }
        Op::Query { request } => OpResult::Answer(ctx.query(&request)?),
        Op::ChargeGas { amount } => {
            ctx.consume_checked(amount)?;
            OpResult::Done
        }
        Op::Abort { msg } => return Err(RustError::vm_err(msg)),
        Op::Panic { msg } => panic!("{msg}"),
    };
    Ok(result)
}

impl Engine for ScriptEngine {
    fn initialize(&mut self, ctx: &mut InvokeContext<'_>, module_bundle: &[u8]) -> EngineResult {
        ctx.storage_mut().set(GENESIS_KEY, module_bundle)?;
        Ok(Vec::new())
    }

    fn publish_module_bundle(
        &mut self,
        ctx: &mut InvokeContext<'_>,
        _session_id: &[u8],
        sender: &[u8],
        module_bundle: &[u8],
    ) -> EngineResult {
        if module_bundle.is_empty() {
            return Err(RustError::vm_err("empty module bundle"));
        }
        ctx.consume_checked(module_bundle.len() as u64)?;
        let key = [CODE_PREFIX, sender].concat();
        ctx.storage_mut().set(&key, module_bundle)?;
        Ok(key)
    }

    fn execute_entry_function(
        &mut self,
        ctx: &mut InvokeContext<'_>,
        _session_id: &[u8],
        _sender: &[u8],
        payload: &[u8],
    ) -> EngineResult {
        self.run(ctx, payload, false)
    }

    fn execute_script(
        &mut self,
        ctx: &mut InvokeContext<'_>,
        _session_id: &[u8],
        _sender: &[u8],
        payload: &[u8],
    ) -> EngineResult {
        self.run(ctx, payload, false)
    }

    fn query_entry_function(&mut self, ctx: &mut InvokeContext<'_>, payload: &[u8]) -> EngineResult {
        self.run(ctx, payload, true)
    }

    fn decode_move_resource(
        &mut self,
        storage: &dyn Storage,
        struct_tag: &[u8],
        resource_bytes: &[u8],
    ) -> EngineResult {
        // Only resources that are actually stored can be decoded
        match storage.get(struct_tag)? {
            Some(stored) if stored == resource_bytes => Ok(format!("{resource_bytes:?}").into_bytes()),
            _ => Err(RustError::vm_err("resource not found")),
        }
    }

    fn decode_script_bytes(&mut self, script_bytes: &[u8]) -> EngineResult {
        let ops = decode_ops(script_bytes)?;
        Ok(format!("{ops:?}").into_bytes())
    }
}
