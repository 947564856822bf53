//! Script format understood by [`crate::ScriptEngine`]
//!
//! A script is a bincode encoded list of [`Op`]s. Running it produces one
//! [`OpResult`] per op, encoded the same way.

use nova_program_runtime::error::RustError;
use serde::{Deserialize, Serialize};

/// One step of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Read a key
    Get { key: Vec<u8> },
    /// Write a key
    Set { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key
    Remove { key: Vec<u8> },
    /// Scan a prefix and collect up to `limit` records
    Scan {
        prefix: Vec<u8>,
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        descending: bool,
        limit: Option<u32>,
    },
    /// Open `count` scans over the whole keyspace without reading them
    Open { count: u32 },
    /// Read the latest block
    BlockInfo,
    /// Transfer coins through the host bank
    Transfer {
        recipient: Vec<u8>,
        denom: Vec<u8>,
        amount: u64,
    },
    /// Send a query to the host
    Query { request: Vec<u8> },
    /// Burn gas
    ChargeGas { amount: u64 },
    /// Stop with a VM error
    Abort { msg: String },
    /// Panic inside the engine
    Panic { msg: String },
}

/// Outcome of one [`Op`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpResult {
    /// Result of a `Get`
    Value(Option<Vec<u8>>),
    /// A write, delete, transfer or charge went through
    Done,
    /// Records of a `Scan`, in iteration order
    Records(Vec<(Vec<u8>, Vec<u8>)>),
    /// Number of scans opened by `Open`
    Opened(u32),
    /// Result of a `BlockInfo`
    Block { height: u64, timestamp: u64 },
    /// Answer to a `Query`
    Answer(Vec<u8>),
}

/// Builds a script
#[derive(Debug, Default, Clone)]
pub struct Script {
    ops: Vec<Op>,
}

impl Script {
    /// An empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `op`
    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Append a `Get`
    pub fn get(self, key: &[u8]) -> Self {
        self.op(Op::Get { key: key.to_vec() })
    }

    /// Append a `Set`
    pub fn set(self, key: &[u8], value: &[u8]) -> Self {
        self.op(Op::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Append a `Remove`
    pub fn remove(self, key: &[u8]) -> Self {
        self.op(Op::Remove { key: key.to_vec() })
    }

    /// Append an unbounded `Scan` of `prefix`
    pub fn scan(self, prefix: &[u8], descending: bool) -> Self {
        self.op(Op::Scan {
            prefix: prefix.to_vec(),
            start: None,
            end: None,
            descending,
            limit: None,
        })
    }

    /// The ops
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Encode for use as a payload
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bincode::serialize(&self.ops)?)
    }
}

/// Decode a payload into ops
pub fn decode_ops(payload: &[u8]) -> Result<Vec<Op>, RustError> {
    bincode::deserialize(payload).map_err(|err| RustError::vm_err(format!("invalid script: {err}")))
}

/// Encode results as engine output
pub fn encode_results(results: &[OpResult]) -> Result<Vec<u8>, RustError> {
    bincode::serialize(results).map_err(|err| RustError::vm_err(format!("cannot encode results: {err}")))
}

/// Decode engine output into results
pub fn decode_results(output: &[u8]) -> anyhow::Result<Vec<OpResult>> {
    Ok(bincode::deserialize(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_order() {
        let script = Script::new().set(b"a", b"1").get(b"a").remove(b"a");
        assert_eq!(
            script.ops(),
            &[
                Op::Set {
                    key: b"a".to_vec(),
                    value: b"1".to_vec()
                },
                Op::Get { key: b"a".to_vec() },
                Op::Remove { key: b"a".to_vec() },
            ]
        );
    }

    #[test]
    fn test_garbage_payload_is_vm_error() {
        let err = decode_ops(&[0xff, 0xff, 0xff]).unwrap_err();
        assert!(err.to_string().starts_with("VM error: invalid script"));
    }
}
