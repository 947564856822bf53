//! Chain API callbacks
//!
//! Exposes the latest block height and timestamp to the VM.

use nova_program_runtime::api::{api_t, ChainApi, ChainApiVtable};
use nova_program_runtime::error::ErrorCode;
use nova_program_runtime::memory::{assert_none, write_output, UnmanagedVector};
use serde::{Deserialize, Serialize};

use crate::callback_names;
use crate::recovery::recover_panic;

/// Latest block as seen by the host
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub height: u64,
    /// Block time in seconds since the epoch
    pub timestamp: u64,
}

/// Source of chain metadata
pub trait ChainView {
    /// Returns the latest block
    fn block_info(&self) -> anyhow::Result<BlockInfo>;
}

/// A fixed block is its own chain view
impl ChainView for BlockInfo {
    fn block_info(&self) -> anyhow::Result<BlockInfo> {
        Ok(*self)
    }
}

/// Host state behind a [`ChainApi`] table
pub struct ChainApiState<'a> {
    /// Where block info comes from
    pub chain: &'a dyn ChainView,
}

impl<'a> ChainApiState<'a> {
    /// Wraps `chain`
    pub fn new(chain: &'a dyn ChainView) -> Self {
        ChainApiState { chain }
    }
}

/// Builds the [`ChainApi`] handed to the VM for one invocation
pub fn build_chain_api(state: &ChainApiState<'_>) -> ChainApi {
    ChainApi {
        state: state as *const ChainApiState<'_> as *const api_t,
        vtable: ChainApiVtable {
            get_block_info: Some(get_block_info),
        },
    }
}

/// Host side of `get_block_info`
pub extern "C" fn get_block_info(
    api: *const api_t,
    height: *mut u64,
    timestamp: *mut u64,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::GET_BLOCK_INFO, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(height), Some(timestamp), Some(err_out)) = (unsafe {
            (
                (api as *const ChainApiState<'_>).as_ref(),
                height.as_mut(),
                timestamp.as_mut(),
                err_out.as_mut(),
            )
        }) else {
            return ErrorCode::BadArgument;
        };
        assert_none(err_out);

        match state.chain.block_info() {
            Ok(info) => {
                *height = info.height;
                *timestamp = info.timestamp;
                ErrorCode::Success
            }
            Err(err) => {
                write_output(err_out, Some(err.to_string().into_bytes()));
                ErrorCode::User
            }
        }
    })
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_program_runtime::api::VmChainApi;
    use nova_program_runtime::error::BackendError;
    use nova_program_runtime::storage::BlockInfoResolver;

    struct Halted;

    impl ChainView for Halted {
        fn block_info(&self) -> anyhow::Result<BlockInfo> {
            anyhow::bail!("chain halted")
        }
    }

    #[test]
    fn test_get_block_info() {
        let block = BlockInfo {
            height: 100,
            timestamp: 1_650_000_000,
        };
        let state = ChainApiState::new(&block);
        let api = VmChainApi::new(build_chain_api(&state)).unwrap();
        assert_eq!(api.get_block_info().unwrap(), (100, 1_650_000_000));
    }

    #[test]
    fn test_get_block_info_error() {
        let chain = Halted;
        let state = ChainApiState::new(&chain);
        let api = VmChainApi::new(build_chain_api(&state)).unwrap();
        assert_eq!(
            api.get_block_info(),
            Err(BackendError::user_err("chain halted"))
        );
    }

    #[test]
    fn test_null_outputs() {
        let block = BlockInfo::default();
        let state = ChainApiState::new(&block);
        let api = build_chain_api(&state);
        let mut err = UnmanagedVector::default();
        let code = get_block_info(api.state, std::ptr::null_mut(), std::ptr::null_mut(), &mut err);
        assert_eq!(ErrorCode::from(code), ErrorCode::BadArgument);
    }
}
