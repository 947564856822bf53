//! Chain API and bank capability tables
//!
//! Both are optional per invocation. A table whose state pointer is null
//! stands for "capability not provided" and is never called.

use crate::error::{BackendError, BackendResult, ErrorCode};
use crate::memory::{U8SliceView, UnmanagedVector};
use crate::storage::{BankTransfer, BlockInfoResolver};

/// Opaque chain API state owned by the host
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct api_t {
    _private: [u8; 0],
}

/// Opaque bank state owned by the host
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct bank_t {
    _private: [u8; 0],
}

/// `get_block_info(api, height_out, timestamp_out, err_out)`
pub type GetBlockInfoFn = extern "C" fn(
    *const api_t,
    *mut u64,             // height
    *mut u64,             // timestamp
    *mut UnmanagedVector, // error message output
) -> i32;

/// `bank_transfer(bank, recipient, denom, amount, used_gas_out, err_out)`
pub type BankTransferFn = extern "C" fn(
    *mut bank_t,
    U8SliceView, // recipient
    U8SliceView, // denom
    u64,         // amount
    *mut u64,    // used gas
    *mut UnmanagedVector,
) -> i32;

/// Chain API capability table
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct ChainApiVtable {
    /// Latest block height and timestamp
    pub get_block_info: Option<GetBlockInfoFn>,
}

/// Chain API capability
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct ChainApi {
    /// Host state, null when the capability is not provided
    pub state: *const api_t,
    /// Callbacks
    pub vtable: ChainApiVtable,
}

impl ChainApi {
    /// A table standing for "no chain API"
    pub fn unavailable() -> Self {
        ChainApi {
            state: std::ptr::null(),
            vtable: ChainApiVtable::default(),
        }
    }
}

/// Bank capability table
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct BankApiVtable {
    /// Transfer coins to a recipient
    pub bank_transfer: Option<BankTransferFn>,
}

/// Bank capability
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct BankApi {
    /// Host state, null when the capability is not provided
    pub state: *mut bank_t,
    /// Callbacks
    pub vtable: BankApiVtable,
}

impl BankApi {
    /// A table standing for "no bank"
    pub fn unavailable() -> Self {
        BankApi {
            state: std::ptr::null_mut(),
            vtable: BankApiVtable::default(),
        }
    }
}

/// [`BlockInfoResolver`] that calls through a [`ChainApi`]
pub struct VmChainApi {
    api: ChainApi,
}

impl VmChainApi {
    /// Returns `None` when the host did not provide the capability
    pub fn new(api: ChainApi) -> Option<Self> {
        if api.state.is_null() {
            None
        } else {
            Some(VmChainApi { api })
        }
    }
}

impl BlockInfoResolver for VmChainApi {
    fn get_block_info(&self) -> BackendResult<(u64, u64)> {
        let get_block_info = self
            .api
            .vtable
            .get_block_info
            .ok_or_else(|| BackendError::unknown("vtable function 'get_block_info' not set"))?;

        let mut height = 0_u64;
        let mut timestamp = 0_u64;
        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = get_block_info(
            self.api.state,
            &mut height as *mut u64,
            &mut timestamp as *mut u64,
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();

        let default = || "Failed to get latest block info".to_string();
        code.into_result(error_msg, default)?;

        Ok((height, timestamp))
    }
}

/// [`BankTransfer`] that calls through a [`BankApi`]
pub struct VmBank {
    bank: BankApi,
}

impl VmBank {
    /// Returns `None` when the host did not provide the capability
    pub fn new(bank: BankApi) -> Option<Self> {
        if bank.state.is_null() {
            None
        } else {
            Some(VmBank { bank })
        }
    }
}

impl BankTransfer for VmBank {
    fn transfer(&mut self, recipient: &[u8], denom: &[u8], amount: u64) -> (BackendResult<()>, u64) {
        let Some(bank_transfer) = self.bank.vtable.bank_transfer else {
            return (
                Err(BackendError::unknown("vtable function 'bank_transfer' not set")),
                0,
            );
        };

        let mut used_gas = 0_u64;
        let mut error_msg = UnmanagedVector::default();
        let code: ErrorCode = bank_transfer(
            self.bank.state,
            U8SliceView::new(Some(recipient)),
            U8SliceView::new(Some(denom)),
            amount,
            &mut used_gas as *mut u64,
            &mut error_msg as *mut UnmanagedVector,
        )
        .into();

        let default = || {
            format!(
                "Failed to transfer {amount}{} to {}",
                String::from_utf8_lossy(denom),
                String::from_utf8_lossy(recipient)
            )
        };
        (code.into_result(error_msg, default), used_gas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::write_output;

    extern "C" fn block_info(
        _api: *const api_t,
        height: *mut u64,
        timestamp: *mut u64,
        _err_out: *mut UnmanagedVector,
    ) -> i32 {
        unsafe {
            *height = 42;
            *timestamp = 1_700_000_000;
        }
        ErrorCode::Success.into()
    }

    extern "C" fn transfer_rejects(
        _bank: *mut bank_t,
        _recipient: U8SliceView,
        _denom: U8SliceView,
        _amount: u64,
        used_gas: *mut u64,
        err_out: *mut UnmanagedVector,
    ) -> i32 {
        unsafe {
            *used_gas = 1_500;
            write_output(&mut *err_out, Some(b"insufficient funds".to_vec()));
        }
        ErrorCode::User.into()
    }

    fn dangling<T>() -> *mut T {
        std::ptr::NonNull::<T>::dangling().as_ptr()
    }

    #[test]
    fn test_null_state_is_unavailable() {
        assert!(VmChainApi::new(ChainApi::unavailable()).is_none());
        assert!(VmBank::new(BankApi::unavailable()).is_none());
    }

    #[test]
    fn test_get_block_info() {
        let api = VmChainApi::new(ChainApi {
            state: dangling::<api_t>(),
            vtable: ChainApiVtable {
                get_block_info: Some(block_info),
            },
        })
        .unwrap();
        assert_eq!(api.get_block_info().unwrap(), (42, 1_700_000_000));
    }

    #[test]
    fn test_transfer_reports_gas_on_failure() {
        let mut bank = VmBank::new(BankApi {
            state: dangling::<bank_t>(),
            vtable: BankApiVtable {
                bank_transfer: Some(transfer_rejects),
            },
        })
        .unwrap();
        let (result, used_gas) = bank.transfer(b"bob", b"unova", 10);
        assert_eq!(result, Err(BackendError::user_err("insufficient funds")));
        assert_eq!(used_gas, 1_500);
    }
}
