//! Bank transfer callbacks
//!
//! Lets the VM move coins through the host's bank. The host reports the gas
//! it spent on each transfer, successful or not, and the VM charges it to
//! the invocation.

use nova_program_runtime::api::{bank_t, BankApi, BankApiVtable};
use nova_program_runtime::error::ErrorCode;
use nova_program_runtime::memory::{assert_none, write_output, U8SliceView, UnmanagedVector};
use serde::{Deserialize, Serialize};

use crate::callback_names;
use crate::recovery::recover_panic;

/// An amount of a single denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination
    pub denom: String,
    /// Amount in the smallest unit
    pub amount: u64,
}

impl Coin {
    /// Creates a coin
    pub fn new(denom: impl Into<String>, amount: u64) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }
}

/// The host's bank
pub trait Bank {
    /// Transfer `coin` to `recipient`
    ///
    /// # Returns
    /// The outcome and the gas spent, which is charged even on failure
    fn transfer(&mut self, recipient: &str, coin: &Coin) -> (anyhow::Result<()>, u64);
}

/// Host state behind a [`BankApi`] table
pub struct BankState<'a> {
    /// The bank
    pub bank: &'a mut dyn Bank,
}

impl<'a> BankState<'a> {
    /// Wraps `bank`
    pub fn new(bank: &'a mut dyn Bank) -> Self {
        BankState { bank }
    }
}

/// Builds the [`BankApi`] handed to the VM for one invocation
pub fn build_bank_api(state: &mut BankState<'_>) -> BankApi {
    BankApi {
        state: state as *mut BankState<'_> as *mut bank_t,
        vtable: BankApiVtable {
            bank_transfer: Some(bank_transfer),
        },
    }
}

/// Host side of `bank_transfer`
pub extern "C" fn bank_transfer(
    bank: *mut bank_t,
    recipient: U8SliceView,
    denom: U8SliceView,
    amount: u64,
    used_gas: *mut u64,
    err_out: *mut UnmanagedVector,
) -> i32 {
    recover_panic(callback_names::BANK_TRANSFER, || {
        // SAFETY: pointers come from the VM side of this invocation
        let (Some(state), Some(used_gas), Some(err_out)) = (unsafe {
            (
                (bank as *mut BankState<'_>).as_mut(),
                used_gas.as_mut(),
                err_out.as_mut(),
            )
        }) else {
            return ErrorCode::BadArgument;
        };
        assert_none(err_out);
        let (Some(recipient), Some(denom)) = (recipient.read(), denom.read()) else {
            return ErrorCode::BadArgument;
        };
        let (Ok(recipient), Ok(denom)) = (std::str::from_utf8(recipient), std::str::from_utf8(denom)) else {
            return ErrorCode::BadArgument;
        };

        let coin = Coin::new(denom, amount);
        let (result, gas) = state.bank.transfer(recipient, &coin);
        log::debug!("bank_transfer: {amount}{denom} to {recipient}, gas={gas}");
        *used_gas = gas;

        match result {
            Ok(()) => ErrorCode::Success,
            Err(err) => {
                write_output(err_out, Some(err.to_string().into_bytes()));
                ErrorCode::User
            }
        }
    })
    .into()
}
