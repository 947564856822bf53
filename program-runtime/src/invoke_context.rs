//! Invocation context for the Nova VM
//!
//! One context is built per entry point call. It holds the host
//! capabilities available to this invocation and tracks the gas budget,
//! including gas that the host spent on the VM's behalf (bank transfers).

use std::cell::RefCell;

use crate::error::{BackendError, RustError};
use crate::storage::{BankTransfer, BlockInfoResolver, QueryResolver, Storage};

/// Program invocation context
///
/// Capabilities other than storage are optional; asking for a missing one
/// fails with [`BackendError::Unavailable`].
pub struct InvokeContext<'a> {
    // === Gas Tracking ===
    /// Gas allocated for this invocation
    gas_limit: u64,

    /// Remaining gas (RefCell for interior mutability)
    gas_meter: RefCell<u64>,

    // === Host Capabilities ===
    storage: &'a mut dyn Storage,
    chain_api: Option<&'a dyn BlockInfoResolver>,
    bank: Option<&'a mut dyn BankTransfer>,
    querier: Option<&'a dyn QueryResolver>,

    // === Debug and Logging ===
    /// Debug mode (set from the `verbose` flag of the entry point)
    pub debug_mode: bool,
}

impl<'a> InvokeContext<'a> {
    /// Creates a new invocation context
    ///
    /// # Arguments
    /// * `storage` - Host storage for this invocation
    /// * `gas_limit` - Maximum gas allowed for this invocation
    pub fn new(storage: &'a mut dyn Storage, gas_limit: u64) -> Self {
        Self {
            gas_limit,
            gas_meter: RefCell::new(gas_limit),
            storage,
            chain_api: None,
            bank: None,
            querier: None,
            debug_mode: false,
        }
    }

    /// Attach a chain API
    pub fn with_chain_api(mut self, chain_api: Option<&'a dyn BlockInfoResolver>) -> Self {
        self.chain_api = chain_api;
        self
    }

    /// Attach a bank
    pub fn with_bank(mut self, bank: Option<&'a mut dyn BankTransfer>) -> Self {
        self.bank = bank;
        self
    }

    /// Attach a querier
    pub fn with_querier(mut self, querier: Option<&'a dyn QueryResolver>) -> Self {
        self.querier = querier;
        self
    }

    /// Enable debug mode
    pub fn enable_debug(&mut self) {
        self.debug_mode = true;
    }

    /// Get the gas limit of this invocation
    pub fn get_gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Get the remaining gas
    pub fn get_remaining(&self) -> u64 {
        *self.gas_meter.borrow()
    }

    /// Get gas consumed so far
    pub fn get_gas_used(&self) -> u64 {
        self.gas_limit.saturating_sub(*self.gas_meter.borrow())
    }

    /// Consume gas with checked arithmetic
    ///
    /// Running out drains the meter and returns [`RustError::OutOfGas`].
    pub fn consume_checked(&self, amount: u64) -> Result<(), RustError> {
        let mut meter = self.gas_meter.borrow_mut();
        match meter.checked_sub(amount) {
            Some(remaining) => {
                *meter = remaining;
                Ok(())
            }
            None => {
                *meter = 0;
                Err(RustError::out_of_gas())
            }
        }
    }

    /// Host storage
    pub fn storage(&self) -> &dyn Storage {
        &*self.storage
    }

    /// Host storage, mutable
    pub fn storage_mut(&mut self) -> &mut dyn Storage {
        &mut *self.storage
    }

    /// Latest block `(height, timestamp)` from the chain API
    pub fn block_info(&self) -> Result<(u64, u64), RustError> {
        let chain_api = self
            .chain_api
            .ok_or_else(|| BackendError::unavailable("chain api"))?;
        Ok(chain_api.get_block_info()?)
    }

    /// Transfer coins through the bank, charging the gas the host reports
    ///
    /// Gas is charged before the transfer outcome is looked at, so a failed
    /// transfer still costs what the host spent on it.
    pub fn bank_transfer(
        &mut self,
        recipient: &[u8],
        denom: &[u8],
        amount: u64,
    ) -> Result<(), RustError> {
        let bank = self
            .bank
            .as_mut()
            .ok_or_else(|| BackendError::unavailable("bank"))?;
        let (result, used_gas) = bank.transfer(recipient, denom, amount);
        if self.debug_mode {
            log::info!("bank transfer of {amount} used {used_gas} gas");
        }
        self.consume_checked(used_gas)?;
        Ok(result?)
    }

    /// Send an opaque query to the host
    pub fn query(&self, request: &[u8]) -> Result<Vec<u8>, RustError> {
        let querier = self
            .querier
            .ok_or_else(|| BackendError::unavailable("querier"))?;
        Ok(querier.query_raw(request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendResult;
    use crate::storage::{Order, StorageIterator};

    struct NoOpStorage;

    impl Storage for NoOpStorage {
        fn get(&self, _key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn set(&mut self, _key: &[u8], _value: &[u8]) -> BackendResult<()> {
            Ok(())
        }

        fn remove(&mut self, _key: &[u8]) -> BackendResult<()> {
            Ok(())
        }

        fn scan(
            &mut self,
            _prefix: &[u8],
            _start: Option<&[u8]>,
            _end: Option<&[u8]>,
            _order: Order,
        ) -> BackendResult<Box<dyn StorageIterator>> {
            Err(BackendError::unknown("no iterators"))
        }
    }

    struct FixedBlock;

    impl BlockInfoResolver for FixedBlock {
        fn get_block_info(&self) -> BackendResult<(u64, u64)> {
            Ok((7, 1234))
        }
    }

    struct CostlyBank {
        gas: u64,
        fail: bool,
    }

    impl BankTransfer for CostlyBank {
        fn transfer(&mut self, _recipient: &[u8], _denom: &[u8], _amount: u64) -> (BackendResult<()>, u64) {
            let result = if self.fail {
                Err(BackendError::user_err("insufficient funds"))
            } else {
                Ok(())
            };
            (result, self.gas)
        }
    }

    #[test]
    fn test_invoke_context_creation() {
        let mut storage = NoOpStorage;
        let context = InvokeContext::new(&mut storage, 100_000);
        assert_eq!(context.get_gas_limit(), 100_000);
        assert_eq!(context.get_remaining(), 100_000);
        assert_eq!(context.get_gas_used(), 0);
        assert!(!context.debug_mode);
    }

    #[test]
    fn test_gas_consumption() {
        let mut storage = NoOpStorage;
        let context = InvokeContext::new(&mut storage, 100_000);

        assert!(context.consume_checked(10_000).is_ok());
        assert_eq!(context.get_remaining(), 90_000);
        assert_eq!(context.get_gas_used(), 10_000);

        assert!(matches!(
            context.consume_checked(100_000),
            Err(RustError::OutOfGas)
        ));
        assert_eq!(context.get_remaining(), 0);
    }

    #[test]
    fn test_missing_capabilities() {
        let mut storage = NoOpStorage;
        let mut context = InvokeContext::new(&mut storage, 100);

        assert!(matches!(
            context.block_info(),
            Err(RustError::BackendFailure { .. })
        ));
        assert!(matches!(
            context.bank_transfer(b"bob", b"unova", 1),
            Err(RustError::BackendFailure { .. })
        ));
        assert!(matches!(
            context.query(b"q"),
            Err(RustError::BackendFailure { .. })
        ));
    }

    #[test]
    fn test_block_info() {
        let mut storage = NoOpStorage;
        let chain = FixedBlock;
        let context = InvokeContext::new(&mut storage, 100).with_chain_api(Some(&chain));
        assert_eq!(context.block_info().unwrap(), (7, 1234));
    }

    #[test]
    fn test_bank_transfer_charges_external_gas() {
        let mut storage = NoOpStorage;
        let mut bank = CostlyBank { gas: 30, fail: true };
        let mut context = InvokeContext::new(&mut storage, 100).with_bank(Some(&mut bank));

        assert!(matches!(
            context.bank_transfer(b"bob", b"unova", 5),
            Err(RustError::BackendFailure { .. })
        ));
        assert_eq!(context.get_gas_used(), 30);
    }

    #[test]
    fn test_bank_transfer_out_of_gas() {
        let mut storage = NoOpStorage;
        let mut bank = CostlyBank { gas: 500, fail: false };
        let mut context = InvokeContext::new(&mut storage, 100).with_bank(Some(&mut bank));

        assert!(matches!(
            context.bank_transfer(b"bob", b"unova", 5),
            Err(RustError::OutOfGas)
        ));
    }

    #[test]
    fn test_storage_access() {
        let mut storage = NoOpStorage;
        let mut context = InvokeContext::new(&mut storage, 100);
        assert!(context.storage_mut().set(b"k", b"v").is_ok());
        assert_eq!(context.storage().get(b"k").unwrap(), None);
    }
}
