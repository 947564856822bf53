//! Gas-metered store proxy
//!
//! [`GasMeteredStore`] wraps any [`KvStore`] and charges a [`GasMeter`]
//! before each operation is delegated. Exhaustion is signalled by panicking
//! with an [`OutOfGas`] payload, which the callback wrapper in
//! [`crate::recovery`] turns into `ErrorCode::OutOfGas`.

use std::panic::panic_any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::recovery::{GasOverflow, OutOfGas};
use crate::store::{BoxedKvIterator, KvIterator, KvStore};

/// Gas meter with a fixed limit
///
/// Shared by `Arc` between the proxy and the iterators it opens, which may
/// outlive a borrow of the proxy inside the iterator registry.
#[derive(Debug)]
pub struct GasMeter {
    limit: u64,
    consumed: AtomicU64,
}

impl GasMeter {
    /// Creates a meter allowing `limit` gas
    pub fn new(limit: u64) -> Self {
        GasMeter {
            limit,
            consumed: AtomicU64::new(0),
        }
    }

    /// Charge `amount` gas
    ///
    /// The consumed total is updated before the limit is checked, so a
    /// failed charge still shows up in [`GasMeter::gas_consumed`].
    ///
    /// # Panics
    /// - with [`GasOverflow`] if the total would overflow `u64`; the total is
    ///   left unchanged
    /// - with [`OutOfGas`] if the total exceeds the limit
    pub fn consume_gas(&self, amount: u64, descriptor: &str) {
        let updated = self
            .consumed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |consumed| {
                consumed.checked_add(amount)
            });
        let total = match updated {
            // The closure already checked this addition
            Ok(previous) => previous.saturating_add(amount),
            Err(_) => panic_any(GasOverflow {
                descriptor: descriptor.to_string(),
            }),
        };
        if total > self.limit {
            panic_any(OutOfGas {
                descriptor: descriptor.to_string(),
            });
        }
    }

    /// Gas consumed so far
    pub fn gas_consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    /// The limit
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Gas left before the limit is reached
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.gas_consumed())
    }

    /// True once more than the limit has been charged
    pub fn is_out_of_gas(&self) -> bool {
        self.gas_consumed() > self.limit
    }
}

/// Price of each store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasCosts {
    /// Cost of a read
    pub get: u64,
    /// Cost of a write
    pub set: u64,
    /// Cost of a delete
    pub remove: u64,
    /// Cost of each record delivered by an iterator
    pub iter_next: u64,
}

impl Default for GasCosts {
    fn default() -> Self {
        GasCosts {
            get: 99_000,
            set: 187_000,
            remove: 142_000,
            iter_next: 29_000,
        }
    }
}

/// [`KvStore`] proxy that charges gas before delegating
pub struct GasMeteredStore<S: KvStore> {
    inner: S,
    meter: Arc<GasMeter>,
    costs: GasCosts,
}

impl<S: KvStore> GasMeteredStore<S> {
    /// Wraps `inner`, charging `meter` according to `costs`
    pub fn new(inner: S, meter: Arc<GasMeter>, costs: GasCosts) -> Self {
        GasMeteredStore {
            inner,
            meter,
            costs,
        }
    }

    /// The meter being charged
    pub fn meter(&self) -> &Arc<GasMeter> {
        &self.meter
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the proxy
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn metered(&self, inner: BoxedKvIterator) -> BoxedKvIterator {
        Box::new(MeteredIterator {
            inner,
            meter: Arc::clone(&self.meter),
            cost: self.costs.iter_next,
        })
    }
}

impl<S: KvStore> KvStore for GasMeteredStore<S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.meter.consume_gas(self.costs.get, "get");
        self.inner.get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.meter.consume_gas(self.costs.set, "set");
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) {
        self.meter.consume_gas(self.costs.remove, "remove");
        self.inner.delete(key)
    }

    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> BoxedKvIterator {
        self.metered(self.inner.iterator(start, end))
    }

    fn reverse_iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> BoxedKvIterator {
        self.metered(self.inner.reverse_iterator(start, end))
    }
}

/// Iterator that charges for every advance past a record
struct MeteredIterator {
    inner: BoxedKvIterator,
    meter: Arc<GasMeter>,
    cost: u64,
}

impl KvIterator for MeteredIterator {
    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn key(&self) -> &[u8] {
        self.inner.key()
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn next(&mut self) {
        // Charge first so the cursor is untouched when gas runs out
        self.meter.consume_gas(self.cost, "iter_next");
        self.inner.next()
    }
}
