use std::sync::{Arc, Barrier};

use nova_program_runtime::db::VmStorage;
use nova_program_runtime::error::{BackendError, ErrorCode};
use nova_program_runtime::storage::{Order, Storage, StorageIterator};
use nova_syscalls::{
    build_db, BoxedKvIterator, DbState, GasCosts, GasMeter, GasMeteredStore, IteratorRegistry, KvStore,
    MemoryStore,
};
use nova_vm_sdk::{BlockInfo, Coin, Error, HostEnv, NovaVm, VmConfig};
use test_runner::{decode_results, MemoryBank, Op, OpResult, Script, ScriptEngine, StaticQuerier, TRANSFER_GAS};

fn vm() -> NovaVm {
    NovaVm::new(Box::new(ScriptEngine::new()), VmConfig::default())
}

fn run(vm: &mut NovaVm, store: &mut dyn KvStore, script: Script) -> Result<Vec<OpResult>, Error> {
    let payload = script.encode().unwrap();
    let output = vm.execute_entry_function(store, HostEnv::none(), None, b"session", b"alice", &payload)?;
    Ok(decode_results(&output).unwrap())
}

fn record(key: &[u8], value: &[u8]) -> (Vec<u8>, Vec<u8>) {
    (key.to_vec(), value.to_vec())
}

#[test]
fn test_set_then_get_returns_value() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let results = run(&mut vm, &mut store, Script::new().set(b"k", b"v").get(b"k")).unwrap();
    assert_eq!(results, vec![OpResult::Done, OpResult::Value(Some(b"v".to_vec()))]);
}

#[test]
fn test_absent_and_empty_values_differ() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let results = run(
        &mut vm,
        &mut store,
        Script::new().get(b"never").set(b"empty", b"").get(b"empty"),
    )
    .unwrap();
    assert_eq!(
        results,
        vec![
            OpResult::Value(None),
            OpResult::Done,
            OpResult::Value(Some(Vec::new())),
        ]
    );
}

#[test]
fn test_scan_whole_keyspace_both_orders() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let results = run(
        &mut vm,
        &mut store,
        Script::new()
            .set(b"a", &[1])
            .set(b"b", &[2])
            .set(b"c", &[3])
            .scan(b"", false)
            .scan(b"", true),
    )
    .unwrap();
    assert_eq!(results[3], OpResult::Records(vec![record(b"a", &[1]), record(b"b", &[2]), record(b"c", &[3])]));
    assert_eq!(results[4], OpResult::Records(vec![record(b"c", &[3]), record(b"b", &[2]), record(b"a", &[1])]));
    assert_eq!(vm.registry().open_frames(), 0);
}

#[test]
fn test_prefix_scan_is_bounded_and_ordered() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let keys: [&[u8]; 6] = [b"ap", b"app", b"apple", b"apq", b"b", b"a"];
    for key in keys {
        store.set(key, key);
    }

    let results = run(
        &mut vm,
        &mut store,
        Script::new()
            .scan(b"app", false)
            .scan(b"app", true)
            .op(Op::Scan {
                prefix: b"ap".to_vec(),
                start: Some(b"apple".to_vec()),
                end: Some(b"apq".to_vec()),
                descending: false,
                limit: None,
            })
            .op(Op::Scan {
                prefix: b"ap".to_vec(),
                start: None,
                end: None,
                descending: false,
                limit: Some(2),
            }),
    )
    .unwrap();

    assert_eq!(results[0], OpResult::Records(vec![record(b"app", b"app"), record(b"apple", b"apple")]));
    assert_eq!(results[1], OpResult::Records(vec![record(b"apple", b"apple"), record(b"app", b"app")]));
    assert_eq!(results[2], OpResult::Records(vec![record(b"apple", b"apple")]));
    assert_eq!(results[3], OpResult::Records(vec![record(b"ap", b"ap"), record(b"app", b"app")]));
}

#[test]
fn test_iterator_limit_is_reported_to_the_caller() {
    let mut vm = NovaVm::new(
        Box::new(ScriptEngine::new()),
        VmConfig::default().with_iterator_limit(4),
    );
    let mut store = MemoryStore::new();

    let results = run(&mut vm, &mut store, Script::new().op(Op::Open { count: 4 })).unwrap();
    assert_eq!(results, vec![OpResult::Opened(4)]);

    let err = run(&mut vm, &mut store, Script::new().op(Op::Open { count: 5 })).unwrap_err();
    assert_eq!(err.code(), ErrorCode::User);
    assert!(err.to_string().contains("Reached iterator limit (4)"), "{err}");

    // Frames of failed calls are released as well
    assert_eq!(vm.registry().open_frames(), 0);
}

#[test]
fn test_stale_iterator_after_frame_cleared() {
    let registry = IteratorRegistry::new();
    let mut store = MemoryStore::new();
    store.set(b"a", b"1");

    let call_id = registry.start_call();
    let mut state = DbState::new(&mut store, &registry, call_id);
    let mut storage = VmStorage::new(build_db(&mut state));
    let mut iter = storage.scan(b"", None, None, Order::Ascending).unwrap();
    registry.end_call(call_id);

    assert_eq!(iter.next(), Err(BackendError::ForeignPanic));
}

#[test]
fn test_engine_panic_is_panic() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let err = run(
        &mut vm,
        &mut store,
        Script::new().op(Op::Panic {
            msg: "boom".to_string(),
        }),
    )
    .unwrap_err();
    assert_eq!(
        err,
        Error::Panic {
            msg: "Caught panic".to_string()
        }
    );
}

/// A store whose reads fail unexpectedly
struct BrokenStore;

impl KvStore for BrokenStore {
    fn get(&self, _key: &[u8]) -> Option<Vec<u8>> {
        panic!("disk on fire");
    }

    fn set(&mut self, _key: &[u8], _value: &[u8]) {}

    fn delete(&mut self, _key: &[u8]) {}

    fn iterator(&self, _start: Option<&[u8]>, _end: Option<&[u8]>) -> BoxedKvIterator {
        MemoryStore::new().iterator(None, None)
    }

    fn reverse_iterator(&self, _start: Option<&[u8]>, _end: Option<&[u8]>) -> BoxedKvIterator {
        MemoryStore::new().reverse_iterator(None, None)
    }
}

#[test]
fn test_host_fault_in_callback_is_panic() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut vm = vm();
    let mut store = BrokenStore;
    let err = run(&mut vm, &mut store, Script::new().get(b"k")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Panic);
}

#[test]
fn test_metered_store_out_of_gas() {
    let mut vm = vm();
    let meter = Arc::new(GasMeter::new(100));
    let costs = GasCosts {
        get: 99,
        set: 187,
        ..GasCosts::default()
    };
    let mut store = GasMeteredStore::new(MemoryStore::new(), Arc::clone(&meter), costs);

    let err = run(&mut vm, &mut store, Script::new().get(b"k").set(b"k", b"v")).unwrap_err();
    assert_eq!(err, Error::OutOfGas);
    assert_eq!(meter.gas_consumed(), 286);
    assert!(meter.is_out_of_gas());
    assert!(store.inner().is_empty());
    assert_eq!(vm.registry().open_frames(), 0);
}

#[test]
fn test_engine_gas_limit() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let payload = Script::new().op(Op::ChargeGas { amount: 501 }).encode().unwrap();
    let err = vm
        .execute_script(&mut store, HostEnv::none(), Some(500), b"s", b"alice", &payload)
        .unwrap_err();
    assert_eq!(err, Error::OutOfGas);
}

#[test]
fn test_concurrent_calls_keep_frames_apart() {
    let registry = Arc::new(IteratorRegistry::new());
    // Burn ids so the two calls below get 10 and 11
    for _ in 0..9 {
        let call_id = registry.start_call();
        registry.end_call(call_id);
    }
    let first = registry.start_call();
    let second = registry.start_call();
    assert_eq!((first, second), (10, 11));

    let opened = Barrier::new(2);
    let closed = Barrier::new(2);
    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut store = MemoryStore::new();
            store.set(b"x", b"1");
            let mut state = DbState::new(&mut store, &registry, first);
            let mut storage = VmStorage::new(build_db(&mut state));
            for _ in 0..5 {
                storage.scan(b"", None, None, Order::Ascending).unwrap();
            }
            opened.wait();
            registry.end_call(first);
            closed.wait();
        });
        scope.spawn(|| {
            let mut store = MemoryStore::new();
            store.set(b"y", b"2");
            let mut state = DbState::new(&mut store, &registry, second);
            let mut storage = VmStorage::new(build_db(&mut state));
            let mut iters: Vec<Box<dyn StorageIterator>> = (0..5)
                .map(|_| storage.scan(b"", None, None, Order::Ascending).unwrap())
                .collect();
            opened.wait();
            closed.wait();
            for iter in iters.iter_mut() {
                assert_eq!(iter.next().unwrap(), Some((b"y".to_vec(), b"2".to_vec())));
                assert_eq!(iter.next().unwrap(), None);
            }
        });
    });

    assert_eq!(registry.frame_len(first), None);
    assert_eq!(registry.frame_len(second), Some(5));
    registry.end_call(second);
    assert_eq!(registry.open_frames(), 0);
}

#[test]
fn test_chain_bank_and_querier() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let block = BlockInfo {
        height: 7,
        timestamp: 1_650_000_000,
    };
    let mut bank = MemoryBank::new();
    bank.fund(Coin::new("unova", 100));
    let querier = StaticQuerier::new().with_answer(b"price", b"3");

    let payload = Script::new()
        .op(Op::BlockInfo)
        .op(Op::Transfer {
            recipient: b"bob".to_vec(),
            denom: b"unova".to_vec(),
            amount: 40,
        })
        .op(Op::Query {
            request: b"price".to_vec(),
        })
        .encode()
        .unwrap();
    let env = HostEnv::none()
        .with_chain(&block)
        .with_bank(&mut bank)
        .with_querier(&querier);
    let output = vm
        .execute_entry_function(&mut store, env, None, b"s", b"alice", &payload)
        .unwrap();
    assert_eq!(
        decode_results(&output).unwrap(),
        vec![
            OpResult::Block {
                height: 7,
                timestamp: 1_650_000_000
            },
            OpResult::Done,
            OpResult::Answer(b"3".to_vec()),
        ]
    );
    assert_eq!(bank.balance("bob", "unova"), 40);
    assert_eq!(bank.reserve("unova"), 60);
}

#[test]
fn test_failed_transfer_still_costs_gas() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let mut bank = MemoryBank::new();
    let payload = Script::new()
        .op(Op::Transfer {
            recipient: b"bob".to_vec(),
            denom: b"unova".to_vec(),
            amount: 1,
        })
        .encode()
        .unwrap();

    let err = vm
        .execute_entry_function(
            &mut store,
            HostEnv::none().with_bank(&mut bank),
            Some(TRANSFER_GAS - 1),
            b"s",
            b"alice",
            &payload,
        )
        .unwrap_err();
    assert_eq!(err, Error::OutOfGas);

    let err = vm
        .execute_entry_function(
            &mut store,
            HostEnv::none().with_bank(&mut bank),
            None,
            b"s",
            b"alice",
            &payload,
        )
        .unwrap_err();
    assert!(err.to_string().contains("insufficient unova"), "{err}");
}

#[test]
fn test_missing_capabilities() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let err = run(&mut vm, &mut store, Script::new().op(Op::BlockInfo)).unwrap_err();
    assert!(err.to_string().contains("Capability not available: chain api"), "{err}");

    let query = Script::new()
        .op(Op::Query {
            request: b"price".to_vec(),
        })
        .encode()
        .unwrap();
    let err = vm
        .query_entry_function(&mut store, HostEnv::none(), None, &query)
        .unwrap_err();
    assert!(err.to_string().contains("querier"), "{err}");
}

#[test]
fn test_query_rejects_writes() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    let payload = Script::new().set(b"k", b"v").encode().unwrap();
    let err = vm
        .query_entry_function(&mut store, HostEnv::none(), None, &payload)
        .unwrap_err();
    assert_eq!(
        err,
        Error::Vm {
            msg: "VM error: state change in query".to_string()
        }
    );
    assert!(store.is_empty());
}

#[test]
fn test_initialize_and_publish() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    vm.initialize(&mut store, b"bundle-0").unwrap();
    assert_eq!(store.get(b"genesis"), Some(b"bundle-0".to_vec()));

    let key = vm
        .publish_module_bundle(&mut store, None, b"s", b"alice", b"bundle-1")
        .unwrap();
    assert_eq!(key, b"code/alice".to_vec());
    assert_eq!(store.get(b"code/alice"), Some(b"bundle-1".to_vec()));

    let err = vm
        .publish_module_bundle(&mut store, Some(3), b"s", b"bob", b"bundle-2")
        .unwrap_err();
    assert_eq!(err, Error::OutOfGas);
}

#[test]
fn test_decode_entry_points() {
    let mut vm = vm();
    let mut store = MemoryStore::new();
    store.set(b"0x1::coin::Coin", b"\x01\x02");

    let rendered = vm
        .decode_resource(&mut store, b"0x1::coin::Coin", b"\x01\x02")
        .unwrap();
    assert_eq!(rendered, b"[1, 2]".to_vec());

    let script = Script::new().get(b"k").encode().unwrap();
    let rendered = vm.decode_script(&script).unwrap();
    assert_eq!(String::from_utf8(rendered).unwrap(), "[Get { key: [107] }]");

    let err = vm.decode_module(b"module").unwrap_err();
    assert!(err.to_string().contains("unimplemented: decode_module_bytes"), "{err}");
}
