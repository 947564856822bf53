use anyhow::Context;
use nova_vm_sdk::{BlockInfo, Coin, HostEnv, MemoryStore, NovaVm, VmConfig};
use test_runner::{decode_results, MemoryBank, Op, Script, ScriptEngine, StaticQuerier};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut vm = NovaVm::new(Box::new(ScriptEngine::new()), VmConfig::default().with_verbose(true));
    let mut store = MemoryStore::new();
    vm.initialize(&mut store, b"genesis").context("initialize")?;

    let block = BlockInfo {
        height: 42,
        timestamp: 1_700_000_000,
    };
    let mut bank = MemoryBank::new();
    bank.fund(Coin::new("unova", 1_000));
    let querier = StaticQuerier::new().with_answer(b"price/unova", b"1.25");

    let script = Script::new()
        .set(b"balance/alice", b"10")
        .set(b"balance/bob", b"20")
        .set(b"config/fee", b"1")
        .scan(b"balance/", false)
        .op(Op::BlockInfo)
        .op(Op::Transfer {
            recipient: b"carol".to_vec(),
            denom: b"unova".to_vec(),
            amount: 250,
        })
        .op(Op::Query {
            request: b"price/unova".to_vec(),
        });

    let env = HostEnv::none()
        .with_chain(&block)
        .with_bank(&mut bank)
        .with_querier(&querier);
    let output = vm
        .execute_entry_function(&mut store, env, None, b"session-1", b"alice", &script.encode()?)
        .context("execute")?;

    for (index, result) in decode_results(&output)?.iter().enumerate() {
        log::info!("op {index}: {result:?}");
    }
    log::info!(
        "store holds {} keys, carol received {} unova",
        store.len(),
        bank.balance("carol", "unova")
    );
    log::info!("open iterator frames: {}", vm.registry().open_frames());
    Ok(())
}
