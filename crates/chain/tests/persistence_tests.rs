//! # Persistence Integration Tests
//!
//! `SettlementNode` persists after every accepted block; reopening the
//! LMDB directory resumes with the same state root and the same ledger.

use lattice_chain::tokenomics::STAKE_MIN_AMOUNT;
use lattice_chain::{
    Address, CallOutcome, ContractBlock, ContractCall, ContractKind, Ledger, MemoryLedger, MomentumSlot,
    SettlementConfig, SettlementDb, SettlementNode, SettlementState, TokenAmounts, TokenStandard,
};
use lattice_chain::state::PillarParams;
use tempfile::TempDir;

// ════════════════════════════════════════════════════════════════════════════
// HELPERS
// ════════════════════════════════════════════════════════════════════════════

const EPOCH: u64 = 1_200;

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

fn config() -> SettlementConfig {
    SettlementConfig {
        genesis_timestamp: 0,
        epoch_duration_secs: EPOCH,
        momentum_interval_secs: 10,
        min_momentum_gap: 1,
        ..Default::default()
    }
}

fn open(dir: &TempDir) -> SettlementNode {
    SettlementNode::open(config(), dir.path(), MemoryLedger::new()).unwrap()
}

fn call(sender: Address, kind: ContractKind, ts: u64, height: u64, call: ContractCall) -> ContractBlock {
    ContractBlock::new(sender, kind, ts, height, call)
}

fn populate(node: &SettlementNode) {
    let params = PillarParams {
        producer_address: addr(21),
        reward_address: addr(11),
        own_weight: 10_000,
        give_block_reward_percentage: 10,
        give_delegate_reward_percentage: 20,
    };
    node.apply_block(&call(addr(1), ContractKind::Pillar, 0, 1, ContractCall::RegisterPillar(params))).unwrap();
    node.apply_block(&call(addr(2), ContractKind::Sentinel, 0, 2, ContractCall::RegisterSentinel)).unwrap();
    let stake = ContractCall::Stake { amount: STAKE_MIN_AMOUNT * 2, duration_months: 4 };
    node.apply_block(&call(addr(3), ContractKind::Stake, 0, 3, stake)).unwrap();
    node.record_momentum(MomentumSlot { pillar: addr(1), timestamp: 10, produced: true }).unwrap();
    node.record_momentum(MomentumSlot { pillar: addr(1), timestamp: EPOCH + 10, produced: false }).unwrap();

    for (i, kind) in ContractKind::ALL.into_iter().enumerate() {
        node.apply_block(&call(addr(9), kind, EPOCH + 50, 10 + i as u64, ContractCall::Update)).unwrap();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════

#[test]
fn fresh_directory_starts_at_genesis() {
    let dir = TempDir::new().unwrap();
    let node = open(&dir);
    assert_eq!(node.engine.read().state(), &SettlementState::new());
}

#[test]
fn reopen_resumes_identical_state() {
    let dir = TempDir::new().unwrap();
    let (root, state) = {
        let node = open(&dir);
        populate(&node);
        let engine = node.engine.read();
        (engine.state_root().unwrap(), engine.state().clone())
    };

    let node = open(&dir);
    assert_eq!(node.state_root().unwrap(), root);
    let engine = node.engine.read();
    assert_eq!(engine.state(), &state);
    assert_eq!(engine.settlement_status(ContractKind::Stake).last_update_epoch, Some(0));
    assert!(engine.epoch_snapshot(ContractKind::Pillar, 0).is_some());
    // epoch 1 counters are still open
    assert_eq!(engine.state().accumulator.counter(1, &addr(1)).expected, 1);
}

#[test]
fn resumed_node_continues_settling() {
    let dir = TempDir::new().unwrap();
    {
        let node = open(&dir);
        populate(&node);
    }
    let node = open(&dir);
    let r = node
        .apply_block(&call(addr(9), ContractKind::Sentinel, 2 * EPOCH, 20, ContractCall::Update))
        .unwrap();
    assert_eq!(r.settled.map(|s| s.epoch), Some(1));

    let history = node.engine.read().reward_history_page(ContractKind::Sentinel, &addr(2), 0, 10);
    assert_eq!(history.count, 2);
}

#[test]
fn db_roundtrip_matches_state_root() {
    let dir = TempDir::new().unwrap();
    let db = SettlementDb::open(dir.path()).unwrap();
    let mut state = SettlementState::new();
    state.register_sentinel(addr(4), 0).unwrap();
    state.record_reward(ContractKind::Sentinel, addr(4), 0, TokenAmounts::new(7, 8)).unwrap();
    db.persist(&mut state, &mut MemoryLedger::new()).unwrap();

    let loaded = db.load_state().unwrap();
    assert_eq!(loaded.compute_state_root().unwrap(), state.compute_state_root().unwrap());
    assert!(db.has_state().unwrap());
}

#[test]
fn rejected_call_is_still_persisted_with_its_settlement() {
    let dir = TempDir::new().unwrap();
    {
        let node = open(&dir);
        let r = node
            .apply_block(&call(addr(1), ContractKind::Stake, EPOCH, 1, ContractCall::CancelStake { id: 42 }))
            .unwrap();
        assert!(r.call.is_err());
        assert!(r.settled.is_some());
    }
    let node = open(&dir);
    assert_eq!(node.engine.read().settlement_status(ContractKind::Stake).last_update_epoch, Some(0));
}

#[test]
fn reopened_node_pays_out_collected_rewards() {
    let dir = TempDir::new().unwrap();
    let (owed, ledger) = {
        let node = open(&dir);
        populate(&node);
        let engine = node.engine.read();
        (engine.uncollected_reward(ContractKind::Sentinel, &addr(2)), engine.ledger().clone())
    };
    assert!(owed.znn > 0 && owed.qsr > 0);

    let node = open(&dir);
    assert_eq!(node.engine.read().ledger(), &ledger);
    let r = node
        .apply_block(&call(addr(2), ContractKind::Sentinel, EPOCH + 60, 20, ContractCall::CollectReward))
        .unwrap();
    let transfers = match r.call {
        Ok(CallOutcome::Collected(c)) => c.transfers,
        other => panic!("expected collected, got {:?}", other),
    };
    assert!(!node.engine.read().is_halted());

    // receipt survives another restart
    drop(node);
    let node = open(&dir);
    assert_eq!(node.engine.read().pending_transfers(&addr(2)).len(), transfers.len());
    for id in transfers {
        node.receive_transfer(id).unwrap();
    }
    let engine = node.engine.read();
    assert_eq!(engine.ledger().balance(&addr(2), TokenStandard::Znn), owed.znn);
    assert_eq!(engine.ledger().balance(&addr(2), TokenStandard::Qsr), owed.qsr);
    assert!(engine.uncollected_reward(ContractKind::Sentinel, &addr(2)).is_zero());
}

#[test]
fn stored_root_tracks_many_blocks() {
    let dir = TempDir::new().unwrap();
    let node = open(&dir);
    populate(&node);
    for i in 0..30u64 {
        let ts = EPOCH * (2 + i);
        node.record_momentum(MomentumSlot { pillar: addr(1), timestamp: ts, produced: i % 2 == 0 }).unwrap();
        for (k, kind) in ContractKind::ALL.into_iter().enumerate() {
            let height = 100 + i * 10 + k as u64;
            node.apply_block(&call(addr(9), kind, ts + 5, height, ContractCall::Update)).unwrap();
        }
    }
    assert!(!node.engine.read().is_halted());
    assert_eq!(node.db.stored_root().unwrap(), Some(node.state_root().unwrap()));
    assert!(node.engine.read().state().writes.is_empty());
}
