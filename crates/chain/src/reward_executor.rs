//! # Epoch Settlement Execution
//!
//! Settles exactly one closed epoch of one contract.
//!
//! ## Functions
//!
//! | Function | Mutates | Description |
//! |----------|---------|-------------|
//! | `compute_settlement` | No | snapshot + pool + allocation, conservation-checked |
//! | `settle_epoch` | Yes | full pipeline below |
//!
//! ## Pipeline
//!
//! ```text
//! STEP 1 ─ ORDER CHECK (read-only)
//! │  epoch == contract.next_epoch()            ← else EpochOutOfOrder
//! │  snapshot (kind, epoch) not frozen yet      ← else SnapshotAlreadyFrozen
//! │
//! STEP 2 ─ COMPUTE (pure)
//! │  snapshot   = state.build_snapshot(kind, window, ledger)
//! │  pool       = schedule.reward_pool(kind, epoch)
//! │  allocation = RewardAllocator::for_kind(..).allocate(pool, snapshot)
//! │  Σ shares ≤ pool                             ← else ConservationViolated
//! │  no reward entry exists for (kind, addr, epoch) ← else DuplicateRewardEntry
//! │
//! ════════════════════ MUTATION BOUNDARY ════════════════════
//! │
//! STEP 3 ─ FREEZE snapshot into the append-only log
//! STEP 4 ─ MINT + DONATE the whole pool into the contract balance
//! STEP 5 ─ RECORD one history entry per recipient
//! STEP 6 ─ CONSUME the epoch's block counters (pillar only)
//! STEP 7 ─ ADVANCE lastUpdateEpoch / lastUpdateHeight
//! STEP 8 ─ PRUNE entries revoked at or before the epoch end
//! ```
//!
//! Every error after the mutation boundary is fatal: the engine halts, so a
//! partial write is never built upon.

use tracing::info;

use crate::accumulator::EpochSnapshot;
use crate::allocator::{Allocation, RewardAllocator};
use crate::config::SettlementConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::issuance::IssuanceMinter;
use crate::ledger::Ledger;
use crate::state::SettlementState;
use crate::tokenomics::RewardPool;
use crate::types::{ContractKind, TokenAmounts};

/// Summary of one settled `(kind, epoch)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub kind: ContractKind,
    pub epoch: u64,
    pub height: u64,
    pub pool: TokenAmounts,
    pub distributed: TokenAmounts,
    pub remainder: TokenAmounts,
    pub recipients: usize,
    pub pruned: usize,
}

/// Everything settlement of `(kind, epoch)` would write, computed without
/// touching state.
#[derive(Debug, Clone)]
pub struct ComputedSettlement {
    pub snapshot: EpochSnapshot,
    pub pool: RewardPool,
    pub allocation: Allocation,
}

#[must_use = "the computed settlement must be applied or discarded explicitly"]
pub fn compute_settlement<L: Ledger>(
    state: &SettlementState,
    ledger: &L,
    config: &SettlementConfig,
    kind: ContractKind,
    epoch: u64,
) -> SettlementResult<ComputedSettlement> {
    let mpe = config.momentums_per_epoch();
    let window = config.clock().window(epoch);
    let snapshot = state.build_snapshot(kind, window, ledger)?;
    let pool = config.issuance.reward_pool(kind, epoch, mpe)?;
    let allocator = RewardAllocator::for_kind(kind, &config.issuance, epoch, mpe)?;
    let allocation = allocator.allocate(&pool, &snapshot)?;
    Ok(ComputedSettlement { snapshot, pool, allocation })
}

pub fn settle_epoch<L: Ledger>(
    state: &mut SettlementState,
    ledger: &mut L,
    config: &SettlementConfig,
    kind: ContractKind,
    epoch: u64,
    height: u64,
) -> SettlementResult<SettlementOutcome> {
    // STEP 1
    let expected = state.contract(kind).next_epoch();
    if epoch != expected {
        return Err(SettlementError::EpochOutOfOrder { kind, expected, got: epoch });
    }
    if state.snapshots.contains(kind, epoch) {
        return Err(SettlementError::SnapshotAlreadyFrozen { kind, epoch });
    }

    // STEP 2
    let ComputedSettlement { snapshot, pool, allocation } =
        compute_settlement(state, ledger, config, kind, epoch)?;
    if let Some(address) = allocation
        .shares
        .keys()
        .find(|a| state.rewards.has_entry(kind, a, epoch))
    {
        return Err(SettlementError::DuplicateRewardEntry { kind, address: *address, epoch });
    }

    for r in &allocation.pillar_rewards {
        info!(
            pillar = %r.owner,
            epoch,
            "DelegationReward:+{} BlockReward:+{} TotalReward:+{}",
            r.delegation_reward,
            r.block_reward,
            r.total_reward
        );
    }

    // ════════════════════ MUTATION BOUNDARY ════════════════════
    let window_end = snapshot.window.end;
    let participants = snapshot.participant_count();

    // STEP 3
    state.freeze_snapshot(snapshot)?;

    // STEP 4
    IssuanceMinter::mint_and_donate(ledger, &pool)?;

    // STEP 5
    for (address, amounts) in &allocation.shares {
        state.record_reward(kind, *address, epoch, *amounts)?;
    }

    // STEP 6
    if kind == ContractKind::Pillar {
        state.take_epoch_counters(epoch);
    }

    // STEP 7
    state.contract_mut(kind).advance(epoch, height)?;

    // STEP 8
    let pruned = state.prune_revoked(kind, window_end);

    let outcome = SettlementOutcome {
        kind,
        epoch,
        height,
        pool: pool.amounts,
        distributed: allocation.distributed,
        remainder: allocation.remainder(),
        recipients: allocation.shares.len(),
        pruned,
    };
    info!(
        %kind,
        epoch,
        height,
        pool = %outcome.pool,
        distributed = %outcome.distributed,
        participants,
        recipients = outcome.recipients,
        "epoch settled"
    );
    Ok(outcome)
}
