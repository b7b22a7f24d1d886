//! # Settlement State
//!
//! **FACADE** for every table settlement persists.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     mod.rs (FACADE)                            │
//! │  - SettlementState struct definition                           │
//! │  - snapshot building, pruning                                  │
//! └────────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//!  ┌──────────────┐    ┌────────────────┐    ┌──────────────┐
//!  │   Registry   │    │ Uncollected    │    │  State Root  │
//!  │ (entries)    │    │ reward ledger  │    │  (SHA3-512)  │
//!  └──────────────┘    └────────────────┘    └──────────────┘
//! ```
//!
//! | Module | Fungsi |
//! |--------|--------|
//! | `internal_model` | `PillarEntry`, `SentinelEntry`, `StakeEntry`, `Delegation` |
//! | `internal_registry` | register / update / revoke / delegate / stake / cancel, pruning |
//! | `internal_rewards` | `UncollectedRewardLedger`: history per epoch + uncollected totals |
//! | `internal_state_root` | stored rows per table, incremental state root |
//!
//! ## Write tracking
//!
//! Mutations go through the facade (or the registry methods), which mark the
//! touched keys in `writes`. `SettlementDb::persist` stores exactly those
//! rows. Mutating `accumulator`, `snapshots` or `rewards` directly bypasses
//! the write set and the change is never stored.
//!
//! ## Revocation independence (CONSENSUS-CRITICAL)
//!
//! Registry tables and reward tables are disjoint. Revoking, cancelling or
//! pruning an entry never touches `rewards`.

use std::collections::BTreeMap;

use crate::accumulator::{
    liquidity_snapshot, pillar_snapshot, sentinel_snapshot, stake_snapshot, BlockCounter,
    EpochSnapshot, SnapshotLog, WeightAccumulator,
};
use crate::epoch::EpochWindow;
use crate::error::SettlementResult;
use crate::journal::WriteSet;
use crate::ledger::Ledger;
use crate::trigger::ContractSettlementState;
use crate::types::{Address, ContractKind, TokenAmounts, TokenStandard};

mod internal_model;
mod internal_registry;
mod internal_rewards;
mod internal_state_root;

pub use internal_model::{Delegation, PillarEntry, SentinelEntry, StakeEntry};
pub use internal_registry::{PillarParams, PillarUpdate};
pub use internal_rewards::{RewardHistoryEntry, RewardPage, UncollectedRewardLedger};
pub use internal_state_root::{StateRecord, StateRoot, Table, META_NEXT_STAKE_ID};

/// Keys touched since the last commit, per table. Contract cursors and
/// meta are few and always rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateWrites {
    pub pillars: WriteSet<Address>,
    pub sentinels: WriteSet<Address>,
    pub stakes: WriteSet<u64>,
    pub delegations: WriteSet<Address>,
    pub counters: WriteSet<(u64, Address)>,
    pub snapshots: WriteSet<(ContractKind, u64)>,
    pub history: WriteSet<(ContractKind, Address, u64)>,
    pub uncollected: WriteSet<(ContractKind, Address)>,
}

impl StateWrites {
    pub fn len(&self) -> usize {
        self.pillars.len()
            + self.sentinels.len()
            + self.stakes.len()
            + self.delegations.len()
            + self.counters.len()
            + self.snapshots.len()
            + self.history.len()
            + self.uncollected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementState {
    pub contracts: BTreeMap<ContractKind, ContractSettlementState>,
    pub pillars: BTreeMap<Address, PillarEntry>,
    pub sentinels: BTreeMap<Address, SentinelEntry>,
    pub stakes: BTreeMap<u64, StakeEntry>,
    /// delegator → delegation
    pub delegations: BTreeMap<Address, Delegation>,
    pub accumulator: WeightAccumulator,
    pub snapshots: SnapshotLog,
    pub rewards: UncollectedRewardLedger,
    pub next_stake_id: u64,
    pub writes: StateWrites,
}

impl Default for SettlementState {
    fn default() -> Self {
        Self::new()
    }
}

impl SettlementState {
    pub fn new() -> Self {
        let contracts = ContractKind::ALL
            .into_iter()
            .map(|k| (k, ContractSettlementState::genesis(k)))
            .collect();
        Self {
            contracts,
            pillars: BTreeMap::new(),
            sentinels: BTreeMap::new(),
            stakes: BTreeMap::new(),
            delegations: BTreeMap::new(),
            accumulator: WeightAccumulator::new(),
            snapshots: SnapshotLog::new(),
            rewards: UncollectedRewardLedger::new(),
            next_stake_id: 1,
            writes: StateWrites::default(),
        }
    }

    pub fn contract(&self, kind: ContractKind) -> ContractSettlementState {
        self.contracts
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| ContractSettlementState::genesis(kind))
    }

    pub fn contract_mut(&mut self, kind: ContractKind) -> &mut ContractSettlementState {
        self.contracts
            .entry(kind)
            .or_insert_with(|| ContractSettlementState::genesis(kind))
    }

    // ============================================================
    // TRACKED MUTATIONS
    // ============================================================

    pub fn record_slot(&mut self, epoch: u64, pillar: Address, produced: bool, limit: u64) -> SettlementResult<()> {
        self.accumulator.record_slot(epoch, pillar, produced, limit)?;
        self.writes.counters.touch((epoch, pillar));
        Ok(())
    }

    pub fn take_epoch_counters(&mut self, epoch: u64) -> BTreeMap<Address, BlockCounter> {
        let taken = self.accumulator.take_epoch(epoch);
        for pillar in taken.keys() {
            self.writes.counters.touch((epoch, *pillar));
        }
        taken
    }

    pub fn freeze_snapshot(&mut self, snapshot: EpochSnapshot) -> SettlementResult<()> {
        let key = (snapshot.kind, snapshot.epoch());
        self.snapshots.freeze(snapshot)?;
        self.writes.snapshots.touch(key);
        Ok(())
    }

    pub fn record_reward(
        &mut self,
        kind: ContractKind,
        address: Address,
        epoch: u64,
        amounts: TokenAmounts,
    ) -> SettlementResult<()> {
        self.rewards.record(kind, address, epoch, amounts)?;
        self.writes.history.touch((kind, address, epoch));
        self.writes.uncollected.touch((kind, address));
        Ok(())
    }

    pub fn take_uncollected(&mut self, kind: ContractKind, address: &Address) -> TokenAmounts {
        self.writes.uncollected.touch((kind, *address));
        self.rewards.take_uncollected(kind, address)
    }

    /// Forget the write set after a successful commit.
    pub fn mark_persisted(&mut self) {
        self.writes = StateWrites::default();
    }

    /// Read-only: builds the allocation input of `kind` for `window`.
    /// Delegated weight is the delegators' live ZNN balance.
    pub fn build_snapshot<L: Ledger>(
        &self,
        kind: ContractKind,
        window: EpochWindow,
        ledger: &L,
    ) -> SettlementResult<EpochSnapshot> {
        match kind {
            ContractKind::Pillar => pillar_snapshot(
                window,
                self.pillars.values(),
                self.delegations.values(),
                &self.accumulator.epoch_counters(window.epoch),
                |a| ledger.balance(a, TokenStandard::Znn),
            ),
            ContractKind::Sentinel => Ok(sentinel_snapshot(window, self.sentinels.values())),
            ContractKind::Stake => Ok(stake_snapshot(window, self.stakes.values())),
            ContractKind::Liquidity => Ok(liquidity_snapshot(window)),
        }
    }
}
