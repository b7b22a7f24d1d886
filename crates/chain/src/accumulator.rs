//! # Weight Accumulator
//!
//! Running per-epoch counters fed by ledger events, and the builders that
//! freeze them into an immutable [`EpochSnapshot`] when an epoch settles.
//!
//! ```text
//! record_momentum ──► WeightAccumulator.block_counters[(epoch, pillar)]
//!                                   │
//!        settle epoch e             ▼
//! live registry + counters ──► EpochSnapshot { kind, window, weights }
//!                                   │  freeze (append-only)
//!                                   ▼
//!                        SnapshotLog[(kind, epoch)]
//! ```
//!
//! | Kind | Snapshot input |
//! |------|----------------|
//! | Pillar | own weight, delegated weight, produced/expected blocks |
//! | Sentinel | active for the entire epoch |
//! | Stake | weighted amount × overlap seconds with the epoch window |
//! | Liquidity | nothing |

use std::collections::BTreeMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::epoch::EpochWindow;
use crate::error::{SettlementError, SettlementResult};
use crate::state::{Delegation, PillarEntry, SentinelEntry, StakeEntry};
use crate::types::{Address, ContractKind};

// ════════════════════════════════════════════════════════════════════════════════
// BLOCK COUNTERS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCounter {
    pub produced: u64,
    pub expected: u64,
}

/// Live counters keyed by `(epoch, pillar owner)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightAccumulator {
    block_counters: BTreeMap<(u64, Address), BlockCounter>,
}

impl WeightAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One momentum slot assigned to `pillar` in `epoch`. An epoch holds at
    /// most `limit` slots; more would pay block rewards beyond the block part.
    pub fn record_slot(&mut self, epoch: u64, pillar: Address, produced: bool, limit: u64) -> SettlementResult<()> {
        if self.epoch_slots(epoch) >= limit {
            return Err(SettlementError::EpochSlotsExhausted { epoch, limit });
        }
        let counter = self.block_counters.entry((epoch, pillar)).or_default();
        let expected = counter
            .expected
            .checked_add(1)
            .ok_or(SettlementError::ArithmeticOverflow("expected blocks"))?;
        let produced_count = if produced {
            counter
                .produced
                .checked_add(1)
                .ok_or(SettlementError::ArithmeticOverflow("produced blocks"))?
        } else {
            counter.produced
        };
        counter.expected = expected;
        counter.produced = produced_count;
        Ok(())
    }

    pub fn get(&self, epoch: u64, pillar: &Address) -> Option<&BlockCounter> {
        self.block_counters.get(&(epoch, *pillar))
    }

    /// Slots already counted in `epoch`, over all pillars.
    pub fn epoch_slots(&self, epoch: u64) -> u64 {
        self.block_counters
            .range(Self::epoch_range(epoch))
            .fold(0u64, |acc, (_, c)| acc.saturating_add(c.expected))
    }

    pub fn counter(&self, epoch: u64, pillar: &Address) -> BlockCounter {
        self.block_counters
            .get(&(epoch, *pillar))
            .copied()
            .unwrap_or_default()
    }

    fn epoch_range(epoch: u64) -> std::ops::RangeInclusive<(u64, Address)> {
        (epoch, Address::from_bytes([0u8; 20]))..=(epoch, Address::from_bytes([0xffu8; 20]))
    }

    pub fn epoch_counters(&self, epoch: u64) -> BTreeMap<Address, BlockCounter> {
        self.block_counters
            .range(Self::epoch_range(epoch))
            .map(|((_, pillar), c)| (*pillar, *c))
            .collect()
    }

    /// Removes and returns the counters of `epoch`.
    pub fn take_epoch(&mut self, epoch: u64) -> BTreeMap<Address, BlockCounter> {
        let taken = self.epoch_counters(epoch);
        for pillar in taken.keys() {
            self.block_counters.remove(&(epoch, *pillar));
        }
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(u64, Address), &BlockCounter)> {
        self.block_counters.iter()
    }

    pub fn insert(&mut self, epoch: u64, pillar: Address, counter: BlockCounter) {
        self.block_counters.insert((epoch, pillar), counter);
    }

    pub fn is_empty(&self) -> bool {
        self.block_counters.is_empty()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SNAPSHOT TYPES
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorWeight {
    pub delegator: Address,
    pub weight: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarWeight {
    pub owner: Address,
    pub reward_address: Address,
    pub own_weight: u128,
    pub delegated_weight: u128,
    pub produced_blocks: u64,
    pub expected_blocks: u64,
    pub give_block_reward_percentage: u8,
    pub give_delegate_reward_percentage: u8,
    /// Ascending by delegator address.
    pub delegators: Vec<DelegatorWeight>,
}

impl PillarWeight {
    /// Own plus delegated weight. Wider than u128 so the sum never overflows.
    pub fn weight(&self) -> U256 {
        U256::from(self.own_weight) + U256::from(self.delegated_weight)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelWeight {
    pub owner: Address,
    /// Registered before epoch start and not revoked before epoch end.
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeWeight {
    pub id: u64,
    pub owner: Address,
    pub weighted_amount: u128,
    pub overlap_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotWeights {
    Pillar(Vec<PillarWeight>),
    Sentinel(Vec<SentinelWeight>),
    Stake(Vec<StakeWeight>),
    Liquidity,
}

/// Immutable allocation input for one contract and one closed epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    pub kind: ContractKind,
    pub window: EpochWindow,
    pub weights: SnapshotWeights,
}

impl EpochSnapshot {
    pub fn epoch(&self) -> u64 {
        self.window.epoch
    }

    pub fn participant_count(&self) -> usize {
        match &self.weights {
            SnapshotWeights::Pillar(v) => v.len(),
            SnapshotWeights::Sentinel(v) => v.iter().filter(|s| s.active).count(),
            SnapshotWeights::Stake(v) => v.len(),
            SnapshotWeights::Liquidity => 0,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SNAPSHOT BUILDERS (read-only)
// ════════════════════════════════════════════════════════════════════════════════

/// Pillars active at epoch close, with delegated weight read through `balance_of`.
pub fn pillar_snapshot<'a>(
    window: EpochWindow,
    pillars: impl IntoIterator<Item = &'a PillarEntry>,
    delegations: impl IntoIterator<Item = &'a Delegation>,
    counters: &BTreeMap<Address, BlockCounter>,
    balance_of: impl Fn(&Address) -> u128,
) -> SettlementResult<EpochSnapshot> {
    let mut by_pillar: BTreeMap<Address, Vec<DelegatorWeight>> = BTreeMap::new();
    for d in delegations {
        by_pillar.entry(d.pillar).or_default().push(DelegatorWeight {
            delegator: d.delegator,
            weight: balance_of(&d.delegator),
        });
    }

    let mut weights = Vec::new();
    for p in pillars {
        if !p.active_at_close(&window) {
            continue;
        }
        let mut delegators = by_pillar.remove(&p.owner).unwrap_or_default();
        delegators.sort_by_key(|d| d.delegator);
        let mut delegated_weight: u128 = 0;
        for d in &delegators {
            delegated_weight = delegated_weight
                .checked_add(d.weight)
                .ok_or(SettlementError::ArithmeticOverflow("delegated weight"))?;
        }
        let counter = counters.get(&p.owner).copied().unwrap_or_default();
        weights.push(PillarWeight {
            owner: p.owner,
            reward_address: p.reward_address,
            own_weight: p.own_weight,
            delegated_weight,
            produced_blocks: counter.produced,
            expected_blocks: counter.expected,
            give_block_reward_percentage: p.give_block_reward_percentage,
            give_delegate_reward_percentage: p.give_delegate_reward_percentage,
            delegators,
        });
    }
    weights.sort_by_key(|w| w.owner);

    Ok(EpochSnapshot {
        kind: ContractKind::Pillar,
        window,
        weights: SnapshotWeights::Pillar(weights),
    })
}

pub fn sentinel_snapshot<'a>(
    window: EpochWindow,
    sentinels: impl IntoIterator<Item = &'a SentinelEntry>,
) -> EpochSnapshot {
    let mut weights: Vec<SentinelWeight> = sentinels
        .into_iter()
        .filter(|s| s.registered_at < window.end)
        .map(|s| SentinelWeight {
            owner: s.owner,
            active: window.covers(s.registered_at, s.revoked_at),
        })
        .collect();
    weights.sort_by_key(|w| w.owner);

    EpochSnapshot {
        kind: ContractKind::Sentinel,
        window,
        weights: SnapshotWeights::Sentinel(weights),
    }
}

/// Entries with a non-zero overlap. Ordered by stake id.
pub fn stake_snapshot<'a>(
    window: EpochWindow,
    stakes: impl IntoIterator<Item = &'a StakeEntry>,
) -> EpochSnapshot {
    let mut weights: Vec<StakeWeight> = stakes
        .into_iter()
        .filter_map(|s| {
            let overlap_seconds = window.overlap(s.start, s.revoked_at);
            (overlap_seconds > 0).then(|| StakeWeight {
                id: s.id,
                owner: s.owner,
                weighted_amount: s.weighted_amount,
                overlap_seconds,
            })
        })
        .collect();
    weights.sort_by_key(|w| w.id);

    EpochSnapshot {
        kind: ContractKind::Stake,
        window,
        weights: SnapshotWeights::Stake(weights),
    }
}

pub fn liquidity_snapshot(window: EpochWindow) -> EpochSnapshot {
    EpochSnapshot {
        kind: ContractKind::Liquidity,
        window,
        weights: SnapshotWeights::Liquidity,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SNAPSHOT LOG
// ════════════════════════════════════════════════════════════════════════════════

/// Append-only log of frozen snapshots, indexed by `(kind, epoch)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLog {
    snapshots: BTreeMap<(ContractKind, u64), EpochSnapshot>,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: ContractKind, epoch: u64) -> bool {
        self.snapshots.contains_key(&(kind, epoch))
    }

    /// Freezing the same `(kind, epoch)` twice is a consensus bug.
    pub fn freeze(&mut self, snapshot: EpochSnapshot) -> SettlementResult<()> {
        let key = (snapshot.kind, snapshot.epoch());
        if self.snapshots.contains_key(&key) {
            return Err(SettlementError::SnapshotAlreadyFrozen {
                kind: key.0,
                epoch: key.1,
            });
        }
        self.snapshots.insert(key, snapshot);
        Ok(())
    }

    pub fn get(&self, kind: ContractKind, epoch: u64) -> Option<&EpochSnapshot> {
        self.snapshots.get(&(kind, epoch))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpochSnapshot> {
        self.snapshots.values()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
