//! # Reward Allocator
//!
//! One capability, four strategies, selected by contract kind:
//!
//! | Variant | Split rule | Zero denominator |
//! |---------|------------|------------------|
//! | `Pillar` | delegation part pro-rata by weight, block part per produced slot, then give split to delegators | all rewards 0 |
//! | `Sentinel` | equal split among sentinels active the whole epoch | no disbursement |
//! | `Stake` | pro-rata by weighted amount × overlap seconds | no disbursement |
//! | `Liquidity` | none, the pool stays in the contract | n/a |
//!
//! Every strategy is a pure function of `(pool, snapshot)`. Division is
//! integer floor. The remainder is not redistributed: it stays in the
//! contract balance together with the rest of the donated pool.
//!
//! ## Invariant (CONSENSUS-CRITICAL)
//!
//! `Σ shares ≤ pool` per token. [`RewardAllocator::allocate`] checks it and
//! reports `ConservationViolated` otherwise.

mod liquidity;
mod pillar;
mod sentinel;
mod stake;

use std::collections::BTreeMap;

use primitive_types::{U256, U512};
use serde::{Deserialize, Serialize};

use crate::accumulator::{EpochSnapshot, SnapshotWeights};
use crate::error::{SettlementError, SettlementResult};
use crate::tokenomics::{IssuanceSchedule, RewardPool};
use crate::types::{Address, ContractKind, TokenAmounts};

pub use liquidity::LiquidityAllocator;
pub use pillar::PillarAllocator;
pub use sentinel::SentinelAllocator;
pub use stake::StakeAllocator;

// ════════════════════════════════════════════════════════════════════════════════
// ALLOCATION RESULT
// ════════════════════════════════════════════════════════════════════════════════

/// Per-pillar breakdown, before the give split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarReward {
    pub owner: Address,
    pub delegation_reward: u128,
    pub block_reward: u128,
    pub total_reward: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub kind: ContractKind,
    pub epoch: u64,
    pub pool: TokenAmounts,
    /// Recipient → summed share for this epoch. Zero shares are kept.
    pub shares: BTreeMap<Address, TokenAmounts>,
    pub pillar_rewards: Vec<PillarReward>,
    pub distributed: TokenAmounts,
}

impl Allocation {
    fn new(pool: &RewardPool) -> Self {
        Self {
            kind: pool.kind,
            epoch: pool.epoch,
            pool: pool.amounts,
            shares: BTreeMap::new(),
            pillar_rewards: Vec::new(),
            distributed: TokenAmounts::zero(),
        }
    }

    fn credit(&mut self, address: Address, amounts: TokenAmounts) -> SettlementResult<()> {
        let overflow = SettlementError::ArithmeticOverflow("allocation share");
        let entry = self.shares.entry(address).or_default();
        *entry = entry.checked_add(amounts).ok_or(overflow.clone())?;
        self.distributed = self.distributed.checked_add(amounts).ok_or(overflow)?;
        Ok(())
    }

    pub fn check_conservation(&self) -> SettlementResult<()> {
        if !self.distributed.fits_within(&self.pool) {
            return Err(SettlementError::ConservationViolated {
                kind: self.kind,
                epoch: self.epoch,
                distributed: self.distributed,
                pool: self.pool,
            });
        }
        Ok(())
    }

    /// Floor-division dust left unassigned in the contract balance.
    pub fn remainder(&self) -> TokenAmounts {
        TokenAmounts::new(
            self.pool.znn.saturating_sub(self.distributed.znn),
            self.pool.qsr.saturating_sub(self.distributed.qsr),
        )
    }
}

/// `floor(a × b / c)`, 0 when `c == 0`.
///
/// The product is taken in 512 bits so any `u128 × U256` fits. Only a
/// quotient wider than 128 bits (`b > c` with a large `a`) is an error.
pub(crate) fn mul_div(a: u128, b: impl Into<U256>, c: impl Into<U256>) -> SettlementResult<u128> {
    let (b, c) = (b.into(), c.into());
    if c.is_zero() {
        return Ok(0);
    }
    let quotient = U512::from(a)
        .checked_mul(U512::from(b))
        .ok_or(SettlementError::ArithmeticOverflow("mul_div"))?
        / U512::from(c);
    if quotient.bits() > 128 {
        return Err(SettlementError::ArithmeticOverflow("mul_div"));
    }
    Ok(quotient.low_u128())
}

// ════════════════════════════════════════════════════════════════════════════════
// DISPATCH
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardAllocator {
    Pillar(PillarAllocator),
    Sentinel(SentinelAllocator),
    Stake(StakeAllocator),
    Liquidity(LiquidityAllocator),
}

impl RewardAllocator {
    pub fn for_kind(
        kind: ContractKind,
        schedule: &IssuanceSchedule,
        epoch: u64,
        momentums_per_epoch: u64,
    ) -> SettlementResult<Self> {
        Ok(match kind {
            ContractKind::Pillar => {
                let parts = schedule.pillar_parts(epoch, momentums_per_epoch)?;
                RewardAllocator::Pillar(PillarAllocator {
                    block_part: parts.block,
                    momentums_per_epoch,
                })
            }
            ContractKind::Sentinel => RewardAllocator::Sentinel(SentinelAllocator),
            ContractKind::Stake => RewardAllocator::Stake(StakeAllocator),
            ContractKind::Liquidity => RewardAllocator::Liquidity(LiquidityAllocator),
        })
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            RewardAllocator::Pillar(_) => ContractKind::Pillar,
            RewardAllocator::Sentinel(_) => ContractKind::Sentinel,
            RewardAllocator::Stake(_) => ContractKind::Stake,
            RewardAllocator::Liquidity(_) => ContractKind::Liquidity,
        }
    }

    /// `(pool, snapshot) → shares`. Pure, conservation-checked.
    pub fn allocate(&self, pool: &RewardPool, snapshot: &EpochSnapshot) -> SettlementResult<Allocation> {
        let kind = self.kind();
        for other in [snapshot.kind, pool.kind] {
            if other != kind {
                return Err(SettlementError::SnapshotMismatch {
                    allocator: kind,
                    snapshot: other,
                });
            }
        }

        let mut allocation = Allocation::new(pool);
        match (self, &snapshot.weights) {
            (RewardAllocator::Pillar(a), SnapshotWeights::Pillar(w)) => a.allocate(w, &mut allocation)?,
            (RewardAllocator::Sentinel(a), SnapshotWeights::Sentinel(w)) => a.allocate(w, &mut allocation)?,
            (RewardAllocator::Stake(a), SnapshotWeights::Stake(w)) => a.allocate(w, &mut allocation)?,
            (RewardAllocator::Liquidity(a), SnapshotWeights::Liquidity) => a.allocate(&mut allocation),
            _ => {
                return Err(SettlementError::SnapshotMismatch {
                    allocator: kind,
                    snapshot: snapshot.kind,
                })
            }
        }

        allocation.check_conservation()?;
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::liquidity_snapshot;
    use crate::epoch::EpochClock;

    #[test]
    fn mul_div_floors_and_guards_zero() {
        assert_eq!(mul_div(10, 1u128, 3u128).unwrap(), 3);
        assert_eq!(mul_div(10, 5u128, 0u128).unwrap(), 0);
        assert!(mul_div(u128::MAX, 2u128, 1u128).is_err());
    }

    #[test]
    fn mul_div_product_wider_than_u128() {
        // u128::MAX × u128::MAX / u128::MAX
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX).unwrap(), u128::MAX);
        let b = U256::from(u128::MAX) * U256::from(u64::MAX);
        let c = b * U256::from(3u8);
        assert_eq!(mul_div(999, b, c).unwrap(), 333);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let snap = liquidity_snapshot(EpochClock::new(0, 10).window(0));
        let pool = RewardPool::new(ContractKind::Sentinel, 0, 10, 10);
        let err = RewardAllocator::Sentinel(SentinelAllocator)
            .allocate(&pool, &snap)
            .unwrap_err();
        assert!(matches!(err, SettlementError::SnapshotMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn conservation_detects_overdistribution() {
        let pool = RewardPool::new(ContractKind::Stake, 0, 0, 10);
        let mut a = Allocation::new(&pool);
        a.credit(Address::from_bytes([1; 20]), TokenAmounts::new(0, 6)).unwrap();
        a.credit(Address::from_bytes([2; 20]), TokenAmounts::new(0, 4)).unwrap();
        a.check_conservation().unwrap();
        a.credit(Address::from_bytes([2; 20]), TokenAmounts::new(0, 1)).unwrap();
        assert!(matches!(
            a.check_conservation(),
            Err(SettlementError::ConservationViolated { epoch: 0, .. })
        ));
    }

    #[test]
    fn for_kind_uses_schedule() {
        let schedule = IssuanceSchedule::default();
        let a = RewardAllocator::for_kind(ContractKind::Pillar, &schedule, 0, 120).unwrap();
        let RewardAllocator::Pillar(p) = a else {
            panic!("expected pillar allocator");
        };
        assert_eq!(p.momentums_per_epoch, 120);
        assert_eq!(p.block_part, schedule.pillar_parts(0, 120).unwrap().block);
    }
}
