//! Stake reward split by time-weighted stake.
//!
//! ```text
//! contribution_i = weightedAmount_i × overlapSeconds_i
//! reward_i       = floor(pool × contribution_i / Σ contribution)
//! ```

use primitive_types::U256;

use crate::accumulator::StakeWeight;
use crate::error::{SettlementError, SettlementResult};
use crate::types::TokenAmounts;

use super::{mul_div, Allocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeAllocator;

impl StakeAllocator {
    pub(super) fn allocate(&self, weights: &[StakeWeight], allocation: &mut Allocation) -> SettlementResult<()> {
        // weighted amount × seconds can exceed u128, so contributions are U256
        let mut contributions = Vec::with_capacity(weights.len());
        let mut cumulated = U256::zero();
        for w in weights {
            let c = U256::from(w.weighted_amount) * U256::from(w.overlap_seconds);
            cumulated = cumulated
                .checked_add(c)
                .ok_or(SettlementError::ArithmeticOverflow("cumulated stake"))?;
            contributions.push((w.owner, c));
        }

        if cumulated.is_zero() {
            return Ok(());
        }

        let pool = allocation.pool;
        for (owner, c) in contributions {
            let reward = TokenAmounts::new(
                mul_div(pool.znn, c, cumulated)?,
                mul_div(pool.qsr, c, cumulated)?,
            );
            allocation.credit(owner, reward)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenomics::{weighted_stake_amount, RewardPool};
    use crate::types::{Address, ContractKind};

    fn stake(id: u64, owner: u8, weighted_amount: u128, overlap_seconds: u64) -> StakeWeight {
        StakeWeight {
            id,
            owner: Address::from_bytes([owner; 20]),
            weighted_amount,
            overlap_seconds,
        }
    }

    #[test]
    fn sole_entry_takes_whole_pool() {
        let pool = RewardPool::new(ContractKind::Stake, 0, 0, 1_000_000_000_000);
        let weighted = weighted_stake_amount(1_000_000_000, 1).unwrap();
        let mut a = Allocation::new(&pool);
        StakeAllocator.allocate(&[stake(1, 1, weighted, 86_400)], &mut a).unwrap();
        assert_eq!(a.shares[&Address::from_bytes([1; 20])].qsr, 1_000_000_000_000);
    }

    #[test]
    fn weighted_by_amount_and_time() {
        let pool = RewardPool::new(ContractKind::Stake, 0, 0, 1_000);
        let mut a = Allocation::new(&pool);
        // 100×60 vs 200×60 vs 100×30, two entries of owner 1 are summed
        StakeAllocator
            .allocate(
                &[stake(1, 1, 100, 60), stake(2, 2, 200, 60), stake(3, 1, 100, 30)],
                &mut a,
            )
            .unwrap();
        // cumulated = 6000 + 12000 + 3000 = 21000
        assert_eq!(a.shares[&Address::from_bytes([2; 20])].qsr, 571);
        assert_eq!(a.shares[&Address::from_bytes([1; 20])].qsr, 285 + 142);
        assert_eq!(a.distributed.qsr, 998);
    }

    #[test]
    fn zero_cumulated_stake_no_disbursement() {
        let pool = RewardPool::new(ContractKind::Stake, 0, 0, 1_000);
        let mut a = Allocation::new(&pool);
        StakeAllocator.allocate(&[stake(1, 1, 0, 60)], &mut a).unwrap();
        assert!(a.distributed.is_zero());
        assert!(a.shares.is_empty());
    }

    #[test]
    fn contributions_wider_than_u128_still_split() {
        let pool = RewardPool::new(ContractKind::Stake, 0, 0, 1_000);
        let mut a = Allocation::new(&pool);
        let huge = u128::MAX / 2;
        StakeAllocator
            .allocate(&[stake(1, 1, huge, 1_200), stake(2, 2, huge, 1_200)], &mut a)
            .unwrap();
        assert_eq!(a.shares[&Address::from_bytes([1; 20])].qsr, 500);
        assert_eq!(a.shares[&Address::from_bytes([2; 20])].qsr, 500);
    }
}
