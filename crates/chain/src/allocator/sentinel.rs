//! Sentinel reward split: `floor(pool / activeCount)` per token.

use crate::accumulator::SentinelWeight;
use crate::error::SettlementResult;
use crate::types::TokenAmounts;

use super::Allocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelAllocator;

impl SentinelAllocator {
    pub(super) fn allocate(&self, weights: &[SentinelWeight], allocation: &mut Allocation) -> SettlementResult<()> {
        let active: Vec<&SentinelWeight> = weights.iter().filter(|s| s.active).collect();
        if active.is_empty() {
            return Ok(());
        }
        let count = active.len() as u128;
        let per_head = TokenAmounts::new(allocation.pool.znn / count, allocation.pool.qsr / count);
        for s in active {
            allocation.credit(s.owner, per_head)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenomics::RewardPool;
    use crate::types::{Address, ContractKind};

    fn sentinel(b: u8, active: bool) -> SentinelWeight {
        SentinelWeight { owner: Address::from_bytes([b; 20]), active }
    }

    #[test]
    fn equal_split_among_active() {
        let pool = RewardPool::new(ContractKind::Sentinel, 2, 1_000, 10);
        let mut a = Allocation::new(&pool);
        SentinelAllocator
            .allocate(&[sentinel(1, true), sentinel(2, false), sentinel(3, true), sentinel(4, true)], &mut a)
            .unwrap();
        assert_eq!(a.shares.len(), 3);
        assert_eq!(a.shares[&Address::from_bytes([1; 20])], TokenAmounts::new(333, 3));
        assert_eq!(a.remainder(), TokenAmounts::new(1, 1));
    }

    #[test]
    fn no_active_sentinels_no_disbursement() {
        let pool = RewardPool::new(ContractKind::Sentinel, 0, 1_000, 10);
        let mut a = Allocation::new(&pool);
        SentinelAllocator.allocate(&[sentinel(1, false)], &mut a).unwrap();
        assert!(a.shares.is_empty());
        assert!(a.distributed.is_zero());
    }
}
