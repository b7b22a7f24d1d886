//! Pillar reward split.
//!
//! ```text
//! delegationPart = pool.znn - blockPart
//! delegation_i   = floor(delegationPart × weight_i / totalWeight)
//! block_i        = floor(blockPart / momentumsPerEpoch) × min(produced_i, expected_i)
//! total_i        = delegation_i + block_i
//!
//! keep_i = floor(block_i × (100-gb)/100) + floor(delegation_i × (100-gd)/100)  → reward address
//! give_i = floor(block_i × gb/100)       + floor(delegation_i × gd/100)        → delegators by weight
//! ```

use primitive_types::U256;

use crate::accumulator::PillarWeight;
use crate::error::{SettlementError, SettlementResult};
use crate::tokenomics::percent_of;
use crate::types::TokenAmounts;

use super::{mul_div, Allocation, PillarReward};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PillarAllocator {
    /// ZNN part of the pool paid per produced momentum.
    pub block_part: u128,
    pub momentums_per_epoch: u64,
}

impl PillarAllocator {
    pub fn per_block_reward(&self) -> u128 {
        if self.momentums_per_epoch == 0 {
            return 0;
        }
        self.block_part / u128::from(self.momentums_per_epoch)
    }

    pub(super) fn allocate(&self, weights: &[PillarWeight], allocation: &mut Allocation) -> SettlementResult<()> {
        let delegation_part = allocation
            .pool
            .znn
            .checked_sub(self.block_part)
            .ok_or(SettlementError::ArithmeticOverflow("pillar delegation part"))?;

        let mut total_weight = U256::zero();
        for w in weights {
            total_weight = total_weight
                .checked_add(w.weight())
                .ok_or(SettlementError::ArithmeticOverflow("pillar total weight"))?;
        }

        // no weight at all: every pillar settles with zero
        if total_weight.is_zero() {
            for w in weights {
                allocation.credit(w.reward_address, TokenAmounts::zero())?;
                allocation.pillar_rewards.push(PillarReward {
                    owner: w.owner,
                    delegation_reward: 0,
                    block_reward: 0,
                    total_reward: 0,
                });
            }
            return Ok(());
        }

        let per_block = self.per_block_reward();
        for w in weights {
            let delegation_reward = mul_div(delegation_part, w.weight(), total_weight)?;
            let block_reward = if w.expected_blocks == 0 {
                0
            } else {
                per_block
                    .checked_mul(u128::from(w.produced_blocks.min(w.expected_blocks)))
                    .ok_or(SettlementError::ArithmeticOverflow("block reward"))?
            };
            let total_reward = delegation_reward
                .checked_add(block_reward)
                .ok_or(SettlementError::ArithmeticOverflow("pillar total reward"))?;

            self.split(w, delegation_reward, block_reward, allocation)?;
            allocation.pillar_rewards.push(PillarReward {
                owner: w.owner,
                delegation_reward,
                block_reward,
                total_reward,
            });
        }
        Ok(())
    }

    fn split(
        &self,
        w: &PillarWeight,
        delegation_reward: u128,
        block_reward: u128,
        allocation: &mut Allocation,
    ) -> SettlementResult<()> {
        let gb = w.give_block_reward_percentage.min(100);
        let gd = w.give_delegate_reward_percentage.min(100);
        let overflow = || SettlementError::ArithmeticOverflow("pillar give split");

        let keep = percent_of(block_reward, 100 - gb)?
            .checked_add(percent_of(delegation_reward, 100 - gd)?)
            .ok_or_else(overflow)?;
        let give = percent_of(block_reward, gb)?
            .checked_add(percent_of(delegation_reward, gd)?)
            .ok_or_else(overflow)?;

        if w.delegated_weight == 0 {
            let all = keep.checked_add(give).ok_or_else(overflow)?;
            return allocation.credit(w.reward_address, TokenAmounts::new(all, 0));
        }

        allocation.credit(w.reward_address, TokenAmounts::new(keep, 0))?;
        for d in &w.delegators {
            let share = mul_div(give, d.weight, w.delegated_weight)?;
            allocation.credit(d.delegator, TokenAmounts::new(share, 0))?;
        }
        Ok(())
    }
}
