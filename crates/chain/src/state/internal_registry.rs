//! Participant registry: register / update / revoke per contract kind
//! Semua fungsi memvalidasi dulu, baru mutasi. Tidak ada dana yang berpindah.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Delegation, PillarEntry, SentinelEntry, SettlementState, StakeEntry};
use crate::error::{SettlementError, SettlementResult};
use crate::tokenomics::{
    duration_multiplier_percent, weighted_stake_amount, STAKE_MIN_AMOUNT, STAKE_TIME_UNIT_SEC,
};
use crate::types::{Address, ContractKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarParams {
    pub producer_address: Address,
    pub reward_address: Address,
    pub own_weight: u128,
    pub give_block_reward_percentage: u8,
    pub give_delegate_reward_percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PillarUpdate {
    pub producer_address: Address,
    pub reward_address: Address,
    pub give_block_reward_percentage: u8,
    pub give_delegate_reward_percentage: u8,
}

fn check_percentage(p: u8) -> SettlementResult<()> {
    if p > 100 {
        return Err(SettlementError::InvalidPercentage(p));
    }
    Ok(())
}

impl SettlementState {
    // ============================================================
    // PILLAR
    // ============================================================

    pub fn register_pillar(&mut self, owner: Address, params: &PillarParams, timestamp: u64) -> SettlementResult<()> {
        check_percentage(params.give_block_reward_percentage)?;
        check_percentage(params.give_delegate_reward_percentage)?;
        if params.own_weight == 0 {
            return Err(SettlementError::InvalidAmount(0));
        }
        if self.pillars.contains_key(&owner) {
            return Err(SettlementError::AlreadyRegistered { kind: ContractKind::Pillar, owner });
        }

        self.pillars.insert(
            owner,
            PillarEntry {
                owner,
                producer_address: params.producer_address,
                reward_address: params.reward_address,
                own_weight: params.own_weight,
                give_block_reward_percentage: params.give_block_reward_percentage,
                give_delegate_reward_percentage: params.give_delegate_reward_percentage,
                registered_at: timestamp,
                revoked_at: None,
            },
        );
        self.writes.pillars.touch(owner);
        Ok(())
    }

    pub fn update_pillar(&mut self, owner: Address, update: &PillarUpdate) -> SettlementResult<()> {
        check_percentage(update.give_block_reward_percentage)?;
        check_percentage(update.give_delegate_reward_percentage)?;
        let entry = self
            .pillars
            .get_mut(&owner)
            .filter(|p| p.is_active())
            .ok_or(SettlementError::DataNonExistent)?;

        entry.producer_address = update.producer_address;
        entry.reward_address = update.reward_address;
        entry.give_block_reward_percentage = update.give_block_reward_percentage;
        entry.give_delegate_reward_percentage = update.give_delegate_reward_percentage;
        self.writes.pillars.touch(owner);
        Ok(())
    }

    pub fn revoke_pillar(&mut self, owner: Address, timestamp: u64) -> SettlementResult<()> {
        let entry = self
            .pillars
            .get_mut(&owner)
            .filter(|p| p.is_active())
            .ok_or(SettlementError::DataNonExistent)?;
        entry.revoked_at = Some(timestamp);
        self.writes.pillars.touch(owner);
        Ok(())
    }

    /// Replaces any earlier delegation of `delegator`.
    pub fn delegate(&mut self, delegator: Address, pillar: Address, timestamp: u64) -> SettlementResult<()> {
        if !self.pillars.get(&pillar).is_some_and(|p| p.is_active()) {
            return Err(SettlementError::DataNonExistent);
        }
        self.delegations.insert(
            delegator,
            Delegation { delegator, pillar, since: timestamp },
        );
        self.writes.delegations.touch(delegator);
        Ok(())
    }

    pub fn undelegate(&mut self, delegator: Address) -> SettlementResult<()> {
        self.delegations
            .remove(&delegator)
            .ok_or(SettlementError::DataNonExistent)?;
        self.writes.delegations.touch(delegator);
        Ok(())
    }

    // ============================================================
    // SENTINEL
    // ============================================================

    pub fn register_sentinel(&mut self, owner: Address, timestamp: u64) -> SettlementResult<()> {
        if self.sentinels.contains_key(&owner) {
            return Err(SettlementError::AlreadyRegistered { kind: ContractKind::Sentinel, owner });
        }
        self.sentinels.insert(
            owner,
            SentinelEntry { owner, registered_at: timestamp, revoked_at: None },
        );
        self.writes.sentinels.touch(owner);
        Ok(())
    }

    pub fn revoke_sentinel(&mut self, owner: Address, timestamp: u64) -> SettlementResult<()> {
        let entry = self
            .sentinels
            .get_mut(&owner)
            .filter(|s| s.is_active())
            .ok_or(SettlementError::DataNonExistent)?;
        entry.revoked_at = Some(timestamp);
        self.writes.sentinels.touch(owner);
        Ok(())
    }

    // ============================================================
    // STAKE
    // ============================================================

    /// Returns the new stake id.
    pub fn stake(
        &mut self,
        owner: Address,
        amount: u128,
        duration_months: u64,
        timestamp: u64,
    ) -> SettlementResult<u64> {
        if duration_multiplier_percent(duration_months).is_none() {
            return Err(SettlementError::InvalidStakeDuration(duration_months));
        }
        if amount < STAKE_MIN_AMOUNT {
            return Err(SettlementError::InvalidAmount(amount));
        }
        let weighted_amount = weighted_stake_amount(amount, duration_months)
            .ok_or(SettlementError::InvalidAmount(amount))?;

        let id = self.next_stake_id;
        self.next_stake_id = id
            .checked_add(1)
            .ok_or(SettlementError::ArithmeticOverflow("stake id"))?;
        let expiration = timestamp.saturating_add(duration_months.saturating_mul(STAKE_TIME_UNIT_SEC));

        self.stakes.insert(
            id,
            StakeEntry {
                id,
                owner,
                amount,
                duration_months,
                weighted_amount,
                start: timestamp,
                expiration,
                revoked_at: None,
            },
        );
        self.writes.stakes.touch(id);
        Ok(id)
    }

    pub fn cancel_stake(&mut self, owner: Address, id: u64, timestamp: u64) -> SettlementResult<()> {
        let entry = self
            .stakes
            .get_mut(&id)
            .filter(|s| s.is_active())
            .ok_or(SettlementError::DataNonExistent)?;
        if entry.owner != owner {
            return Err(SettlementError::PermissionDenied);
        }
        if timestamp < entry.expiration {
            return Err(SettlementError::StakeNotExpired { id, expiration: entry.expiration });
        }
        entry.revoked_at = Some(timestamp);
        self.writes.stakes.touch(id);
        Ok(())
    }

    // ============================================================
    // PRUNING
    // ============================================================

    /// Drops entries of `kind` revoked at or before `until`. Reward tables
    /// are not touched. Returns the number of entries removed.
    pub fn prune_revoked(&mut self, kind: ContractKind, until: u64) -> usize {
        let gone = |revoked_at: Option<u64>| revoked_at.is_some_and(|t| t <= until);
        let writes = &mut self.writes;
        let removed = match kind {
            ContractKind::Pillar => {
                let before = self.pillars.len();
                self.pillars.retain(|owner, p| {
                    let keep = !gone(p.revoked_at);
                    if !keep {
                        writes.pillars.touch(*owner);
                    }
                    keep
                });
                let pillars = &self.pillars;
                self.delegations.retain(|delegator, d| {
                    let keep = pillars.contains_key(&d.pillar);
                    if !keep {
                        writes.delegations.touch(*delegator);
                    }
                    keep
                });
                before - self.pillars.len()
            }
            ContractKind::Sentinel => {
                let before = self.sentinels.len();
                self.sentinels.retain(|owner, s| {
                    let keep = !gone(s.revoked_at);
                    if !keep {
                        writes.sentinels.touch(*owner);
                    }
                    keep
                });
                before - self.sentinels.len()
            }
            ContractKind::Stake => {
                let before = self.stakes.len();
                self.stakes.retain(|id, s| {
                    let keep = !gone(s.revoked_at);
                    if !keep {
                        writes.stakes.touch(*id);
                    }
                    keep
                });
                before - self.stakes.len()
            }
            ContractKind::Liquidity => 0,
        };
        if removed > 0 {
            debug!(%kind, removed, until, "revoked entries pruned");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenAmounts;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn params(weight: u128) -> PillarParams {
        PillarParams {
            producer_address: addr(50),
            reward_address: addr(51),
            own_weight: weight,
            give_block_reward_percentage: 0,
            give_delegate_reward_percentage: 100,
        }
    }

    #[test]
    fn pillar_lifecycle() {
        let mut s = SettlementState::new();
        s.register_pillar(addr(1), &params(10), 5).unwrap();
        assert!(matches!(
            s.register_pillar(addr(1), &params(10), 6),
            Err(SettlementError::AlreadyRegistered { .. })
        ));

        let mut bad = params(10);
        bad.give_block_reward_percentage = 101;
        assert_eq!(s.register_pillar(addr(2), &bad, 5), Err(SettlementError::InvalidPercentage(101)));
        assert_eq!(s.register_pillar(addr(2), &params(0), 5), Err(SettlementError::InvalidAmount(0)));

        s.update_pillar(
            addr(1),
            &PillarUpdate {
                producer_address: addr(60),
                reward_address: addr(61),
                give_block_reward_percentage: 20,
                give_delegate_reward_percentage: 30,
            },
        )
        .unwrap();
        assert_eq!(s.pillars[&addr(1)].reward_address, addr(61));

        s.revoke_pillar(addr(1), 99).unwrap();
        assert_eq!(s.pillars[&addr(1)].revoked_at, Some(99));
        assert_eq!(s.revoke_pillar(addr(1), 100), Err(SettlementError::DataNonExistent));
    }

    #[test]
    fn delegation_requires_active_pillar() {
        let mut s = SettlementState::new();
        assert_eq!(s.delegate(addr(9), addr(1), 0), Err(SettlementError::DataNonExistent));
        s.register_pillar(addr(1), &params(10), 0).unwrap();
        s.register_pillar(addr(2), &params(10), 0).unwrap();
        s.delegate(addr(9), addr(1), 0).unwrap();
        s.delegate(addr(9), addr(2), 1).unwrap();
        assert_eq!(s.delegations[&addr(9)].pillar, addr(2));
        s.undelegate(addr(9)).unwrap();
        assert_eq!(s.undelegate(addr(9)), Err(SettlementError::DataNonExistent));
    }

    #[test]
    fn stake_validation_and_cancel() {
        let mut s = SettlementState::new();
        assert_eq!(s.stake(addr(1), STAKE_MIN_AMOUNT, 0, 0), Err(SettlementError::InvalidStakeDuration(0)));
        assert_eq!(s.stake(addr(1), 1, 1, 0), Err(SettlementError::InvalidAmount(1)));

        let id = s.stake(addr(1), STAKE_MIN_AMOUNT * 10, 2, 1_000).unwrap();
        assert_eq!(id, 1);
        let entry = &s.stakes[&id];
        assert_eq!(entry.weighted_amount, STAKE_MIN_AMOUNT * 11);
        assert_eq!(entry.expiration, 1_000 + 2 * STAKE_TIME_UNIT_SEC);

        assert_eq!(s.cancel_stake(addr(2), id, u64::MAX), Err(SettlementError::PermissionDenied));
        assert!(matches!(s.cancel_stake(addr(1), id, 1_000), Err(SettlementError::StakeNotExpired { .. })));
        let expiration = s.stakes[&id].expiration;
        s.cancel_stake(addr(1), id, expiration).unwrap();
        assert_eq!(s.cancel_stake(addr(1), id, u64::MAX), Err(SettlementError::DataNonExistent));
        assert_eq!(s.stake(addr(1), STAKE_MIN_AMOUNT, 1, 0).unwrap(), 2);
    }

    #[test]
    fn prune_keeps_reward_history() {
        let mut s = SettlementState::new();
        s.register_sentinel(addr(1), 0).unwrap();
        s.register_sentinel(addr(2), 0).unwrap();
        s.record_reward(ContractKind::Sentinel, addr(1), 0, TokenAmounts::new(5, 5)).unwrap();
        s.revoke_sentinel(addr(1), 150).unwrap();

        assert_eq!(s.prune_revoked(ContractKind::Sentinel, 100), 0);
        assert_eq!(s.prune_revoked(ContractKind::Sentinel, 150), 1);
        assert!(!s.sentinels.contains_key(&addr(1)));
        assert!(s.sentinels.contains_key(&addr(2)));
        assert_eq!(s.rewards.uncollected(ContractKind::Sentinel, &addr(1)), TokenAmounts::new(5, 5));
    }

    #[test]
    fn pruning_a_pillar_drops_its_delegations() {
        let mut s = SettlementState::new();
        s.register_pillar(addr(1), &params(10), 0).unwrap();
        s.delegate(addr(9), addr(1), 0).unwrap();
        s.revoke_pillar(addr(1), 10).unwrap();
        s.mark_persisted();
        assert_eq!(s.prune_revoked(ContractKind::Pillar, 10), 1);
        assert!(s.delegations.is_empty());
        // both removals must reach the database
        assert_eq!(s.writes.pillars.iter().copied().collect::<Vec<_>>(), vec![addr(1)]);
        assert_eq!(s.writes.delegations.iter().copied().collect::<Vec<_>>(), vec![addr(9)]);
    }
}
